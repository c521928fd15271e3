use async_trait::async_trait;

use docqa_core::types::{Chunk, DocumentId, Embeddings, ScoredChunk};

/// An external vector store reachable from [`crate::ExternalVectorIndex`].
///
/// Implementations may fail at any call; the index treats every failure as
/// the store being unreachable.
#[async_trait]
pub trait VectorBackend: Send + Sync {
	fn name(&self) -> &str;
	/// Writes one row per chunk. `ids` are the record ids assigned by the index.
	async fn insert(&self, ids: &[u64], chunks: &[Chunk], embeddings: &Embeddings) -> anyhow::Result<()>;
	/// Nearest rows by cosine similarity, best first. An empty `document_ids` means no filter.
	async fn search(&self, query: &[f32], limit: usize, document_ids: &[DocumentId]) -> anyhow::Result<Vec<ScoredChunk>>;
	async fn delete_document(&self, document_id: DocumentId) -> anyhow::Result<()>;
	/// Drops every row; the next insert may use a different dimensionality.
	async fn reset(&self) -> anyhow::Result<()>;
	async fn count(&self) -> anyhow::Result<usize>;
}
