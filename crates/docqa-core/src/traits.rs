use async_trait::async_trait;

use crate::types::{Answer, Chunk, DocumentId, Embeddings, RankedCandidate, ScoredChunk};

/// Converts text to vectors. One vector per input, in order, with uniform
/// dimensionality across the batch.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn dim(&self) -> usize;
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Embeddings>;
}

/// Keyword relevance index. An empty `document_ids` slice means no filter.
pub trait KeywordIndexer: Send + Sync {
    /// Indexes chunks, returning how many produced an entry.
    fn add(&self, chunks: &[Chunk]) -> anyhow::Result<usize>;
    fn search(&self, query: &str, k: usize, document_ids: &[DocumentId]) -> anyhow::Result<Vec<ScoredChunk>>;
    /// Removes every entry of a document, returning how many were removed.
    fn delete_document(&self, document_id: DocumentId) -> usize;
    fn reset(&self);
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Semantic similarity index. Implementations may live in process or front an
/// external store; callers cannot tell the difference.
#[async_trait]
pub trait VectorIndexer: Send + Sync {
    /// Fixes the collection dimensionality on first use.
    fn ensure(&self, vector_size: usize) -> anyhow::Result<()>;
    /// Appends one record per chunk. All-or-nothing.
    async fn add(&self, chunks: &[Chunk], embeddings: &Embeddings) -> anyhow::Result<()>;
    async fn search(&self, query: &[f32], k: usize, document_ids: &[DocumentId]) -> anyhow::Result<Vec<ScoredChunk>>;
    /// Removes every record of a document, returning how many were removed.
    async fn delete_document(&self, document_id: DocumentId) -> anyhow::Result<usize>;
    /// Clears all records and unfixes the dimensionality.
    async fn reset(&self) -> anyhow::Result<()>;
    fn len(&self) -> usize;
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
    fn vector_size(&self) -> Option<usize>;
}

/// Produces an answer from a question and the retrieved context.
#[async_trait]
pub trait Generator: Send + Sync {
    fn name(&self) -> &str;
    async fn generate(&self, question: &str, context: &[RankedCandidate]) -> anyhow::Result<Answer>;
}
