use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tracing::{debug, warn};

use docqa_core::traits::VectorIndexer;
use docqa_core::types::{Chunk, DocumentId, Embeddings, ScoredChunk};
use docqa_core::Error;

use crate::backend::VectorBackend;
use crate::memory::InProcessVectorIndex;

/// Backend searches fetch this many times `k` before truncating.
pub const BACKEND_OVERFETCH: usize = 3;

/// Vector index fronting an external store.
///
/// An in-process mirror holds every record and is the source of truth. Writes
/// and searches are forwarded to the backend while it is in sync; any backend
/// failure is logged, marks the backend out of sync, and the mirror answers.
/// A successful [`reset`](VectorIndexer::reset) brings the backend back in sync.
pub struct ExternalVectorIndex<B: VectorBackend> {
	mirror: InProcessVectorIndex,
	backend: B,
	in_sync: AtomicBool,
}

impl<B: VectorBackend> ExternalVectorIndex<B> {
	pub fn new(backend: B) -> Self {
		Self { mirror: InProcessVectorIndex::new(), backend, in_sync: AtomicBool::new(true) }
	}

	pub fn backend(&self) -> &B {
		&self.backend
	}

	pub fn backend_in_sync(&self) -> bool {
		self.in_sync.load(Ordering::SeqCst)
	}

	fn degrade(&self, op: &str, err: anyhow::Error) {
		let err = Error::BackendUnreachable(format!("{}: {err:#}", self.backend.name()));
		if self.in_sync.swap(false, Ordering::SeqCst) {
			warn!(op, error = %err, "vector backend failed; serving from in-process index");
		} else {
			debug!(op, error = %err, "vector backend still failing");
		}
	}
}

#[async_trait]
impl<B: VectorBackend> VectorIndexer for ExternalVectorIndex<B> {
	fn ensure(&self, vector_size: usize) -> anyhow::Result<()> {
		Ok(self.mirror.ensure(vector_size)?)
	}

	async fn add(&self, chunks: &[Chunk], embeddings: &Embeddings) -> anyhow::Result<()> {
		let ids = self.mirror.insert(chunks, embeddings)?;
		if ids.is_empty() || !self.backend_in_sync() {
			return Ok(());
		}
		if let Err(e) = self.backend.insert(&ids, chunks, embeddings).await {
			self.degrade("add", e);
		}
		Ok(())
	}

	async fn search(&self, query: &[f32], k: usize, document_ids: &[DocumentId]) -> anyhow::Result<Vec<ScoredChunk>> {
		let size_matches = self.mirror.vector_size().map_or(true, |size| size == query.len());
		if k == 0 || !size_matches || !self.backend_in_sync() {
			return Ok(self.mirror.search(query, k, document_ids));
		}
		match self.backend.search(query, k.saturating_mul(BACKEND_OVERFETCH), document_ids).await {
			Ok(mut hits) => {
				hits.retain(|h| document_ids.is_empty() || document_ids.contains(&h.chunk.document_id));
				hits.truncate(k);
				Ok(hits)
			}
			Err(e) => {
				self.degrade("search", e);
				Ok(self.mirror.search(query, k, document_ids))
			}
		}
	}

	async fn delete_document(&self, document_id: DocumentId) -> anyhow::Result<usize> {
		let removed = self.mirror.delete_document(document_id);
		if removed > 0 && self.backend_in_sync() {
			if let Err(e) = self.backend.delete_document(document_id).await {
				self.degrade("delete", e);
			}
		}
		Ok(removed)
	}

	async fn reset(&self) -> anyhow::Result<()> {
		self.mirror.reset();
		match self.backend.reset().await {
			Ok(()) => self.in_sync.store(true, Ordering::SeqCst),
			Err(e) => self.degrade("reset", e),
		}
		Ok(())
	}

	fn len(&self) -> usize {
		self.mirror.len()
	}

	fn vector_size(&self) -> Option<usize> {
		self.mirror.vector_size()
	}
}
