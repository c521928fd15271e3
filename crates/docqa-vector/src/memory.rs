use std::cmp::Ordering;

use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::{debug, warn};

use docqa_core::traits::VectorIndexer;
use docqa_core::types::{Chunk, DocumentId, EmbedMode, Embeddings, ScoredChunk, SourceKind};
use docqa_core::Error;

/// Euclidean norm, with zero treated as 1.
fn safe_norm(v: &[f32]) -> f32 {
	let n = v.iter().map(|x| x * x).sum::<f32>().sqrt();
	if n == 0.0 { 1.0 } else { n }
}

/// `dot(a, b) / (|a| * |b|)`; a zero-norm side counts as norm 1.
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
	let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
	dot / (safe_norm(a) * safe_norm(b))
}

/// Checks a batch against itself and against `vector_size`, returning the batch dimensionality.
pub(crate) fn validate_batch(chunks: &[Chunk], embeddings: &Embeddings, vector_size: Option<usize>) -> Result<Option<usize>, Error> {
	if chunks.len() != embeddings.len() {
		return Err(Error::LengthMismatch { chunks: chunks.len(), vectors: embeddings.len() });
	}
	let Some(dim) = embeddings.dim() else { return Ok(None) };
	if let Some(bad) = embeddings.vectors.iter().find(|v| v.len() != dim) {
		return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() });
	}
	match vector_size {
		Some(expected) if expected != dim => Err(Error::DimensionMismatch { expected, actual: dim }),
		_ => Ok(Some(dim)),
	}
}

struct VectorRecord {
	id: u64,
	chunk: Chunk,
	vector: Vec<f32>,
	norm: f32,
	embed_mode: EmbedMode,
}

#[derive(Default)]
struct VectorState {
	records: Vec<VectorRecord>,
	vector_size: Option<usize>,
	next_id: u64,
}

/// Flat store scanned with brute-force cosine similarity.
///
/// Record ids increase monotonically and are never reused, not even across
/// [`reset`](Self::reset), so external references to them stay stable.
#[derive(Default)]
pub struct InProcessVectorIndex {
	state: RwLock<VectorState>,
}

impl InProcessVectorIndex {
	pub fn new() -> Self {
		Self::default()
	}

	pub fn ensure(&self, vector_size: usize) -> Result<(), Error> {
		let mut state = self.state.write();
		match state.vector_size {
			None => {
				state.vector_size = Some(vector_size);
				debug!(vector_size, "vector size fixed");
				Ok(())
			}
			Some(existing) if existing == vector_size => Ok(()),
			Some(existing) => Err(Error::DimensionMismatch { expected: existing, actual: vector_size }),
		}
	}

	/// Appends the batch and returns the ids assigned to its records.
	/// Nothing is written unless the whole batch is valid.
	pub fn insert(&self, chunks: &[Chunk], embeddings: &Embeddings) -> Result<Vec<u64>, Error> {
		let mut state = self.state.write();
		let Some(dim) = validate_batch(chunks, embeddings, state.vector_size)? else { return Ok(Vec::new()) };
		state.vector_size = Some(dim);
		let mut ids = Vec::with_capacity(chunks.len());
		for (chunk, vector) in chunks.iter().zip(&embeddings.vectors) {
			state.next_id += 1;
			let id = state.next_id;
			ids.push(id);
			state.records.push(VectorRecord {
				id,
				chunk: chunk.clone(),
				norm: safe_norm(vector),
				vector: vector.clone(),
				embed_mode: embeddings.mode,
			});
		}
		debug!(added = ids.len(), total = state.records.len(), mode = %embeddings.mode, "vector add");
		Ok(ids)
	}

	/// Top `k` records by cosine similarity, ties in insertion order. A query
	/// of the wrong dimensionality matches nothing.
	pub fn search(&self, query: &[f32], k: usize, document_ids: &[DocumentId]) -> Vec<ScoredChunk> {
		let state = self.state.read();
		if k == 0 || query.is_empty() || state.records.is_empty() {
			return Vec::new();
		}
		if state.vector_size.is_some_and(|size| size != query.len()) {
			warn!(expected = ?state.vector_size, actual = query.len(), "query vector has wrong dimensionality");
			return Vec::new();
		}
		let query_norm = safe_norm(query);
		let mut scored: Vec<(f32, &VectorRecord)> = state
			.records
			.iter()
			.filter(|r| document_ids.is_empty() || document_ids.contains(&r.chunk.document_id))
			.map(|r| {
				let dot: f32 = r.vector.iter().zip(query).map(|(x, y)| x * y).sum();
				(dot / (r.norm * query_norm), r)
			})
			.collect();
		scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
		scored
			.into_iter()
			.take(k)
			.map(|(score, r)| ScoredChunk { chunk: r.chunk.clone(), score, source: SourceKind::Vector, embed_mode: Some(r.embed_mode) })
			.collect()
	}

	pub fn delete_document(&self, document_id: DocumentId) -> usize {
		let mut state = self.state.write();
		let before = state.records.len();
		state.records.retain(|r| r.chunk.document_id != document_id);
		let removed = before - state.records.len();
		debug!(document_id, removed, "vector delete");
		removed
	}

	/// Clears all records and unfixes the vector size.
	pub fn reset(&self) {
		let mut state = self.state.write();
		let next_id = state.next_id;
		*state = VectorState { next_id, ..VectorState::default() };
	}

	pub fn len(&self) -> usize {
		self.state.read().records.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	pub fn vector_size(&self) -> Option<usize> {
		self.state.read().vector_size
	}

	/// Ids currently held for a document, in insertion order.
	pub fn record_ids(&self, document_id: DocumentId) -> Vec<u64> {
		self.state.read().records.iter().filter(|r| r.chunk.document_id == document_id).map(|r| r.id).collect()
	}
}

#[async_trait]
impl VectorIndexer for InProcessVectorIndex {
	fn ensure(&self, vector_size: usize) -> anyhow::Result<()> {
		Ok(Self::ensure(self, vector_size)?)
	}

	async fn add(&self, chunks: &[Chunk], embeddings: &Embeddings) -> anyhow::Result<()> {
		self.insert(chunks, embeddings)?;
		Ok(())
	}

	async fn search(&self, query: &[f32], k: usize, document_ids: &[DocumentId]) -> anyhow::Result<Vec<ScoredChunk>> {
		Ok(Self::search(self, query, k, document_ids))
	}

	async fn delete_document(&self, document_id: DocumentId) -> anyhow::Result<usize> {
		Ok(Self::delete_document(self, document_id))
	}

	async fn reset(&self) -> anyhow::Result<()> {
		Self::reset(self);
		Ok(())
	}

	fn len(&self) -> usize {
		Self::len(self)
	}

	fn vector_size(&self) -> Option<usize> {
		Self::vector_size(self)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn chunk(id: u64, doc: u64) -> Chunk {
		Chunk::new(id, doc, 0, id as u32, format!("chunk {id}"))
	}

	fn batch(vectors: Vec<Vec<f32>>) -> Embeddings {
		Embeddings { vectors, mode: EmbedMode::Model }
	}

	#[test]
	fn cosine_handles_zero_vectors() {
		assert_eq!(cosine(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
		assert!((cosine(&[1.0, 1.0], &[2.0, 2.0]) - 1.0).abs() < 1e-6);
	}

	#[test]
	fn ensure_fixes_then_guards_size() {
		let index = InProcessVectorIndex::new();
		index.ensure(8).unwrap();
		index.ensure(8).unwrap();
		assert!(matches!(index.ensure(4), Err(Error::DimensionMismatch { expected: 8, actual: 4 })));
	}

	#[test]
	fn ids_are_never_reused() {
		let index = InProcessVectorIndex::new();
		let first = index.insert(&[chunk(1, 1), chunk(2, 1)], &batch(vec![vec![1.0, 0.0], vec![0.0, 1.0]])).unwrap();
		index.delete_document(1);
		index.reset();
		let second = index.insert(&[chunk(3, 2)], &batch(vec![vec![1.0, 0.0, 0.0]])).unwrap();
		assert_eq!(first, vec![1, 2]);
		assert_eq!(second, vec![3]);
		assert_eq!(index.record_ids(2), vec![3]);
	}

	#[test]
	fn invalid_batches_write_nothing() {
		let index = InProcessVectorIndex::new();
		let ragged = batch(vec![vec![1.0, 0.0], vec![1.0]]);
		assert!(matches!(index.insert(&[chunk(1, 1), chunk(2, 1)], &ragged), Err(Error::DimensionMismatch { .. })));
		let short = batch(vec![vec![1.0, 0.0]]);
		assert!(matches!(index.insert(&[chunk(1, 1), chunk(2, 1)], &short), Err(Error::LengthMismatch { chunks: 2, vectors: 1 })));
		assert!(index.is_empty());
		assert_eq!(index.vector_size(), None);
	}

	#[test]
	fn search_ranks_filters_and_bounds() {
		let index = InProcessVectorIndex::new();
		index
			.insert(
				&[chunk(1, 1), chunk(2, 2), chunk(3, 2)],
				&batch(vec![vec![1.0, 0.0], vec![0.8, 0.6], vec![0.0, 1.0]]),
			)
			.unwrap();
		let hits = index.search(&[1.0, 0.0], 2, &[]);
		assert_eq!(hits.iter().map(|h| h.chunk.id).collect::<Vec<_>>(), vec![1, 2]);
		assert!((hits[0].score - 1.0).abs() < 1e-6);
		assert_eq!(hits[0].embed_mode, Some(EmbedMode::Model));
		let filtered = index.search(&[1.0, 0.0], 5, &[2]);
		assert!(filtered.iter().all(|h| h.chunk.document_id == 2));
		assert_eq!(filtered.len(), 2);
		assert!(index.search(&[1.0, 0.0, 0.0], 5, &[]).is_empty());
	}

	#[test]
	fn ties_keep_insertion_order() {
		let index = InProcessVectorIndex::new();
		index.insert(&[chunk(1, 1), chunk(2, 1), chunk(3, 1)], &batch(vec![vec![1.0, 0.0]; 3])).unwrap();
		let ids: Vec<u64> = index.search(&[1.0, 0.0], 3, &[]).iter().map(|h| h.chunk.id).collect();
		assert_eq!(ids, vec![1, 2, 3]);
	}
}
