use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};

use parking_lot::RwLock;
use tracing::debug;

use docqa_core::traits::KeywordIndexer;
use docqa_core::types::{Chunk, DocumentId, ScoredChunk, SourceKind};

use crate::tokenizer::Tokenizer;

struct LexicalEntry {
	chunk: Chunk,
	term_frequencies: HashMap<String, u32>,
}

/// `entries.len()` is the total entry count; `document_frequency[t]` counts
/// the entries whose term map contains `t`.
#[derive(Default)]
struct LexicalState {
	entries: Vec<LexicalEntry>,
	document_frequency: HashMap<String, usize>,
}

impl LexicalState {
	fn idf(&self, term: &str) -> f64 {
		let total = self.entries.len() as f64;
		let df = self.document_frequency.get(term).copied().unwrap_or(1) as f64;
		((1.0 + total) / (1.0 + df)).ln() + 1.0
	}
}

/// In-process inverted index with TF-IDF scoring.
pub struct LexicalIndex {
	tokenizer: Tokenizer,
	state: RwLock<LexicalState>,
}

impl LexicalIndex {
	pub fn new() -> anyhow::Result<Self> {
		Ok(Self { tokenizer: Tokenizer::new()?, state: RwLock::new(LexicalState::default()) })
	}

	/// Adds chunks with at least one token; the rest are skipped.
	pub fn add(&self, chunks: &[Chunk]) -> usize {
		let prepared: Vec<LexicalEntry> = chunks
			.iter()
			.filter_map(|chunk| {
				let tokens = self.tokenizer.tokenize(&chunk.text);
				if tokens.is_empty() {
					return None;
				}
				let mut term_frequencies: HashMap<String, u32> = HashMap::new();
				for token in tokens {
					*term_frequencies.entry(token).or_insert(0) += 1;
				}
				Some(LexicalEntry { chunk: chunk.clone(), term_frequencies })
			})
			.collect();
		let added = prepared.len();
		let mut state = self.state.write();
		for entry in prepared {
			for term in entry.term_frequencies.keys() {
				*state.document_frequency.entry(term.clone()).or_insert(0) += 1;
			}
			state.entries.push(entry);
		}
		debug!(added, skipped = chunks.len() - added, total = state.entries.len(), "lexical add");
		added
	}

	/// Top `k` entries by TF-IDF, ties in insertion order. An empty
	/// `document_ids` slice means no filter.
	pub fn search(&self, query: &str, k: usize, document_ids: &[DocumentId]) -> Vec<ScoredChunk> {
		if k == 0 || query.trim().is_empty() {
			return Vec::new();
		}
		let query_terms: HashSet<String> = self.tokenizer.tokenize(query).into_iter().collect();
		if query_terms.is_empty() {
			return Vec::new();
		}
		let state = self.state.read();
		let mut scored: Vec<(f64, usize)> = Vec::new();
		for (idx, entry) in state.entries.iter().enumerate() {
			if !document_ids.is_empty() && !document_ids.contains(&entry.chunk.document_id) {
				continue;
			}
			let score: f64 = query_terms
				.iter()
				.filter_map(|term| entry.term_frequencies.get(term).map(|tf| f64::from(*tf) * state.idf(term)))
				.sum();
			if score > 0.0 {
				scored.push((score, idx));
			}
		}
		scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
		scored
			.into_iter()
			.take(k)
			.map(|(score, idx)| ScoredChunk {
				chunk: state.entries[idx].chunk.clone(),
				score: score as f32,
				source: SourceKind::Keyword,
				embed_mode: None,
			})
			.collect()
	}

	/// Removes a document's entries and withdraws their term counts.
	pub fn delete_document(&self, document_id: DocumentId) -> usize {
		let mut state = self.state.write();
		let before = state.entries.len();
		let (removed, kept): (Vec<LexicalEntry>, Vec<LexicalEntry>) =
			std::mem::take(&mut state.entries).into_iter().partition(|e| e.chunk.document_id == document_id);
		state.entries = kept;
		for entry in &removed {
			for term in entry.term_frequencies.keys() {
				if let Some(df) = state.document_frequency.get_mut(term) {
					*df -= 1;
					if *df == 0 {
						state.document_frequency.remove(term);
					}
				}
			}
		}
		debug!(document_id, removed = removed.len(), before, "lexical delete");
		removed.len()
	}

	pub fn reset(&self) {
		*self.state.write() = LexicalState::default();
	}

	pub fn len(&self) -> usize {
		self.state.read().entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.len() == 0
	}

	/// Number of entries containing `term` (already lowercased).
	pub fn document_frequency(&self, term: &str) -> usize {
		self.state.read().document_frequency.get(term).copied().unwrap_or(0)
	}

	pub fn vocabulary_size(&self) -> usize {
		self.state.read().document_frequency.len()
	}
}

impl KeywordIndexer for LexicalIndex {
	fn add(&self, chunks: &[Chunk]) -> anyhow::Result<usize> {
		Ok(Self::add(self, chunks))
	}

	fn search(&self, query: &str, k: usize, document_ids: &[DocumentId]) -> anyhow::Result<Vec<ScoredChunk>> {
		Ok(Self::search(self, query, k, document_ids))
	}

	fn delete_document(&self, document_id: DocumentId) -> usize {
		Self::delete_document(self, document_id)
	}

	fn reset(&self) {
		Self::reset(self)
	}

	fn len(&self) -> usize {
		Self::len(self)
	}
}
