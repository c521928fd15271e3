//! Domain types shared by the lexical index, the vector index and the ranker.

use serde::{Deserialize, Serialize};
use std::fmt;

pub type ChunkId = u64;
pub type DocumentId = u64;

/// A contiguous span of a document's text; the unit of indexing and retrieval.
///
/// - `id`: chunk identifier, unique within its document
/// - `document_id`: owning document; deleting the document removes the chunk
/// - `page`: source page (0 when the source has no pagination)
/// - `position`: ordinal of the chunk within the document
/// - `text`: the text payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: ChunkId,
    pub document_id: DocumentId,
    pub page: u32,
    pub position: u32,
    pub text: String,
}

impl Chunk {
    pub fn new(id: ChunkId, document_id: DocumentId, page: u32, position: u32, text: impl Into<String>) -> Self {
        Self { id, document_id, page, position, text: text.into() }
    }
}

/// Provenance of a batch of vectors.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum EmbedMode {
    /// Every vector came from the primary model.
    Model,
    /// Every vector is a deterministic hash fallback.
    Hash,
    /// Some items fell back to hashing.
    Mixed,
}

impl EmbedMode {
    /// Mode of a batch given how many of its items used the fallback.
    pub fn from_counts(total: usize, fallbacks: usize) -> Self {
        if fallbacks == 0 {
            EmbedMode::Model
        } else if fallbacks >= total {
            EmbedMode::Hash
        } else {
            EmbedMode::Mixed
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EmbedMode::Model => "model",
            EmbedMode::Hash => "hash",
            EmbedMode::Mixed => "mixed",
        }
    }
}

impl fmt::Display for EmbedMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of an embedding call: one vector per input text, in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Embeddings {
    pub vectors: Vec<Vec<f32>>,
    pub mode: EmbedMode,
}

impl Embeddings {
    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    /// Dimensionality of the batch, taken from the first vector.
    pub fn dim(&self) -> Option<usize> {
        self.vectors.first().map(Vec::len)
    }
}

/// Indicates which index produced a candidate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Vector,
    Keyword,
}

/// A chunk scored by a single index. `score` is index-specific but higher is
/// always better.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
    pub source: SourceKind,
    /// Embed mode of the stored vector, for vector hits.
    pub embed_mode: Option<EmbedMode>,
}

/// A merged search result. Ephemeral, never persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedCandidate {
    pub chunk_id: ChunkId,
    pub document_id: DocumentId,
    pub page: u32,
    pub text: String,
    /// Score reported by the index that produced the candidate.
    pub raw_score: f32,
    /// `raw_score` min-max normalised within its own result set.
    pub normalized_score: f32,
    pub hybrid_score: f32,
    /// `Vector` whenever the vector index returned the candidate.
    pub mode: SourceKind,
    /// Embed mode of the query vector.
    pub embed_mode: Option<EmbedMode>,
}

/// Read-only index introspection.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub vector_count: usize,
    pub lexical_chunk_count: usize,
}

/// Classification of a generated answer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AnswerType {
    Factual,
    Contextual,
    Analytical,
    Descriptive,
    Summarization,
    OutOfScope,
}

/// How the relevance policy arrived at the context handed to generation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMode {
    /// Candidates at or above the similarity threshold.
    Threshold,
    /// Nothing passed the threshold; the single best candidate was kept.
    BestEffort,
    /// Broad question; acceptance widened below the threshold.
    Broad,
    /// Nothing to hand over.
    Empty,
}

/// A grounded answer plus the provenance the caller needs to display it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub answer: String,
    pub answer_type: AnswerType,
    pub sources: Vec<String>,
    pub source_snippets: Vec<String>,
    pub document_ids_used: Vec<DocumentId>,
    pub retrieved: usize,
    pub latency_ms: u64,
    pub generation_mode: String,
    pub embed_mode: Option<EmbedMode>,
    pub selection: SelectionMode,
    pub fallback_reason: Option<String>,
}

impl Answer {
    /// An answer that declines because the documents do not cover the question.
    pub fn out_of_scope(message: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            answer: message.into(),
            answer_type: AnswerType::OutOfScope,
            sources: Vec::new(),
            source_snippets: Vec::new(),
            document_ids_used: Vec::new(),
            retrieved: 0,
            latency_ms: 0,
            generation_mode: "none".to_string(),
            embed_mode: None,
            selection: SelectionMode::Empty,
            fallback_reason: Some(reason.into()),
        }
    }
}
