#![deny(dead_code)]
#![deny(unused_variables)]

pub mod config;
pub mod data_processor;
pub mod error;
pub mod traits;
pub mod types;

pub use error::{Error, Result};
pub use types::{
    Answer, AnswerType, Chunk, ChunkId, DocumentId, EmbedMode, Embeddings, IndexStats, RankedCandidate, ScoredChunk,
    SelectionMode, SourceKind,
};
