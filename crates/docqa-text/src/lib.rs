//! docqa-text
//!
//! Keyword relevance for the retrieval engine: a lowercasing word tokenizer
//! built on tantivy's analyzers and an in-process TF-IDF inverted index.

pub mod index;
pub mod tokenizer;

pub use index::LexicalIndex;
pub use tokenizer::{Tokenizer, MAX_TOKENS};
