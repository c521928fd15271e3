//! Hybrid retrieval: fuses vector and keyword rankings, owns both indexes,
//! and turns retrieved context into grounded answers.

#![deny(dead_code)]
#![deny(unused_variables)]

pub mod answer;
pub mod chat;
pub mod engine;
pub mod fusion;
pub mod policy;

use std::sync::Arc;

use docqa_core::config::{GenerationProvider, GenerationSettings, Settings};
use docqa_core::traits::Generator;
use docqa_embed::EmbeddingGateway;
use docqa_text::LexicalIndex;

pub use answer::{AnswerPipeline, ExtractiveGenerator};
pub use chat::ChatGenerator;
pub use engine::RetrievalEngine;
pub use fusion::{merge, normalize, DEFAULT_HYBRID_WEIGHT};
pub use policy::{RelevancePolicy, Selection};

/// Wires an engine from settings. The gateway is returned alongside so callers
/// can report its health.
pub async fn build_engine(settings: &Settings) -> anyhow::Result<(Arc<RetrievalEngine>, Arc<EmbeddingGateway>)> {
    let gateway = Arc::new(docqa_embed::gateway_from_settings(&settings.embedding)?);
    let vector = docqa_vector::index_from_settings(&settings.vector).await?;
    let keyword = Box::new(LexicalIndex::new()?);
    let engine = RetrievalEngine::new(gateway.clone(), vector, keyword, settings.retrieval.clone());
    Ok((Arc::new(engine), gateway))
}

/// The configured answer generator. Failures of a remote model at answer time
/// are absorbed by [`AnswerPipeline`], which falls back to extraction.
pub fn generator_from_settings(settings: &GenerationSettings) -> anyhow::Result<Arc<dyn Generator>> {
    Ok(match settings.provider {
        GenerationProvider::Extractive => Arc::new(ExtractiveGenerator),
        GenerationProvider::Remote => Arc::new(ChatGenerator::new(settings)?),
    })
}
