use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docqa_core::config::{GenerationProvider, GenerationSettings, RetrievalSettings};
use docqa_core::traits::{Embedder, Generator};
use docqa_core::types::{Answer, AnswerType, Chunk, EmbedMode, Embeddings, RankedCandidate, SelectionMode};
use docqa_embed::EmbeddingGateway;
use docqa_hybrid::answer::{OUT_OF_SCOPE_MESSAGE, RETRIEVAL_FAILED_MESSAGE};
use docqa_hybrid::{generator_from_settings, AnswerPipeline, ChatGenerator, ExtractiveGenerator, RelevancePolicy, RetrievalEngine};
use docqa_text::LexicalIndex;
use docqa_vector::InProcessVectorIndex;

struct Unreachable;

#[async_trait]
impl Embedder for Unreachable {
    fn dim(&self) -> usize {
        4
    }
    async fn embed(&self, _texts: &[String]) -> anyhow::Result<Embeddings> {
        anyhow::bail!("connection refused")
    }
}

struct Stalled;

#[async_trait]
impl Embedder for Stalled {
    fn dim(&self) -> usize {
        4
    }
    async fn embed(&self, texts: &[String]) -> anyhow::Result<Embeddings> {
        tokio::time::sleep(Duration::from_secs(30)).await;
        Ok(Embeddings { vectors: texts.iter().map(|_| vec![1.0; 4]).collect(), mode: EmbedMode::Model })
    }
}

struct Refusing;

#[async_trait]
impl Generator for Refusing {
    fn name(&self) -> &str {
        "refusing"
    }
    async fn generate(&self, _question: &str, _context: &[RankedCandidate]) -> anyhow::Result<Answer> {
        anyhow::bail!("model server returned 503")
    }
}

fn engine(embedder: Arc<dyn Embedder>) -> Arc<RetrievalEngine> {
    Arc::new(RetrievalEngine::new(
        embedder,
        Box::new(InProcessVectorIndex::new()),
        Box::new(LexicalIndex::new().unwrap()),
        RetrievalSettings::default(),
    ))
}

async fn loaded() -> Arc<RetrievalEngine> {
    let engine = engine(Arc::new(EmbeddingGateway::hash_only(128)));
    engine
        .add_documents(&[
            Chunk::new(1, 1, 3, 0, "Alpha is the first test concept. It predates everything."),
            Chunk::new(2, 1, 4, 1, "Beta follows after Alpha."),
            Chunk::new(1, 2, 0, 0, "Gamma lives in another document."),
        ])
        .await
        .unwrap();
    engine
}

#[tokio::test]
async fn empty_index_is_out_of_scope() {
    let pipeline = AnswerPipeline::new(engine(Arc::new(EmbeddingGateway::hash_only(32))), Arc::new(ExtractiveGenerator));
    let answer = pipeline.ask("What is Alpha?", &[]).await;
    assert_eq!(answer.answer_type, AnswerType::OutOfScope);
    assert_eq!(answer.answer, OUT_OF_SCOPE_MESSAGE);
    assert_eq!(answer.fallback_reason.as_deref(), Some("no_results"));
    assert_eq!(answer.selection, SelectionMode::Empty);
    assert!(answer.sources.is_empty());
}

#[tokio::test]
async fn retrieval_errors_become_answers() {
    let pipeline = AnswerPipeline::new(engine(Arc::new(Unreachable)), Arc::new(ExtractiveGenerator));
    let answer = pipeline.ask("What is Alpha?", &[]).await;
    assert_eq!(answer.answer, RETRIEVAL_FAILED_MESSAGE);
    assert_eq!(answer.fallback_reason.as_deref(), Some("retrieval_error"));
    assert_eq!(answer.generation_mode, "not_started");
}

#[tokio::test]
async fn retrieval_timeout_becomes_answer() {
    let pipeline = AnswerPipeline::new(engine(Arc::new(Stalled)), Arc::new(ExtractiveGenerator))
        .with_timeout(Duration::from_millis(50));
    let answer = pipeline.ask("What is Alpha?", &[]).await;
    assert_eq!(answer.fallback_reason.as_deref(), Some("retrieval_error"));
    assert!(answer.latency_ms < 30_000);
}

#[tokio::test]
async fn contextual_answer_carries_provenance() {
    let pipeline = AnswerPipeline::new(loaded().await, Arc::new(ExtractiveGenerator));
    let answer = pipeline.ask("What is Alpha?", &[]).await;

    assert_eq!(answer.answer_type, AnswerType::Contextual);
    assert!(answer.answer.contains("Alpha"));
    assert_eq!(answer.generation_mode, ExtractiveGenerator::NAME);
    assert_eq!(answer.embed_mode, Some(EmbedMode::Hash));
    assert!(answer.retrieved >= 1);
    assert_eq!(answer.source_snippets.len(), answer.retrieved);
    assert_eq!(answer.sources.len(), answer.retrieved);
    assert!(answer.document_ids_used.contains(&1));
    for id in &answer.document_ids_used {
        assert_eq!(answer.document_ids_used.iter().filter(|d| *d == id).count(), 1);
    }
}

#[tokio::test]
async fn filter_limits_documents_used() {
    let pipeline = AnswerPipeline::new(loaded().await, Arc::new(ExtractiveGenerator));
    let answer = pipeline.ask("Where does Gamma live?", &[2]).await;
    assert_eq!(answer.document_ids_used, vec![2]);
}

#[tokio::test]
async fn unreachable_threshold_falls_back_to_best_candidate() {
    let policy = RelevancePolicy { similarity_threshold: 2.0, ..RelevancePolicy::default() };
    let pipeline = AnswerPipeline::new(loaded().await, Arc::new(ExtractiveGenerator)).with_policy(policy);
    let answer = pipeline.ask("What is Alpha?", &[]).await;
    assert_eq!(answer.selection, SelectionMode::BestEffort);
    assert_eq!(answer.retrieved, 1);

    let strict = RelevancePolicy { best_effort_fallback: false, ..policy };
    let pipeline = AnswerPipeline::new(loaded().await, Arc::new(ExtractiveGenerator)).with_policy(strict);
    let answer = pipeline.ask("What is Alpha?", &[]).await;
    assert_eq!(answer.fallback_reason.as_deref(), Some("no_results"));
}

#[tokio::test]
async fn failing_generator_uses_extractive_answer() {
    let pipeline = AnswerPipeline::new(loaded().await, Arc::new(Refusing));
    let answer = pipeline.ask("What is Alpha?", &[]).await;
    assert_eq!(answer.generation_mode, ExtractiveGenerator::NAME);
    assert_eq!(answer.fallback_reason.as_deref(), Some("model server returned 503"));
    assert!(!answer.source_snippets.is_empty());
}

#[tokio::test]
async fn unreachable_chat_model_uses_extractive_answer() {
    let settings = GenerationSettings {
        provider: GenerationProvider::Remote,
        endpoint: "http://127.0.0.1:9/v1".to_string(),
        fallback_models: vec!["backup".to_string()],
        timeout_ms: 2_000,
        ..GenerationSettings::default()
    };
    let generator = generator_from_settings(&settings).unwrap();
    assert_eq!(generator.name(), ChatGenerator::NAME);

    let pipeline = AnswerPipeline::new(loaded().await, generator);
    let answer = pipeline.ask("What is Alpha?", &[]).await;
    assert_eq!(answer.generation_mode, ExtractiveGenerator::NAME);
    assert!(answer.fallback_reason.is_some());
    assert!(answer.answer.contains("Alpha"));
}

#[test]
fn extractive_is_the_default_generator() {
    let generator = generator_from_settings(&GenerationSettings::default()).unwrap();
    assert_eq!(generator.name(), ExtractiveGenerator::NAME);
}
