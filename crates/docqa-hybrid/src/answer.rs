use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{debug, error, instrument, warn};

use docqa_core::traits::Generator;
use docqa_core::types::{Answer, AnswerType, DocumentId, RankedCandidate, SelectionMode};

use crate::engine::RetrievalEngine;
use crate::policy::RelevancePolicy;

pub const SNIPPET_CHARS: usize = 220;
pub const OUT_OF_SCOPE_MESSAGE: &str =
    "I'm sorry, that appears to be outside the scope of the provided documents or they are still ingesting.";
pub const RETRIEVAL_FAILED_MESSAGE: &str = "Retrieval failed. Please retry shortly.";
const NO_MATCH_MESSAGE: &str = "Relevant context found but no sentence matched the question.";
const MAX_QUERY_TERMS: usize = 8;
const MAX_SENTENCES: usize = 4;
const MAX_REASON_CHARS: usize = 160;

/// Answers by quoting context sentences that mention the question's longer words.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExtractiveGenerator;

impl ExtractiveGenerator {
    pub const NAME: &'static str = "fallback-heuristic";

    pub fn extract(question: &str, context: &[RankedCandidate]) -> Answer {
        let terms: Vec<String> = question
            .split_whitespace()
            .map(|t| t.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
            .filter(|t| t.chars().count() > 3)
            .take(MAX_QUERY_TERMS)
            .collect();
        let mut sentences: Vec<&str> = Vec::new();
        for candidate in context {
            for part in candidate.text.split('.') {
                let s = part.trim();
                if s.is_empty() || sentences.contains(&s) {
                    continue;
                }
                let lowered = s.to_lowercase();
                if terms.iter().any(|t| lowered.contains(t.as_str())) {
                    sentences.push(s);
                }
            }
        }
        sentences.truncate(MAX_SENTENCES);
        let (answer, answer_type) = if sentences.is_empty() {
            (NO_MATCH_MESSAGE.to_string(), AnswerType::OutOfScope)
        } else {
            (sentences.join(". "), AnswerType::Contextual)
        };
        Answer {
            answer,
            answer_type,
            sources: context.iter().map(|c| format!("page:{}", c.page)).collect(),
            source_snippets: Vec::new(),
            document_ids_used: Vec::new(),
            retrieved: context.len(),
            latency_ms: 0,
            generation_mode: Self::NAME.to_string(),
            embed_mode: None,
            selection: SelectionMode::Threshold,
            fallback_reason: None,
        }
    }
}

#[async_trait]
impl Generator for ExtractiveGenerator {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn generate(&self, question: &str, context: &[RankedCandidate]) -> anyhow::Result<Answer> {
        Ok(Self::extract(question, context))
    }
}

fn truncate_chars(s: &str, n: usize) -> String {
    s.chars().take(n).collect()
}

/// Question answering over a [`RetrievalEngine`]: retrieve, apply the
/// relevance policy, then generate. Never fails; problems become
/// out-of-scope answers carrying a `fallback_reason`.
pub struct AnswerPipeline {
    engine: Arc<RetrievalEngine>,
    generator: Arc<dyn Generator>,
    policy: RelevancePolicy,
    timeout: Duration,
}

impl AnswerPipeline {
    pub fn new(engine: Arc<RetrievalEngine>, generator: Arc<dyn Generator>) -> Self {
        let settings = engine.settings();
        let policy = RelevancePolicy::from_settings(settings);
        let timeout = Duration::from_millis(settings.request_timeout_ms);
        Self { engine, generator, policy, timeout }
    }

    pub fn with_policy(mut self, policy: RelevancePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn engine(&self) -> &RetrievalEngine {
        &self.engine
    }

    #[instrument(skip_all, fields(filter = document_ids.len()))]
    pub async fn ask(&self, question: &str, document_ids: &[DocumentId]) -> Answer {
        let start = Instant::now();
        let elapsed = || u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX);

        let retrieved = match tokio::time::timeout(self.timeout, self.engine.retrieve(question, document_ids)).await {
            Ok(Ok(candidates)) => candidates,
            Ok(Err(e)) => {
                error!(error = %e, "retrieval failed");
                return Self::retrieval_failure(elapsed());
            }
            Err(_) => {
                error!(timeout_ms = self.timeout.as_millis() as u64, "retrieval timed out");
                return Self::retrieval_failure(elapsed());
            }
        };
        let embed_mode = retrieved.iter().find_map(|c| c.embed_mode);
        let selection = self.policy.select(question, retrieved);
        if selection.candidates.is_empty() {
            let mut answer = Answer::out_of_scope(OUT_OF_SCOPE_MESSAGE, "no_results");
            answer.embed_mode = embed_mode;
            answer.latency_ms = elapsed();
            return answer;
        }

        let context = &selection.candidates;
        let mut answer = match self.generator.generate(question, context).await {
            Ok(answer) => answer,
            Err(e) => {
                warn!(generator = self.generator.name(), error = %e, "generation failed; using extractive fallback");
                let mut answer = ExtractiveGenerator::extract(question, context);
                answer.fallback_reason = Some(truncate_chars(&e.to_string(), MAX_REASON_CHARS));
                answer
            }
        };
        answer.source_snippets = context.iter().map(|c| truncate_chars(&c.text, SNIPPET_CHARS)).collect();
        answer.document_ids_used = Vec::new();
        for c in context {
            if !answer.document_ids_used.contains(&c.document_id) {
                answer.document_ids_used.push(c.document_id);
            }
        }
        answer.embed_mode = answer.embed_mode.or(embed_mode);
        answer.selection = selection.mode;
        answer.retrieved = context.len();
        answer.latency_ms = elapsed();
        debug!(answer_type = ?answer.answer_type, retrieved = answer.retrieved, latency_ms = answer.latency_ms, "answered");
        answer
    }

    fn retrieval_failure(latency_ms: u64) -> Answer {
        let mut answer = Answer::out_of_scope(RETRIEVAL_FAILED_MESSAGE, "retrieval_error");
        answer.generation_mode = "not_started".to_string();
        answer.latency_ms = latency_ms;
        answer
    }
}
