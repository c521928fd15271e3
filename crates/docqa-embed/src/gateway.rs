use std::sync::Arc;
use std::time::Duration;

use anyhow::ensure;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tracing::{debug, warn};

use docqa_core::traits::Embedder;
use docqa_core::types::{EmbedMode, Embeddings};

use crate::hash::HashEmbedder;
use crate::retry::RetryPolicy;

/// Longest error message kept in [`GatewayHealth`].
const MAX_ERROR_CHARS: usize = 160;

/// One embedding model reachable by the gateway, local or remote.
#[async_trait]
pub trait ModelEmbedder: Send + Sync {
    fn id(&self) -> &str;
    fn dim(&self) -> usize;
    async fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>>;
}

/// Snapshot of model availability, for status reporting.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct GatewayHealth {
    pub model_id: Option<String>,
    pub last_error: Option<String>,
    pub last_error_at: Option<DateTime<Utc>>,
    pub last_success_at: Option<DateTime<Utc>>,
    pub model_vectors: u64,
    pub fallback_vectors: u64,
}

/// Embeds texts with the configured model, retrying each item and falling
/// back to [`HashEmbedder`] per item when the model stays unavailable.
/// Never fails as a whole; the returned [`EmbedMode`] says what happened.
pub struct EmbeddingGateway {
    model: Option<Arc<dyn ModelEmbedder>>,
    fallback: HashEmbedder,
    retry: RetryPolicy,
    rate_delay: Duration,
    health: Mutex<GatewayHealth>,
}

impl EmbeddingGateway {
    pub fn hash_only(dim: usize) -> Self {
        Self {
            model: None,
            fallback: HashEmbedder::new(dim),
            retry: RetryPolicy::default(),
            rate_delay: Duration::ZERO,
            health: Mutex::new(GatewayHealth::default()),
        }
    }

    pub fn with_model(model: Arc<dyn ModelEmbedder>, retry: RetryPolicy) -> Self {
        let health = GatewayHealth { model_id: Some(model.id().to_string()), ..GatewayHealth::default() };
        Self { fallback: HashEmbedder::new(model.dim()), model: Some(model), retry, rate_delay: Duration::ZERO, health: Mutex::new(health) }
    }

    /// Pause after each successful model call.
    pub fn with_rate_delay(mut self, rate_delay: Duration) -> Self {
        self.rate_delay = rate_delay;
        self
    }

    pub fn health(&self) -> GatewayHealth {
        self.health.lock().clone()
    }

    async fn embed_with_model(&self, model: &Arc<dyn ModelEmbedder>, text: &str) -> anyhow::Result<Vec<f32>> {
        let dim = model.dim();
        self.retry
            .run(|_attempt| {
                let model = Arc::clone(model);
                async move {
                    let vector = model.embed_one(text).await?;
                    ensure!(vector.len() == dim, "model returned {} dimensions, expected {}", vector.len(), dim);
                    Ok(vector)
                }
            })
            .await
    }

    fn record_success(&self) {
        let mut health = self.health.lock();
        health.model_vectors += 1;
        health.last_success_at = Some(Utc::now());
    }

    fn record_failure(&self, error: &anyhow::Error) {
        let mut health = self.health.lock();
        health.fallback_vectors += 1;
        health.last_error = Some(error.to_string().chars().take(MAX_ERROR_CHARS).collect());
        health.last_error_at = Some(Utc::now());
    }
}

#[async_trait]
impl Embedder for EmbeddingGateway {
    fn dim(&self) -> usize {
        self.fallback.dim()
    }

    async fn embed(&self, texts: &[String]) -> anyhow::Result<Embeddings> {
        let Some(model) = &self.model else {
            let vectors = texts.iter().map(|t| self.fallback.embed_text(t)).collect();
            return Ok(Embeddings { vectors, mode: EmbedMode::Hash });
        };
        let mut vectors = Vec::with_capacity(texts.len());
        let mut fallbacks = 0usize;
        for (idx, text) in texts.iter().enumerate() {
            match self.embed_with_model(model, text).await {
                Ok(vector) => {
                    self.record_success();
                    vectors.push(vector);
                    if !self.rate_delay.is_zero() {
                        tokio::time::sleep(self.rate_delay).await;
                    }
                }
                Err(e) => {
                    warn!(model = model.id(), item = idx, error = %e, "embedding model unavailable; using hash fallback");
                    self.record_failure(&e);
                    fallbacks += 1;
                    vectors.push(self.fallback.embed_text(text));
                }
            }
        }
        let mode = EmbedMode::from_counts(texts.len(), fallbacks);
        debug!(items = texts.len(), fallbacks, mode = %mode, "embedded batch");
        Ok(Embeddings { vectors, mode })
    }
}
