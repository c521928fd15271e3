//! Embedding gateway: turns text into vectors with a configured model and
//! degrades per item to deterministic hash vectors when the model fails.

#![deny(dead_code)]
#![deny(unused_variables)]

pub mod gateway;
pub mod hash;
#[cfg(feature = "local-model")]
pub mod local;
pub mod remote;
pub mod retry;

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use docqa_core::config::{EmbeddingProvider, EmbeddingSettings};

pub use gateway::{EmbeddingGateway, GatewayHealth, ModelEmbedder};
pub use hash::HashEmbedder;
pub use remote::RemoteEmbedder;
pub use retry::RetryPolicy;

/// Builds the gateway described by `settings`.
pub fn gateway_from_settings(settings: &EmbeddingSettings) -> anyhow::Result<EmbeddingGateway> {
    let model: Arc<dyn ModelEmbedder> = match settings.provider {
        EmbeddingProvider::Hash => {
            info!(dim = settings.dim, "embedding provider: hash");
            return Ok(EmbeddingGateway::hash_only(settings.dim));
        }
        EmbeddingProvider::Remote => {
            let api_key = settings.api_key.clone().or_else(|| std::env::var("OPENAI_API_KEY").ok());
            let remote = RemoteEmbedder::new(&settings.endpoint, settings.model.clone(), api_key, settings.dim)?;
            info!(url = remote.url(), model = %settings.model, dim = settings.dim, "embedding provider: remote");
            Arc::new(remote)
        }
        EmbeddingProvider::Local => local_model(settings)?,
    };
    Ok(EmbeddingGateway::with_model(model, RetryPolicy::from_settings(settings))
        .with_rate_delay(Duration::from_millis(settings.rate_delay_ms)))
}

#[cfg(feature = "local-model")]
fn local_model(settings: &EmbeddingSettings) -> anyhow::Result<Arc<dyn ModelEmbedder>> {
    let dir = local::resolve_model_dir(settings.model_dir.as_deref());
    Ok(Arc::new(local::LocalEmbedder::load(&dir)?))
}

#[cfg(not(feature = "local-model"))]
fn local_model(_settings: &EmbeddingSettings) -> anyhow::Result<Arc<dyn ModelEmbedder>> {
    Err(docqa_core::Error::InvalidConfig("embedding.provider = \"local\" requires the local-model feature".to_string()).into())
}
