use anyhow::{anyhow, bail, Context};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};

use crate::gateway::ModelEmbedder;

/// Inputs longer than this are truncated before sending.
pub const MAX_INPUT_CHARS: usize = 6000;

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: String,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingDatum>,
}

#[derive(Deserialize)]
struct EmbeddingDatum {
    embedding: Vec<f32>,
}

/// OpenAI-compatible `/embeddings` endpoint.
pub struct RemoteEmbedder {
    client: reqwest::Client,
    url: String,
    model: String,
    api_key: Option<String>,
    dim: usize,
}

impl RemoteEmbedder {
    pub fn new(endpoint: &str, model: impl Into<String>, api_key: Option<String>, dim: usize) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().build().context("building HTTP client")?;
        Ok(Self {
            client,
            url: format!("{}/embeddings", endpoint.trim_end_matches('/')),
            model: model.into(),
            api_key: api_key.filter(|k| !k.is_empty()),
            dim,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ModelEmbedder for RemoteEmbedder {
    fn id(&self) -> &str {
        &self.model
    }

    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_one(&self, text: &str) -> anyhow::Result<Vec<f32>> {
        let body = EmbeddingRequest { model: &self.model, input: text.chars().take(MAX_INPUT_CHARS).collect() };
        let mut request = self.client.post(&self.url).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }
        let response = request.send().await.with_context(|| format!("POST {}", self.url))?;
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS {
            bail!("rate limited by {} (429)", self.url);
        }
        if !status.is_success() {
            bail!("{} returned {}", self.url, status);
        }
        let parsed: EmbeddingResponse = response.json().await.context("decoding embedding response")?;
        parsed.data.into_iter().next().map(|d| d.embedding).ok_or_else(|| anyhow!("empty embedding response"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_joins_endpoint() {
        let e = RemoteEmbedder::new("http://localhost:8080/v1/", "m", Some(String::new()), 16).unwrap();
        assert_eq!(e.url(), "http://localhost:8080/v1/embeddings");
        assert!(e.api_key.is_none());
    }

    #[test]
    fn response_shape_decodes() {
        let parsed: EmbeddingResponse =
            serde_json::from_str(r#"{"object":"list","data":[{"object":"embedding","index":0,"embedding":[0.5,-0.5]}]}"#).unwrap();
        assert_eq!(parsed.data[0].embedding, vec![0.5, -0.5]);
    }
}
