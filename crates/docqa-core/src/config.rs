//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults + `config.toml` + `config.<env>.toml`
//! + `APP_*` env vars (`__` separates nesting, e.g. `APP_RETRIEVAL__TOP_K=8`).
//! Provides helpers to expand `~` and `${VAR}` and to resolve relative paths
//! against a known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::Error;

pub struct Config {
    figment: Figment,
}

impl Config {
    /// Loads configuration for the environment named by `RUST_ENV` (default `dev`).
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());
        Self::load_for_env(&env_name)
    }

    pub fn load_for_env(env_name: &str) -> anyhow::Result<Self> {
        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment };
        config.settings()?;
        Ok(config)
    }

    /// Extracts and validates the typed settings.
    pub fn settings(&self) -> anyhow::Result<Settings> {
        let settings: Settings = self
            .figment
            .extract()
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub retrieval: RetrievalSettings,
    pub embedding: EmbeddingSettings,
    pub vector: VectorSettings,
    pub chunking: ChunkingSettings,
    pub generation: GenerationSettings,
}

impl Settings {
    pub fn validate(&self) -> crate::error::Result<()> {
        let r = &self.retrieval;
        if !(0.0..=1.0).contains(&r.hybrid_weight) {
            return Err(Error::InvalidConfig(format!("retrieval.hybrid_weight must be in [0,1], got {}", r.hybrid_weight)));
        }
        if !(0.0..=1.0).contains(&r.similarity_threshold) {
            return Err(Error::InvalidConfig(format!(
                "retrieval.similarity_threshold must be in [0,1], got {}",
                r.similarity_threshold
            )));
        }
        if r.top_k == 0 {
            return Err(Error::InvalidConfig("retrieval.top_k must be at least 1".to_string()));
        }
        if r.overfetch == 0 {
            return Err(Error::InvalidConfig("retrieval.overfetch must be at least 1".to_string()));
        }
        if self.embedding.dim == 0 {
            return Err(Error::InvalidConfig("embedding.dim must be at least 1".to_string()));
        }
        let g = &self.generation;
        if g.provider == GenerationProvider::Remote && g.model.trim().is_empty() {
            return Err(Error::InvalidConfig("generation.model is required for the remote provider".to_string()));
        }
        let c = &self.chunking;
        if c.chunk_size == 0 || c.chunk_overlap >= c.chunk_size {
            return Err(Error::InvalidConfig(format!(
                "chunking.chunk_overlap ({}) must be smaller than chunking.chunk_size ({})",
                c.chunk_overlap, c.chunk_size
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    /// Weight of the keyword signal in the hybrid score.
    pub hybrid_weight: f32,
    pub similarity_threshold: f32,
    /// Multiplier on `top_k` for each source before merging.
    pub overfetch: usize,
    pub broad_query_top_n: usize,
    pub best_effort_fallback: bool,
    pub request_timeout_ms: u64,
    pub pipeline_debug: bool,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            top_k: 5,
            hybrid_weight: 0.4,
            similarity_threshold: 0.55,
            overfetch: 1,
            broad_query_top_n: 3,
            best_effort_fallback: true,
            request_timeout_ms: 30_000,
            pipeline_debug: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Deterministic hash vectors only.
    Hash,
    /// OpenAI-compatible HTTP endpoint.
    Remote,
    /// In-process model (requires the `local-model` feature of docqa-embed).
    Local,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    /// Dimensionality of hash vectors, and of remote vectors when the endpoint
    /// does not announce it.
    pub dim: usize,
    pub endpoint: String,
    pub model: String,
    pub api_key: Option<String>,
    pub max_attempts: u32,
    pub base_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub timeout_ms: u64,
    pub rate_delay_ms: u64,
    pub model_dir: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hash,
            dim: 256,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "text-embedding-3-small".to_string(),
            api_key: None,
            max_attempts: 3,
            base_backoff_ms: 200,
            max_backoff_ms: 2_000,
            timeout_ms: 60_000,
            rate_delay_ms: 0,
            model_dir: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackendKind {
    Memory,
    Lance,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorSettings {
    pub backend: VectorBackendKind,
    pub uri: String,
    pub table: String,
}

impl Default for VectorSettings {
    fn default() -> Self {
        Self { backend: VectorBackendKind::Memory, uri: "./data/lancedb".to_string(), table: "chunks".to_string() }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 800, chunk_overlap: 120 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GenerationProvider {
    /// Sentence extraction from the retrieved context; no model call.
    Extractive,
    /// OpenAI-compatible chat completions endpoint.
    Remote,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationSettings {
    pub provider: GenerationProvider,
    pub endpoint: String,
    pub model: String,
    /// Tried in order after `model` when the endpoint reports it unknown (404).
    pub fallback_models: Vec<String>,
    pub api_key: Option<String>,
    pub timeout_ms: u64,
    /// Characters of each context chunk placed in the prompt.
    pub context_chars: usize,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            provider: GenerationProvider::Extractive,
            endpoint: "https://api.openai.com/v1".to_string(),
            model: "gpt-4o-mini".to_string(),
            fallback_models: Vec::new(),
            api_key: None,
            timeout_ms: 120_000,
            context_chars: 800,
        }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
