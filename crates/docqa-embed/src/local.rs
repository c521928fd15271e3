//! BGE-M3 (XLM-RoBERTa) embeddings computed in-process with candle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, ensure, Context, Result};
use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::info;

use crate::gateway::ModelEmbedder;

const MAX_SEQ_LEN: usize = 256;
const PAD_ID: u32 = 1;

pub fn select_device() -> Device {
    #[cfg(feature = "metal")]
    {
        if let Ok(dev) = Device::new_metal(0) {
            info!("embedding device: metal");
            return dev;
        }
    }
    info!("embedding device: cpu");
    Device::Cpu
}

/// `model_dir` if given, else `$MODEL_DIR`, else `./models/bge-m3`.
pub fn resolve_model_dir(model_dir: Option<&str>) -> PathBuf {
    model_dir
        .map(docqa_core::config::expand_path)
        .or_else(|| std::env::var("MODEL_DIR").ok().map(docqa_core::config::expand_path))
        .unwrap_or_else(|| PathBuf::from("models/bge-m3"))
}

/// Token ids and attention mask, truncated or padded to `max_len`, shaped `[1, max_len]`.
pub fn encode_padded(tokenizer: &Tokenizer, text: &str, max_len: usize, device: &Device) -> Result<(Tensor, Tensor)> {
    let enc = tokenizer.encode(text, true).map_err(|e| anyhow!("tokenization failed: {e}"))?;
    let mut ids = enc.get_ids().to_vec();
    let mut mask = enc.get_attention_mask().to_vec();
    ids.resize(max_len, PAD_ID);
    mask.resize(max_len, 0);
    let input_ids = Tensor::from_iter(ids, device)?.reshape((1, max_len))?;
    let attention_mask = Tensor::from_iter(mask, device)?.reshape((1, max_len))?;
    Ok((input_ids, attention_mask))
}

/// Mean over unmasked positions of `[B, T, H]`, then L2-normalised per row. Returns `[B, H]`.
pub fn masked_mean_l2(hidden: &Tensor, attention_mask: &Tensor) -> Result<Tensor> {
    let (batch, _seq, hidden_dim) = hidden.dims3().context("hidden states must be [B, T, H]")?;
    let mask = attention_mask.to_device(hidden.device())?.to_dtype(hidden.dtype())?;
    let mask_3d = mask.unsqueeze(2)?.broadcast_as(hidden.shape())?;
    let summed = (hidden * &mask_3d)?.sum(1)?;
    let lengths = mask.sum_keepdim(1)?.maximum(1e-9f64)?;
    let mean = summed.broadcast_div(&lengths)?;
    let eps = match hidden.dtype() {
        DType::F16 => 1e-6f64,
        _ => 1e-12f64,
    };
    let norm = (mean.sqr()?.sum_keepdim(1)?.sqrt()? + eps)?;
    let pooled = mean.broadcast_div(&norm)?;
    ensure!(pooled.dims() == [batch, hidden_dim], "unexpected pooled shape {:?}", pooled.dims());
    Ok(pooled)
}

struct LocalModel {
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
    dim: usize,
}

impl LocalModel {
    fn load(model_dir: &Path) -> Result<Self> {
        let device = select_device();
        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path)
            .map_err(|e| anyhow!("failed to load tokenizer from {}: {e}", tokenizer_path.display()))?;
        let config_path = model_dir.join("config.json");
        let config: XLMRobertaConfig = serde_json::from_str(
            &std::fs::read_to_string(&config_path).with_context(|| format!("reading {}", config_path.display()))?,
        )?;
        let weights_path = model_dir.join("pytorch_model.bin");
        let weights: HashMap<String, Tensor> = candle_core::pickle::read_all(&weights_path)
            .with_context(|| format!("reading {}", weights_path.display()))?
            .into_iter()
            .collect();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb)?;
        info!(dir = %model_dir.display(), dim = config.hidden_size, "local embedding model loaded");
        Ok(Self { model, tokenizer, device, dim: config.hidden_size })
    }

    fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let (input_ids, attention_mask) = encode_padded(&self.tokenizer, text, MAX_SEQ_LEN, &self.device)?;
        let token_type_ids = Tensor::zeros((1, MAX_SEQ_LEN), DType::I64, &self.device)?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        let pooled = masked_mean_l2(&hidden, &attention_mask)?;
        Ok(pooled.to_device(&Device::Cpu)?.squeeze(0)?.to_vec1()?)
    }
}

/// Runs inference on the blocking pool so the async runtime stays responsive.
pub struct LocalEmbedder {
    inner: Arc<LocalModel>,
    id: String,
}

impl LocalEmbedder {
    pub fn load(model_dir: &Path) -> Result<Self> {
        let id = model_dir.file_name().map(|n| n.to_string_lossy().into_owned()).unwrap_or_else(|| "local".to_string());
        Ok(Self { inner: Arc::new(LocalModel::load(model_dir)?), id })
    }
}

#[async_trait]
impl ModelEmbedder for LocalEmbedder {
    fn id(&self) -> &str {
        &self.id
    }

    fn dim(&self) -> usize {
        self.inner.dim
    }

    async fn embed_one(&self, text: &str) -> Result<Vec<f32>> {
        let inner = Arc::clone(&self.inner);
        let text = text.to_string();
        tokio::task::spawn_blocking(move || inner.embed(&text)).await?
    }
}
