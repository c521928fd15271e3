use std::hash::Hasher;

use twox_hash::XxHash64;

/// Deterministic feature-hashing embedder.
///
/// Each word is hashed into one of `dim` buckets; the result is L2-normalised.
/// The same text always yields the same vector, so re-ingesting a document
/// produces identical records. Texts without words hash as a single token,
/// so every output is a unit vector.
#[derive(Debug, Clone, Copy)]
pub struct HashEmbedder {
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { dim: dim.max(1) }
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let lowered = text.to_lowercase();
        let mut tokens: Vec<&str> = lowered.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()).collect();
        if tokens.is_empty() {
            tokens.push(lowered.as_str());
        }
        let mut v = vec![0f32; self.dim];
        for (i, token) in tokens.iter().enumerate() {
            let mut hasher = XxHash64::with_seed(0);
            hasher.write(token.as_bytes());
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            let val = ((h >> 32) as u32) as f32 / u32::MAX as f32;
            v[idx] += 0.5 + 0.5 * val + (i % 3) as f32 * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt().max(1e-6);
        for x in &mut v {
            *x /= norm;
        }
        v
    }
}
