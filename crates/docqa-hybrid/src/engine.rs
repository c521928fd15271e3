use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use docqa_core::config::RetrievalSettings;
use docqa_core::traits::{Embedder, KeywordIndexer, VectorIndexer};
use docqa_core::types::{Chunk, DocumentId, IndexStats, RankedCandidate};
use docqa_core::Error;

use crate::fusion;

/// Owns the vector and lexical indexes and answers hybrid searches over them.
///
/// Searches run concurrently. Mutations are serialised through a write gate
/// taken after embedding; an abandoned embedding call leaves both indexes
/// untouched.
pub struct RetrievalEngine {
    embedder: Arc<dyn Embedder>,
    vector: Box<dyn VectorIndexer>,
    keyword: Box<dyn KeywordIndexer>,
    settings: RetrievalSettings,
    write_gate: Mutex<()>,
}

impl RetrievalEngine {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        vector: Box<dyn VectorIndexer>,
        keyword: Box<dyn KeywordIndexer>,
        settings: RetrievalSettings,
    ) -> Self {
        Self { embedder, vector, keyword, settings, write_gate: Mutex::new(()) }
    }

    pub fn settings(&self) -> &RetrievalSettings {
        &self.settings
    }

    /// Embeds and indexes a batch of chunks.
    ///
    /// The vector write is authoritative; a failing lexical write is logged and
    /// swallowed.
    #[instrument(skip_all, fields(chunks = chunks.len()))]
    pub async fn add_documents(&self, chunks: &[Chunk]) -> anyhow::Result<()> {
        if chunks.is_empty() {
            return Ok(());
        }
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        let Some(dim) = embeddings.dim() else {
            return Err(Error::EmbeddingUnavailable(format!("no vectors returned for {} chunks", chunks.len())).into());
        };
        if embeddings.len() != chunks.len() {
            return Err(Error::LengthMismatch { chunks: chunks.len(), vectors: embeddings.len() }.into());
        }
        // a ragged batch must fail before `ensure` fixes the collection size
        if let Some(bad) = embeddings.vectors.iter().find(|v| v.len() != dim) {
            return Err(Error::DimensionMismatch { expected: dim, actual: bad.len() }.into());
        }

        let _gate = self.write_gate.lock().await;
        self.vector.ensure(dim)?;
        self.vector.add(chunks, &embeddings).await?;
        let lexical = match self.keyword.add(chunks) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "lexical index update failed; vector index remains authoritative");
                0
            }
        };
        info!(vectors = chunks.len(), lexical, dim, embed_mode = %embeddings.mode, "indexed chunks");
        Ok(())
    }

    /// Hybrid search; at most `top_k` candidates, best first. An empty
    /// `document_ids` slice searches every document.
    #[instrument(skip_all, fields(top_k = top_k, filter = document_ids.len()))]
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_ids: &[DocumentId],
        hybrid_weight: f32,
    ) -> anyhow::Result<Vec<RankedCandidate>> {
        if top_k == 0 || query.trim().is_empty() {
            return Ok(Vec::new());
        }
        let fetch = top_k.saturating_mul(self.settings.overfetch.max(1));
        let embedded = self.embedder.embed(&[query.to_string()]).await?;
        let vector_hits = match embedded.vectors.first() {
            Some(q) => self.vector.search(q, fetch, document_ids).await?,
            None => Vec::new(),
        };
        let keyword_hits = self.keyword.search(query, fetch, document_ids).unwrap_or_else(|e| {
            warn!(error = %e, "lexical search failed; using vector results only");
            Vec::new()
        });
        debug!(vector = vector_hits.len(), keyword = keyword_hits.len(), embed_mode = %embedded.mode, "retrieved");

        let mut merged = fusion::merge(&vector_hits, &keyword_hits, hybrid_weight, Some(embedded.mode));
        merged.truncate(top_k);
        if self.settings.pipeline_debug {
            for (rank, c) in merged.iter().enumerate() {
                info!(
                    rank,
                    chunk_id = c.chunk_id,
                    document_id = c.document_id,
                    page = c.page,
                    hybrid = c.hybrid_score,
                    normalized = c.normalized_score,
                    raw = c.raw_score,
                    mode = ?c.mode,
                    "candidate"
                );
            }
        }
        Ok(merged)
    }

    /// [`search`](Self::search) with the configured `top_k` and hybrid weight.
    pub async fn retrieve(&self, query: &str, document_ids: &[DocumentId]) -> anyhow::Result<Vec<RankedCandidate>> {
        self.search(query, self.settings.top_k, document_ids, self.settings.hybrid_weight).await
    }

    /// Removes a document from both indexes; deleting an absent id is a no-op.
    /// Returns the number of vector records removed.
    #[instrument(skip(self))]
    pub async fn delete_document(&self, document_id: DocumentId) -> anyhow::Result<usize> {
        let _gate = self.write_gate.lock().await;
        let vectors = self.vector.delete_document(document_id).await?;
        let lexical = self.keyword.delete_document(document_id);
        info!(vectors, lexical, "deleted document");
        Ok(vectors)
    }

    /// Clears both indexes; the next add may establish a new vector size.
    #[instrument(skip(self))]
    pub async fn reset(&self) -> anyhow::Result<()> {
        let _gate = self.write_gate.lock().await;
        self.vector.reset().await?;
        self.keyword.reset();
        info!("indexes reset");
        Ok(())
    }

    pub fn stats(&self) -> IndexStats {
        IndexStats { vector_count: self.vector.len(), lexical_chunk_count: self.keyword.len() }
    }
}
