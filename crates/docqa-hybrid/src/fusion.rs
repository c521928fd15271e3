//! Fuses vector and keyword result sets into one ranked list.
//!
//! Scores are min-max normalised per set, candidates are keyed by
//! `(text, document_id)`, and the hybrid score is
//!
//! | present in      | hybrid score                       |
//! |-----------------|------------------------------------|
//! | both sets       | `(1 - w) * vector + w * keyword`   |
//! | vector only     | `vector`                           |
//! | keyword only    | `w * keyword`                      |
//!
//! where `w` is the keyword weight. Vector-only candidates are not discounted
//! by `1 - w`; keyword presence boosts a candidate but is never required.

use std::cmp::Ordering;
use std::collections::HashMap;

use docqa_core::types::{DocumentId, EmbedMode, RankedCandidate, ScoredChunk, SourceKind};

pub const DEFAULT_HYBRID_WEIGHT: f32 = 0.4;

/// Min-max normalisation into `[0, 1]`. When every score is equal, nonzero
/// scores map to 1 and zero scores to 0.
pub fn normalize(scores: &[f32]) -> Vec<f32> {
    let Some(first) = scores.first() else { return Vec::new() };
    let (min, max) = scores.iter().fold((*first, *first), |(lo, hi), &s| (lo.min(s), hi.max(s)));
    let span = max - min;
    if span == 0.0 {
        return scores.iter().map(|&s| if s == 0.0 { 0.0 } else { 1.0 }).collect();
    }
    scores.iter().map(|&s| (s - min) / span).collect()
}

struct Slot {
    candidate: RankedCandidate,
    vector_norm: Option<f32>,
    keyword_norm: Option<f32>,
}

fn candidate(hit: &ScoredChunk, normalized: f32, mode: SourceKind, embed_mode: Option<EmbedMode>) -> RankedCandidate {
    RankedCandidate {
        chunk_id: hit.chunk.id,
        document_id: hit.chunk.document_id,
        page: hit.chunk.page,
        text: hit.chunk.text.clone(),
        raw_score: hit.score,
        normalized_score: normalized,
        hybrid_score: 0.0,
        mode,
        embed_mode,
    }
}

/// Merges both result sets; every distinct key appears exactly once, sorted by
/// hybrid score with ties in vector rank order, then keyword rank order.
/// Within one set the first occurrence of a key wins. `query_mode` is the embed
/// mode of the query vector and is attached to vector candidates.
pub fn merge(
    vector: &[ScoredChunk],
    keyword: &[ScoredChunk],
    hybrid_weight: f32,
    query_mode: Option<EmbedMode>,
) -> Vec<RankedCandidate> {
    let w = hybrid_weight.clamp(0.0, 1.0);
    let vector_norm = normalize(&vector.iter().map(|h| h.score).collect::<Vec<_>>());
    let keyword_norm = normalize(&keyword.iter().map(|h| h.score).collect::<Vec<_>>());

    let mut slots: Vec<Slot> = Vec::with_capacity(vector.len() + keyword.len());
    let mut by_key: HashMap<(&str, DocumentId), usize> = HashMap::new();

    for (hit, &norm) in vector.iter().zip(&vector_norm) {
        let key = (hit.chunk.text.as_str(), hit.chunk.document_id);
        if by_key.contains_key(&key) {
            continue;
        }
        by_key.insert(key, slots.len());
        let c = candidate(hit, norm, SourceKind::Vector, query_mode);
        slots.push(Slot { candidate: c, vector_norm: Some(norm), keyword_norm: None });
    }
    for (hit, &norm) in keyword.iter().zip(&keyword_norm) {
        let key = (hit.chunk.text.as_str(), hit.chunk.document_id);
        match by_key.get(&key) {
            Some(&idx) => {
                let slot = &mut slots[idx];
                if slot.keyword_norm.is_none() {
                    slot.keyword_norm = Some(norm);
                }
            }
            None => {
                by_key.insert(key, slots.len());
                let c = candidate(hit, norm, SourceKind::Keyword, None);
                slots.push(Slot { candidate: c, vector_norm: None, keyword_norm: Some(norm) });
            }
        }
    }

    let mut merged: Vec<RankedCandidate> = slots
        .into_iter()
        .map(|slot| {
            let mut c = slot.candidate;
            c.hybrid_score = match (slot.vector_norm, slot.keyword_norm) {
                (Some(v), Some(k)) => (1.0 - w) * v + w * k,
                (Some(v), None) => v,
                (None, Some(k)) => w * k,
                (None, None) => 0.0,
            };
            c
        })
        .collect();
    // stable: equal scores keep slot order
    merged.sort_by(|a, b| b.hybrid_score.partial_cmp(&a.hybrid_score).unwrap_or(Ordering::Equal));
    merged
}
