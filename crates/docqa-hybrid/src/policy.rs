use tracing::info;

use docqa_core::config::RetrievalSettings;
use docqa_core::types::{RankedCandidate, SelectionMode};

const BROAD_PHRASES: &[&str] = &[
    "summar",
    "overview",
    "main points",
    "key points",
    "main idea",
    "key takeaways",
    "what is this document about",
    "what is the document about",
    "what's this document about",
    "tl;dr",
    "tldr",
    "outline",
    "gist",
];

/// Context chosen for generation and how it was chosen.
#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub candidates: Vec<RankedCandidate>,
    pub mode: SelectionMode,
}

/// Threshold filter with best-effort and broad-question fallbacks.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelevancePolicy {
    pub similarity_threshold: f32,
    pub broad_query_top_n: usize,
    pub best_effort_fallback: bool,
}

impl RelevancePolicy {
    pub fn from_settings(settings: &RetrievalSettings) -> Self {
        Self {
            similarity_threshold: settings.similarity_threshold,
            broad_query_top_n: settings.broad_query_top_n,
            best_effort_fallback: settings.best_effort_fallback,
        }
    }

    /// Summaries and overviews, which rarely match any single chunk strongly.
    pub fn is_broad_query(question: &str) -> bool {
        let q = question.to_lowercase();
        BROAD_PHRASES.iter().any(|p| q.contains(p))
    }

    /// `candidates` must be ranked best first.
    pub fn select(&self, question: &str, candidates: Vec<RankedCandidate>) -> Selection {
        if candidates.is_empty() {
            return Selection { candidates, mode: SelectionMode::Empty };
        }
        let passing = candidates.iter().take_while(|c| c.hybrid_score >= self.similarity_threshold).count();

        if Self::is_broad_query(question) && passing < self.broad_query_top_n {
            let keep = self.broad_query_top_n.max(passing);
            info!(passing, keep, "broad question; widening context below threshold");
            return Selection { candidates: candidates.into_iter().take(keep).collect(), mode: SelectionMode::Broad };
        }
        if passing > 0 {
            return Selection { candidates: candidates.into_iter().take(passing).collect(), mode: SelectionMode::Threshold };
        }
        if self.best_effort_fallback {
            info!(best = candidates[0].hybrid_score, threshold = self.similarity_threshold, "nothing passed threshold; keeping best candidate");
            return Selection { candidates: candidates.into_iter().take(1).collect(), mode: SelectionMode::BestEffort };
        }
        Selection { candidates: Vec::new(), mode: SelectionMode::Empty }
    }
}

impl Default for RelevancePolicy {
    fn default() -> Self {
        Self::from_settings(&RetrievalSettings::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docqa_core::types::SourceKind;

    fn ranked(scores: &[f32]) -> Vec<RankedCandidate> {
        scores
            .iter()
            .enumerate()
            .map(|(i, &s)| RankedCandidate {
                chunk_id: i as u64 + 1,
                document_id: 1,
                page: 0,
                text: format!("chunk {i}"),
                raw_score: s,
                normalized_score: s,
                hybrid_score: s,
                mode: SourceKind::Vector,
                embed_mode: None,
            })
            .collect()
    }

    #[test]
    fn keeps_candidates_above_threshold() {
        let s = RelevancePolicy::default().select("What is alpha?", ranked(&[0.9, 0.6, 0.3]));
        assert_eq!(s.mode, SelectionMode::Threshold);
        assert_eq!(s.candidates.len(), 2);
    }

    #[test]
    fn best_effort_keeps_top_one() {
        let s = RelevancePolicy::default().select("What is alpha?", ranked(&[0.4, 0.2]));
        assert_eq!(s.mode, SelectionMode::BestEffort);
        assert_eq!(s.candidates.len(), 1);
        assert_eq!(s.candidates[0].chunk_id, 1);
    }

    #[test]
    fn best_effort_can_be_disabled() {
        let policy = RelevancePolicy { best_effort_fallback: false, ..RelevancePolicy::default() };
        let s = policy.select("What is alpha?", ranked(&[0.4]));
        assert_eq!(s.mode, SelectionMode::Empty);
        assert!(s.candidates.is_empty());
    }

    #[test]
    fn broad_questions_widen_to_top_n() {
        let s = RelevancePolicy::default().select("Give me an overview of this document", ranked(&[0.6, 0.3, 0.2, 0.1]));
        assert_eq!(s.mode, SelectionMode::Broad);
        assert_eq!(s.candidates.len(), 3);
    }

    #[test]
    fn broad_questions_with_enough_passing_use_threshold() {
        let s = RelevancePolicy::default().select("Summarize the plan", ranked(&[0.9, 0.8, 0.7, 0.6, 0.1]));
        assert_eq!(s.mode, SelectionMode::Threshold);
        assert_eq!(s.candidates.len(), 4);
    }

    #[test]
    fn no_candidates_is_empty() {
        assert_eq!(RelevancePolicy::default().select("anything", Vec::new()).mode, SelectionMode::Empty);
    }

    #[test]
    fn detects_broad_phrasing() {
        assert!(RelevancePolicy::is_broad_query("Can you SUMMARISE this?"));
        assert!(RelevancePolicy::is_broad_query("tl;dr please"));
        assert!(!RelevancePolicy::is_broad_query("When was the treaty signed?"));
    }
}
