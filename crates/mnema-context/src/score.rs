//! Relevance scoring for retrieval

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use crate::types::ContextEntry;

/// Similarity assumed when no usable query is supplied, so that decay and
/// base relevance alone drive the ranking.
const NEUTRAL_SIMILARITY: f64 = 0.5;

/// Ranks entries for retrieval from recency decay, lexical query overlap and
/// the caller-supplied base relevance. Scores are time-dependent and computed
/// on demand, never cached.
#[derive(Debug, Clone)]
pub struct RelevanceScorer {
    decay_half_life_hours: f64,
}

impl RelevanceScorer {
    pub fn new(decay_half_life_hours: f64) -> Self {
        Self {
            decay_half_life_hours,
        }
    }

    /// Exponential half-life decay: 1.0 at age zero, 0.5 after one half-life.
    pub fn decay(&self, age_hours: f64) -> f64 {
        (-std::f64::consts::LN_2 * age_hours.max(0.0) / self.decay_half_life_hours).exp()
    }

    /// Lexical overlap: `|query ∩ text| / |query|` over lowercased whitespace
    /// tokens, clamped to [0, 1]. An empty query is neutral.
    pub fn similarity(query: &str, text: &str) -> f64 {
        let query_tokens: Vec<String> = query
            .split_whitespace()
            .map(|t| t.to_lowercase())
            .collect();
        if query_tokens.is_empty() {
            return NEUTRAL_SIMILARITY;
        }
        let text_tokens: HashSet<String> =
            text.split_whitespace().map(|t| t.to_lowercase()).collect();
        let hits = query_tokens
            .iter()
            .filter(|t| text_tokens.contains(*t))
            .count();
        (hits as f64 / query_tokens.len() as f64).clamp(0.0, 1.0)
    }

    /// Combined retrieval score. The `0.5 + 0.5·similarity` term rewards
    /// topical overlap without letting similarity alone zero out an
    /// otherwise-relevant old entry.
    pub fn score(&self, entry: &ContextEntry, now: DateTime<Utc>, query: Option<&str>) -> f64 {
        let decay = self.decay(entry.age_hours(now));
        let similarity = match query {
            Some(q) => Self::similarity(q, entry.effective_content()),
            None => NEUTRAL_SIMILARITY,
        };
        entry.base_relevance * decay * (0.5 + 0.5 * similarity)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::EntrySource;
    use chrono::Duration;

    #[test]
    fn decay_halves_per_half_life() {
        let scorer = RelevanceScorer::new(24.0);
        assert!((scorer.decay(0.0) - 1.0).abs() < 1e-9);
        assert!((scorer.decay(24.0) - 0.5).abs() < 1e-9);
        assert!((scorer.decay(48.0) - 0.25).abs() < 1e-9);
    }

    #[test]
    fn similarity_counts_query_overlap() {
        assert!((RelevanceScorer::similarity("invoice due", "the invoice is due tomorrow") - 1.0).abs() < 1e-9);
        assert!((RelevanceScorer::similarity("invoice due", "the weather is nice") - 0.0).abs() < 1e-9);
        assert!((RelevanceScorer::similarity("Invoice Due", "INVOICE overdue") - 0.5).abs() < 1e-9);
    }

    #[test]
    fn empty_query_is_neutral() {
        assert_eq!(RelevanceScorer::similarity("", "anything"), 0.5);
        assert_eq!(RelevanceScorer::similarity("   ", "anything"), 0.5);
    }

    #[test]
    fn score_combines_relevance_decay_similarity() {
        let scorer = RelevanceScorer::new(24.0);
        let now = Utc::now();
        let entry = ContextEntry::new("invoice due tomorrow", EntrySource::User)
            .with_created_at(now - Duration::hours(24));

        // base 1.0, decay 0.5, similarity 1.0 → 0.5 * (0.5 + 0.5) = 0.5
        let score = scorer.score(&entry, now, Some("invoice due tomorrow"));
        assert!((score - 0.5).abs() < 1e-6);

        // zero overlap keeps half the weight rather than zeroing out
        let score = scorer.score(&entry, now, Some("unrelated words"));
        assert!((score - 0.25).abs() < 1e-6);
    }

    #[test]
    fn fresher_entries_outrank_stale_ones() {
        let scorer = RelevanceScorer::new(12.0);
        let now = Utc::now();
        let fresh = ContextEntry::new("same text", EntrySource::User).with_created_at(now);
        let stale = ContextEntry::new("same text", EntrySource::User)
            .with_created_at(now - Duration::hours(36));
        assert!(scorer.score(&fresh, now, None) > scorer.score(&stale, now, None));
    }

    #[test]
    fn base_relevance_scales_score() {
        let scorer = RelevanceScorer::new(24.0);
        let now = Utc::now();
        let strong = ContextEntry::new("text", EntrySource::Memory).with_created_at(now);
        let weak = ContextEntry::new("text", EntrySource::Memory)
            .with_created_at(now)
            .with_relevance(0.2);
        assert!(scorer.score(&strong, now, None) > scorer.score(&weak, now, None));
    }

    #[test]
    fn score_uses_effective_content() {
        let scorer = RelevanceScorer::new(24.0);
        let now = Utc::now();
        let mut entry =
            ContextEntry::new("original about invoices", EntrySource::Document).with_created_at(now);
        entry.compressed_content = Some("nothing matching here".to_string());
        entry.compressed_tokens = Some(3);
        let compressed_score = scorer.score(&entry, now, Some("invoices"));
        // the query word only appears in the original, which compression replaced
        assert!((compressed_score - 0.5).abs() < 1e-6);
    }
}
