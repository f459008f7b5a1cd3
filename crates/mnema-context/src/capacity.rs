//! Capacity management: compress first, evict second

use serde::{Deserialize, Serialize};

use crate::compress::HeadTailCompressor;
use crate::config::WindowConfig;
use crate::store::EntryStore;
use crate::types::EntryId;

/// Usage classification against the configured thresholds. The phases are
/// implicit in the usage ratio; there is no sticky state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CapacityStatus {
    /// Usage at or below the compression threshold.
    UnderThreshold,
    /// Over the compression threshold but within the available budget.
    NeedsCompression,
    /// Over the available budget.
    NeedsEviction,
}

/// Outcome of one capacity pass. Over-budget is a signaled state, never an
/// error: it means the entry-count floor was reached or every remaining
/// entry is critical.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CapacityReport {
    pub compressed: usize,
    pub evicted: usize,
    pub over_budget: bool,
    pub overage: usize,
}

pub fn status(store: &EntryStore, config: &WindowConfig) -> CapacityStatus {
    let usage = store.total_tokens();
    if usage <= config.compression_threshold() {
        CapacityStatus::UnderThreshold
    } else if usage <= config.available_tokens() {
        CapacityStatus::NeedsCompression
    } else {
        CapacityStatus::NeedsEviction
    }
}

/// Full synchronous pass with the built-in structural compressor, run after
/// every mutation when no external compressor is configured.
pub(crate) fn enforce(store: &mut EntryStore, config: &WindowConfig) -> CapacityReport {
    let mut report = CapacityReport::default();
    if status(store, config) == CapacityStatus::UnderThreshold {
        return report;
    }

    let compressor = HeadTailCompressor;
    for (id, text) in compression_candidates(store, config.compression_batch_size) {
        if store.total_tokens() <= config.compression_threshold() {
            break;
        }
        match compressor.compress_text(&text) {
            Some(short) if usable_result(&text, &short) => {
                if store.mark_compressed(id, short) {
                    report.compressed += 1;
                }
            }
            _ => store.mark_attempted(id),
        }
    }

    if store.total_tokens() > config.available_tokens() {
        report.evicted = evict_to_target(store, config);
    }

    report.overage = overage(store, config);
    report.over_budget = report.overage > 0;
    if report.over_budget {
        tracing::warn!(
            overage = report.overage,
            entries = store.active_count(),
            "window over budget after capacity pass"
        );
    }
    report
}

/// Active, non-critical, never-attempted entries, oldest first, capped at the
/// batch size. Texts are cloned out so compression can run without a lock on
/// the store.
pub(crate) fn compression_candidates(
    store: &EntryStore,
    batch_size: usize,
) -> Vec<(EntryId, String)> {
    let mut candidates: Vec<_> = store
        .iter_active()
        .filter(|e| !e.is_critical() && !e.is_compressed() && !e.compression_attempted)
        .collect();
    candidates.sort_by_key(|e| e.created_at);
    candidates
        .into_iter()
        .take(batch_size)
        .map(|e| (e.id, e.content.clone()))
        .collect()
}

/// Lowest priority class first, oldest within a class. Critical entries are
/// never candidates.
pub(crate) fn select_victim(store: &EntryStore) -> Option<EntryId> {
    store
        .iter_active()
        .filter(|e| !e.is_critical())
        .min_by_key(|e| (e.priority, e.created_at))
        .map(|e| e.id)
}

/// Evict until usage falls to the prune target, the entry-count floor is
/// reached, or only critical entries remain.
pub(crate) fn evict_to_target(store: &mut EntryStore, config: &WindowConfig) -> usize {
    let target = config.prune_target();
    let mut evicted = 0;
    while store.total_tokens() > target && store.active_count() > config.min_entries_to_keep {
        let Some(victim) = select_victim(store) else {
            break;
        };
        store.evict(victim);
        evicted += 1;
    }
    evicted
}

pub(crate) fn overage(store: &EntryStore, config: &WindowConfig) -> usize {
    store
        .total_tokens()
        .saturating_sub(config.available_tokens())
}

/// A compression result is only applied when it is non-empty and actually
/// shorter; anything else leaves the entry uncompressed and eligible for
/// eviction.
pub(crate) fn usable_result(original: &str, compressed: &str) -> bool {
    !compressed.trim().is_empty() && compressed.len() < original.len()
}
