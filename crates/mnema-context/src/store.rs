//! Entry storage with incremental token accounting

use std::sync::Arc;

use crate::estimate::TokenEstimator;
use crate::types::{ContextEntry, EntryId, PriorityClass};

/// Ordered entry collection for one window.
///
/// Insertion order is chronological order and breaks `created_at` ties.
/// The running token total is maintained incrementally: after every method it
/// equals the sum of effective token counts over active entries, without
/// rescanning the collection.
pub struct EntryStore {
    entries: Vec<ContextEntry>,
    total_tokens: usize,
    evicted_entries: u64,
    compressed_count: u64,
    estimator: Arc<dyn TokenEstimator>,
}

impl EntryStore {
    pub fn new(estimator: Arc<dyn TokenEstimator>) -> Self {
        Self {
            entries: Vec::new(),
            total_tokens: 0,
            evicted_entries: 0,
            compressed_count: 0,
            estimator,
        }
    }

    /// Rebuild a store from previously serialized entries. Token counts are
    /// kept as recorded (estimates are computed once at creation, never
    /// recomputed for the original text); only the running total is rebuilt.
    pub fn from_entries(entries: Vec<ContextEntry>, estimator: Arc<dyn TokenEstimator>) -> Self {
        let total_tokens = entries
            .iter()
            .filter(|e| e.is_active)
            .map(|e| e.effective_token_count())
            .sum();
        let compressed_count = entries.iter().filter(|e| e.is_compressed()).count() as u64;
        Self {
            entries,
            total_tokens,
            evicted_entries: 0,
            compressed_count,
            estimator,
        }
    }

    /// Append an entry, sizing its original content exactly once. Never fails.
    pub fn add(&mut self, mut entry: ContextEntry) -> EntryId {
        entry.token_count = self.estimator.estimate(&entry.content);
        let id = entry.id;
        if entry.is_active {
            self.total_tokens += entry.effective_token_count();
        }
        self.entries.push(entry);
        id
    }

    pub fn get(&self, id: EntryId) -> Option<&ContextEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// Soft-delete: the entry is excluded from totals and retrieval but kept
    /// for audit until a bulk clear. Silent no-op on unknown or inactive ids.
    pub fn remove(&mut self, id: EntryId) -> bool {
        match self.entries.iter_mut().find(|e| e.id == id && e.is_active) {
            Some(entry) => {
                self.total_tokens -= entry.effective_token_count();
                entry.is_active = false;
                true
            }
            None => false,
        }
    }

    /// Apply a compression result. No-op when the entry is missing, inactive,
    /// critical, or already compressed — a concurrent eviction or a competing
    /// compression simply discards this result.
    pub fn mark_compressed(&mut self, id: EntryId, compressed: String) -> bool {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return false;
        };
        if !entry.is_active || entry.is_critical() || entry.is_compressed() {
            return false;
        }

        let old_tokens = entry.effective_token_count();
        let new_tokens = self.estimator.estimate(&compressed);
        entry.compressed_content = Some(compressed);
        entry.compressed_tokens = Some(new_tokens);
        entry.compression_attempted = true;
        self.total_tokens = self.total_tokens - old_tokens + new_tokens;
        self.compressed_count += 1;
        tracing::debug!(
            id = %id,
            saved = old_tokens.saturating_sub(new_tokens),
            "entry compressed"
        );
        true
    }

    /// Record that automatic compression was tried and declined, so the entry
    /// is never re-selected for it.
    pub fn mark_attempted(&mut self, id: EntryId) {
        if let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) {
            entry.compression_attempted = true;
        }
    }

    /// Physical removal, used by the eviction phase only.
    pub fn evict(&mut self, id: EntryId) -> Option<ContextEntry> {
        let idx = self.entries.iter().position(|e| e.id == id)?;
        let entry = self.entries.remove(idx);
        if entry.is_active {
            self.total_tokens -= entry.effective_token_count();
        }
        self.evicted_entries += 1;
        tracing::debug!(
            id = %entry.id,
            priority = %entry.priority,
            tokens = entry.effective_token_count(),
            "entry evicted"
        );
        Some(entry)
    }

    /// Bulk removal of everything below `min_priority`, including soft-deleted
    /// entries. Returns the number of entries dropped.
    pub fn clear_all_except(&mut self, min_priority: PriorityClass) -> usize {
        let before = self.entries.len();
        self.entries
            .retain(|e| e.is_active && e.priority >= min_priority);
        self.total_tokens = self
            .entries
            .iter()
            .map(|e| e.effective_token_count())
            .sum();
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.total_tokens = 0;
    }

    pub fn iter_active(&self) -> impl Iterator<Item = &ContextEntry> {
        self.entries.iter().filter(|e| e.is_active)
    }

    pub fn entries(&self) -> &[ContextEntry] {
        &self.entries
    }

    pub fn total_tokens(&self) -> usize {
        self.total_tokens
    }

    pub fn active_count(&self) -> usize {
        self.entries.iter().filter(|e| e.is_active).count()
    }

    pub fn evicted_entries(&self) -> u64 {
        self.evicted_entries
    }

    pub fn compressed_entries(&self) -> u64 {
        self.compressed_count
    }

    /// Full rescan, for auditing the incremental total in tests.
    #[cfg(test)]
    pub fn recomputed_total(&self) -> usize {
        self.iter_active().map(|e| e.effective_token_count()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::estimate::default_estimator;
    use crate::types::EntrySource;

    fn store() -> EntryStore {
        EntryStore::new(default_estimator())
    }

    fn entry(text: &str) -> ContextEntry {
        ContextEntry::new(text.to_string(), EntrySource::User)
    }

    #[test]
    fn add_sizes_content_once() {
        let mut store = store();
        let id = store.add(entry(&"a".repeat(80)));
        assert_eq!(store.get(id).unwrap().token_count, 20);
        assert_eq!(store.total_tokens(), 20);
        assert_eq!(store.recomputed_total(), 20);
    }

    #[test]
    fn remove_is_soft_and_idempotent() {
        let mut store = store();
        let id = store.add(entry(&"a".repeat(40)));
        store.add(entry(&"b".repeat(40)));
        assert_eq!(store.total_tokens(), 20);

        assert!(store.remove(id));
        assert_eq!(store.total_tokens(), 10);
        assert_eq!(store.active_count(), 1);
        // the entry is retained for audit
        assert_eq!(store.entries().len(), 2);

        // second remove and unknown id are silent no-ops
        assert!(!store.remove(id));
        assert!(!store.remove(EntryId::new()));
        assert_eq!(store.total_tokens(), 10);
        assert_eq!(store.recomputed_total(), 10);
    }

    #[test]
    fn mark_compressed_applies_delta() {
        let mut store = store();
        let id = store.add(entry(&"a".repeat(400)));
        assert_eq!(store.total_tokens(), 100);

        assert!(store.mark_compressed(id, "a".repeat(100)));
        assert_eq!(store.total_tokens(), 25);
        assert_eq!(store.recomputed_total(), 25);
        assert_eq!(store.compressed_entries(), 1);

        let stored = store.get(id).unwrap();
        assert!(stored.is_compressed());
        assert!(stored.compression_attempted);
        // the original text and its estimate are untouched
        assert_eq!(stored.token_count, 100);
        assert_eq!(stored.content.len(), 400);
    }

    #[test]
    fn mark_compressed_rejects_critical_and_recompression() {
        let mut store = store();
        let critical_id = store.add(
            ContextEntry::new("system rules", EntrySource::System)
                .with_priority(PriorityClass::Critical),
        );
        assert!(!store.mark_compressed(critical_id, "short".into()));
        assert!(!store.get(critical_id).unwrap().is_compressed());

        let id = store.add(entry(&"b".repeat(200)));
        assert!(store.mark_compressed(id, "b".repeat(50)));
        // already compressed: the second result is discarded
        assert!(!store.mark_compressed(id, "b".repeat(10)));
        assert_eq!(store.get(id).unwrap().compressed_tokens, Some(12));
    }

    #[test]
    fn mark_compressed_unknown_or_inactive_is_noop() {
        let mut store = store();
        assert!(!store.mark_compressed(EntryId::new(), "x".into()));

        let id = store.add(entry(&"c".repeat(200)));
        store.remove(id);
        assert!(!store.mark_compressed(id, "c".repeat(50)));
        assert_eq!(store.recomputed_total(), store.total_tokens());
    }

    #[test]
    fn evict_removes_physically_and_counts() {
        let mut store = store();
        let id = store.add(entry(&"d".repeat(80)));
        store.add(entry(&"e".repeat(80)));

        let evicted = store.evict(id).unwrap();
        assert_eq!(evicted.id, id);
        assert_eq!(store.entries().len(), 1);
        assert_eq!(store.total_tokens(), 20);
        assert_eq!(store.evicted_entries(), 1);
        assert!(store.evict(id).is_none());
    }

    #[test]
    fn clear_all_except_keeps_high_priority() {
        let mut store = store();
        store.add(entry("low priority note").with_priority(PriorityClass::Low));
        store.add(entry("normal message"));
        let keep =
            store.add(entry("important rules").with_priority(PriorityClass::Critical));
        let inactive = store.add(entry("already removed"));
        store.remove(inactive);

        let dropped = store.clear_all_except(PriorityClass::High);
        assert_eq!(dropped, 3);
        assert_eq!(store.active_count(), 1);
        assert!(store.get(keep).is_some());
        assert_eq!(store.total_tokens(), store.recomputed_total());
    }

    #[test]
    fn accounting_invariant_across_operation_sequence() {
        let mut store = store();
        let mut ids = Vec::new();
        for i in 0..10 {
            ids.push(store.add(entry(&"x".repeat(40 + i * 16))));
            assert_eq!(store.total_tokens(), store.recomputed_total());
        }
        store.mark_compressed(ids[0], "x".repeat(20));
        assert_eq!(store.total_tokens(), store.recomputed_total());
        store.remove(ids[1]);
        assert_eq!(store.total_tokens(), store.recomputed_total());
        store.evict(ids[2]);
        assert_eq!(store.total_tokens(), store.recomputed_total());
        store.clear_all_except(PriorityClass::Normal);
        assert_eq!(store.total_tokens(), store.recomputed_total());
        store.clear();
        assert_eq!(store.total_tokens(), 0);
    }

    #[test]
    fn from_entries_rebuilds_total() {
        let mut store = store();
        let id = store.add(entry(&"y".repeat(200)));
        store.add(entry(&"z".repeat(100)));
        store.mark_compressed(id, "y".repeat(40));

        let entries = store.entries().to_vec();
        let restored = EntryStore::from_entries(entries, default_estimator());
        assert_eq!(restored.total_tokens(), store.total_tokens());
        assert_eq!(restored.compressed_entries(), 1);
    }
}
