//! Window facade: add, remove, build a budgeted context, query statistics

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::capacity::{self, CapacityReport, CapacityStatus};
use crate::config::WindowConfig;
use crate::error::ContextError;
use crate::estimate::{default_estimator, TokenEstimator};
use crate::score::RelevanceScorer;
use crate::store::EntryStore;
use crate::types::{ContextEntry, EntryId, EntrySource, PriorityClass};

/// Separator between entry texts in the rendered context.
pub const CONTEXT_SEPARATOR: &str = "\n\n---\n\n";

/// Retrieval request for [`ContextWindow::build_context`].
#[derive(Debug, Clone, Default)]
pub struct ContextQuery {
    /// Token ceiling for the selection; defaults to the window's available
    /// tokens.
    pub budget_tokens: Option<usize>,
    /// Ranking query. Without one, ordering is priority then recency.
    pub query: Option<String>,
    /// Restrict the selection to these sources.
    pub sources: Option<Vec<EntrySource>>,
}

impl ContextQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_budget(mut self, budget_tokens: usize) -> Self {
        self.budget_tokens = Some(budget_tokens);
        self
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }

    pub fn with_sources(mut self, sources: Vec<EntrySource>) -> Self {
        self.sources = Some(sources);
        self
    }
}

/// A budgeted, chronologically ordered view of the window. Ranking decides
/// what makes the cut; chronology decides how it reads.
#[derive(Debug, Clone)]
pub struct ContextBuild {
    /// Effective texts joined with [`CONTEXT_SEPARATOR`].
    pub text: String,
    /// The selected subset, oldest first, for structured callers.
    pub entries: Vec<ContextEntry>,
    /// Total effective tokens of the selection.
    pub token_count: usize,
}

/// Observability counters for one window.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowStatistics {
    pub entry_count: usize,
    pub tokens_used: usize,
    pub tokens_available: usize,
    /// Percentage of the available budget in use.
    pub utilization: f64,
    pub compressed_entries: u64,
    pub evicted_entries: u64,
    pub over_budget: bool,
    pub overage_tokens: usize,
}

/// Serializable shape for an external persistence layer. This core defines
/// the shape but never triggers load or save itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSnapshot {
    pub config: WindowConfig,
    pub entries: Vec<ContextEntry>,
}

/// One logical context window: a store, its config, and the retrieval API.
///
/// All mutating operations are single-writer; wrap the window in
/// [`crate::SharedContextWindow`] to share it across tasks or to plug in an
/// external compressor.
pub struct ContextWindow {
    config: WindowConfig,
    store: EntryStore,
    scorer: RelevanceScorer,
}

impl ContextWindow {
    pub fn new(config: WindowConfig) -> Result<Self, ContextError> {
        Self::with_estimator(config, default_estimator())
    }

    pub fn with_estimator(
        config: WindowConfig,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, ContextError> {
        config.validate()?;
        let scorer = RelevanceScorer::new(config.decay_half_life_hours);
        Ok(Self {
            config,
            store: EntryStore::new(estimator),
            scorer,
        })
    }

    /// Append an entry and run the synchronous capacity pass with the
    /// built-in compressor. Returns the assigned id; never fails.
    pub fn add(&mut self, entry: ContextEntry) -> EntryId {
        let id = self.store.add(entry);
        self.enforce_capacity();
        id
    }

    /// Append without reacting to capacity pressure. Used by the shared
    /// handle, which runs maintenance with an external compressor afterward.
    pub fn push(&mut self, entry: ContextEntry) -> EntryId {
        self.store.add(entry)
    }

    /// Run the two-phase capacity policy: compress oldest eligible entries
    /// until back under the threshold, then evict lowest-priority entries
    /// toward the prune target.
    pub fn enforce_capacity(&mut self) -> CapacityReport {
        capacity::enforce(&mut self.store, &self.config)
    }

    /// Soft-delete an entry. Silent no-op on unknown ids.
    pub fn remove(&mut self, id: EntryId) -> bool {
        self.store.remove(id)
    }

    /// Forget everything below `min_priority`. Returns the number dropped.
    pub fn clear_all_except(&mut self, min_priority: PriorityClass) -> usize {
        self.store.clear_all_except(min_priority)
    }

    pub fn clear(&mut self) {
        self.store.clear();
    }

    pub fn capacity_status(&self) -> CapacityStatus {
        capacity::status(&self.store, &self.config)
    }

    pub fn config(&self) -> &WindowConfig {
        &self.config
    }

    pub fn entry(&self, id: EntryId) -> Option<&ContextEntry> {
        self.store.get(id)
    }

    /// Build a prompt-ready context under a token budget.
    pub fn build_context(&self, request: &ContextQuery) -> ContextBuild {
        self.build_context_at(Utc::now(), request)
    }

    /// Deterministic variant taking an explicit "now" for replay and tests.
    pub fn build_context_at(&self, now: DateTime<Utc>, request: &ContextQuery) -> ContextBuild {
        let budget = request
            .budget_tokens
            .unwrap_or_else(|| self.config.available_tokens());

        // stable indices keep ordering deterministic through both sorts
        let mut ranked: Vec<(usize, &ContextEntry)> = self
            .store
            .iter_active()
            .filter(|e| match &request.sources {
                Some(sources) => sources.contains(&e.source),
                None => true,
            })
            .enumerate()
            .collect();

        match request.query.as_deref() {
            Some(query) => {
                let mut scored: Vec<(f64, usize, &ContextEntry)> = ranked
                    .iter()
                    .map(|&(idx, e)| (self.scorer.score(e, now, Some(query)), idx, e))
                    .collect();
                // stable: equal scores keep chronological order
                scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));
                ranked = scored.into_iter().map(|(_, idx, e)| (idx, e)).collect();
            }
            None => {
                ranked.sort_by(|(ia, a), (ib, b)| {
                    b.priority
                        .cmp(&a.priority)
                        .then(b.created_at.cmp(&a.created_at))
                        .then(ib.cmp(ia))
                });
            }
        }

        // greedy fill: skip what does not fit, keep scanning lower ranks
        let mut selected: Vec<(usize, &ContextEntry)> = Vec::new();
        let mut remaining = budget;
        for (idx, entry) in ranked {
            let tokens = entry.effective_token_count();
            if tokens <= remaining {
                remaining -= tokens;
                selected.push((idx, entry));
            }
        }

        // ranking decided what made the cut; chronology decides how it reads
        selected.sort_by(|(ia, a), (ib, b)| a.created_at.cmp(&b.created_at).then(ia.cmp(ib)));

        let token_count = selected
            .iter()
            .map(|(_, e)| e.effective_token_count())
            .sum();
        let text = selected
            .iter()
            .map(|(_, e)| e.effective_content())
            .collect::<Vec<_>>()
            .join(CONTEXT_SEPARATOR);

        ContextBuild {
            text,
            entries: selected.into_iter().map(|(_, e)| e.clone()).collect(),
            token_count,
        }
    }

    /// Compression candidates with their texts cloned out, so an external
    /// compressor can run without holding the window lock.
    pub(crate) fn compression_plan(&self) -> Vec<(EntryId, String)> {
        capacity::compression_candidates(&self.store, self.config.compression_batch_size)
    }

    /// Apply an external compression result. Returns false when the entry was
    /// evicted or compressed concurrently and the result is discarded.
    pub(crate) fn apply_compression(&mut self, id: EntryId, text: String) -> bool {
        self.store.mark_compressed(id, text)
    }

    pub(crate) fn mark_compression_attempted(&mut self, id: EntryId) {
        self.store.mark_attempted(id);
    }

    /// Eviction phase of a maintenance pass: returns (evicted, overage).
    pub(crate) fn finish_maintenance(&mut self) -> (usize, usize) {
        let evicted = if self.store.total_tokens() > self.config.available_tokens() {
            capacity::evict_to_target(&mut self.store, &self.config)
        } else {
            0
        };
        let overage = capacity::overage(&self.store, &self.config);
        if overage > 0 {
            tracing::warn!(
                overage,
                entries = self.store.active_count(),
                "window over budget after maintenance"
            );
        }
        (evicted, overage)
    }

    pub fn statistics(&self) -> WindowStatistics {
        let tokens_used = self.store.total_tokens();
        let tokens_available = self.config.available_tokens();
        let utilization = if tokens_available == 0 {
            100.0
        } else {
            tokens_used as f64 / tokens_available as f64 * 100.0
        };
        WindowStatistics {
            entry_count: self.store.active_count(),
            tokens_used,
            tokens_available,
            utilization,
            compressed_entries: self.store.compressed_entries(),
            evicted_entries: self.store.evicted_entries(),
            over_budget: tokens_used > tokens_available,
            overage_tokens: tokens_used.saturating_sub(tokens_available),
        }
    }

    /// The persistence shape: config plus the full entry list.
    pub fn snapshot(&self) -> WindowSnapshot {
        WindowSnapshot {
            config: self.config.clone(),
            entries: self.store.entries().to_vec(),
        }
    }

    /// Rebuild a window from a snapshot. Recorded token counts are kept;
    /// only the running total is rebuilt.
    pub fn restore(
        snapshot: WindowSnapshot,
        estimator: Arc<dyn TokenEstimator>,
    ) -> Result<Self, ContextError> {
        snapshot.config.validate()?;
        let scorer = RelevanceScorer::new(snapshot.config.decay_half_life_hours);
        Ok(Self {
            scorer,
            store: EntryStore::from_entries(snapshot.entries, estimator),
            config: snapshot.config,
        })
    }
}
