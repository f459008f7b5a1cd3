//! Shared async handle around a window

use std::sync::Arc;

use tokio::sync::Mutex;

use crate::capacity::{CapacityReport, CapacityStatus, usable_result};
use crate::compress::Compressor;
use crate::config::WindowConfig;
use crate::error::ContextError;
use crate::types::{ContextEntry, EntryId, PriorityClass};
use crate::window::{ContextBuild, ContextQuery, ContextWindow, WindowStatistics};

/// Cloneable handle sharing one [`ContextWindow`] across tasks.
///
/// The mutex scope is exactly the total-maintaining mutation: an external
/// compressor is always invoked with the lock released, and its results are
/// re-applied compare-and-swap style — a result for an entry that was evicted
/// or compressed in the meantime is discarded rather than corrupting state.
/// Without a configured compressor, maintenance falls back to the built-in
/// structural pass.
#[derive(Clone)]
pub struct SharedContextWindow {
    inner: Arc<Mutex<ContextWindow>>,
    compressor: Option<Arc<dyn Compressor>>,
}

impl SharedContextWindow {
    pub fn new(config: WindowConfig) -> Result<Self, ContextError> {
        Ok(Self::from_window(ContextWindow::new(config)?))
    }

    pub fn from_window(window: ContextWindow) -> Self {
        Self {
            inner: Arc::new(Mutex::new(window)),
            compressor: None,
        }
    }

    pub fn with_compressor(mut self, compressor: Arc<dyn Compressor>) -> Self {
        self.compressor = Some(compressor);
        self
    }

    /// Append an entry, then run one maintenance pass.
    pub async fn add(&self, entry: ContextEntry) -> EntryId {
        let id = self.inner.lock().await.push(entry);
        self.maintain().await;
        id
    }

    /// One capacity pass: plan under the lock, compress outside it, re-apply
    /// and evict under the lock.
    pub async fn maintain(&self) -> CapacityReport {
        let Some(compressor) = self.compressor.clone() else {
            return self.inner.lock().await.enforce_capacity();
        };

        let plan = {
            let window = self.inner.lock().await;
            if window.capacity_status() == CapacityStatus::UnderThreshold {
                return CapacityReport::default();
            }
            window.compression_plan()
        };

        // the compressor may be remote; no lock is held across these awaits
        let mut results = Vec::with_capacity(plan.len());
        for (id, text) in plan {
            let output = compressor.compress(&text).await;
            results.push((id, text, output));
        }

        let mut window = self.inner.lock().await;
        let mut report = CapacityReport::default();
        for (id, original, output) in results {
            match output {
                Some(short) if usable_result(&original, &short) => {
                    if window.apply_compression(id, short) {
                        report.compressed += 1;
                    }
                }
                _ => {
                    tracing::debug!(
                        id = %id,
                        compressor = compressor.name(),
                        "compression unavailable, entry stays eviction-eligible"
                    );
                    window.mark_compression_attempted(id);
                }
            }
        }
        let (evicted, overage) = window.finish_maintenance();
        report.evicted = evicted;
        report.overage = overage;
        report.over_budget = overage > 0;
        report
    }

    pub async fn remove(&self, id: EntryId) -> bool {
        self.inner.lock().await.remove(id)
    }

    pub async fn clear_all_except(&self, min_priority: PriorityClass) -> usize {
        self.inner.lock().await.clear_all_except(min_priority)
    }

    pub async fn build_context(&self, request: &ContextQuery) -> ContextBuild {
        self.inner.lock().await.build_context(request)
    }

    pub async fn statistics(&self) -> WindowStatistics {
        self.inner.lock().await.statistics()
    }
}
