//! Context error types

use thiserror::Error;

/// The only failable operation in this core is configuration validation.
/// Capacity pressure is a signaled state on [`crate::WindowStatistics`] and
/// unknown ids are silent no-ops.
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("invalid window config: {reason}")]
    InvalidConfig { reason: String },
}
