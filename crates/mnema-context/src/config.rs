//! Window configuration

use serde::{Deserialize, Serialize};

use crate::error::ContextError;

/// Numeric policy knobs for one context window.
///
/// `available_tokens` (`max_tokens - reserved_for_response`) is the working
/// ceiling: compression starts at `compression_start_ratio` of it, eviction
/// aims back down to `prune_target_ratio` of it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Hard ceiling for the window.
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Tokens held back for the model's reply.
    #[serde(default = "default_reserved_for_response")]
    pub reserved_for_response: usize,

    /// Fraction of available tokens at which compression begins.
    #[serde(default = "default_compression_start_ratio")]
    pub compression_start_ratio: f64,

    /// Fraction of available tokens eviction reduces usage back down to.
    /// Must not exceed `compression_start_ratio`.
    #[serde(default = "default_prune_target_ratio")]
    pub prune_target_ratio: f64,

    /// Eviction never reduces the live entry count below this floor.
    #[serde(default = "default_min_entries_to_keep")]
    pub min_entries_to_keep: usize,

    /// Half-life for relevance time decay.
    #[serde(default = "default_decay_half_life_hours")]
    pub decay_half_life_hours: f64,

    /// Max entries compressed per capacity pass.
    #[serde(default = "default_compression_batch_size")]
    pub compression_batch_size: usize,
}

impl WindowConfig {
    /// Tokens the stored context may occupy.
    pub fn available_tokens(&self) -> usize {
        self.max_tokens.saturating_sub(self.reserved_for_response)
    }

    /// Usage above this triggers the compression phase.
    pub fn compression_threshold(&self) -> usize {
        (self.available_tokens() as f64 * self.compression_start_ratio) as usize
    }

    /// Usage the eviction phase aims back down to.
    pub fn prune_target(&self) -> usize {
        (self.available_tokens() as f64 * self.prune_target_ratio) as usize
    }

    /// Rejects impossible configurations before any entries exist.
    pub fn validate(&self) -> Result<(), ContextError> {
        if self.max_tokens == 0 {
            return Err(ContextError::InvalidConfig {
                reason: "max_tokens must be positive".to_string(),
            });
        }
        if self.reserved_for_response >= self.max_tokens {
            return Err(ContextError::InvalidConfig {
                reason: format!(
                    "reserved_for_response ({}) must be less than max_tokens ({})",
                    self.reserved_for_response, self.max_tokens
                ),
            });
        }
        for (name, ratio) in [
            ("compression_start_ratio", self.compression_start_ratio),
            ("prune_target_ratio", self.prune_target_ratio),
        ] {
            if !(ratio > 0.0 && ratio <= 1.0) {
                return Err(ContextError::InvalidConfig {
                    reason: format!("{name} ({ratio}) must be in (0, 1]"),
                });
            }
        }
        if self.prune_target_ratio > self.compression_start_ratio {
            return Err(ContextError::InvalidConfig {
                reason: format!(
                    "prune_target_ratio ({}) must not exceed compression_start_ratio ({})",
                    self.prune_target_ratio, self.compression_start_ratio
                ),
            });
        }
        if self.decay_half_life_hours <= 0.0 {
            return Err(ContextError::InvalidConfig {
                reason: format!(
                    "decay_half_life_hours ({}) must be positive",
                    self.decay_half_life_hours
                ),
            });
        }
        if self.compression_batch_size == 0 {
            return Err(ContextError::InvalidConfig {
                reason: "compression_batch_size must be positive".to_string(),
            });
        }
        Ok(())
    }
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            reserved_for_response: default_reserved_for_response(),
            compression_start_ratio: default_compression_start_ratio(),
            prune_target_ratio: default_prune_target_ratio(),
            min_entries_to_keep: default_min_entries_to_keep(),
            decay_half_life_hours: default_decay_half_life_hours(),
            compression_batch_size: default_compression_batch_size(),
        }
    }
}

fn default_max_tokens() -> usize {
    200_000
}

fn default_reserved_for_response() -> usize {
    8_192
}

fn default_compression_start_ratio() -> f64 {
    0.7
}

fn default_prune_target_ratio() -> f64 {
    0.5
}

fn default_min_entries_to_keep() -> usize {
    2
}

fn default_decay_half_life_hours() -> f64 {
    24.0
}

fn default_compression_batch_size() -> usize {
    5
}
