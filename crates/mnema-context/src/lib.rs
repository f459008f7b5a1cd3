//! Mnema Context - Context window management
//!
//! This crate decides what the assistant's next model call is allowed to see:
//! - Bounded entry storage with incremental token accounting
//! - Priority-aware eviction and compress-before-evict capacity management
//! - Relevance-ranked retrieval (recency decay + lexical query overlap)
//! - Pluggable token estimation and content compression
//!
//! One [`ContextWindow`] per conversation; wrap it in [`SharedContextWindow`]
//! to share across tasks or to plug in an external compressor.

mod capacity;
mod compress;
mod config;
mod error;
mod estimate;
mod score;
mod shared;
mod store;
mod types;
mod window;

pub use capacity::{CapacityReport, CapacityStatus};
pub use compress::{Compressor, HeadTailCompressor, OMISSION_MARKER};
pub use config::WindowConfig;
pub use error::ContextError;
pub use estimate::{CharRatioEstimator, TokenEstimator};
pub use score::RelevanceScorer;
pub use shared::SharedContextWindow;
pub use types::{ContextEntry, EntryId, EntrySource, PriorityClass};
pub use window::{
    ContextBuild, ContextQuery, ContextWindow, WindowSnapshot, WindowStatistics,
    CONTEXT_SEPARATOR,
};
