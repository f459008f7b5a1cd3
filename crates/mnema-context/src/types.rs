//! Entry model for the context window

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Opaque identifier for a context entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntryId(Uuid);

impl EntryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EntryId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EntryId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Where a piece of context material came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EntrySource {
    User,
    Assistant,
    System,
    Document,
    Code,
    SearchResult,
    Web,
    Memory,
    Tool,
    Action,
    Error,
}

impl EntrySource {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
            Self::Document => "document",
            Self::Code => "code",
            Self::SearchResult => "search-result",
            Self::Web => "web",
            Self::Memory => "memory",
            Self::Tool => "tool",
            Self::Action => "action",
            Self::Error => "error",
        }
    }

    pub fn from_str_lossy(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "user" => Self::User,
            "assistant" => Self::Assistant,
            "system" => Self::System,
            "document" => Self::Document,
            "code" => Self::Code,
            "search-result" | "search_result" => Self::SearchResult,
            "web" => Self::Web,
            "memory" => Self::Memory,
            "action" => Self::Action,
            "error" => Self::Error,
            _ => Self::Tool,
        }
    }
}

impl std::fmt::Display for EntrySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Eviction-order category. `Critical` entries are never evicted and never
/// compressed automatically; removing them takes an explicit caller action.
///
/// Variant order defines `Ord`: `Minimal` is the first to go.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum PriorityClass {
    Minimal,
    Low,
    #[default]
    Normal,
    High,
    Critical,
}

impl PriorityClass {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Minimal => "minimal",
            Self::Low => "low",
            Self::Normal => "normal",
            Self::High => "high",
            Self::Critical => "critical",
        }
    }
}

impl std::fmt::Display for PriorityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One retained unit of conversational material.
///
/// `content` is immutable once created; compression stores its replacement in
/// `compressed_content` and the store keeps the running total consistent with
/// whichever text is effective.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub id: EntryId,
    pub content: String,
    pub compressed_content: Option<String>,
    /// Token estimate of `compressed_content`, computed once at compression.
    pub compressed_tokens: Option<usize>,
    pub source: EntrySource,
    pub priority: PriorityClass,
    /// Caller-supplied retrieval weight in [0, 1]. Independent of `priority`:
    /// priority governs eviction order, relevance governs retrieval ranking.
    pub base_relevance: f64,
    /// Estimate of `content`, computed once when the entry is added.
    pub token_count: usize,
    pub created_at: DateTime<Utc>,
    pub is_active: bool,
    /// Set once automatic compression has been tried, whether or not it
    /// produced a result. Attempted entries are never auto-retried.
    pub compression_attempted: bool,
}

impl ContextEntry {
    pub fn new(content: impl Into<String>, source: EntrySource) -> Self {
        Self {
            id: EntryId::new(),
            content: content.into(),
            compressed_content: None,
            compressed_tokens: None,
            source,
            priority: PriorityClass::Normal,
            base_relevance: 1.0,
            token_count: 0,
            created_at: Utc::now(),
            is_active: true,
            compression_attempted: false,
        }
    }

    pub fn with_priority(mut self, priority: PriorityClass) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_relevance(mut self, relevance: f64) -> Self {
        self.base_relevance = relevance.clamp(0.0, 1.0);
        self
    }

    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn is_critical(&self) -> bool {
        self.priority == PriorityClass::Critical
    }

    pub fn is_compressed(&self) -> bool {
        self.compressed_content.is_some()
    }

    /// Compressed text if present, original otherwise.
    pub fn effective_content(&self) -> &str {
        self.compressed_content.as_deref().unwrap_or(&self.content)
    }

    /// Token estimate of the effective text.
    pub fn effective_token_count(&self) -> usize {
        self.compressed_tokens.unwrap_or(self.token_count)
    }

    pub fn age_hours(&self, now: DateTime<Utc>) -> f64 {
        let seconds = (now - self.created_at).num_milliseconds() as f64 / 1000.0;
        (seconds / 3600.0).max(0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn entry_builder_defaults() {
        let entry = ContextEntry::new("hello", EntrySource::User);
        assert_eq!(entry.priority, PriorityClass::Normal);
        assert_eq!(entry.base_relevance, 1.0);
        assert!(entry.is_active);
        assert!(!entry.is_compressed());
        assert_eq!(entry.effective_content(), "hello");
    }

    #[test]
    fn entry_builder_clamps_relevance() {
        let entry = ContextEntry::new("x", EntrySource::Tool).with_relevance(3.0);
        assert_eq!(entry.base_relevance, 1.0);
        let entry = ContextEntry::new("x", EntrySource::Tool).with_relevance(-1.0);
        assert_eq!(entry.base_relevance, 0.0);
    }

    #[test]
    fn priority_ordering() {
        assert!(PriorityClass::Minimal < PriorityClass::Low);
        assert!(PriorityClass::Low < PriorityClass::Normal);
        assert!(PriorityClass::Normal < PriorityClass::High);
        assert!(PriorityClass::High < PriorityClass::Critical);
    }

    #[test]
    fn effective_content_prefers_compressed() {
        let mut entry = ContextEntry::new("original text", EntrySource::Document);
        entry.compressed_content = Some("short".to_string());
        entry.compressed_tokens = Some(2);
        entry.token_count = 10;
        assert_eq!(entry.effective_content(), "short");
        assert_eq!(entry.effective_token_count(), 2);
    }

    #[test]
    fn age_is_non_negative() {
        let now = Utc::now();
        let entry = ContextEntry::new("x", EntrySource::User).with_created_at(now + Duration::hours(1));
        assert_eq!(entry.age_hours(now), 0.0);

        let entry = ContextEntry::new("x", EntrySource::User).with_created_at(now - Duration::hours(2));
        assert!((entry.age_hours(now) - 2.0).abs() < 1e-6);
    }

    #[test]
    fn source_roundtrip() {
        for src in [
            EntrySource::User,
            EntrySource::Assistant,
            EntrySource::System,
            EntrySource::Document,
            EntrySource::Code,
            EntrySource::SearchResult,
            EntrySource::Web,
            EntrySource::Memory,
            EntrySource::Tool,
            EntrySource::Action,
            EntrySource::Error,
        ] {
            assert_eq!(EntrySource::from_str_lossy(src.as_str()), src);
        }
    }

    #[test]
    fn entry_serde_roundtrip() {
        let entry = ContextEntry::new("serialize me", EntrySource::Memory)
            .with_priority(PriorityClass::High)
            .with_relevance(0.4);
        let json = serde_json::to_string(&entry).unwrap();
        let parsed: ContextEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, entry.id);
        assert_eq!(parsed.priority, PriorityClass::High);
        assert_eq!(parsed.base_relevance, 0.4);
    }
}
