//! Pluggable content compression

use async_trait::async_trait;

/// Marker spliced between the retained head and tail of truncated content.
pub const OMISSION_MARKER: &str = "\n[... content omitted ...]\n";

/// A capability that shrinks text while preserving meaning.
///
/// Returning `None` means "no compression available" and is never an error;
/// the entry stays uncompressed and becomes an eviction candidate instead.
/// Implementations must not mutate their input and must be safe to call
/// repeatedly. This may be a remote call; the capacity pass invokes it
/// without holding the window lock.
#[async_trait]
pub trait Compressor: Send + Sync {
    async fn compress(&self, text: &str) -> Option<String>;

    /// Compressor name for logging.
    fn name(&self) -> &str;
}

/// Built-in structural fallback used when no smarter compressor is
/// configured: keeps a prefix and suffix of the content joined by
/// [`OMISSION_MARKER`], sized so the result is at most half the original.
#[derive(Debug, Clone, Default)]
pub struct HeadTailCompressor;

impl HeadTailCompressor {
    /// Synchronous core, shared with the async trait impl. Returns `None`
    /// when the text is too short to shrink meaningfully.
    pub fn compress_text(&self, text: &str) -> Option<String> {
        let total_chars = text.chars().count();
        let marker_chars = OMISSION_MARKER.chars().count();

        let max_result = total_chars / 2;
        if max_result <= marker_chars + 1 {
            return None;
        }

        let keep_total = max_result - marker_chars;
        let head_chars = keep_total / 2;
        let tail_chars = keep_total - head_chars;
        if head_chars == 0 || tail_chars == 0 {
            return None;
        }

        let head_end = char_boundary(text, head_chars);
        let tail_start = char_boundary(text, total_chars - tail_chars);

        let mut result =
            String::with_capacity(head_end + OMISSION_MARKER.len() + (text.len() - tail_start));
        result.push_str(&text[..head_end]);
        result.push_str(OMISSION_MARKER);
        result.push_str(&text[tail_start..]);
        Some(result)
    }
}

#[async_trait]
impl Compressor for HeadTailCompressor {
    async fn compress(&self, text: &str) -> Option<String> {
        self.compress_text(text)
    }

    fn name(&self) -> &str {
        "head_tail"
    }
}

/// Byte offset of the `n`-th char of `text` (or the end of the string).
fn char_boundary(text: &str, n: usize) -> usize {
    text.char_indices()
        .nth(n)
        .map(|(idx, _)| idx)
        .unwrap_or(text.len())
}
