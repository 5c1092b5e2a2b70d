//! Overlap deduplication for continued generations
//!
//! A continuation is prompted with the tail of what was already delivered,
//! and providers commonly restate that tail verbatim before adding new
//! text. The trailing window remembers the last ~100 characters of
//! delivered output so the restated prefix can be stripped.
//!
//! Detection is an exact-prefix match against the whole window, bounded by
//! the window length. Partial or paraphrased restatements pass through
//! unmodified; that is a known limitation, not a bug to paper over.

/// Default number of trailing characters remembered for overlap detection.
pub const DEFAULT_TAIL_CHARS: usize = 100;

/// Bounded buffer of the last N characters of delivered output.
///
/// The bound is in characters, not bytes, and truncation always lands on a
/// UTF-8 char boundary. The window only exists to detect restart overlap;
/// it never reconstructs history.
#[derive(Debug, Clone)]
pub struct TrailingWindow {
    buf: String,
    cap: usize,
}

impl TrailingWindow {
    pub fn new(cap: usize) -> Self {
        Self {
            buf: String::new(),
            cap,
        }
    }

    /// Append delivered text, discarding everything older than the cap.
    pub fn push(&mut self, text: &str) {
        self.buf.push_str(text);
        let total = self.buf.chars().count();
        if total > self.cap {
            let excess = total - self.cap;
            if let Some((byte_idx, _)) = self.buf.char_indices().nth(excess) {
                self.buf.drain(..byte_idx);
            }
        }
    }

    pub fn as_str(&self) -> &str {
        &self.buf
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}

/// Strip the window text from the front of `new_text` when the continuation
/// restates it exactly; otherwise pass `new_text` through unchanged.
pub fn strip_overlap<'a>(new_text: &'a str, window: &TrailingWindow) -> &'a str {
    let tail = window.as_str();
    if !tail.is_empty() && new_text.starts_with(tail) {
        &new_text[tail.len()..]
    } else {
        new_text
    }
}
