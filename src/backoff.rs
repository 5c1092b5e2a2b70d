//! Retry backoff and error classification
//!
//! The policy is pure over its inputs (aside from the jitter draw): it
//! computes how long to wait before retrying an attempt and decides whether
//! a provider failure is worth retrying on the same model at all.

use std::time::Duration;

use rand::Rng;

use crate::provider::ProviderError;

/// Default maximum attempts per model before falling back to the next one.
pub const DEFAULT_MAX_ATTEMPTS: usize = 4;
/// Default base backoff in milliseconds (doubles each attempt)
pub const DEFAULT_BACKOFF_MS: u64 = 500;
/// Maximum backoff duration in milliseconds (30 seconds)
///
/// Prevents infinite sleep from exponential overflow. With base=500ms,
/// attempt 6 would be 32 seconds and is capped here.
pub const MAX_BACKOFF_MS: u64 = 30_000;

/// Whether a failed attempt is worth retrying on the same model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Expected to resolve: retry in place (buffered) or fall back (streaming).
    Transient,
    /// Not worth retrying on this model; move to the next one.
    Fatal,
}

/// Exponential backoff with bounded jitter, plus transient/fatal triage.
#[derive(Debug, Clone)]
pub struct BackoffPolicy {
    base_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64) -> Self {
        Self { base_ms }
    }

    /// Deterministic component of the delay for a 0-indexed attempt.
    ///
    /// `base * 2^attempt`, saturating, capped at [`MAX_BACKOFF_MS`].
    pub fn base_delay_ms(&self, attempt: usize) -> u64 {
        self.base_ms
            .saturating_mul(2_u64.saturating_pow(attempt.min(u32::MAX as usize) as u32))
            .min(MAX_BACKOFF_MS)
    }

    /// Full delay for a 0-indexed attempt: base plus up to 50% random jitter,
    /// never exceeding [`MAX_BACKOFF_MS`].
    ///
    /// Jitter desynchronizes retries of the same failure across concurrent
    /// callers.
    pub fn delay(&self, attempt: usize) -> Duration {
        let base = self.base_delay_ms(attempt);
        let jitter = rand::rng().random_range(0..=base / 2);
        Duration::from_millis(base.saturating_add(jitter).min(MAX_BACKOFF_MS))
    }

    /// Classify a provider failure.
    ///
    /// Rate limiting, overload/unavailability, transport failures,
    /// interrupted streams, and empty completions are transient; everything
    /// else abandons the current model.
    pub fn classify(&self, error: &ProviderError) -> ErrorClass {
        match error {
            ProviderError::RateLimited { .. }
            | ProviderError::Overloaded { .. }
            | ProviderError::Transport { .. }
            | ProviderError::StreamClosed
            | ProviderError::EmptyCompletion => ErrorClass::Transient,
            ProviderError::Api { .. } | ProviderError::Decode { .. } => ErrorClass::Fatal,
        }
    }
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_MS)
    }
}
