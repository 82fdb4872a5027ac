//! # Retry Backoff
//!
//! Delay before re-running a failed export.
//!
//! ## Schedule (base 1s, max 30s)
//! ```text
//! attempt:   0     1     2     3     4     5+
//! exp (ms):  1000  2000  4000  8000  16000 30000 (capped)
//! jitter:    + uniform [0, 20%) of exp, result re-capped at max
//!
//! retry-after hint (429): round(secs × 1000) clamped to [0, max],
//!                         replaces the schedule entirely
//! ```

use std::time::Duration;

/// Attempts above this are treated as this (keeps `2^attempt` finite).
const MAX_ATTEMPT: u32 = 20;

/// Jitter as a fraction of the exponential delay.
const JITTER_FRACTION: f64 = 0.2;

/// Backoff delay in milliseconds with random jitter.
///
/// ```rust
/// use ironstock_sync::backoff::compute_backoff_ms;
///
/// assert_eq!(compute_backoff_ms(3, 1000, 30000, Some(10.0)), 10000);
/// assert!(compute_backoff_ms(100, 1000, 30000, None) <= 30000);
/// ```
pub fn compute_backoff_ms(
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    retry_after_secs: Option<f64>,
) -> u64 {
    compute_backoff_ms_with_jitter(attempt, base_ms, max_ms, retry_after_secs, rand::random())
}

/// Same as [`compute_backoff_ms`] with the jitter draw supplied (`unit` in
/// `[0, 1)`).
pub fn compute_backoff_ms_with_jitter(
    attempt: u32,
    base_ms: u64,
    max_ms: u64,
    retry_after_secs: Option<f64>,
    unit: f64,
) -> u64 {
    let max = max_ms as f64;

    if let Some(secs) = retry_after_secs.filter(|s| s.is_finite() && *s > 0.0) {
        return (secs * 1000.0).round().clamp(0.0, max) as u64;
    }

    let attempt = attempt.min(MAX_ATTEMPT);
    let exp = max.min(base_ms as f64 * 2f64.powi(attempt as i32));
    let unit = if unit.is_finite() { unit.clamp(0.0, 1.0) } else { 0.0 };
    let jitter = exp * JITTER_FRACTION * unit;

    max.min(exp + jitter).round() as u64
}

/// Backoff parameters carried by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BackoffPolicy {
    pub base_ms: u64,
    pub max_ms: u64,
}

impl BackoffPolicy {
    pub fn new(base_ms: u64, max_ms: u64) -> Self {
        BackoffPolicy { base_ms, max_ms }
    }

    /// Delay for the given consecutive-failure count.
    pub fn delay(&self, attempt: u32, retry_after_secs: Option<f64>) -> Duration {
        Duration::from_millis(compute_backoff_ms(
            attempt,
            self.base_ms,
            self.max_ms,
            retry_after_secs,
        ))
    }
}
