//! Retry with exponential backoff for transient failures.
//!
//! This module owns the only `sleep` in the codebase. Everything else
//! expresses retryability through [`Error::is_transient`]; wrapping a closure
//! here is how an operation opts in.

use std::time::Duration;

use crate::error::{Error, Result};

/// Backoff schedule: `interval(i) = min(base * 2^i + jitter, max)` with
/// jitter drawn uniformly from `[0, 10s)`.
#[derive(Debug, Clone, Copy)]
pub struct Backoff {
    pub base: Duration,
    pub max: Duration,
}

impl Default for Backoff {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(5),
            max: Duration::from_secs(64),
        }
    }
}

const JITTER_CAP_MILLIS: u128 = 10_000;

impl Backoff {
    pub fn interval(&self, attempt: u32) -> Duration {
        let exp = self
            .base
            .checked_mul(1u32 << attempt.min(16))
            .unwrap_or(self.max);
        let with_jitter = exp + jitter();
        with_jitter.min(self.max)
    }
}

/// Uniform-ish jitter from the clock's sub-second noise. The teacher stack
/// carries no RNG crate and the schedule only needs de-synchronization, not
/// statistical quality.
fn jitter() -> Duration {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u128)
        .unwrap_or(0);
    Duration::from_millis((nanos % JITTER_CAP_MILLIS) as u64)
}

/// Run `f` up to `attempts` times, sleeping between transient failures.
/// Non-transient errors and the final transient error pass straight through.
pub fn with_backoff<T>(
    what: &str,
    attempts: u32,
    backoff: Backoff,
    mut f: impl FnMut() -> Result<T>,
) -> Result<T> {
    let attempts = attempts.max(1);
    let mut last: Option<Error> = None;
    for attempt in 0..attempts {
        if attempt > 0 {
            let pause = backoff.interval(attempt - 1);
            log::info!(
                "{what}: attempt {}/{attempts} after {:.1}s",
                attempt + 1,
                pause.as_secs_f32()
            );
            std::thread::sleep(pause);
        }
        match f() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt + 1 < attempts => {
                log::warn!("{what}: transient failure: {e}");
                last = Some(e);
            }
            Err(e) => return Err(e),
        }
    }
    // Unreachable unless attempts was 0-clamped and f never ran; keep the
    // stored error for completeness.
    Err(last.unwrap_or_else(|| Error::Transient(format!("{what}: retries exhausted"))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> Error {
        Error::Transient("fetch: connection reset".into())
    }

    #[test]
    fn succeeds_first_try_without_sleeping() {
        let calls = AtomicU32::new(0);
        let out = with_backoff("op", 3, Backoff::default(), || {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(7)
        })
        .unwrap();
        assert_eq!(out, 7);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn retries_transient_until_success() {
        let calls = AtomicU32::new(0);
        let backoff = Backoff {
            base: Duration::from_millis(1),
            max: Duration::from_millis(2),
        };
        let out = with_backoff("op", 3, backoff, || {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(transient())
            } else {
                Ok("done")
            }
        })
        .unwrap();
        assert_eq!(out, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn permanent_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let err = with_backoff("op", 3, Backoff::default(), || -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(Error::NotFound("ref".into()))
        })
        .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn exhausted_retries_return_last_transient() {
        let calls = AtomicU32::new(0);
        let backoff = Backoff {
            base: Duration::from_millis(1),
            max: Duration::from_millis(1),
        };
        let err = with_backoff("op", 2, backoff, || -> Result<()> {
            calls.fetch_add(1, Ordering::SeqCst);
            Err(transient())
        })
        .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn interval_caps_at_max() {
        let backoff = Backoff {
            base: Duration::from_secs(5),
            max: Duration::from_secs(64),
        };
        assert!(backoff.interval(10) <= Duration::from_secs(64));
        assert!(backoff.interval(0) >= Duration::from_secs(5));
    }
}
