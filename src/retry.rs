// src/retry.rs

//! Bounded retry with a fixed delay
//!
//! Used for the operations that talk to flaky infrastructure: koji artifact
//! downloads and the installed-package conflict query. There is no backoff
//! growth; every attempt waits the same amount of time.

use crate::error::Result;
use std::time::Duration;
use tracing::warn;

/// Fixed-delay retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first one
    pub attempts: u32,
    /// Pause between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    /// Create a policy; `attempts` is clamped to at least one
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }

    /// Run `op` until it succeeds, `should_retry` rejects the error, or the
    /// attempts run out. The last error is returned on exhaustion.
    pub fn run<T, F, P>(&self, what: &str, should_retry: P, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
        P: Fn(&crate::Error) -> bool,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(e) if attempt < self.attempts && should_retry(&e) => {
                    warn!("{} failed: {}/{}: {}", what, attempt, self.attempts, e);
                    if !self.delay.is_zero() {
                        std::thread::sleep(self.delay);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }
}
