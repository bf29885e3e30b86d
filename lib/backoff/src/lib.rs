//! `tokio-retry` crate
//! MIT License
//! Copyright (c) 2017 Sam Rijs
//!

use std::future::Future;
use std::time::Duration;

/// A wait strategy driven by exponential back-off.
///
/// Every call to `next` hands out the current delay and doubles it for the
/// following call, until `max` is reached. `reset` starts over from `init`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    init: Duration,
    max: Duration,
    current: Duration,
}

impl ExponentialBackoff {
    /// Constructs a new exponential back-off strategy which starts at `init`
    /// and never waits longer than `max`.
    pub const fn new(init: Duration, max: Duration) -> ExponentialBackoff {
        ExponentialBackoff {
            init,
            max,
            current: init,
        }
    }

    pub const fn from_millis(init: u64, max: u64) -> ExponentialBackoff {
        Self::new(Duration::from_millis(init), Duration::from_millis(max))
    }

    /// The delay the next wait will use.
    #[inline]
    pub fn current(&self) -> Duration {
        self.current.min(self.max)
    }

    /// The next `Duration` to wait for.
    pub fn next(&mut self) -> Duration {
        let duration = self.current();

        self.current = self.current.saturating_mul(2).min(self.max);

        duration
    }

    pub fn reset(&mut self) {
        self.current = self.init
    }

    pub async fn wait(&mut self) {
        let duration = self.next();
        tokio::time::sleep(duration).await
    }

    /// Wait for the next delay, or until `signal` resolves, whichever comes
    /// first. Returns `false` if the wait was interrupted by `signal`.
    pub async fn wait_until<F>(&mut self, signal: F) -> bool
    where
        F: Future,
    {
        let duration = self.next();

        tokio::select! {
            biased;

            _ = signal => false,
            _ = tokio::time::sleep(duration) => true,
        }
    }
}
