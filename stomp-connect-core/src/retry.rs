//! Reconnect retry policy.
//!
//! Connection attempts are retried with a fixed delay between attempts. By
//! default there is no attempt ceiling: the broker is assumed to become
//! reachable eventually, and sustained unavailability only shows up as
//! repeated debug-level log lines.

use crate::{ConnectorError, ConnectorResult};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Delay used between connection attempts unless configured otherwise
pub const DEFAULT_RECONNECT_DELAY: Duration = Duration::from_secs(2);

/// Fixed-delay retry policy for broker connection attempts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    delay: Duration,
    max_attempts: Option<u32>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::forever(DEFAULT_RECONNECT_DELAY)
    }
}

impl RetryPolicy {
    /// Retry forever, sleeping `delay` between attempts
    pub fn forever(delay: Duration) -> Self {
        Self {
            delay,
            max_attempts: None,
        }
    }

    /// Give up after `max_attempts` failed attempts
    pub fn bounded(delay: Duration, max_attempts: u32) -> Self {
        Self {
            delay,
            max_attempts: Some(max_attempts.max(1)),
        }
    }

    /// Retry forever without sleeping (tests)
    pub fn immediate() -> Self {
        Self::forever(Duration::ZERO)
    }

    /// Set the attempt ceiling (builder pattern)
    pub fn with_max_attempts(mut self, max_attempts: Option<u32>) -> Self {
        self.max_attempts = max_attempts.map(|n| n.max(1));
        self
    }

    /// Delay between two consecutive attempts
    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Attempt ceiling, `None` when retrying forever
    pub fn max_attempts(&self) -> Option<u32> {
        self.max_attempts
    }

    /// Whether another attempt is allowed after `attempts` failures
    pub fn should_retry(&self, attempts: u32) -> bool {
        match self.max_attempts {
            Some(max) => attempts < max,
            None => true,
        }
    }

    /// Sleep for one delay; fails with [`ConnectorError::Shutdown`] if
    /// `shutdown` is cancelled first
    pub async fn wait(&self, shutdown: &CancellationToken) -> ConnectorResult<()> {
        tokio::select! {
            _ = shutdown.cancelled() => Err(ConnectorError::Shutdown),
            _ = tokio::time::sleep(self.delay) => Ok(()),
        }
    }
}
