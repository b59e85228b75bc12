//! Retry decorator for warehouse connections.
//!
//! Wraps any `Warehouse` and re-runs statements that failed at the
//! connection level. Before each new attempt the session is probed and, if
//! dead, replaced. Errors the predicate rejects (syntax, semantics, missing
//! objects) are returned on the first occurrence.

use super::{QueryResult, Warehouse};
use crate::error::{Result, TransformationError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

/// Base delay between retry attempts (doubles each retry).
const RETRY_BASE_DELAY_MS: u64 = 500;

/// When and how often a failed statement is attempted again.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per statement, including the first one.
    pub max_attempts: u32,
    /// Delay before the second attempt; doubled for each later one.
    pub base_delay: Duration,
    /// Decides whether an error is worth another attempt.
    pub retryable: fn(&TransformationError) -> bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::fail_fast()
    }
}

impl RetryPolicy {
    /// A single attempt, no retries.
    pub fn fail_fast() -> Self {
        Self {
            max_attempts: 1,
            base_delay: Duration::from_millis(RETRY_BASE_DELAY_MS),
            retryable: TransformationError::is_transient,
        }
    }

    /// Sets the total number of attempts (at least one).
    pub fn with_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Sets the delay before the second attempt.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }
}

/// A warehouse that retries transient failures of the wrapped connection.
#[derive(Debug)]
pub struct RetryingWarehouse<W> {
    inner: W,
    policy: RetryPolicy,
}

impl<W: Warehouse> RetryingWarehouse<W> {
    /// Wraps `inner` with the given policy.
    pub fn new(inner: W, policy: RetryPolicy) -> Self {
        Self { inner, policy }
    }

    /// Returns the wrapped connection.
    pub fn inner(&self) -> &W {
        &self.inner
    }

    async fn recover(&self) {
        match self.inner.ping().await {
            Ok(()) => debug!("Connection is alive, retrying statement"),
            Err(e) => {
                warn!("Connection is dead ({}), reconnecting", e);
                if let Err(e) = self.inner.reconnect().await {
                    warn!("Reconnect failed: {}", e);
                }
            }
        }
    }
}

#[async_trait]
impl<W: Warehouse> Warehouse for RetryingWarehouse<W> {
    async fn execute(&self, sql: &str) -> Result<QueryResult> {
        let mut delay = self.policy.base_delay;
        let mut attempt = 1;

        loop {
            match self.inner.execute(sql).await {
                Ok(result) => return Ok(result),
                Err(e) if attempt < self.policy.max_attempts && (self.policy.retryable)(&e) => {
                    warn!(
                        "Statement attempt {} of {} failed (transient error), retrying in {:?}: {}",
                        attempt, self.policy.max_attempts, delay, e
                    );
                    tokio::time::sleep(delay).await;
                    delay *= 2; // Exponential backoff
                    self.recover().await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn ping(&self) -> Result<()> {
        self.inner.ping().await
    }

    async fn reconnect(&self) -> Result<()> {
        self.inner.reconnect().await
    }

    async fn close(&self) -> Result<()> {
        self.inner.close().await
    }
}
