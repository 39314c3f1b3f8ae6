// Copyright (c) 2025 Varshith Gudur. Licensed under AGPLv3.
//! Store retry policy.
//!
//! # Classification
//! - 429 / 503 / 408 / 500 / 504: transient, retried with backoff
//! - 413: `PayloadTooLarge`, never retried
//! - 404: `NotFound`, the store error passed through untouched
//! - anything else: `Store` with the operation name, never retried
//!
//! Backoff honors the store's `retry_after` hint when present, else
//! `base_delay * 2^attempt` capped at `max_delay`. Cancellation is checked
//! before every attempt and races the backoff sleep.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::errors::{BrookError, BrookResult};
use crate::storage::{StoreError, StoreStatus};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
    max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
            max_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, config.base_delay(), config.max_delay())
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Delay before retry number `attempt` (0-based).
    pub fn backoff(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        if let Some(hint) = hint {
            return hint.min(self.max_delay);
        }
        let factor = 1u32.checked_shl(attempt).unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op` until it succeeds, fails fatally, exhausts the retry budget
    /// or `cancel` fires.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut op: F,
    ) -> BrookResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, StoreError>>,
    {
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_cancelled() {
                return Err(BrookError::Cancelled);
            }

            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err.status {
                StoreStatus::PayloadTooLarge => {
                    return Err(BrookError::PayloadTooLarge {
                        operation: operation.to_string(),
                        source: err,
                    })
                }
                StoreStatus::NotFound => return Err(BrookError::NotFound(err)),
                status if !status.is_transient() => {
                    return Err(BrookError::Store {
                        operation: operation.to_string(),
                        source: err,
                    })
                }
                _ => {}
            }

            if attempt >= self.max_retries {
                tracing::warn!(
                    operation,
                    attempts = attempt + 1,
                    error = %err,
                    "retry budget exhausted"
                );
                return Err(BrookError::TransientStoreFailure {
                    operation: operation.to_string(),
                    attempts: attempt + 1,
                    source: err,
                });
            }

            let delay = self.backoff(attempt, err.retry_after);
            attempt += 1;

            tracing::debug!(
                operation,
                attempt,
                backoff_ms = delay.as_millis() as u64,
                status = %err.status,
                "retrying after backoff"
            );
            metrics::increment_counter!("brook_store_retries_total", "operation" => operation.to_string());

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(BrookError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}
