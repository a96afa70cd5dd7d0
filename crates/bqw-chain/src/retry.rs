//! Bounded exponential retry for warehouse calls
//!
//! Every remote call made by the chain goes through [`with_retry`]: each
//! attempt is bounded by a timeout, transient errors are retried with
//! exponential backoff, and anything else fails on the first attempt.

use backon::{ExponentialBuilder, Retryable};
use bqw_core::ChainConfig;
use bqw_db::{DbError, DbResult};
use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Retry settings shared by dataset creation and view upserts
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_backoff: Duration,
    max_backoff: Duration,
    timeout: Duration,
}

impl RetryPolicy {
    /// `max_attempts` counts the first try; values below 1 are treated as 1.
    pub fn new(
        max_attempts: u32,
        initial_backoff: Duration,
        max_backoff: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            initial_backoff,
            max_backoff: max_backoff.max(initial_backoff),
            timeout,
        }
    }

    pub fn from_config(config: &ChainConfig) -> Self {
        Self::new(
            config.max_attempts,
            config.initial_backoff(),
            config.max_backoff(),
            config.timeout(),
        )
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(self.max_backoff)
            .with_max_times((self.max_attempts - 1) as usize)
            .with_jitter()
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&ChainConfig::default())
    }
}

/// The last error of a call that never succeeded
#[derive(Debug)]
pub struct RetryFailure {
    pub error: DbError,
    pub attempts: u32,
    /// Retries stopped early because the run was cancelled
    pub cancelled: bool,
}

enum AttemptError {
    Db(DbError),
    /// Cancelled while backing off; the next attempt was never sent
    Cancelled,
}

/// Run `call` until it succeeds, fails permanently, or runs out of attempts.
///
/// `label` names the call in retry warnings. Once `cancel` fires no new
/// attempt is started; an attempt already in flight runs to completion.
/// A call abandoned that way reports `cancelled` with the last error seen.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    label: &str,
    cancel: &CancellationToken,
    mut call: F,
) -> Result<T, RetryFailure>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = DbResult<T>>,
{
    let attempts = AtomicU32::new(0);
    let timeout = policy.timeout;
    let mut last_error: Option<DbError> = None;

    let result = (|| {
        let attempt = if attempts.load(Ordering::Relaxed) > 0 && cancel.is_cancelled() {
            None
        } else {
            attempts.fetch_add(1, Ordering::Relaxed);
            Some(call())
        };
        async move {
            let fut = attempt.ok_or(AttemptError::Cancelled)?;
            match tokio::time::timeout(timeout, fut).await {
                Ok(result) => result.map_err(AttemptError::Db),
                Err(_) => Err(AttemptError::Db(DbError::Timeout(format!(
                    "no response within {}s",
                    timeout.as_secs_f32()
                )))),
            }
        }
    })
    .retry(policy.backoff())
    .when(|e: &AttemptError| match e {
        AttemptError::Db(err) => err.is_transient() && !cancel.is_cancelled(),
        AttemptError::Cancelled => false,
    })
    .notify(|e: &AttemptError, delay: Duration| {
        if let AttemptError::Db(err) = e {
            log::warn!(
                "{} failed: {}. Retrying in {:.2}s",
                label,
                err,
                delay.as_secs_f32()
            );
            last_error = Some(err.clone());
        }
    })
    .await;

    let attempts = attempts.load(Ordering::Relaxed);
    match result {
        Ok(value) => Ok(value),
        Err(AttemptError::Db(error)) => {
            let cancelled =
                error.is_transient() && cancel.is_cancelled() && attempts < policy.max_attempts;
            if cancelled {
                log::info!("{}: not retrying, run cancelled", label);
            }
            Err(RetryFailure {
                error,
                attempts,
                cancelled,
            })
        }
        Err(AttemptError::Cancelled) => {
            log::info!("{}: not retrying, run cancelled", label);
            Err(RetryFailure {
                error: last_error.unwrap_or_else(|| {
                    DbError::Unavailable("cancelled before the call was sent".to_string())
                }),
                attempts,
                cancelled: true,
            })
        }
    }
}
