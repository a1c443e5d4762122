use crate::errors::ServiceError;
use sea_orm::DbErr;
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Configuration for retry behavior
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Factor to multiply delay by after each attempt
    pub backoff_factor: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(5),
            backoff_factor: 2.0,
        }
    }
}

/// Retry policy for determining if an error is retryable
pub trait RetryPolicy<E> {
    fn is_retryable(&self, error: &E) -> bool;
}

/// Retries connection-level failures and lock/serialization conflicts.
pub struct DbRetryPolicy;

impl RetryPolicy<DbErr> for DbRetryPolicy {
    fn is_retryable(&self, error: &DbErr) -> bool {
        match error {
            DbErr::ConnectionAcquire(_) | DbErr::Conn(_) => true,
            DbErr::Exec(err) | DbErr::Query(err) => {
                let message = err.to_string().to_ascii_lowercase();
                message.contains("database is locked")
                    || message.contains("deadlock")
                    || message.contains("could not serialize")
            }
            _ => false,
        }
    }
}

/// Service-level policy: lost optimistic-lock races plus transient database errors.
pub struct ServiceRetryPolicy;

impl RetryPolicy<ServiceError> for ServiceRetryPolicy {
    fn is_retryable(&self, error: &ServiceError) -> bool {
        match error {
            ServiceError::ConcurrentModification(_) => true,
            ServiceError::DatabaseError(db_err) => DbRetryPolicy.is_retryable(db_err),
            _ => false,
        }
    }
}

/// Execute an async function with retries
pub async fn with_retry<F, Fut, T, E>(
    config: &RetryConfig,
    policy: impl RetryPolicy<E>,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut delay = config.initial_delay;
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    debug!("Operation succeeded after {} attempts", attempts);
                }
                return Ok(result);
            }
            Err(error) => {
                if attempts >= config.max_attempts || !policy.is_retryable(&error) {
                    if attempts > 1 {
                        warn!("Operation failed after {} attempts: {}", attempts, error);
                    }
                    return Err(error);
                }

                warn!(
                    "Attempt {} failed: {}. Retrying in {:?}...",
                    attempts, error, delay
                );

                sleep(delay).await;

                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_factor)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use uuid::Uuid;

    fn fast_config() -> RetryConfig {
        RetryConfig {
            max_attempts: 3,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            backoff_factor: 2.0,
        }
    }

    #[tokio::test]
    async fn retries_concurrent_modification_until_success() {
        let calls = AtomicU32::new(0);
        let result = with_retry(&fast_config(), ServiceRetryPolicy, || async {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Err(ServiceError::ConcurrentModification(Uuid::nil()))
            } else {
                Ok(42)
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ServiceError> =
            with_retry(&fast_config(), ServiceRetryPolicy, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::ConcurrentModification(Uuid::nil()))
            })
            .await;

        assert!(matches!(
            result,
            Err(ServiceError::ConcurrentModification(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn business_errors_are_not_retried() {
        let calls = AtomicU32::new(0);
        let result: Result<(), ServiceError> =
            with_retry(&fast_config(), ServiceRetryPolicy, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(ServiceError::ValidationError("bad".into()))
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn db_policy_ignores_missing_records() {
        assert!(!DbRetryPolicy.is_retryable(&DbErr::RecordNotFound("x".into())));
        assert!(!DbRetryPolicy.is_retryable(&DbErr::Custom("x".into())));
    }
}
