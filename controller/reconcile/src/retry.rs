//! Bounded retries with exponential backoff and jitter.
//!
//! Only errors matching a caller-supplied predicate are retried; anything
//! else is returned immediately.

use rand::Rng;
use std::time::Duration;
use tracing::{debug, warn};

#[derive(Clone, Debug, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one.
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 8,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(20),
            backoff_multiplier: 2.0,
        }
    }
}

/// Runs `operation` until it succeeds, fails with an error `is_retryable`
/// rejects, or the attempts are exhausted. The last error is returned.
pub async fn retry_if<F, Fut, T, E, P>(
    config: &RetryConfig,
    operation_name: &str,
    is_retryable: P,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        let error = match operation().await {
            Ok(result) => return Ok(result),
            Err(error) => error,
        };

        if !is_retryable(&error) {
            debug!(operation = %operation_name, attempt, %error, "Operation failed");
            return Err(error);
        }
        if attempt >= config.max_attempts {
            warn!(operation = %operation_name, attempt, %error, "Operation failed after max retries");
            return Err(error);
        }

        let jitter = rand::thread_rng().gen_range(0.5..1.5);
        let jittered = Duration::from_secs_f64(delay.as_secs_f64() * jitter);
        debug!(
            operation = %operation_name,
            attempt,
            %error,
            delay_ms = jittered.as_millis(),
            "Operation failed, retrying"
        );
        tokio::time::sleep(jittered).await;

        delay = Duration::from_secs_f64(
            (delay.as_secs_f64() * config.backoff_multiplier).min(config.max_delay.as_secs_f64()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{
        atomic::{AtomicU32, Ordering},
        Arc,
    };

    fn config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            max_attempts,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            backoff_multiplier: 2.0,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_retryable_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let result: Result<i32, &str> = retry_if(&config(5), "op", |e| *e == "lag", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err("lag")
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result, Ok(42));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn does_not_retry_other_errors() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let result: Result<i32, &str> = retry_if(&config(5), "op", |e| *e == "lag", || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("denied")
            }
        })
        .await;

        assert_eq!(result, Err("denied"));
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_max_attempts() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let result: Result<i32, &str> = retry_if(&config(3), "op", |_| true, || {
            let c = c.clone();
            async move {
                c.fetch_add(1, Ordering::SeqCst);
                Err("lag")
            }
        })
        .await;

        assert_eq!(result, Err("lag"));
        assert_eq!(count.load(Ordering::SeqCst), 3);
    }
}
