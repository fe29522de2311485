//! Bounded retry for idempotent operations.
//!
//! # Responsibilities
//! - Re-run an operation until it succeeds or the attempt budget is spent
//! - Sleep with capped exponential backoff between attempts
//! - Stop early on shutdown
//!
//! Only idempotent operations belong here: a retried call may repeat work
//! the failed attempt already did.

use std::future::Future;
use thiserror::Error;
use tokio::time::sleep;

use crate::lifecycle::ShutdownListener;
use crate::resilience::backoff::RetryPolicy;

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {last}")]
    Exhausted { attempts: u32, last: E },

    #[error("cancelled by shutdown after {attempts} attempts")]
    Cancelled { attempts: u32 },
}

/// Run `op` until it succeeds, at most `policy.max_attempts` times.
///
/// `on_failure` sees every failed attempt (1-based) before the backoff delay.
pub async fn retry_with_backoff<T, E, F, Fut>(
    policy: &RetryPolicy,
    shutdown: &mut ShutdownListener,
    mut on_failure: impl FnMut(u32, &E),
    mut op: F,
) -> Result<T, RetryError<E>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempts = 0;
    loop {
        if shutdown.is_triggered() {
            return Err(RetryError::Cancelled { attempts });
        }

        attempts += 1;
        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };
        on_failure(attempts, &err);

        if attempts >= policy.max_attempts {
            return Err(RetryError::Exhausted { attempts, last: err });
        }

        tokio::select! {
            _ = sleep(policy.delay_after(attempts)) => {}
            _ = shutdown.recv() => return Err(RetryError::Cancelled { attempts }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::Shutdown;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_delay_ms: 1,
            max_delay_ms: 5,
        }
    }

    #[tokio::test]
    async fn test_succeeds_after_failures() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.subscribe();
        let calls = AtomicU32::new(0);
        let calls = &calls;
        let mut seen = Vec::new();

        let result: Result<u32, RetryError<&str>> = retry_with_backoff(
            &policy(5),
            &mut listener,
            |attempt, _| seen.push(attempt),
            move || async move {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                if n < 2 { Err("boom") } else { Ok(n) }
            },
        )
        .await;

        assert_eq!(result.unwrap(), 2);
        assert_eq!(seen, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_exhausts_budget() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.subscribe();
        let counter = AtomicU32::new(0);
        let calls = &counter;

        let result: Result<(), _> = retry_with_backoff(
            &policy(3),
            &mut listener,
            |_, _| {},
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Err::<(), _>("down")
            },
        )
        .await;

        match result {
            Err(RetryError::Exhausted { attempts, last }) => {
                assert_eq!(attempts, 3);
                assert_eq!(last, "down");
            }
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_cancelled_by_shutdown() {
        let shutdown = Shutdown::new();
        let mut listener = shutdown.subscribe();
        shutdown.trigger();

        let result: Result<(), RetryError<&str>> =
            retry_with_backoff(&policy(3), &mut listener, |_, _| {}, || async { Ok(()) }).await;
        assert!(matches!(result, Err(RetryError::Cancelled { attempts: 0 })));
    }
}
