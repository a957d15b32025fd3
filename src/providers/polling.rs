//! Fixed-interval polling for vendors that answer with a job handle.
use std::future::Future;
use std::time::Duration;

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl Default for PollPolicy {
    fn default() -> Self {
        PollPolicy { interval: Duration::from_secs(2), max_attempts: 30 }
    }
}

/// Classification of one status response.
#[derive(Debug, Clone, PartialEq)]
pub enum PollState<T> {
    Succeeded(T),
    Failed(String),
    Running,
}

/// Call `check` once per interval until it reports a terminal state.
///
/// Sleeps before every attempt, so a job created a moment ago is never polled
/// immediately. Errors returned by `check` (transport failures, malformed
/// bodies) end the loop as they are; only `Running` is retried.
pub async fn poll_until<T, F, Fut>(policy: PollPolicy, job: &str, mut check: F) -> AppResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = AppResult<PollState<T>>>,
{
    for attempt in 1..=policy.max_attempts {
        tokio::time::sleep(policy.interval).await;
        match check(attempt).await? {
            PollState::Succeeded(value) => {
                tracing::info!(job, attempt, "generation finished");
                return Ok(value);
            }
            PollState::Failed(reason) => {
                tracing::warn!(job, attempt, reason = %reason, "vendor reported failure");
                return Err(AppError::GenerationFailed(reason));
            }
            PollState::Running => {
                tracing::debug!(job, attempt, max = policy.max_attempts, "still running");
            }
        }
    }
    Err(exhausted(policy))
}

fn exhausted(policy: PollPolicy) -> AppError {
    AppError::GenerationTimeout {
        attempts: policy.max_attempts,
        waited: policy.interval.saturating_mul(policy.max_attempts),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast(max_attempts: u32) -> PollPolicy {
        PollPolicy { interval: Duration::from_millis(1), max_attempts }
    }

    #[tokio::test]
    async fn stops_on_first_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let result = poll_until(fast(30), "job-1", move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
            async move {
                Ok(if n <= 3 { PollState::Running } else { PollState::Succeeded("done") })
            }
        })
        .await
        .unwrap();
        assert_eq!(result, "done");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn gives_up_at_the_ceiling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = poll_until::<(), _, _>(fast(5), "job-2", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(PollState::Running) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::GenerationTimeout { attempts: 5, .. }));
        assert_eq!(calls.load(Ordering::SeqCst), 5);
    }

    #[tokio::test]
    async fn failure_is_terminal() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = poll_until::<(), _, _>(fast(30), "job-3", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Ok(PollState::Failed("NSFW content detected".to_string())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::GenerationFailed(ref r) if r.contains("NSFW")));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn transport_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let err = poll_until::<(), _, _>(fast(30), "job-4", move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::VendorUnavailable("connection reset".to_string())) }
        })
        .await
        .unwrap_err();
        assert!(matches!(err, AppError::VendorUnavailable(_)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn reported_wait_saturates() {
        let policy = PollPolicy { interval: Duration::from_millis(u64::MAX), max_attempts: 30 };
        match exhausted(policy) {
            AppError::GenerationTimeout { attempts, waited } => {
                assert_eq!(attempts, 30);
                assert_eq!(waited, Duration::MAX);
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[tokio::test]
    async fn waits_between_attempts() {
        let policy = PollPolicy { interval: Duration::from_millis(20), max_attempts: 3 };
        let started = std::time::Instant::now();
        let _ = poll_until::<(), _, _>(policy, "job-5", |_| async { Ok(PollState::Running) }).await;
        assert!(started.elapsed() >= Duration::from_millis(60));
    }
}
