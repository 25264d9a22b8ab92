// src/retry/policy.rs
use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Fixed-delay retry, dispatching the same closure up to `max_attempts`
/// times against whatever target it already closed over. Unlike the
/// teacher's exponential-backoff-with-jitter executor, the design calls for
/// a flat delay between attempts and a hard attempt ceiling -- there is no
/// backoff curve to compute because every retry targets the same backend,
/// not an escalating fallback chain.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, delay: Duration) -> Self {
        Self { max_attempts, delay }
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `f` until it succeeds or `max_attempts` have been made, sleeping
    /// `delay` between attempts. `f` receives the 1-based attempt number so
    /// callers can thread it into their own log lines. The last error is
    /// returned to the caller on final failure.
    pub async fn execute<F, Fut, T, E>(&self, mut f: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: std::fmt::Display,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f(attempt).await {
                Ok(result) => return Ok(result),
                Err(error) => {
                    if attempt >= self.max_attempts {
                        warn!(attempt, max_attempts = self.max_attempts, %error, "retry attempts exhausted");
                        return Err(error);
                    }
                    debug!(attempt, %error, delay = ?self.delay, "attempt failed, retrying");
                    sleep(self.delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn succeeds_after_transient_failures() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let counter = AtomicU32::new(0);

        let result = policy
            .execute(|_attempt| async {
                let count = counter.fetch_add(1, Ordering::SeqCst);
                if count < 2 {
                    Err("temporary failure")
                } else {
                    Ok("success")
                }
            })
            .await;

        assert_eq!(result.unwrap(), "success");
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_max_attempts() {
        let policy = RetryPolicy::new(2, Duration::from_millis(1));
        let counter = AtomicU32::new(0);

        let result: Result<(), &str> = policy
            .execute(|_attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("always fails") }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn passes_the_one_based_attempt_number_through() {
        let policy = RetryPolicy::new(3, Duration::from_millis(1));
        let seen = std::sync::Mutex::new(Vec::new());

        let _: Result<(), &str> = policy
            .execute(|attempt| {
                seen.lock().unwrap().push(attempt);
                async move {
                    if attempt < 3 {
                        Err("retry me")
                    } else {
                        Ok(())
                    }
                }
            })
            .await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2, 3]);
    }
}
