use std::future::Future;
use std::time::Duration;

use poise::serenity_prelude as serenity;
use rand::Rng;
use tracing::warn;

/// Discord error codes for resources that no longer exist.
const UNKNOWN_RESOURCE_CODES: [isize; 6] = [10003, 10007, 10008, 10011, 10013, 10014];

const MISSING_PERMISSIONS_CODE: isize = 50013;

/// How a failed platform call should be treated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The target is already gone. Callers treat this as success.
    Gone,
    /// The bot lacks permission. Retrying cannot help.
    Forbidden,
    /// Network trouble, rate limits or a server-side error.
    Transient,
    /// Anything else the platform rejected.
    Permanent,
}

pub fn classify_status(status: u16, code: isize) -> FailureKind {
    if status == 404 || UNKNOWN_RESOURCE_CODES.contains(&code) {
        FailureKind::Gone
    } else if status == 403 || code == MISSING_PERMISSIONS_CODE {
        FailureKind::Forbidden
    } else if status == 429 || status >= 500 {
        FailureKind::Transient
    } else {
        FailureKind::Permanent
    }
}

pub fn classify(source: &serenity::Error) -> FailureKind {
    match source {
        serenity::Error::Http(serenity::HttpError::UnsuccessfulRequest(response)) => {
            classify_status(response.status_code.as_u16(), response.error.code)
        }
        serenity::Error::Http(serenity::HttpError::Request(_)) | serenity::Error::Io(_) => {
            FailureKind::Transient
        }
        _ => FailureKind::Permanent,
    }
}

/// Capped exponential backoff with jitter for platform calls.
#[derive(Clone, Debug)]
pub struct RetryPolicy {
    max_attempts: u32,
    initial_delay: Duration,
    max_delay: Duration,
    backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RetryPolicy {
    /// 4 attempts, 500ms initial delay, 8s cap, doubling each time.
    pub const fn new() -> Self {
        Self {
            max_attempts: 4,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            backoff_multiplier: 2.0,
        }
    }

    /// Total attempts, including the first one.
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    pub const fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub const fn with_max_delay(mut self, delay: Duration) -> Self {
        self.max_delay = delay;
        self
    }

    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (0-based): the exponential delay,
    /// capped at the maximum, scaled by a random factor in `[0.5, 1.0]`.
    #[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let exponential = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powi(attempt.min(i32::MAX as u32) as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        let jitter = rand::thread_rng().gen_range(0.5..=1.0);

        Duration::from_secs_f64(capped * jitter)
    }

    /// Whether another attempt is allowed after `attempts` have been made.
    pub const fn should_retry(&self, attempts: u32) -> bool {
        attempts < self.max_attempts
    }

    /// Run `call` until it succeeds, fails with a non-transient error, or the
    /// attempts are used up. The last error is returned.
    pub async fn run<T, F, Fut>(&self, operation: &str, mut call: F) -> Result<T, serenity::Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, serenity::Error>>,
    {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match call().await {
                Ok(value) => return Ok(value),
                Err(source)
                    if classify(&source) == FailureKind::Transient
                        && self.should_retry(attempts) =>
                {
                    let delay = self.delay_for_attempt(attempts - 1);
                    warn!(
                        operation,
                        attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %source,
                        "transient failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(source) => return Err(source),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    fn timed_out() -> serenity::Error {
        serenity::Error::Io(io::Error::new(io::ErrorKind::TimedOut, "gateway timeout"))
    }

    fn quick() -> RetryPolicy {
        RetryPolicy::new()
            .with_initial_delay(Duration::from_millis(1))
            .with_max_delay(Duration::from_millis(2))
    }

    #[test]
    fn statuses_are_classified() {
        assert_eq!(classify_status(404, 0), FailureKind::Gone);
        assert_eq!(classify_status(400, 10008), FailureKind::Gone);
        assert_eq!(classify_status(403, 50013), FailureKind::Forbidden);
        assert_eq!(classify_status(400, 50013), FailureKind::Forbidden);
        assert_eq!(classify_status(429, 0), FailureKind::Transient);
        assert_eq!(classify_status(502, 0), FailureKind::Transient);
        assert_eq!(classify_status(503, 0), FailureKind::Transient);
        assert_eq!(classify_status(400, 50035), FailureKind::Permanent);
    }

    #[test]
    fn io_errors_are_transient() {
        assert_eq!(classify(&timed_out()), FailureKind::Transient);
        assert_eq!(
            classify(&serenity::Error::ExceededLimit("too long".into(), 2000)),
            FailureKind::Permanent
        );
    }

    #[test]
    fn delays_grow_and_stay_capped() {
        let policy = RetryPolicy::new();
        for _ in 0..20 {
            let first = policy.delay_for_attempt(0);
            assert!(first >= Duration::from_millis(250) && first <= Duration::from_millis(500));

            let second = policy.delay_for_attempt(1);
            assert!(second >= Duration::from_millis(500) && second <= Duration::from_secs(1));

            let late = policy.delay_for_attempt(30);
            assert!(late >= Duration::from_secs(4) && late <= Duration::from_secs(8));
        }
    }

    #[tokio::test]
    async fn transient_failures_are_retried() {
        let mut calls = 0;
        let result = quick()
            .run("send_message", || {
                calls += 1;
                let call = calls;
                async move { if call < 3 { Err(timed_out()) } else { Ok(call) } }
            })
            .await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn permanent_failures_are_not_retried() {
        let mut calls = 0;
        let result: Result<(), _> = quick()
            .run("send_message", || {
                calls += 1;
                async { Err(serenity::Error::ExceededLimit("too long".into(), 2000)) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls, 1);
    }

    #[tokio::test]
    async fn retries_stop_at_the_attempt_limit() {
        let policy = quick().with_max_attempts(3);
        let mut calls = 0;
        let result: Result<(), _> = policy
            .run("delete_channel", || {
                calls += 1;
                async { Err(timed_out()) }
            })
            .await;

        assert!(matches!(result, Err(serenity::Error::Io(_))));
        assert_eq!(calls, policy.max_attempts());
    }
}
