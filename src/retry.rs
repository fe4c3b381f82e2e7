use std::future::Future;
use std::time::{Duration, Instant};

use crate::error::GatewayError;

const MAX_TOTAL_WAIT: Duration = Duration::from_secs(10);
const BASE_WAIT: Duration = Duration::from_secs(1);
const MIN_WAIT: Duration = Duration::from_secs(2);
const MAX_WAIT: Duration = Duration::from_secs(10);

/// Outcome of a single upstream attempt, classified for the retry policy.
pub enum AttemptOutcome<T> {
    Ok(T),
    RetryRateLimit,
    RetryConnection,
    RetryInternal,
    TerminalClient(GatewayError),
    TerminalServer(GatewayError),
}

pub struct RetryController {
    max_attempts: u32,
}

impl RetryController {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Run `attempt` (1-indexed) until it succeeds, exhausts the attempt
    /// budget, or the wall-clock retry window is exceeded.
    pub async fn run<T, F, Fut>(&self, mut attempt: F) -> Result<T, GatewayError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = AttemptOutcome<T>>,
    {
        let start = Instant::now();
        let mut attempt_no = 0u32;

        loop {
            attempt_no += 1;
            match attempt(attempt_no).await {
                AttemptOutcome::Ok(value) => return Ok(value),
                AttemptOutcome::TerminalClient(e) | AttemptOutcome::TerminalServer(e) => {
                    return Err(e)
                }
                retryable => {
                    let terminal_error = terminal_error_for(&retryable);
                    if attempt_no >= self.max_attempts {
                        return Err(terminal_error);
                    }
                    let wait = backoff_for(attempt_no);
                    if start.elapsed() + wait > MAX_TOTAL_WAIT {
                        return Err(terminal_error);
                    }
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

fn terminal_error_for<T>(outcome: &AttemptOutcome<T>) -> GatewayError {
    match outcome {
        AttemptOutcome::RetryRateLimit => GatewayError::UpstreamRateLimit,
        AttemptOutcome::RetryConnection => GatewayError::UpstreamUnavailable,
        AttemptOutcome::RetryInternal => {
            GatewayError::UpstreamError("upstream returned a transient internal error".into())
        }
        _ => unreachable!("terminal_error_for only called for retryable outcomes"),
    }
}

/// Exponential backoff: `base * 2^(attempt - 1)`, clamped to `[MIN_WAIT,
/// MAX_WAIT]`.
fn backoff_for(attempt_no: u32) -> Duration {
    let exponent = attempt_no.saturating_sub(1).min(16);
    let scaled = BASE_WAIT.as_secs_f64() * 2f64.powi(exponent as i32);
    Duration::from_secs_f64(scaled.clamp(MIN_WAIT.as_secs_f64(), MAX_WAIT.as_secs_f64()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn backoff_never_below_minimum_or_above_maximum() {
        for attempt in 1..=10 {
            let wait = backoff_for(attempt);
            assert!(wait >= MIN_WAIT);
            assert!(wait <= MAX_WAIT);
        }
    }

    #[tokio::test]
    async fn retries_until_success_within_max_attempts() {
        let controller = RetryController::new(3);
        let calls = AtomicU32::new(0);
        let result = controller
            .run(|_attempt| {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n < 2 {
                        AttemptOutcome::<&str>::RetryInternal
                    } else {
                        AttemptOutcome::Ok("ok")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausts_attempts_and_surfaces_terminal_error() {
        let controller = RetryController::new(3);
        let calls = AtomicU32::new(0);
        let result = controller
            .run(|_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { AttemptOutcome::<()>::RetryInternal }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn non_retryable_error_is_terminal_immediately() {
        let controller = RetryController::new(3);
        let calls = AtomicU32::new(0);
        let result = controller
            .run(|_attempt| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { AttemptOutcome::<()>::TerminalClient(GatewayError::ModelUnknown) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
