use std::ops::ControlFlow;
use std::time::Duration;

use rand::Rng;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::config::RetrySection;

use super::error::BrowserError;
use super::metrics::{MetricsHandle, RunMetrics};
use super::session::{load, FetchSession};

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: usize,
    schedule: Vec<Duration>,
    jitter: Duration,
}

#[derive(Debug)]
pub enum RetryOutcome<T> {
    Success { value: T, attempts: usize },
    ExhaustedFailure { last_error: BrowserError, attempts: usize },
}

impl<T> RetryOutcome<T> {
    pub fn attempts(&self) -> usize {
        match self {
            RetryOutcome::Success { attempts, .. }
            | RetryOutcome::ExhaustedFailure { attempts, .. } => *attempts,
        }
    }

    pub fn into_result(self) -> Result<T, BrowserError> {
        match self {
            RetryOutcome::Success { value, .. } => Ok(value),
            RetryOutcome::ExhaustedFailure { last_error, .. } => Err(last_error),
        }
    }
}

impl RetryPolicy {
    pub fn new(config: RetrySection) -> Self {
        let mut schedule = config
            .schedule_ms
            .into_iter()
            .map(Duration::from_millis)
            .collect::<Vec<_>>();
        if schedule.is_empty() {
            schedule.push(Duration::from_secs(1));
        }
        Self {
            max_attempts: config.max_attempts.max(1),
            schedule,
            jitter: Duration::from_millis(config.jitter_ms),
        }
    }

    pub fn max_attempts(&self) -> usize {
        self.max_attempts
    }

    fn delay_for_attempt(&self, attempt: usize) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let base = self
            .schedule
            .get(attempt - 1)
            .or_else(|| self.schedule.last())
            .copied()
            .unwrap_or_default();
        if self.jitter.is_zero() {
            base
        } else {
            let extra = rand::thread_rng().gen_range(0..=self.jitter.as_millis() as u64);
            base + Duration::from_millis(extra)
        }
    }

    pub async fn fetch_with_retry(
        &self,
        session: &mut dyn FetchSession,
        url: &str,
        timeout: Duration,
        metrics: &MetricsHandle,
    ) -> RetryOutcome<String> {
        let mut attempt = 0usize;
        loop {
            if attempt > 0 {
                metrics.with(RunMetrics::record_retry);
            }
            match load(&mut *session, url, timeout).await {
                Ok(content) => {
                    metrics.with(RunMetrics::record_page_load);
                    return RetryOutcome::Success {
                        value: content,
                        attempts: attempt + 1,
                    };
                }
                Err(error) => {
                    metrics.with(RunMetrics::record_load_failure);
                    attempt += 1;
                    if let ControlFlow::Break(exhausted) =
                        self.after_failure(url, attempt, error).await
                    {
                        return exhausted;
                    }
                }
            }
        }
    }

    async fn after_failure<T>(
        &self,
        label: &str,
        failed_attempts: usize,
        error: BrowserError,
    ) -> ControlFlow<RetryOutcome<T>> {
        if failed_attempts >= self.max_attempts {
            warn!(
                target_url = label,
                attempts = failed_attempts,
                error = %error,
                "retries exhausted"
            );
            return ControlFlow::Break(RetryOutcome::ExhaustedFailure {
                last_error: error,
                attempts: failed_attempts,
            });
        }
        let delay = self.delay_for_attempt(failed_attempts);
        debug!(
            target_url = label,
            attempt = failed_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "attempt failed, retrying"
        );
        if !delay.is_zero() {
            sleep(delay).await;
        }
        ControlFlow::Continue(())
    }
}
