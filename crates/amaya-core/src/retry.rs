//! Provider retry.
//!
//! Transport failures (network, rate limits, 5xx) are retried with
//! exponential backoff, or after the delay the provider asked for.
//! Everything else fails the run on the first occurrence.

use crate::config::RetrySettings;
use amaya_provider::ProviderError;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Calculate the delay before retry number `attempt` (1-based).
///
/// A provider-supplied `retry-after` wins; otherwise exponential backoff
/// capped at `max_delay_ms`.
pub fn calculate_delay(
    attempt: u32,
    retry_after: Option<Duration>,
    settings: &RetrySettings,
) -> Duration {
    if let Some(delay) = retry_after {
        return delay;
    }

    let factor = settings
        .backoff_factor
        .max(1)
        .saturating_pow(attempt.saturating_sub(1));
    let delay = settings.initial_delay_ms.saturating_mul(factor);
    Duration::from_millis(delay.min(settings.max_delay_ms))
}

/// Sleep for the specified duration, respecting cancellation.
///
/// Returns false if cancelled.
pub async fn sleep_with_cancel(duration: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        _ = tokio::time::sleep(duration) => true,
        _ = cancel.cancelled() => false,
    }
}

/// Tracks retries for one provider request.
pub struct RetryHelper {
    settings: RetrySettings,
    current_attempt: u32,
}

impl RetryHelper {
    pub fn new(settings: &RetrySettings) -> Self {
        Self {
            settings: settings.clone(),
            current_attempt: 0,
        }
    }

    /// Decide whether `error` is worth another attempt and how long to wait.
    ///
    /// Returns `None` for non-retryable errors and once retries are
    /// exhausted.
    pub fn next_delay(&mut self, error: &ProviderError) -> Option<Duration> {
        if !error.is_retryable() {
            return None;
        }

        self.current_attempt += 1;
        if self.current_attempt > self.settings.max_attempts {
            debug!(
                attempt = self.current_attempt,
                max = self.settings.max_attempts,
                "Max retry attempts reached"
            );
            return None;
        }

        let delay = calculate_delay(self.current_attempt, error.retry_after(), &self.settings);
        debug!(
            attempt = self.current_attempt,
            max = self.settings.max_attempts,
            delay_ms = delay.as_millis() as u64,
            "Scheduling retry"
        );
        Some(delay)
    }

    /// Retries scheduled so far.
    pub fn current_attempt(&self) -> u32 {
        self.current_attempt
    }
}
