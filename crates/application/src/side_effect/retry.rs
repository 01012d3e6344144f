use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rand::Rng;
use runloom_core::{ActorScope, AppResult};
use tracing::warn;

use crate::runtime_ports::{
    ActionAdapter, AdapterAction, AdapterCredentials, AdapterResponse, RetryAttemptRecord,
    RetryAttemptSink, RetryTerminalReason,
};

/// Exponential backoff parameters for the retry decorator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Attempt ceiling, including the first attempt.
    pub max_attempts: u32,
    /// Backoff base applied to the first retry.
    pub base_delay_ms: u64,
    /// Backoff ceiling.
    pub max_delay_ms: u64,
    /// Fraction of the delay randomized in either direction.
    pub jitter_ratio: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 250,
            max_delay_ms: 5_000,
            jitter_ratio: 0.2,
        }
    }
}

impl RetryPolicy {
    fn backoff_ms(&self, attempt_number: u32) -> u64 {
        let exponent = attempt_number.saturating_sub(1).min(16);
        let delay = self
            .base_delay_ms
            .saturating_mul(1_u64 << exponent)
            .min(self.max_delay_ms);

        if self.jitter_ratio <= 0.0 || delay == 0 {
            return delay;
        }

        let spread = (delay as f64 * self.jitter_ratio).max(1.0) as u64;
        let low = delay.saturating_sub(spread);
        let high = delay.saturating_add(spread);
        rand::thread_rng().gen_range(low..=high)
    }
}

/// Sink that drops retry telemetry.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullRetryAttemptSink;

#[async_trait]
impl RetryAttemptSink for NullRetryAttemptSink {
    async fn record_attempt(&self, _record: RetryAttemptRecord) -> AppResult<()> {
        Ok(())
    }
}

/// Retry decorator for action adapters.
///
/// Retries provider errors classified retryable with exponential backoff and
/// jitter, bounded by the policy. Every attempt writes a
/// [`RetryAttemptRecord`]; terminal sequences carry `non_retryable` or
/// `max_attempts_exhausted`.
pub struct RetryingActionAdapter {
    inner: Arc<dyn ActionAdapter>,
    policy: RetryPolicy,
    sink: Arc<dyn RetryAttemptSink>,
    classify: Box<dyn Fn(Option<&str>, &str, bool) -> bool + Send + Sync>,
}

impl RetryingActionAdapter {
    /// Wraps an adapter with the default failure classifier.
    #[must_use]
    pub fn new(inner: Arc<dyn ActionAdapter>, policy: RetryPolicy) -> Self {
        Self {
            inner,
            policy,
            sink: Arc::new(NullRetryAttemptSink),
            classify: Box::new(default_is_retryable),
        }
    }

    /// Adds a retry attempt telemetry sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn RetryAttemptSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Replaces the failure classifier. Arguments are the provider error
    /// code, the error message, and the provider's own retryable flag.
    #[must_use]
    pub fn with_classifier(
        mut self,
        classify: Box<dyn Fn(Option<&str>, &str, bool) -> bool + Send + Sync>,
    ) -> Self {
        self.classify = classify;
        self
    }
}

/// Default failure classifier: retry when the provider says so, on rate
/// limits and server errors, or on timeout-shaped messages.
fn default_is_retryable(code: Option<&str>, message: &str, retryable_flag: bool) -> bool {
    if retryable_flag {
        return true;
    }

    if let Some(code) = code {
        if code.eq_ignore_ascii_case("HTTP_429") {
            return true;
        }

        let upper = code.to_ascii_uppercase();
        if let Some(status) = upper.strip_prefix("HTTP_")
            && status.starts_with('5')
            && status.len() == 3
        {
            return true;
        }
    }

    let lowered = message.to_ascii_lowercase();
    lowered.contains("timeout") || lowered.contains("timed out")
}

#[async_trait]
impl ActionAdapter for RetryingActionAdapter {
    async fn execute(
        &self,
        action: &AdapterAction,
        scope: &ActorScope,
        credentials: &AdapterCredentials,
    ) -> AppResult<AdapterResponse> {
        let max_attempts = self.policy.max_attempts.max(1);

        let mut attempt_number = 0;
        loop {
            attempt_number += 1;
            let response = self.inner.execute(action, scope, credentials).await?;

            let (code, message, retryable_flag) = match &response {
                AdapterResponse::Ok { .. } => {
                    self.sink
                        .record_attempt(RetryAttemptRecord {
                            tool_name: action.tool_name.clone(),
                            attempt_number,
                            error_code: None,
                            error_message: None,
                            retryable: false,
                            delay_ms: 0,
                            terminal_reason: None,
                            occurred_at: Utc::now(),
                        })
                        .await?;
                    return Ok(response);
                }
                AdapterResponse::Error {
                    code,
                    message,
                    retryable,
                } => (code.clone(), message.clone(), *retryable),
            };

            let retryable = (self.classify)(code.as_deref(), message.as_str(), retryable_flag);
            let exhausted = attempt_number >= max_attempts;
            let terminal_reason = if !retryable {
                Some(RetryTerminalReason::NonRetryable)
            } else if exhausted {
                Some(RetryTerminalReason::MaxAttemptsExhausted)
            } else {
                None
            };
            let delay_ms = if terminal_reason.is_none() {
                self.policy.backoff_ms(attempt_number)
            } else {
                0
            };

            self.sink
                .record_attempt(RetryAttemptRecord {
                    tool_name: action.tool_name.clone(),
                    attempt_number,
                    error_code: code.clone(),
                    error_message: Some(message.clone()),
                    retryable,
                    delay_ms,
                    terminal_reason,
                    occurred_at: Utc::now(),
                })
                .await?;

            if let Some(reason) = terminal_reason {
                warn!(
                    tool_name = %action.tool_name,
                    attempt_number,
                    reason = %reason.as_str(),
                    "adapter action failed terminally"
                );
                return Ok(response);
            }

            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        }
    }
}
