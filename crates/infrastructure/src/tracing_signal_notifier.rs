//! Waiting-signal notifier for development. Logs questions to tracing output.

use async_trait::async_trait;
use runloom_application::{WaitingSignalNotification, WaitingSignalNotifier};
use runloom_core::AppResult;
use runloom_domain::DeliveryReceipt;
use tracing::info;

/// Development notifier that logs waiting questions instead of posting them.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSignalNotifier;

impl TracingSignalNotifier {
    /// Creates the notifier.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl WaitingSignalNotifier for TracingSignalNotifier {
    async fn notify_waiting_signal(
        &self,
        input: WaitingSignalNotification,
    ) -> AppResult<Option<DeliveryReceipt>> {
        info!(
            workflow_id = %input.workflow_id,
            run_id = %input.run_id,
            question = %input.question,
            "waiting question (console)"
        );

        Ok(None)
    }
}
