use async_trait::async_trait;
use runloom_core::{ActorScope, AppResult};
use runloom_domain::DeliveryReceipt;

/// Payload delivered to the waiting-signal notifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WaitingSignalNotification {
    /// Acting scope.
    pub scope: ActorScope,
    /// Waiting workflow.
    pub workflow_id: String,
    /// Run that suspended.
    pub run_id: String,
    /// Conversation thread, when the workflow has one.
    pub thread_id: Option<String>,
    /// Question surfaced to the user.
    pub question: String,
}

/// Outbound notification port invoked when a workflow suspends on input.
///
/// A returned receipt is persisted as a message thread so inbound replies can
/// resolve their workflow.
#[async_trait]
pub trait WaitingSignalNotifier: Send + Sync {
    /// Delivers one waiting-signal notification.
    async fn notify_waiting_signal(
        &self,
        input: WaitingSignalNotification,
    ) -> AppResult<Option<DeliveryReceipt>>;
}
