use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// Mapping from a provider conversation thread to a workflow.
///
/// Inbound replies resolve their target workflow through the unique
/// `(provider, provider_team_id, provider_thread_id)` triple.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowMessageThread {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Thread identifier.
    pub thread_id: String,
    /// Workflow the thread belongs to.
    pub workflow_id: String,
    /// Messaging provider name.
    pub provider: String,
    /// Provider team/installation identifier.
    pub provider_team_id: String,
    /// Provider channel identifier.
    pub provider_channel_id: Option<String>,
    /// Provider-side thread identifier.
    pub provider_thread_id: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl WorkflowMessageThread {
    /// Returns the owning scope.
    #[must_use]
    pub fn scope(&self) -> ActorScope {
        ActorScope::new(self.tenant_id, self.workspace_id)
    }
}

/// Dedup sentinel for inbound provider events; the first insert wins.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InboundMessageReceipt {
    /// Messaging provider name.
    pub provider: String,
    /// Provider team/installation identifier.
    pub provider_team_id: String,
    /// Provider event identifier.
    pub event_id: String,
    /// First-seen timestamp.
    pub received_at: DateTime<Utc>,
}

/// Per-scope messaging configuration consulted by the notifier path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TenantMessagingSettings {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Channel used when a workflow has no thread yet.
    pub default_channel_id: Option<String>,
    /// Provider team/installation identifier.
    pub provider_team_id: Option<String>,
    /// Whether waiting-signal notifications are delivered at all.
    pub notifications_enabled: bool,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Delivery receipt returned by a waiting-signal notifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryReceipt {
    /// Transport channel kind.
    pub channel: String,
    /// Delivery target.
    pub target: String,
    /// Provider channel identifier.
    pub channel_id: Option<String>,
    /// Provider message identifier.
    pub message_id: Option<String>,
    /// Provider thread identifier for reply routing.
    pub thread_id: Option<String>,
    /// Provider team/installation identifier.
    pub provider_team_id: Option<String>,
}
