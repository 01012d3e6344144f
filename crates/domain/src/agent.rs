use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// Tenant-scoped agent directory entry referenced by runs and workflows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Agent identifier.
    pub agent_id: String,
    /// Display name.
    pub name: String,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl AgentRecord {
    /// Returns the owning scope.
    #[must_use]
    pub fn scope(&self) -> ActorScope {
        ActorScope::new(self.tenant_id, self.workspace_id)
    }
}
