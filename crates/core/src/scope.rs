use serde::{Deserialize, Serialize};

use crate::{AppError, AppResult, TenantId, WorkspaceId};

/// Tenant and workspace pair that scopes every persisted resource.
///
/// No entity is visible to an actor scope other than its own through any
/// public operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ActorScope {
    tenant_id: TenantId,
    workspace_id: WorkspaceId,
}

impl ActorScope {
    /// Creates an actor scope.
    #[must_use]
    pub fn new(tenant_id: TenantId, workspace_id: WorkspaceId) -> Self {
        Self {
            tenant_id,
            workspace_id,
        }
    }

    /// Returns the tenant identifier.
    #[must_use]
    pub fn tenant_id(&self) -> TenantId {
        self.tenant_id
    }

    /// Returns the workspace identifier.
    #[must_use]
    pub fn workspace_id(&self) -> WorkspaceId {
        self.workspace_id
    }

    /// Returns whether both halves of the scope match.
    #[must_use]
    pub fn matches(&self, other: &ActorScope) -> bool {
        self == other
    }

    /// Fails when the other scope does not match, masking the resource as
    /// absent rather than leaking its existence.
    pub fn ensure_owns(&self, other: &ActorScope, resource: &str) -> AppResult<()> {
        if self.matches(other) {
            return Ok(());
        }

        Err(AppError::Validation(format!("{resource} not found")))
    }
}

#[cfg(test)]
mod tests {
    use super::ActorScope;
    use crate::{TenantId, WorkspaceId};

    #[test]
    fn matching_scopes_pass_ownership_check() {
        let scope = ActorScope::new(TenantId::new(), WorkspaceId::new());
        assert!(scope.ensure_owns(&scope, "workflow").is_ok());
    }

    #[test]
    fn foreign_scope_is_masked_as_not_found() {
        let scope = ActorScope::new(TenantId::new(), WorkspaceId::new());
        let other = ActorScope::new(TenantId::new(), WorkspaceId::new());

        let result = scope.ensure_owns(&other, "workflow");
        assert!(result.is_err());
        let message = result
            .map(|()| String::new())
            .unwrap_or_else(|error| error.to_string());
        assert!(message.contains("workflow not found"));
    }
}
