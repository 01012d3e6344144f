use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, AppError, AppResult, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// Objective request schema version accepted by this runtime.
pub const OBJECTIVE_SCHEMA_VERSION: u32 = 1;

/// Immutable record of one objective submission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectiveRequest {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Globally unique, time-ordered request identifier.
    pub request_id: String,
    /// Workflow created for the objective.
    pub workflow_id: String,
    /// Optional conversation thread identifier.
    pub thread_id: Option<String>,
    /// Schema version of the submission payload.
    pub schema_version: u32,
    /// Objective text.
    pub objective_prompt: String,
    /// Submission timestamp.
    pub occurred_at: DateTime<Utc>,
}

impl ObjectiveRequest {
    /// Returns the owning scope.
    #[must_use]
    pub fn scope(&self) -> ActorScope {
        ActorScope::new(self.tenant_id, self.workspace_id)
    }

    /// Validates schema version and objective text.
    pub fn ensure_supported(&self) -> AppResult<()> {
        if self.schema_version != OBJECTIVE_SCHEMA_VERSION {
            return Err(AppError::Validation(format!(
                "unsupported objective schema version {}; expected {OBJECTIVE_SCHEMA_VERSION}",
                self.schema_version
            )));
        }

        if self.objective_prompt.trim().is_empty() {
            return Err(AppError::Validation(
                "objective_prompt must not be empty".to_owned(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use runloom_core::{TenantId, WorkspaceId};

    use super::{OBJECTIVE_SCHEMA_VERSION, ObjectiveRequest};

    fn request(schema_version: u32, prompt: &str) -> ObjectiveRequest {
        ObjectiveRequest {
            tenant_id: TenantId::new(),
            workspace_id: WorkspaceId::new(),
            request_id: "req-1".to_owned(),
            workflow_id: "wf-1".to_owned(),
            thread_id: None,
            schema_version,
            objective_prompt: prompt.to_owned(),
            occurred_at: Utc::now(),
        }
    }

    #[test]
    fn rejects_unsupported_schema_version() {
        assert!(
            request(OBJECTIVE_SCHEMA_VERSION + 1, "schedule an interview")
                .ensure_supported()
                .is_err()
        );
    }

    #[test]
    fn rejects_blank_objective() {
        assert!(request(OBJECTIVE_SCHEMA_VERSION, "  ").ensure_supported().is_err());
    }

    #[test]
    fn accepts_supported_request() {
        assert!(
            request(OBJECTIVE_SCHEMA_VERSION, "schedule an interview")
                .ensure_supported()
                .is_ok()
        );
    }
}
