use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, AppError, AppResult, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// Queue lifecycle status of one workflow job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueJobStatus {
    /// Waiting to be claimed.
    Queued,
    /// Leased by a worker.
    Claimed,
    /// Acked by the lease holder. Terminal.
    Completed,
    /// Exhausted its attempts. Terminal.
    Failed,
}

impl QueueJobStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Claimed => "claimed",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "queued" => Ok(Self::Queued),
            "claimed" => Ok(Self::Claimed),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown queue job status '{value}'"
            ))),
        }
    }

    /// Returns whether the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// One durable queue job driving a planner loop re-entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowQueueJob {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Job identifier.
    pub job_id: String,
    /// Run aggregate the job reports into.
    pub run_id: String,
    /// Agent that owns the workflow.
    pub agent_id: String,
    /// Workflow to drive.
    pub workflow_id: String,
    /// Originating objective request.
    pub request_id: String,
    /// Optional conversation thread identifier.
    pub thread_id: Option<String>,
    /// Objective prompt carried for the planner loop.
    pub objective_prompt: String,
    /// Queue status.
    pub status: QueueJobStatus,
    /// Number of claims performed so far.
    pub attempt_count: u32,
    /// Attempt ceiling before the job fails terminally.
    pub max_attempts: u32,
    /// Earliest claimable instant.
    pub available_at: DateTime<Utc>,
    /// Fencing token, set iff the job is claimed.
    pub lease_token: Option<String>,
    /// Advisory lease expiry; the token check is the definitive gate.
    pub lease_expires_at: Option<DateTime<Utc>>,
    /// Most recent execution error.
    pub last_error: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last transition timestamp.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowQueueJob {
    /// Returns the owning scope.
    #[must_use]
    pub fn scope(&self) -> ActorScope {
        ActorScope::new(self.tenant_id, self.workspace_id)
    }

    /// Returns whether `token` is the currently valid lease for this job.
    #[must_use]
    pub fn holds_lease(&self, token: &str) -> bool {
        self.status == QueueJobStatus::Claimed && self.lease_token.as_deref() == Some(token)
    }
}
