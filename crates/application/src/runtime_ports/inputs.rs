use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, TenantId, WorkspaceId};
use runloom_domain::QueueJobStatus;

/// Payload for enqueueing one workflow job.
#[derive(Debug, Clone, PartialEq)]
pub struct EnqueueWorkflowJobInput {
    /// Owning scope.
    pub scope: ActorScope,
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
    /// Attempt ceiling before the job fails terminally.
    pub max_attempts: u32,
    /// Earliest claimable instant; defaults to now.
    pub available_at: Option<DateTime<Utc>>,
}

/// Claim request issued by one worker.
///
/// Scope filters must be provided together or not at all.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimWorkflowJobsInput {
    /// Claiming worker identity.
    pub worker_id: String,
    /// Maximum number of jobs to claim.
    pub limit: usize,
    /// Lease duration in milliseconds.
    pub lease_ms: u64,
    /// Optional tenant scope filter.
    pub tenant_id: Option<TenantId>,
    /// Optional workspace scope filter.
    pub workspace_id: Option<WorkspaceId>,
}

/// Lease-fenced job completion ack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompleteWorkflowJobInput {
    /// Owning scope.
    pub scope: ActorScope,
    /// Job identifier.
    pub job_id: String,
    /// Fencing token issued at claim time.
    pub lease_token: String,
}

/// Lease-fenced job failure report.
#[derive(Debug, Clone, PartialEq)]
pub struct FailWorkflowJobInput {
    /// Owning scope.
    pub scope: ActorScope,
    /// Job identifier.
    pub job_id: String,
    /// Fencing token issued at claim time.
    pub lease_token: String,
    /// Failure description stored as `last_error`.
    pub error: String,
    /// Instant the job becomes claimable again, when attempts remain.
    pub retry_at: DateTime<Utc>,
}

/// Run listing query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunListQuery {
    /// Optional workflow filter.
    pub workflow_id: Option<String>,
    /// Page size; zero means unbounded.
    pub limit: usize,
}

/// Queue job listing query.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobListQuery {
    /// Optional status filter.
    pub status: Option<QueueJobStatus>,
    /// Optional workflow filter.
    pub workflow_id: Option<String>,
}

/// Audit log query, always scoped to one actor.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditQuery {
    /// Optional workflow filter.
    pub workflow_id: Option<String>,
    /// Optional request filter.
    pub request_id: Option<String>,
}
