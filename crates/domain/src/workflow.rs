use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, AppError, AppResult, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::planner::{PlannerIntent, PlannerStepRecord};
use crate::policy::ApprovalStatus;

/// Workflow lifecycle status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowStatus {
    /// Workflow is executing planner iterations.
    Running,
    /// Workflow is suspended until a signal arrives.
    WaitingSignal,
    /// Workflow finished successfully. Terminal.
    Completed,
    /// Workflow failed. Terminal.
    Failed,
}

impl WorkflowStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::WaitingSignal => "waiting_signal",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "running" => Ok(Self::Running),
            "waiting_signal" => Ok(Self::WaitingSignal),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown workflow status '{value}'"
            ))),
        }
    }

    /// Returns whether the status is terminal.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }

    /// Returns whether the state machine permits moving to `next`.
    ///
    /// Terminal states are sticky; a waiting workflow leaves only through a
    /// resume (back to running) or an approval rejection (to failed).
    #[must_use]
    pub fn can_transition_to(&self, next: WorkflowStatus) -> bool {
        match self {
            Self::Running => true,
            Self::WaitingSignal => matches!(next, Self::Running | Self::Failed),
            Self::Completed | Self::Failed => false,
        }
    }

    /// Fails with a conflict when the transition to `next` is illegal.
    pub fn ensure_transition_to(&self, next: WorkflowStatus) -> AppResult<()> {
        if *self == next && *self == Self::Running {
            return Ok(());
        }

        if *self != next && self.can_transition_to(next) {
            return Ok(());
        }

        Err(AppError::Conflict(format!(
            "illegal workflow transition from '{}' to '{}'",
            self.as_str(),
            next.as_str()
        )))
    }
}

/// Approval gate state persisted on a workflow while a tool intent awaits a
/// human decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingApproval {
    /// Approval decision identifier.
    pub approval_id: String,
    /// Gate status.
    pub status: ApprovalStatus,
    /// Intent stored so it executes exactly once after approval.
    pub intent: PlannerIntent,
    /// Risk class assigned by the approval classifier.
    pub risk_class: String,
    /// Classifier reason code.
    pub reason_code: String,
}

/// Durable workflow instance state.
///
/// The snapshot is the unit of optimistic concurrency: every step mutation
/// carries the version it read and the store rejects stale writers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowRuntimeSnapshot {
    /// Tenant scope. Immutable.
    pub tenant_id: TenantId,
    /// Workspace scope. Immutable.
    pub workspace_id: WorkspaceId,
    /// Workflow identifier. Immutable.
    pub workflow_id: String,
    /// Run aggregate the workflow reports into.
    pub run_id: String,
    /// Agent that owns the workflow.
    pub agent_id: String,
    /// Objective request that started the workflow. Immutable.
    pub request_id: String,
    /// Optional conversation thread identifier. Immutable.
    pub thread_id: Option<String>,
    /// Objective the workflow is pursuing.
    pub objective_prompt: String,
    /// Lifecycle status.
    pub status: WorkflowStatus,
    /// Ordered planner step records. Append-only.
    pub steps: Vec<PlannerStepRecord>,
    /// Question surfaced to the user while waiting on input.
    pub waiting_question: Option<String>,
    /// Completion payload once the workflow completed.
    pub completion: Option<Value>,
    /// Approval gate state, when an intent awaits a decision.
    pub pending_approval: Option<PendingApproval>,
    /// Failure message once the workflow failed.
    pub failure_reason: Option<String>,
    /// Optimistic concurrency version assigned by the store.
    pub version: u64,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl WorkflowRuntimeSnapshot {
    /// Creates the initial running snapshot for a workflow.
    #[must_use]
    pub fn running(input: NewWorkflowSnapshot) -> Self {
        let now = Utc::now();
        Self {
            tenant_id: input.scope.tenant_id(),
            workspace_id: input.scope.workspace_id(),
            workflow_id: input.workflow_id,
            run_id: input.run_id,
            agent_id: input.agent_id,
            request_id: input.request_id,
            thread_id: input.thread_id,
            objective_prompt: input.objective_prompt,
            status: WorkflowStatus::Running,
            steps: Vec::new(),
            waiting_question: None,
            completion: None,
            pending_approval: None,
            failure_reason: None,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Returns the owning scope.
    #[must_use]
    pub fn scope(&self) -> ActorScope {
        ActorScope::new(self.tenant_id, self.workspace_id)
    }

    /// Returns the number of persisted steps.
    #[must_use]
    pub fn step_count(&self) -> u32 {
        u32::try_from(self.steps.len()).unwrap_or(u32::MAX)
    }

    /// Validates internal consistency: dense step numbering and uniform scope.
    pub fn ensure_consistent(&self) -> AppResult<()> {
        for (index, step) in self.steps.iter().enumerate() {
            let expected = u32::try_from(index).unwrap_or(u32::MAX);
            if step.step_number != expected {
                return Err(AppError::Validation(format!(
                    "workflow '{}' step numbers must be dense; expected {expected}, found {}",
                    self.workflow_id, step.step_number
                )));
            }

            if step.tenant_id != self.tenant_id
                || step.workspace_id != self.workspace_id
                || step.workflow_id != self.workflow_id
            {
                return Err(AppError::Validation(format!(
                    "workflow '{}' step {expected} carries a foreign scope",
                    self.workflow_id
                )));
            }
        }

        if self.status == WorkflowStatus::WaitingSignal
            && self.waiting_question.is_none()
            && self.pending_approval.is_none()
        {
            return Err(AppError::Validation(format!(
                "waiting workflow '{}' must carry a question or a pending approval",
                self.workflow_id
            )));
        }

        Ok(())
    }
}

/// Input payload for the initial workflow snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewWorkflowSnapshot {
    /// Owning scope.
    pub scope: ActorScope,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Run aggregate identifier.
    pub run_id: String,
    /// Owning agent identifier.
    pub agent_id: String,
    /// Originating objective request identifier.
    pub request_id: String,
    /// Optional conversation thread identifier.
    pub thread_id: Option<String>,
    /// Objective prompt.
    pub objective_prompt: String,
}

/// Sentinel row that gates signal-based resumption.
///
/// Exists iff the owning workflow is in `waiting_signal`; consumed exactly
/// once by the resume transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WaitingCheckpoint {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Installation timestamp.
    pub created_at: DateTime<Utc>,
}

impl WaitingCheckpoint {
    /// Creates a checkpoint for one workflow.
    #[must_use]
    pub fn new(scope: ActorScope, workflow_id: impl Into<String>) -> Self {
        Self {
            tenant_id: scope.tenant_id(),
            workspace_id: scope.workspace_id(),
            workflow_id: workflow_id.into(),
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::WorkflowStatus;

    #[test]
    fn running_reaches_every_state() {
        let running = WorkflowStatus::Running;
        assert!(running.ensure_transition_to(WorkflowStatus::Running).is_ok());
        assert!(
            running
                .ensure_transition_to(WorkflowStatus::WaitingSignal)
                .is_ok()
        );
        assert!(
            running
                .ensure_transition_to(WorkflowStatus::Completed)
                .is_ok()
        );
        assert!(running.ensure_transition_to(WorkflowStatus::Failed).is_ok());
    }

    #[test]
    fn waiting_resumes_or_fails_only() {
        let waiting = WorkflowStatus::WaitingSignal;
        assert!(waiting.ensure_transition_to(WorkflowStatus::Running).is_ok());
        assert!(waiting.ensure_transition_to(WorkflowStatus::Failed).is_ok());
        assert!(
            waiting
                .ensure_transition_to(WorkflowStatus::Completed)
                .is_err()
        );
        assert!(
            waiting
                .ensure_transition_to(WorkflowStatus::WaitingSignal)
                .is_err()
        );
    }

    #[test]
    fn terminal_states_are_sticky() {
        for terminal in [WorkflowStatus::Completed, WorkflowStatus::Failed] {
            for next in [
                WorkflowStatus::Running,
                WorkflowStatus::WaitingSignal,
                WorkflowStatus::Completed,
                WorkflowStatus::Failed,
            ] {
                assert!(terminal.ensure_transition_to(next).is_err());
            }
        }
    }
}
