use chrono::{DateTime, Utc};
use runloom_core::{AppError, AppResult, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};

/// Event classes recorded in the append-only audit log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    /// Policy engine allowed an intent.
    PolicyAllow,
    /// Policy engine rewrote an intent.
    PolicyRewrite,
    /// Policy engine blocked an intent.
    PolicyBlock,
    /// Approval gate activated.
    ApprovalPending,
    /// Approval gate resolved approved.
    ApprovalApproved,
    /// Approval gate resolved rejected.
    ApprovalRejected,
    /// Workflow reached the completed terminal state.
    WorkflowTerminalCompleted,
    /// Workflow reached the failed terminal state.
    WorkflowTerminalFailed,
}

impl AuditEventType {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PolicyAllow => "policy_allow",
            Self::PolicyRewrite => "policy_rewrite",
            Self::PolicyBlock => "policy_block",
            Self::ApprovalPending => "approval_pending",
            Self::ApprovalApproved => "approval_approved",
            Self::ApprovalRejected => "approval_rejected",
            Self::WorkflowTerminalCompleted => "workflow_terminal_completed",
            Self::WorkflowTerminalFailed => "workflow_terminal_failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "policy_allow" => Ok(Self::PolicyAllow),
            "policy_rewrite" => Ok(Self::PolicyRewrite),
            "policy_block" => Ok(Self::PolicyBlock),
            "approval_pending" => Ok(Self::ApprovalPending),
            "approval_approved" => Ok(Self::ApprovalApproved),
            "approval_rejected" => Ok(Self::ApprovalRejected),
            "workflow_terminal_completed" => Ok(Self::WorkflowTerminalCompleted),
            "workflow_terminal_failed" => Ok(Self::WorkflowTerminalFailed),
            _ => Err(AppError::Validation(format!(
                "unknown audit event type '{value}'"
            ))),
        }
    }
}

/// One append-only audit row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditRecord {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Audit row identifier.
    pub audit_id: String,
    /// Workflow the event belongs to.
    pub workflow_id: String,
    /// Originating objective request.
    pub request_id: String,
    /// Step the event applies to, when step-scoped.
    pub step_number: Option<u32>,
    /// Event class.
    pub event_type: AuditEventType,
    /// Correlation identifier of the signal that caused the event.
    pub signal_correlation_id: Option<String>,
    /// Human-readable detail.
    pub detail: String,
    /// Event timestamp.
    pub occurred_at: DateTime<Utc>,
}
