use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, AppError, AppResult, TenantId, WorkspaceId, next_ordered_id};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Payload state value emitted when a run suspends on a waiting workflow.
///
/// Signal ingestion consults the most recent run for this state event before
/// accepting a reply.
pub const WAITING_FOR_SIGNAL_STATE: &str = "waiting_for_signal";

/// User-visible status of one run aggregate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Waiting for a worker.
    Queued,
    /// Claimed and executing.
    Running,
    /// Latest execution attempt succeeded.
    Success,
    /// Latest execution attempt failed terminally.
    Failed,
}

impl RunStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Success => "success",
            Self::Failed => "failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "queued" => Ok(Self::Queued),
            "running" => Ok(Self::Running),
            "success" => Ok(Self::Success),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!("unknown run status '{value}'"))),
        }
    }
}

/// Aggregate summarizing the latest execution attempt of a workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Run identifier.
    pub run_id: String,
    /// Owning agent.
    pub agent_id: String,
    /// Workflow the run executes.
    pub workflow_id: String,
    /// Originating objective request.
    pub request_id: String,
    /// Status.
    pub status: RunStatus,
    /// Number of queue-level retries performed.
    pub retries: u32,
    /// Latest claim timestamp.
    pub started_at: Option<DateTime<Utc>>,
    /// Latest terminal timestamp.
    pub ended_at: Option<DateTime<Utc>>,
    /// Wall-clock latency of the latest successful attempt.
    pub latency_ms: Option<i64>,
    /// Short user-visible failure summary.
    pub error_summary: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Run {
    /// Returns the owning scope.
    #[must_use]
    pub fn scope(&self) -> ActorScope {
        ActorScope::new(self.tenant_id, self.workspace_id)
    }
}

/// Event class in the append-only run-event log.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventType {
    /// Run state transition.
    State,
    /// Informational log line.
    Log,
}

impl RunEventType {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::State => "state",
            Self::Log => "log",
        }
    }
}

/// Severity of one run event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunEventLevel {
    /// Routine event.
    Info,
    /// Degraded but recoverable event.
    Warn,
    /// Failure event.
    Error,
}

impl RunEventLevel {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

/// One append-only run event, totally ordered per run by `ts` then `id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunEvent {
    /// Time-ordered event identifier.
    pub id: String,
    /// Tenant scope, propagated from the originating operation.
    pub tenant_id: TenantId,
    /// Workspace scope, propagated from the originating operation.
    pub workspace_id: WorkspaceId,
    /// Run the event belongs to.
    pub run_id: String,
    /// Event timestamp.
    pub ts: DateTime<Utc>,
    /// Event class.
    pub event_type: RunEventType,
    /// Severity.
    pub level: RunEventLevel,
    /// Human-readable message.
    pub message: String,
    /// Structured payload.
    pub payload: Value,
    /// Correlation identifier threaded through the causing operation.
    pub correlation_id: Option<String>,
    /// Identifier of the event that caused this one.
    pub causation_id: Option<String>,
}

impl RunEvent {
    /// Creates a state-transition event.
    #[must_use]
    pub fn state(
        scope: ActorScope,
        run_id: impl Into<String>,
        message: impl Into<String>,
        payload: Value,
        correlation_id: Option<String>,
    ) -> Self {
        Self::build(
            scope,
            run_id,
            RunEventType::State,
            RunEventLevel::Info,
            message,
            payload,
            correlation_id,
        )
    }

    /// Creates a log event.
    #[must_use]
    pub fn log(
        scope: ActorScope,
        run_id: impl Into<String>,
        level: RunEventLevel,
        message: impl Into<String>,
        payload: Value,
        correlation_id: Option<String>,
    ) -> Self {
        Self::build(
            scope,
            run_id,
            RunEventType::Log,
            level,
            message,
            payload,
            correlation_id,
        )
    }

    fn build(
        scope: ActorScope,
        run_id: impl Into<String>,
        event_type: RunEventType,
        level: RunEventLevel,
        message: impl Into<String>,
        payload: Value,
        correlation_id: Option<String>,
    ) -> Self {
        Self {
            id: next_ordered_id(),
            tenant_id: scope.tenant_id(),
            workspace_id: scope.workspace_id(),
            run_id: run_id.into(),
            ts: Utc::now(),
            event_type,
            level,
            message: message.into(),
            payload,
            correlation_id,
            causation_id: None,
        }
    }

    /// Returns whether this is the waiting-for-signal state event.
    #[must_use]
    pub fn is_waiting_for_signal_state(&self) -> bool {
        self.event_type == RunEventType::State
            && self.payload["state"] == Value::String(WAITING_FOR_SIGNAL_STATE.to_owned())
    }
}
