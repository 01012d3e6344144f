use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, AppResult, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One side-effecting action routed through the adapter layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdapterAction {
    /// Tool the action belongs to.
    pub tool_name: String,
    /// Originating objective request.
    pub request_id: String,
    /// Step performing the action.
    pub step_number: u32,
    /// Action payload forwarded to the provider.
    pub payload: Value,
}

/// Scoped credentials resolved for one adapter call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterCredentials {
    /// Tenant the credentials belong to.
    pub tenant_id: TenantId,
    /// Workspace the credentials belong to.
    pub workspace_id: WorkspaceId,
    /// Opaque reference into the credential vault.
    pub secret_ref: String,
}

/// Outcome of one adapter execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AdapterResponse {
    /// The provider accepted the action.
    Ok {
        /// Provider result payload.
        result: Value,
    },
    /// The provider rejected the action or was unreachable.
    Error {
        /// Provider error code, e.g. `HTTP_429`.
        code: Option<String>,
        /// Human-readable error message.
        message: String,
        /// Whether the provider itself labeled the failure retryable.
        retryable: bool,
    },
}

impl AdapterResponse {
    /// Returns whether the response is a success.
    #[must_use]
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }
}

/// Side-effect execution port wrapped by the idempotency and retry
/// decorators.
#[async_trait]
pub trait ActionAdapter: Send + Sync {
    /// Executes one action against the external provider.
    async fn execute(
        &self,
        action: &AdapterAction,
        scope: &ActorScope,
        credentials: &AdapterCredentials,
    ) -> AppResult<AdapterResponse>;
}

/// Credential vault port.
#[async_trait]
pub trait CredentialsResolver: Send + Sync {
    /// Resolves credentials for one scope and tool.
    async fn resolve(
        &self,
        scope: &ActorScope,
        tool_name: &str,
    ) -> AppResult<AdapterCredentials>;
}

/// Terminal classification of one retry sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryTerminalReason {
    /// The failure was classified non-retryable.
    NonRetryable,
    /// Every permitted attempt failed.
    MaxAttemptsExhausted,
}

impl RetryTerminalReason {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NonRetryable => "non_retryable",
            Self::MaxAttemptsExhausted => "max_attempts_exhausted",
        }
    }
}

/// Telemetry record written after every retry-decorated attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryAttemptRecord {
    /// Tool the attempt belongs to.
    pub tool_name: String,
    /// One-based attempt number.
    pub attempt_number: u32,
    /// Provider error code, when the attempt failed.
    pub error_code: Option<String>,
    /// Provider error message, when the attempt failed.
    pub error_message: Option<String>,
    /// Whether the failure was classified retryable.
    pub retryable: bool,
    /// Backoff applied after the attempt, in milliseconds.
    pub delay_ms: u64,
    /// Terminal reason when the sequence stopped at this attempt.
    pub terminal_reason: Option<RetryTerminalReason>,
    /// Attempt timestamp.
    pub occurred_at: DateTime<Utc>,
}

/// Sink port for retry attempt telemetry.
#[async_trait]
pub trait RetryAttemptSink: Send + Sync {
    /// Records one attempt.
    async fn record_attempt(&self, record: RetryAttemptRecord) -> AppResult<()>;
}
