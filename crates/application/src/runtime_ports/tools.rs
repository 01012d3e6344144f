use async_trait::async_trait;
use runloom_core::{ActorScope, AppResult};
use serde_json::Value;

/// Invocation payload passed to tool executors.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolExecutionInput {
    /// Acting scope.
    pub scope: ActorScope,
    /// Originating objective request.
    pub request_id: String,
    /// Workflow performing the call.
    pub workflow_id: String,
    /// Step the call executes at.
    pub step_number: u32,
    /// Registered tool name.
    pub tool_name: String,
    /// JSON object arguments.
    pub args: Value,
    /// Correlation identifier threaded from the runner.
    pub correlation_id: Option<String>,
}

/// Tool execution port.
///
/// Implemented by the tool registry, by individual tool registrations, and by
/// the explicit fallback executor an embedder may configure instead of a
/// registry.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Executes one tool call and returns its JSON result.
    async fn execute(&self, input: ToolExecutionInput) -> AppResult<Value>;
}
