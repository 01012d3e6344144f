use chrono::{DateTime, Utc};
use runloom_core::{AppError, AppResult, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Contract tag carried by every planner input so planner implementations can
/// reject payload shapes they were not built for.
pub const PLANNER_INPUT_CONTRACT_VERSION: &str = "planner-input/v1";

/// One decision emitted by the plan stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PlannerIntent {
    /// Invoke a named tool with a JSON object argument payload.
    ToolCall {
        /// Registered tool name.
        tool_name: String,
        /// JSON object arguments passed to the tool.
        args: Value,
    },
    /// Pause the workflow and ask the user a question.
    AskUser {
        /// Question surfaced to the user.
        question: String,
    },
    /// Finish the workflow.
    Complete {
        /// Optional JSON object recorded as the workflow completion.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        output: Option<Value>,
    },
}

impl PlannerIntent {
    /// Returns stable intent type value.
    #[must_use]
    pub fn intent_type(&self) -> &'static str {
        match self {
            Self::ToolCall { .. } => "tool_call",
            Self::AskUser { .. } => "ask_user",
            Self::Complete { .. } => "complete",
        }
    }

    /// Returns the tool name for tool-call intents.
    #[must_use]
    pub fn tool_name(&self) -> Option<&str> {
        match self {
            Self::ToolCall { tool_name, .. } => Some(tool_name.as_str()),
            Self::AskUser { .. } | Self::Complete { .. } => None,
        }
    }
}

/// Structurally validates one planner intent.
///
/// Validation is exhaustive per variant and deterministic; it never inspects
/// tool semantics.
pub fn validate_intent(intent: &PlannerIntent) -> AppResult<()> {
    match intent {
        PlannerIntent::ToolCall { tool_name, args } => {
            if tool_name.trim().is_empty() {
                return Err(AppError::Validation(
                    "tool_call intent requires a non-empty tool_name".to_owned(),
                ));
            }

            if !args.is_object() {
                return Err(AppError::Validation(
                    "tool_call intent args must be a JSON object".to_owned(),
                ));
            }

            Ok(())
        }
        PlannerIntent::AskUser { question } => {
            if question.trim().is_empty() {
                return Err(AppError::Validation(
                    "ask_user intent requires a non-empty question".to_owned(),
                ));
            }

            Ok(())
        }
        PlannerIntent::Complete { output } => {
            if let Some(output) = output
                && !output.is_object()
            {
                return Err(AppError::Validation(
                    "complete intent output must be a JSON object when provided".to_owned(),
                ));
            }

            Ok(())
        }
    }
}

/// Terminal status of one persisted planner step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlannerStepStatus {
    /// Step executed a tool and the workflow keeps running.
    ToolExecuted,
    /// Step suspended the workflow until a signal arrives.
    WaitingSignal,
    /// Step completed the workflow.
    Completed,
    /// Step failed the workflow.
    Failed,
}

impl PlannerStepStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ToolExecuted => "tool_executed",
            Self::WaitingSignal => "waiting_signal",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "tool_executed" => Ok(Self::ToolExecuted),
            "waiting_signal" => Ok(Self::WaitingSignal),
            "completed" => Ok(Self::Completed),
            "failed" => Ok(Self::Failed),
            _ => Err(AppError::Validation(format!(
                "unknown planner step status '{value}'"
            ))),
        }
    }
}

/// Tool descriptor surfaced to the planner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolMetadata {
    /// Registered tool name.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
}

/// Compact summary of one persisted planner step.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriorStepSummary {
    /// Zero-based step number.
    pub step_number: u32,
    /// Intent type value of the step.
    pub intent_type: String,
    /// Step status.
    pub status: PlannerStepStatus,
    /// Tool name when the step carried a tool-call intent.
    pub tool_name: Option<String>,
}

/// Unconsumed inbound signal surfaced to the planner on loop re-entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PendingSignalSummary {
    /// Signal identifier.
    pub signal_id: String,
    /// Stable signal type value.
    pub signal_type: String,
    /// Signal payload.
    pub payload: Value,
}

/// Input assembled for one plan-stage invocation.
///
/// Built purely from the persisted workflow snapshot plus injected read-only
/// collaborators so that replay reproduces it byte for byte.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerInput {
    /// Contract version tag.
    pub contract_version: String,
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Objective the workflow is pursuing.
    pub objective_prompt: String,
    /// Opaque memory context from the injected memory provider.
    pub memory_context: Value,
    /// Ordered summaries of every persisted step.
    pub prior_step_summaries: Vec<PriorStepSummary>,
    /// Inbound signals not yet consumed by a planner iteration.
    pub pending_signals: Vec<PendingSignalSummary>,
    /// Policy constraint sentences surfaced to the planner.
    pub policy_constraints: Vec<String>,
    /// Tools the planner may call, already filtered by scope authorization.
    pub available_tools: Vec<ToolMetadata>,
    /// Zero-based index of the step being planned.
    pub step_index: u32,
}

/// Persisted record of one planner loop step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlannerStepRecord {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Zero-based dense step number.
    pub step_number: u32,
    /// Stable intent type value.
    pub intent_type: String,
    /// Step status.
    pub status: PlannerStepStatus,
    /// Planner input captured for replay.
    pub planner_input: PlannerInput,
    /// Planner intent captured for replay.
    pub planner_intent: PlannerIntent,
    /// Tool result when the step executed a tool.
    pub tool_result: Option<Value>,
    /// Step creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl PlannerStepRecord {
    /// Returns the compact summary used in later planner inputs.
    #[must_use]
    pub fn summary(&self) -> PriorStepSummary {
        PriorStepSummary {
            step_number: self.step_number,
            intent_type: self.intent_type.clone(),
            status: self.status,
            tool_name: self.planner_intent.tool_name().map(ToOwned::to_owned),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PlannerIntent, validate_intent};

    #[test]
    fn tool_call_requires_tool_name() {
        let intent = PlannerIntent::ToolCall {
            tool_name: "  ".to_owned(),
            args: json!({}),
        };

        assert!(validate_intent(&intent).is_err());
    }

    #[test]
    fn tool_call_requires_object_args() {
        let intent = PlannerIntent::ToolCall {
            tool_name: "calendar.find_slots".to_owned(),
            args: json!("invalid"),
        };

        assert!(validate_intent(&intent).is_err());
    }

    #[test]
    fn ask_user_requires_question() {
        let intent = PlannerIntent::AskUser {
            question: String::new(),
        };

        assert!(validate_intent(&intent).is_err());
    }

    #[test]
    fn complete_allows_missing_output() {
        let intent = PlannerIntent::Complete { output: None };
        assert!(validate_intent(&intent).is_ok());
    }

    #[test]
    fn complete_rejects_non_object_output() {
        let intent = PlannerIntent::Complete {
            output: Some(json!([1, 2])),
        };

        assert!(validate_intent(&intent).is_err());
    }

    #[test]
    fn intents_serialize_with_stable_type_tags() {
        let intent = PlannerIntent::AskUser {
            question: "Which interviewer?".to_owned(),
        };

        let encoded = serde_json::to_value(&intent).unwrap_or_default();
        assert_eq!(encoded["type"], json!("ask_user"));
    }
}
