use async_trait::async_trait;
use runloom_core::{ActorScope, AppResult};
use runloom_domain::{
    ApprovalRequirement, PendingSignalSummary, PlannerInput, PlannerIntent, PolicyDecision,
    PolicyPack, PriorStepSummary, ToolMetadata,
};
use serde_json::Value;

use crate::runtime_ports::{PolicyRequest, ToolExecutionInput};

/// Materialized collaborator outputs handed to the context-building stage.
///
/// The engine gathers these from the snapshot and its read-only collaborators
/// so the stage itself stays pure.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanningContextSeed {
    /// Acting scope.
    pub scope: ActorScope,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Objective the workflow is pursuing.
    pub objective_prompt: String,
    /// Opaque memory context from the memory provider.
    pub memory_context: Value,
    /// Ordered summaries of every persisted step.
    pub prior_step_summaries: Vec<PriorStepSummary>,
    /// Inbox signals not yet consumed by a planner iteration.
    pub pending_signals: Vec<PendingSignalSummary>,
    /// Policy constraint sentences surfaced to the planner.
    pub policy_constraints: Vec<String>,
    /// Tools available to the acting scope.
    pub available_tools: Vec<ToolMetadata>,
    /// Zero-based index of the step being planned.
    pub step_index: u32,
}

/// Overridable stage 1: assembles the planner input.
#[async_trait]
pub trait BuildPlanningContextStage: Send + Sync {
    /// Builds the planner input for one iteration.
    async fn build_planning_context(&self, seed: PlanningContextSeed) -> AppResult<PlannerInput>;
}

/// Overridable stage 3: structural intent validation.
pub trait ValidateIntentStage: Send + Sync {
    /// Validates one intent structurally.
    fn validate_intent(&self, intent: &PlannerIntent) -> AppResult<()>;
}

/// Output of the policy stage: the engine verdict plus the pack it was
/// evaluated under.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyStageDecision {
    /// Policy engine verdict.
    pub decision: PolicyDecision,
    /// Policy pack resolved for the evaluation.
    pub policy_pack: PolicyPack,
}

/// Overridable stage 4: policy pack resolution plus engine evaluation.
#[async_trait]
pub trait EvaluatePolicyStage: Send + Sync {
    /// Evaluates one intent and returns the verdict with its pack.
    async fn evaluate_policy(&self, request: &PolicyRequest) -> AppResult<PolicyStageDecision>;
}

/// Overridable stage 5: approval classification for tool-call intents.
#[async_trait]
pub trait EvaluateApprovalStage: Send + Sync {
    /// Classifies the approval requirement of one intent.
    async fn evaluate_approval(&self, request: &PolicyRequest) -> AppResult<ApprovalRequirement>;
}

/// Overridable stage 6: tool invocation for tool-call intents.
///
/// The ask-user and complete arms of the execute stage are pure bookkeeping
/// and stay inside the engine's step transaction.
#[async_trait]
pub trait ExecuteToolStage: Send + Sync {
    /// Executes one tool call.
    async fn execute_tool(&self, input: ToolExecutionInput) -> AppResult<Value>;
}
