use async_trait::async_trait;
use runloom_core::{ActorScope, AppResult};
use runloom_domain::{ApprovalRequirement, PlannerIntent, PolicyDecision, PolicyPack};

/// Evaluation context shared by the policy engine and approval classifier.
#[derive(Debug, Clone, PartialEq)]
pub struct PolicyRequest {
    /// Acting scope.
    pub scope: ActorScope,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Originating objective request.
    pub request_id: String,
    /// Step the intent was planned at.
    pub step_number: u32,
    /// Objective the workflow is pursuing.
    pub objective_prompt: String,
    /// Intent under evaluation.
    pub intent: PlannerIntent,
}

/// Policy engine port; pure with respect to its inputs.
#[async_trait]
pub trait PolicyEngine: Send + Sync {
    /// Evaluates one intent under the resolved policy pack.
    async fn evaluate(
        &self,
        request: &PolicyRequest,
        policy_pack: &PolicyPack,
    ) -> AppResult<PolicyDecision>;
}

/// Approval classifier port; pure with respect to its inputs.
#[async_trait]
pub trait ApprovalClassifier: Send + Sync {
    /// Classifies the approval requirement of one tool-call intent.
    async fn classify(&self, request: &PolicyRequest) -> AppResult<ApprovalRequirement>;
}
