use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use runloom_core::{ActorScope, AppError, AppResult, TenantId, WorkspaceId};
use runloom_domain::{
    ApprovalRequirement, PlannerInput, PlannerIntent, PlannerStepStatus, SignalType,
    WorkflowStatus,
};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tokio::sync::Mutex;

use crate::planner_loop::{
    EvaluateApprovalStage, ExecuteToolStage, PlannerLoopEngine, PlannerLoopRequest,
    PlannerLoopResult,
};
use crate::runtime_ports::{
    PlannerProvider, PolicyRequest, ToolExecutionInput, WorkflowStore,
};
use crate::signal_service::{ResumeWithSignalInput, SignalService};


/// One step in a replay trace.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayTraceStep {
    /// Zero-based step number.
    pub step_number: u32,
    /// Step status.
    pub status: PlannerStepStatus,
    /// Stable intent type value.
    pub intent_type: String,
    /// Planner intent captured for the step.
    pub planner_intent: PlannerIntent,
    /// Planner input captured for the step.
    pub planner_input: PlannerInput,
    /// Tool result, when the step executed a tool.
    pub tool_result: Option<Value>,
}

/// Deterministic projection of a workflow sufficient to reproduce its step
/// sequence without external side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplayTrace {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Originating objective request.
    pub request_id: String,
    /// Objective the workflow pursued.
    pub objective_prompt: String,
    /// Ordered step projections.
    pub steps: Vec<ReplayTraceStep>,
    /// Completion payload, when the workflow completed.
    pub completion: Option<Value>,
    /// Waiting question, when the workflow suspended on input.
    pub waiting_question: Option<String>,
}

/// One detected divergence between two replay traces.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayDrift {
    /// Step the drift was detected at; absent for trace-level drift.
    pub step_number: Option<u32>,
    /// Field that diverged.
    pub field: String,
    /// Expected value.
    pub expected: String,
    /// Actual value.
    pub actual: String,
}

/// Builds and re-executes replay traces.
#[derive(Clone)]
pub struct ReplayService {
    store: Arc<dyn WorkflowStore>,
}

impl ReplayService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Projects one workflow into a replay trace.
    ///
    /// The actor scope must match the workflow scope unless
    /// `allow_cross_tenant_read` is passed explicitly.
    pub async fn build_replay_trace(
        &self,
        actor: &ActorScope,
        workflow_scope: &ActorScope,
        workflow_id: &str,
        allow_cross_tenant_read: bool,
    ) -> AppResult<ReplayTrace> {
        if !allow_cross_tenant_read {
            actor.ensure_owns(workflow_scope, "workflow")?;
        }

        let snapshot = self
            .store
            .get_workflow_runtime_snapshot(workflow_scope, workflow_id)
            .await?
            .ok_or_else(|| AppError::Validation("workflow not found".to_owned()))?;

        Ok(ReplayTrace {
            tenant_id: snapshot.tenant_id,
            workspace_id: snapshot.workspace_id,
            workflow_id: snapshot.workflow_id.clone(),
            request_id: snapshot.request_id.clone(),
            objective_prompt: snapshot.objective_prompt.clone(),
            steps: snapshot
                .steps
                .iter()
                .map(|step| ReplayTraceStep {
                    step_number: step.step_number,
                    status: step.status,
                    intent_type: step.intent_type.clone(),
                    planner_intent: step.planner_intent.clone(),
                    planner_input: step.planner_input.clone(),
                    tool_result: step.tool_result.clone(),
                })
                .collect(),
            completion: snapshot.completion.clone(),
            waiting_question: snapshot.waiting_question.clone(),
        })
    }

    /// Re-executes a trace against a scratch store with scripted planner and
    /// tool stages, reproducing the recorded step sequence without invoking
    /// any external side effect.
    pub async fn replay_trace(
        &self,
        trace: &ReplayTrace,
        scratch_store: Arc<dyn WorkflowStore>,
    ) -> AppResult<PlannerLoopResult> {
        let scope = ActorScope::new(trace.tenant_id, trace.workspace_id);
        let script = Arc::new(ReplayScript::from_trace(trace));

        let engine = PlannerLoopEngine::new(scratch_store.clone(), script.clone())
            .with_approval_stage(script.clone())
            .with_execution_stage(script)
            .with_max_steps(u32::try_from(trace.steps.len()).unwrap_or(u32::MAX).max(1));

        let request = PlannerLoopRequest {
            scope,
            workflow_id: trace.workflow_id.clone(),
            run_id: format!("replay-{}", trace.workflow_id),
            agent_id: "replay".to_owned(),
            request_id: trace.request_id.clone(),
            thread_id: None,
            objective_prompt: trace.objective_prompt.clone(),
            max_steps: None,
            correlation_id: None,
        };

        let signals = SignalService::new(scratch_store.clone());

        loop {
            let outcome = engine.run_planner_loop(request.clone()).await;
            let result = match outcome {
                Ok(result) => result,
                // Terminal failures (max-step guard, policy block) already
                // committed the failed snapshot; surface it as the result.
                Err(_) => {
                    let snapshot = scratch_store
                        .get_workflow_runtime_snapshot(&scope, trace.workflow_id.as_str())
                        .await?
                        .ok_or_else(|| {
                            AppError::Internal("replay produced no workflow snapshot".to_owned())
                        })?;
                    return Ok(PlannerLoopResult {
                        workflow_id: snapshot.workflow_id.clone(),
                        status: snapshot.status,
                        steps: snapshot.steps.clone(),
                        waiting_question: snapshot.waiting_question.clone(),
                        completion: snapshot.completion.clone(),
                    });
                }
            };

            if result.status != WorkflowStatus::WaitingSignal
                || result.steps.len() >= trace.steps.len()
            {
                return Ok(result);
            }

            // The original continued past this suspension, so replay the
            // resolving signal.
            let snapshot = scratch_store
                .get_workflow_runtime_snapshot(&scope, trace.workflow_id.as_str())
                .await?
                .ok_or_else(|| {
                    AppError::Internal("replay lost its workflow snapshot".to_owned())
                })?;

            let resume = if snapshot.pending_approval.is_some() {
                ResumeWithSignalInput {
                    scope,
                    workflow_id: trace.workflow_id.clone(),
                    signal_type: SignalType::Approval,
                    payload: json!({"approved": true, "approverId": "replay"}),
                    occurred_at: None,
                    correlation_id: None,
                }
            } else {
                ResumeWithSignalInput {
                    scope,
                    workflow_id: trace.workflow_id.clone(),
                    signal_type: SignalType::UserInput,
                    payload: json!({"message": "replay"}),
                    occurred_at: None,
                    correlation_id: None,
                }
            };

            signals.resume_with_signal(resume).await?;
        }
    }
}

/// Compares two traces and returns the deterministic per-step drift list.
#[must_use]
pub fn diff_replay_snapshot(expected: &ReplayTrace, actual: &ReplayTrace) -> Vec<ReplayDrift> {
    let mut drifts = Vec::new();

    if expected.steps.len() != actual.steps.len() {
        drifts.push(ReplayDrift {
            step_number: None,
            field: "step_count".to_owned(),
            expected: expected.steps.len().to_string(),
            actual: actual.steps.len().to_string(),
        });
    }

    for (expected_step, actual_step) in expected.steps.iter().zip(actual.steps.iter()) {
        if expected_step.status != actual_step.status {
            drifts.push(ReplayDrift {
                step_number: Some(expected_step.step_number),
                field: "status".to_owned(),
                expected: expected_step.status.as_str().to_owned(),
                actual: actual_step.status.as_str().to_owned(),
            });
        }

        if expected_step.intent_type != actual_step.intent_type {
            drifts.push(ReplayDrift {
                step_number: Some(expected_step.step_number),
                field: "intent_type".to_owned(),
                expected: expected_step.intent_type.clone(),
                actual: actual_step.intent_type.clone(),
            });
        }

        let expected_tool = expected_step.planner_intent.tool_name().unwrap_or_default();
        let actual_tool = actual_step.planner_intent.tool_name().unwrap_or_default();
        if expected_tool != actual_tool {
            drifts.push(ReplayDrift {
                step_number: Some(expected_step.step_number),
                field: "tool_name".to_owned(),
                expected: expected_tool.to_owned(),
                actual: actual_tool.to_owned(),
            });
        }
    }

    drifts
}

/// Scripted planner, approval, and tool stages backed by a recorded trace.
struct ReplayScript {
    intents: Mutex<VecDeque<PlannerIntent>>,
    tool_results: Mutex<VecDeque<Value>>,
    gated_steps: Vec<u32>,
}

impl ReplayScript {
    fn from_trace(trace: &ReplayTrace) -> Self {
        let mut intents = VecDeque::new();
        let mut tool_results = VecDeque::new();
        let mut gated_steps = Vec::new();

        for (index, step) in trace.steps.iter().enumerate() {
            let follows_gate = index
                .checked_sub(1)
                .and_then(|previous| trace.steps.get(previous))
                .is_some_and(|previous| {
                    previous.status == PlannerStepStatus::WaitingSignal
                        && previous.planner_intent == step.planner_intent
                        && step.status == PlannerStepStatus::ToolExecuted
                });

            // Steps that execute a previously gated intent did not come from
            // a plan call; everything else replays through the planner.
            if !follows_gate {
                intents.push_back(step.planner_intent.clone());
            }

            if step.status == PlannerStepStatus::WaitingSignal
                && matches!(step.planner_intent, PlannerIntent::ToolCall { .. })
            {
                gated_steps.push(step.step_number);
            }

            if let Some(result) = &step.tool_result {
                tool_results.push_back(result.clone());
            }
        }

        Self {
            intents: Mutex::new(intents),
            tool_results: Mutex::new(tool_results),
            gated_steps,
        }
    }
}

#[async_trait]
impl PlannerProvider for ReplayScript {
    async fn plan(&self, _input: &PlannerInput) -> AppResult<PlannerIntent> {
        self.intents.lock().await.pop_front().ok_or_else(|| {
            AppError::Validation("replay script has no further planner intents".to_owned())
        })
    }
}

#[async_trait]
impl EvaluateApprovalStage for ReplayScript {
    async fn evaluate_approval(&self, request: &PolicyRequest) -> AppResult<ApprovalRequirement> {
        let gated = self.gated_steps.contains(&request.step_number);
        Ok(ApprovalRequirement {
            risk_class: if gated { "replayed" } else { "low" }.to_owned(),
            requires_approval: gated,
            reason_code: "replay_script".to_owned(),
        })
    }
}

#[async_trait]
impl ExecuteToolStage for ReplayScript {
    async fn execute_tool(&self, _input: ToolExecutionInput) -> AppResult<Value> {
        self.tool_results.lock().await.pop_front().ok_or_else(|| {
            AppError::Validation("replay script has no further tool results".to_owned())
        })
    }
}
