use std::sync::Arc;

use chrono::Utc;
use runloom_core::{ActorScope, AppError, AppResult, next_ordered_id};
use runloom_domain::{
    ApprovalDecisionRecord, ApprovalRequirement, ApprovalStatus, AuditEventType, AuditRecord,
    NewWorkflowSnapshot, PLANNER_INPUT_CONTRACT_VERSION, PendingApproval, PendingSignalSummary,
    PlannerInput, PlannerIntent, PlannerStepRecord, PlannerStepStatus, PolicyDecision,
    PolicyDecisionRecord, PolicyOutcome, PolicyPack, WorkflowQueueJob, WorkflowRuntimeSnapshot,
    WorkflowStatus, validate_intent,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::runtime_ports::{
    ApprovalClassifier, MemoryProvider, PlannerProvider, PolicyEngine, PolicyRequest,
    ToolExecutionInput, ToolExecutor, WorkflowCheckpointAction, WorkflowMutation, WorkflowStore,
};
use crate::tool_registry::ToolRegistry;

mod defaults;
mod job_executor;
mod stages;

pub use defaults::{DefaultApprovalClassifier, DefaultMemoryProvider, DefaultPolicyEngine};
pub use job_executor::PlannerLoopJobExecutor;
pub use stages::{
    BuildPlanningContextStage, EvaluateApprovalStage, EvaluatePolicyStage, ExecuteToolStage,
    PlanningContextSeed, PolicyStageDecision, ValidateIntentStage,
};

/// Step ceiling applied when a request does not carry its own.
pub const DEFAULT_MAX_STEPS: u32 = 32;

/// One planner loop entry request.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerLoopRequest {
    /// Acting scope.
    pub scope: ActorScope,
    /// Workflow to drive.
    pub workflow_id: String,
    /// Run aggregate the workflow reports into.
    pub run_id: String,
    /// Agent that owns the workflow.
    pub agent_id: String,
    /// Originating objective request.
    pub request_id: String,
    /// Optional conversation thread identifier.
    pub thread_id: Option<String>,
    /// Objective the workflow pursues.
    pub objective_prompt: String,
    /// Per-run step ceiling override.
    pub max_steps: Option<u32>,
    /// Correlation identifier threaded from the runner.
    pub correlation_id: Option<String>,
}

impl PlannerLoopRequest {
    /// Builds a loop request from one claimed queue job.
    #[must_use]
    pub fn for_job(job: &WorkflowQueueJob) -> Self {
        Self {
            scope: job.scope(),
            workflow_id: job.workflow_id.clone(),
            run_id: job.run_id.clone(),
            agent_id: job.agent_id.clone(),
            request_id: job.request_id.clone(),
            thread_id: job.thread_id.clone(),
            objective_prompt: job.objective_prompt.clone(),
            max_steps: None,
            correlation_id: Some(job.job_id.clone()),
        }
    }
}

/// Snapshot-derived outcome of one planner loop entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PlannerLoopResult {
    /// Workflow identifier.
    pub workflow_id: String,
    /// Workflow status after the loop returned.
    pub status: WorkflowStatus,
    /// Every persisted step.
    pub steps: Vec<PlannerStepRecord>,
    /// Question the workflow is waiting on, when suspended for input.
    pub waiting_question: Option<String>,
    /// Completion payload, when completed.
    pub completion: Option<Value>,
}

impl PlannerLoopResult {
    fn from_snapshot(snapshot: &WorkflowRuntimeSnapshot) -> Self {
        Self {
            workflow_id: snapshot.workflow_id.clone(),
            status: snapshot.status,
            steps: snapshot.steps.clone(),
            waiting_question: snapshot.waiting_question.clone(),
            completion: snapshot.completion.clone(),
        }
    }
}

/// Transactional driver of the plan → validate → policy → approval → execute
/// pipeline.
///
/// Each iteration commits exactly one workflow mutation; suspension happens
/// only at the plan and tool-execution stages. All six stages are
/// independently overridable; defaults live next to the engine.
#[derive(Clone)]
pub struct PlannerLoopEngine {
    store: Arc<dyn WorkflowStore>,
    planner: Arc<dyn PlannerProvider>,
    memory: Arc<dyn MemoryProvider>,
    policy_engine: Arc<dyn PolicyEngine>,
    approval_classifier: Arc<dyn ApprovalClassifier>,
    tool_registry: Option<Arc<ToolRegistry>>,
    execute_tool: Option<Arc<dyn ToolExecutor>>,
    context_stage: Option<Arc<dyn BuildPlanningContextStage>>,
    validation_stage: Option<Arc<dyn ValidateIntentStage>>,
    policy_stage: Option<Arc<dyn EvaluatePolicyStage>>,
    approval_stage: Option<Arc<dyn EvaluateApprovalStage>>,
    execution_stage: Option<Arc<dyn ExecuteToolStage>>,
    policy_constraints: Vec<String>,
    max_steps: u32,
}

impl PlannerLoopEngine {
    /// Creates an engine with default stages, policy, and approval behavior.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>, planner: Arc<dyn PlannerProvider>) -> Self {
        Self {
            store,
            planner,
            memory: Arc::new(DefaultMemoryProvider),
            policy_engine: Arc::new(DefaultPolicyEngine),
            approval_classifier: Arc::new(DefaultApprovalClassifier),
            tool_registry: None,
            execute_tool: None,
            context_stage: None,
            validation_stage: None,
            policy_stage: None,
            approval_stage: None,
            execution_stage: None,
            policy_constraints: Vec::new(),
            max_steps: DEFAULT_MAX_STEPS,
        }
    }

    /// Adds the tool registry used to list and execute tools.
    #[must_use]
    pub fn with_tool_registry(mut self, registry: Arc<ToolRegistry>) -> Self {
        self.tool_registry = Some(registry);
        self
    }

    /// Adds the fallback tool executor used when no registry is configured.
    #[must_use]
    pub fn with_tool_executor(mut self, executor: Arc<dyn ToolExecutor>) -> Self {
        self.execute_tool = Some(executor);
        self
    }

    /// Replaces the memory provider.
    #[must_use]
    pub fn with_memory_provider(mut self, memory: Arc<dyn MemoryProvider>) -> Self {
        self.memory = memory;
        self
    }

    /// Replaces the policy engine consulted by the default policy stage.
    #[must_use]
    pub fn with_policy_engine(mut self, policy_engine: Arc<dyn PolicyEngine>) -> Self {
        self.policy_engine = policy_engine;
        self
    }

    /// Replaces the approval classifier consulted by the default approval
    /// stage.
    #[must_use]
    pub fn with_approval_classifier(
        mut self,
        approval_classifier: Arc<dyn ApprovalClassifier>,
    ) -> Self {
        self.approval_classifier = approval_classifier;
        self
    }

    /// Sets the policy constraint sentences surfaced to the planner.
    #[must_use]
    pub fn with_policy_constraints(mut self, constraints: Vec<String>) -> Self {
        self.policy_constraints = constraints;
        self
    }

    /// Sets the default step ceiling.
    #[must_use]
    pub fn with_max_steps(mut self, max_steps: u32) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Overrides the context-building stage.
    #[must_use]
    pub fn with_context_stage(mut self, stage: Arc<dyn BuildPlanningContextStage>) -> Self {
        self.context_stage = Some(stage);
        self
    }

    /// Overrides the intent-validation stage.
    #[must_use]
    pub fn with_validation_stage(mut self, stage: Arc<dyn ValidateIntentStage>) -> Self {
        self.validation_stage = Some(stage);
        self
    }

    /// Overrides the policy stage.
    #[must_use]
    pub fn with_policy_stage(mut self, stage: Arc<dyn EvaluatePolicyStage>) -> Self {
        self.policy_stage = Some(stage);
        self
    }

    /// Overrides the approval stage.
    #[must_use]
    pub fn with_approval_stage(mut self, stage: Arc<dyn EvaluateApprovalStage>) -> Self {
        self.approval_stage = Some(stage);
        self
    }

    /// Overrides the tool-execution stage.
    #[must_use]
    pub fn with_execution_stage(mut self, stage: Arc<dyn ExecuteToolStage>) -> Self {
        self.execution_stage = Some(stage);
        self
    }

    /// Drives the workflow until it suspends, completes, or fails.
    ///
    /// Re-entering with a terminal or waiting workflow returns its current
    /// snapshot without appending steps.
    pub async fn run_planner_loop(
        &self,
        request: PlannerLoopRequest,
    ) -> AppResult<PlannerLoopResult> {
        let max_steps = request.max_steps.unwrap_or(self.max_steps).max(1);

        loop {
            let snapshot = self.load_or_create_snapshot(&request).await?;

            if snapshot.status.is_terminal() {
                return Ok(PlannerLoopResult::from_snapshot(&snapshot));
            }

            if snapshot.status == WorkflowStatus::WaitingSignal {
                return Ok(PlannerLoopResult::from_snapshot(&snapshot));
            }

            if let Some(pending) = snapshot.pending_approval.clone() {
                match pending.status {
                    ApprovalStatus::Pending => {
                        return Ok(PlannerLoopResult::from_snapshot(&snapshot));
                    }
                    ApprovalStatus::Rejected => {
                        let reason = format!(
                            "approval '{}' was rejected for tool '{}'",
                            pending.approval_id,
                            pending.intent.tool_name().unwrap_or("unknown")
                        );
                        let failed = self.fail_workflow(&request, &snapshot, reason).await?;
                        return Ok(PlannerLoopResult::from_snapshot(&failed));
                    }
                    ApprovalStatus::Approved => {
                        self.execute_approved_intent(&request, &snapshot, pending)
                            .await?;
                        continue;
                    }
                }
            }

            if snapshot.step_count() >= max_steps {
                let reason =
                    format!("workflow exceeded the maximum of {max_steps} planner steps");
                self.fail_workflow(&request, &snapshot, reason.clone()).await?;
                return Err(AppError::Validation(reason));
            }

            if self.run_iteration(&request, &snapshot).await? {
                continue;
            }

            let settled = self
                .store
                .get_workflow_runtime_snapshot(&request.scope, request.workflow_id.as_str())
                .await?
                .ok_or_else(|| {
                    AppError::Internal(format!(
                        "workflow '{}' disappeared mid-iteration",
                        request.workflow_id
                    ))
                })?;
            return Ok(PlannerLoopResult::from_snapshot(&settled));
        }
    }

    async fn load_or_create_snapshot(
        &self,
        request: &PlannerLoopRequest,
    ) -> AppResult<WorkflowRuntimeSnapshot> {
        if let Some(snapshot) = self
            .store
            .get_workflow_runtime_snapshot(&request.scope, request.workflow_id.as_str())
            .await?
        {
            return Ok(snapshot);
        }

        let initial = WorkflowRuntimeSnapshot::running(NewWorkflowSnapshot {
            scope: request.scope,
            workflow_id: request.workflow_id.clone(),
            run_id: request.run_id.clone(),
            agent_id: request.agent_id.clone(),
            request_id: request.request_id.clone(),
            thread_id: request.thread_id.clone(),
            objective_prompt: request.objective_prompt.clone(),
        });

        info!(
            workflow_id = %request.workflow_id,
            run_id = %request.run_id,
            "creating workflow runtime snapshot"
        );

        self.store
            .commit_workflow_mutation(WorkflowMutation::snapshot_only(
                request.scope,
                0,
                initial,
            ))
            .await
    }

    /// Runs stages 1-6 once. Returns true when the loop should iterate again.
    async fn run_iteration(
        &self,
        request: &PlannerLoopRequest,
        snapshot: &WorkflowRuntimeSnapshot,
    ) -> AppResult<bool> {
        let step_number = snapshot.step_count();

        let planner_input = self.build_planning_context(request, snapshot).await?;
        let consumed_signal_ids: Vec<String> = planner_input
            .pending_signals
            .iter()
            .map(|signal| signal.signal_id.clone())
            .collect();

        let intent = self.planner.plan(&planner_input).await?;

        if let Err(error) = self.validate(&intent) {
            self.fail_workflow(request, snapshot, error.to_string()).await?;
            return Err(error);
        }

        let policy_request = PolicyRequest {
            scope: request.scope,
            workflow_id: request.workflow_id.clone(),
            request_id: request.request_id.clone(),
            step_number,
            objective_prompt: request.objective_prompt.clone(),
            intent: intent.clone(),
        };

        let stage_decision = self.evaluate_policy(&policy_request).await?;
        if let Err(error) = stage_decision.decision.ensure_consistent() {
            self.fail_workflow(request, snapshot, error.to_string()).await?;
            return Err(error);
        }

        let decision = stage_decision.decision;
        let policy_pack = stage_decision.policy_pack;
        let policy_record = PolicyDecisionRecord {
            tenant_id: request.scope.tenant_id(),
            workspace_id: request.scope.workspace_id(),
            decision_id: next_ordered_id(),
            workflow_id: request.workflow_id.clone(),
            step_number,
            policy_pack,
            outcome: decision.outcome,
            reason_code: decision.reason_code.clone(),
            original_intent: intent.clone(),
            rewritten_intent: decision.rewritten_intent.clone(),
            decided_at: Utc::now(),
        };

        let effective_intent = match decision.outcome {
            PolicyOutcome::Block => {
                warn!(
                    workflow_id = %request.workflow_id,
                    step_number,
                    policy_id = %decision.policy_id,
                    reason_code = %decision.reason_code,
                    "policy blocked planner intent"
                );
                self.fail_workflow_with_policy_block(request, snapshot, policy_record, &decision)
                    .await?;
                return Err(AppError::PolicyBlocked(format!(
                    "policy '{}' blocked intent ({})",
                    decision.policy_id, decision.reason_code
                )));
            }
            PolicyOutcome::Rewrite => {
                let rewritten = decision.rewritten_intent.clone().ok_or_else(|| {
                    AppError::Internal("rewrite outcome lost its intent".to_owned())
                })?;
                if let Err(error) = self.validate(&rewritten) {
                    self.fail_workflow(request, snapshot, error.to_string()).await?;
                    return Err(error);
                }
                rewritten
            }
            PolicyOutcome::Allow => intent,
        };

        let policy_audit = self.audit_for_policy(request, step_number, &policy_record);

        if let PlannerIntent::ToolCall { .. } = &effective_intent {
            let approval_request = PolicyRequest {
                intent: effective_intent.clone(),
                ..policy_request
            };
            let requirement = self.evaluate_approval(&approval_request).await?;

            if requirement.requires_approval {
                return self
                    .suspend_for_approval(
                        request,
                        snapshot,
                        planner_input,
                        effective_intent,
                        requirement,
                        policy_record,
                        policy_audit,
                        consumed_signal_ids,
                    )
                    .await;
            }
        }

        match effective_intent {
            PlannerIntent::ToolCall { .. } => {
                self.execute_tool_step(
                    request,
                    snapshot,
                    planner_input,
                    effective_intent,
                    policy_record,
                    policy_audit,
                    consumed_signal_ids,
                )
                .await
            }
            PlannerIntent::AskUser { ref question } => {
                let question = question.clone();
                self.suspend_for_question(
                    request,
                    snapshot,
                    planner_input,
                    effective_intent,
                    question,
                    policy_record,
                    policy_audit,
                    consumed_signal_ids,
                )
                .await
            }
            PlannerIntent::Complete { ref output } => {
                let completion = output.clone().unwrap_or_else(|| json!({}));
                self.complete_workflow(
                    request,
                    snapshot,
                    planner_input,
                    effective_intent,
                    completion,
                    policy_record,
                    policy_audit,
                    consumed_signal_ids,
                )
                .await
            }
        }
    }

    async fn build_planning_context(
        &self,
        request: &PlannerLoopRequest,
        snapshot: &WorkflowRuntimeSnapshot,
    ) -> AppResult<PlannerInput> {
        let memory_context = self
            .memory
            .load_memory_context(&request.scope, request.workflow_id.as_str())
            .await?;

        let available_tools = self
            .tool_registry
            .as_ref()
            .map(|registry| registry.list_tools(&request.scope))
            .unwrap_or_default();

        let pending_signals: Vec<PendingSignalSummary> = self
            .store
            .list_pending_workflow_signals(&request.scope, request.workflow_id.as_str())
            .await?
            .into_iter()
            .map(|signal| PendingSignalSummary {
                signal_id: signal.signal_id,
                signal_type: signal.signal_type.as_str().to_owned(),
                payload: signal.payload,
            })
            .collect();

        let seed = PlanningContextSeed {
            scope: request.scope,
            workflow_id: request.workflow_id.clone(),
            objective_prompt: request.objective_prompt.clone(),
            memory_context,
            prior_step_summaries: snapshot.steps.iter().map(PlannerStepRecord::summary).collect(),
            pending_signals,
            policy_constraints: self.policy_constraints.clone(),
            available_tools,
            step_index: snapshot.step_count(),
        };

        match &self.context_stage {
            Some(stage) => stage.build_planning_context(seed).await,
            None => Ok(default_planner_input(seed)),
        }
    }

    fn validate(&self, intent: &PlannerIntent) -> AppResult<()> {
        match &self.validation_stage {
            Some(stage) => stage.validate_intent(intent),
            None => validate_intent(intent),
        }
    }

    async fn evaluate_policy(&self, request: &PolicyRequest) -> AppResult<PolicyStageDecision> {
        if let Some(stage) = &self.policy_stage {
            return stage.evaluate_policy(request).await;
        }

        let policy_pack = PolicyPack::default_for_tenant(request.scope.tenant_id());
        let decision = self.policy_engine.evaluate(request, &policy_pack).await?;
        Ok(PolicyStageDecision {
            decision,
            policy_pack,
        })
    }

    async fn evaluate_approval(&self, request: &PolicyRequest) -> AppResult<ApprovalRequirement> {
        if let Some(stage) = &self.approval_stage {
            return stage.evaluate_approval(request).await;
        }

        self.approval_classifier.classify(request).await
    }

    async fn run_execute_stage(&self, input: ToolExecutionInput) -> AppResult<Value> {
        if let Some(stage) = &self.execution_stage {
            return stage.execute_tool(input).await;
        }

        if let Some(registry) = &self.tool_registry {
            return registry.execute(input).await;
        }

        if let Some(executor) = &self.execute_tool {
            return executor.execute(input).await;
        }

        Err(AppError::Validation(format!(
            "no tool executor is configured for tool '{}'",
            input.tool_name
        )))
    }

    #[allow(clippy::too_many_arguments)]
    async fn execute_tool_step(
        &self,
        request: &PlannerLoopRequest,
        snapshot: &WorkflowRuntimeSnapshot,
        planner_input: PlannerInput,
        intent: PlannerIntent,
        policy_record: PolicyDecisionRecord,
        policy_audit: AuditRecord,
        consumed_signal_ids: Vec<String>,
    ) -> AppResult<bool> {
        let step_number = snapshot.step_count();
        let (tool_name, args) = match &intent {
            PlannerIntent::ToolCall { tool_name, args } => (tool_name.clone(), args.clone()),
            PlannerIntent::AskUser { .. } | PlannerIntent::Complete { .. } => {
                return Err(AppError::Internal(
                    "execute_tool_step received a non-tool intent".to_owned(),
                ));
            }
        };

        let execution = self
            .run_execute_stage(ToolExecutionInput {
                scope: request.scope,
                request_id: request.request_id.clone(),
                workflow_id: request.workflow_id.clone(),
                step_number,
                tool_name: tool_name.clone(),
                args,
                correlation_id: request.correlation_id.clone(),
            })
            .await;

        let tool_result = match execution {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    workflow_id = %request.workflow_id,
                    step_number,
                    tool_name = %tool_name,
                    error = %error,
                    "tool execution failed; failing workflow"
                );
                self.fail_workflow(request, snapshot, error.to_string()).await?;
                return Err(error);
            }
        };

        let mut next = snapshot.clone();
        next.steps.push(self.step_record(
            request,
            step_number,
            PlannerStepStatus::ToolExecuted,
            planner_input,
            intent,
            Some(tool_result),
        ));
        next.status = WorkflowStatus::Running;

        let mut mutation =
            WorkflowMutation::snapshot_only(request.scope, snapshot.version, next);
        mutation.policy_decisions.push(policy_record);
        mutation.audit_records.push(policy_audit);
        mutation.consume_signal_ids = consumed_signal_ids;
        self.store.commit_workflow_mutation(mutation).await?;

        info!(
            workflow_id = %request.workflow_id,
            step_number,
            tool_name = %tool_name,
            "tool step executed"
        );

        Ok(true)
    }

    #[allow(clippy::too_many_arguments)]
    async fn suspend_for_question(
        &self,
        request: &PlannerLoopRequest,
        snapshot: &WorkflowRuntimeSnapshot,
        planner_input: PlannerInput,
        intent: PlannerIntent,
        question: String,
        policy_record: PolicyDecisionRecord,
        policy_audit: AuditRecord,
        consumed_signal_ids: Vec<String>,
    ) -> AppResult<bool> {
        let step_number = snapshot.step_count();

        let mut next = snapshot.clone();
        next.steps.push(self.step_record(
            request,
            step_number,
            PlannerStepStatus::WaitingSignal,
            planner_input,
            intent,
            None,
        ));
        next.status = WorkflowStatus::WaitingSignal;
        next.waiting_question = Some(question);

        let mut mutation =
            WorkflowMutation::snapshot_only(request.scope, snapshot.version, next);
        mutation.policy_decisions.push(policy_record);
        mutation.audit_records.push(policy_audit);
        mutation.checkpoint = WorkflowCheckpointAction::Install;
        mutation.consume_signal_ids = consumed_signal_ids;
        self.store.commit_workflow_mutation(mutation).await?;

        info!(
            workflow_id = %request.workflow_id,
            step_number,
            "workflow waiting for user input"
        );

        Ok(false)
    }

    #[allow(clippy::too_many_arguments)]
    async fn suspend_for_approval(
        &self,
        request: &PlannerLoopRequest,
        snapshot: &WorkflowRuntimeSnapshot,
        planner_input: PlannerInput,
        intent: PlannerIntent,
        requirement: ApprovalRequirement,
        policy_record: PolicyDecisionRecord,
        policy_audit: AuditRecord,
        consumed_signal_ids: Vec<String>,
    ) -> AppResult<bool> {
        let step_number = snapshot.step_count();
        let approval_id = next_ordered_id();
        let now = Utc::now();

        let mut next = snapshot.clone();
        next.steps.push(self.step_record(
            request,
            step_number,
            PlannerStepStatus::WaitingSignal,
            planner_input,
            intent.clone(),
            None,
        ));
        next.status = WorkflowStatus::WaitingSignal;
        next.pending_approval = Some(PendingApproval {
            approval_id: approval_id.clone(),
            status: ApprovalStatus::Pending,
            intent: intent.clone(),
            risk_class: requirement.risk_class.clone(),
            reason_code: requirement.reason_code.clone(),
        });

        let mut mutation =
            WorkflowMutation::snapshot_only(request.scope, snapshot.version, next);
        mutation.policy_decisions.push(policy_record);
        mutation.approval_decisions.push(ApprovalDecisionRecord {
            tenant_id: request.scope.tenant_id(),
            workspace_id: request.scope.workspace_id(),
            approval_id: approval_id.clone(),
            workflow_id: request.workflow_id.clone(),
            step_number,
            status: ApprovalStatus::Pending,
            risk_class: requirement.risk_class.clone(),
            reason_code: requirement.reason_code.clone(),
            intent: intent.clone(),
            approver_id: None,
            resolved_at: None,
            signal_id: None,
            requested_at: now,
        });
        mutation.audit_records.push(policy_audit);
        mutation.audit_records.push(self.audit_record(
            request,
            Some(step_number),
            AuditEventType::ApprovalPending,
            format!(
                "approval '{approval_id}' pending for tool '{}' ({})",
                intent.tool_name().unwrap_or("unknown"),
                requirement.risk_class
            ),
            None,
        ));
        mutation.checkpoint = WorkflowCheckpointAction::Install;
        mutation.consume_signal_ids = consumed_signal_ids;
        self.store.commit_workflow_mutation(mutation).await?;

        info!(
            workflow_id = %request.workflow_id,
            step_number,
            approval_id = %approval_id,
            risk_class = %requirement.risk_class,
            "workflow waiting for approval"
        );

        Ok(false)
    }

    #[allow(clippy::too_many_arguments)]
    async fn complete_workflow(
        &self,
        request: &PlannerLoopRequest,
        snapshot: &WorkflowRuntimeSnapshot,
        planner_input: PlannerInput,
        intent: PlannerIntent,
        completion: Value,
        policy_record: PolicyDecisionRecord,
        policy_audit: AuditRecord,
        consumed_signal_ids: Vec<String>,
    ) -> AppResult<bool> {
        let step_number = snapshot.step_count();

        let mut next = snapshot.clone();
        next.steps.push(self.step_record(
            request,
            step_number,
            PlannerStepStatus::Completed,
            planner_input,
            intent,
            None,
        ));
        next.status = WorkflowStatus::Completed;
        next.completion = Some(completion);
        next.waiting_question = None;

        let mut mutation =
            WorkflowMutation::snapshot_only(request.scope, snapshot.version, next);
        mutation.policy_decisions.push(policy_record);
        mutation.audit_records.push(policy_audit);
        mutation.audit_records.push(self.audit_record(
            request,
            Some(step_number),
            AuditEventType::WorkflowTerminalCompleted,
            format!("workflow '{}' completed", request.workflow_id),
            None,
        ));
        mutation.consume_signal_ids = consumed_signal_ids;
        self.store.commit_workflow_mutation(mutation).await?;

        info!(
            workflow_id = %request.workflow_id,
            step_number,
            "workflow completed"
        );

        Ok(false)
    }

    async fn execute_approved_intent(
        &self,
        request: &PlannerLoopRequest,
        snapshot: &WorkflowRuntimeSnapshot,
        pending: PendingApproval,
    ) -> AppResult<()> {
        let (tool_name, args) = match &pending.intent {
            PlannerIntent::ToolCall { tool_name, args } => (tool_name.clone(), args.clone()),
            PlannerIntent::AskUser { .. } | PlannerIntent::Complete { .. } => {
                return Err(AppError::Internal(format!(
                    "approval '{}' stored a non-tool intent",
                    pending.approval_id
                )));
            }
        };

        let step_number = snapshot.step_count();
        let planner_input = snapshot
            .steps
            .last()
            .map(|step| step.planner_input.clone())
            .ok_or_else(|| {
                AppError::Internal(format!(
                    "approved workflow '{}' has no gate step",
                    request.workflow_id
                ))
            })?;

        let execution = self
            .run_execute_stage(ToolExecutionInput {
                scope: request.scope,
                request_id: request.request_id.clone(),
                workflow_id: request.workflow_id.clone(),
                step_number,
                tool_name: tool_name.clone(),
                args,
                correlation_id: request.correlation_id.clone(),
            })
            .await;

        let tool_result = match execution {
            Ok(value) => value,
            Err(error) => {
                warn!(
                    workflow_id = %request.workflow_id,
                    approval_id = %pending.approval_id,
                    tool_name = %tool_name,
                    error = %error,
                    "approved intent execution failed; failing workflow"
                );
                self.fail_workflow(request, snapshot, error.to_string()).await?;
                return Err(error);
            }
        };

        let mut next = snapshot.clone();
        next.steps.push(self.step_record(
            request,
            step_number,
            PlannerStepStatus::ToolExecuted,
            planner_input,
            pending.intent.clone(),
            Some(tool_result),
        ));
        next.status = WorkflowStatus::Running;
        next.pending_approval = None;

        let mutation = WorkflowMutation::snapshot_only(request.scope, snapshot.version, next);
        self.store.commit_workflow_mutation(mutation).await?;

        info!(
            workflow_id = %request.workflow_id,
            approval_id = %pending.approval_id,
            tool_name = %tool_name,
            "approved intent executed"
        );

        Ok(())
    }

    async fn fail_workflow(
        &self,
        request: &PlannerLoopRequest,
        snapshot: &WorkflowRuntimeSnapshot,
        reason: String,
    ) -> AppResult<WorkflowRuntimeSnapshot> {
        let mut next = snapshot.clone();
        next.status = WorkflowStatus::Failed;
        next.failure_reason = Some(reason.clone());
        next.waiting_question = None;

        let mut mutation =
            WorkflowMutation::snapshot_only(request.scope, snapshot.version, next);
        mutation.audit_records.push(self.audit_record(
            request,
            Some(snapshot.step_count()),
            AuditEventType::WorkflowTerminalFailed,
            reason.clone(),
            None,
        ));

        let stored = self.store.commit_workflow_mutation(mutation).await?;
        warn!(
            workflow_id = %request.workflow_id,
            reason = %reason,
            "workflow failed"
        );
        Ok(stored)
    }

    async fn fail_workflow_with_policy_block(
        &self,
        request: &PlannerLoopRequest,
        snapshot: &WorkflowRuntimeSnapshot,
        policy_record: PolicyDecisionRecord,
        decision: &PolicyDecision,
    ) -> AppResult<()> {
        let reason = format!(
            "policy '{}' blocked intent ({})",
            decision.policy_id, decision.reason_code
        );
        let step_number = snapshot.step_count();

        let mut next = snapshot.clone();
        next.status = WorkflowStatus::Failed;
        next.failure_reason = Some(reason.clone());
        next.waiting_question = None;

        let mut mutation =
            WorkflowMutation::snapshot_only(request.scope, snapshot.version, next);
        mutation.audit_records.push(self.audit_record(
            request,
            Some(step_number),
            AuditEventType::PolicyBlock,
            reason.clone(),
            None,
        ));
        mutation.audit_records.push(self.audit_record(
            request,
            Some(step_number),
            AuditEventType::WorkflowTerminalFailed,
            reason,
            None,
        ));
        mutation.policy_decisions.push(policy_record);

        self.store.commit_workflow_mutation(mutation).await?;
        Ok(())
    }

    fn step_record(
        &self,
        request: &PlannerLoopRequest,
        step_number: u32,
        status: PlannerStepStatus,
        planner_input: PlannerInput,
        planner_intent: PlannerIntent,
        tool_result: Option<Value>,
    ) -> PlannerStepRecord {
        PlannerStepRecord {
            tenant_id: request.scope.tenant_id(),
            workspace_id: request.scope.workspace_id(),
            workflow_id: request.workflow_id.clone(),
            step_number,
            intent_type: planner_intent.intent_type().to_owned(),
            status,
            planner_input,
            planner_intent,
            tool_result,
            created_at: Utc::now(),
        }
    }

    fn audit_for_policy(
        &self,
        request: &PlannerLoopRequest,
        step_number: u32,
        record: &PolicyDecisionRecord,
    ) -> AuditRecord {
        let event_type = match record.outcome {
            PolicyOutcome::Allow => AuditEventType::PolicyAllow,
            PolicyOutcome::Rewrite => AuditEventType::PolicyRewrite,
            PolicyOutcome::Block => AuditEventType::PolicyBlock,
        };

        self.audit_record(
            request,
            Some(step_number),
            event_type,
            format!(
                "policy pack '{} {}' returned {} ({})",
                record.policy_pack.policy_pack_id,
                record.policy_pack.policy_pack_version,
                record.outcome.as_str(),
                record.reason_code
            ),
            None,
        )
    }

    fn audit_record(
        &self,
        request: &PlannerLoopRequest,
        step_number: Option<u32>,
        event_type: AuditEventType,
        detail: String,
        signal_correlation_id: Option<String>,
    ) -> AuditRecord {
        AuditRecord {
            tenant_id: request.scope.tenant_id(),
            workspace_id: request.scope.workspace_id(),
            audit_id: next_ordered_id(),
            workflow_id: request.workflow_id.clone(),
            request_id: request.request_id.clone(),
            step_number,
            event_type,
            signal_correlation_id,
            detail,
            occurred_at: Utc::now(),
        }
    }
}

fn default_planner_input(seed: PlanningContextSeed) -> PlannerInput {
    PlannerInput {
        contract_version: PLANNER_INPUT_CONTRACT_VERSION.to_owned(),
        tenant_id: seed.scope.tenant_id(),
        workspace_id: seed.scope.workspace_id(),
        workflow_id: seed.workflow_id,
        objective_prompt: seed.objective_prompt,
        memory_context: seed.memory_context,
        prior_step_summaries: seed.prior_step_summaries,
        pending_signals: seed.pending_signals,
        policy_constraints: seed.policy_constraints,
        available_tools: seed.available_tools,
        step_index: seed.step_index,
    }
}
