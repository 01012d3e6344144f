//! Application services and ports.

#![forbid(unsafe_code)]

mod objective_service;
mod planner_loop;
mod queue_runner;
mod replay;
mod runtime_ports;
mod schedule_tool;
mod signal_service;
mod side_effect;
mod tool_registry;

pub use objective_service::{ObjectiveIntakeService, SubmitObjectiveInput, SubmittedObjective};
pub use planner_loop::{
    BuildPlanningContextStage, DefaultApprovalClassifier, DefaultMemoryProvider,
    DefaultPolicyEngine, EvaluateApprovalStage, EvaluatePolicyStage, ExecuteToolStage,
    PlannerLoopEngine, PlannerLoopJobExecutor, PlannerLoopRequest, PlannerLoopResult,
    PlanningContextSeed, PolicyStageDecision, ValidateIntentStage, DEFAULT_MAX_STEPS,
};
pub use queue_runner::{
    JobExecutionReport, QueueRunner, QueueRunnerConfig, RunOnceOutcome, WorkflowJobExecutor,
    DEFAULT_EXECUTE_TIMEOUT_MS, RETRY_BACKOFF_MS,
};
pub use replay::{ReplayDrift, ReplayService, ReplayTrace, ReplayTraceStep, diff_replay_snapshot};
pub use runtime_ports::{
    ActionAdapter, AdapterAction, AdapterCredentials, AdapterResponse, ApprovalClassifier,
    AuditQuery, ClaimWorkflowJobsInput, CompleteWorkflowJobInput, CredentialsResolver,
    EnqueueWorkflowJobInput, FailWorkflowJobInput, JobListQuery, MemoryProvider, PlannerProvider,
    PolicyEngine, PolicyRequest, RetryAttemptRecord, RetryAttemptSink, RetryTerminalReason,
    RunListQuery, ToolExecutionInput, ToolExecutor, WaitingSignalNotification,
    WaitingSignalNotifier, WorkflowCheckpointAction, WorkflowMutation, WorkflowStore,
};
pub use schedule_tool::{SCHEDULE_WORKFLOW_TOOL, ScheduleWorkflowTool, schedule_workflow_registration};
pub use signal_service::{
    IngestOutcome, IngestThreadReplyInput, ResumeOutcome, ResumeWithSignalInput, SignalService,
};
pub use side_effect::{
    IdempotentActionAdapter, NullRetryAttemptSink, RetryPolicy, RetryingActionAdapter,
    resolve_scoped_credentials,
};
pub use tool_registry::{ToolArgumentIssue, ToolRegistration, ToolRegistry};
