use std::collections::VecDeque;
use std::sync::Arc;

use async_trait::async_trait;
use runloom_core::{ActorScope, AppError, AppResult, TenantId, WorkspaceId};
use runloom_domain::{PlannerInput, PlannerIntent, PlannerStepStatus, WorkflowStatus};
use runloom_infrastructure::InMemoryWorkflowStore;
use serde_json::json;
use tokio::sync::Mutex;

use runloom_application::{
    PlannerLoopEngine, PlannerLoopRequest, PlannerProvider, ReplayService,
    ResumeWithSignalInput, SignalService, ToolExecutionInput, ToolExecutor, WorkflowStore,
    diff_replay_snapshot,
};

struct ScriptedPlanner {
    intents: Mutex<VecDeque<PlannerIntent>>,
}

impl ScriptedPlanner {
    fn new(intents: Vec<PlannerIntent>) -> Arc<Self> {
        Arc::new(Self {
            intents: Mutex::new(intents.into()),
        })
    }
}

#[async_trait]
impl PlannerProvider for ScriptedPlanner {
    async fn plan(&self, _input: &PlannerInput) -> AppResult<PlannerIntent> {
        self.intents
            .lock()
            .await
            .pop_front()
            .ok_or_else(|| AppError::Internal("planner script exhausted".to_owned()))
    }
}

struct StaticToolExecutor;

#[async_trait]
impl ToolExecutor for StaticToolExecutor {
    async fn execute(&self, _input: ToolExecutionInput) -> AppResult<serde_json::Value> {
        Ok(json!({"slots": ["2026-02-18T10:00:00Z"]}))
    }
}

fn scope() -> ActorScope {
    ActorScope::new(TenantId::new(), WorkspaceId::new())
}

fn loop_request(scope: ActorScope) -> PlannerLoopRequest {
    PlannerLoopRequest {
        scope,
        workflow_id: "wf-1".to_owned(),
        run_id: "run-1".to_owned(),
        agent_id: "agent-1".to_owned(),
        request_id: "req-1".to_owned(),
        thread_id: None,
        objective_prompt: "schedule an interview".to_owned(),
        max_steps: None,
        correlation_id: None,
    }
}

async fn completed_workflow_store(scope: ActorScope) -> Arc<InMemoryWorkflowStore> {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let planner = ScriptedPlanner::new(vec![
        PlannerIntent::ToolCall {
            tool_name: "calendar.find_slots".to_owned(),
            args: json!({"day": "2026-02-18"}),
        },
        PlannerIntent::Complete {
            output: Some(json!({"scheduled": true})),
        },
    ]);
    let engine = PlannerLoopEngine::new(store.clone() as Arc<dyn WorkflowStore>, planner)
        .with_tool_executor(Arc::new(StaticToolExecutor));

    let result = engine.run_planner_loop(loop_request(scope)).await;
    assert!(result.is_ok());
    store
}

#[tokio::test]
async fn replaying_a_trace_reproduces_step_statuses() {
    let scope = scope();
    let store = completed_workflow_store(scope).await;
    let service = ReplayService::new(store.clone() as Arc<dyn WorkflowStore>);

    let trace = service
        .build_replay_trace(&scope, &scope, "wf-1", false)
        .await;
    assert!(trace.is_ok());
    let trace = trace.unwrap_or_else(|_| unreachable!());
    assert_eq!(trace.steps.len(), 2);

    let scratch: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    let replayed = service.replay_trace(&trace, scratch).await;
    assert!(replayed.is_ok());
    let replayed = replayed.unwrap_or_else(|_| unreachable!());

    assert_eq!(replayed.status, WorkflowStatus::Completed);
    assert_eq!(replayed.steps.len(), trace.steps.len());
    for (original, replay) in trace.steps.iter().zip(replayed.steps.iter()) {
        assert_eq!(original.status, replay.status);
        assert_eq!(original.intent_type, replay.intent_type);
    }
    assert_eq!(replayed.completion, trace.completion);
}

#[tokio::test]
async fn replaying_a_waiting_trace_resumes_through_the_recorded_answer() {
    let scope = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let planner = ScriptedPlanner::new(vec![
        PlannerIntent::AskUser {
            question: "Which interviewer?".to_owned(),
        },
        PlannerIntent::Complete {
            output: Some(json!({"assigned": "Sam"})),
        },
    ]);
    let engine = PlannerLoopEngine::new(store.clone() as Arc<dyn WorkflowStore>, planner);

    let first = engine.run_planner_loop(loop_request(scope)).await;
    assert!(first.is_ok());

    let signals = SignalService::new(store.clone() as Arc<dyn WorkflowStore>);
    let resumed = signals
        .resume_with_signal(ResumeWithSignalInput {
            scope,
            workflow_id: "wf-1".to_owned(),
            signal_type: runloom_domain::SignalType::UserInput,
            payload: json!({"message": "Sam"}),
            occurred_at: None,
            correlation_id: None,
        })
        .await;
    assert!(resumed.is_ok());

    let second = engine.run_planner_loop(loop_request(scope)).await;
    assert!(second.is_ok());

    let service = ReplayService::new(store.clone() as Arc<dyn WorkflowStore>);
    let trace = service
        .build_replay_trace(&scope, &scope, "wf-1", false)
        .await;
    assert!(trace.is_ok());
    let trace = trace.unwrap_or_else(|_| unreachable!());
    assert_eq!(trace.steps.len(), 2);

    let scratch: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());
    let replayed = service.replay_trace(&trace, scratch).await;
    assert!(replayed.is_ok());
    let replayed = replayed.unwrap_or_else(|_| unreachable!());

    assert_eq!(replayed.status, WorkflowStatus::Completed);
    assert_eq!(replayed.steps.len(), 2);
    assert_eq!(replayed.steps[0].status, PlannerStepStatus::WaitingSignal);
    assert_eq!(replayed.steps[1].status, PlannerStepStatus::Completed);
}

#[tokio::test]
async fn diff_reports_no_drift_for_identical_traces() {
    let scope = scope();
    let store = completed_workflow_store(scope).await;
    let service = ReplayService::new(store as Arc<dyn WorkflowStore>);

    let trace = service
        .build_replay_trace(&scope, &scope, "wf-1", false)
        .await
        .unwrap_or_else(|_| unreachable!());

    assert!(diff_replay_snapshot(&trace, &trace).is_empty());
}

#[tokio::test]
async fn diff_detects_status_and_tool_drift() {
    let scope = scope();
    let store = completed_workflow_store(scope).await;
    let service = ReplayService::new(store as Arc<dyn WorkflowStore>);

    let expected = service
        .build_replay_trace(&scope, &scope, "wf-1", false)
        .await
        .unwrap_or_else(|_| unreachable!());

    let mut actual = expected.clone();
    actual.steps[0].status = PlannerStepStatus::Failed;
    actual.steps[0].planner_intent = PlannerIntent::ToolCall {
        tool_name: "message.send".to_owned(),
        args: json!({}),
    };
    actual.steps.pop();

    let drifts = diff_replay_snapshot(&expected, &actual);
    assert!(drifts.iter().any(|drift| drift.field == "step_count"));
    assert!(
        drifts
            .iter()
            .any(|drift| drift.field == "status" && drift.step_number == Some(0))
    );
    assert!(
        drifts
            .iter()
            .any(|drift| drift.field == "tool_name" && drift.step_number == Some(0))
    );
}

#[tokio::test]
async fn cross_tenant_trace_reads_require_the_explicit_capability() {
    let scope = scope();
    let store = completed_workflow_store(scope).await;
    let service = ReplayService::new(store as Arc<dyn WorkflowStore>);

    let foreign = ActorScope::new(TenantId::new(), WorkspaceId::new());
    let denied = service
        .build_replay_trace(&foreign, &scope, "wf-1", false)
        .await;
    assert!(denied.is_err());

    let allowed = service
        .build_replay_trace(&foreign, &scope, "wf-1", true)
        .await;
    assert!(allowed.is_ok());
}
