use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use runloom_core::{ActorScope, AppError, AppResult, TenantId, WorkspaceId};
use runloom_domain::{
    PlannerInput, PlannerIntent, QueueJobStatus, RunEvent, SignalStatus, SignalType,
    WAITING_FOR_SIGNAL_STATE, WorkflowMessageThread, WorkflowStatus,
};
use runloom_infrastructure::InMemoryWorkflowStore;
use serde_json::json;

use runloom_application::{
    IngestOutcome, IngestThreadReplyInput, JobListQuery, PlannerLoopEngine, PlannerLoopRequest,
    PlannerProvider, ResumeWithSignalInput, SignalService, WorkflowStore,
};

struct AskOncePlanner;

#[async_trait]
impl PlannerProvider for AskOncePlanner {
    async fn plan(&self, input: &PlannerInput) -> AppResult<PlannerIntent> {
        if input.step_index == 0 {
            Ok(PlannerIntent::AskUser {
                question: "Which interviewer?".to_owned(),
            })
        } else {
            Ok(PlannerIntent::Complete { output: None })
        }
    }
}

fn scope() -> ActorScope {
    ActorScope::new(TenantId::new(), WorkspaceId::new())
}

fn loop_request(scope: ActorScope, workflow_id: &str) -> PlannerLoopRequest {
    PlannerLoopRequest {
        scope,
        workflow_id: workflow_id.to_owned(),
        run_id: "run-1".to_owned(),
        agent_id: "agent-1".to_owned(),
        request_id: "req-1".to_owned(),
        thread_id: Some("thread-1".to_owned()),
        objective_prompt: "schedule an interview".to_owned(),
        max_steps: None,
        correlation_id: None,
    }
}

/// Drives one workflow into `waiting_signal` and returns the store.
async fn waiting_workflow(scope: ActorScope) -> Arc<InMemoryWorkflowStore> {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let engine = PlannerLoopEngine::new(
        store.clone() as Arc<dyn WorkflowStore>,
        Arc::new(AskOncePlanner),
    );

    let result = engine.run_planner_loop(loop_request(scope, "wf-1")).await;
    assert!(result.is_ok());
    assert_eq!(
        result.unwrap_or_else(|_| unreachable!()).status,
        WorkflowStatus::WaitingSignal
    );

    store
}

async fn mark_run_waiting(store: &Arc<InMemoryWorkflowStore>, scope: ActorScope) {
    let appended = store
        .append_run_event(RunEvent::state(
            scope,
            "run-1",
            "Run waiting for signal",
            json!({"state": WAITING_FOR_SIGNAL_STATE}),
            None,
        ))
        .await;
    assert!(appended.is_ok());
}

async fn map_thread(store: &Arc<InMemoryWorkflowStore>, scope: ActorScope) {
    let upserted = store
        .upsert_workflow_message_thread(WorkflowMessageThread {
            tenant_id: scope.tenant_id(),
            workspace_id: scope.workspace_id(),
            thread_id: "thread-1".to_owned(),
            workflow_id: "wf-1".to_owned(),
            provider: "chat".to_owned(),
            provider_team_id: "TEAM1".to_owned(),
            provider_channel_id: Some("C100".to_owned()),
            provider_thread_id: "T100".to_owned(),
            created_at: Utc::now(),
        })
        .await;
    assert!(upserted.is_ok());
}

fn reply(event_id: &str) -> IngestThreadReplyInput {
    IngestThreadReplyInput {
        provider: "chat".to_owned(),
        provider_team_id: "TEAM1".to_owned(),
        provider_thread_id: "T100".to_owned(),
        event_id: event_id.to_owned(),
        message: "Sam".to_owned(),
        occurred_at: None,
    }
}

#[tokio::test]
async fn duplicate_thread_replies_record_one_signal_and_one_job() {
    let scope = scope();
    let store = waiting_workflow(scope).await;
    mark_run_waiting(&store, scope).await;
    map_thread(&store, scope).await;
    let service = SignalService::new(store.clone() as Arc<dyn WorkflowStore>);

    let first = service.ingest_thread_reply(reply("EV1")).await;
    assert!(first.is_ok());
    assert!(matches!(
        first.unwrap_or(IngestOutcome::Duplicate),
        IngestOutcome::QueuedSignal { .. }
    ));

    let second = service.ingest_thread_reply(reply("EV1")).await;
    assert!(second.is_ok());
    assert_eq!(second.unwrap_or(IngestOutcome::NotWaiting), IngestOutcome::Duplicate);

    let pending = store
        .list_pending_workflow_signals(&scope, "wf-1")
        .await
        .unwrap_or_default();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].payload["message"], json!("Sam"));

    let follow_up_jobs = store
        .list_workflow_jobs(
            &scope,
            JobListQuery {
                status: Some(QueueJobStatus::Queued),
                workflow_id: Some("wf-1".to_owned()),
            },
        )
        .await
        .unwrap_or_default();
    assert_eq!(follow_up_jobs.len(), 1);
    assert_eq!(follow_up_jobs[0].attempt_count, 0);
}

#[tokio::test]
async fn replies_to_non_waiting_runs_are_dropped() {
    let scope = scope();
    let store = waiting_workflow(scope).await;
    map_thread(&store, scope).await;

    // The run's most recent state event is a completion, not a wait.
    let appended = store
        .append_run_event(RunEvent::state(
            scope,
            "run-1",
            "Run completed",
            json!({"state": "completed"}),
            None,
        ))
        .await;
    assert!(appended.is_ok());

    let service = SignalService::new(store.clone() as Arc<dyn WorkflowStore>);
    let outcome = service.ingest_thread_reply(reply("EV1")).await;
    assert!(outcome.is_ok());
    assert_eq!(
        outcome.unwrap_or(IngestOutcome::Duplicate),
        IngestOutcome::NotWaiting
    );

    let jobs = store
        .list_workflow_jobs(
            &scope,
            JobListQuery {
                status: Some(QueueJobStatus::Queued),
                workflow_id: Some("wf-1".to_owned()),
            },
        )
        .await
        .unwrap_or_default();
    assert!(jobs.is_empty());
}

#[tokio::test]
async fn resume_consumes_the_checkpoint_exactly_once() {
    let scope = scope();
    let store = waiting_workflow(scope).await;
    let service = SignalService::new(store.clone() as Arc<dyn WorkflowStore>);

    let resume = ResumeWithSignalInput {
        scope,
        workflow_id: "wf-1".to_owned(),
        signal_type: SignalType::UserInput,
        payload: json!({"message": "Sam"}),
        occurred_at: None,
        correlation_id: None,
    };

    let first = service.resume_with_signal(resume.clone()).await;
    assert!(first.is_ok());
    let first = first.unwrap_or_else(|_| unreachable!());
    assert_eq!(first.snapshot.status, WorkflowStatus::Running);
    assert!(first.snapshot.waiting_question.is_none());

    let checkpoint = store.get_waiting_checkpoint(&scope, "wf-1").await;
    assert!(checkpoint.is_ok());
    assert!(checkpoint.unwrap_or_default().is_none());

    let second = service.resume_with_signal(resume).await;
    assert!(second.is_err());

    // The double-resume attempt left exactly one acknowledged signal row.
    let signals = store
        .list_workflow_signals(&scope, "wf-1")
        .await
        .unwrap_or_default();
    assert_eq!(signals.len(), 1);
    assert_eq!(signals[0].status, SignalStatus::Acknowledged);
    assert!(signals[0].acknowledged_at.is_some());
}

#[tokio::test]
async fn resume_from_a_foreign_scope_reports_workflow_not_found() {
    let scope = scope();
    let store = waiting_workflow(scope).await;
    let service = SignalService::new(store as Arc<dyn WorkflowStore>);

    let foreign = ActorScope::new(TenantId::new(), WorkspaceId::new());
    let result = service
        .resume_with_signal(ResumeWithSignalInput {
            scope: foreign,
            workflow_id: "wf-1".to_owned(),
            signal_type: SignalType::UserInput,
            payload: json!({"message": "Sam"}),
            occurred_at: None,
            correlation_id: None,
        })
        .await;

    assert!(
        result
            .err()
            .is_some_and(|error| error.to_string().contains("workflow not found"))
    );
}

#[tokio::test]
async fn malformed_signal_payloads_are_rejected() {
    let scope = scope();
    let store = waiting_workflow(scope).await;
    let service = SignalService::new(store as Arc<dyn WorkflowStore>);

    let cases = vec![
        (SignalType::UserInput, json!({})),
        (SignalType::Approval, json!({"approved": "yes"})),
        (SignalType::ExternalEvent, json!({"event": "x"})),
        (SignalType::Timer, json!({"firedAt": "not-a-date"})),
    ];

    for (signal_type, payload) in cases {
        let result = service
            .resume_with_signal(ResumeWithSignalInput {
                scope,
                workflow_id: "wf-1".to_owned(),
                signal_type,
                payload,
                occurred_at: None,
                correlation_id: None,
            })
            .await;
        assert!(matches!(result, Err(AppError::SignalValidation(_))));
    }
}

#[tokio::test]
async fn external_event_signals_resume_waiting_workflows() {
    let scope = scope();
    let store = waiting_workflow(scope).await;
    let service = SignalService::new(store as Arc<dyn WorkflowStore>);

    let result = service
        .resume_with_signal(ResumeWithSignalInput {
            scope,
            workflow_id: "wf-1".to_owned(),
            signal_type: SignalType::ExternalEvent,
            payload: json!({"eventType": "calendar.updated"}),
            occurred_at: None,
            correlation_id: None,
        })
        .await;

    assert!(result.is_ok());
    assert_eq!(
        result.unwrap_or_else(|_| unreachable!()).snapshot.status,
        WorkflowStatus::Running
    );
}

#[tokio::test]
async fn resume_on_a_running_workflow_conflicts() {
    let scope = scope();
    let store = waiting_workflow(scope).await;
    let service = SignalService::new(store.clone() as Arc<dyn WorkflowStore>);

    let resume = ResumeWithSignalInput {
        scope,
        workflow_id: "wf-1".to_owned(),
        signal_type: SignalType::Timer,
        payload: json!({"firedAt": "2026-03-01T12:00:00Z"}),
        occurred_at: None,
        correlation_id: None,
    };
    let first = service.resume_with_signal(resume.clone()).await;
    assert!(first.is_ok());

    let second = service.resume_with_signal(resume).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
}
