use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use runloom_core::{ActorScope, AppError, AppResult, TenantId, WorkspaceId};
use runloom_domain::{
    DeliveryReceipt, QueueJobStatus, RunStatus, WorkflowQueueJob, WorkflowStatus,
};
use runloom_infrastructure::InMemoryWorkflowStore;
use serde_json::json;
use tokio::sync::Mutex;

use runloom_application::{
    ClaimWorkflowJobsInput, CompleteWorkflowJobInput, JobExecutionReport, ObjectiveIntakeService,
    QueueRunner, QueueRunnerConfig, SubmitObjectiveInput, WaitingSignalNotification,
    WaitingSignalNotifier, WorkflowJobExecutor, WorkflowStore,
};

enum ExecutorScript {
    Succeed(JobExecutionReport),
    Fail(String),
    SleepMs(u64),
}

struct ScriptedExecutor {
    script: ExecutorScript,
    executed: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn succeeding(status: WorkflowStatus) -> Arc<Self> {
        Arc::new(Self {
            script: ExecutorScript::Succeed(JobExecutionReport {
                status,
                waiting_question: None,
                result: Some(json!({"ok": true})),
            }),
            executed: Mutex::new(Vec::new()),
        })
    }

    fn waiting_with_question(question: &str) -> Arc<Self> {
        Arc::new(Self {
            script: ExecutorScript::Succeed(JobExecutionReport {
                status: WorkflowStatus::WaitingSignal,
                waiting_question: Some(question.to_owned()),
                result: None,
            }),
            executed: Mutex::new(Vec::new()),
        })
    }

    fn failing(message: &str) -> Arc<Self> {
        Arc::new(Self {
            script: ExecutorScript::Fail(message.to_owned()),
            executed: Mutex::new(Vec::new()),
        })
    }

    fn sleeping(millis: u64) -> Arc<Self> {
        Arc::new(Self {
            script: ExecutorScript::SleepMs(millis),
            executed: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl WorkflowJobExecutor for ScriptedExecutor {
    async fn execute(&self, job: &WorkflowQueueJob) -> AppResult<JobExecutionReport> {
        self.executed.lock().await.push(job.job_id.clone());

        match &self.script {
            ExecutorScript::Succeed(report) => Ok(report.clone()),
            ExecutorScript::Fail(message) => Err(AppError::Internal(message.clone())),
            ExecutorScript::SleepMs(millis) => {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
                Ok(JobExecutionReport {
                    status: WorkflowStatus::Completed,
                    waiting_question: None,
                    result: None,
                })
            }
        }
    }
}

#[derive(Default)]
struct RecordingNotifier {
    notifications: Mutex<Vec<WaitingSignalNotification>>,
    fail: bool,
    receipt: Option<DeliveryReceipt>,
}

#[async_trait]
impl WaitingSignalNotifier for RecordingNotifier {
    async fn notify_waiting_signal(
        &self,
        input: WaitingSignalNotification,
    ) -> AppResult<Option<DeliveryReceipt>> {
        self.notifications.lock().await.push(input);

        if self.fail {
            return Err(AppError::Internal("channel unavailable".to_owned()));
        }

        Ok(self.receipt.clone())
    }
}

fn scope() -> ActorScope {
    ActorScope::new(TenantId::new(), WorkspaceId::new())
}

async fn submit(store: &Arc<InMemoryWorkflowStore>, scope: ActorScope) -> (String, String, String) {
    let intake = ObjectiveIntakeService::new(store.clone() as Arc<dyn WorkflowStore>);
    let submitted = intake
        .submit_objective(SubmitObjectiveInput::new(
            scope,
            "agent-1",
            "schedule an interview",
        ))
        .await;
    assert!(submitted.is_ok());
    let submitted = submitted.unwrap_or_else(|_| unreachable!());
    (
        submitted.job.job_id,
        submitted.run.run_id,
        submitted.request.workflow_id,
    )
}

fn runner_config(worker_id: &str) -> QueueRunnerConfig {
    let mut config = QueueRunnerConfig::new(worker_id);
    config.lease_ms = 30_000;
    config
}

#[tokio::test]
async fn successful_execution_completes_job_and_marks_run_success() {
    let scope = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let (job_id, run_id, _) = submit(&store, scope).await;

    let executor = ScriptedExecutor::succeeding(WorkflowStatus::Completed);
    let runner = QueueRunner::new(store.clone(), executor, runner_config("worker-a"));

    let outcome = runner.run_once().await;
    assert!(outcome.is_ok());
    let outcome = outcome.unwrap_or_default();
    assert_eq!(outcome.claimed, 1);
    assert_eq!(outcome.completed, 1);
    assert_eq!(outcome.failed, 0);

    let job = store
        .get_workflow_job(&scope, job_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(job.status, QueueJobStatus::Completed);
    assert_eq!(job.attempt_count, 1);

    let run = store
        .get_run(&scope, run_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(run.status, RunStatus::Success);
    assert!(run.latency_ms.is_some());

    let events = store
        .list_run_events(&scope, run_id.as_str())
        .await
        .unwrap_or_default();
    assert!(events.iter().any(|event| event.message == "Run claimed by worker"));
    assert!(events.iter().any(|event| event.message == "Run completed"));

    // Submission registered the owning agent.
    let agent = store
        .get_agent(&scope, "agent-1")
        .await
        .unwrap_or_default();
    assert!(agent.is_some());
}

#[tokio::test]
async fn disabled_messaging_settings_suppress_waiting_notifications() {
    let scope = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let (_, run_id, _) = submit(&store, scope).await;

    let stored = store
        .upsert_tenant_messaging_settings(runloom_domain::TenantMessagingSettings {
            tenant_id: scope.tenant_id(),
            workspace_id: scope.workspace_id(),
            default_channel_id: None,
            provider_team_id: None,
            notifications_enabled: false,
            updated_at: chrono::Utc::now(),
        })
        .await;
    assert!(stored.is_ok());

    let executor = ScriptedExecutor::waiting_with_question("Which interviewer?");
    let notifier = Arc::new(RecordingNotifier::default());
    let runner = QueueRunner::new(store.clone(), executor, runner_config("worker-a"))
        .with_notifier(notifier.clone());

    let outcome = runner.run_once().await;
    assert!(outcome.is_ok());

    assert!(notifier.notifications.lock().await.is_empty());

    // The waiting state event is still appended so replies can resume.
    let events = store
        .list_run_events(&scope, run_id.as_str())
        .await
        .unwrap_or_default();
    assert!(events.iter().any(|event| event.is_waiting_for_signal_state()));
}

#[tokio::test]
async fn waiting_execution_requeues_run_and_delivers_question() {
    let scope = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let (job_id, run_id, workflow_id) = submit(&store, scope).await;

    let executor = ScriptedExecutor::waiting_with_question("Which interviewer?");
    let notifier = Arc::new(RecordingNotifier {
        receipt: Some(DeliveryReceipt {
            channel: "chat".to_owned(),
            target: "#scheduling".to_owned(),
            channel_id: Some("C100".to_owned()),
            message_id: Some("M1".to_owned()),
            thread_id: Some("T100".to_owned()),
            provider_team_id: Some("TEAM1".to_owned()),
        }),
        ..RecordingNotifier::default()
    });
    let runner = QueueRunner::new(store.clone(), executor, runner_config("worker-a"))
        .with_notifier(notifier.clone());

    let outcome = runner.run_once().await;
    assert!(outcome.is_ok());
    assert_eq!(outcome.unwrap_or_default().completed, 1);

    // Waiting jobs still ack the queue; the run goes back to queued.
    let job = store
        .get_workflow_job(&scope, job_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(job.status, QueueJobStatus::Completed);

    let run = store
        .get_run(&scope, run_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(run.status, RunStatus::Queued);
    assert!(run.ended_at.is_none());
    assert!(run.latency_ms.is_none());

    let notifications = notifier.notifications.lock().await;
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0].question, "Which interviewer?");

    let thread = store
        .get_workflow_message_thread_by_provider_thread("chat", "TEAM1", "T100")
        .await
        .unwrap_or_default();
    assert!(thread.is_some_and(|thread| thread.workflow_id == workflow_id));

    let events = store
        .list_run_events(&scope, run_id.as_str())
        .await
        .unwrap_or_default();
    assert!(
        events
            .iter()
            .any(|event| event.message == "Waiting question delivered")
    );
    assert!(
        events
            .iter()
            .any(|event| event.message == "Run waiting for signal"
                && event.is_waiting_for_signal_state())
    );
}

#[tokio::test]
async fn notifier_failure_marks_run_failed_but_keeps_workflow_state() {
    let scope = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let (job_id, run_id, _) = submit(&store, scope).await;

    let executor = ScriptedExecutor::waiting_with_question("Which interviewer?");
    let notifier = Arc::new(RecordingNotifier {
        fail: true,
        ..RecordingNotifier::default()
    });
    let runner = QueueRunner::new(store.clone(), executor, runner_config("worker-a"))
        .with_notifier(notifier);

    let outcome = runner.run_once().await;
    assert!(outcome.is_ok());

    let job = store
        .get_workflow_job(&scope, job_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(job.status, QueueJobStatus::Completed);

    let run = store
        .get_run(&scope, run_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(run.status, RunStatus::Failed);
    assert!(
        run.error_summary
            .as_deref()
            .is_some_and(|summary| summary.contains("channel unavailable"))
    );

    let events = store
        .list_run_events(&scope, run_id.as_str())
        .await
        .unwrap_or_default();
    assert!(
        events
            .iter()
            .any(|event| event.message == "Waiting question delivery failed")
    );
}

#[tokio::test]
async fn failed_execution_schedules_a_retry() {
    let scope = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let (job_id, run_id, _) = submit(&store, scope).await;

    let executor = ScriptedExecutor::failing("provider exploded");
    let runner = QueueRunner::new(store.clone(), executor, runner_config("worker-a"));

    let outcome = runner.run_once().await;
    assert!(outcome.is_ok());
    let outcome = outcome.unwrap_or_default();
    assert_eq!(outcome.claimed, 1);
    assert_eq!(outcome.completed, 0);
    assert_eq!(outcome.failed, 1);

    let job = store
        .get_workflow_job(&scope, job_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(job.status, QueueJobStatus::Queued);
    assert!(job.available_at > chrono::Utc::now());
    assert!(
        job.last_error
            .as_deref()
            .is_some_and(|error| error.contains("provider exploded"))
    );

    let run = store
        .get_run(&scope, run_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(run.status, RunStatus::Queued);
    assert_eq!(run.retries, 1);

    let events = store
        .list_run_events(&scope, run_id.as_str())
        .await
        .unwrap_or_default();
    assert!(events.iter().any(|event| event.message == "Run execution failed"));
}

#[tokio::test]
async fn exhausted_attempts_fail_job_and_run_terminally() {
    let scope = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let intake = ObjectiveIntakeService::new(store.clone() as Arc<dyn WorkflowStore>);

    let mut submission = SubmitObjectiveInput::new(scope, "agent-1", "schedule an interview");
    submission.max_attempts = 1;
    let submitted = intake.submit_objective(submission).await;
    assert!(submitted.is_ok());
    let submitted = submitted.unwrap_or_else(|_| unreachable!());

    let executor = ScriptedExecutor::failing("provider exploded");
    let runner = QueueRunner::new(store.clone(), executor, runner_config("worker-a"));

    let outcome = runner.run_once().await;
    assert!(outcome.is_ok());

    let job = store
        .get_workflow_job(&scope, submitted.job.job_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(job.status, QueueJobStatus::Failed);

    let run = store
        .get_run(&scope, submitted.run.run_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(run.status, RunStatus::Failed);
    assert!(run.error_summary.is_some());
}

#[tokio::test]
async fn execution_timeout_follows_the_failure_path() {
    let scope = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let (job_id, _, _) = submit(&store, scope).await;

    let executor = ScriptedExecutor::sleeping(5_000);
    let mut config = runner_config("worker-a");
    config.execute_timeout_ms = 20;
    let runner = QueueRunner::new(store.clone(), executor, config);

    let outcome = runner.run_once().await;
    assert!(outcome.is_ok());
    assert_eq!(outcome.unwrap_or_default().failed, 1);

    let job = store
        .get_workflow_job(&scope, job_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(job.status, QueueJobStatus::Queued);
    assert!(
        job.last_error
            .as_deref()
            .is_some_and(|error| error.contains("timed out"))
    );
}

#[tokio::test]
async fn stale_lease_prevents_success_marking() {
    let scope = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    let (job_id, run_id, _) = submit(&store, scope).await;

    // Worker A claims with an immediately expiring lease.
    let claimed = store
        .claim_workflow_jobs(ClaimWorkflowJobsInput {
            worker_id: "worker-a".to_owned(),
            limit: 1,
            lease_ms: 1,
            tenant_id: None,
            workspace_id: None,
        })
        .await;
    assert!(claimed.is_ok());
    let claimed = claimed.unwrap_or_default();
    assert_eq!(claimed.len(), 1);
    let job_for_a = claimed[0].clone();
    tokio::time::sleep(Duration::from_millis(10)).await;

    // Worker B reclaims after expiry.
    let reclaimed = store
        .claim_workflow_jobs(ClaimWorkflowJobsInput {
            worker_id: "worker-b".to_owned(),
            limit: 1,
            lease_ms: 30_000,
            tenant_id: None,
            workspace_id: None,
        })
        .await;
    assert!(reclaimed.is_ok());
    let reclaimed = reclaimed.unwrap_or_default();
    assert_eq!(reclaimed.len(), 1);
    let token_for_b = reclaimed[0].lease_token.clone();
    assert_ne!(job_for_a.lease_token, token_for_b);

    // Worker A reconciles its finished execution with the stale lease.
    let executor = ScriptedExecutor::succeeding(WorkflowStatus::Completed);
    let runner = QueueRunner::new(store.clone(), executor, runner_config("worker-a"));
    let reconciled = runner
        .reconcile_success(
            &job_for_a,
            &JobExecutionReport {
                status: WorkflowStatus::Completed,
                waiting_question: None,
                result: None,
            },
            chrono::Utc::now(),
            None,
        )
        .await;
    assert!(reconciled.is_err());

    // Worker B's lease survived both of A's no-op transitions.
    let job = store
        .get_workflow_job(&scope, job_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(job.status, QueueJobStatus::Claimed);
    assert_eq!(job.lease_token, token_for_b);

    // The run was never marked successful by the stale worker.
    let run = store
        .get_run(&scope, run_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_ne!(run.status, RunStatus::Success);

    // Worker B's ack still lands.
    let completed = store
        .complete_workflow_job(CompleteWorkflowJobInput {
            scope,
            job_id: job_id.clone(),
            lease_token: token_for_b.unwrap_or_default(),
        })
        .await;
    assert!(completed.is_ok());
    let job = store
        .get_workflow_job(&scope, job_id.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(job.status, QueueJobStatus::Completed);
}

#[tokio::test]
async fn scope_filter_requires_both_halves() {
    let store = Arc::new(InMemoryWorkflowStore::new());
    let executor = ScriptedExecutor::succeeding(WorkflowStatus::Completed);

    let mut config = runner_config("worker-a");
    config.tenant_id = Some(TenantId::new());
    let runner = QueueRunner::new(store, executor, config);

    let outcome = runner.run_once().await;
    assert!(outcome.is_err());
}

#[tokio::test]
async fn scoped_runner_claims_only_its_scope() {
    let scope_a = scope();
    let scope_b = scope();
    let store = Arc::new(InMemoryWorkflowStore::new());
    submit(&store, scope_a).await;
    let (job_b, _, _) = submit(&store, scope_b).await;

    let executor = ScriptedExecutor::succeeding(WorkflowStatus::Completed);
    let mut config = runner_config("worker-a");
    config.tenant_id = Some(scope_a.tenant_id());
    config.workspace_id = Some(scope_a.workspace_id());
    let runner = QueueRunner::new(store.clone(), executor.clone(), config);

    let outcome = runner.run_once().await;
    assert!(outcome.is_ok());
    assert_eq!(outcome.unwrap_or_default().claimed, 1);

    let job = store
        .get_workflow_job(&scope_b, job_b.as_str())
        .await
        .unwrap_or_default()
        .unwrap_or_else(|| unreachable!());
    assert_eq!(job.status, QueueJobStatus::Queued);
}
