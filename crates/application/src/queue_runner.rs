use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use runloom_core::{AppError, AppResult, TenantId, WorkspaceId};
use runloom_domain::{
    DeliveryReceipt, QueueJobStatus, RunEvent, RunEventLevel, RunStatus,
    WAITING_FOR_SIGNAL_STATE, WorkflowMessageThread, WorkflowQueueJob, WorkflowStatus,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::runtime_ports::{
    ClaimWorkflowJobsInput, CompleteWorkflowJobInput, FailWorkflowJobInput,
    WaitingSignalNotification, WaitingSignalNotifier, WorkflowStore,
};


/// Default per-job execution deadline in milliseconds.
pub const DEFAULT_EXECUTE_TIMEOUT_MS: u64 = 120_000;

/// Delay before a failed job becomes claimable again, in milliseconds.
pub const RETRY_BACKOFF_MS: i64 = 5_000;

const DEFAULT_WAITING_QUESTION: &str = "The workflow is waiting for your input.";

/// Outcome reported by the user-supplied execute callback.
#[derive(Debug, Clone, PartialEq)]
pub struct JobExecutionReport {
    /// Workflow status after the callback returned.
    pub status: WorkflowStatus,
    /// Waiting question, when the workflow suspended on input.
    pub waiting_question: Option<String>,
    /// Opaque result payload.
    pub result: Option<Value>,
}

impl JobExecutionReport {
    /// Extracts the waiting question from the top level or from
    /// `result.waitingQuestion`.
    #[must_use]
    pub fn waiting_question_text(&self) -> Option<String> {
        if let Some(question) = &self.waiting_question {
            return Some(question.clone());
        }

        self.result
            .as_ref()
            .and_then(|value| value["waitingQuestion"].as_str().map(ToOwned::to_owned))
    }
}

/// Execute callback invoked for each claimed job.
///
/// In production this drives the planner loop engine; tests supply fakes.
#[async_trait]
pub trait WorkflowJobExecutor: Send + Sync {
    /// Executes one claimed job.
    async fn execute(&self, job: &WorkflowQueueJob) -> AppResult<JobExecutionReport>;
}

/// Queue runner configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueRunnerConfig {
    /// Worker identity recorded on claims and run events.
    pub worker_id: String,
    /// Claim limit per batch.
    pub batch_size: usize,
    /// Lease duration in milliseconds.
    pub lease_ms: u64,
    /// Per-job execution deadline in milliseconds.
    pub execute_timeout_ms: u64,
    /// Optional tenant scope filter; must be paired with `workspace_id`.
    pub tenant_id: Option<TenantId>,
    /// Optional workspace scope filter; must be paired with `tenant_id`.
    pub workspace_id: Option<WorkspaceId>,
}

impl QueueRunnerConfig {
    /// Creates a configuration with default batch, lease, and timeout values.
    #[must_use]
    pub fn new(worker_id: impl Into<String>) -> Self {
        Self {
            worker_id: worker_id.into(),
            batch_size: 10,
            lease_ms: 30_000,
            execute_timeout_ms: DEFAULT_EXECUTE_TIMEOUT_MS,
            tenant_id: None,
            workspace_id: None,
        }
    }

    fn ensure_scope_coupling(&self) -> AppResult<()> {
        match (self.tenant_id, self.workspace_id) {
            (None, None) | (Some(_), Some(_)) => Ok(()),
            _ => Err(AppError::Validation(
                "tenant_id and workspace_id must be provided together".to_owned(),
            )),
        }
    }
}

/// Counts for one `run_once` batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunOnceOutcome {
    /// Jobs claimed in the batch.
    pub claimed: usize,
    /// Jobs acked completed with a valid lease.
    pub completed: usize,
    /// Jobs whose execution failed or whose lease went stale.
    pub failed: usize,
}

/// Claims a bounded batch of jobs, executes them, and reconciles queue state,
/// run aggregates, and the run-event log.
///
/// The queue ack always precedes the run success marking, and the lease token
/// check inside the ack is the fencing gate: a stale worker observes the
/// rejected ack on read-back and follows the failure path instead.
pub struct QueueRunner {
    store: Arc<dyn WorkflowStore>,
    executor: Arc<dyn WorkflowJobExecutor>,
    notifier: Option<Arc<dyn WaitingSignalNotifier>>,
    config: QueueRunnerConfig,
}

impl QueueRunner {
    /// Creates a runner.
    #[must_use]
    pub fn new(
        store: Arc<dyn WorkflowStore>,
        executor: Arc<dyn WorkflowJobExecutor>,
        config: QueueRunnerConfig,
    ) -> Self {
        Self {
            store,
            executor,
            notifier: None,
            config,
        }
    }

    /// Adds the waiting-signal notifier.
    #[must_use]
    pub fn with_notifier(mut self, notifier: Arc<dyn WaitingSignalNotifier>) -> Self {
        self.notifier = Some(notifier);
        self
    }

    /// Claims and executes exactly one batch.
    pub async fn run_once(&self) -> AppResult<RunOnceOutcome> {
        self.config.ensure_scope_coupling()?;

        let claimed_jobs = self
            .store
            .claim_workflow_jobs(ClaimWorkflowJobsInput {
                worker_id: self.config.worker_id.clone(),
                limit: self.config.batch_size,
                lease_ms: self.config.lease_ms,
                tenant_id: self.config.tenant_id,
                workspace_id: self.config.workspace_id,
            })
            .await?;

        let mut outcome = RunOnceOutcome {
            claimed: claimed_jobs.len(),
            ..RunOnceOutcome::default()
        };

        if !claimed_jobs.is_empty() {
            info!(
                worker_id = %self.config.worker_id,
                claimed = claimed_jobs.len(),
                "claimed workflow jobs"
            );
        }

        for job in claimed_jobs {
            match self.process_job(&job).await {
                Ok(()) => outcome.completed += 1,
                Err(error) => {
                    outcome.failed += 1;
                    warn!(
                        worker_id = %self.config.worker_id,
                        job_id = %job.job_id,
                        error = %error,
                        "workflow job execution failed"
                    );
                }
            }
        }

        Ok(outcome)
    }

    async fn process_job(&self, job: &WorkflowQueueJob) -> AppResult<()> {
        let scope = job.scope();
        let correlation_id = Some(job.job_id.clone());
        let started_at = Utc::now();

        if let Some(mut run) = self.store.get_run(&scope, job.run_id.as_str()).await? {
            run.status = RunStatus::Running;
            run.started_at = Some(started_at);
            run.updated_at = started_at;
            self.store.upsert_run(run).await?;
        }

        self.store
            .append_run_event(RunEvent::log(
                scope,
                job.run_id.clone(),
                RunEventLevel::Info,
                "Run claimed by worker",
                json!({"workerId": self.config.worker_id, "jobId": job.job_id}),
                correlation_id.clone(),
            ))
            .await?;

        let deadline = Duration::from_millis(self.config.execute_timeout_ms);
        let execution = match tokio::time::timeout(deadline, self.executor.execute(job)).await {
            Ok(result) => result,
            Err(_) => Err(AppError::Timeout(format!(
                "job execution timed out after {}ms",
                self.config.execute_timeout_ms
            ))),
        };

        match execution {
            Ok(report) => {
                self.reconcile_success(job, &report, started_at, correlation_id)
                    .await
            }
            Err(error) => {
                self.reconcile_failure(job, error.to_string(), correlation_id)
                    .await?;
                Err(error)
            }
        }
    }

    pub async fn reconcile_success(
        &self,
        job: &WorkflowQueueJob,
        report: &JobExecutionReport,
        started_at: DateTime<Utc>,
        correlation_id: Option<String>,
    ) -> AppResult<()> {
        let scope = job.scope();
        let lease_token = job.lease_token.clone().unwrap_or_default();

        self.store
            .complete_workflow_job(CompleteWorkflowJobInput {
                scope,
                job_id: job.job_id.clone(),
                lease_token,
            })
            .await?;

        let acked = self
            .store
            .get_workflow_job(&scope, job.job_id.as_str())
            .await?
            .is_some_and(|stored| stored.status == QueueJobStatus::Completed);

        if !acked {
            let message = "stale lease: job was reclaimed before completion".to_owned();
            warn!(
                worker_id = %self.config.worker_id,
                job_id = %job.job_id,
                "completion ack rejected; treating execution as failed"
            );
            self.reconcile_failure(job, message.clone(), correlation_id)
                .await?;
            return Err(AppError::Conflict(message));
        }

        if report.status == WorkflowStatus::WaitingSignal {
            self.settle_waiting_run(job, report, correlation_id).await
        } else {
            self.settle_successful_run(job, started_at, correlation_id)
                .await
        }
    }

    async fn settle_waiting_run(
        &self,
        job: &WorkflowQueueJob,
        report: &JobExecutionReport,
        correlation_id: Option<String>,
    ) -> AppResult<()> {
        let scope = job.scope();
        let now = Utc::now();

        if let Some(mut run) = self.store.get_run(&scope, job.run_id.as_str()).await? {
            run.status = RunStatus::Queued;
            run.ended_at = None;
            run.latency_ms = None;
            run.updated_at = now;
            self.store.upsert_run(run).await?;
        }

        let notifications_enabled = self
            .store
            .get_tenant_messaging_settings(&scope)
            .await?
            .is_none_or(|settings| settings.notifications_enabled);

        if let Some(notifier) = self.notifier.as_ref().filter(|_| notifications_enabled) {
            let question = report
                .waiting_question_text()
                .unwrap_or_else(|| DEFAULT_WAITING_QUESTION.to_owned());

            let delivery = notifier
                .notify_waiting_signal(WaitingSignalNotification {
                    scope,
                    workflow_id: job.workflow_id.clone(),
                    run_id: job.run_id.clone(),
                    thread_id: job.thread_id.clone(),
                    question: question.clone(),
                })
                .await;

            match delivery {
                Ok(receipt) => {
                    if let Some(receipt) = receipt {
                        self.persist_delivery_thread(job, &receipt).await?;
                    }

                    self.store
                        .append_run_event(RunEvent::log(
                            scope,
                            job.run_id.clone(),
                            RunEventLevel::Info,
                            "Waiting question delivered",
                            json!({"question": question}),
                            correlation_id.clone(),
                        ))
                        .await?;
                }
                Err(error) => {
                    self.store
                        .append_run_event(RunEvent::log(
                            scope,
                            job.run_id.clone(),
                            RunEventLevel::Error,
                            "Waiting question delivery failed",
                            json!({"error": error.to_string()}),
                            correlation_id.clone(),
                        ))
                        .await?;

                    if let Some(mut run) = self.store.get_run(&scope, job.run_id.as_str()).await?
                    {
                        run.status = RunStatus::Failed;
                        run.ended_at = Some(Utc::now());
                        run.error_summary = Some(error.to_string());
                        run.updated_at = Utc::now();
                        self.store.upsert_run(run).await?;
                    }

                    warn!(
                        worker_id = %self.config.worker_id,
                        run_id = %job.run_id,
                        error = %error,
                        "waiting question delivery failed; run marked failed"
                    );
                    return Ok(());
                }
            }
        }

        self.store
            .append_run_event(RunEvent::state(
                scope,
                job.run_id.clone(),
                "Run waiting for signal",
                json!({"state": WAITING_FOR_SIGNAL_STATE, "workflowId": job.workflow_id}),
                correlation_id,
            ))
            .await?;

        Ok(())
    }

    async fn settle_successful_run(
        &self,
        job: &WorkflowQueueJob,
        started_at: DateTime<Utc>,
        correlation_id: Option<String>,
    ) -> AppResult<()> {
        let scope = job.scope();
        let ended_at = Utc::now();

        if let Some(mut run) = self.store.get_run(&scope, job.run_id.as_str()).await? {
            run.status = RunStatus::Success;
            run.ended_at = Some(ended_at);
            run.latency_ms = Some((ended_at - started_at).num_milliseconds());
            run.error_summary = None;
            run.updated_at = ended_at;
            self.store.upsert_run(run).await?;
        }

        self.store
            .append_run_event(RunEvent::state(
                scope,
                job.run_id.clone(),
                "Run completed",
                json!({"state": "completed"}),
                correlation_id,
            ))
            .await?;

        Ok(())
    }

    async fn persist_delivery_thread(
        &self,
        job: &WorkflowQueueJob,
        receipt: &DeliveryReceipt,
    ) -> AppResult<()> {
        let (Some(provider_thread_id), Some(provider_team_id)) =
            (receipt.thread_id.clone(), receipt.provider_team_id.clone())
        else {
            return Ok(());
        };

        self.store
            .upsert_workflow_message_thread(WorkflowMessageThread {
                tenant_id: job.tenant_id,
                workspace_id: job.workspace_id,
                thread_id: job
                    .thread_id
                    .clone()
                    .unwrap_or_else(|| provider_thread_id.clone()),
                workflow_id: job.workflow_id.clone(),
                provider: receipt.channel.clone(),
                provider_team_id,
                provider_channel_id: receipt.channel_id.clone(),
                provider_thread_id,
                created_at: Utc::now(),
            })
            .await
    }

    async fn reconcile_failure(
        &self,
        job: &WorkflowQueueJob,
        error_message: String,
        correlation_id: Option<String>,
    ) -> AppResult<()> {
        let scope = job.scope();
        let retry_at = Utc::now() + chrono::Duration::milliseconds(RETRY_BACKOFF_MS);

        self.store
            .fail_workflow_job(FailWorkflowJobInput {
                scope,
                job_id: job.job_id.clone(),
                lease_token: job.lease_token.clone().unwrap_or_default(),
                error: error_message.clone(),
                retry_at,
            })
            .await?;

        let stored = self.store.get_workflow_job(&scope, job.job_id.as_str()).await?;
        match stored.map(|stored| (stored.status, stored.lease_token)) {
            Some((QueueJobStatus::Failed, _)) => {
                if let Some(mut run) = self.store.get_run(&scope, job.run_id.as_str()).await? {
                    run.status = RunStatus::Failed;
                    run.ended_at = Some(Utc::now());
                    run.error_summary = Some(error_message.clone());
                    run.updated_at = Utc::now();
                    self.store.upsert_run(run).await?;
                }
            }
            Some((QueueJobStatus::Queued, _)) => {
                if let Some(mut run) = self.store.get_run(&scope, job.run_id.as_str()).await? {
                    run.status = RunStatus::Queued;
                    run.retries += 1;
                    run.ended_at = None;
                    run.latency_ms = None;
                    run.updated_at = Utc::now();
                    self.store.upsert_run(run).await?;
                }
            }
            // Reclaimed by another worker; its lifecycle owns the run now.
            _ => {}
        }

        self.store
            .append_run_event(RunEvent::log(
                scope,
                job.run_id.clone(),
                RunEventLevel::Error,
                "Run execution failed",
                json!({"error": error_message}),
                correlation_id,
            ))
            .await?;

        Ok(())
    }
}
