use std::sync::Arc;

use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, AppError, AppResult, next_ordered_id};
use runloom_domain::{
    AgentRecord, OBJECTIVE_SCHEMA_VERSION, ObjectiveRequest, Run, RunEvent, RunStatus,
    WorkflowQueueJob,
};
use serde_json::json;
use tracing::info;
use uuid::Uuid;

use crate::runtime_ports::{EnqueueWorkflowJobInput, WorkflowStore};

/// Objective submission payload.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitObjectiveInput {
    /// Acting scope.
    pub scope: ActorScope,
    /// Agent that will own the workflow.
    pub agent_id: String,
    /// Objective text.
    pub objective_prompt: String,
    /// Optional conversation thread identifier.
    pub thread_id: Option<String>,
    /// Submission schema version; must equal the supported version.
    pub schema_version: u32,
    /// Attempt ceiling for the queue job.
    pub max_attempts: u32,
    /// Earliest execution instant; defaults to now.
    pub available_at: Option<DateTime<Utc>>,
}

impl SubmitObjectiveInput {
    /// Creates a submission with default schema version and attempts.
    #[must_use]
    pub fn new(
        scope: ActorScope,
        agent_id: impl Into<String>,
        objective_prompt: impl Into<String>,
    ) -> Self {
        Self {
            scope,
            agent_id: agent_id.into(),
            objective_prompt: objective_prompt.into(),
            thread_id: None,
            schema_version: OBJECTIVE_SCHEMA_VERSION,
            max_attempts: 3,
            available_at: None,
        }
    }
}

/// Everything created by one objective submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmittedObjective {
    /// Immutable objective request record.
    pub request: ObjectiveRequest,
    /// Run aggregate in `queued` state.
    pub run: Run,
    /// First queue job for the workflow.
    pub job: WorkflowQueueJob,
}

/// Records an objective and schedules its first planner loop entry.
#[derive(Clone)]
pub struct ObjectiveIntakeService {
    store: Arc<dyn WorkflowStore>,
}

impl ObjectiveIntakeService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Submits one objective: request record, queued run, and queue job.
    pub async fn submit_objective(
        &self,
        input: SubmitObjectiveInput,
    ) -> AppResult<SubmittedObjective> {
        if input.max_attempts == 0 || input.max_attempts > 10 {
            return Err(AppError::Validation(
                "max_attempts must be between 1 and 10".to_owned(),
            ));
        }

        if input.agent_id.trim().is_empty() {
            return Err(AppError::Validation(
                "agent_id must not be empty".to_owned(),
            ));
        }

        let now = Utc::now();
        self.ensure_agent(&input, now).await?;

        let request = ObjectiveRequest {
            tenant_id: input.scope.tenant_id(),
            workspace_id: input.scope.workspace_id(),
            request_id: next_ordered_id(),
            workflow_id: Uuid::new_v4().to_string(),
            thread_id: input.thread_id.clone(),
            schema_version: input.schema_version,
            objective_prompt: input.objective_prompt.clone(),
            occurred_at: now,
        };
        request.ensure_supported()?;

        self.store.put_objective_request(request.clone()).await?;

        let run = Run {
            tenant_id: input.scope.tenant_id(),
            workspace_id: input.scope.workspace_id(),
            run_id: Uuid::new_v4().to_string(),
            agent_id: input.agent_id.clone(),
            workflow_id: request.workflow_id.clone(),
            request_id: request.request_id.clone(),
            status: RunStatus::Queued,
            retries: 0,
            started_at: None,
            ended_at: None,
            latency_ms: None,
            error_summary: None,
            created_at: now,
            updated_at: now,
        };
        self.store.upsert_run(run.clone()).await?;

        let job = self
            .store
            .enqueue_workflow_job(EnqueueWorkflowJobInput {
                scope: input.scope,
                run_id: run.run_id.clone(),
                agent_id: input.agent_id,
                workflow_id: request.workflow_id.clone(),
                request_id: request.request_id.clone(),
                thread_id: input.thread_id,
                objective_prompt: input.objective_prompt,
                max_attempts: input.max_attempts,
                available_at: input.available_at,
            })
            .await?;

        self.store
            .append_run_event(RunEvent::state(
                input.scope,
                run.run_id.clone(),
                "Run queued",
                json!({"state": "queued", "jobId": job.job_id}),
                Some(request.request_id.clone()),
            ))
            .await?;

        info!(
            workflow_id = %request.workflow_id,
            run_id = %run.run_id,
            job_id = %job.job_id,
            "objective submitted"
        );

        Ok(SubmittedObjective { request, run, job })
    }

    async fn ensure_agent(
        &self,
        input: &SubmitObjectiveInput,
        now: DateTime<Utc>,
    ) -> AppResult<()> {
        match self
            .store
            .get_agent(&input.scope, input.agent_id.as_str())
            .await?
        {
            Some(mut agent) => {
                agent.updated_at = now;
                self.store.upsert_agent(agent).await
            }
            None => {
                self.store
                    .upsert_agent(AgentRecord {
                        tenant_id: input.scope.tenant_id(),
                        workspace_id: input.scope.workspace_id(),
                        agent_id: input.agent_id.clone(),
                        name: input.agent_id.clone(),
                        created_at: now,
                        updated_at: now,
                    })
                    .await
            }
        }
    }
}
