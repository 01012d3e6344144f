use std::collections::{HashMap, HashSet};

use async_trait::async_trait;
use runloom_application::{
    AuditQuery, ClaimWorkflowJobsInput, CompleteWorkflowJobInput, EnqueueWorkflowJobInput,
    FailWorkflowJobInput, JobListQuery, RunListQuery, WorkflowMutation, WorkflowStore,
};
use runloom_core::{ActorScope, AppError, AppResult};
use runloom_domain::{
    AgentRecord, ApprovalDecisionRecord, AuditRecord, InboundMessageReceipt, ObjectiveRequest,
    PolicyDecisionRecord, Run, RunEvent, TenantMessagingSettings, WaitingCheckpoint,
    WorkflowMessageThread, WorkflowQueueJob, WorkflowRuntimeSnapshot, WorkflowSignalRecord,
};
use tokio::sync::Mutex;

mod mutation;
mod queue;

struct StoredSignal {
    record: WorkflowSignalRecord,
    consumed: bool,
}

#[derive(Default)]
struct StoreState {
    objective_requests: HashMap<(ActorScope, String), ObjectiveRequest>,
    agents: HashMap<(ActorScope, String), AgentRecord>,
    runs: HashMap<(ActorScope, String), Run>,
    run_events: Vec<RunEvent>,
    jobs: Vec<WorkflowQueueJob>,
    threads: HashMap<(ActorScope, String), WorkflowMessageThread>,
    receipts: HashSet<(String, String, String)>,
    messaging_settings: HashMap<ActorScope, TenantMessagingSettings>,
    signals: Vec<StoredSignal>,
    snapshots: HashMap<(ActorScope, String), WorkflowRuntimeSnapshot>,
    checkpoints: HashMap<(ActorScope, String), WaitingCheckpoint>,
    audit_records: Vec<AuditRecord>,
    policy_decisions: Vec<PolicyDecisionRecord>,
    approval_decisions: Vec<ApprovalDecisionRecord>,
}

/// In-memory workflow store implementation.
///
/// One mutex guards the whole state, so every port operation, including the
/// composite workflow mutation and the batch claim, is atomic with respect to
/// all others. That single lock is what makes this store a faithful
/// reference implementation of the transactional persistence port.
pub struct InMemoryWorkflowStore {
    state: Mutex<StoreState>,
}

impl InMemoryWorkflowStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            state: Mutex::new(StoreState::default()),
        }
    }
}

impl Default for InMemoryWorkflowStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl WorkflowStore for InMemoryWorkflowStore {
    async fn put_objective_request(&self, request: ObjectiveRequest) -> AppResult<()> {
        request.ensure_supported()?;
        let key = (request.scope(), request.request_id.clone());
        let mut state = self.state.lock().await;

        if state.objective_requests.contains_key(&key) {
            return Err(AppError::Conflict(format!(
                "objective request '{}' already exists",
                key.1
            )));
        }

        state.objective_requests.insert(key, request);
        Ok(())
    }

    async fn get_objective_request(
        &self,
        scope: &ActorScope,
        request_id: &str,
    ) -> AppResult<Option<ObjectiveRequest>> {
        let state = self.state.lock().await;
        Ok(state
            .objective_requests
            .get(&(*scope, request_id.to_owned()))
            .cloned())
    }

    async fn upsert_agent(&self, agent: AgentRecord) -> AppResult<()> {
        let key = (agent.scope(), agent.agent_id.clone());
        self.state.lock().await.agents.insert(key, agent);
        Ok(())
    }

    async fn get_agent(
        &self,
        scope: &ActorScope,
        agent_id: &str,
    ) -> AppResult<Option<AgentRecord>> {
        let state = self.state.lock().await;
        Ok(state.agents.get(&(*scope, agent_id.to_owned())).cloned())
    }

    async fn list_agents(&self, scope: &ActorScope) -> AppResult<Vec<AgentRecord>> {
        let state = self.state.lock().await;
        let mut agents: Vec<AgentRecord> = state
            .agents
            .iter()
            .filter(|((stored_scope, _), _)| stored_scope == scope)
            .map(|(_, agent)| agent.clone())
            .collect();
        agents.sort_by(|left, right| left.agent_id.cmp(&right.agent_id));
        Ok(agents)
    }

    async fn upsert_run(&self, run: Run) -> AppResult<()> {
        let key = (run.scope(), run.run_id.clone());
        self.state.lock().await.runs.insert(key, run);
        Ok(())
    }

    async fn get_run(&self, scope: &ActorScope, run_id: &str) -> AppResult<Option<Run>> {
        let state = self.state.lock().await;
        Ok(state.runs.get(&(*scope, run_id.to_owned())).cloned())
    }

    async fn list_runs(&self, scope: &ActorScope, query: RunListQuery) -> AppResult<Vec<Run>> {
        let state = self.state.lock().await;
        let mut runs: Vec<Run> = state
            .runs
            .iter()
            .filter(|((stored_scope, _), run)| {
                stored_scope == scope
                    && query
                        .workflow_id
                        .as_deref()
                        .is_none_or(|workflow_id| run.workflow_id == workflow_id)
            })
            .map(|(_, run)| run.clone())
            .collect();
        runs.sort_by(|left, right| right.created_at.cmp(&left.created_at));

        if query.limit > 0 {
            runs.truncate(query.limit);
        }

        Ok(runs)
    }

    async fn append_run_event(&self, event: RunEvent) -> AppResult<()> {
        self.state.lock().await.run_events.push(event);
        Ok(())
    }

    async fn list_run_events(
        &self,
        scope: &ActorScope,
        run_id: &str,
    ) -> AppResult<Vec<RunEvent>> {
        let state = self.state.lock().await;
        Ok(state
            .run_events
            .iter()
            .filter(|event| {
                event.tenant_id == scope.tenant_id()
                    && event.workspace_id == scope.workspace_id()
                    && event.run_id == run_id
            })
            .cloned()
            .collect())
    }

    async fn enqueue_workflow_job(
        &self,
        input: EnqueueWorkflowJobInput,
    ) -> AppResult<WorkflowQueueJob> {
        let mut state = self.state.lock().await;
        queue::insert_job(&mut state, input)
    }

    async fn list_workflow_jobs(
        &self,
        scope: &ActorScope,
        query: JobListQuery,
    ) -> AppResult<Vec<WorkflowQueueJob>> {
        let state = self.state.lock().await;
        let mut jobs: Vec<WorkflowQueueJob> = state
            .jobs
            .iter()
            .filter(|job| {
                job.scope() == *scope
                    && query.status.is_none_or(|status| job.status == status)
                    && query
                        .workflow_id
                        .as_deref()
                        .is_none_or(|workflow_id| job.workflow_id == workflow_id)
            })
            .cloned()
            .collect();
        jobs.sort_by(|left, right| {
            left.created_at
                .cmp(&right.created_at)
                .then_with(|| left.job_id.cmp(&right.job_id))
        });
        Ok(jobs)
    }

    async fn claim_workflow_jobs(
        &self,
        input: ClaimWorkflowJobsInput,
    ) -> AppResult<Vec<WorkflowQueueJob>> {
        let mut state = self.state.lock().await;
        queue::claim_jobs(&mut state, input)
    }

    async fn complete_workflow_job(&self, input: CompleteWorkflowJobInput) -> AppResult<()> {
        let mut state = self.state.lock().await;
        queue::complete_job(&mut state, input);
        Ok(())
    }

    async fn fail_workflow_job(&self, input: FailWorkflowJobInput) -> AppResult<()> {
        let mut state = self.state.lock().await;
        queue::fail_job(&mut state, input);
        Ok(())
    }

    async fn get_workflow_job(
        &self,
        scope: &ActorScope,
        job_id: &str,
    ) -> AppResult<Option<WorkflowQueueJob>> {
        let state = self.state.lock().await;
        Ok(state
            .jobs
            .iter()
            .find(|job| job.scope() == *scope && job.job_id == job_id)
            .cloned())
    }

    async fn upsert_workflow_message_thread(
        &self,
        thread: WorkflowMessageThread,
    ) -> AppResult<()> {
        let key = (thread.scope(), thread.thread_id.clone());
        self.state.lock().await.threads.insert(key, thread);
        Ok(())
    }

    async fn get_workflow_message_thread_by_provider_thread(
        &self,
        provider: &str,
        provider_team_id: &str,
        provider_thread_id: &str,
    ) -> AppResult<Option<WorkflowMessageThread>> {
        let state = self.state.lock().await;
        Ok(state
            .threads
            .values()
            .find(|thread| {
                thread.provider == provider
                    && thread.provider_team_id == provider_team_id
                    && thread.provider_thread_id == provider_thread_id
            })
            .cloned())
    }

    async fn record_inbound_message_receipt(
        &self,
        receipt: InboundMessageReceipt,
    ) -> AppResult<bool> {
        let key = (
            receipt.provider.clone(),
            receipt.provider_team_id.clone(),
            receipt.event_id.clone(),
        );
        Ok(self.state.lock().await.receipts.insert(key))
    }

    async fn get_tenant_messaging_settings(
        &self,
        scope: &ActorScope,
    ) -> AppResult<Option<TenantMessagingSettings>> {
        let state = self.state.lock().await;
        Ok(state.messaging_settings.get(scope).cloned())
    }

    async fn upsert_tenant_messaging_settings(
        &self,
        settings: TenantMessagingSettings,
    ) -> AppResult<()> {
        let scope = ActorScope::new(settings.tenant_id, settings.workspace_id);
        self.state
            .lock()
            .await
            .messaging_settings
            .insert(scope, settings);
        Ok(())
    }

    async fn enqueue_workflow_signal(&self, signal: WorkflowSignalRecord) -> AppResult<()> {
        let mut state = self.state.lock().await;
        mutation::insert_signal(&mut state, signal)
    }

    async fn list_pending_workflow_signals(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Vec<WorkflowSignalRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .signals
            .iter()
            .filter(|stored| {
                !stored.consumed
                    && stored.record.tenant_id == scope.tenant_id()
                    && stored.record.workspace_id == scope.workspace_id()
                    && stored.record.workflow_id == workflow_id
            })
            .map(|stored| stored.record.clone())
            .collect())
    }

    async fn mark_workflow_signal_consumed(
        &self,
        scope: &ActorScope,
        signal_id: &str,
    ) -> AppResult<()> {
        let mut state = self.state.lock().await;
        mutation::consume_signal(&mut state, scope, signal_id)
    }

    async fn get_workflow_runtime_snapshot(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Option<WorkflowRuntimeSnapshot>> {
        let state = self.state.lock().await;
        Ok(state
            .snapshots
            .get(&(*scope, workflow_id.to_owned()))
            .cloned())
    }

    async fn upsert_workflow_runtime_snapshot(
        &self,
        snapshot: WorkflowRuntimeSnapshot,
    ) -> AppResult<()> {
        snapshot.ensure_consistent()?;
        let key = (snapshot.scope(), snapshot.workflow_id.clone());
        self.state.lock().await.snapshots.insert(key, snapshot);
        Ok(())
    }

    async fn commit_workflow_mutation(
        &self,
        mutation: WorkflowMutation,
    ) -> AppResult<WorkflowRuntimeSnapshot> {
        let mut state = self.state.lock().await;
        mutation::apply_workflow_mutation(&mut state, mutation)
    }

    async fn get_waiting_checkpoint(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Option<WaitingCheckpoint>> {
        let state = self.state.lock().await;
        Ok(state
            .checkpoints
            .get(&(*scope, workflow_id.to_owned()))
            .cloned())
    }

    async fn append_audit_record(&self, record: AuditRecord) -> AppResult<()> {
        self.state.lock().await.audit_records.push(record);
        Ok(())
    }

    async fn list_audit_records(
        &self,
        scope: &ActorScope,
        query: AuditQuery,
    ) -> AppResult<Vec<AuditRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .audit_records
            .iter()
            .filter(|record| {
                record.tenant_id == scope.tenant_id()
                    && record.workspace_id == scope.workspace_id()
                    && query
                        .workflow_id
                        .as_deref()
                        .is_none_or(|workflow_id| record.workflow_id == workflow_id)
                    && query
                        .request_id
                        .as_deref()
                        .is_none_or(|request_id| record.request_id == request_id)
            })
            .cloned()
            .collect())
    }

    async fn list_policy_decisions(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Vec<PolicyDecisionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .policy_decisions
            .iter()
            .filter(|record| {
                record.tenant_id == scope.tenant_id()
                    && record.workspace_id == scope.workspace_id()
                    && record.workflow_id == workflow_id
            })
            .cloned()
            .collect())
    }

    async fn list_approval_decisions(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Vec<ApprovalDecisionRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .approval_decisions
            .iter()
            .filter(|record| {
                record.tenant_id == scope.tenant_id()
                    && record.workspace_id == scope.workspace_id()
                    && record.workflow_id == workflow_id
            })
            .cloned()
            .collect())
    }

    async fn list_workflow_signals(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Vec<WorkflowSignalRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .signals
            .iter()
            .filter(|stored| {
                stored.record.tenant_id == scope.tenant_id()
                    && stored.record.workspace_id == scope.workspace_id()
                    && stored.record.workflow_id == workflow_id
            })
            .map(|stored| stored.record.clone())
            .collect())
    }
}
