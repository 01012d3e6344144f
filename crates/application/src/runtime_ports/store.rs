use async_trait::async_trait;
use runloom_core::{ActorScope, AppResult};
use runloom_domain::{
    AgentRecord, ApprovalDecisionRecord, AuditRecord, InboundMessageReceipt, ObjectiveRequest,
    PolicyDecisionRecord, Run, RunEvent, TenantMessagingSettings, WaitingCheckpoint,
    WorkflowMessageThread, WorkflowQueueJob, WorkflowRuntimeSnapshot, WorkflowSignalRecord,
};

use super::inputs::{
    AuditQuery, ClaimWorkflowJobsInput, CompleteWorkflowJobInput, EnqueueWorkflowJobInput,
    FailWorkflowJobInput, JobListQuery, RunListQuery,
};

/// Checkpoint side effect carried by a workflow mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkflowCheckpointAction {
    /// Leave checkpoint state untouched.
    None,
    /// Install the waiting checkpoint alongside a `waiting_signal` transition.
    Install,
    /// Consume the checkpoint exactly once; fails when already consumed.
    Consume,
}

/// One transactional workflow step mutation.
///
/// Everything in the mutation commits atomically or not at all; the
/// `expected_version` field is the optimistic concurrency gate that serializes
/// step transactions per workflow (`expected_version == 0` creates the
/// workflow).
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowMutation {
    /// Acting scope; every attached record must belong to it.
    pub scope: ActorScope,
    /// Workflow being mutated.
    pub workflow_id: String,
    /// Snapshot version read by the transaction, 0 for creation.
    pub expected_version: u64,
    /// Desired post-transaction snapshot; the store assigns the new version.
    pub snapshot: WorkflowRuntimeSnapshot,
    /// Policy decisions written by this step.
    pub policy_decisions: Vec<PolicyDecisionRecord>,
    /// Approval decisions written or resolved by this step.
    pub approval_decisions: Vec<ApprovalDecisionRecord>,
    /// Audit rows written by this step.
    pub audit_records: Vec<AuditRecord>,
    /// Checkpoint side effect.
    pub checkpoint: WorkflowCheckpointAction,
    /// Signal recorded by a resume transaction.
    pub record_signal: Option<WorkflowSignalRecord>,
    /// Signal acknowledged by a resume transaction. At most once per signal.
    pub acknowledge_signal_id: Option<String>,
    /// Inbox signals consumed by this planner iteration.
    pub consume_signal_ids: Vec<String>,
    /// Follow-up queue job enqueued by a resume transaction.
    pub enqueue_job: Option<EnqueueWorkflowJobInput>,
}

impl WorkflowMutation {
    /// Creates a mutation carrying only a snapshot change.
    #[must_use]
    pub fn snapshot_only(
        scope: ActorScope,
        expected_version: u64,
        snapshot: WorkflowRuntimeSnapshot,
    ) -> Self {
        Self {
            scope,
            workflow_id: snapshot.workflow_id.clone(),
            expected_version,
            snapshot,
            policy_decisions: Vec::new(),
            approval_decisions: Vec::new(),
            audit_records: Vec::new(),
            checkpoint: WorkflowCheckpointAction::None,
            record_signal: None,
            acknowledge_signal_id: None,
            consume_signal_ids: Vec::new(),
            enqueue_job: None,
        }
    }
}

/// Transactional persistence port consumed by the runtime core.
///
/// Every mutating operation is atomic. Queue transitions use the lease token
/// as the fencing credential: a stale token makes `complete_workflow_job` and
/// `fail_workflow_job` silent no-ops that callers detect by reading the job
/// back.
#[async_trait]
pub trait WorkflowStore: Send + Sync {
    /// Inserts one immutable objective request. Duplicate ids conflict.
    async fn put_objective_request(&self, request: ObjectiveRequest) -> AppResult<()>;

    /// Returns one objective request by id.
    async fn get_objective_request(
        &self,
        scope: &ActorScope,
        request_id: &str,
    ) -> AppResult<Option<ObjectiveRequest>>;

    /// Inserts or updates one agent.
    async fn upsert_agent(&self, agent: AgentRecord) -> AppResult<()>;

    /// Returns one agent by id.
    async fn get_agent(&self, scope: &ActorScope, agent_id: &str) -> AppResult<Option<AgentRecord>>;

    /// Lists agents for one scope.
    async fn list_agents(&self, scope: &ActorScope) -> AppResult<Vec<AgentRecord>>;

    /// Inserts or updates one run aggregate.
    async fn upsert_run(&self, run: Run) -> AppResult<()>;

    /// Returns one run by id.
    async fn get_run(&self, scope: &ActorScope, run_id: &str) -> AppResult<Option<Run>>;

    /// Lists runs for one scope, newest first.
    async fn list_runs(&self, scope: &ActorScope, query: RunListQuery) -> AppResult<Vec<Run>>;

    /// Appends one run event.
    async fn append_run_event(&self, event: RunEvent) -> AppResult<()>;

    /// Lists run events for one run in append order.
    async fn list_run_events(&self, scope: &ActorScope, run_id: &str) -> AppResult<Vec<RunEvent>>;

    /// Enqueues one workflow job in `queued` status with zero attempts.
    async fn enqueue_workflow_job(
        &self,
        input: EnqueueWorkflowJobInput,
    ) -> AppResult<WorkflowQueueJob>;

    /// Lists queue jobs for one scope.
    async fn list_workflow_jobs(
        &self,
        scope: &ActorScope,
        query: JobListQuery,
    ) -> AppResult<Vec<WorkflowQueueJob>>;

    /// Atomically claims up to `limit` due jobs for one worker.
    ///
    /// Safe under concurrent claims: no two workers receive the same job.
    /// Claimed jobs whose lease expired are reclaimable.
    async fn claim_workflow_jobs(
        &self,
        input: ClaimWorkflowJobsInput,
    ) -> AppResult<Vec<WorkflowQueueJob>>;

    /// Transitions `claimed` to `completed` iff the lease token matches.
    async fn complete_workflow_job(&self, input: CompleteWorkflowJobInput) -> AppResult<()>;

    /// Requeues or terminally fails one claimed job iff the lease token
    /// matches.
    async fn fail_workflow_job(&self, input: FailWorkflowJobInput) -> AppResult<()>;

    /// Returns one queue job by id.
    async fn get_workflow_job(
        &self,
        scope: &ActorScope,
        job_id: &str,
    ) -> AppResult<Option<WorkflowQueueJob>>;

    /// Inserts or updates one provider message thread mapping.
    async fn upsert_workflow_message_thread(&self, thread: WorkflowMessageThread) -> AppResult<()>;

    /// Resolves a thread mapping by provider-side identifiers.
    async fn get_workflow_message_thread_by_provider_thread(
        &self,
        provider: &str,
        provider_team_id: &str,
        provider_thread_id: &str,
    ) -> AppResult<Option<WorkflowMessageThread>>;

    /// Records one inbound receipt; returns false for duplicates.
    async fn record_inbound_message_receipt(
        &self,
        receipt: InboundMessageReceipt,
    ) -> AppResult<bool>;

    /// Returns messaging settings for one scope.
    async fn get_tenant_messaging_settings(
        &self,
        scope: &ActorScope,
    ) -> AppResult<Option<TenantMessagingSettings>>;

    /// Inserts or updates messaging settings for one scope.
    async fn upsert_tenant_messaging_settings(
        &self,
        settings: TenantMessagingSettings,
    ) -> AppResult<()>;

    /// Appends one signal to the workflow inbox.
    async fn enqueue_workflow_signal(&self, signal: WorkflowSignalRecord) -> AppResult<()>;

    /// Lists inbox signals not yet consumed by a planner iteration.
    async fn list_pending_workflow_signals(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Vec<WorkflowSignalRecord>>;

    /// Marks one inbox signal as consumed.
    async fn mark_workflow_signal_consumed(
        &self,
        scope: &ActorScope,
        signal_id: &str,
    ) -> AppResult<()>;

    /// Returns the workflow runtime snapshot.
    async fn get_workflow_runtime_snapshot(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Option<WorkflowRuntimeSnapshot>>;

    /// Replaces the workflow runtime snapshot without version checking.
    ///
    /// Step transactions must go through [`WorkflowStore::commit_workflow_mutation`]
    /// instead; this operation exists for administrative repair paths.
    async fn upsert_workflow_runtime_snapshot(
        &self,
        snapshot: WorkflowRuntimeSnapshot,
    ) -> AppResult<()>;

    /// Atomically commits one workflow step mutation.
    ///
    /// Fails with a conflict when `expected_version` is stale, when the
    /// status transition is illegal, or when the checkpoint/signal side
    /// effects were already applied. Returns the stored snapshot.
    async fn commit_workflow_mutation(
        &self,
        mutation: WorkflowMutation,
    ) -> AppResult<WorkflowRuntimeSnapshot>;

    /// Returns the waiting checkpoint for one workflow, when present.
    async fn get_waiting_checkpoint(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Option<WaitingCheckpoint>>;

    /// Appends one audit record outside a workflow mutation.
    async fn append_audit_record(&self, record: AuditRecord) -> AppResult<()>;

    /// Lists audit records for one scope; cross-tenant reads return empty.
    async fn list_audit_records(
        &self,
        scope: &ActorScope,
        query: AuditQuery,
    ) -> AppResult<Vec<AuditRecord>>;

    /// Lists policy decisions for one workflow.
    async fn list_policy_decisions(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Vec<PolicyDecisionRecord>>;

    /// Lists approval decisions for one workflow.
    async fn list_approval_decisions(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Vec<ApprovalDecisionRecord>>;

    /// Lists signal records for one workflow, including acknowledged ones.
    async fn list_workflow_signals(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Vec<WorkflowSignalRecord>>;
}
