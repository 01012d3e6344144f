use std::sync::Arc;

use chrono::{DateTime, Utc};
use runloom_core::{ActorScope, AppError, AppResult, next_ordered_id};
use runloom_domain::{
    ApprovalDecisionRecord, ApprovalStatus, AuditEventType, AuditRecord, InboundMessageReceipt,
    PendingApproval, RunEventType, SignalStatus, SignalType, WorkflowRuntimeSnapshot,
    WorkflowSignalRecord, WorkflowStatus, validate_signal_payload,
};
use serde_json::{Value, json};
use tracing::{info, warn};

use crate::runtime_ports::{
    EnqueueWorkflowJobInput, JobListQuery, WorkflowCheckpointAction, WorkflowMutation,
    WorkflowStore,
};


const FALLBACK_RESUME_MAX_ATTEMPTS: u32 = 3;

/// Signal resume request.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeWithSignalInput {
    /// Acting scope; must match the workflow scope.
    pub scope: ActorScope,
    /// Waiting workflow.
    pub workflow_id: String,
    /// Signal type.
    pub signal_type: SignalType,
    /// Signal payload, validated per type.
    pub payload: Value,
    /// Instant the signal occurred at its source; defaults to now.
    pub occurred_at: Option<DateTime<Utc>>,
    /// Correlation identifier threaded into audit rows.
    pub correlation_id: Option<String>,
}

/// Result of one successful resume.
#[derive(Debug, Clone, PartialEq)]
pub struct ResumeOutcome {
    /// Workflow snapshot after the resume transaction.
    pub snapshot: WorkflowRuntimeSnapshot,
    /// Identifier of the acknowledged signal.
    pub signal_id: String,
}

/// Outcome of one inbound provider reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    /// The reply was recorded as a signal and a follow-up job was enqueued.
    QueuedSignal {
        /// Identifier of the recorded signal.
        signal_id: String,
    },
    /// The provider event was already processed.
    Duplicate,
    /// The workflow is not waiting for input; nothing was enqueued.
    NotWaiting,
}

/// Inbound provider thread reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestThreadReplyInput {
    /// Messaging provider name.
    pub provider: String,
    /// Provider team/installation identifier.
    pub provider_team_id: String,
    /// Provider-side thread identifier.
    pub provider_thread_id: String,
    /// Provider event identifier used for dedup.
    pub event_id: String,
    /// Reply text.
    pub message: String,
    /// Instant the reply occurred; defaults to now.
    pub occurred_at: Option<DateTime<Utc>>,
}

/// Ingests inbound signals and resumes waiting workflows.
#[derive(Clone)]
pub struct SignalService {
    store: Arc<dyn WorkflowStore>,
}

impl SignalService {
    /// Creates the service.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self { store }
    }

    /// Resumes one waiting workflow with a validated signal.
    ///
    /// The resume is a single transaction: it consumes the waiting
    /// checkpoint, records and acknowledges the signal, writes the inbox row,
    /// resolves a pending approval when applicable, and enqueues a follow-up
    /// job with a reset attempt count.
    pub async fn resume_with_signal(
        &self,
        input: ResumeWithSignalInput,
    ) -> AppResult<ResumeOutcome> {
        validate_signal_payload(input.signal_type, &input.payload)?;

        let snapshot = self
            .store
            .get_workflow_runtime_snapshot(&input.scope, input.workflow_id.as_str())
            .await?
            .ok_or_else(|| AppError::Validation("workflow not found".to_owned()))?;

        if snapshot.status != WorkflowStatus::WaitingSignal {
            return Err(AppError::Conflict(format!(
                "workflow '{}' is not waiting for a signal",
                input.workflow_id
            )));
        }

        let occurred_at = input.occurred_at.unwrap_or_else(Utc::now);
        let signal_id = next_ordered_id();
        let scope = input.scope;

        let mut next = snapshot.clone();
        next.status = WorkflowStatus::Running;
        next.waiting_question = None;

        let mut mutation = WorkflowMutation::snapshot_only(scope, snapshot.version, next);
        mutation.checkpoint = WorkflowCheckpointAction::Consume;
        mutation.record_signal = Some(WorkflowSignalRecord {
            tenant_id: scope.tenant_id(),
            workspace_id: scope.workspace_id(),
            signal_id: signal_id.clone(),
            workflow_id: input.workflow_id.clone(),
            signal_type: input.signal_type,
            payload: input.payload.clone(),
            occurred_at,
            status: SignalStatus::Received,
            acknowledged_at: None,
        });
        mutation.acknowledge_signal_id = Some(signal_id.clone());

        match (input.signal_type, snapshot.pending_approval.clone()) {
            (SignalType::Approval, Some(pending)) => {
                self.resolve_approval(
                    &mut mutation,
                    &snapshot,
                    pending,
                    &input,
                    signal_id.as_str(),
                    occurred_at,
                )
                .await?;
            }
            (SignalType::Approval, None) => {
                return Err(AppError::Conflict(format!(
                    "workflow '{}' has no pending approval",
                    input.workflow_id
                )));
            }
            (_, Some(pending)) if pending.status == ApprovalStatus::Pending => {
                return Err(AppError::Conflict(format!(
                    "workflow '{}' is waiting for an approval decision",
                    input.workflow_id
                )));
            }
            _ => {}
        }

        mutation.enqueue_job = Some(EnqueueWorkflowJobInput {
            scope,
            run_id: snapshot.run_id.clone(),
            agent_id: snapshot.agent_id.clone(),
            workflow_id: snapshot.workflow_id.clone(),
            request_id: snapshot.request_id.clone(),
            thread_id: snapshot.thread_id.clone(),
            objective_prompt: snapshot.objective_prompt.clone(),
            max_attempts: self.resume_max_attempts(&scope, &snapshot).await,
            available_at: None,
        });

        let stored = self.store.commit_workflow_mutation(mutation).await?;

        info!(
            workflow_id = %input.workflow_id,
            signal_id = %signal_id,
            signal_type = %input.signal_type.as_str(),
            "signal acknowledged and workflow resumed"
        );

        Ok(ResumeOutcome {
            snapshot: stored,
            signal_id,
        })
    }

    /// Ingests one provider thread reply, deduplicated by
    /// `(provider, provider_team_id, event_id)`.
    pub async fn ingest_thread_reply(
        &self,
        input: IngestThreadReplyInput,
    ) -> AppResult<IngestOutcome> {
        let occurred_at = input.occurred_at.unwrap_or_else(Utc::now);
        let first_seen = self
            .store
            .record_inbound_message_receipt(InboundMessageReceipt {
                provider: input.provider.clone(),
                provider_team_id: input.provider_team_id.clone(),
                event_id: input.event_id.clone(),
                received_at: occurred_at,
            })
            .await?;

        if !first_seen {
            warn!(
                provider = %input.provider,
                event_id = %input.event_id,
                "inbound signal dropped: duplicate provider event"
            );
            return Ok(IngestOutcome::Duplicate);
        }

        let thread = self
            .store
            .get_workflow_message_thread_by_provider_thread(
                input.provider.as_str(),
                input.provider_team_id.as_str(),
                input.provider_thread_id.as_str(),
            )
            .await?
            .ok_or_else(|| {
                AppError::SignalValidation("workflow message thread not found".to_owned())
            })?;

        let scope = thread.scope();
        let snapshot = self
            .store
            .get_workflow_runtime_snapshot(&scope, thread.workflow_id.as_str())
            .await?
            .ok_or_else(|| AppError::Validation("workflow not found".to_owned()))?;

        if !self.latest_run_is_waiting(&scope, snapshot.run_id.as_str()).await? {
            warn!(
                workflow_id = %thread.workflow_id,
                event_id = %input.event_id,
                "inbound signal dropped: workflow run is not waiting"
            );
            return Ok(IngestOutcome::NotWaiting);
        }

        let outcome = self
            .resume_with_signal(ResumeWithSignalInput {
                scope,
                workflow_id: thread.workflow_id.clone(),
                signal_type: SignalType::UserInput,
                payload: json!({"message": input.message}),
                occurred_at: Some(occurred_at),
                correlation_id: Some(input.event_id),
            })
            .await?;

        Ok(IngestOutcome::QueuedSignal {
            signal_id: outcome.signal_id,
        })
    }

    async fn latest_run_is_waiting(&self, scope: &ActorScope, run_id: &str) -> AppResult<bool> {
        let events = self.store.list_run_events(scope, run_id).await?;
        Ok(events
            .iter()
            .rev()
            .find(|event| event.event_type == RunEventType::State)
            .is_some_and(|event| event.is_waiting_for_signal_state()))
    }

    async fn resolve_approval(
        &self,
        mutation: &mut WorkflowMutation,
        snapshot: &WorkflowRuntimeSnapshot,
        pending: PendingApproval,
        input: &ResumeWithSignalInput,
        signal_id: &str,
        occurred_at: DateTime<Utc>,
    ) -> AppResult<()> {
        if pending.status != ApprovalStatus::Pending {
            return Err(AppError::Conflict(format!(
                "approval '{}' was already resolved",
                pending.approval_id
            )));
        }

        let approved = input.payload["approved"].as_bool().unwrap_or(false);
        let approver_id = input.payload["approverId"]
            .as_str()
            .unwrap_or_default()
            .to_owned();
        let resolved_status = if approved {
            ApprovalStatus::Approved
        } else {
            ApprovalStatus::Rejected
        };

        mutation.snapshot.pending_approval = Some(PendingApproval {
            status: resolved_status,
            ..pending.clone()
        });

        let requested = self
            .store
            .list_approval_decisions(&input.scope, input.workflow_id.as_str())
            .await?
            .into_iter()
            .find(|record| record.approval_id == pending.approval_id);

        let (step_number, requested_at) = requested
            .map(|record| (record.step_number, record.requested_at))
            .unwrap_or_else(|| (snapshot.step_count().saturating_sub(1), occurred_at));

        mutation.approval_decisions.push(ApprovalDecisionRecord {
            tenant_id: input.scope.tenant_id(),
            workspace_id: input.scope.workspace_id(),
            approval_id: pending.approval_id.clone(),
            workflow_id: input.workflow_id.clone(),
            step_number,
            status: resolved_status,
            risk_class: pending.risk_class.clone(),
            reason_code: pending.reason_code.clone(),
            intent: pending.intent.clone(),
            approver_id: Some(approver_id.clone()),
            resolved_at: Some(occurred_at),
            signal_id: Some(signal_id.to_owned()),
            requested_at,
        });

        let event_type = if approved {
            AuditEventType::ApprovalApproved
        } else {
            AuditEventType::ApprovalRejected
        };
        mutation.audit_records.push(AuditRecord {
            tenant_id: input.scope.tenant_id(),
            workspace_id: input.scope.workspace_id(),
            audit_id: next_ordered_id(),
            workflow_id: input.workflow_id.clone(),
            request_id: snapshot.request_id.clone(),
            step_number: Some(step_number),
            event_type,
            signal_correlation_id: Some(signal_id.to_owned()),
            detail: format!(
                "approval '{}' {} by '{approver_id}'",
                pending.approval_id,
                if approved { "approved" } else { "rejected" }
            ),
            occurred_at,
        });

        Ok(())
    }

    async fn resume_max_attempts(
        &self,
        scope: &ActorScope,
        snapshot: &WorkflowRuntimeSnapshot,
    ) -> u32 {
        let jobs = self
            .store
            .list_workflow_jobs(
                scope,
                JobListQuery {
                    status: None,
                    workflow_id: Some(snapshot.workflow_id.clone()),
                },
            )
            .await
            .unwrap_or_default();

        jobs.last()
            .map(|job| job.max_attempts)
            .unwrap_or(FALLBACK_RESUME_MAX_ATTEMPTS)
    }
}
