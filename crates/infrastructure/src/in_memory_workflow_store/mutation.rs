use chrono::Utc;
use runloom_application::{WorkflowCheckpointAction, WorkflowMutation};
use runloom_core::{ActorScope, AppError, AppResult};
use runloom_domain::{
    SignalStatus, WaitingCheckpoint, WorkflowRuntimeSnapshot, WorkflowSignalRecord,
    WorkflowStatus,
};

use super::{StoreState, StoredSignal, queue};

pub(super) fn insert_signal(
    state: &mut StoreState,
    signal: WorkflowSignalRecord,
) -> AppResult<()> {
    let duplicate = state.signals.iter().any(|stored| {
        stored.record.tenant_id == signal.tenant_id
            && stored.record.workspace_id == signal.workspace_id
            && stored.record.signal_id == signal.signal_id
    });

    if duplicate {
        return Err(AppError::Conflict(format!(
            "signal '{}' already exists",
            signal.signal_id
        )));
    }

    state.signals.push(StoredSignal {
        record: signal,
        consumed: false,
    });
    Ok(())
}

pub(super) fn consume_signal(
    state: &mut StoreState,
    scope: &ActorScope,
    signal_id: &str,
) -> AppResult<()> {
    let stored = state
        .signals
        .iter_mut()
        .find(|stored| {
            stored.record.tenant_id == scope.tenant_id()
                && stored.record.workspace_id == scope.workspace_id()
                && stored.record.signal_id == signal_id
        })
        .ok_or_else(|| AppError::NotFound(format!("signal '{signal_id}' not found")))?;

    stored.consumed = true;
    Ok(())
}

/// Applies one workflow step mutation atomically.
///
/// The caller already holds the store lock, so every check and write below
/// observes and produces a consistent state, which is exactly the
/// transactional contract of the persistence port.
pub(super) fn apply_workflow_mutation(
    state: &mut StoreState,
    mutation: WorkflowMutation,
) -> AppResult<WorkflowRuntimeSnapshot> {
    let scope = mutation.scope;
    let key = (scope, mutation.workflow_id.clone());

    let mut snapshot = mutation.snapshot;
    if snapshot.tenant_id != scope.tenant_id()
        || snapshot.workspace_id != scope.workspace_id()
        || snapshot.workflow_id != mutation.workflow_id
    {
        return Err(AppError::Validation(
            "workflow mutation scope does not match its snapshot".to_owned(),
        ));
    }
    snapshot.ensure_consistent()?;

    match state.snapshots.get(&key) {
        None => {
            if mutation.expected_version != 0 {
                return Err(AppError::Conflict(format!(
                    "workflow conflict: '{}' does not exist at version {}",
                    mutation.workflow_id, mutation.expected_version
                )));
            }
        }
        Some(existing) => {
            if existing.version != mutation.expected_version {
                return Err(AppError::Conflict(format!(
                    "workflow conflict: '{}' is at version {} but the mutation read {}",
                    mutation.workflow_id, existing.version, mutation.expected_version
                )));
            }

            existing.status.ensure_transition_to(snapshot.status)?;

            if snapshot.steps.len() < existing.steps.len() {
                return Err(AppError::Validation(format!(
                    "workflow '{}' steps are append-only",
                    mutation.workflow_id
                )));
            }

            for (stored, incoming) in existing.steps.iter().zip(snapshot.steps.iter()) {
                if stored != incoming {
                    return Err(AppError::Validation(format!(
                        "workflow '{}' step {} may not be rewritten",
                        mutation.workflow_id, stored.step_number
                    )));
                }
            }
        }
    }

    match mutation.checkpoint {
        WorkflowCheckpointAction::None => {}
        WorkflowCheckpointAction::Install => {
            if snapshot.status != WorkflowStatus::WaitingSignal {
                return Err(AppError::Validation(format!(
                    "waiting checkpoint installed on non-waiting workflow '{}'",
                    mutation.workflow_id
                )));
            }

            if state.checkpoints.contains_key(&key) {
                return Err(AppError::Conflict(format!(
                    "waiting checkpoint already installed for workflow '{}'",
                    mutation.workflow_id
                )));
            }

            state
                .checkpoints
                .insert(key.clone(), WaitingCheckpoint::new(scope, key.1.clone()));
        }
        WorkflowCheckpointAction::Consume => {
            state.checkpoints.remove(&key).ok_or_else(|| {
                AppError::Conflict(format!(
                    "waiting checkpoint for workflow '{}' was already consumed",
                    mutation.workflow_id
                ))
            })?;
        }
    }

    let has_checkpoint = state.checkpoints.contains_key(&key);
    if (snapshot.status == WorkflowStatus::WaitingSignal) != has_checkpoint {
        return Err(AppError::Internal(format!(
            "waiting checkpoint invariant violated for workflow '{}'",
            mutation.workflow_id
        )));
    }

    if let Some(record) = mutation.record_signal {
        if record.tenant_id != scope.tenant_id() || record.workspace_id != scope.workspace_id() {
            return Err(AppError::Validation(
                "signal record carries a foreign scope".to_owned(),
            ));
        }

        insert_signal(state, record)?;
    }

    if let Some(signal_id) = mutation.acknowledge_signal_id {
        let stored = state
            .signals
            .iter_mut()
            .find(|stored| {
                stored.record.tenant_id == scope.tenant_id()
                    && stored.record.workspace_id == scope.workspace_id()
                    && stored.record.signal_id == signal_id
            })
            .ok_or_else(|| AppError::NotFound(format!("signal '{signal_id}' not found")))?;

        if stored.record.status == SignalStatus::Acknowledged {
            return Err(AppError::Conflict(format!(
                "signal '{signal_id}' was already acknowledged"
            )));
        }

        stored.record.status = SignalStatus::Acknowledged;
        stored.record.acknowledged_at = Some(stored.record.occurred_at);
    }

    for signal_id in &mutation.consume_signal_ids {
        consume_signal(state, &scope, signal_id)?;
    }

    for record in &mutation.policy_decisions {
        if record.tenant_id != scope.tenant_id() || record.workspace_id != scope.workspace_id() {
            return Err(AppError::Validation(
                "policy decision record carries a foreign scope".to_owned(),
            ));
        }
    }
    state.policy_decisions.extend(mutation.policy_decisions);

    for record in mutation.approval_decisions {
        if record.tenant_id != scope.tenant_id() || record.workspace_id != scope.workspace_id() {
            return Err(AppError::Validation(
                "approval decision record carries a foreign scope".to_owned(),
            ));
        }

        match state
            .approval_decisions
            .iter_mut()
            .find(|stored| stored.approval_id == record.approval_id)
        {
            Some(stored) => *stored = record,
            None => state.approval_decisions.push(record),
        }
    }

    for record in &mutation.audit_records {
        if record.tenant_id != scope.tenant_id() || record.workspace_id != scope.workspace_id() {
            return Err(AppError::Validation(
                "audit record carries a foreign scope".to_owned(),
            ));
        }
    }
    state.audit_records.extend(mutation.audit_records);

    if let Some(enqueue) = mutation.enqueue_job {
        queue::insert_job(state, enqueue)?;
    }

    snapshot.version = mutation.expected_version + 1;
    snapshot.updated_at = Utc::now();
    state.snapshots.insert(key, snapshot.clone());

    Ok(snapshot)
}
