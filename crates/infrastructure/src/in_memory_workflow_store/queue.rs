use chrono::{Duration, Utc};
use runloom_application::{
    ClaimWorkflowJobsInput, CompleteWorkflowJobInput, EnqueueWorkflowJobInput,
    FailWorkflowJobInput,
};
use runloom_core::{AppError, AppResult};
use runloom_domain::{QueueJobStatus, WorkflowQueueJob};
use uuid::Uuid;

use super::StoreState;

pub(super) fn insert_job(
    state: &mut StoreState,
    input: EnqueueWorkflowJobInput,
) -> AppResult<WorkflowQueueJob> {
    if input.max_attempts == 0 {
        return Err(AppError::Validation(
            "max_attempts must be greater than zero".to_owned(),
        ));
    }

    let now = Utc::now();
    let job = WorkflowQueueJob {
        tenant_id: input.scope.tenant_id(),
        workspace_id: input.scope.workspace_id(),
        job_id: Uuid::new_v4().to_string(),
        run_id: input.run_id,
        agent_id: input.agent_id,
        workflow_id: input.workflow_id,
        request_id: input.request_id,
        thread_id: input.thread_id,
        objective_prompt: input.objective_prompt,
        status: QueueJobStatus::Queued,
        attempt_count: 0,
        max_attempts: input.max_attempts,
        available_at: input.available_at.unwrap_or(now),
        lease_token: None,
        lease_expires_at: None,
        last_error: None,
        created_at: now,
        updated_at: now,
    };

    state.jobs.push(job.clone());
    Ok(job)
}

pub(super) fn claim_jobs(
    state: &mut StoreState,
    input: ClaimWorkflowJobsInput,
) -> AppResult<Vec<WorkflowQueueJob>> {
    if input.worker_id.trim().is_empty() {
        return Err(AppError::Validation(
            "worker_id must not be empty".to_owned(),
        ));
    }

    if input.lease_ms == 0 {
        return Err(AppError::Validation(
            "lease_ms must be greater than zero".to_owned(),
        ));
    }

    match (input.tenant_id, input.workspace_id) {
        (None, None) | (Some(_), Some(_)) => {}
        _ => {
            return Err(AppError::Validation(
                "tenant_id and workspace_id must be provided together".to_owned(),
            ));
        }
    }

    let now = Utc::now();
    let lease_ms = i64::try_from(input.lease_ms)
        .map_err(|_| AppError::Validation("lease_ms is out of range".to_owned()))?;

    let mut due_indexes: Vec<usize> = state
        .jobs
        .iter()
        .enumerate()
        .filter(|(_, job)| {
            let scope_matches = match (input.tenant_id, input.workspace_id) {
                (Some(tenant_id), Some(workspace_id)) => {
                    job.tenant_id == tenant_id && job.workspace_id == workspace_id
                }
                _ => true,
            };

            let claimable = match job.status {
                QueueJobStatus::Queued => job.available_at <= now,
                // Expired leases are reclaimable; the old token stays dead.
                QueueJobStatus::Claimed => {
                    job.lease_expires_at.is_some_and(|expiry| expiry < now)
                }
                QueueJobStatus::Completed | QueueJobStatus::Failed => false,
            };

            scope_matches && claimable
        })
        .map(|(index, _)| index)
        .collect();

    due_indexes.sort_by(|left, right| {
        let left_job = &state.jobs[*left];
        let right_job = &state.jobs[*right];
        left_job
            .created_at
            .cmp(&right_job.created_at)
            .then_with(|| left_job.job_id.cmp(&right_job.job_id))
    });
    due_indexes.truncate(input.limit);

    let mut claimed = Vec::with_capacity(due_indexes.len());
    for index in due_indexes {
        let job = &mut state.jobs[index];
        job.status = QueueJobStatus::Claimed;
        job.lease_token = Some(Uuid::new_v4().to_string());
        job.lease_expires_at = Some(now + Duration::milliseconds(lease_ms));
        job.attempt_count = job.attempt_count.saturating_add(1);
        job.updated_at = now;
        claimed.push(job.clone());
    }

    Ok(claimed)
}

pub(super) fn complete_job(state: &mut StoreState, input: CompleteWorkflowJobInput) {
    let Some(job) = state
        .jobs
        .iter_mut()
        .find(|job| job.scope() == input.scope && job.job_id == input.job_id)
    else {
        return;
    };

    // A stale or foreign lease is a silent no-op; callers detect it by
    // reading the job back.
    if !job.holds_lease(input.lease_token.as_str()) {
        return;
    }

    job.status = QueueJobStatus::Completed;
    job.lease_token = None;
    job.lease_expires_at = None;
    job.updated_at = Utc::now();
}

pub(super) fn fail_job(state: &mut StoreState, input: FailWorkflowJobInput) {
    let Some(job) = state
        .jobs
        .iter_mut()
        .find(|job| job.scope() == input.scope && job.job_id == input.job_id)
    else {
        return;
    };

    if !job.holds_lease(input.lease_token.as_str()) {
        return;
    }

    let now = Utc::now();
    job.lease_token = None;
    job.lease_expires_at = None;
    job.last_error = Some(input.error);
    job.updated_at = now;

    if job.attempt_count < job.max_attempts {
        job.status = QueueJobStatus::Queued;
        job.available_at = input.retry_at;
    } else {
        job.status = QueueJobStatus::Failed;
    }
}
