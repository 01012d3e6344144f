use std::sync::Arc;

use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use runloom_core::{AppError, AppResult};
use runloom_domain::ScheduleOptions;
use serde_json::{Value, json};

use crate::objective_service::{ObjectiveIntakeService, SubmitObjectiveInput};
use crate::runtime_ports::{ToolExecutionInput, ToolExecutor, WorkflowStore};
use crate::tool_registry::{ToolArgumentIssue, ToolRegistration};

/// Name of the built-in workflow scheduling tool.
pub const SCHEDULE_WORKFLOW_TOOL: &str = "planner_schedule_workflow";

/// Planner tool that schedules a future workflow run.
///
/// Accepts exactly one of `runAt`, `delaySeconds`, or `cron`. Cron recurrence
/// is self-perpetuating: the tool schedules only the next occurrence, and the
/// scheduled run is expected to call the tool again for the one after.
pub struct ScheduleWorkflowTool {
    store: Arc<dyn WorkflowStore>,
    intake: ObjectiveIntakeService,
}

impl ScheduleWorkflowTool {
    /// Creates the tool.
    #[must_use]
    pub fn new(store: Arc<dyn WorkflowStore>) -> Self {
        Self {
            intake: ObjectiveIntakeService::new(store.clone()),
            store,
        }
    }
}

#[async_trait]
impl ToolExecutor for ScheduleWorkflowTool {
    async fn execute(&self, input: ToolExecutionInput) -> AppResult<Value> {
        let options: ScheduleOptions =
            serde_json::from_value(input.args.clone()).map_err(|error| {
                AppError::Validation(format!("invalid schedule options: {error}"))
            })?;

        let spec = options.clone().into_spec()?;
        let scheduled_for = spec.next_occurrence(Utc::now())?;

        let calling_workflow = self
            .store
            .get_workflow_runtime_snapshot(&input.scope, input.workflow_id.as_str())
            .await?
            .ok_or_else(|| AppError::Validation("workflow not found".to_owned()))?;

        let objective_prompt = options
            .objective_prompt
            .clone()
            .unwrap_or_else(|| calling_workflow.objective_prompt.clone());

        let mut submission = SubmitObjectiveInput::new(
            input.scope,
            calling_workflow.agent_id.clone(),
            objective_prompt,
        );
        submission.thread_id = options
            .thread_id
            .clone()
            .or_else(|| calling_workflow.thread_id.clone());
        if let Some(max_attempts) = options.max_attempts {
            submission.max_attempts = max_attempts;
        }
        submission.available_at = Some(scheduled_for);

        let submitted = self.intake.submit_objective(submission).await?;

        Ok(json!({
            "scheduledJobId": submitted.job.job_id,
            "scheduledWorkflowId": submitted.request.workflow_id,
            "scheduledRequestId": submitted.request.request_id,
            "scheduledFor": scheduled_for.to_rfc3339_opts(SecondsFormat::Millis, true),
            "recurrence": if spec.is_recurring() { "cron" } else { "once" },
            "cron": options.cron,
        }))
    }
}

/// Builds the registry entry for the scheduling tool.
#[must_use]
pub fn schedule_workflow_registration(store: Arc<dyn WorkflowStore>) -> ToolRegistration {
    ToolRegistration {
        name: SCHEDULE_WORKFLOW_TOOL.to_owned(),
        description: Some(
            "Schedule a future workflow run at a fixed time, after a delay, or on a cron \
             expression."
                .to_owned(),
        ),
        validate_args: Box::new(validate_schedule_args),
        is_authorized: None,
        executor: Arc::new(ScheduleWorkflowTool::new(store)),
    }
}

fn validate_schedule_args(args: &Value) -> Vec<ToolArgumentIssue> {
    let options: ScheduleOptions = match serde_json::from_value(args.clone()) {
        Ok(options) => options,
        Err(error) => {
            return vec![ToolArgumentIssue::new("$", error.to_string())];
        }
    };

    match options.into_spec() {
        Ok(_) => Vec::new(),
        Err(error) => vec![ToolArgumentIssue::new("$", error.to_string())],
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::validate_schedule_args;

    #[test]
    fn schedule_args_require_exactly_one_selector() {
        assert!(!validate_schedule_args(&json!({})).is_empty());
        assert!(
            !validate_schedule_args(&json!({"delaySeconds": 90, "cron": "* * * * *"}))
                .is_empty()
        );
        assert!(validate_schedule_args(&json!({"delaySeconds": 90})).is_empty());
        assert!(validate_schedule_args(&json!({"cron": "*/15 * * * *"})).is_empty());
        assert!(
            validate_schedule_args(&json!({"runAt": "2026-03-01T12:00:00Z"})).is_empty()
        );
    }

    #[test]
    fn unknown_schedule_fields_are_rejected() {
        assert!(!validate_schedule_args(&json!({"delaySeconds": 90, "runInstantly": true})).is_empty());
    }
}
