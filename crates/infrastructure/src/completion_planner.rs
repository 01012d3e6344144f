//! Placeholder planner used when no LLM provider adapter is configured.

use async_trait::async_trait;
use runloom_application::PlannerProvider;
use runloom_core::AppResult;
use runloom_domain::{PlannerInput, PlannerIntent};
use serde_json::json;

/// Planner that completes every workflow immediately, echoing the objective.
///
/// Stands in for the LLM provider adapter in local and smoke-test runtimes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CompletionOnlyPlanner;

impl CompletionOnlyPlanner {
    /// Creates the planner.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl PlannerProvider for CompletionOnlyPlanner {
    async fn plan(&self, input: &PlannerInput) -> AppResult<PlannerIntent> {
        Ok(PlannerIntent::Complete {
            output: Some(json!({
                "objective": input.objective_prompt,
                "steps": input.step_index,
            })),
        })
    }
}
