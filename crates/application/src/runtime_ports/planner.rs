use async_trait::async_trait;
use runloom_core::{ActorScope, AppResult};
use runloom_domain::{PlannerInput, PlannerIntent};
use serde_json::Value;

/// Plan-stage port.
///
/// The planner is a black box to the engine; a production implementation
/// calls an LLM provider adapter, tests script intents directly.
#[async_trait]
pub trait PlannerProvider: Send + Sync {
    /// Produces the next intent for one planning input.
    async fn plan(&self, input: &PlannerInput) -> AppResult<PlannerIntent>;
}

/// Memory context port consulted when building planning inputs.
#[async_trait]
pub trait MemoryProvider: Send + Sync {
    /// Returns the opaque memory context for one workflow.
    async fn load_memory_context(
        &self,
        scope: &ActorScope,
        workflow_id: &str,
    ) -> AppResult<Value>;
}
