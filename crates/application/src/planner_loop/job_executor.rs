use std::sync::Arc;

use async_trait::async_trait;
use runloom_core::AppResult;
use runloom_domain::WorkflowQueueJob;

use super::{PlannerLoopEngine, PlannerLoopRequest};
use crate::queue_runner::{JobExecutionReport, WorkflowJobExecutor};

/// Queue-runner execute callback that drives the planner loop engine.
pub struct PlannerLoopJobExecutor {
    engine: Arc<PlannerLoopEngine>,
}

impl PlannerLoopJobExecutor {
    /// Creates the executor.
    #[must_use]
    pub fn new(engine: Arc<PlannerLoopEngine>) -> Self {
        Self { engine }
    }
}

#[async_trait]
impl WorkflowJobExecutor for PlannerLoopJobExecutor {
    async fn execute(&self, job: &WorkflowQueueJob) -> AppResult<JobExecutionReport> {
        let result = self
            .engine
            .run_planner_loop(PlannerLoopRequest::for_job(job))
            .await?;

        Ok(JobExecutionReport {
            status: result.status,
            waiting_question: result.waiting_question,
            result: result.completion,
        })
    }
}
