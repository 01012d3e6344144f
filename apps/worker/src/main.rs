//! Runloom workflow worker runtime.

#![forbid(unsafe_code)]

use std::env;
use std::sync::Arc;
use std::time::Duration;

use runloom_application::{
    DEFAULT_EXECUTE_TIMEOUT_MS, PlannerLoopEngine, PlannerLoopJobExecutor, QueueRunner,
    QueueRunnerConfig, ToolRegistry, WorkflowStore, schedule_workflow_registration,
};
use runloom_core::{AppError, AppResult, TenantId, WorkspaceId};
use runloom_infrastructure::{
    CompletionOnlyPlanner, InMemoryWorkflowStore, TracingSignalNotifier,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Clone)]
struct WorkerConfig {
    worker_id: String,
    batch_size: usize,
    lease_ms: u64,
    poll_ms: u64,
    execute_timeout_ms: u64,
    run_once: bool,
    tenant_id: Option<TenantId>,
    workspace_id: Option<WorkspaceId>,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    dotenvy::dotenv().ok();
    init_tracing();

    let config = WorkerConfig::load()?;
    let store: Arc<dyn WorkflowStore> = Arc::new(InMemoryWorkflowStore::new());

    let mut registry = ToolRegistry::new();
    registry.register_tool(schedule_workflow_registration(store.clone()))?;

    let engine = Arc::new(
        PlannerLoopEngine::new(store.clone(), Arc::new(CompletionOnlyPlanner::new()))
            .with_tool_registry(Arc::new(registry)),
    );

    let mut runner_config = QueueRunnerConfig::new(config.worker_id.clone());
    runner_config.batch_size = config.batch_size;
    runner_config.lease_ms = config.lease_ms;
    runner_config.execute_timeout_ms = config.execute_timeout_ms;
    runner_config.tenant_id = config.tenant_id;
    runner_config.workspace_id = config.workspace_id;

    let runner = QueueRunner::new(
        store,
        Arc::new(PlannerLoopJobExecutor::new(engine)),
        runner_config,
    )
    .with_notifier(Arc::new(TracingSignalNotifier::new()));

    info!(
        worker_id = %config.worker_id,
        batch_size = config.batch_size,
        lease_ms = config.lease_ms,
        poll_ms = config.poll_ms,
        execute_timeout_ms = config.execute_timeout_ms,
        run_once = config.run_once,
        tenant_id = config.tenant_id.map(|value| value.to_string()),
        workspace_id = config.workspace_id.map(|value| value.to_string()),
        "runloom-worker started"
    );

    loop {
        match runner.run_once().await {
            Ok(outcome) => {
                if outcome.claimed > 0 {
                    info!(
                        worker_id = %config.worker_id,
                        claimed = outcome.claimed,
                        completed = outcome.completed,
                        failed = outcome.failed,
                        "worker batch finished"
                    );
                }

                if config.run_once {
                    info!(worker_id = %config.worker_id, "run-once batch finished; exiting");
                    return Ok(());
                }

                if outcome.claimed == 0 {
                    tokio::time::sleep(Duration::from_millis(config.poll_ms)).await;
                }
            }
            Err(error) => {
                if config.run_once {
                    return Err(error);
                }

                warn!(
                    worker_id = %config.worker_id,
                    error = %error,
                    "worker batch failed"
                );
                tokio::time::sleep(Duration::from_millis(config.poll_ms)).await;
            }
        }
    }
}

impl WorkerConfig {
    fn load() -> AppResult<Self> {
        let worker_id = env::var("WORKER_ID")
            .ok()
            .map(|value| value.trim().to_owned())
            .filter(|value| !value.is_empty())
            .unwrap_or_else(|| format!("worker-{}", std::process::id()));
        let batch_size = parse_env_usize("WORKER_BATCH_SIZE", 10)?;
        let lease_ms = parse_env_u64("WORKER_LEASE_MS", 30_000)?;
        let poll_ms = parse_env_u64("WORKER_POLL_MS", 1_000)?;
        let execute_timeout_ms =
            parse_env_u64("WORKER_EXECUTE_TIMEOUT_MS", DEFAULT_EXECUTE_TIMEOUT_MS)?;
        let run_once = flag_env("WORKER_RUN_ONCE");
        let tenant_id = parse_optional_env_uuid("WORKER_TENANT_ID")?.map(TenantId::from_uuid);
        let workspace_id =
            parse_optional_env_uuid("WORKER_WORKSPACE_ID")?.map(WorkspaceId::from_uuid);

        if batch_size == 0 {
            return Err(AppError::Validation(
                "WORKER_BATCH_SIZE must be greater than zero".to_owned(),
            ));
        }

        if lease_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_LEASE_MS must be greater than zero".to_owned(),
            ));
        }

        if poll_ms == 0 {
            return Err(AppError::Validation(
                "WORKER_POLL_MS must be greater than zero".to_owned(),
            ));
        }

        if tenant_id.is_some() != workspace_id.is_some() {
            return Err(AppError::Validation(
                "WORKER_TENANT_ID and WORKER_WORKSPACE_ID must be provided together".to_owned(),
            ));
        }

        Ok(Self {
            worker_id,
            batch_size,
            lease_ms,
            poll_ms,
            execute_timeout_ms,
            run_once,
            tenant_id,
            workspace_id,
        })
    }
}

fn init_tracing() {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .compact()
        .init();
}

fn flag_env(name: &str) -> bool {
    env::var(name)
        .map(|value| {
            let value = value.trim();
            !value.is_empty() && !value.eq_ignore_ascii_case("false") && value != "0"
        })
        .unwrap_or(false)
}

fn parse_env_usize(name: &str, default: usize) -> AppResult<usize> {
    match env::var(name) {
        Ok(value) => value.parse::<usize>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_env_u64(name: &str, default: u64) -> AppResult<u64> {
    match env::var(name) {
        Ok(value) => value.parse::<u64>().map_err(|error| {
            AppError::Validation(format!("invalid {name} value '{value}': {error}"))
        }),
        Err(_) => Ok(default),
    }
}

fn parse_optional_env_uuid(name: &str) -> AppResult<Option<uuid::Uuid>> {
    match env::var(name) {
        Ok(value) => {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Ok(None);
            }

            uuid::Uuid::parse_str(trimmed).map(Some).map_err(|error| {
                AppError::Validation(format!("invalid {name} value '{value}': {error}"))
            })
        }
        Err(_) => Ok(None),
    }
}
