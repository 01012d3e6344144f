//! Infrastructure adapters for application ports.

#![forbid(unsafe_code)]

mod completion_planner;
mod in_memory_workflow_store;
mod tracing_signal_notifier;

pub use completion_planner::CompletionOnlyPlanner;
pub use in_memory_workflow_store::InMemoryWorkflowStore;
pub use tracing_signal_notifier::TracingSignalNotifier;
