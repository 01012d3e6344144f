mod credentials;
mod idempotent;
mod retry;

pub use credentials::resolve_scoped_credentials;
pub use idempotent::IdempotentActionAdapter;
pub use retry::{NullRetryAttemptSink, RetryPolicy, RetryingActionAdapter};
