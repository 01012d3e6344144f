use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use runloom_core::{ActorScope, AppError, AppResult, payload_hash};
use tokio::sync::Mutex;

use crate::runtime_ports::{
    ActionAdapter, AdapterAction, AdapterCredentials, AdapterResponse,
};

struct IdempotencySlot {
    fingerprint: String,
    result: Option<AdapterResponse>,
}

/// Idempotency decorator for action adapters.
///
/// The composed key is `(tenant, request, step, tool)`; the fingerprint adds
/// a SHA-256 over the canonical payload serialization. A cache hit returns
/// the stored result verbatim without invoking the inner adapter; concurrent
/// calls with the same key serialize on a per-key lock so exactly one
/// execution is in flight. A mismatched fingerprint under an existing key is
/// a hard validation error.
pub struct IdempotentActionAdapter {
    inner: Arc<dyn ActionAdapter>,
    slots: Mutex<HashMap<String, Arc<Mutex<IdempotencySlot>>>>,
}

impl IdempotentActionAdapter {
    /// Wraps an adapter with idempotency caching.
    #[must_use]
    pub fn new(inner: Arc<dyn ActionAdapter>) -> Self {
        Self {
            inner,
            slots: Mutex::new(HashMap::new()),
        }
    }

    fn composed_key(action: &AdapterAction, scope: &ActorScope) -> String {
        format!(
            "{}:{}:{}:{}",
            scope.tenant_id(),
            action.request_id,
            action.step_number,
            action.tool_name
        )
    }

    fn fingerprint(action: &AdapterAction, scope: &ActorScope) -> String {
        format!(
            "{}:{}:{}:{}:{}",
            scope.tenant_id(),
            action.request_id,
            action.step_number,
            action.tool_name,
            payload_hash(&action.payload)
        )
    }
}

#[async_trait]
impl ActionAdapter for IdempotentActionAdapter {
    async fn execute(
        &self,
        action: &AdapterAction,
        scope: &ActorScope,
        credentials: &AdapterCredentials,
    ) -> AppResult<AdapterResponse> {
        let key = Self::composed_key(action, scope);
        let fingerprint = Self::fingerprint(action, scope);

        let slot = {
            let mut slots = self.slots.lock().await;
            slots
                .entry(key.clone())
                .or_insert_with(|| {
                    Arc::new(Mutex::new(IdempotencySlot {
                        fingerprint: fingerprint.clone(),
                        result: None,
                    }))
                })
                .clone()
        };

        // The per-key lock both serializes duplicate in-flight calls and
        // publishes the stored result to late arrivals.
        let mut slot = slot.lock().await;

        if slot.fingerprint != fingerprint {
            return Err(AppError::Validation(format!(
                "idempotency fingerprint mismatch for key '{key}'"
            )));
        }

        if let Some(result) = &slot.result {
            return Ok(result.clone());
        }

        let response = self.inner.execute(action, scope, credentials).await?;
        if response.is_ok() {
            slot.result = Some(response.clone());
        }

        Ok(response)
    }
}
