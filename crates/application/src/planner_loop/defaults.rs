use async_trait::async_trait;
use runloom_core::{ActorScope, AppResult};
use runloom_domain::{ApprovalRequirement, PolicyDecision, PolicyOutcome, PolicyPack};
use serde_json::{Value, json};

use crate::runtime_ports::{
    ApprovalClassifier, MemoryProvider, PolicyEngine, PolicyRequest,
};

/// Default policy engine: allows every intent under the tenant default pack.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPolicyEngine;

#[async_trait]
impl PolicyEngine for DefaultPolicyEngine {
    async fn evaluate(
        &self,
        _request: &PolicyRequest,
        _policy_pack: &PolicyPack,
    ) -> AppResult<PolicyDecision> {
        Ok(PolicyDecision {
            policy_id: "POL-DEFAULT-ALLOW".to_owned(),
            outcome: PolicyOutcome::Allow,
            reason_code: "default_allow".to_owned(),
            rewritten_intent: None,
        })
    }
}

/// Default approval classifier: every tool call is low risk, no approval.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultApprovalClassifier;

#[async_trait]
impl ApprovalClassifier for DefaultApprovalClassifier {
    async fn classify(&self, _request: &PolicyRequest) -> AppResult<ApprovalRequirement> {
        Ok(ApprovalRequirement {
            risk_class: "low".to_owned(),
            requires_approval: false,
            reason_code: "default_low_risk".to_owned(),
        })
    }
}

/// Default memory provider: an empty context object.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultMemoryProvider;

#[async_trait]
impl MemoryProvider for DefaultMemoryProvider {
    async fn load_memory_context(
        &self,
        _scope: &ActorScope,
        _workflow_id: &str,
    ) -> AppResult<Value> {
        Ok(json!({}))
    }
}
