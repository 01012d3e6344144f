use chrono::{DateTime, Utc};
use runloom_core::{AppError, AppResult, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};

use crate::planner::PlannerIntent;

/// Policy pack identity resolved per tenant for one step evaluation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyPack {
    /// Policy pack identifier.
    pub policy_pack_id: String,
    /// Policy pack version.
    pub policy_pack_version: String,
}

impl PolicyPack {
    /// Returns the default policy pack for a tenant.
    #[must_use]
    pub fn default_for_tenant(tenant_id: TenantId) -> Self {
        Self {
            policy_pack_id: format!("{tenant_id}-default-policy-pack"),
            policy_pack_version: "v1".to_owned(),
        }
    }
}

/// Verdict returned by the policy engine for one intent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PolicyOutcome {
    /// Intent proceeds unchanged.
    Allow,
    /// Intent proceeds in rewritten form.
    Rewrite,
    /// Intent is rejected and the workflow fails.
    Block,
}

impl PolicyOutcome {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Rewrite => "rewrite",
            Self::Block => "block",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "allow" => Ok(Self::Allow),
            "rewrite" => Ok(Self::Rewrite),
            "block" => Ok(Self::Block),
            _ => Err(AppError::Validation(format!(
                "unknown policy outcome '{value}'"
            ))),
        }
    }
}

/// Policy engine verdict for one planner intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecision {
    /// Identifier of the matched policy.
    pub policy_id: String,
    /// Verdict.
    pub outcome: PolicyOutcome,
    /// Stable reason code for audit.
    pub reason_code: String,
    /// Replacement intent, present iff the outcome is `rewrite`.
    pub rewritten_intent: Option<PlannerIntent>,
}

impl PolicyDecision {
    /// Validates the rewrite/rewritten-intent pairing.
    pub fn ensure_consistent(&self) -> AppResult<()> {
        match (self.outcome, self.rewritten_intent.as_ref()) {
            (PolicyOutcome::Rewrite, None) => Err(AppError::Validation(format!(
                "policy '{}' returned rewrite without a rewritten intent",
                self.policy_id
            ))),
            (PolicyOutcome::Allow | PolicyOutcome::Block, Some(_)) => {
                Err(AppError::Validation(format!(
                    "policy '{}' returned a rewritten intent for a non-rewrite outcome",
                    self.policy_id
                )))
            }
            _ => Ok(()),
        }
    }
}

/// Persisted policy decision for one workflow step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PolicyDecisionRecord {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Decision identifier.
    pub decision_id: String,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Step the decision applies to.
    pub step_number: u32,
    /// Policy pack resolved for the evaluation.
    pub policy_pack: PolicyPack,
    /// Verdict.
    pub outcome: PolicyOutcome,
    /// Reason code.
    pub reason_code: String,
    /// Intent as produced by the planner.
    pub original_intent: PlannerIntent,
    /// Replacement intent when the outcome is `rewrite`.
    pub rewritten_intent: Option<PlannerIntent>,
    /// Decision timestamp.
    pub decided_at: DateTime<Utc>,
}

/// Approval requirement returned by the approval classifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApprovalRequirement {
    /// Risk class label.
    pub risk_class: String,
    /// Whether the intent must wait for a human decision.
    pub requires_approval: bool,
    /// Stable reason code for audit.
    pub reason_code: String,
}

/// Lifecycle status of one approval decision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApprovalStatus {
    /// Awaiting a human decision.
    Pending,
    /// Approved; the stored intent may execute once.
    Approved,
    /// Rejected; the workflow fails.
    Rejected,
}

impl ApprovalStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "pending" => Ok(Self::Pending),
            "approved" => Ok(Self::Approved),
            "rejected" => Ok(Self::Rejected),
            _ => Err(AppError::Validation(format!(
                "unknown approval status '{value}'"
            ))),
        }
    }
}

/// Persisted approval decision for one gated intent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApprovalDecisionRecord {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Approval identifier.
    pub approval_id: String,
    /// Workflow identifier.
    pub workflow_id: String,
    /// Step the gated intent was planned at.
    pub step_number: u32,
    /// Gate status.
    pub status: ApprovalStatus,
    /// Risk class assigned by the classifier.
    pub risk_class: String,
    /// Classifier reason code.
    pub reason_code: String,
    /// Gated intent.
    pub intent: PlannerIntent,
    /// Approver subject once resolved.
    pub approver_id: Option<String>,
    /// Resolution timestamp once resolved.
    pub resolved_at: Option<DateTime<Utc>>,
    /// Signal that resolved the gate.
    pub signal_id: Option<String>,
    /// Gate creation timestamp.
    pub requested_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{PolicyDecision, PolicyOutcome, PolicyPack};
    use crate::planner::PlannerIntent;
    use runloom_core::TenantId;

    #[test]
    fn rewrite_requires_rewritten_intent() {
        let decision = PolicyDecision {
            policy_id: "POL-REWRITE-001".to_owned(),
            outcome: PolicyOutcome::Rewrite,
            reason_code: "redacted_recipient".to_owned(),
            rewritten_intent: None,
        };

        assert!(decision.ensure_consistent().is_err());
    }

    #[test]
    fn allow_rejects_stray_rewritten_intent() {
        let decision = PolicyDecision {
            policy_id: "POL-ALLOW-001".to_owned(),
            outcome: PolicyOutcome::Allow,
            reason_code: "default_allow".to_owned(),
            rewritten_intent: Some(PlannerIntent::Complete {
                output: Some(json!({})),
            }),
        };

        assert!(decision.ensure_consistent().is_err());
    }

    #[test]
    fn default_policy_pack_is_tenant_scoped_v1() {
        let tenant_id = TenantId::new();
        let pack = PolicyPack::default_for_tenant(tenant_id);
        assert_eq!(
            pack.policy_pack_id,
            format!("{tenant_id}-default-policy-pack")
        );
        assert_eq!(pack.policy_pack_version, "v1");
    }
}
