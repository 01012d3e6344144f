use chrono::{DateTime, Utc};
use runloom_core::{AppError, AppResult, TenantId, WorkspaceId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// External event type that can move a workflow out of `waiting_signal`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    /// Free-form user answer to a waiting question.
    UserInput,
    /// Human decision on a pending approval gate.
    Approval,
    /// Provider callback.
    ExternalEvent,
    /// Timer expiry.
    Timer,
}

impl SignalType {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::UserInput => "user_input",
            Self::Approval => "approval",
            Self::ExternalEvent => "external_event",
            Self::Timer => "timer",
        }
    }

    /// Parses storage value.
    pub fn parse(value: &str) -> AppResult<Self> {
        match value {
            "user_input" => Ok(Self::UserInput),
            "approval" => Ok(Self::Approval),
            "external_event" => Ok(Self::ExternalEvent),
            "timer" => Ok(Self::Timer),
            _ => Err(AppError::SignalValidation(format!(
                "unknown signal type '{value}'"
            ))),
        }
    }
}

/// Validates the payload shape required by each signal type.
pub fn validate_signal_payload(signal_type: SignalType, payload: &Value) -> AppResult<()> {
    match signal_type {
        SignalType::UserInput => {
            if !payload["message"].is_string() {
                return Err(AppError::SignalValidation(
                    "user_input signal requires a string 'message' field".to_owned(),
                ));
            }

            Ok(())
        }
        SignalType::Approval => {
            if !payload["approved"].is_boolean() {
                return Err(AppError::SignalValidation(
                    "approval signal requires a boolean 'approved' field".to_owned(),
                ));
            }

            if !payload["approverId"].is_string() {
                return Err(AppError::SignalValidation(
                    "approval signal requires a string 'approverId' field".to_owned(),
                ));
            }

            Ok(())
        }
        SignalType::ExternalEvent => {
            if !payload["eventType"].is_string() {
                return Err(AppError::SignalValidation(
                    "external_event signal requires a string 'eventType' field".to_owned(),
                ));
            }

            Ok(())
        }
        SignalType::Timer => {
            let fired_at = payload["firedAt"].as_str().ok_or_else(|| {
                AppError::SignalValidation(
                    "timer signal requires a string 'firedAt' field".to_owned(),
                )
            })?;

            DateTime::parse_from_rfc3339(fired_at).map_err(|error| {
                AppError::SignalValidation(format!(
                    "timer signal 'firedAt' must be an ISO datetime: {error}"
                ))
            })?;

            Ok(())
        }
    }
}

/// Acknowledgement state of one recorded signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalStatus {
    /// Recorded but not yet consumed by a resume transaction.
    Received,
    /// Consumed by the transaction that resumed the workflow.
    Acknowledged,
}

impl SignalStatus {
    /// Returns stable storage value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Received => "received",
            Self::Acknowledged => "acknowledged",
        }
    }
}

/// Persisted inbound signal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSignalRecord {
    /// Tenant scope.
    pub tenant_id: TenantId,
    /// Workspace scope.
    pub workspace_id: WorkspaceId,
    /// Globally unique, time-ordered signal identifier.
    pub signal_id: String,
    /// Target workflow.
    pub workflow_id: String,
    /// Signal type.
    pub signal_type: SignalType,
    /// Signal payload, validated per type.
    pub payload: Value,
    /// Instant the signal occurred at its source.
    pub occurred_at: DateTime<Utc>,
    /// Acknowledgement state.
    pub status: SignalStatus,
    /// Acknowledgement timestamp, set by the resume transaction.
    pub acknowledged_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{SignalType, validate_signal_payload};

    #[test]
    fn user_input_requires_message() {
        assert!(validate_signal_payload(SignalType::UserInput, &json!({})).is_err());
        assert!(validate_signal_payload(SignalType::UserInput, &json!({"message": 3})).is_err());
        assert!(
            validate_signal_payload(SignalType::UserInput, &json!({"message": "Sam"})).is_ok()
        );
    }

    #[test]
    fn approval_requires_decision_and_approver() {
        assert!(
            validate_signal_payload(SignalType::Approval, &json!({"approved": true})).is_err()
        );
        assert!(
            validate_signal_payload(SignalType::Approval, &json!({"approverId": "u-1"})).is_err()
        );
        assert!(
            validate_signal_payload(
                SignalType::Approval,
                &json!({"approved": false, "approverId": "u-1"})
            )
            .is_ok()
        );
    }

    #[test]
    fn external_event_requires_event_type() {
        assert!(validate_signal_payload(SignalType::ExternalEvent, &json!({})).is_err());
        assert!(
            validate_signal_payload(
                SignalType::ExternalEvent,
                &json!({"eventType": "calendar.updated"})
            )
            .is_ok()
        );
    }

    #[test]
    fn timer_requires_iso_fired_at() {
        assert!(
            validate_signal_payload(SignalType::Timer, &json!({"firedAt": "yesterday"})).is_err()
        );
        assert!(
            validate_signal_payload(
                SignalType::Timer,
                &json!({"firedAt": "2026-02-18T10:00:00Z"})
            )
            .is_ok()
        );
    }
}
