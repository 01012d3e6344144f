use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use runloom_core::{ActorScope, AppError, AppResult};
use runloom_domain::ToolMetadata;
use serde_json::Value;

use crate::runtime_ports::{ToolExecutionInput, ToolExecutor};

/// One structural problem reported by a tool argument validator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolArgumentIssue {
    /// JSON path of the offending value.
    pub path: String,
    /// Problem description.
    pub message: String,
}

impl ToolArgumentIssue {
    /// Creates one issue.
    #[must_use]
    pub fn new(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            message: message.into(),
        }
    }
}

/// One tool entry in the registry.
pub struct ToolRegistration {
    /// Unique tool name.
    pub name: String,
    /// Optional human-readable description.
    pub description: Option<String>,
    /// Pure argument validator; a non-empty issue list rejects the call.
    pub validate_args: Box<dyn Fn(&Value) -> Vec<ToolArgumentIssue> + Send + Sync>,
    /// Optional scope authorization predicate; absent means allow.
    pub is_authorized: Option<Box<dyn Fn(&ActorScope) -> bool + Send + Sync>>,
    /// Tool implementation.
    pub executor: Arc<dyn ToolExecutor>,
}

impl ToolRegistration {
    fn authorizes(&self, scope: &ActorScope) -> bool {
        self.is_authorized
            .as_ref()
            .is_none_or(|predicate| predicate(scope))
    }
}

/// Name-keyed tool directory.
///
/// Registration happens at bootstrap on an exclusive reference; afterwards the
/// registry is shared read-only behind an `Arc`, so the tool table cannot
/// change while workers execute.
#[derive(Default)]
pub struct ToolRegistry {
    tools: BTreeMap<String, ToolRegistration>,
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers one tool. Duplicate names fail.
    pub fn register_tool(&mut self, registration: ToolRegistration) -> AppResult<()> {
        if registration.name.trim().is_empty() {
            return Err(AppError::Validation(
                "tool registration requires a non-empty name".to_owned(),
            ));
        }

        if self.tools.contains_key(registration.name.as_str()) {
            return Err(AppError::Validation(format!(
                "tool '{}' is already registered",
                registration.name
            )));
        }

        self.tools
            .insert(registration.name.clone(), registration);
        Ok(())
    }

    /// Lists tools whose authorization predicate accepts the scope.
    #[must_use]
    pub fn list_tools(&self, scope: &ActorScope) -> Vec<ToolMetadata> {
        self.tools
            .values()
            .filter(|registration| registration.authorizes(scope))
            .map(|registration| ToolMetadata {
                name: registration.name.clone(),
                description: registration.description.clone(),
            })
            .collect()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn execute(&self, input: ToolExecutionInput) -> AppResult<Value> {
        let registration = self.tools.get(input.tool_name.as_str()).ok_or_else(|| {
            AppError::Validation(format!("unknown tool '{}'", input.tool_name))
        })?;

        if !registration.authorizes(&input.scope) {
            return Err(AppError::Validation(format!(
                "tool '{}' is not authorized for this scope",
                input.tool_name
            )));
        }

        let issues = (registration.validate_args)(&input.args);
        if !issues.is_empty() {
            let rendered: Vec<String> = issues
                .iter()
                .map(|issue| format!("{}: {}", issue.path, issue.message))
                .collect();
            return Err(AppError::Validation(format!(
                "tool '{}' arguments are invalid: {}",
                input.tool_name,
                rendered.join("; ")
            )));
        }

        registration.executor.execute(input).await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use runloom_core::{ActorScope, AppResult, TenantId, WorkspaceId};
    use serde_json::{Value, json};

    use super::{ToolArgumentIssue, ToolRegistration, ToolRegistry};
    use crate::runtime_ports::{ToolExecutionInput, ToolExecutor};

    struct EchoExecutor;

    #[async_trait]
    impl ToolExecutor for EchoExecutor {
        async fn execute(&self, input: ToolExecutionInput) -> AppResult<Value> {
            Ok(json!({"echo": input.args}))
        }
    }

    fn registration(name: &str) -> ToolRegistration {
        ToolRegistration {
            name: name.to_owned(),
            description: Some("test tool".to_owned()),
            validate_args: Box::new(|args| {
                if args["to"].is_string() {
                    Vec::new()
                } else {
                    vec![ToolArgumentIssue::new("to", "must be a string")]
                }
            }),
            is_authorized: None,
            executor: Arc::new(EchoExecutor),
        }
    }

    fn execution_input(scope: ActorScope, tool_name: &str, args: Value) -> ToolExecutionInput {
        ToolExecutionInput {
            scope,
            request_id: "req-1".to_owned(),
            workflow_id: "wf-1".to_owned(),
            step_number: 0,
            tool_name: tool_name.to_owned(),
            args,
            correlation_id: None,
        }
    }

    #[test]
    fn duplicate_registration_fails() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register_tool(registration("message.send")).is_ok());
        assert!(registry.register_tool(registration("message.send")).is_err());
    }

    #[test]
    fn listing_filters_by_authorization() {
        let allowed_scope = ActorScope::new(TenantId::new(), WorkspaceId::new());
        let gate_scope = allowed_scope;

        let mut registry = ToolRegistry::new();
        let mut gated = registration("calendar.find_slots");
        gated.is_authorized = Some(Box::new(move |scope| scope.matches(&gate_scope)));
        assert!(registry.register_tool(gated).is_ok());
        assert!(registry.register_tool(registration("message.send")).is_ok());

        let visible = registry.list_tools(&allowed_scope);
        assert_eq!(visible.len(), 2);

        let foreign = ActorScope::new(TenantId::new(), WorkspaceId::new());
        let visible = registry.list_tools(&foreign);
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].name, "message.send");
    }

    #[tokio::test]
    async fn unknown_tool_is_a_validation_error() {
        let registry = ToolRegistry::new();
        let scope = ActorScope::new(TenantId::new(), WorkspaceId::new());

        let result = registry
            .execute(execution_input(scope, "missing.tool", json!({})))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn invalid_arguments_are_rejected_before_execution() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register_tool(registration("message.send")).is_ok());
        let scope = ActorScope::new(TenantId::new(), WorkspaceId::new());

        let result = registry
            .execute(execution_input(scope, "message.send", json!({"to": 7})))
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn authorized_valid_call_dispatches() {
        let mut registry = ToolRegistry::new();
        assert!(registry.register_tool(registration("message.send")).is_ok());
        let scope = ActorScope::new(TenantId::new(), WorkspaceId::new());

        let result = registry
            .execute(execution_input(
                scope,
                "message.send",
                json!({"to": "ops@example.test"}),
            ))
            .await;
        assert!(result.is_ok());
        assert_eq!(
            result.unwrap_or_default()["echo"]["to"],
            json!("ops@example.test")
        );
    }
}
