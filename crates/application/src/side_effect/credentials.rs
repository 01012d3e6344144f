use runloom_core::{ActorScope, AppError, AppResult};

use crate::runtime_ports::{AdapterCredentials, CredentialsResolver};

/// Resolves credentials and enforces that they belong to the acting scope.
///
/// A resolver returning credentials for a foreign tenant or workspace is a
/// hard validation error, never a silent success.
pub async fn resolve_scoped_credentials(
    resolver: &dyn CredentialsResolver,
    scope: &ActorScope,
    tool_name: &str,
) -> AppResult<AdapterCredentials> {
    let credentials = resolver.resolve(scope, tool_name).await?;

    if credentials.tenant_id != scope.tenant_id()
        || credentials.workspace_id != scope.workspace_id()
    {
        return Err(AppError::Validation(format!(
            "credentials resolved for tool '{tool_name}' belong to a different scope"
        )));
    }

    Ok(credentials)
}
