use crate::errors::AgentError;

/// Runs blocking git or filesystem work off the async executor.
pub async fn run_blocking<T, F>(operation: &'static str, work: F) -> Result<T, AgentError>
where
    F: FnOnce() -> Result<T, AgentError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|e| AgentError::TaskFailed {
            operation: operation.to_string(),
            message: e.to_string(),
        })?
}
