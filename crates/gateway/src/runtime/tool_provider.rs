//! `ToolProvider`: the external collaborator that resolves a `WorkerConfig`'s
//! configured tool names to callable handles (spec §1, "Tool registry").
//! The core only depends on this interface; a concrete registry (search,
//! code execution, ...) is out of scope for the Run Execution Engine.

use async_trait::async_trait;

use hae_domain::error::{Error, Result};
use hae_domain::tool::ToolDefinition;

#[async_trait]
pub trait ToolProvider: Send + Sync {
    /// Resolve configured tool names to their LLM-facing definitions. Names
    /// that don't resolve are silently omitted; the Worker still runs with
    /// whatever subset resolved.
    fn definitions(&self, names: &[String]) -> Vec<ToolDefinition>;

    /// Invoke a resolved tool by name with the LLM-supplied arguments.
    async fn invoke(&self, name: &str, arguments: serde_json::Value) -> Result<String>;
}

/// Default provider for deployments with no external tool registry wired
/// up: exposes no tool definitions, fails any invocation.
#[derive(Default)]
pub struct NullToolProvider;

#[async_trait]
impl ToolProvider for NullToolProvider {
    fn definitions(&self, _names: &[String]) -> Vec<ToolDefinition> {
        Vec::new()
    }

    async fn invoke(&self, name: &str, _arguments: serde_json::Value) -> Result<String> {
        Err(Error::Other(format!("no tool registry configured: {name}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_provider_resolves_nothing() {
        let provider = NullToolProvider;
        assert!(provider.definitions(&["search".into()]).is_empty());
    }

    #[tokio::test]
    async fn null_provider_invoke_fails() {
        let provider = NullToolProvider;
        let result = provider.invoke("search", serde_json::json!({})).await;
        assert!(result.is_err());
    }
}
