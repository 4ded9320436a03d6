//! Tool registry implementation.

use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;

use sandbox_mcp_core::{
    traits::{Tool, ToolRegistry},
    types::{ToolDefinition, ToolOutput},
    Error, Result,
};

/// Tool registry keyed by tool name, backed by DashMap.
pub struct SandboxToolRegistry {
    tools: DashMap<String, Arc<dyn Tool>>,
}

impl SandboxToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).map(|entry| entry.value().clone())
    }
}

impl Default for SandboxToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ToolRegistry for SandboxToolRegistry {
    async fn register(&self, tool: Box<dyn Tool>) -> Result<()> {
        let name = tool.name().to_string();

        match self.tools.entry(name.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Err(Error::duplicate_tool(name)),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                tracing::info!(tool = %name, "Registering tool");
                slot.insert(Arc::from(tool));
                Ok(())
            }
        }
    }

    /// Definitions sorted by tool name.
    async fn list(&self) -> Result<Vec<ToolDefinition>> {
        let mut definitions: Vec<ToolDefinition> = self
            .tools
            .iter()
            .map(|entry| entry.value().definition())
            .collect();
        definitions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(definitions)
    }

    async fn execute(&self, name: &str, args: serde_json::Value) -> Result<ToolOutput> {
        let tool = self.get(name).ok_or_else(|| Error::tool_not_found(name))?;

        tracing::debug!(tool = %name, "Executing tool");
        tool.execute(args).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::definition::SandboxDefinition;
    use crate::engine::SandboxExecutor;
    use crate::tools::build_tools;
    use serde_json::json;

    async fn registry() -> SandboxToolRegistry {
        let root = std::env::temp_dir().join("sandbox-mcp-registry-tests");
        let executor = Arc::new(SandboxExecutor::new(Arc::new(MockBackend::default()), root));
        let definitions = [
            SandboxDefinition::new("shell", "run.sh", ["bash", "run.sh"]),
            SandboxDefinition::new("python", "main.py", ["python3", "main.py"]),
        ];

        let registry = SandboxToolRegistry::new();
        for tool in build_tools(executor, &definitions).unwrap() {
            registry.register(Box::new(tool)).await.unwrap();
        }
        registry
    }

    #[tokio::test]
    async fn test_list_is_sorted() {
        let registry = registry().await;
        let names: Vec<String> = registry
            .list()
            .await
            .unwrap()
            .into_iter()
            .map(|d| d.name)
            .collect();
        assert_eq!(names, vec!["python", "shell"]);
        assert_eq!(registry.len(), 2);
    }

    #[tokio::test]
    async fn test_execute_dispatches_by_name() {
        let registry = registry().await;

        let output = registry
            .execute("shell", json!({"run_sh": "echo hi"}))
            .await
            .unwrap();
        assert!(output.success);

        let err = registry.execute("ruby", json!({})).await.unwrap_err();
        assert!(matches!(err, Error::ToolNotFound(_)));
    }

    #[tokio::test]
    async fn test_register_rejects_duplicates() {
        let registry = registry().await;
        let root = std::env::temp_dir().join("sandbox-mcp-registry-tests");
        let executor = Arc::new(SandboxExecutor::new(Arc::new(MockBackend::default()), root));
        let again = build_tools(
            executor,
            &[SandboxDefinition::new("shell", "run.sh", ["sh", "run.sh"])],
        )
        .unwrap();

        let tool = again.into_iter().next().unwrap();
        let err = registry.register(Box::new(tool)).await.unwrap_err();
        assert!(matches!(err, Error::DuplicateTool(_)));
        assert_eq!(registry.len(), 2);
    }
}
