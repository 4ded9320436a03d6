//! Sandbox tools implementing the `Tool` trait.
//!
//! One [`SandboxTool`] exists per loaded definition. It decodes tool-call
//! arguments, runs them through the shared [`SandboxExecutor`] and renders
//! the [`ExecutionResult`] as a [`ToolOutput`].

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;

use sandbox_mcp_core::{traits::Tool, types::ToolAnnotations, types::ToolOutput, Result};

use crate::compiler::{ToolCompiler, ToolDescriptor, ToolSet};
use crate::definition::SandboxDefinition;
use crate::engine::SandboxExecutor;
use crate::request::ExecutionRequest;
use crate::result::ExecutionResult;

/// A compiled sandbox definition bound to an executor.
pub struct SandboxTool {
    descriptor: ToolDescriptor,
    schema: Value,
    definition: Arc<SandboxDefinition>,
    executor: Arc<SandboxExecutor>,
}

impl SandboxTool {
    pub fn new(
        descriptor: ToolDescriptor,
        definition: Arc<SandboxDefinition>,
        executor: Arc<SandboxExecutor>,
    ) -> Self {
        let schema = descriptor.input_schema();
        Self {
            descriptor,
            schema,
            definition,
            executor,
        }
    }

    pub fn descriptor(&self) -> &ToolDescriptor {
        &self.descriptor
    }

    /// Decode `args` and execute them, returning the raw result.
    pub async fn run(&self, args: &Value) -> Result<ExecutionResult> {
        match ExecutionRequest::from_arguments(&self.descriptor, args) {
            Ok(request) => self.executor.execute(&self.definition, &request).await,
            Err(reason) => {
                tracing::info!(tool = %self.descriptor.name, failure = %reason, "Rejected tool arguments");
                self.executor.reject(&self.definition, reason).await
            }
        }
    }
}

#[async_trait]
impl Tool for SandboxTool {
    fn name(&self) -> &str {
        &self.descriptor.name
    }

    fn description(&self) -> &str {
        &self.descriptor.description
    }

    fn parameters(&self) -> Value {
        self.schema.clone()
    }

    fn title(&self) -> Option<&str> {
        Some(&self.descriptor.title)
    }

    fn annotations(&self) -> ToolAnnotations {
        self.descriptor.annotations
    }

    async fn execute(&self, args: Value) -> Result<ToolOutput> {
        let result = self.run(&args).await?;
        Ok(render(&result))
    }
}

/// Render an execution result the way clients see it.
pub fn render(result: &ExecutionResult) -> ToolOutput {
    let data = json!({
        "exit_code": result.exit_code,
        "timed_out": result.timed_out,
        "backend": result.backend,
        "duration_ms": result.duration_ms,
        "failure_kind": result.failure_kind(),
    });

    match &result.failure {
        None if result.output.is_empty() => {
            ToolOutput::text("Execution completed with no output.").with_data(data)
        }
        None => ToolOutput::text(result.output.clone()).with_data(data),
        Some(failure) if result.output.is_empty() => {
            ToolOutput::error(failure.message.clone()).with_data(data)
        }
        Some(failure) => {
            ToolOutput::error(format!("{}\n{}", failure.message, result.output)).with_data(data)
        }
    }
}

/// Compile every definition against `executor`'s backend and bind the tools.
///
/// Fails on the first invalid definition or duplicate id; nothing is
/// returned in that case.
pub fn build_tools(
    executor: Arc<SandboxExecutor>,
    definitions: &[SandboxDefinition],
) -> Result<Vec<SandboxTool>> {
    let mut set = ToolSet::new(ToolCompiler::new(executor.backend_kind()));
    let mut tools = Vec::with_capacity(definitions.len());

    for definition in definitions {
        let descriptor = set.compile(definition)?.clone();
        tools.push(SandboxTool::new(
            descriptor,
            Arc::new(definition.clone()),
            executor.clone(),
        ));
    }

    Ok(tools)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BackendKind, MockBackend, ProcessOutcome};
    use crate::result::{FailureKind, FailureReason};
    use sandbox_mcp_core::{Error, EventType, MemoryEventEmitter};

    fn executor(mock: MockBackend) -> Arc<SandboxExecutor> {
        let root = std::env::temp_dir().join("sandbox-mcp-tool-tests");
        Arc::new(SandboxExecutor::new(Arc::new(mock), root))
    }

    fn python() -> SandboxDefinition {
        SandboxDefinition::new("python", "main.py", ["python3", "main.py"])
            .with_name("Python")
            .with_description("Run Python code")
    }

    #[test]
    fn test_build_tools_rejects_duplicates() {
        let executor = executor(MockBackend::default());
        let err = build_tools(executor.clone(), &[python(), python()])
            .err()
            .unwrap();
        assert!(matches!(err, Error::DuplicateTool(name) if name == "python"));

        let shell = SandboxDefinition::new("shell", "run.sh", ["bash", "run.sh"]);
        let tools = build_tools(executor, &[python(), shell]).unwrap();
        let names: Vec<&str> = tools.iter().map(|t| t.name()).collect();
        assert_eq!(names, vec!["python", "shell"]);
    }

    #[test]
    fn test_definition_exposes_schema_and_hints() {
        let tools = build_tools(executor(MockBackend::default()), &[python()]).unwrap();
        let definition = tools[0].definition();

        assert_eq!(definition.title.as_deref(), Some("Python"));
        assert_eq!(definition.parameters["required"], json!(["main_py"]));
        assert!(!definition.annotations.open_world_hint);

        let json = serde_json::to_value(&definition).unwrap();
        assert_eq!(json["inputSchema"]["type"], "object");
        assert_eq!(json["annotations"]["readOnlyHint"], false);
    }

    #[test]
    fn test_fallback_executor_discloses_posture() {
        let mock = MockBackend::default().with_kind(BackendKind::Fallback);
        let tools = build_tools(executor(mock), &[python()]).unwrap();
        assert!(tools[0].description().contains("advisory and not enforced"));
    }

    #[tokio::test]
    async fn test_execute_renders_results() {
        let mock = MockBackend::new(vec![
            ProcessOutcome::exited(0, "hello\n"),
            ProcessOutcome::exited(2, "bad input\n"),
            ProcessOutcome::exited(0, ""),
        ]);
        let tools = build_tools(executor(mock), &[python()]).unwrap();
        let tool = &tools[0];

        let ok = tool.execute(json!({"main_py": "print('hello')"})).await.unwrap();
        assert!(ok.success);
        assert_eq!(ok.content, "hello\n");

        let failed = tool.execute(json!({"main_py": "raise SystemExit(2)"})).await.unwrap();
        assert!(!failed.success);
        assert_eq!(failed.content, "Execution failed with exit code 2.\nbad input\n");
        let data = failed.data.unwrap();
        assert_eq!(data["exit_code"], 2);
        assert_eq!(data["failure_kind"], "runtime_error");
        assert_eq!(data["backend"], "strict");

        let quiet = tool.execute(json!({"main_py": "pass"})).await.unwrap();
        assert_eq!(quiet.content, "Execution completed with no output.");
    }

    #[tokio::test]
    async fn test_invalid_arguments_are_tool_errors() {
        let tools = build_tools(executor(MockBackend::default()), &[python()]).unwrap();

        let missing = tools[0].execute(json!({})).await.unwrap();
        assert!(!missing.success);
        assert_eq!(missing.content, "`main.py` file is required");

        let malformed = tools[0].execute(json!("print(1)")).await.unwrap();
        assert!(!malformed.success);
        assert_eq!(malformed.data.unwrap()["failure_kind"], "validation_error");
    }

    #[tokio::test]
    async fn test_rejected_arguments_go_through_executor() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default());
        let events = Arc::new(MemoryEventEmitter::new());
        let executor = Arc::new(
            SandboxExecutor::new(mock.clone(), root.path()).with_event_emitter(events.clone()),
        );
        let tools = build_tools(executor, &[python()]).unwrap();

        let output = tools[0].execute(json!({"main_py": 42})).await.unwrap();
        assert!(!output.success);

        let recorded = events.events();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type, EventType::ToolExecFinished);
        assert_eq!(recorded[0].actor, "python");
        assert_eq!(mock.stage_calls(), 0);

        // Once the backend is gone, bad arguments are refused like any call.
        mock.fail_runs();
        let err = tools[0]
            .execute(json!({"main_py": "print(1)"}))
            .await
            .unwrap_err();
        assert!(err.is_backend_unavailable());
        let err = tools[0].execute(json!({})).await.unwrap_err();
        assert!(err.is_backend_unavailable());
    }

    #[test]
    fn test_render_timeout_keeps_partial_output() {
        let result = ExecutionResult::failure(
            FailureReason::timeout("Execution timed out after 2 seconds."),
            "tick\ntick\n",
            BackendKind::Strict,
        );
        let output = render(&result);
        assert!(!output.success);
        assert_eq!(output.content, "Execution timed out after 2 seconds.\ntick\ntick\n");
        assert_eq!(output.data.unwrap()["timed_out"], true);
        assert_eq!(result.failure_kind(), Some(FailureKind::TimeoutError));
    }
}
