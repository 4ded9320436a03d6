//! Sandbox execution engine.
//!
//! [`SandboxExecutor`] runs one request against one definition:
//!
//! 1. validate the request against the definition (nothing is written on failure),
//! 2. create a fresh workspace and stage the files,
//! 3. hand the command to the isolation backend under the wall-clock limit,
//! 4. map the outcome to an [`ExecutionResult`] and remove the workspace.
//!
//! Per-invocation failures come back as `Ok(result)` with `failed` set.
//! `Err` is reserved for infrastructure faults, the loss of the isolation
//! backend above all.

use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Instant;

use sandbox_mcp_core::config::ExecutorConfig;
use sandbox_mcp_core::fs_policy;
use sandbox_mcp_core::{
    Error, EventEmitter, EventEnvelope, EventSeverity, EventType, Result, ToolExecPayload,
};

use crate::backend::{
    dispatch, BackendKind, ExecutionLimits, IsolationBackend, ProcessOutcome, StagedExecution,
};
use crate::definition::SandboxDefinition;
use crate::request::ExecutionRequest;
use crate::result::{ExecutionResult, FailureReason};
use crate::workspace::Workspace;

/// Runs sandboxed executions on a single isolation backend.
pub struct SandboxExecutor {
    backend: Arc<dyn IsolationBackend>,
    workspace_root: PathBuf,
    available: AtomicBool,
    event_emitter: Option<Arc<dyn EventEmitter>>,
}

impl SandboxExecutor {
    pub fn new(backend: Arc<dyn IsolationBackend>, workspace_root: impl Into<PathBuf>) -> Self {
        Self {
            backend,
            workspace_root: workspace_root.into(),
            available: AtomicBool::new(true),
            event_emitter: None,
        }
    }

    /// Bind `backend` after checking it can actually run anything.
    pub async fn initialize(
        backend: Arc<dyn IsolationBackend>,
        config: &ExecutorConfig,
    ) -> Result<Self> {
        if !backend.is_available().await {
            return Err(Error::backend_unavailable(format!(
                "{} backend is not usable on this host",
                backend.name()
            )));
        }

        let workspace_root = config.workspace_root();
        tracing::info!(
            backend = %backend.kind(),
            name = backend.name(),
            workspace_root = %workspace_root.display(),
            "Sandbox executor initialized"
        );
        Ok(Self::new(backend, workspace_root))
    }

    pub fn with_event_emitter(mut self, emitter: Arc<dyn EventEmitter>) -> Self {
        self.event_emitter = Some(emitter);
        self
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.backend.kind()
    }

    /// False once the backend has failed; every later call is refused.
    pub fn is_accepting(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Execute `request` in a fresh sandbox built from `definition`.
    pub async fn execute(
        &self,
        definition: &SandboxDefinition,
        request: &ExecutionRequest,
    ) -> Result<ExecutionResult> {
        self.ensure_accepting()?;

        let started = Instant::now();
        let kind = self.backend.kind();

        if let Err(reason) = validate_request(definition, request) {
            let result = ExecutionResult::failure(reason, "", kind);
            return Ok(self.finish(definition, result, started).await);
        }

        let outcome = match self.run_in_workspace(definition, request).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_backend_unavailable() => {
                self.take_out_of_service(&e).await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        let result = map_outcome(definition, outcome, kind);
        Ok(self.finish(definition, result, started).await)
    }

    /// Report a request that could not be decoded from its tool arguments.
    ///
    /// Logged and audited like a validation failure from [`Self::execute`].
    pub async fn reject(
        &self,
        definition: &SandboxDefinition,
        reason: FailureReason,
    ) -> Result<ExecutionResult> {
        self.ensure_accepting()?;
        let result = ExecutionResult::failure(reason, "", self.backend.kind());
        Ok(self.finish(definition, result, Instant::now()).await)
    }

    fn ensure_accepting(&self) -> Result<()> {
        if self.is_accepting() {
            return Ok(());
        }
        Err(Error::backend_unavailable(format!(
            "{} backend has been taken out of service",
            self.backend.name()
        )))
    }

    async fn run_in_workspace(
        &self,
        definition: &SandboxDefinition,
        request: &ExecutionRequest,
    ) -> Result<ProcessOutcome> {
        let deadline = Instant::now() + definition.timeout();
        let workspace =
            Workspace::create(&self.workspace_root, &definition.mount.tmp_dir_prefix).await?;

        let staged = tokio::time::timeout_at(deadline, self.stage(&workspace, definition, request)).await;
        let outcome = match staged {
            Err(_) => ProcessOutcome::timed_out(""),
            Ok(staged) => match staged? {
                None => ProcessOutcome::launch_failed("No executable files found in the workspace."),
                Some(staged) => {
                    let remaining = deadline.saturating_duration_since(Instant::now());
                    self.backend.run(&staged, remaining).await?
                }
            },
        };

        let path = workspace.path().to_path_buf();
        if let Err(e) = workspace.close() {
            tracing::warn!(path = %path.display(), error = %e, "Failed to remove workspace");
        }
        Ok(outcome)
    }

    async fn stage(
        &self,
        workspace: &Workspace,
        definition: &SandboxDefinition,
        request: &ExecutionRequest,
    ) -> Result<Option<StagedExecution>> {
        let mode = definition.mount.script_mode()?;
        workspace
            .write_file(&definition.entrypoint, &request.entrypoint_content, mode)
            .await?;
        for (name, content) in &request.files {
            workspace.write_file(name, content, mode).await?;
        }

        let command =
            dispatch::resolve_command(workspace.path(), &definition.entrypoint, &definition.command)
                .await?;
        let Some(command) = command else {
            return Ok(None);
        };

        let limits = ExecutionLimits::from_definition(definition);
        let staged = self.backend.stage(workspace.path(), &command, &limits).await?;
        Ok(Some(staged))
    }

    async fn finish(
        &self,
        definition: &SandboxDefinition,
        result: ExecutionResult,
        started: Instant,
    ) -> ExecutionResult {
        let result = result.with_duration_ms(started.elapsed().as_millis() as u64);

        tracing::info!(
            tool = %definition.id,
            backend = %result.backend,
            exit_code = ?result.exit_code,
            timed_out = result.timed_out,
            duration_ms = result.duration_ms,
            failure = ?result.failure_kind(),
            "Sandbox execution finished"
        );

        if let Some(emitter) = &self.event_emitter {
            let payload = ToolExecPayload {
                tool_name: definition.id.clone(),
                backend: result.backend.to_string(),
                exit_code: result.exit_code,
                timed_out: result.timed_out,
                duration_ms: result.duration_ms,
                error: result.failure.as_ref().map(|f| f.to_string()),
            };
            let severity = if result.failed {
                EventSeverity::Warning
            } else {
                EventSeverity::Info
            };
            match serde_json::to_value(&payload) {
                Ok(payload) => {
                    emitter
                        .emit(
                            EventEnvelope::new(EventType::ToolExecFinished, payload)
                                .with_actor(&definition.id)
                                .with_severity(severity),
                        )
                        .await
                }
                Err(e) => tracing::warn!(error = %e, "Failed to encode execution event"),
            }
        }

        result
    }

    async fn take_out_of_service(&self, error: &Error) {
        self.available.store(false, Ordering::SeqCst);
        tracing::error!(
            backend = %self.backend.kind(),
            name = self.backend.name(),
            error = %error,
            "Isolation backend failed; refusing further executions"
        );

        if let Some(emitter) = &self.event_emitter {
            let payload = serde_json::json!({
                "backend": self.backend.kind().as_str(),
                "name": self.backend.name(),
                "error": error.to_string(),
            });
            emitter
                .emit(
                    EventEnvelope::new(EventType::BackendUnavailable, payload)
                        .with_severity(EventSeverity::Error),
                )
                .await;
        }
    }
}

/// Check a request against its definition before anything touches the disk.
fn validate_request(
    definition: &SandboxDefinition,
    request: &ExecutionRequest,
) -> std::result::Result<(), FailureReason> {
    let required = |name: &str| FailureReason::validation(format!("`{}` file is required", name));

    if request.entrypoint_content.is_empty() {
        return Err(required(&definition.entrypoint));
    }

    let declared: HashSet<&str> = definition
        .parameters
        .files
        .iter()
        .map(|file| file.name.as_str())
        .collect();
    for file in &definition.parameters.files {
        match request.files.get(&file.name) {
            Some(content) if !content.is_empty() => {}
            _ => return Err(required(&file.name)),
        }
    }

    let conflict = |name: &str| {
        FailureReason::validation(format!(
            "File `{}` conflicts with another file in the request.",
            name
        ))
    };

    let mut seen = HashSet::new();
    let mut staged = Vec::with_capacity(request.files.len() + 1);
    if let Ok(entrypoint) = fs_policy::normalize_relative(&definition.entrypoint) {
        seen.insert(entrypoint.clone());
        staged.push((entrypoint, definition.entrypoint.as_str()));
    }
    for name in request.files.keys() {
        if !declared.contains(name.as_str()) && !definition.parameters.additional_files {
            return Err(FailureReason::validation(format!(
                "File `{}` is not accepted by this sandbox.",
                name
            )));
        }
        let normalized = fs_policy::normalize_relative(name).map_err(|e| {
            FailureReason::validation(format!("Invalid file name `{}`: {}", name, e))
        })?;
        if !seen.insert(normalized.clone()) {
            return Err(conflict(name));
        }
        staged.push((normalized, name.as_str()));
    }

    // A file cannot also be a directory holding another staged file.
    for (path, name) in &staged {
        if path.ancestors().skip(1).any(|dir| seen.contains(dir)) {
            return Err(conflict(*name));
        }
    }

    Ok(())
}

fn map_outcome(
    definition: &SandboxDefinition,
    outcome: ProcessOutcome,
    kind: BackendKind,
) -> ExecutionResult {
    if outcome.timed_out {
        return ExecutionResult::failure(
            FailureReason::timeout(format!(
                "Execution timed out after {} seconds.",
                definition.timeout_seconds
            )),
            outcome.output,
            kind,
        );
    }
    if let Some(reason) = outcome.launch_error {
        return ExecutionResult::failure(FailureReason::runtime(reason), outcome.output, kind);
    }
    match outcome.exit_code {
        Some(0) => ExecutionResult::succeeded(outcome.output, 0, kind),
        Some(code) => ExecutionResult::failure(
            FailureReason::runtime(format!("Execution failed with exit code {}.", code)),
            outcome.output,
            kind,
        )
        .with_exit_code(Some(code)),
        None => ExecutionResult::failure(
            FailureReason::runtime("Execution ended without an exit status."),
            outcome.output,
            kind,
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::definition::DeclaredFile;
    use crate::result::FailureKind;
    use sandbox_mcp_core::MemoryEventEmitter;
    use std::time::Duration;

    fn python() -> SandboxDefinition {
        SandboxDefinition::new("python", "main.py", Vec::<String>::new())
            .with_file(DeclaredFile::new("data.csv", "rows"))
            .with_timeout(5)
    }

    fn executor(mock: Arc<MockBackend>, root: &std::path::Path) -> SandboxExecutor {
        SandboxExecutor::new(mock, root)
    }

    fn entries(root: &std::path::Path) -> usize {
        std::fs::read_dir(root).map(|d| d.count()).unwrap_or(0)
    }

    #[tokio::test]
    async fn test_execute_success_stages_files() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default());
        let executor = executor(mock.clone(), root.path());

        let request = ExecutionRequest::new("print('hi')").with_file("data.csv", "a,b");
        let result = executor.execute(&python(), &request).await.unwrap();

        assert!(!result.failed);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.backend, BackendKind::Strict);
        assert_eq!(mock.stage_calls(), 1);

        let staged = &mock.staged().await[0];
        assert_eq!(staged.command, vec!["python3", "main.py"]);
        let files = &mock.snapshots().await[0];
        assert_eq!(files.get("main.py").map(String::as_str), Some("print('hi')"));
        assert_eq!(files.get("data.csv").map(String::as_str), Some("a,b"));

        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_validation_failures_never_stage() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default());
        let executor = executor(mock.clone(), root.path());

        let cases = [
            (ExecutionRequest::new("").with_file("data.csv", "a"), "`main.py` file is required"),
            (ExecutionRequest::new("print(1)"), "`data.csv` file is required"),
            (
                ExecutionRequest::new("print(1)").with_file("data.csv", ""),
                "`data.csv` file is required",
            ),
            (
                ExecutionRequest::new("print(1)")
                    .with_file("data.csv", "a")
                    .with_file("extra.py", "x"),
                "not accepted",
            ),
        ];
        for (request, expected) in cases {
            let result = executor.execute(&python(), &request).await.unwrap();
            assert!(result.failed);
            let failure = result.failure.unwrap();
            assert_eq!(failure.kind, FailureKind::ValidationError);
            assert!(failure.message.contains(expected), "{}", failure.message);
        }

        assert_eq!(mock.stage_calls(), 0);
        assert_eq!(mock.run_calls(), 0);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_uploads_are_confined_to_workspace() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default());
        let executor = executor(mock.clone(), root.path());
        let def = python().with_additional_files(true);

        let escaping = ExecutionRequest::new("print(1)")
            .with_file("data.csv", "a")
            .with_file("../evil.py", "x");
        let result = executor.execute(&def, &escaping).await.unwrap();
        assert_eq!(result.failure_kind(), Some(FailureKind::ValidationError));

        let shadowing = ExecutionRequest::new("print(1)")
            .with_file("data.csv", "a")
            .with_file("./main.py", "x");
        let result = executor.execute(&def, &shadowing).await.unwrap();
        assert_eq!(result.failure_kind(), Some(FailureKind::ValidationError));

        assert_eq!(mock.stage_calls(), 0);

        let nested = ExecutionRequest::new("print(1)")
            .with_file("data.csv", "a")
            .with_file("lib/util.py", "X = 1");
        let result = executor.execute(&def, &nested).await.unwrap();
        assert!(!result.failed);
        let files = &mock.snapshots().await[0];
        assert!(files.contains_key("lib/util.py"));
    }

    #[tokio::test]
    async fn test_file_used_as_directory_is_validation_error() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default());
        let executor = executor(mock.clone(), root.path());
        let def = python().with_additional_files(true);

        let nested = ExecutionRequest::new("print(1)")
            .with_file("data.csv", "a")
            .with_file("lib", "x")
            .with_file("lib/util.py", "y");
        let result = executor.execute(&def, &nested).await.unwrap();
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::ValidationError);
        assert!(failure.message.contains("`lib/util.py` conflicts"), "{}", failure.message);

        let under_entrypoint = ExecutionRequest::new("print(1)")
            .with_file("data.csv", "a")
            .with_file("main.py/helper.py", "x");
        let result = executor.execute(&def, &under_entrypoint).await.unwrap();
        assert_eq!(result.failure_kind(), Some(FailureKind::ValidationError));

        assert_eq!(mock.stage_calls(), 0);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_runtime_error() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::new(vec![ProcessOutcome::exited(
            1,
            "Traceback: ZeroDivisionError\n",
        )]));
        let executor = executor(mock, root.path());

        let request = ExecutionRequest::new("1/0").with_file("data.csv", "a");
        let result = executor.execute(&python(), &request).await.unwrap();

        assert!(result.failed);
        assert_eq!(result.exit_code, Some(1));
        assert_eq!(result.output, "Traceback: ZeroDivisionError\n");
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::RuntimeError);
        assert_eq!(failure.message, "Execution failed with exit code 1.");
    }

    #[tokio::test]
    async fn test_timeout_reports_limit() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default().with_delay(Duration::from_secs(60)));
        let executor = executor(mock, root.path());

        let def = python().with_timeout(1);
        let request = ExecutionRequest::new("while True: pass").with_file("data.csv", "a");
        let result = executor.execute(&def, &request).await.unwrap();

        assert!(result.timed_out);
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::TimeoutError);
        assert_eq!(failure.message, "Execution timed out after 1 seconds.");
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_nothing_runnable_is_runtime_error() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default());
        let executor = executor(mock.clone(), root.path());

        let def = SandboxDefinition::new("notes", "notes.txt", Vec::<String>::new());
        let result = executor
            .execute(&def, &ExecutionRequest::new("just text"))
            .await
            .unwrap();
        let failure = result.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::RuntimeError);
        assert!(failure.message.contains("No executable files found"));
        assert_eq!(mock.run_calls(), 0);
    }

    #[tokio::test]
    async fn test_backend_failure_takes_executor_down() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default());
        mock.fail_runs();
        let events = Arc::new(MemoryEventEmitter::new());
        let executor = executor(mock.clone(), root.path()).with_event_emitter(events.clone());

        let request = ExecutionRequest::new("print(1)").with_file("data.csv", "a");
        let err = executor.execute(&python(), &request).await.unwrap_err();
        assert!(err.is_backend_unavailable());
        assert!(!executor.is_accepting());

        let err = executor.execute(&python(), &request).await.unwrap_err();
        assert!(err.is_backend_unavailable());
        assert_eq!(mock.run_calls(), 1);

        let recorded = events.events();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type, EventType::BackendUnavailable);
        assert_eq!(entries(root.path()), 0);
    }

    #[tokio::test]
    async fn test_events_carry_backend_kind() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default().with_kind(BackendKind::Fallback));
        let events = Arc::new(MemoryEventEmitter::new());
        let executor = executor(mock, root.path()).with_event_emitter(events.clone());

        let request = ExecutionRequest::new("print(1)").with_file("data.csv", "a");
        let result = executor.execute(&python(), &request).await.unwrap();
        assert_eq!(result.backend, BackendKind::Fallback);

        let recorded = events.events();
        assert_eq!(recorded.len(), 1);
        assert_eq!(recorded[0].event_type, EventType::ToolExecFinished);
        assert_eq!(recorded[0].actor, "python");
        assert_eq!(recorded[0].payload["backend"], "fallback");
        assert_eq!(recorded[0].payload["exit_code"], 0);
    }

    #[tokio::test]
    async fn test_concurrent_executions_are_isolated() {
        let root = tempfile::tempdir().unwrap();
        let mock = Arc::new(MockBackend::default());
        let executor = Arc::new(executor(mock.clone(), root.path()));

        let def = python();
        let a = ExecutionRequest::new("print('a')").with_file("data.csv", "a");
        let b = ExecutionRequest::new("print('b')").with_file("data.csv", "b");
        let (ra, rb) = tokio::join!(executor.execute(&def, &a), executor.execute(&def, &b));
        assert!(!ra.unwrap().failed);
        assert!(!rb.unwrap().failed);

        let staged = mock.staged().await;
        assert_eq!(staged.len(), 2);
        assert_ne!(staged[0].workdir, staged[1].workdir);

        let mut contents: Vec<String> = mock
            .snapshots()
            .await
            .iter()
            .map(|files| files["main.py"].clone())
            .collect();
        contents.sort();
        assert_eq!(contents, vec!["print('a')", "print('b')"]);
    }

    #[tokio::test]
    async fn test_initialize_requires_available_backend() {
        let mock = Arc::new(MockBackend::default());
        mock.set_available(false);
        let config = ExecutorConfig::default();
        let err = SandboxExecutor::initialize(mock, &config).await.err().unwrap();
        assert!(err.is_backend_unavailable());

        let executor = SandboxExecutor::initialize(Arc::new(MockBackend::default()), &config)
            .await
            .unwrap();
        assert!(executor.is_accepting());
        assert_eq!(executor.backend_kind(), BackendKind::Strict);
    }
}
