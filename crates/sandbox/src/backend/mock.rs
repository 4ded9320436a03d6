use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use sandbox_mcp_core::{Error, Result};

use super::{BackendKind, ExecutionLimits, IsolationBackend, ProcessOutcome, StagedExecution};

/// Scripted backend for tests. Nothing is executed.
///
/// Outcomes are returned in order; once exhausted every run exits 0 with
/// a fixed marker. Each `stage` snapshots the workspace so tests can see
/// exactly which files were written.
pub struct MockBackend {
    kind: BackendKind,
    outcomes: Arc<Mutex<Vec<ProcessOutcome>>>,
    available: AtomicBool,
    fail_runs: AtomicBool,
    delay: Option<Duration>,
    stage_calls: AtomicUsize,
    run_calls: AtomicUsize,
    staged: Arc<Mutex<Vec<StagedExecution>>>,
    snapshots: Arc<Mutex<Vec<BTreeMap<String, String>>>>,
}

pub const MOCK_OUTPUT: &str = "[mock] command executed";

impl Default for MockBackend {
    fn default() -> Self {
        Self::new(Vec::new())
    }
}

impl MockBackend {
    /// Create a mock backend with predefined outcomes.
    pub fn new(outcomes: Vec<ProcessOutcome>) -> Self {
        Self {
            kind: BackendKind::Strict,
            outcomes: Arc::new(Mutex::new(outcomes)),
            available: AtomicBool::new(true),
            fail_runs: AtomicBool::new(false),
            delay: None,
            stage_calls: AtomicUsize::new(0),
            run_calls: AtomicUsize::new(0),
            staged: Default::default(),
            snapshots: Default::default(),
        }
    }

    pub fn with_kind(mut self, kind: BackendKind) -> Self {
        self.kind = kind;
        self
    }

    /// Make every run take `delay`, timing out if it exceeds the budget.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Make `run` fail as if the isolation layer had crashed.
    pub fn fail_runs(&self) {
        self.fail_runs.store(true, Ordering::SeqCst);
    }

    pub fn stage_calls(&self) -> usize {
        self.stage_calls.load(Ordering::SeqCst)
    }

    pub fn run_calls(&self) -> usize {
        self.run_calls.load(Ordering::SeqCst)
    }

    pub async fn staged(&self) -> Vec<StagedExecution> {
        self.staged.lock().await.clone()
    }

    /// Files present in the workspace at each `stage`, keyed by relative path.
    pub async fn snapshots(&self) -> Vec<BTreeMap<String, String>> {
        self.snapshots.lock().await.clone()
    }
}

#[async_trait]
impl IsolationBackend for MockBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    fn name(&self) -> &str {
        "mock"
    }

    async fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    async fn stage(
        &self,
        workdir: &Path,
        command: &[String],
        limits: &ExecutionLimits,
    ) -> Result<StagedExecution> {
        self.stage_calls.fetch_add(1, Ordering::SeqCst);

        let snapshot = snapshot(workdir).await?;
        self.snapshots.lock().await.push(snapshot);

        let staged = StagedExecution {
            workdir: workdir.to_path_buf(),
            command: command.to_vec(),
            argv: command.to_vec(),
            limits: limits.clone(),
        };
        self.staged.lock().await.push(staged.clone());
        Ok(staged)
    }

    async fn run(&self, _staged: &StagedExecution, timeout: Duration) -> Result<ProcessOutcome> {
        self.run_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_runs.load(Ordering::SeqCst) {
            return Err(Error::backend_unavailable("mock isolation layer crashed"));
        }

        if let Some(delay) = self.delay {
            if delay >= timeout {
                tokio::time::sleep(timeout).await;
                return Ok(ProcessOutcome::timed_out(""));
            }
            tokio::time::sleep(delay).await;
        }

        let mut outcomes = self.outcomes.lock().await;
        if outcomes.is_empty() {
            Ok(ProcessOutcome::exited(0, MOCK_OUTPUT))
        } else {
            Ok(outcomes.remove(0))
        }
    }
}

async fn snapshot(root: &Path) -> Result<BTreeMap<String, String>> {
    let mut files = BTreeMap::new();
    let mut pending: Vec<PathBuf> = vec![root.to_path_buf()];

    while let Some(dir) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if entry.file_type().await?.is_dir() {
                pending.push(path);
                continue;
            }
            let relative = path
                .strip_prefix(root)
                .map_err(|e| Error::internal(e.to_string()))?
                .to_string_lossy()
                .into_owned();
            let content = tokio::fs::read(&path).await?;
            files.insert(relative, String::from_utf8_lossy(&content).into_owned());
        }
    }

    Ok(files)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::definition::NetworkPolicy;

    fn limits() -> ExecutionLimits {
        ExecutionLimits {
            cpu_cores: 1,
            memory_mb: 64,
            max_processes: 8,
            network: NetworkPolicy::None,
            read_only: false,
        }
    }

    #[tokio::test]
    async fn test_mock_scripted_outcomes() {
        let mock = MockBackend::new(vec![ProcessOutcome::exited(2, "boom")]);
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("lib")).unwrap();
        std::fs::write(dir.path().join("main.py"), "print(1)").unwrap();
        std::fs::write(dir.path().join("lib/util.py"), "X = 1").unwrap();

        let staged = mock
            .stage(dir.path(), &["python3".to_string()], &limits())
            .await
            .unwrap();
        let first = mock.run(&staged, Duration::from_secs(1)).await.unwrap();
        let second = mock.run(&staged, Duration::from_secs(1)).await.unwrap();

        assert_eq!(first, ProcessOutcome::exited(2, "boom"));
        assert_eq!(second.output, MOCK_OUTPUT);
        assert_eq!(mock.stage_calls(), 1);
        assert_eq!(mock.run_calls(), 2);

        let snapshot = &mock.snapshots().await[0];
        assert_eq!(snapshot.get("main.py").map(String::as_str), Some("print(1)"));
        assert_eq!(snapshot.get("lib/util.py").map(String::as_str), Some("X = 1"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_mock_delay_times_out() {
        let mock = MockBackend::default().with_delay(Duration::from_secs(30));
        let dir = tempfile::tempdir().unwrap();
        let staged = mock.stage(dir.path(), &[], &limits()).await.unwrap();
        let outcome = mock.run(&staged, Duration::from_secs(2)).await.unwrap();
        assert!(outcome.timed_out);
    }

    #[tokio::test]
    async fn test_mock_failure_modes() {
        let mock = MockBackend::default().with_kind(BackendKind::Fallback);
        assert_eq!(mock.kind(), BackendKind::Fallback);
        mock.set_available(false);
        assert!(!mock.is_available().await);

        mock.fail_runs();
        let dir = tempfile::tempdir().unwrap();
        let staged = mock.stage(dir.path(), &[], &limits()).await.unwrap();
        let err = mock.run(&staged, Duration::from_secs(1)).await.unwrap_err();
        assert!(err.is_backend_unavailable());
    }
}
