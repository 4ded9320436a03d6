use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;

use sandbox_mcp_core::{Error, Result};

use super::process;
use super::{BackendKind, ExecutionLimits, IsolationBackend, ProcessOutcome, StagedExecution};

/// Fallback backend: runs the interpreter directly on the host.
///
/// The workspace directory, a scrubbed environment, process-group cleanup
/// and the wall-clock timeout are the only protections. CPU, memory,
/// process, network and filesystem limits are not applied.
#[derive(Debug, Default)]
pub struct HostBackend;

impl HostBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl IsolationBackend for HostBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Fallback
    }

    fn name(&self) -> &str {
        "host"
    }

    async fn is_available(&self) -> bool {
        true
    }

    async fn stage(
        &self,
        workdir: &Path,
        command: &[String],
        limits: &ExecutionLimits,
    ) -> Result<StagedExecution> {
        Ok(StagedExecution {
            workdir: workdir.to_path_buf(),
            command: command.to_vec(),
            argv: command.to_vec(),
            limits: limits.clone(),
        })
    }

    async fn run(&self, staged: &StagedExecution, timeout: Duration) -> Result<ProcessOutcome> {
        let mut cmd = process::base_command(&staged.argv, &staged.workdir)
            .ok_or_else(|| Error::internal("staged execution has an empty argv"))?;

        // A missing interpreter is the program's problem, not the backend's.
        let child = match cmd.spawn() {
            Ok(child) => child,
            Err(e) => {
                let program = staged.argv.first().map(String::as_str).unwrap_or_default();
                return Ok(ProcessOutcome::launch_failed(format!(
                    "Failed to start '{}': {}",
                    program, e
                )));
            }
        };

        tracing::debug!(pid = ?child.id(), command = ?staged.command, "Host process started");
        Ok(process::supervise(child, timeout).await?)
    }
}
