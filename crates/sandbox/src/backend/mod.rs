//! Isolation backends.
//!
//! A backend is the thing that actually runs submitted code. Two real
//! variants exist and they give very different guarantees:
//!
//! - [`BubblewrapBackend`] (strict): Linux namespaces via `bwrap`, with
//!   memory, process and CPU limits applied through the kernel.
//! - [`HostBackend`] (fallback): runs the interpreter directly on the host.
//!   Only the wall-clock timeout is enforced.
//!
//! The active variant is always reported as a [`BackendKind`] on results and
//! audit events. The fallback is never picked silently.

mod bubblewrap;
pub mod dispatch;
mod host;
mod mock;
mod process;

pub use bubblewrap::BubblewrapBackend;
pub use host::HostBackend;
pub use mock::MockBackend;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use sandbox_mcp_core::config::{BackendPreference, ExecutorConfig};
use sandbox_mcp_core::{Error, Result};

use crate::definition::{NetworkPolicy, SandboxDefinition};

/// Which class of isolation ran an execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// Kernel-enforced isolation.
    Strict,
    /// Direct host execution, degraded trust.
    Fallback,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Strict => "strict",
            BackendKind::Fallback => "fallback",
        }
    }

    /// Phrase used in generated tool descriptions.
    pub fn isolation_label(&self) -> &'static str {
        match self {
            BackendKind::Strict => "namespace isolation",
            BackendKind::Fallback => "best-effort host execution",
        }
    }

    /// Whether CPU, memory, process, network and filesystem limits hold.
    pub fn enforces_limits(&self) -> bool {
        matches!(self, BackendKind::Strict)
    }
}

impl std::fmt::Display for BackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resource and security budget handed to a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExecutionLimits {
    pub cpu_cores: u32,
    pub memory_mb: u64,
    pub max_processes: u32,
    pub network: NetworkPolicy,
    pub read_only: bool,
}

impl ExecutionLimits {
    pub fn from_definition(definition: &SandboxDefinition) -> Self {
        Self {
            cpu_cores: definition.resources.cpu,
            memory_mb: definition.resources.memory_mb,
            max_processes: definition.resources.max_processes,
            network: definition.security.network,
            read_only: definition.is_read_only(),
        }
    }

    pub fn memory_bytes(&self) -> u64 {
        self.memory_mb.saturating_mul(1024 * 1024)
    }
}

/// Backend-specific execution descriptor produced by [`IsolationBackend::stage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StagedExecution {
    /// Host directory holding the staged files.
    pub workdir: PathBuf,
    /// Command as the sandboxed program sees it.
    pub command: Vec<String>,
    /// Full argv spawned on the host (wrapper included).
    pub argv: Vec<String>,
    pub limits: ExecutionLimits,
}

/// What happened when a staged command ran.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Interleaved stdout and stderr.
    pub output: String,
    /// Exit status; `128 + signal` when killed by a signal.
    pub exit_code: Option<i32>,
    pub timed_out: bool,
    /// Set when the program could not be started at all.
    pub launch_error: Option<String>,
}

impl ProcessOutcome {
    pub fn exited(code: i32, output: impl Into<String>) -> Self {
        Self {
            output: output.into(),
            exit_code: Some(code),
            ..Default::default()
        }
    }

    pub fn timed_out(partial_output: impl Into<String>) -> Self {
        Self {
            output: partial_output.into(),
            timed_out: true,
            ..Default::default()
        }
    }

    pub fn launch_failed(reason: impl Into<String>) -> Self {
        Self {
            launch_error: Some(reason.into()),
            ..Default::default()
        }
    }
}

/// Strategy that enforces (or approximates) sandbox limits.
///
/// `stage` and `run` only return `Err` for infrastructure faults. A program
/// that fails, times out, or cannot be launched is a [`ProcessOutcome`].
/// [`Error::BackendUnavailable`] from `run` takes the backend out of service.
#[async_trait]
pub trait IsolationBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Backend name for logging and diagnostics.
    fn name(&self) -> &str;

    /// Whether the backend can run anything on this host.
    async fn is_available(&self) -> bool;

    /// Build the execution descriptor for `command` inside `workdir`.
    async fn stage(
        &self,
        workdir: &Path,
        command: &[String],
        limits: &ExecutionLimits,
    ) -> Result<StagedExecution>;

    /// Run a staged command, killing its process tree after `timeout`.
    async fn run(&self, staged: &StagedExecution, timeout: Duration) -> Result<ProcessOutcome>;
}

/// Pick the backend described by `config`.
///
/// The host fallback is only returned when it is requested explicitly
/// (`backend = fallback`) or `allow_fallback` is set. Choosing it is always
/// logged as a warning.
pub async fn select_backend(config: &ExecutorConfig) -> Result<Arc<dyn IsolationBackend>> {
    let strict = BubblewrapBackend::new(config.bwrap_path.clone());

    match config.backend {
        BackendPreference::Strict => {
            if strict.is_available().await {
                tracing::info!(bwrap = %config.bwrap_path.display(), "Using strict namespace isolation");
                Ok(Arc::new(strict))
            } else {
                Err(Error::backend_unavailable(format!(
                    "strict isolation requested but '{}' is not usable on this host",
                    config.bwrap_path.display()
                )))
            }
        }
        BackendPreference::Fallback => Ok(fallback("fallback backend requested")),
        BackendPreference::Auto => {
            if strict.is_available().await {
                tracing::info!(bwrap = %config.bwrap_path.display(), "Using strict namespace isolation");
                Ok(Arc::new(strict))
            } else {
                fallback_if_allowed(config, "strict isolation unavailable")
            }
        }
    }
}

fn fallback_if_allowed(config: &ExecutorConfig, reason: &str) -> Result<Arc<dyn IsolationBackend>> {
    if !config.allow_fallback {
        return Err(Error::backend_unavailable(format!(
            "{} and host fallback is disabled (set executor.allow_fallback to opt in)",
            reason
        )));
    }
    Ok(fallback(reason))
}

fn fallback(reason: &str) -> Arc<dyn IsolationBackend> {
    tracing::warn!(
        reason = %reason,
        "Falling back to best-effort host execution: resource, network and filesystem limits are NOT enforced"
    );
    Arc::new(HostBackend::new())
}
