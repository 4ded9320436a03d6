use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

use sandbox_mcp_core::{Error, Result};

use super::process;
use super::{BackendKind, ExecutionLimits, IsolationBackend, ProcessOutcome, StagedExecution};
use crate::definition::NetworkPolicy;

/// Mount point of the workspace inside the sandbox.
pub const SANDBOX_DIR: &str = "/sandbox";

const SYSTEM_DIRS: &[&str] = &[
    "/bin",
    "/sbin",
    "/lib",
    "/lib32",
    "/lib64",
    "/etc/alternatives",
    "/etc/ssl",
];

const NETWORK_FILES: &[&str] = &["/etc/resolv.conf", "/etc/hosts"];

const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Strict backend built on bubblewrap.
///
/// Every run gets fresh user, pid, ipc, uts, cgroup and network namespaces
/// (network is shared back only when the definition asks for it). Memory
/// and process counts are capped with rlimits and CPU cores with an
/// affinity mask before `bwrap` is exec'd; both are inherited by the
/// sandboxed program.
pub struct BubblewrapBackend {
    program: PathBuf,
}

impl BubblewrapBackend {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    /// Full host argv that runs `command` inside a fresh sandbox rooted at `workdir`.
    pub fn wrap(&self, workdir: &Path, command: &[String], limits: &ExecutionLimits) -> Vec<String> {
        let mut args: Vec<String> = vec![self.program.display().to_string()];
        let mut push = |parts: &[&str]| args.extend(parts.iter().map(|p| p.to_string()));

        push(&["--die-with-parent", "--new-session", "--unshare-all"]);
        if limits.network != NetworkPolicy::None {
            push(&["--share-net"]);
        }

        push(&["--ro-bind", "/usr", "/usr"]);
        for dir in SYSTEM_DIRS {
            push(&["--ro-bind-try", *dir, *dir]);
        }
        if limits.network != NetworkPolicy::None {
            for file in NETWORK_FILES {
                push(&["--ro-bind-try", *file, *file]);
            }
        }
        push(&["--proc", "/proc", "--dev", "/dev", "--tmpfs", "/tmp"]);

        let bind = if limits.read_only { "--ro-bind" } else { "--bind" };
        let workdir = workdir.display().to_string();
        push(&[bind, workdir.as_str(), SANDBOX_DIR]);
        push(&[
            "--chdir",
            SANDBOX_DIR,
            "--setenv",
            "HOME",
            SANDBOX_DIR,
            "--setenv",
            "TMPDIR",
            "/tmp",
            "--",
        ]);

        args.extend(command.iter().cloned());
        args
    }
}

#[async_trait]
impl IsolationBackend for BubblewrapBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Strict
    }

    fn name(&self) -> &str {
        "bubblewrap"
    }

    async fn is_available(&self) -> bool {
        let probe = Command::new(&self.program)
            .args(["--unshare-all", "--ro-bind", "/", "/", "true"])
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        match tokio::time::timeout(PROBE_TIMEOUT, probe).await {
            Ok(Ok(status)) => status.success(),
            Ok(Err(e)) => {
                tracing::debug!(program = %self.program.display(), error = %e, "bwrap probe failed to start");
                false
            }
            Err(_) => {
                tracing::debug!(program = %self.program.display(), "bwrap probe timed out");
                false
            }
        }
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
            argv: self.wrap(workdir, command, limits),
            limits: limits.clone(),
        })
    }

    async fn run(&self, staged: &StagedExecution, timeout: Duration) -> Result<ProcessOutcome> {
        let mut cmd = process::base_command(&staged.argv, &staged.workdir)
            .ok_or_else(|| Error::internal("staged execution has an empty argv"))?;
        apply_child_limits(&mut cmd, &staged.limits);

        let child = cmd.spawn().map_err(|e| {
            Error::backend_unavailable(format!(
                "failed to launch '{}': {}",
                self.program.display(),
                e
            ))
        })?;

        tracing::debug!(pid = ?child.id(), command = ?staged.command, "Sandbox started");
        Ok(process::supervise(child, timeout).await?)
    }
}

#[cfg(unix)]
fn apply_child_limits(cmd: &mut Command, limits: &ExecutionLimits) {
    let memory = limits.memory_bytes() as libc::rlim_t;
    let processes = limits.max_processes as libc::rlim_t;
    #[cfg(target_os = "linux")]
    let cpus = affinity_mask(limits.cpu_cores);

    // SAFETY: the hook only issues async-signal-safe syscalls on values
    // computed before fork.
    unsafe {
        cmd.pre_exec(move || {
            let cap = |value| libc::rlimit {
                rlim_cur: value,
                rlim_max: value,
            };
            if libc::setrlimit(libc::RLIMIT_AS, &cap(memory)) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            if libc::setrlimit(libc::RLIMIT_NPROC, &cap(processes)) != 0 {
                return Err(std::io::Error::last_os_error());
            }
            #[cfg(target_os = "linux")]
            if let Some(mask) = cpus.as_ref() {
                if libc::sched_setaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), mask) != 0 {
                    return Err(std::io::Error::last_os_error());
                }
            }
            Ok(())
        });
    }
}

#[cfg(not(unix))]
fn apply_child_limits(_cmd: &mut Command, _limits: &ExecutionLimits) {}

/// First `cores` CPUs of the current affinity set.
#[cfg(target_os = "linux")]
fn affinity_mask(cores: u32) -> Option<libc::cpu_set_t> {
    // SAFETY: cpu_set_t is plain data and the CPU_* helpers stay in bounds.
    unsafe {
        let mut current: libc::cpu_set_t = std::mem::zeroed();
        if libc::sched_getaffinity(0, std::mem::size_of::<libc::cpu_set_t>(), &mut current) != 0 {
            return None;
        }

        let mut mask: libc::cpu_set_t = std::mem::zeroed();
        let mut picked = 0;
        for cpu in 0..libc::CPU_SETSIZE as usize {
            if picked >= cores {
                break;
            }
            if libc::CPU_ISSET(cpu, &current) {
                libc::CPU_SET(cpu, &mut mask);
                picked += 1;
            }
        }
        (picked > 0).then_some(mask)
    }
}
