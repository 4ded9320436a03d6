//! Child process plumbing shared by the real backends.

use std::path::Path;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::time::Instant;

use super::ProcessOutcome;

/// Captured output beyond this many bytes is dropped.
pub(crate) const MAX_OUTPUT_BYTES: usize = 1024 * 1024;

const TRUNCATION_MARKER: &str = "\n[output truncated]";

/// How long pipes are still read after the child has exited.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

/// Build the command for `argv` with a scrubbed environment.
///
/// The child leads its own process group so the whole tree can be killed.
pub(crate) fn base_command(argv: &[String], workdir: &Path) -> Option<Command> {
    let (program, args) = argv.split_first()?;

    let mut cmd = Command::new(program);
    cmd.args(args)
        .current_dir(workdir)
        .env_clear()
        .env("HOME", workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    if let Some(path) = std::env::var_os("PATH") {
        cmd.env("PATH", path);
    }
    #[cfg(unix)]
    cmd.process_group(0);

    Some(cmd)
}

/// Kills a child's process group when told to or when dropped.
pub(crate) struct ProcessGroup {
    pgid: Option<i32>,
}

impl ProcessGroup {
    pub(crate) fn of(child: &Child) -> Self {
        Self {
            pgid: child.id().map(|id| id as i32),
        }
    }

    pub(crate) fn kill(&self) {
        #[cfg(unix)]
        if let Some(pgid) = self.pgid {
            // SAFETY: plain syscall; a stale group id yields ESRCH.
            unsafe {
                libc::kill(-pgid, libc::SIGKILL);
            }
        }
    }
}

impl Drop for ProcessGroup {
    fn drop(&mut self) {
        self.kill();
    }
}

/// Byte sink that stops growing at `limit`.
pub(crate) struct OutputBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl OutputBuffer {
    pub(crate) fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub(crate) fn push(&mut self, chunk: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if chunk.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&chunk[..chunk.len().min(room)]);
    }

    pub(crate) fn finish(self) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(TRUNCATION_MARKER);
        }
        text
    }
}

enum Event {
    Stdout(std::io::Result<usize>),
    Stderr(std::io::Result<usize>),
    Exited(std::io::Result<ExitStatus>),
    Drained,
}

/// Wait for `child` under `timeout`, capturing interleaved stdout and stderr.
///
/// On timeout the process group is killed and whatever was captured so far
/// is returned. The group is also killed once the child exits, so no
/// descendant outlives the call. Pipes still held open by a process that
/// left the group are read for [`DRAIN_GRACE`] at most.
pub(crate) async fn supervise(mut child: Child, timeout: Duration) -> std::io::Result<ProcessOutcome> {
    let group = ProcessGroup::of(&child);
    let mut output = OutputBuffer::new(MAX_OUTPUT_BYTES);

    let finished = tokio::time::timeout(timeout, pump(&mut child, &group, &mut output)).await;

    match finished {
        Ok(status) => Ok(ProcessOutcome::exited(exit_code(status?), output.finish())),
        Err(_) => {
            group.kill();
            let _ = child.start_kill();
            let _ = child.wait().await;
            Ok(ProcessOutcome::timed_out(output.finish()))
        }
    }
}

async fn pump(
    child: &mut Child,
    group: &ProcessGroup,
    output: &mut OutputBuffer,
) -> std::io::Result<ExitStatus> {
    let mut stdout = child.stdout.take();
    let mut stderr = child.stderr.take();
    let mut out_buf = [0u8; 8192];
    let mut err_buf = [0u8; 8192];
    let mut status: Option<ExitStatus> = None;
    let mut drain_until: Option<Instant> = None;

    loop {
        if let Some(status) = status {
            if stdout.is_none() && stderr.is_none() {
                return Ok(status);
            }
        }

        let event = tokio::select! {
            read = read_chunk(&mut stdout, &mut out_buf), if stdout.is_some() => Event::Stdout(read),
            read = read_chunk(&mut stderr, &mut err_buf), if stderr.is_some() => Event::Stderr(read),
            exit = child.wait(), if status.is_none() => Event::Exited(exit),
            _ = tokio::time::sleep_until(drain_until.unwrap_or_else(Instant::now)), if drain_until.is_some() => Event::Drained,
        };

        match event {
            Event::Stdout(Ok(0)) | Event::Stdout(Err(_)) => stdout = None,
            Event::Stdout(Ok(n)) => output.push(&out_buf[..n]),
            Event::Stderr(Ok(0)) | Event::Stderr(Err(_)) => stderr = None,
            Event::Stderr(Ok(n)) => output.push(&err_buf[..n]),
            Event::Exited(exit) => {
                status = Some(exit?);
                drain_until = Some(Instant::now() + DRAIN_GRACE);
                // Background children would otherwise hold the pipes open.
                group.kill();
            }
            Event::Drained => {
                if let Some(status) = status {
                    tracing::warn!("Output pipes still open after exit; a detached process kept them");
                    return Ok(status);
                }
            }
        }
    }
}

async fn read_chunk<R: AsyncRead + Unpin>(
    pipe: &mut Option<R>,
    buf: &mut [u8],
) -> std::io::Result<usize> {
    match pipe {
        Some(reader) => reader.read(buf).await,
        None => std::future::pending().await,
    }
}

fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}
