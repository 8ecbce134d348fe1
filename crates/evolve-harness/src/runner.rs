//! Single scorer attempt: spawn, wait under a deadline, collect output.

use std::io;
use std::path::Path;
use std::process::Stdio;
use std::time::{Duration, Instant};

use evolve_core::AttemptState;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::scorer::ScorerCommand;

/// How long to wait for stdout/stderr after a child is gone.
///
/// Grandchildren that inherited the pipes can keep them open after the
/// child itself exits; past this deadline the reader is abandoned.
const IO_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Outcome of one scorer attempt.
#[derive(Debug, Clone)]
pub struct AttemptOutcome {
    pub state: AttemptState,

    /// Exit code (None when killed by a signal or timed out).
    pub exit_code: Option<i32>,

    /// Captured stdout.
    pub stdout: String,

    /// Captured stderr.
    pub stderr: String,

    /// Duration in milliseconds.
    pub duration_ms: u64,
}

impl AttemptOutcome {
    pub fn succeeded(&self) -> bool {
        self.state == AttemptState::Succeeded
    }
}

/// Scorer runner. One call is one attempt; retries live in the harness.
pub struct ScorerRunner;

impl ScorerRunner {
    /// Run `scorer` on `candidate` with a wall-clock limit.
    ///
    /// The scorer gets its own process group; on timeout the whole group
    /// is killed. Only a failure to spawn is an `Err`.
    pub async fn run_attempt(
        scorer: &ScorerCommand,
        candidate: &Path,
        timeout: Duration,
    ) -> io::Result<AttemptOutcome> {
        let start = Instant::now();

        let mut command = Command::new(&scorer.program);
        command
            .args(&scorer.args)
            .arg(candidate)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        own_process_group(&mut command);

        let mut child = command.spawn()?;
        let group = GroupKillGuard::new(&child);
        debug!(pid = ?child.id(), scorer = %scorer, "scorer spawned");

        let stdout_handle = tokio::spawn(read_stream(child.stdout.take()));
        let stderr_handle = tokio::spawn(read_stream(child.stderr.take()));

        let (state, exit_code) = match tokio::time::timeout(timeout, child.wait()).await {
            Ok(status) => {
                let status = status?;
                group.disarm();
                if status.success() {
                    (AttemptState::Succeeded, status.code())
                } else {
                    (AttemptState::Crashed, status.code())
                }
            }
            Err(_elapsed) => {
                group.kill();
                child.start_kill().ok();
                child.wait().await.ok();
                (AttemptState::TimedOut, None)
            }
        };

        let stdout = drain(stdout_handle).await;
        let stderr = drain(stderr_handle).await;

        Ok(AttemptOutcome {
            state,
            exit_code,
            stdout: String::from_utf8_lossy(&stdout).into_owned(),
            stderr: String::from_utf8_lossy(&stderr).into_owned(),
            duration_ms: start.elapsed().as_millis() as u64,
        })
    }
}

/// Run the spawned command as the leader of a new process group.
pub(crate) fn own_process_group(command: &mut Command) {
    #[cfg(unix)]
    unsafe {
        command.pre_exec(|| {
            if libc::setpgid(0, 0) != 0 {
                return Err(io::Error::last_os_error());
            }
            Ok(())
        });
    }
    #[cfg(not(unix))]
    let _ = command;
}

/// Kills a child's whole process group when dropped, unless disarmed.
///
/// `kill_on_drop` only reaches the direct child.
pub(crate) struct GroupKillGuard {
    pid: Option<u32>,
}

impl GroupKillGuard {
    pub(crate) fn new(child: &Child) -> Self {
        Self { pid: child.id() }
    }

    /// Kill the group now.
    pub(crate) fn kill(mut self) {
        self.kill_group();
    }

    /// The child exited on its own; leave the group alone.
    pub(crate) fn disarm(mut self) {
        self.pid = None;
    }

    fn kill_group(&mut self) {
        if let Some(pid) = self.pid.take() {
            if let Err(e) = kill_process_group(pid) {
                warn!(pid, error = %e, "failed to kill process group");
            }
        }
    }
}

impl Drop for GroupKillGuard {
    fn drop(&mut self) {
        self.kill_group();
    }
}

pub(crate) async fn read_stream<R>(reader: Option<R>) -> io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut buf = Vec::new();
    if let Some(mut reader) = reader {
        reader.read_to_end(&mut buf).await?;
    }
    Ok(buf)
}

pub(crate) async fn drain(mut handle: JoinHandle<io::Result<Vec<u8>>>) -> Vec<u8> {
    match tokio::time::timeout(IO_DRAIN_TIMEOUT, &mut handle).await {
        Ok(Ok(Ok(buf))) => buf,
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "failed to read child output");
            Vec::new()
        }
        Ok(Err(join_err)) => {
            warn!(error = %join_err, "child output reader panicked");
            Vec::new()
        }
        Err(_elapsed) => {
            handle.abort();
            warn!("child output still open after drain deadline");
            Vec::new()
        }
    }
}

#[cfg(unix)]
fn kill_process_group(pid: u32) -> io::Result<()> {
    let pgid = pid as libc::pid_t;

    let result = unsafe { libc::killpg(pgid, libc::SIGKILL) };
    if result == -1 {
        let err = io::Error::last_os_error();
        if err.raw_os_error() != Some(libc::ESRCH) {
            return Err(err);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn kill_process_group(_: u32) -> io::Result<()> {
    Ok(())
}
