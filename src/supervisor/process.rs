//! Child process handling
//!
//! Spawns the transcoder in its own process group, watches its stderr for
//! readiness markers while keeping a short tail for diagnostics, and
//! terminates it gracefully or by force.

use std::collections::VecDeque;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::Duration;

use bytes::BytesMut;
use parking_lot::Mutex;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, ChildStderr, Command};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

use super::command::ProcessSpec;
use super::config::SupervisorConfig;

/// Maximum length of the `error` text derived from diagnostics
pub const MAX_DIAGNOSTIC_CHARS: usize = 1000;

/// Partial lines longer than this are flushed as-is
const MAX_LINE_LEN: usize = 8 * 1024;

/// How long to wait for the stderr reader to drain after exit
const DRAIN_TIMEOUT: Duration = Duration::from_millis(250);

/// How long to wait for a killed process to be reaped
const KILL_WAIT: Duration = Duration::from_secs(2);

/// Shared ring of the last stderr lines
type Tail = Arc<Mutex<VecDeque<String>>>;

/// A running transcoder
pub struct Process {
    child: Child,
    pid: Option<u32>,
    tail: Tail,
    monitor: Option<JoinHandle<()>>,
    ready: Option<oneshot::Receiver<()>>,
}

impl Process {
    /// Spawn `spec` with stderr piped and stdin/stdout discarded
    pub fn spawn(spec: &ProcessSpec, config: &SupervisorConfig) -> Result<Self> {
        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        cmd.process_group(0);

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::Launch(format!("{}: {}", spec.program, e)))?;
        let pid = child.id();

        let tail: Tail = Arc::new(Mutex::new(VecDeque::with_capacity(config.diagnostic_lines)));
        let (ready_tx, ready_rx) = oneshot::channel();
        let monitor = child.stderr.take().map(|stderr| {
            tokio::spawn(monitor_stderr(
                stderr,
                config.readiness_markers.clone(),
                Arc::clone(&tail),
                config.diagnostic_lines,
                ready_tx,
            ))
        });

        Ok(Self {
            child,
            pid,
            tail,
            monitor,
            ready: Some(ready_rx),
        })
    }

    /// OS process id
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }

    /// Receiver that fires once a readiness marker is seen
    ///
    /// Resolves with an error if stderr closes first. Can only be taken once.
    pub fn take_ready(&mut self) -> Option<oneshot::Receiver<()>> {
        self.ready.take()
    }

    /// Wait for the process to exit
    pub async fn wait(&mut self) -> std::io::Result<ExitStatus> {
        self.child.wait().await
    }

    /// Ask the process group to terminate
    pub fn terminate(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            if signal_group(pid, libc::SIGTERM) {
                return;
            }
        }
        let _ = self.child.start_kill();
    }

    /// Force-kill the process group
    pub fn kill(&mut self) {
        #[cfg(unix)]
        if let Some(pid) = self.pid {
            signal_group(pid, libc::SIGKILL);
        }
        let _ = self.child.start_kill();
    }

    /// Wait up to `grace` for exit, then kill
    ///
    /// Returns `None` if the exit status could not be collected.
    pub async fn wait_or_kill(&mut self, grace: Duration) -> Option<ExitStatus> {
        if let Ok(Ok(status)) = tokio::time::timeout(grace, self.child.wait()).await {
            return Some(status);
        }

        tracing::warn!(pid = ?self.pid, "Process ignored termination, killing");
        self.kill();
        match tokio::time::timeout(KILL_WAIT, self.child.wait()).await {
            Ok(Ok(status)) => Some(status),
            _ => None,
        }
    }

    /// Exit status followed by the stderr tail, capped at
    /// [`MAX_DIAGNOSTIC_CHARS`]
    pub async fn diagnostics(&mut self, status: Option<&ExitStatus>) -> String {
        if let Some(monitor) = self.monitor.take() {
            let _ = tokio::time::timeout(DRAIN_TIMEOUT, monitor).await;
        }

        let header = match status {
            Some(status) => format!("process exited ({})", status),
            None => "process exited (status unavailable)".to_string(),
        };
        let lines = self.tail.lock().iter().cloned().collect::<Vec<_>>().join("\n");
        format_diagnostics(&header, &lines)
    }
}

/// Join header and stderr tail, trimming the oldest output to fit
fn format_diagnostics(header: &str, lines: &str) -> String {
    if lines.is_empty() {
        return header.to_string();
    }

    let budget = MAX_DIAGNOSTIC_CHARS.saturating_sub(header.chars().count() + 1);
    let skip = lines.chars().count().saturating_sub(budget);
    let kept: String = lines.chars().skip(skip).collect();
    format!("{}\n{}", header, kept)
}

/// Send `signal` to the process group, falling back to the process itself
#[cfg(unix)]
fn signal_group(pid: u32, signal: libc::c_int) -> bool {
    let Ok(pid) = libc::pid_t::try_from(pid) else {
        return false;
    };
    // SAFETY: plain signal syscalls on a pid this process spawned
    unsafe { libc::killpg(pid, signal) == 0 || libc::kill(pid, signal) == 0 }
}

/// Read stderr line by line; ffmpeg rewrites progress lines with `\r`
async fn monitor_stderr(
    mut stderr: ChildStderr,
    markers: Vec<String>,
    tail: Tail,
    keep: usize,
    ready_tx: oneshot::Sender<()>,
) {
    let mut ready_tx = Some(ready_tx);
    let mut buf = BytesMut::with_capacity(4096);

    let mut on_line = |raw: &[u8]| {
        let line = String::from_utf8_lossy(raw);
        let line = line.trim();
        if line.is_empty() {
            return;
        }

        if ready_tx.is_some() && markers.iter().any(|m| line.contains(m.as_str())) {
            if let Some(tx) = ready_tx.take() {
                let _ = tx.send(());
            }
        }

        if keep > 0 {
            let mut tail = tail.lock();
            if tail.len() == keep {
                tail.pop_front();
            }
            tail.push_back(line.to_string());
        }
    };

    loop {
        match stderr.read_buf(&mut buf).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        while let Some(pos) = buf.iter().position(|b| *b == b'\n' || *b == b'\r') {
            let line = buf.split_to(pos + 1);
            on_line(&line[..pos]);
        }
        if buf.len() > MAX_LINE_LEN {
            let line = buf.split();
            on_line(&line);
        }
    }

    if !buf.is_empty() {
        on_line(&buf);
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn sh(script: &str) -> ProcessSpec {
        ProcessSpec::new("sh", ["-c", script])
    }

    fn config() -> SupervisorConfig {
        SupervisorConfig::default().readiness_markers(["READY"])
    }

    #[tokio::test]
    async fn test_ready_marker_on_carriage_return_line() {
        let mut process =
            Process::spawn(&sh("printf 'frame=1\\rREADY now\\r' >&2; sleep 5"), &config()).unwrap();
        let ready = process.take_ready().unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(3), ready).await;
        assert!(matches!(fired, Ok(Ok(()))));

        process.terminate();
        let status = process.wait_or_kill(Duration::from_secs(2)).await;
        assert!(status.is_some());
    }

    #[tokio::test]
    async fn test_ready_fails_when_stderr_closes() {
        let mut process = Process::spawn(&sh("echo nothing >&2"), &config()).unwrap();
        let ready = process.take_ready().unwrap();

        let fired = tokio::time::timeout(Duration::from_secs(3), ready).await;
        assert!(matches!(fired, Ok(Err(_))));
    }

    #[tokio::test]
    async fn test_diagnostics_keep_the_tail() {
        let script = "for i in 1 2 3 4 5; do echo line$i >&2; done; exit 3";
        let config = config();
        let mut process = Process::spawn(&sh(script), &SupervisorConfig {
            diagnostic_lines: 2,
            ..config
        })
        .unwrap();

        let status = process.wait().await.unwrap();
        let diagnostics = process.diagnostics(Some(&status)).await;
        assert!(diagnostics.starts_with("process exited ("));
        assert!(diagnostics.ends_with("line4\nline5"));
        assert!(!diagnostics.contains("line3"));
    }

    #[tokio::test]
    async fn test_term_ignored_then_killed() {
        let mut process =
            Process::spawn(&sh("trap '' TERM; echo READY >&2; sleep 30"), &config()).unwrap();
        let ready = process.take_ready().unwrap();
        let _ = tokio::time::timeout(Duration::from_secs(3), ready).await;

        process.terminate();
        let status = process
            .wait_or_kill(Duration::from_millis(200))
            .await
            .expect("killed process is reaped");
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_missing_program_is_launch_error() {
        let spec = ProcessSpec::new("/nonexistent/ffmpeg", Vec::<String>::new());
        let err = Process::spawn(&spec, &config()).err().unwrap();
        assert_eq!(err.kind(), crate::error::ErrorKind::Launch);
        assert!(err.to_string().contains("/nonexistent/ffmpeg"));
    }

    #[test]
    fn test_diagnostics_truncated() {
        let lines = "x".repeat(5000);
        let text = format_diagnostics("process exited (exit status: 1)", &lines);
        assert_eq!(text.chars().count(), MAX_DIAGNOSTIC_CHARS);
        assert!(text.starts_with("process exited (exit status: 1)\n"));
    }
}
