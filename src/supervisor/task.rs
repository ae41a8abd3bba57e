//! Per-stream supervision task
//!
//! One task per stream owns the child process. It turns what happens to
//! the process into [`StreamEvent`]s and feeds them to the registry:
//!
//! ```text
//!   launch error ─────────────► LaunchFailed
//!   readiness marker ─────────► Ready
//!   deadline passed ──────────► ReadinessTimedOut   (process terminated)
//!   process exit ─────────────► Exited
//!   stop control ─────────────► SIGTERM, grace, SIGKILL, Exited
//! ```

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::registry::{StreamEvent, StreamId, StreamRegistry, StreamStatus};

use super::command::Launcher;
use super::config::SupervisorConfig;
use super::process::Process;

/// Messages from the supervisor to a running task
#[derive(Debug)]
pub(super) enum Control {
    /// Terminate the process; `ack` fires once the signal is sent
    Stop { ack: oneshot::Sender<()> },
}

/// Everything a supervision task needs
pub(super) struct Supervision {
    pub id: StreamId,
    pub registry: Arc<StreamRegistry>,
    pub launcher: Arc<dyn Launcher>,
    pub config: SupervisorConfig,
}

impl Supervision {
    /// Apply an event; rejected events are already logged by the registry
    pub async fn apply(&self, event: StreamEvent) {
        if let Err(e) = self.registry.apply(&self.id, event).await {
            tracing::debug!(stream = %self.id, error = %e, "Event not applied");
        }
    }

    /// Run the stream's process until it ends
    pub async fn run(self, mut control: mpsc::Receiver<Control>) {
        let id = self.id.clone();

        // A stop can land between create and launch
        match self.registry.status(&id).await {
            Ok(StreamStatus::Starting) => {}
            Ok(status) => {
                tracing::debug!(stream = %id, status = %status, "Stream left starting before launch");
                self.apply(StreamEvent::Exited {
                    diagnostics: "stopped before launch".into(),
                })
                .await;
                return;
            }
            Err(_) => return,
        }

        let spec = match self.registry.stream_config(&id).await {
            Ok(config) => self.launcher.spec(&config),
            Err(e) => Err(e),
        };
        let spec = match spec {
            Ok(spec) => spec,
            Err(e) => {
                self.apply(StreamEvent::LaunchFailed(e.to_string())).await;
                return;
            }
        };

        let mut process = match Process::spawn(&spec, &self.config) {
            Ok(process) => process,
            Err(e) => {
                tracing::warn!(stream = %id, error = %e, "Transcoder failed to launch");
                self.apply(StreamEvent::LaunchFailed(e.to_string())).await;
                return;
            }
        };
        tracing::info!(stream = %id, pid = ?process.pid(), program = %spec.program, "Transcoder launched");
        tracing::debug!(stream = %id, args = ?spec.args, "Transcoder arguments");

        let readiness_timeout = self.config.readiness_timeout;
        let grace = self.config.stop_grace_period;
        let mut ready = match process.take_ready() {
            Some(rx) => rx,
            None => {
                // Unreachable in practice; a closed channel reads as "no marker"
                let (_, rx) = oneshot::channel();
                rx
            }
        };
        let mut ready_pending = true;
        let mut deadline_armed = true;
        let deadline = tokio::time::sleep(readiness_timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                seen = &mut ready, if ready_pending => {
                    ready_pending = false;
                    if seen.is_ok() {
                        deadline_armed = false;
                        self.apply(StreamEvent::Ready).await;
                    }
                }

                () = &mut deadline, if deadline_armed => {
                    tracing::warn!(stream = %id, timeout = ?readiness_timeout, "Transcoder not ready in time");
                    self.apply(StreamEvent::ReadinessTimedOut(readiness_timeout)).await;
                    process.terminate();
                    process.wait_or_kill(grace).await;
                    return;
                }

                exited = process.wait() => {
                    let status = exited.ok();
                    let diagnostics = process.diagnostics(status.as_ref()).await;
                    tracing::info!(stream = %id, status = ?status, "Transcoder exited");
                    self.apply(StreamEvent::Exited { diagnostics }).await;
                    return;
                }

                msg = control.recv() => {
                    // Sender dropped: nobody can stop us later, so stop now
                    self.apply(StreamEvent::StopRequested).await;
                    process.terminate();
                    if let Some(Control::Stop { ack }) = msg {
                        let _ = ack.send(());
                    }

                    let status = process.wait_or_kill(grace).await;
                    tracing::info!(stream = %id, status = ?status, "Transcoder stopped");
                    let diagnostics = process.diagnostics(status.as_ref()).await;
                    self.apply(StreamEvent::Exited { diagnostics }).await;
                    return;
                }
            }
        }
    }
}
