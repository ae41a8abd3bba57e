//! Process supervision
//!
//! The supervisor runs one transcoder per stream and is the only component
//! that touches OS processes. Each stream gets a supervision task that owns
//! its child; the supervisor itself only keeps a control channel per task.
//!
//! ```text
//!   Supervisor ──start──► task (owns Child) ──events──► StreamRegistry
//!        │                   ▲
//!        └──── Control::Stop ┘
//! ```
//!
//! `stop` marks the stream `stopping` in the registry first, then asks the
//! task to terminate and returns once the signal has been sent. The task
//! completes the stop (`stopped`) when the process is gone, killing it after
//! the grace period if necessary.

pub mod command;
pub mod config;
pub mod process;
mod task;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinSet;
use tokio_util::task::TaskTracker;

use crate::error::{Error, Result};
use crate::registry::{StreamEvent, StreamId, StreamRegistry, StreamStatus};

pub use command::{build_ffmpeg_args, FfmpegLauncher, Launcher, ProcessSpec};
pub use config::SupervisorConfig;
pub use process::Process;

use task::{Control, Supervision};

/// What `stop` did to a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Termination was initiated
    Stopping,
    /// A previous stop is still in progress
    AlreadyStopping,
    /// The stream was already terminal
    AlreadyStopped,
}

/// Per-stream results of a bulk stop
#[derive(Debug, Default)]
pub struct BulkStop {
    /// Streams that were moved to `stopping`
    pub stopped: Vec<StreamId>,
    /// Failures, one message per stream
    pub errors: Vec<String>,
}

/// Owns and supervises transcoder processes
pub struct Supervisor {
    registry: Arc<StreamRegistry>,
    launcher: Arc<dyn Launcher>,
    config: SupervisorConfig,
    handles: Mutex<HashMap<StreamId, mpsc::Sender<Control>>>,
    tasks: TaskTracker,
}

impl Supervisor {
    pub fn new(
        registry: Arc<StreamRegistry>,
        launcher: Arc<dyn Launcher>,
        config: SupervisorConfig,
    ) -> Self {
        Self {
            registry,
            launcher,
            config,
            handles: Mutex::new(HashMap::new()),
            tasks: TaskTracker::new(),
        }
    }

    /// Get the supervisor configuration
    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Number of streams with a live supervision task
    pub fn active_count(&self) -> usize {
        self.handles.lock().len()
    }

    /// Whether a stream has a live supervision task
    pub fn is_supervised(&self, id: &StreamId) -> bool {
        self.handles.lock().contains_key(id)
    }

    /// Launch the process for a registered stream
    ///
    /// Returns as soon as the supervision task is spawned; the outcome is
    /// reported through the stream's status. A stream that was stopped
    /// before launch is completed to `stopped` without spawning anything.
    pub fn start(self: &Arc<Self>, id: &StreamId) -> Result<()> {
        let (tx, rx) = mpsc::channel(4);
        {
            let mut handles = self.handles.lock();
            if handles.contains_key(id) {
                return Err(Error::validation(format!(
                    "Stream {} already has a running process",
                    id
                )));
            }
            handles.insert(id.clone(), tx);
        }

        let supervision = Supervision {
            id: id.clone(),
            registry: Arc::clone(&self.registry),
            launcher: Arc::clone(&self.launcher),
            config: self.config.clone(),
        };
        let this = Arc::clone(self);
        self.tasks
            .spawn(async move { this.run_guarded(supervision, rx).await });
        Ok(())
    }

    /// Run a supervision task, turning a panic into an exit
    async fn run_guarded(&self, supervision: Supervision, control: mpsc::Receiver<Control>) {
        let id = supervision.id.clone();

        if let Err(e) = tokio::spawn(supervision.run(control)).await {
            tracing::error!(stream = %id, error = %e, "Supervision task failed");
            let event = StreamEvent::Exited {
                diagnostics: "supervisor task panicked".into(),
            };
            if let Err(e) = self.registry.apply(&id, event).await {
                tracing::debug!(stream = %id, error = %e, "Could not record task failure");
            }
        }

        self.handles.lock().remove(&id);
    }

    /// Stop one stream
    ///
    /// Blocks only until the termination signal has been issued (bounded by
    /// `stop_ack_timeout`), never for the process to exit.
    pub async fn stop(&self, id: &StreamId) -> Result<StopOutcome> {
        let applied = self.registry.apply(id, StreamEvent::StopRequested).await?;
        if applied.to.is_none() {
            return Ok(match applied.from {
                StreamStatus::Stopping => StopOutcome::AlreadyStopping,
                _ => StopOutcome::AlreadyStopped,
            });
        }

        let handle = self.handles.lock().get(id).cloned();
        match handle {
            Some(tx) => {
                let (ack_tx, ack_rx) = oneshot::channel();
                if tx.send(Control::Stop { ack: ack_tx }).await.is_ok()
                    && tokio::time::timeout(self.config.stop_ack_timeout, ack_rx)
                        .await
                        .is_err()
                {
                    tracing::warn!(stream = %id, "Stop not acknowledged in time");
                }
            }
            None => {
                // Never launched: nothing to terminate
                self.registry
                    .apply(
                        id,
                        StreamEvent::Exited {
                            diagnostics: String::new(),
                        },
                    )
                    .await?;
            }
        }

        tracing::info!(stream = %id, "Stream stop requested");
        Ok(StopOutcome::Stopping)
    }

    /// Stop several streams independently
    ///
    /// Streams that were already terminal are neither counted nor errors.
    pub async fn stop_many(self: &Arc<Self>, ids: Vec<StreamId>) -> BulkStop {
        let mut set = JoinSet::new();
        for (index, id) in ids.into_iter().enumerate() {
            let this = Arc::clone(self);
            set.spawn(async move {
                let result = this.stop(&id).await;
                (index, id, result)
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::error!(error = %e, "Stop task failed"),
            }
        }
        results.sort_by_key(|(index, _, _)| *index);

        let mut report = BulkStop::default();
        for (_, id, result) in results {
            match result {
                Ok(StopOutcome::Stopping) => report.stopped.push(id),
                Ok(_) => {}
                Err(e) => report.errors.push(format!("Error stopping {}: {}", id, e)),
            }
        }
        report
    }

    /// Stop every live stream
    pub async fn stop_all(self: &Arc<Self>) -> BulkStop {
        let ids = self.registry.live_ids().await;
        self.stop_many(ids).await
    }

    /// Stop everything and wait up to `bound` for the processes to exit
    pub async fn shutdown(self: &Arc<Self>, bound: Duration) {
        let report = self.stop_all().await;
        tracing::info!(streams = report.stopped.len(), "Stopping all streams");

        self.tasks.close();
        if tokio::time::timeout(bound, self.tasks.wait()).await.is_err() {
            tracing::warn!(remaining = self.active_count(), "Shutdown timed out");
        }
    }
}
