//! Stream lifecycle state machine
//!
//! ```text
//!   starting ──► running ──► stopping ──► stopped
//!      │  │         │            ▲
//!      │  └─────────┼────────────┘
//!      └──► error ◄─┘
//! ```
//!
//! `stopped` and `error` are terminal. Lifecycle inputs arrive as
//! [`StreamEvent`]s and are mapped onto edges by [`StreamStatus::on_event`].

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Lifecycle status of a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamStatus {
    /// Process launched (or about to be), waiting for readiness
    Starting,
    /// Process reported readiness
    Running,
    /// Termination requested, waiting for the process to exit
    Stopping,
    /// Process exited after an explicit stop
    Stopped,
    /// Launch failure, readiness timeout or unexpected exit
    Error,
}

impl StreamStatus {
    /// Whether no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, StreamStatus::Stopped | StreamStatus::Error)
    }

    /// Whether `self -> next` is an edge of the state machine
    pub fn can_transition_to(self, next: StreamStatus) -> bool {
        use StreamStatus::*;

        matches!(
            (self, next),
            (Starting, Running)
                | (Starting, Stopping)
                | (Starting, Error)
                | (Running, Stopping)
                | (Running, Error)
                | (Stopping, Stopped)
        )
    }

    /// Map a lifecycle event onto a transition from this status
    pub fn on_event(self, event: &StreamEvent) -> Transition {
        use StreamStatus::*;

        match (self, event) {
            (Starting | Running, StreamEvent::StopRequested) => Transition::To(Stopping, None),
            (Stopping | Stopped | Error, StreamEvent::StopRequested) => Transition::Unchanged,

            (Starting, StreamEvent::Ready) => Transition::To(Running, None),
            // Stop raced with readiness; the stop wins.
            (Stopping, StreamEvent::Ready) => Transition::Unchanged,

            (Starting, StreamEvent::LaunchFailed(msg)) => Transition::To(Error, Some(msg.clone())),
            (Starting, StreamEvent::ReadinessTimedOut(timeout)) => Transition::To(
                Error,
                Some(format!("process did not become ready within {:?}", timeout)),
            ),
            (Starting | Running, StreamEvent::Exited { diagnostics }) => {
                Transition::To(Error, Some(diagnostics.clone()))
            }

            // Whatever ends the process while stopping completes the stop.
            (
                Stopping,
                StreamEvent::LaunchFailed(_)
                | StreamEvent::ReadinessTimedOut(_)
                | StreamEvent::Exited { .. },
            ) => Transition::To(Stopped, None),

            (Stopped | Error, StreamEvent::Exited { .. }) => Transition::Unchanged,

            _ => Transition::Invalid,
        }
    }
}

impl fmt::Display for StreamStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamStatus::Starting => "starting",
            StreamStatus::Running => "running",
            StreamStatus::Stopping => "stopping",
            StreamStatus::Stopped => "stopped",
            StreamStatus::Error => "error",
        };
        f.write_str(s)
    }
}

/// Input to the state machine, produced by the supervisor and the API
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEvent {
    /// A caller asked for the stream to stop
    StopRequested,
    /// The process reported a usable source feed
    Ready,
    /// The process could not be spawned
    LaunchFailed(String),
    /// Readiness was not reported in time
    ReadinessTimedOut(Duration),
    /// The process exited, with its exit status and stderr tail
    Exited { diagnostics: String },
}

/// Outcome of applying an event to a status
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// Move to a new status, with an error detail for `error`
    To(StreamStatus, Option<String>),
    /// Event is acknowledged but changes nothing
    Unchanged,
    /// Event makes no sense in the current status
    Invalid,
}
