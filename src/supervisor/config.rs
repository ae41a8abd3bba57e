//! Supervisor configuration

use std::time::Duration;

use serde::Deserialize;

/// Default stderr lines that mean ffmpeg has opened its output
pub const DEFAULT_READINESS_MARKERS: &[&str] = &["Output #0", "Press [q"];

/// Configuration for process supervision
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Transcoder executable
    pub program: String,

    /// How long a process may take to report readiness
    #[serde(with = "crate::server::config::secs")]
    pub readiness_timeout: Duration,

    /// How long a stopped process may take to exit before it is killed
    #[serde(with = "crate::server::config::secs")]
    pub stop_grace_period: Duration,

    /// How long `stop` waits for the termination signal to be issued
    #[serde(with = "crate::server::config::secs")]
    pub stop_ack_timeout: Duration,

    /// Substrings of a stderr line that signal readiness
    pub readiness_markers: Vec<String>,

    /// Number of trailing stderr lines kept for exit diagnostics
    pub diagnostic_lines: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            program: "ffmpeg".into(),
            readiness_timeout: Duration::from_secs(8),
            stop_grace_period: Duration::from_secs(5),
            stop_ack_timeout: Duration::from_secs(1),
            readiness_markers: DEFAULT_READINESS_MARKERS
                .iter()
                .map(|m| m.to_string())
                .collect(),
            diagnostic_lines: 20,
        }
    }
}

impl SupervisorConfig {
    /// Set the transcoder executable
    pub fn program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    /// Set the readiness timeout
    pub fn readiness_timeout(mut self, timeout: Duration) -> Self {
        self.readiness_timeout = timeout;
        self
    }

    /// Set the stop grace period
    pub fn stop_grace_period(mut self, grace: Duration) -> Self {
        self.stop_grace_period = grace;
        self
    }

    /// Replace the readiness markers
    pub fn readiness_markers<I, S>(mut self, markers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.readiness_markers = markers.into_iter().map(Into::into).collect();
        self
    }
}
