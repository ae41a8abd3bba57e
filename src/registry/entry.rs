//! Stream entry
//!
//! This module defines the per-stream state stored in the registry.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};

use crate::metrics::LiveMetrics;

use super::config::PlaybackEndpoints;
use super::state::StreamStatus;
use super::stream::{Stream, StreamConfig, StreamId, StreamUrls};

/// Entry for a single stream in the registry
#[derive(Debug)]
pub struct StreamEntry {
    /// Stream id
    pub id: StreamId,

    /// Creation-time configuration
    pub config: StreamConfig,

    /// MediaMTX path name
    pub path: String,

    /// Current lifecycle status
    pub status: StreamStatus,

    /// Last fatal error, set only in `error`
    pub error: Option<String>,

    /// Wall-clock creation time
    pub created_at: DateTime<Utc>,

    /// When the status last changed
    pub status_changed_at: Instant,

    /// When the stream entered `running`
    pub running_since: Option<Instant>,

    /// Latest health sample
    pub live_metrics: Option<LiveMetrics>,
}

impl StreamEntry {
    /// Create a new entry in `starting`
    pub(super) fn new(id: StreamId, config: StreamConfig) -> Self {
        let path = config.path_name();
        Self {
            id,
            config,
            path,
            status: StreamStatus::Starting,
            error: None,
            created_at: Utc::now(),
            status_changed_at: Instant::now(),
            running_since: None,
            live_metrics: None,
        }
    }

    /// Apply a status change that has already been validated
    pub(super) fn set_status(&mut self, status: StreamStatus, detail: Option<String>) {
        self.status = status;
        self.status_changed_at = Instant::now();

        match status {
            StreamStatus::Running => {
                self.running_since = Some(self.status_changed_at);
            }
            StreamStatus::Error => {
                self.error = Some(detail.unwrap_or_else(|| "unknown error".into()));
                self.running_since = None;
                self.live_metrics = None;
            }
            _ => {
                self.running_since = None;
                self.live_metrics = None;
            }
        }
    }

    /// How long the stream has been running
    pub fn running_for(&self) -> Option<Duration> {
        self.running_since.map(|t| t.elapsed())
    }

    /// How long the stream has been in a terminal status
    pub fn terminal_for(&self) -> Option<Duration> {
        self.status
            .is_terminal()
            .then(|| self.status_changed_at.elapsed())
    }

    /// Build a read-only snapshot
    ///
    /// URLs and metrics are only populated while running.
    pub fn snapshot(&self, playback: &PlaybackEndpoints) -> Stream {
        let running = self.status == StreamStatus::Running;

        Stream {
            id: self.id.clone(),
            name: self.config.name.clone(),
            path: self.path.clone(),
            source: self.config.source.clone(),
            protocol: self.config.protocol,
            status: self.status,
            encoding: self.config.encoding.clone(),
            recording_enabled: self.config.recording_enabled,
            auth_user: self.config.auth.as_ref().map(|a| a.user.clone()),
            error: self.error.clone(),
            urls: running
                .then(|| StreamUrls::derive(&self.path, self.config.auth.as_ref(), playback)),
            live_metrics: if running {
                self.live_metrics.clone()
            } else {
                None
            },
            created_at: self.created_at,
        }
    }
}
