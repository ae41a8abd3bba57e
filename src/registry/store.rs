//! Stream registry implementation
//!
//! The authoritative table of streams. The outer map is only locked long
//! enough to find or insert an entry; every status change and metrics merge
//! happens under that entry's own lock, so writes to one stream never block
//! reads or writes of another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{Notify, RwLock};

use crate::error::{Error, Result};
use crate::metrics::LiveMetrics;

use super::config::RegistryConfig;
use super::entry::StreamEntry;
use super::error::RegistryError;
use super::state::{StreamEvent, StreamStatus, Transition};
use super::stream::{Stream, StreamConfig, StreamId};

/// Insertion-ordered map of entries
#[derive(Default)]
struct Slots {
    order: Vec<StreamId>,
    entries: HashMap<StreamId, Arc<RwLock<StreamEntry>>>,
}

/// Result of applying an event to a stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Applied {
    /// Status before the event
    pub from: StreamStatus,
    /// New status, `None` if the event changed nothing
    pub to: Option<StreamStatus>,
}

/// A running stream as seen by the metrics collector
#[derive(Debug, Clone)]
pub struct RunningStream {
    pub id: StreamId,
    pub path: String,
}

/// Central registry for all streams
pub struct StreamRegistry {
    /// Map of stream id to stream entry
    streams: RwLock<Slots>,

    /// Signalled on every insert, removal and status change
    changed: Notify,

    /// Configuration
    config: RegistryConfig,
}

impl StreamRegistry {
    /// Create a new stream registry with default configuration
    pub fn new() -> Self {
        Self::with_config(RegistryConfig::default())
    }

    /// Create a new stream registry with custom configuration
    pub fn with_config(config: RegistryConfig) -> Self {
        Self {
            streams: RwLock::new(Slots::default()),
            changed: Notify::new(),
            config,
        }
    }

    /// Get the registry configuration
    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    /// Notifier fired whenever the set of streams or a status changes
    pub fn changed(&self) -> &Notify {
        &self.changed
    }

    /// Insert a new stream in `starting` under a fresh id
    pub async fn create(&self, config: StreamConfig) -> Result<Stream> {
        self.create_with_id(StreamId::new(), config).await
    }

    /// Insert a new stream in `starting` under a given id
    ///
    /// Used when restoring persisted streams. Fails if the id is taken or if
    /// another live stream already publishes to the same MediaMTX path.
    pub async fn create_with_id(&self, id: StreamId, config: StreamConfig) -> Result<Stream> {
        let mut streams = self.streams.write().await;

        if streams.entries.contains_key(&id) {
            return Err(Error::validation(format!("Stream id already in use: {}", id)));
        }

        let path = config.path_name();
        if path.is_empty() {
            return Err(Error::validation("Stream name is required"));
        }
        for entry_arc in streams.entries.values() {
            let entry = entry_arc.read().await;
            if entry.path == path && !entry.status.is_terminal() {
                return Err(Error::validation(format!(
                    "A stream named '{}' is already active",
                    entry.config.name
                )));
            }
        }

        let entry = StreamEntry::new(id.clone(), config);
        let snapshot = entry.snapshot(&self.config.playback);

        streams.order.push(id.clone());
        streams.entries.insert(id.clone(), Arc::new(RwLock::new(entry)));
        drop(streams);

        tracing::info!(stream = %id, path = %path, "Stream registered");
        self.changed.notify_one();

        Ok(snapshot)
    }

    async fn entry(&self, id: &StreamId) -> Result<Arc<RwLock<StreamEntry>>> {
        let streams = self.streams.read().await;
        streams
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| Error::stream_not_found(id))
    }

    /// Move a stream to a new status
    ///
    /// Only edges of the state machine are applied. Anything else is logged
    /// and rejected with `InvalidTransition`, leaving the stream unchanged.
    pub async fn transition(
        &self,
        id: &StreamId,
        to: StreamStatus,
        detail: Option<String>,
    ) -> Result<StreamStatus> {
        let entry_arc = self.entry(id).await?;
        let mut entry = entry_arc.write().await;
        let from = entry.status;

        if !from.can_transition_to(to) {
            tracing::warn!(stream = %id, from = %from, to = %to, "Rejected invalid transition");
            return Err(RegistryError::InvalidTransition {
                id: id.clone(),
                from,
                to,
            }
            .into());
        }

        entry.set_status(to, detail);
        drop(entry);

        tracing::info!(stream = %id, from = %from, to = %to, "Stream status changed");
        self.changed.notify_one();

        Ok(from)
    }

    /// Apply a lifecycle event to a stream
    ///
    /// The current status is read and updated under the same entry lock, so
    /// concurrent events for one stream are serialized.
    pub async fn apply(&self, id: &StreamId, event: StreamEvent) -> Result<Applied> {
        let entry_arc = self.entry(id).await?;
        let mut entry = entry_arc.write().await;
        let from = entry.status;

        match from.on_event(&event) {
            Transition::To(to, detail) => {
                entry.set_status(to, detail);
                drop(entry);

                tracing::info!(stream = %id, from = %from, to = %to, event = ?event, "Stream status changed");
                self.changed.notify_one();

                Ok(Applied { from, to: Some(to) })
            }
            Transition::Unchanged => {
                tracing::debug!(stream = %id, status = %from, event = ?event, "Event ignored");
                Ok(Applied { from, to: None })
            }
            Transition::Invalid => {
                tracing::warn!(stream = %id, status = %from, event = ?event, "Rejected invalid event");
                Err(RegistryError::InvalidTransition {
                    id: id.clone(),
                    from,
                    to: from,
                }
                .into())
            }
        }
    }

    /// Get a snapshot of one stream
    pub async fn get(&self, id: &StreamId) -> Result<Stream> {
        let entry_arc = self.entry(id).await?;
        let entry = entry_arc.read().await;
        Ok(entry.snapshot(&self.config.playback))
    }

    /// Get the current status of one stream
    pub async fn status(&self, id: &StreamId) -> Result<StreamStatus> {
        let entry_arc = self.entry(id).await?;
        let status = entry_arc.read().await.status;
        Ok(status)
    }

    /// Creation-time configuration of one stream, credentials included
    pub async fn stream_config(&self, id: &StreamId) -> Result<StreamConfig> {
        let entry_arc = self.entry(id).await?;
        let config = entry_arc.read().await.config.clone();
        Ok(config)
    }

    /// Snapshots of all streams in insertion order
    pub async fn list(&self) -> Vec<Stream> {
        let entries = self.ordered_entries().await;

        let mut snapshots = Vec::with_capacity(entries.len());
        for entry_arc in entries {
            let entry = entry_arc.read().await;
            snapshots.push(entry.snapshot(&self.config.playback));
        }
        snapshots
    }

    /// Entry handles in insertion order, without holding the map lock
    async fn ordered_entries(&self) -> Vec<Arc<RwLock<StreamEntry>>> {
        let streams = self.streams.read().await;
        streams
            .order
            .iter()
            .filter_map(|id| streams.entries.get(id).cloned())
            .collect()
    }

    /// Ids of all streams that are not terminal
    pub async fn live_ids(&self) -> Vec<StreamId> {
        let mut ids = Vec::new();
        for entry_arc in self.ordered_entries().await {
            let entry = entry_arc.read().await;
            if !entry.status.is_terminal() {
                ids.push(entry.id.clone());
            }
        }
        ids
    }

    /// Streams currently in `running`
    pub async fn running_streams(&self) -> Vec<RunningStream> {
        let mut running = Vec::new();
        for entry_arc in self.ordered_entries().await {
            let entry = entry_arc.read().await;
            if entry.status == StreamStatus::Running {
                running.push(RunningStream {
                    id: entry.id.clone(),
                    path: entry.path.clone(),
                });
            }
        }
        running
    }

    /// Creation configs of all live streams, for persistence
    pub async fn live_configs(&self) -> Vec<(StreamId, StreamConfig)> {
        let mut configs = Vec::new();
        for entry_arc in self.ordered_entries().await {
            let entry = entry_arc.read().await;
            if !entry.status.is_terminal() {
                configs.push((entry.id.clone(), entry.config.clone()));
            }
        }
        configs
    }

    /// Merge a metrics sample into a running stream
    ///
    /// `update` receives the previous sample and how long the stream has
    /// been running. Streams that left `running` are skipped; returns
    /// whether the sample was stored.
    pub async fn update_metrics<F>(&self, id: &StreamId, update: F) -> bool
    where
        F: FnOnce(Option<&LiveMetrics>, Duration) -> LiveMetrics,
    {
        let Ok(entry_arc) = self.entry(id).await else {
            return false;
        };
        let mut entry = entry_arc.write().await;

        let Some(running_for) = entry.running_for() else {
            return false;
        };
        let metrics = update(entry.live_metrics.as_ref(), running_for);
        entry.live_metrics = Some(metrics);
        true
    }

    /// Remove a stream
    ///
    /// Only streams in a terminal status can be removed.
    pub async fn remove(&self, id: &StreamId) -> Result<()> {
        let mut streams = self.streams.write().await;

        let entry_arc = streams
            .entries
            .get(id)
            .cloned()
            .ok_or_else(|| Error::stream_not_found(id))?;
        let status = entry_arc.read().await.status;
        if !status.is_terminal() {
            return Err(RegistryError::NotTerminal {
                id: id.clone(),
                status,
            }
            .into());
        }

        streams.entries.remove(id);
        streams.order.retain(|other| other != id);
        drop(streams);

        tracing::info!(stream = %id, "Stream removed");
        self.changed.notify_one();
        Ok(())
    }

    /// Get total number of streams
    pub async fn stream_count(&self) -> usize {
        self.streams.read().await.entries.len()
    }

    /// Run cleanup task once
    ///
    /// Removes streams that have been terminal longer than
    /// `terminal_retention`.
    pub async fn cleanup(&self) {
        let retention = self.config.terminal_retention;
        let mut streams = self.streams.write().await;

        let ids_to_remove: Vec<StreamId> = streams
            .entries
            .iter()
            .filter_map(|(id, entry_arc)| {
                // Try to get read lock without blocking
                let entry = entry_arc.try_read().ok()?;
                match entry.terminal_for() {
                    Some(elapsed) if elapsed > retention => Some(id.clone()),
                    _ => None,
                }
            })
            .collect();

        if ids_to_remove.is_empty() {
            return;
        }

        for id in &ids_to_remove {
            streams.entries.remove(id);
            tracing::info!(stream = %id, "Stream removed by cleanup");
        }
        streams.order.retain(|id| !ids_to_remove.contains(id));
        drop(streams);

        self.changed.notify_one();
    }

    /// Spawn background cleanup task
    ///
    /// Returns a handle that can be used to abort the task.
    pub fn spawn_cleanup_task(self: &Arc<Self>) -> tokio::task::JoinHandle<()> {
        let registry = Arc::clone(self);
        let interval = registry.config.cleanup_interval;

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                registry.cleanup().await;
            }
        })
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
