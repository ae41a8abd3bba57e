//! State file persistence
//!
//! Live streams are written to a JSON file so a restarted manager can bring
//! them back. Only the creation config is stored; status, errors and
//! metrics are runtime state.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

use super::store::StreamRegistry;
use super::stream::{StreamConfig, StreamId};

/// A persisted stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistedStream {
    pub id: StreamId,
    #[serde(flatten)]
    pub config: StreamConfig,
}

/// Load persisted streams; a missing file is an empty list
pub async fn load(path: &Path) -> Result<Vec<PersistedStream>> {
    let data = match tokio::fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(Error::io(path, e)),
    };

    serde_json::from_slice(&data)
        .map_err(|e| Error::Config(format!("invalid state file {}: {}", path.display(), e)))
}

/// Write persisted streams, replacing the file atomically
pub async fn save(path: &Path, streams: &[PersistedStream]) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| Error::io(parent, e))?;
    }

    let json = serde_json::to_vec_pretty(streams)
        .map_err(|e| Error::Config(format!("failed to encode state file: {}", e)))?;

    let tmp = path.with_extension("json.tmp");
    tokio::fs::write(&tmp, json)
        .await
        .map_err(|e| Error::io(&tmp, e))?;
    tokio::fs::rename(&tmp, path)
        .await
        .map_err(|e| Error::io(path, e))?;

    Ok(())
}

/// Snapshot the registry's live streams into the state file
pub async fn save_registry(registry: &StreamRegistry, path: &Path) -> Result<usize> {
    let streams: Vec<PersistedStream> = registry
        .live_configs()
        .await
        .into_iter()
        .map(|(id, config)| PersistedStream { id, config })
        .collect();

    save(path, &streams).await?;
    Ok(streams.len())
}

/// Spawn a task that rewrites the state file after registry changes
///
/// Bursts of changes are coalesced by waiting `debounce` after each
/// notification before writing.
pub fn spawn_persist_task(
    registry: Arc<StreamRegistry>,
    path: PathBuf,
    debounce: Duration,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            registry.changed().notified().await;
            tokio::time::sleep(debounce).await;

            match save_registry(&registry, &path).await {
                Ok(count) => {
                    tracing::debug!(path = %path.display(), streams = count, "Saved stream state");
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "Failed to save stream state");
                }
            }
        }
    })
}
