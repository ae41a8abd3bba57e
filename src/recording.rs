//! Recording manager
//!
//! MediaMTX writes recorded segments to `<root>/<stream path>/<file>`. This
//! module lists them per stream and serves or deletes individual files.
//! Every caller-supplied path is normalized and confined to the recordings
//! root before any filesystem access; anything else is `NotFound`.

use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::Serialize;
use tokio::fs::File;

use crate::error::{Error, Result};
use crate::units::format_bytes;

/// A recorded file
#[derive(Debug, Clone, Serialize)]
pub struct Recording {
    pub filename: String,
    /// Path relative to the recordings root, as accepted by download/delete
    pub path: String,
    /// Human-readable size
    pub size: String,
    pub size_bytes: u64,
    /// Modification time, unix seconds
    pub modified: f64,
}

/// All recordings of one stream
#[derive(Debug, Clone, Serialize)]
pub struct RecordingGroup {
    pub stream: String,
    pub count: usize,
    pub files: Vec<Recording>,
}

/// Lists, serves and deletes recordings under one root directory
#[derive(Debug, Clone)]
pub struct RecordingManager {
    root: PathBuf,
}

impl RecordingManager {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Recordings root
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// List recordings grouped by stream
    ///
    /// Groups are sorted by stream name, files newest name first. Streams
    /// without files are omitted. A missing root lists nothing.
    pub async fn list(&self, stream: Option<&str>) -> Result<Vec<RecordingGroup>> {
        let mut dirs = match tokio::fs::read_dir(&self.root).await {
            Ok(dirs) => dirs,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(&self.root, e)),
        };

        let mut groups = Vec::new();
        while let Some(dir) = dirs
            .next_entry()
            .await
            .map_err(|e| Error::io(&self.root, e))?
        {
            let name = dir.file_name().to_string_lossy().into_owned();
            if stream.is_some_and(|wanted| wanted != name) {
                continue;
            }
            if !dir.file_type().await.is_ok_and(|t| t.is_dir()) {
                continue;
            }

            let files = self.list_dir(&dir.path(), &name).await?;
            if !files.is_empty() {
                groups.push(RecordingGroup {
                    stream: name,
                    count: files.len(),
                    files,
                });
            }
        }
        groups.sort_by(|a, b| a.stream.cmp(&b.stream));
        Ok(groups)
    }

    async fn list_dir(&self, dir: &Path, stream: &str) -> Result<Vec<Recording>> {
        let mut entries = tokio::fs::read_dir(dir)
            .await
            .map_err(|e| Error::io(dir, e))?;

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(dir, e))? {
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            if !meta.is_file() {
                continue;
            }

            let filename = entry.file_name().to_string_lossy().into_owned();
            let modified = meta
                .modified()
                .ok()
                .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
                .map(|d| d.as_secs_f64())
                .unwrap_or_default();
            files.push(Recording {
                path: format!("{}/{}", stream, filename),
                filename,
                size: format_bytes(meta.len()),
                size_bytes: meta.len(),
                modified,
            });
        }
        files.sort_by(|a, b| b.filename.cmp(&a.filename));
        Ok(files)
    }

    /// Map a relative recording path onto an existing file under the root
    ///
    /// Only `<stream>/<file>`-shaped paths made of plain components are
    /// accepted; the resolved file must still lie under the root after
    /// symlinks are followed.
    pub async fn resolve(&self, relative: &str) -> Result<PathBuf> {
        let not_found = || Error::not_found("Recording not found");

        let relative = Path::new(relative.trim_start_matches('/'));
        let mut depth = 0;
        for component in relative.components() {
            match component {
                Component::Normal(_) => depth += 1,
                _ => return Err(not_found()),
            }
        }
        if depth < 2 {
            return Err(not_found());
        }

        let root = tokio::fs::canonicalize(&self.root)
            .await
            .map_err(|_| not_found())?;
        let full = tokio::fs::canonicalize(root.join(relative))
            .await
            .map_err(|_| not_found())?;
        if !full.starts_with(&root) || full == root {
            return Err(not_found());
        }

        let meta = tokio::fs::metadata(&full).await.map_err(|_| not_found())?;
        if !meta.is_file() {
            return Err(not_found());
        }
        Ok(full)
    }

    /// Open a recording for download; returns the file, its name and size
    pub async fn open(&self, relative: &str) -> Result<(File, String, u64)> {
        let path = self.resolve(relative).await?;
        let file = File::open(&path).await.map_err(|e| Error::io(&path, e))?;
        let len = file
            .metadata()
            .await
            .map_err(|e| Error::io(&path, e))?
            .len();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Ok((file, name, len))
    }

    /// Delete a recording
    pub async fn delete(&self, relative: &str) -> Result<()> {
        let path = self.resolve(relative).await?;
        tokio::fs::remove_file(&path)
            .await
            .map_err(|e| Error::io(&path, e))?;
        tracing::info!(path = %path.display(), "Recording deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::error::ErrorKind;

    fn fixture() -> (tempfile::TempDir, RecordingManager) {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("recordings");
        std::fs::create_dir_all(root.join("lobby")).unwrap();
        std::fs::create_dir_all(root.join("dock")).unwrap();
        std::fs::create_dir_all(root.join("empty")).unwrap();
        std::fs::write(root.join("lobby/2024-01-01_10-00-00-000000.mp4"), b"old").unwrap();
        std::fs::write(root.join("lobby/2024-01-02_10-00-00-000000.mp4"), b"newer").unwrap();
        std::fs::write(root.join("dock/2024-01-01_09-00-00-000000.mp4"), vec![0u8; 2048]).unwrap();
        std::fs::write(dir.path().join("secret.txt"), b"top secret").unwrap();
        (dir, RecordingManager::new(root))
    }

    #[tokio::test]
    async fn test_list_groups_and_orders() {
        let (_dir, manager) = fixture();
        let groups = manager.list(None).await.unwrap();

        let streams: Vec<&str> = groups.iter().map(|g| g.stream.as_str()).collect();
        assert_eq!(streams, vec!["dock", "lobby"]);

        let lobby = &groups[1];
        assert_eq!(lobby.count, 2);
        assert_eq!(lobby.files[0].filename, "2024-01-02_10-00-00-000000.mp4");
        assert_eq!(lobby.files[0].path, "lobby/2024-01-02_10-00-00-000000.mp4");
        assert_eq!(lobby.files[0].size_bytes, 5);
        assert!(lobby.files[0].modified > 0.0);
        assert_eq!(groups[0].files[0].size, "2.0 KB");
    }

    #[tokio::test]
    async fn test_list_single_stream_and_missing_root() {
        let (_dir, manager) = fixture();
        let groups = manager.list(Some("lobby")).await.unwrap();
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].stream, "lobby");

        let missing = RecordingManager::new("/definitely/not/recordings");
        assert!(missing.list(None).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_open_reads_file() {
        let (_dir, manager) = fixture();
        let (mut file, name, len) = manager
            .open("lobby/2024-01-02_10-00-00-000000.mp4")
            .await
            .unwrap();
        assert_eq!(name, "2024-01-02_10-00-00-000000.mp4");
        assert_eq!(len, 5);

        let mut body = String::new();
        file.read_to_string(&mut body).await.unwrap();
        assert_eq!(body, "newer");
    }

    #[tokio::test]
    async fn test_traversal_is_not_found() {
        let (dir, manager) = fixture();
        let attempts = [
            "../secret.txt",
            "lobby/../../secret.txt",
            "lobby/../dock",
            "lobby",
            "",
            "lobby/missing.mp4",
            "/etc/passwd",
        ];
        for attempt in attempts {
            let err = manager.delete(attempt).await.unwrap_err();
            assert_eq!(err.kind(), ErrorKind::NotFound, "{}", attempt);
        }
        assert!(dir.path().join("secret.txt").exists());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_symlink_escape_is_not_found() {
        let (dir, manager) = fixture();
        std::os::unix::fs::symlink(
            dir.path().join("secret.txt"),
            manager.root().join("lobby/link.mp4"),
        )
        .unwrap();

        let err = manager.open("lobby/link.mp4").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_delete_removes_only_target() {
        let (_dir, manager) = fixture();
        manager
            .delete("lobby/2024-01-01_10-00-00-000000.mp4")
            .await
            .unwrap();

        let groups = manager.list(Some("lobby")).await.unwrap();
        assert_eq!(groups[0].count, 1);
        let err = manager
            .delete("lobby/2024-01-01_10-00-00-000000.mp4")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }
}
