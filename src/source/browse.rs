//! Media library browsing

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::error::{Error, Result};
use crate::units::format_bytes;

use super::resolver::MediaResolver;

/// One entry of a directory listing
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BrowseItem {
    pub name: String,
    pub path: String,
    pub is_dir: bool,
    /// Human-readable size, files only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<String>,
}

/// Listing of one directory
#[derive(Debug, Clone, Serialize)]
pub struct DirectoryListing {
    pub path: String,
    /// Parent directory, when it is still inside the media roots
    pub parent: Option<String>,
    pub items: Vec<BrowseItem>,
}

impl MediaResolver {
    /// List subdirectories and media files of a directory
    ///
    /// An empty or relative path lists the upload directory. Directories
    /// come first, then files, each group sorted case-insensitively.
    pub async fn browse(&self, path: Option<&str>) -> Result<DirectoryListing> {
        let requested = match path.map(str::trim) {
            Some(p) if Path::new(p).is_absolute() => PathBuf::from(p),
            _ => self.upload_dir().to_path_buf(),
        };

        let dir = tokio::fs::canonicalize(&requested)
            .await
            .map_err(|_| Error::not_found("Path does not exist"))?;
        let roots = self.canonical_roots().await;
        if !roots.iter().any(|root| dir.starts_with(root)) {
            return Err(Error::validation("Path is outside the media library"));
        }
        let meta = tokio::fs::metadata(&dir)
            .await
            .map_err(|e| Error::io(&dir, e))?;
        if !meta.is_dir() {
            return Err(Error::validation("Path is not a directory"));
        }

        let mut entries = tokio::fs::read_dir(&dir)
            .await
            .map_err(|e| Error::io(&dir, e))?;
        let mut items = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(&dir, e))? {
            let path = entry.path();
            // Follows symlinks; entries we cannot stat are skipped
            let Ok(meta) = tokio::fs::metadata(&path).await else {
                continue;
            };

            let item = BrowseItem {
                name: entry.file_name().to_string_lossy().into_owned(),
                path: path.to_string_lossy().into_owned(),
                is_dir: meta.is_dir(),
                size: None,
            };
            if meta.is_dir() {
                items.push(item);
            } else if meta.is_file() && self.is_allowed(&path) {
                items.push(BrowseItem {
                    size: Some(format_bytes(meta.len())),
                    ..item
                });
            }
        }
        items.sort_by_key(|item| (!item.is_dir, item.name.to_lowercase()));

        let parent = dir
            .parent()
            .filter(|p| roots.iter().any(|root| p.starts_with(root)))
            .map(|p| p.to_string_lossy().into_owned());

        Ok(DirectoryListing {
            path: dir.to_string_lossy().into_owned(),
            parent,
            items,
        })
    }
}
