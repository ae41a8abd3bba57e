//! Source resolver
//!
//! Validates requested inputs and stores uploads in the media library.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tokio::io::AsyncWriteExt;

use crate::error::{Error, Result};

use super::{InputDescriptor, SourceKind, SourceRequest};

/// Media file extensions accepted by default
pub const DEFAULT_EXTENSIONS: &[&str] = &["mp4", "mkv", "avi", "mov", "flv", "ts", "webm"];

/// Upper bound on "-N" suffixes tried for a colliding upload name
const MAX_NAME_ATTEMPTS: u32 = 1000;

/// Resolver configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Upload directory, also the first media root
    pub upload_dir: PathBuf,
    /// Additional directories streams may read files from
    pub extra_roots: Vec<PathBuf>,
    /// Allowed media file extensions (lowercase, without dot)
    pub allowed_extensions: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("/streams"),
            extra_roots: Vec::new(),
            allowed_extensions: DEFAULT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl ResolverConfig {
    /// Create a config rooted at an upload directory
    pub fn new(upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            upload_dir: upload_dir.into(),
            ..Default::default()
        }
    }

    /// Add a media root
    pub fn extra_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.extra_roots.push(root.into());
        self
    }
}

/// Resolves stream sources against the media library
#[derive(Debug, Clone)]
pub struct MediaResolver {
    config: ResolverConfig,
}

impl MediaResolver {
    pub fn new(config: ResolverConfig) -> Self {
        Self { config }
    }

    /// The upload directory
    pub fn upload_dir(&self) -> &Path {
        &self.config.upload_dir
    }

    /// Resolve a source request into a launchable input
    pub async fn resolve(&self, request: SourceRequest) -> Result<InputDescriptor> {
        match request {
            SourceRequest::Existing(path) => self.resolve_existing(&path).await,
            SourceRequest::Upload { filename, data } => {
                let path = self.store_upload(&filename, &data).await?;
                Ok(InputDescriptor {
                    kind: SourceKind::Upload,
                    location: path.to_string_lossy().into_owned(),
                })
            }
            SourceRequest::Camera(url) => resolve_camera(&url),
        }
    }

    /// Resolve a path to an existing media file
    ///
    /// Relative paths are taken relative to the upload directory. The file
    /// must exist and lie under a media root after symlinks are resolved.
    pub async fn resolve_existing(&self, path: &str) -> Result<InputDescriptor> {
        let path = path.trim();
        if path.is_empty() {
            return Err(Error::validation("Either file or camera_url is required"));
        }

        let candidate = Path::new(path);
        let candidate = if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.config.upload_dir.join(candidate)
        };

        let not_found = || Error::not_found("Video file not found");
        let canonical = tokio::fs::canonicalize(&candidate)
            .await
            .map_err(|_| not_found())?;
        if !self.is_within_roots(&canonical).await {
            tracing::warn!(path = %candidate.display(), "Rejected media path outside media roots");
            return Err(not_found());
        }
        let meta = tokio::fs::metadata(&canonical)
            .await
            .map_err(|_| not_found())?;
        if !meta.is_file() {
            return Err(not_found());
        }

        Ok(InputDescriptor {
            kind: SourceKind::File,
            location: canonical.to_string_lossy().into_owned(),
        })
    }

    /// Store an upload under a collision-free name; returns the final path
    pub async fn store_upload(&self, filename: &str, data: &[u8]) -> Result<PathBuf> {
        let name = sanitize_filename(filename);
        if name.is_empty() {
            return Err(Error::validation("No file selected"));
        }
        if !self.is_allowed(Path::new(&name)) {
            return Err(Error::validation("File type not allowed"));
        }

        let dir = &self.config.upload_dir;
        tokio::fs::create_dir_all(dir)
            .await
            .map_err(|e| Error::io(dir, e))?;

        for attempt in 0..MAX_NAME_ATTEMPTS {
            let path = dir.join(numbered_name(&name, attempt));
            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(Error::io(&path, e)),
            };

            let written = async {
                file.write_all(data).await?;
                file.flush().await
            }
            .await;
            if let Err(e) = written {
                let _ = tokio::fs::remove_file(&path).await;
                return Err(Error::io(&path, e));
            }

            tracing::info!(path = %path.display(), bytes = data.len(), "Stored upload");
            return Ok(path);
        }

        Err(Error::validation("File already exists"))
    }

    /// Media files directly inside the upload directory, sorted by name
    pub async fn list_media(&self) -> Result<Vec<String>> {
        let dir = &self.config.upload_dir;
        let mut entries = match tokio::fs::read_dir(dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(Error::io(dir, e)),
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await.map_err(|e| Error::io(dir, e))? {
            let path = entry.path();
            let is_file = entry.file_type().await.map(|t| t.is_file()).unwrap_or(false);
            if is_file && self.is_allowed(&path) {
                files.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        files.sort();
        Ok(files)
    }

    /// Whether a path has an allowed media extension
    pub fn is_allowed(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|e| e.to_str())
            .map(|e| {
                let e = e.to_ascii_lowercase();
                self.config.allowed_extensions.iter().any(|a| *a == e)
            })
            .unwrap_or(false)
    }

    /// Canonical forms of all media roots that exist
    pub(super) async fn canonical_roots(&self) -> Vec<PathBuf> {
        let mut roots = Vec::new();
        let all = std::iter::once(&self.config.upload_dir).chain(self.config.extra_roots.iter());
        for root in all {
            if let Ok(canonical) = tokio::fs::canonicalize(root).await {
                roots.push(canonical);
            }
        }
        roots
    }

    pub(super) async fn is_within_roots(&self, canonical: &Path) -> bool {
        self.canonical_roots()
            .await
            .iter()
            .any(|root| canonical.starts_with(root))
    }
}

/// Validate a camera URL
fn resolve_camera(url: &str) -> Result<InputDescriptor> {
    let url = url.trim();
    let rest = url
        .strip_prefix("rtsp://")
        .or_else(|| url.strip_prefix("rtmp://"))
        .ok_or_else(|| Error::validation("Camera URL must start with rtsp:// or rtmp://"))?;
    if rest.is_empty() || rest.starts_with('/') {
        return Err(Error::validation("Camera URL has no host"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(Error::validation("Camera URL must not contain whitespace"));
    }

    Ok(InputDescriptor::camera(url))
}

/// Reduce a client-supplied file name to a safe single path component
pub fn sanitize_filename(filename: &str) -> String {
    let base = filename
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or_default()
        .trim();

    let cleaned: String = base
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();

    cleaned.trim_start_matches(['.', '_']).to_string()
}

/// "clip.mp4" -> "clip-2.mp4" for attempt 2
fn numbered_name(name: &str, attempt: u32) -> String {
    if attempt == 0 {
        return name.to_string();
    }
    match name.rsplit_once('.') {
        Some((stem, ext)) => format!("{}-{}.{}", stem, attempt, ext),
        None => format!("{}-{}", name, attempt),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn resolver(dir: &Path) -> MediaResolver {
        MediaResolver::new(ResolverConfig::new(dir))
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(sanitize_filename("../../etc/passwd"), "passwd");
        assert_eq!(sanitize_filename("C:\\videos\\My Clip.mp4"), "My_Clip.mp4");
        assert_eq!(sanitize_filename(".hidden.mkv"), "hidden.mkv");
        assert_eq!(sanitize_filename("   "), "");
    }

    #[test]
    fn test_camera_urls() {
        let input = resolve_camera("rtsp://cam1/live").unwrap();
        assert_eq!(input.kind, SourceKind::Camera);
        assert_eq!(input.label(), "Camera: rtsp://cam1/live");

        assert!(resolve_camera("rtmp://encoder:1935/app/key").is_ok());

        for bad in ["http://cam1/live", "cam1/live", "rtsp://", "rtsp:///live", "rtsp://a b"] {
            let err = resolve_camera(bad).unwrap_err();
            assert_eq!(err.kind(), ErrorKind::Validation, "{}", bad);
        }
    }

    #[tokio::test]
    async fn test_upload_collision_safe() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());

        let first = resolver.store_upload("clip.mp4", b"one").await.unwrap();
        let second = resolver.store_upload("clip.mp4", b"two").await.unwrap();

        assert_eq!(first.file_name().unwrap(), "clip.mp4");
        assert_eq!(second.file_name().unwrap(), "clip-1.mp4");
        assert_eq!(tokio::fs::read(&first).await.unwrap(), b"one");
        assert_eq!(tokio::fs::read(&second).await.unwrap(), b"two");
    }

    #[tokio::test]
    async fn test_upload_rejects_extension() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());

        let err = resolver.store_upload("notes.txt", b"x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        let err = resolver.store_upload("", b"x").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn test_resolve_upload_request() {
        let dir = tempfile::tempdir().unwrap();
        let resolver = resolver(dir.path());

        let input = resolver
            .resolve(SourceRequest::Upload {
                filename: "intro.webm".into(),
                data: bytes::Bytes::from_static(b"webm"),
            })
            .await
            .unwrap();
        assert_eq!(input.kind, SourceKind::Upload);
        assert!(input.location.ends_with("intro.webm"));
    }

    #[tokio::test]
    async fn test_resolve_existing() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("loop.mkv"), b"mkv").unwrap();
        let resolver = resolver(dir.path());

        let relative = resolver.resolve_existing("loop.mkv").await.unwrap();
        assert_eq!(relative.kind, SourceKind::File);

        let absolute = dir.path().join("loop.mkv");
        let absolute = resolver
            .resolve_existing(absolute.to_str().unwrap())
            .await
            .unwrap();
        assert_eq!(relative, absolute);

        let err = resolver.resolve_existing("missing.mkv").await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[tokio::test]
    async fn test_resolve_existing_outside_roots() {
        let library = tempfile::tempdir().unwrap();
        let elsewhere = tempfile::tempdir().unwrap();
        let outside = elsewhere.path().join("secret.mp4");
        std::fs::write(&outside, b"mp4").unwrap();

        let resolver = resolver(library.path());
        let err = resolver
            .resolve_existing(outside.to_str().unwrap())
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        let err = resolver
            .resolve_existing("../secret.mp4")
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);

        // Allowed once its directory is a media root
        let resolver = MediaResolver::new(
            ResolverConfig::new(library.path()).extra_root(elsewhere.path()),
        );
        assert!(resolver
            .resolve_existing(outside.to_str().unwrap())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_list_media() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["b.mp4", "a.MOV", "notes.txt"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }
        std::fs::create_dir(dir.path().join("sub.mp4")).unwrap();

        let files = resolver(dir.path()).list_media().await.unwrap();
        assert_eq!(files, vec!["a.MOV".to_string(), "b.mp4".to_string()]);

        let missing = resolver(&dir.path().join("missing")).list_media().await.unwrap();
        assert!(missing.is_empty());
    }
}
