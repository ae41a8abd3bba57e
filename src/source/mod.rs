//! Media source resolution
//!
//! A stream's input is one of:
//! - an existing media file under one of the configured media roots
//! - a file uploaded through the API, stored in the upload directory
//! - a camera or encoder URL (`rtsp://` or `rtmp://`)
//!
//! [`MediaResolver`] validates a request and turns it into an
//! [`InputDescriptor`] the supervisor can launch. Camera reachability is not
//! checked here; an unreachable camera surfaces later as a stream error.

pub mod browse;
pub mod resolver;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use browse::{BrowseItem, DirectoryListing};
pub use resolver::{MediaResolver, ResolverConfig, DEFAULT_EXTENSIONS};

/// Where a stream's input came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Existing file under a media root
    File,
    /// File uploaded through the API
    Upload,
    /// Live camera/encoder URL
    Camera,
}

/// A validated, playable input
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputDescriptor {
    /// Source kind
    pub kind: SourceKind,
    /// Absolute file path or camera URL
    pub location: String,
}

impl InputDescriptor {
    /// Describe a camera URL without validating it
    pub fn camera(url: impl Into<String>) -> Self {
        Self {
            kind: SourceKind::Camera,
            location: url.into(),
        }
    }

    /// Whether the input is a live feed (no looping, TCP transport)
    pub fn is_live(&self) -> bool {
        self.kind == SourceKind::Camera
    }

    /// Label shown in the dashboard's "file" column
    pub fn label(&self) -> String {
        match self.kind {
            SourceKind::Camera => format!("Camera: {}", self.location),
            SourceKind::File | SourceKind::Upload => self.location.clone(),
        }
    }
}

/// A request to resolve a source
#[derive(Debug, Clone)]
pub enum SourceRequest {
    /// Path to an existing file, absolute or relative to the upload dir
    Existing(String),
    /// Raw upload
    Upload { filename: String, data: Bytes },
    /// Camera or encoder URL
    Camera(String),
}
