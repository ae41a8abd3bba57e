//! Error types
//!
//! All fallible operations in the crate return [`Result`]. Errors carry an
//! [`ErrorKind`] so callers (notably the HTTP layer) can decide how to
//! surface them without matching on every variant.

use std::path::PathBuf;

use crate::registry::{RegistryError, StreamId};

/// Result alias used throughout the crate
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad input from the caller
    Validation,
    /// Unknown stream id or path
    NotFound,
    /// Filesystem failure
    Io,
    /// The transcoder process could not be started
    Launch,
    /// The transcoder never reported readiness
    ReadinessTimeout,
    /// A lifecycle edge that the state machine forbids
    InvalidTransition,
    /// Invalid configuration
    Config,
    /// The MediaMTX control API failed
    Upstream,
}

/// Crate error type
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to launch process: {0}")]
    Launch(String),

    #[error("process did not become ready within {0:?}")]
    ReadinessTimeout(std::time::Duration),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("MediaMTX API error: {0}")]
    Upstream(#[from] reqwest::Error),
}

impl Error {
    /// Build a validation error from any message
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    /// Build a not-found error from any message
    pub fn not_found(msg: impl Into<String>) -> Self {
        Error::NotFound(msg.into())
    }

    /// Attach a path to an I/O error
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }

    /// Error for a stream id that is not in the registry
    pub fn stream_not_found(id: &StreamId) -> Self {
        Error::Registry(RegistryError::StreamNotFound(id.clone()))
    }

    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::Validation,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::Io { .. } => ErrorKind::Io,
            Error::Launch(_) => ErrorKind::Launch,
            Error::ReadinessTimeout(_) => ErrorKind::ReadinessTimeout,
            Error::Registry(RegistryError::StreamNotFound(_)) => ErrorKind::NotFound,
            Error::Registry(RegistryError::InvalidTransition { .. })
            | Error::Registry(RegistryError::NotTerminal { .. }) => ErrorKind::InvalidTransition,
            Error::Config(_) => ErrorKind::Config,
            Error::Upstream(_) => ErrorKind::Upstream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::StreamStatus;

    #[test]
    fn test_registry_errors_classify() {
        let id = StreamId::new();
        assert_eq!(Error::stream_not_found(&id).kind(), ErrorKind::NotFound);

        let err: Error = RegistryError::InvalidTransition {
            id,
            from: StreamStatus::Stopped,
            to: StreamStatus::Running,
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::InvalidTransition);
    }

    #[test]
    fn test_io_error_mentions_path() {
        let err = Error::io(
            "/streams/a.mp4",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );
        assert_eq!(err.kind(), ErrorKind::Io);
        assert!(err.to_string().contains("/streams/a.mp4"));
    }
}
