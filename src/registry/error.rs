//! Registry error types
//!
//! Error types for stream registry operations.

use super::state::StreamStatus;
use super::stream::StreamId;

/// Error type for registry operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Stream not found
    StreamNotFound(StreamId),
    /// Requested status change is not an edge of the state machine
    InvalidTransition {
        id: StreamId,
        from: StreamStatus,
        to: StreamStatus,
    },
    /// Removal requested for a stream that is still live
    NotTerminal { id: StreamId, status: StreamStatus },
}

impl std::fmt::Display for RegistryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RegistryError::StreamNotFound(id) => write!(f, "Stream not found: {}", id),
            RegistryError::InvalidTransition { id, from, to } => {
                write!(f, "Invalid transition for stream {}: {} -> {}", id, from, to)
            }
            RegistryError::NotTerminal { id, status } => {
                write!(f, "Stream {} is still {}", id, status)
            }
        }
    }
}

impl std::error::Error for RegistryError {}
