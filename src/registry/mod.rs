//! Stream registry
//!
//! The registry is the single source of truth for stream state. The API
//! layer reads snapshots from it, the supervisor drives status changes
//! through it, and the metrics collector merges health samples into it.
//!
//! # Architecture
//!
//! ```text
//!                          Arc<StreamRegistry>
//!                     ┌──────────────────────────┐
//!                     │ streams: ordered map<Id, │
//!                     │   Arc<RwLock<Entry {     │
//!                     │     config, status,      │
//!                     │     error, metrics }>>   │
//!                     │ >                        │
//!                     └────────────┬─────────────┘
//!                                  │
//!         ┌────────────────────────┼────────────────────────┐
//!         │                        │                        │
//!         ▼                        ▼                        ▼
//!     [API layer]            [Supervisor]          [Metrics collector]
//!     create / list          apply(event)          update_metrics()
//! ```
//!
//! The outer map lock is held only to look up or insert entries. Status
//! changes and metrics merges take the per-entry lock, which serializes all
//! writes for one stream without blocking the others.

pub mod config;
pub mod entry;
pub mod error;
pub mod persist;
pub mod state;
pub mod store;
pub mod stream;

pub use config::{PlaybackEndpoints, RegistryConfig};
pub use entry::StreamEntry;
pub use error::RegistryError;
pub use persist::PersistedStream;
pub use state::{StreamEvent, StreamStatus, Transition};
pub use store::{Applied, RunningStream, StreamRegistry};
pub use stream::{
    AudioCodec, Bitrate, EncodingConfig, HwAccel, Protocol, Resolution, Stream, StreamAuth,
    StreamConfig, StreamId, StreamUrls,
};
