//! Stream lifecycle manager for MediaMTX
//!
//! Starts, supervises and tears down ffmpeg relays that publish media files
//! or camera feeds into a MediaMTX instance, tracks their health, manages
//! recordings, and exposes all of it through a REST API.
//!
//! # Components
//!
//! - [`source`]: validates a requested input (file, upload, camera URL)
//! - [`registry`]: authoritative stream table and lifecycle state machine
//! - [`supervisor`]: spawns, watches and terminates transcoder processes
//! - [`metrics`]: periodic health sampling from the MediaMTX API
//! - [`recording`]: lists, serves and deletes recorded segments
//! - [`manager`]: the operations the API exposes, on top of the above
//! - [`server`] / [`api`]: HTTP server and handlers
//!
//! # Example
//!
//! ```no_run
//! use stream_manager::server::{ServerConfig, StreamServer};
//!
//! #[tokio::main]
//! async fn main() -> stream_manager::Result<()> {
//!     let config = ServerConfig::default()
//!         .media_dir("/srv/streams")
//!         .public_host("192.168.1.20");
//!
//!     let server = StreamServer::new(config)?;
//!     server.restore().await?;
//!     server
//!         .run_until(async {
//!             let _ = tokio::signal::ctrl_c().await;
//!         })
//!         .await
//! }
//! ```

pub mod api;
pub mod error;
pub mod manager;
pub mod mediamtx;
pub mod metrics;
pub mod obs;
pub mod recording;
pub mod registry;
pub mod server;
pub mod source;
pub mod supervisor;
pub mod units;

pub use error::{Error, ErrorKind, Result};
pub use manager::{StartRequest, StreamManager};
pub use registry::{Stream, StreamId, StreamRegistry, StreamStatus};
pub use server::{ServerConfig, StreamServer};
