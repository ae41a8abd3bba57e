//! Live stream metrics
//!
//! The collector periodically asks a [`MetricsSource`] (normally the
//! MediaMTX control API) for per-path counters and merges a [`LiveMetrics`]
//! sample into every running stream. Sampling is best-effort: a failed
//! cycle marks health `unknown` and is simply superseded by the next one.

pub mod collector;
pub mod sample;
pub mod source;

pub use collector::{MetricsCollector, MetricsConfig};
pub use sample::{health, HealthStatus, LiveMetrics, PathSample};
pub use source::MetricsSource;
