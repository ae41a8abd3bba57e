//! Metrics sources

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::Result;

use super::sample::PathSample;

/// Something that can report per-path counters for all published streams
///
/// One call covers every path; paths missing from the result are treated
/// as not ready with no viewers.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn sample(&self) -> Result<HashMap<String, PathSample>>;
}
