//! Periodic metrics collection

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::time::MissedTickBehavior;

use crate::registry::StreamRegistry;

use super::sample::LiveMetrics;
use super::source::MetricsSource;

/// Metrics collector configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    /// Sampling interval
    #[serde(with = "crate::server::config::secs")]
    pub interval: Duration,

    /// Flat counters for longer than this mark a ready stream as waiting
    #[serde(with = "crate::server::config::secs")]
    pub stall_after: Duration,

    /// Timeout for one sampling request
    #[serde(with = "crate::server::config::secs")]
    pub request_timeout: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            stall_after: Duration::from_secs(10),
            request_timeout: Duration::from_secs(2),
        }
    }
}

impl MetricsConfig {
    /// Set the sampling interval
    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Set the stall threshold
    pub fn stall_after(mut self, stall_after: Duration) -> Self {
        self.stall_after = stall_after;
        self
    }
}

/// Samples every running stream and merges the result into the registry
pub struct MetricsCollector {
    registry: Arc<StreamRegistry>,
    source: Arc<dyn MetricsSource>,
    config: MetricsConfig,
}

impl MetricsCollector {
    pub fn new(
        registry: Arc<StreamRegistry>,
        source: Arc<dyn MetricsSource>,
        config: MetricsConfig,
    ) -> Self {
        Self {
            registry,
            source,
            config,
        }
    }

    /// Run one sampling cycle; returns how many streams were updated
    ///
    /// A failed sample marks every running stream `unknown` for this cycle
    /// and never touches its status.
    pub async fn collect_once(&self) -> usize {
        let running = self.registry.running_streams().await;
        if running.is_empty() {
            return 0;
        }

        let sampled =
            match tokio::time::timeout(self.config.request_timeout, self.source.sample()).await {
                Ok(Ok(paths)) => Some(paths),
                Ok(Err(e)) => {
                    tracing::debug!(error = %e, "Metrics sample failed");
                    None
                }
                Err(_) => {
                    tracing::debug!("Metrics sample timed out");
                    None
                }
            };

        let stall_after = self.config.stall_after;
        let mut updated = 0;
        for stream in running {
            let merged = match &sampled {
                Some(paths) => {
                    let sample = paths.get(&stream.path).copied().unwrap_or_default();
                    self.registry
                        .update_metrics(&stream.id, |prev, running_for| {
                            LiveMetrics::assess(prev, sample, running_for, stall_after)
                        })
                        .await
                }
                None => {
                    self.registry
                        .update_metrics(&stream.id, |prev, _| LiveMetrics::unknown(prev))
                        .await
                }
            };
            if merged {
                updated += 1;
            }
        }
        updated
    }

    /// Spawn the collection loop
    ///
    /// Missed ticks are skipped, never replayed.
    pub fn spawn(self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.config.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                let updated = self.collect_once().await;
                tracing::trace!(streams = updated, "Metrics cycle complete");
            }
        })
    }
}
