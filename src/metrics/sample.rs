//! Health samples and the health rule

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Health of a running stream as seen by viewers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    /// Source is ready and data is flowing
    Healthy,
    /// Source not ready yet, or data stopped flowing
    Waiting,
    /// The last sampling attempt failed
    Unknown,
}

/// Raw counters for one MediaMTX path
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PathSample {
    /// Whether MediaMTX has a ready source on the path
    pub ready: bool,
    /// Number of readers
    pub viewers: u32,
    /// Bytes received from the publisher
    pub bytes_received: u64,
    /// Bytes sent to readers
    pub bytes_sent: u64,
}

/// Latest health information merged into a running stream
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LiveMetrics {
    pub source_ready: bool,
    pub viewers: u32,
    pub bytes_received: u64,
    pub bytes_sent: u64,
    pub health_status: HealthStatus,
    pub sampled_at: DateTime<Utc>,
}

impl LiveMetrics {
    /// Metrics for a cycle whose sample failed
    ///
    /// Byte counters from the previous sample are kept so stall detection
    /// still has a baseline on the next successful cycle. Readiness and
    /// viewers are not known for this cycle and read as not ready, none.
    pub fn unknown(previous: Option<&LiveMetrics>) -> Self {
        let mut metrics = previous.cloned().unwrap_or(LiveMetrics {
            source_ready: false,
            viewers: 0,
            bytes_received: 0,
            bytes_sent: 0,
            health_status: HealthStatus::Unknown,
            sampled_at: Utc::now(),
        });
        metrics.source_ready = false;
        metrics.viewers = 0;
        metrics.health_status = HealthStatus::Unknown;
        metrics.sampled_at = Utc::now();
        metrics
    }

    /// Build metrics from a successful sample
    pub fn assess(
        previous: Option<&LiveMetrics>,
        sample: PathSample,
        running_for: Duration,
        stall_after: Duration,
    ) -> Self {
        Self {
            source_ready: sample.ready,
            viewers: sample.viewers,
            bytes_received: sample.bytes_received,
            bytes_sent: sample.bytes_sent,
            health_status: health(previous, &sample, running_for, stall_after),
            sampled_at: Utc::now(),
        }
    }
}

/// The health rule
///
/// - not ready: `waiting`
/// - ready, counters advanced since the previous sample: `healthy`
/// - ready, counters flat, running longer than `stall_after`: `waiting`
/// - ready, no previous sample or still within `stall_after`: `healthy`
pub fn health(
    previous: Option<&LiveMetrics>,
    sample: &PathSample,
    running_for: Duration,
    stall_after: Duration,
) -> HealthStatus {
    if !sample.ready {
        return HealthStatus::Waiting;
    }

    let Some(previous) = previous else {
        return HealthStatus::Healthy;
    };
    let advanced = sample.bytes_received > previous.bytes_received
        || sample.bytes_sent > previous.bytes_sent;

    if advanced || running_for <= stall_after {
        HealthStatus::Healthy
    } else {
        HealthStatus::Waiting
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STALL: Duration = Duration::from_secs(10);

    fn sample(ready: bool, received: u64) -> PathSample {
        PathSample {
            ready,
            viewers: 1,
            bytes_received: received,
            bytes_sent: 0,
        }
    }

    #[test]
    fn test_not_ready_is_waiting() {
        let h = health(None, &sample(false, 0), Duration::from_secs(1), STALL);
        assert_eq!(h, HealthStatus::Waiting);
    }

    #[test]
    fn test_first_ready_sample_is_healthy() {
        let h = health(None, &sample(true, 100), Duration::from_secs(60), STALL);
        assert_eq!(h, HealthStatus::Healthy);
    }

    #[test]
    fn test_stall_detection() {
        let prev = LiveMetrics::assess(None, sample(true, 1000), Duration::from_secs(20), STALL);

        let flowing = health(Some(&prev), &sample(true, 2000), Duration::from_secs(25), STALL);
        assert_eq!(flowing, HealthStatus::Healthy);

        let stalled = health(Some(&prev), &sample(true, 1000), Duration::from_secs(25), STALL);
        assert_eq!(stalled, HealthStatus::Waiting);

        // Flat counters right after start are not yet a stall
        let early = health(Some(&prev), &sample(true, 1000), Duration::from_secs(5), STALL);
        assert_eq!(early, HealthStatus::Healthy);
    }

    #[test]
    fn test_unknown_keeps_counters() {
        let prev = LiveMetrics::assess(None, sample(true, 4096), Duration::from_secs(1), STALL);
        let unknown = LiveMetrics::unknown(Some(&prev));

        assert_eq!(unknown.health_status, HealthStatus::Unknown);
        assert_eq!(unknown.bytes_received, 4096);
        assert!(!unknown.source_ready);
        assert_eq!(unknown.viewers, 0);

        // The kept counters still serve as the stall baseline
        let resumed = health(Some(&unknown), &sample(true, 4096), Duration::from_secs(30), STALL);
        assert_eq!(resumed, HealthStatus::Waiting);
    }
}
