//! Registry configuration

use std::time::Duration;

use serde::Deserialize;

/// Public endpoints MediaMTX serves playback on
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct PlaybackEndpoints {
    /// Host name or address viewers connect to
    pub public_host: String,
    pub rtsp_port: u16,
    pub rtmp_port: u16,
    pub srt_port: u16,
    pub webrtc_port: u16,
    pub hls_port: u16,
}

impl Default for PlaybackEndpoints {
    fn default() -> Self {
        Self {
            public_host: "localhost".into(),
            rtsp_port: 8554,
            rtmp_port: 1935,
            srt_port: 8890,
            webrtc_port: 8889,
            hls_port: 8888,
        }
    }
}

impl PlaybackEndpoints {
    /// Set the public host
    pub fn public_host(mut self, host: impl Into<String>) -> Self {
        self.public_host = host.into();
        self
    }
}

/// Configuration for the stream registry
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// How long a stopped or failed stream stays listed
    #[serde(with = "crate::server::config::secs")]
    pub terminal_retention: Duration,

    /// How often the cleanup task runs
    #[serde(with = "crate::server::config::secs")]
    pub cleanup_interval: Duration,

    /// Where viewers reach running streams
    pub playback: PlaybackEndpoints,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            terminal_retention: Duration::from_secs(60),
            cleanup_interval: Duration::from_secs(10),
            playback: PlaybackEndpoints::default(),
        }
    }
}

impl RegistryConfig {
    /// Set the retention window for terminal streams
    pub fn terminal_retention(mut self, retention: Duration) -> Self {
        self.terminal_retention = retention;
        self
    }

    /// Set the cleanup interval
    pub fn cleanup_interval(mut self, interval: Duration) -> Self {
        self.cleanup_interval = interval;
        self
    }

    /// Set the playback endpoints
    pub fn playback(mut self, playback: PlaybackEndpoints) -> Self {
        self.playback = playback;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = RegistryConfig::default();
        assert_eq!(config.terminal_retention, Duration::from_secs(60));
        assert_eq!(config.playback.rtsp_port, 8554);
        assert_eq!(config.playback.hls_port, 8888);
    }

    #[test]
    fn test_builder_chaining() {
        let config = RegistryConfig::default()
            .terminal_retention(Duration::from_millis(50))
            .cleanup_interval(Duration::from_millis(10))
            .playback(PlaybackEndpoints::default().public_host("192.168.1.20"));

        assert_eq!(config.terminal_retention, Duration::from_millis(50));
        assert_eq!(config.cleanup_interval, Duration::from_millis(10));
        assert_eq!(config.playback.public_host, "192.168.1.20");
    }
}
