//! Server configuration

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::mediamtx::MediaMtxConfig;
use crate::metrics::MetricsConfig;
use crate::registry::RegistryConfig;
use crate::source::ResolverConfig;
use crate::supervisor::SupervisorConfig;

/// Name of the state file kept in the media directory by default
pub const STATE_FILE_NAME: &str = "streams_config.json";

/// Server configuration options
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP API binds to
    pub bind_addr: SocketAddr,

    /// Media library: upload directory, extra roots, extensions
    pub media: ResolverConfig,

    /// Where MediaMTX writes recordings
    pub recordings_dir: PathBuf,

    /// Persisted stream state; defaults to `<upload dir>/streams_config.json`
    pub state_file: Option<PathBuf>,

    /// Static dashboard files served at `/`
    pub web_root: Option<PathBuf>,

    /// Largest accepted upload in bytes
    pub max_upload_bytes: u64,

    /// Delay between a registry change and the state file write
    #[serde(with = "secs")]
    pub persist_debounce: Duration,

    /// MediaMTX location
    pub mediamtx: MediaMtxConfig,

    /// Stream registry options
    pub registry: RegistryConfig,

    /// Process supervision options
    pub supervisor: SupervisorConfig,

    /// Metrics collection options
    pub metrics: MetricsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 5000)),
            media: ResolverConfig::default(),
            recordings_dir: PathBuf::from("/recordings"),
            state_file: None,
            web_root: None,
            max_upload_bytes: 5 * 1024 * 1024 * 1024, // 5GB
            persist_debounce: Duration::from_secs(1),
            mediamtx: MediaMtxConfig::default(),
            registry: RegistryConfig::default(),
            supervisor: SupervisorConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Load a TOML config file; missing keys keep their defaults
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        Self::from_toml(&text)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Parse a TOML document
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Set the bind address
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.bind_addr = addr;
        self
    }

    /// Set the upload directory
    pub fn media_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.media.upload_dir = dir.into();
        self
    }

    /// Set the recordings directory
    pub fn recordings_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.recordings_dir = dir.into();
        self
    }

    /// Set the state file
    pub fn state_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_file = Some(path.into());
        self
    }

    /// Serve static files from a directory
    pub fn web_root(mut self, dir: impl Into<PathBuf>) -> Self {
        self.web_root = Some(dir.into());
        self
    }

    /// Set the host viewers use to reach MediaMTX
    pub fn public_host(mut self, host: impl Into<String>) -> Self {
        self.registry.playback.public_host = host.into();
        self
    }

    /// Set the host transcoders and the API client use to reach MediaMTX
    pub fn mediamtx_host(mut self, host: impl Into<String>) -> Self {
        self.mediamtx.host = host.into();
        self
    }

    /// Effective state file path
    pub fn state_path(&self) -> PathBuf {
        self.state_file
            .clone()
            .unwrap_or_else(|| self.media.upload_dir.join(STATE_FILE_NAME))
    }

    /// Upload limit as a body size
    pub fn upload_limit(&self) -> usize {
        usize::try_from(self.max_upload_bytes).unwrap_or(usize::MAX)
    }
}

/// (De)serialize a [`Duration`] as whole seconds, or fractional seconds
/// when given as a float
pub mod secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_f64(value.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Secs {
            Whole(u64),
            Fraction(f64),
        }

        match Secs::deserialize(deserializer)? {
            Secs::Whole(secs) => Ok(Duration::from_secs(secs)),
            Secs::Fraction(secs) => {
                Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
            }
        }
    }
}
