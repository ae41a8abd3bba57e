//! MediaMTX control API client
//!
//! MediaMTX is the media server every transcoder publishes into. Its HTTP
//! control API (port 9997 by default) reports per-path readiness and byte
//! counters, and lets us switch recording on for a path.

use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::{MetricsSource, PathSample};

/// Where the MediaMTX instance lives, from the transcoder's point of view
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct MediaMtxConfig {
    /// Host name transcoders publish to and the API is reached on
    pub host: String,
    pub api_port: u16,
    pub rtsp_port: u16,
    pub rtmp_port: u16,
    pub srt_port: u16,
}

impl Default for MediaMtxConfig {
    fn default() -> Self {
        Self {
            host: "mediamtx".into(),
            api_port: 9997,
            rtsp_port: 8554,
            rtmp_port: 1935,
            srt_port: 8890,
        }
    }
}

impl MediaMtxConfig {
    /// Set the host
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into();
        self
    }

    /// Set the control API port
    pub fn api_port(mut self, port: u16) -> Self {
        self.api_port = port;
        self
    }

    /// Base URL of the control API
    pub fn api_url(&self) -> String {
        format!("http://{}:{}", self.host, self.api_port)
    }
}

/// One entry of `/v3/paths/list`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PathItem {
    pub name: String,
    #[serde(default)]
    pub ready: bool,
    #[serde(default)]
    pub readers: Vec<serde_json::Value>,
    #[serde(default)]
    pub bytes_received: u64,
    #[serde(default)]
    pub bytes_sent: u64,
}

impl PathItem {
    fn sample(&self) -> PathSample {
        PathSample {
            ready: self.ready,
            viewers: u32::try_from(self.readers.len()).unwrap_or(u32::MAX),
            bytes_received: self.bytes_received,
            bytes_sent: self.bytes_sent,
        }
    }
}

#[derive(Debug, Deserialize)]
struct PathList {
    #[serde(default)]
    items: Vec<PathItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RecordPatch {
    record: bool,
    record_path: String,
}

/// Client for the MediaMTX control API
#[derive(Debug, Clone)]
pub struct MediaMtxClient {
    http: reqwest::Client,
    api_url: String,
}

impl MediaMtxClient {
    /// Build a client; every request is bounded by `timeout`
    pub fn new(config: &MediaMtxConfig, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            api_url: config.api_url(),
        })
    }

    /// All paths MediaMTX currently knows about
    pub async fn paths(&self) -> Result<Vec<PathItem>> {
        let url = format!("{}/v3/paths/list?itemsPerPage=1000", self.api_url);
        let list: PathList = self
            .http
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(list.items)
    }

    /// Turn recording on for a path
    ///
    /// Segments land in `<recordings_dir>/<path>/` named by start time.
    pub async fn enable_recording(&self, path: &str, recordings_dir: &Path) -> Result<()> {
        let url = format!("{}/v3/config/paths/patch/{}", self.api_url, path);
        let body = RecordPatch {
            record: true,
            record_path: record_path(recordings_dir, path),
        };
        self.http
            .patch(url)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        tracing::info!(path = %path, "Recording enabled");
        Ok(())
    }
}

#[async_trait]
impl MetricsSource for MediaMtxClient {
    async fn sample(&self) -> Result<HashMap<String, PathSample>> {
        let items = self.paths().await?;
        Ok(items
            .iter()
            .map(|item| (item.name.clone(), item.sample()))
            .collect())
    }
}

/// MediaMTX `recordPath` template for a path
fn record_path(recordings_dir: &Path, path: &str) -> String {
    format!(
        "{}/{}/%Y-%m-%d_%H-%M-%S-%f",
        recordings_dir.to_string_lossy().trim_end_matches('/'),
        path
    )
}
