//! Stream endpoints

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::manager::StartRequest;
use crate::metrics::{HealthStatus, LiveMetrics};
use crate::registry::{AudioCodec, HwAccel, Protocol, Stream, StreamId, StreamStatus, StreamUrls};
use crate::source::SourceKind;
use crate::units::format_bytes;

use super::envelope::{ApiResult, Empty, Success};
use super::AppState;

/// Health sample with byte counters in human-readable form
#[derive(Debug, Serialize)]
pub struct MetricsView {
    pub source_ready: bool,
    pub viewers: u32,
    pub bytes_received: String,
    pub bytes_sent: String,
    pub health_status: HealthStatus,
    pub sampled_at: DateTime<Utc>,
}

impl From<&LiveMetrics> for MetricsView {
    fn from(m: &LiveMetrics) -> Self {
        Self {
            source_ready: m.source_ready,
            viewers: m.viewers,
            bytes_received: format_bytes(m.bytes_received),
            bytes_sent: format_bytes(m.bytes_sent),
            health_status: m.health_status,
            sampled_at: m.sampled_at,
        }
    }
}

/// A stream as the dashboard renders it
#[derive(Debug, Serialize)]
pub struct StreamView {
    pub id: StreamId,
    pub name: String,
    pub path: String,
    pub protocol: Protocol,
    pub status: StreamStatus,
    pub source_type: SourceKind,
    /// File path, or "Camera: <url>"
    pub file: String,
    pub bitrate: String,
    /// "W:H", or "Original" when not scaled
    pub resolution: String,
    pub hw_accel: HwAccel,
    pub audio_codec: AudioCodec,
    pub recording_enabled: bool,
    pub auth_user: Option<String>,
    pub rtsp_url: Option<String>,
    pub rtmp_url: Option<String>,
    pub srt_url: Option<String>,
    pub webrtc_url: Option<String>,
    pub hls_url: Option<String>,
    pub error: Option<String>,
    pub live_metrics: Option<MetricsView>,
    pub created_at: DateTime<Utc>,
}

impl From<Stream> for StreamView {
    fn from(stream: Stream) -> Self {
        let (rtsp_url, rtmp_url, srt_url, webrtc_url, hls_url) = match stream.urls {
            Some(StreamUrls {
                rtsp_url,
                rtmp_url,
                srt_url,
                webrtc_url,
                hls_url,
            }) => (
                Some(rtsp_url),
                Some(rtmp_url),
                Some(srt_url),
                Some(webrtc_url),
                Some(hls_url),
            ),
            None => (None, None, None, None, None),
        };

        Self {
            file: stream.source.label(),
            source_type: stream.source.kind,
            bitrate: stream.encoding.bitrate.as_str().to_string(),
            resolution: stream
                .encoding
                .resolution
                .map(|r| r.to_string())
                .unwrap_or_else(|| "Original".into()),
            hw_accel: stream.encoding.hw_accel,
            audio_codec: stream.encoding.audio_codec,
            live_metrics: stream.live_metrics.as_ref().map(MetricsView::from),
            id: stream.id,
            name: stream.name,
            path: stream.path,
            protocol: stream.protocol,
            status: stream.status,
            recording_enabled: stream.recording_enabled,
            auth_user: stream.auth_user,
            rtsp_url,
            rtmp_url,
            srt_url,
            webrtc_url,
            hls_url,
            error: stream.error,
            created_at: stream.created_at,
        }
    }
}

#[derive(Serialize)]
pub struct StreamList {
    streams: Vec<StreamView>,
}

#[derive(Serialize)]
pub struct StreamBody {
    stream: StreamView,
}

#[derive(Serialize)]
pub struct Started {
    stream_id: StreamId,
    stream: StreamView,
}

#[derive(Serialize)]
pub struct StopReport {
    stopped: usize,
    errors: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BulkStopRequest {
    stream_ids: Vec<String>,
}

pub async fn list(State(state): State<AppState>) -> Success<StreamList> {
    let streams = state
        .manager
        .registry()
        .list()
        .await
        .into_iter()
        .map(StreamView::from)
        .collect();
    Success(StreamList { streams })
}

pub async fn get(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Success<StreamBody>> {
    let stream = state.manager.get(&id).await?;
    Ok(Success(StreamBody {
        stream: stream.into(),
    }))
}

pub async fn start(
    State(state): State<AppState>,
    payload: Result<Json<StartRequest>, JsonRejection>,
) -> ApiResult<Success<Started>> {
    let Json(request) = payload?;
    let stream = state.manager.create(request).await?;
    Ok(Success(Started {
        stream_id: stream.id.clone(),
        stream: stream.into(),
    }))
}

pub async fn stop(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Success<Empty>> {
    let outcome = state.manager.stop(&id).await?;
    tracing::debug!(stream = %id, ?outcome, "Stop requested");
    Ok(Success(Empty {}))
}

pub async fn stop_all(State(state): State<AppState>) -> Success<StopReport> {
    let report = state.manager.stop_all().await;
    Success(StopReport {
        stopped: report.stopped.len(),
        errors: report.errors,
    })
}

pub async fn bulk_stop(
    State(state): State<AppState>,
    payload: Result<Json<BulkStopRequest>, JsonRejection>,
) -> ApiResult<Success<StopReport>> {
    let Json(request) = payload?;
    let report = state.manager.bulk_stop(&request.stream_ids).await?;
    Ok(Success(StopReport {
        stopped: report.stopped.len(),
        errors: report.errors,
    }))
}
