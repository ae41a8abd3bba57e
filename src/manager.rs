//! Stream manager
//!
//! Ties the resolver, registry, supervisor and MediaMTX client together
//! behind the operations the HTTP API exposes. Creation returns as soon as
//! the stream is registered in `starting`; the launch happens on a
//! background task and its outcome shows up in the stream's status.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;

use crate::error::{Error, Result};
use crate::mediamtx::MediaMtxClient;
use crate::registry::{
    AudioCodec, Bitrate, EncodingConfig, HwAccel, PersistedStream, Protocol, Resolution, Stream,
    StreamAuth, StreamConfig, StreamEvent, StreamId, StreamRegistry,
};
use crate::source::{MediaResolver, SourceKind, SourceRequest};
use crate::supervisor::{BulkStop, StopOutcome, Supervisor};

/// Body of a start request, as sent by the dashboard
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct StartRequest {
    pub file: Option<String>,
    pub camera_url: Option<String>,
    pub name: Option<String>,
    pub protocol: Option<String>,
    pub bitrate: Option<String>,
    pub resolution: Option<String>,
    pub hw_accel: Option<String>,
    pub audio_codec: Option<String>,
    pub enable_recording: bool,
    pub auth_user: Option<String>,
    pub auth_pass: Option<String>,
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

impl StartRequest {
    /// The source this request asks for; a camera URL wins over a file
    fn source(&self) -> Result<SourceRequest> {
        if let Some(url) = non_empty(&self.camera_url) {
            return Ok(SourceRequest::Camera(url.to_string()));
        }
        if let Some(file) = non_empty(&self.file) {
            return Ok(SourceRequest::Existing(file.to_string()));
        }
        Err(Error::validation("Either file or camera_url is required"))
    }

    /// Validate everything except the source
    fn encoding(&self) -> Result<(String, Protocol, EncodingConfig)> {
        let name = non_empty(&self.name)
            .ok_or_else(|| Error::validation("Stream name is required"))?
            .to_string();

        let protocol: Protocol = self.protocol.as_deref().unwrap_or_default().parse()?;
        let encoding = EncodingConfig {
            bitrate: self.bitrate.as_deref().unwrap_or_default().parse::<Bitrate>()?,
            resolution: Resolution::parse_optional(self.resolution.as_deref())?,
            hw_accel: self.hw_accel.as_deref().unwrap_or_default().parse::<HwAccel>()?,
            audio_codec: self
                .audio_codec
                .as_deref()
                .unwrap_or_default()
                .parse::<AudioCodec>()?,
        };
        Ok((name, protocol, encoding))
    }
}

/// Facade over the stream lifecycle components
pub struct StreamManager {
    registry: Arc<StreamRegistry>,
    supervisor: Arc<Supervisor>,
    resolver: Arc<MediaResolver>,
    mediamtx: Option<MediaMtxClient>,
    recordings_dir: PathBuf,
}

impl StreamManager {
    pub fn new(
        registry: Arc<StreamRegistry>,
        supervisor: Arc<Supervisor>,
        resolver: Arc<MediaResolver>,
        recordings_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            registry,
            supervisor,
            resolver,
            mediamtx: None,
            recordings_dir: recordings_dir.into(),
        }
    }

    /// Use a MediaMTX client for recording control
    pub fn with_mediamtx(mut self, client: MediaMtxClient) -> Self {
        self.mediamtx = Some(client);
        self
    }

    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }

    pub fn supervisor(&self) -> &Arc<Supervisor> {
        &self.supervisor
    }

    pub fn resolver(&self) -> &Arc<MediaResolver> {
        &self.resolver
    }

    /// Validate a start request, register the stream and launch it
    ///
    /// Validation and resolution errors are returned directly. Launch
    /// problems surface later through the stream's status.
    pub async fn create(&self, request: StartRequest) -> Result<Stream> {
        let (name, protocol, encoding) = request.encoding()?;
        let source = self.resolver.resolve(request.source()?).await?;

        let config = StreamConfig {
            name,
            source,
            protocol,
            encoding,
            recording_enabled: request.enable_recording,
            auth: StreamAuth::from_parts(request.auth_user.clone(), request.auth_pass.clone()),
        };
        let stream = self.registry.create(config).await?;
        tracing::info!(stream = %stream.id, name = %stream.name, source = %stream.source.label(), "Stream created");

        self.launch(&stream).await;
        Ok(stream)
    }

    /// Re-register persisted streams under their saved ids and launch them
    ///
    /// Streams whose source no longer resolves are skipped. Returns how many
    /// were restored.
    pub async fn restore(&self, persisted: Vec<PersistedStream>) -> usize {
        let mut restored = 0;
        for PersistedStream { id, mut config } in persisted {
            let request = match config.source.kind {
                SourceKind::Camera => SourceRequest::Camera(config.source.location.clone()),
                SourceKind::File | SourceKind::Upload => {
                    SourceRequest::Existing(config.source.location.clone())
                }
            };
            match self.resolver.resolve(request).await {
                Ok(source) => config.source.location = source.location,
                Err(e) => {
                    tracing::warn!(stream = %id, name = %config.name, error = %e, "Skipping persisted stream");
                    continue;
                }
            }

            match self.registry.create_with_id(id.clone(), config).await {
                Ok(stream) => {
                    tracing::info!(stream = %id, name = %stream.name, "Stream restored");
                    self.launch(&stream).await;
                    restored += 1;
                }
                Err(e) => {
                    tracing::warn!(stream = %id, error = %e, "Could not restore stream");
                }
            }
        }
        restored
    }

    /// Hand the stream to the supervisor and, if asked, enable recording
    ///
    /// The recording patch runs on its own task so a slow MediaMTX cannot
    /// delay the launch or stretch the readiness deadline.
    async fn launch(&self, stream: &Stream) {
        if stream.recording_enabled {
            if let Some(client) = self.mediamtx.clone() {
                let id = stream.id.clone();
                let path = stream.path.clone();
                let recordings_dir = self.recordings_dir.clone();
                tokio::spawn(async move {
                    if let Err(e) = client.enable_recording(&path, &recordings_dir).await {
                        tracing::warn!(stream = %id, error = %e, "Could not configure recording");
                    }
                });
            }
        }

        if let Err(e) = self.supervisor.start(&stream.id) {
            tracing::error!(stream = %stream.id, error = %e, "Could not start supervision");
            let event = StreamEvent::LaunchFailed(e.to_string());
            if let Err(e) = self.registry.apply(&stream.id, event).await {
                tracing::debug!(stream = %stream.id, error = %e, "Could not record launch failure");
            }
        }
    }

    /// Get a stream snapshot by its textual id
    pub async fn get(&self, id: &str) -> Result<Stream> {
        let id: StreamId = id.parse()?;
        self.registry.get(&id).await
    }

    /// Stop one stream
    pub async fn stop(&self, id: &str) -> Result<StopOutcome> {
        let id: StreamId = id.parse()?;
        self.supervisor.stop(&id).await
    }

    /// Stop the listed streams independently
    ///
    /// Ids that do not parse or are unknown are reported as errors; streams
    /// that were already terminal are skipped silently.
    pub async fn bulk_stop(&self, ids: &[String]) -> Result<BulkStop> {
        if ids.is_empty() {
            return Err(Error::validation("No stream IDs provided"));
        }

        let mut parsed = Vec::with_capacity(ids.len());
        let mut errors = Vec::new();
        for raw in ids {
            match raw.parse::<StreamId>() {
                Ok(id) => parsed.push(id),
                Err(e) => errors.push(format!("Error stopping {}: {}", raw, e)),
            }
        }

        let mut report = self.supervisor.stop_many(parsed).await;
        report.errors.extend(errors);
        Ok(report)
    }

    /// Stop every live stream
    pub async fn stop_all(&self) -> BulkStop {
        self.supervisor.stop_all().await
    }

    /// Stop everything, waiting at most `bound` for processes to exit
    pub async fn shutdown(&self, bound: Duration) {
        self.supervisor.shutdown(bound).await;
    }

    /// Snapshot plus viewer credentials, for exports
    pub async fn export_source(&self, id: &str) -> Result<(Stream, Option<StreamAuth>)> {
        let id: StreamId = id.parse()?;
        let stream = self.registry.get(&id).await?;
        let auth = self.registry.stream_config(&id).await?.auth;
        Ok((stream, auth))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use crate::registry::StreamStatus;
    use crate::source::{InputDescriptor, ResolverConfig};
    use crate::supervisor::{Launcher, ProcessSpec, SupervisorConfig};

    struct ScriptLauncher(&'static str);

    impl Launcher for ScriptLauncher {
        fn spec(&self, _config: &StreamConfig) -> Result<ProcessSpec> {
            Ok(ProcessSpec::new("sh", ["-c", self.0]))
        }
    }

    fn manager(media_dir: &std::path::Path, script: &'static str) -> StreamManager {
        let registry = Arc::new(StreamRegistry::new());
        let config = SupervisorConfig::default()
            .readiness_timeout(Duration::from_secs(2))
            .stop_grace_period(Duration::from_millis(500));
        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&registry),
            Arc::new(ScriptLauncher(script)),
            config,
        ));
        let resolver = Arc::new(MediaResolver::new(ResolverConfig::new(media_dir)));
        StreamManager::new(registry, supervisor, resolver, media_dir.join("recordings"))
    }

    fn camera_request(name: &str) -> StartRequest {
        StartRequest {
            name: Some(name.into()),
            camera_url: Some("rtsp://cam1/live".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_validation() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), "exit 0");

        let err = manager
            .create(StartRequest {
                camera_url: Some("rtsp://cam1/live".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Stream name is required");

        let err = manager
            .create(StartRequest {
                name: Some("x".into()),
                ..Default::default()
            })
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        let mut bad_protocol = camera_request("x");
        bad_protocol.protocol = Some("webrtc".into());
        assert_eq!(
            manager.create(bad_protocol).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        let mut bad_camera = camera_request("x");
        bad_camera.camera_url = Some("http://cam1/live".into());
        assert_eq!(
            manager.create(bad_camera).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        let missing_file = StartRequest {
            name: Some("x".into()),
            file: Some("missing.mp4".into()),
            ..Default::default()
        };
        assert_eq!(
            manager.create(missing_file).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );

        assert_eq!(manager.registry().stream_count().await, 0);
    }

    #[tokio::test]
    async fn test_unknown_ids() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), "exit 0");

        assert_eq!(
            manager.get("not-a-uuid").await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            manager.stop(&StreamId::new().to_string()).await.unwrap_err().kind(),
            ErrorKind::NotFound
        );
        assert_eq!(
            manager.bulk_stop(&[]).await.unwrap_err().kind(),
            ErrorKind::Validation
        );

        let report = manager.bulk_stop(&["bogus".to_string()]).await.unwrap();
        assert!(report.stopped.is_empty());
        assert_eq!(report.errors.len(), 1);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_create_runs_and_stops() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("demo.mp4"), b"x").unwrap();
        let manager = manager(dir.path(), "echo 'Output #0' >&2; exec sleep 30");

        let stream = manager
            .create(StartRequest {
                name: Some("demo".into()),
                file: Some("demo.mp4".into()),
                bitrate: Some("1500k".into()),
                resolution: Some("Original".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        assert_eq!(stream.status, StreamStatus::Starting);
        assert_eq!(stream.source.kind, SourceKind::File);
        assert_eq!(stream.encoding.bitrate.kbps(), 1500);

        let id = stream.id.to_string();
        let mut status = StreamStatus::Starting;
        for _ in 0..100 {
            status = manager.get(&id).await.unwrap().status;
            if status == StreamStatus::Running {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, StreamStatus::Running);

        let report = manager.stop_all().await;
        assert_eq!(report.stopped, vec![stream.id.clone()]);
        manager.shutdown(Duration::from_secs(3)).await;
        assert_eq!(manager.get(&id).await.unwrap().status, StreamStatus::Stopped);
    }

    #[tokio::test]
    async fn test_restore_skips_unresolvable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("kept.mp4"), b"x").unwrap();
        let manager = manager(dir.path(), "exec sleep 30");

        let kept = PersistedStream {
            id: StreamId::new(),
            config: StreamConfig {
                name: "kept".into(),
                source: InputDescriptor {
                    kind: SourceKind::Upload,
                    location: dir.path().join("kept.mp4").to_string_lossy().into_owned(),
                },
                protocol: Protocol::Srt,
                encoding: EncodingConfig::default(),
                recording_enabled: false,
                auth: None,
            },
        };
        let mut gone = kept.clone();
        gone.id = StreamId::new();
        gone.config.name = "gone".into();
        gone.config.source.location = dir.path().join("gone.mp4").to_string_lossy().into_owned();

        let restored = manager.restore(vec![kept.clone(), gone]).await;
        assert_eq!(restored, 1);

        let stream = manager.registry().get(&kept.id).await.unwrap();
        assert_eq!(stream.name, "kept");
        assert_eq!(stream.source.kind, SourceKind::Upload);
        assert_eq!(stream.protocol, Protocol::Srt);

        manager.shutdown(Duration::from_secs(3)).await;
    }

    /// MediaMTX stand-in that accepts connections and never answers
    async fn silent_mediamtx() -> MediaMtxClient {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = crate::mediamtx::MediaMtxConfig::default()
            .host("127.0.0.1")
            .api_port(port);
        MediaMtxClient::new(&config, Duration::from_secs(3)).unwrap()
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_readiness_deadline_ignores_slow_recording_setup() {
        let dir = tempfile::tempdir().unwrap();
        let registry = Arc::new(StreamRegistry::new());
        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&registry),
            Arc::new(ScriptLauncher("exec sleep 30")),
            SupervisorConfig::default()
                .readiness_timeout(Duration::from_millis(500))
                .stop_grace_period(Duration::from_millis(500)),
        ));
        let resolver = Arc::new(MediaResolver::new(ResolverConfig::new(dir.path())));
        let manager = StreamManager::new(registry, supervisor, resolver, dir.path().join("recordings"))
            .with_mediamtx(silent_mediamtx().await);

        let mut request = camera_request("recorded");
        request.enable_recording = true;
        let started = tokio::time::Instant::now();
        let stream = manager.create(request).await.unwrap();
        assert!(stream.recording_enabled);

        let id = stream.id.to_string();
        let mut status = StreamStatus::Starting;
        while started.elapsed() < Duration::from_millis(1500) {
            status = manager.get(&id).await.unwrap().status;
            if status != StreamStatus::Starting {
                break;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert_eq!(status, StreamStatus::Error);
        assert!(started.elapsed() < Duration::from_millis(1500));

        manager.shutdown(Duration::from_secs(3)).await;
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_supervision_refusal_marks_error() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), "exec sleep 30");

        let stream = manager
            .registry()
            .create(StreamConfig {
                name: "taken".into(),
                source: InputDescriptor::camera("rtsp://cam1/live"),
                protocol: Protocol::Rtsp,
                encoding: EncodingConfig::default(),
                recording_enabled: false,
                auth: None,
            })
            .await
            .unwrap();
        manager.supervisor().start(&stream.id).unwrap();

        manager.launch(&stream).await;

        let failed = manager.registry().get(&stream.id).await.unwrap();
        assert_eq!(failed.status, StreamStatus::Error);
        assert!(failed.error.unwrap().contains("already has a running process"));

        manager.shutdown(Duration::from_secs(3)).await;
    }

    #[tokio::test]
    async fn test_export_source_includes_auth() {
        let dir = tempfile::tempdir().unwrap();
        let manager = manager(dir.path(), "exec sleep 30");

        let mut request = camera_request("cam");
        request.auth_user = Some("viewer".into());
        request.auth_pass = Some("pw".into());
        let stream = manager.create(request).await.unwrap();

        let (exported, auth) = manager.export_source(&stream.id.to_string()).await.unwrap();
        assert_eq!(exported.id, stream.id);
        assert_eq!(auth.unwrap().user, "viewer");
        assert_eq!(exported.auth_user.as_deref(), Some("viewer"));

        manager.shutdown(Duration::from_secs(3)).await;
    }
}
