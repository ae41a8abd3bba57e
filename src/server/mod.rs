//! HTTP server
//!
//! [`StreamServer`] wires the registry, supervisor, resolver, recordings
//! and MediaMTX client together, serves the API, and runs the background
//! tasks (registry cleanup, state persistence, metrics collection) for as
//! long as the server is up.

pub mod config;

use std::future::Future;
use std::sync::Arc;

use axum::Router;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use crate::api::{self, AppState};
use crate::error::{Error, Result};
use crate::manager::StreamManager;
use crate::mediamtx::MediaMtxClient;
use crate::metrics::MetricsCollector;
use crate::recording::RecordingManager;
use crate::registry::{persist, StreamRegistry};
use crate::source::MediaResolver;
use crate::supervisor::{FfmpegLauncher, Launcher, Supervisor};

pub use config::ServerConfig;

/// Stream manager HTTP server
pub struct StreamServer {
    config: ServerConfig,
    manager: Arc<StreamManager>,
    recordings: Arc<RecordingManager>,
    mediamtx: MediaMtxClient,
}

impl StreamServer {
    /// Create a server that launches ffmpeg
    pub fn new(config: ServerConfig) -> Result<Self> {
        let launcher = FfmpegLauncher::new(config.supervisor.program.clone(), config.mediamtx.clone());
        Self::with_launcher(config, Arc::new(launcher))
    }

    /// Create a server with a custom process launcher
    pub fn with_launcher(config: ServerConfig, launcher: Arc<dyn Launcher>) -> Result<Self> {
        let registry = Arc::new(StreamRegistry::with_config(config.registry.clone()));
        let supervisor = Arc::new(Supervisor::new(
            Arc::clone(&registry),
            launcher,
            config.supervisor.clone(),
        ));
        let resolver = Arc::new(MediaResolver::new(config.media.clone()));
        let mediamtx = MediaMtxClient::new(&config.mediamtx, config.metrics.request_timeout)?;

        let manager = StreamManager::new(registry, supervisor, resolver, config.recordings_dir.clone())
            .with_mediamtx(mediamtx.clone());

        Ok(Self {
            recordings: Arc::new(RecordingManager::new(config.recordings_dir.clone())),
            manager: Arc::new(manager),
            mediamtx,
            config,
        })
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn manager(&self) -> &Arc<StreamManager> {
        &self.manager
    }

    /// Build the HTTP router
    pub fn router(&self) -> Router {
        let state = AppState::new(Arc::clone(&self.manager), Arc::clone(&self.recordings));
        let mut router = api::router(state, self.config.upload_limit());

        if let Some(root) = &self.config.web_root {
            router = router.fallback_service(ServeDir::new(root));
        }

        router
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Create the directories the server owns and restore persisted streams
    ///
    /// Returns how many streams were restored.
    pub async fn restore(&self) -> Result<usize> {
        for dir in [&self.config.media.upload_dir, &self.config.recordings_dir] {
            tokio::fs::create_dir_all(dir)
                .await
                .map_err(|e| Error::io(dir, e))?;
        }

        let path = self.config.state_path();
        let persisted = match persist::load(&path).await {
            Ok(persisted) => persisted,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Ignoring unreadable state file");
                return Ok(0);
            }
        };
        if persisted.is_empty() {
            return Ok(0);
        }

        let restored = self.manager.restore(persisted).await;
        tracing::info!(path = %path.display(), restored, "Restored persisted streams");
        Ok(restored)
    }

    /// Run the server until the process is killed
    pub async fn run(&self) -> Result<()> {
        self.run_until(std::future::pending()).await
    }

    /// Bind the configured address and serve until `shutdown` completes
    pub async fn run_until<F>(&self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.bind_addr;
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| Error::io(addr.to_string(), e))?;
        self.serve(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` completes
    ///
    /// On shutdown every stream is stopped, bounded by the supervisor's
    /// grace period. The state file is written once more before the stops
    /// so the next start restores the streams that were live.
    pub async fn serve<F>(&self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local = listener.local_addr().map_err(|e| Error::io("listener", e))?;
        tracing::info!(addr = %local, "Stream manager listening");

        let registry = self.manager.registry();
        let cleanup_handle = registry.spawn_cleanup_task();
        let persist_handle = persist::spawn_persist_task(
            Arc::clone(registry),
            self.config.state_path(),
            self.config.persist_debounce,
        );
        let metrics_handle = MetricsCollector::new(
            Arc::clone(registry),
            Arc::new(self.mediamtx.clone()),
            self.config.metrics.clone(),
        )
        .spawn();

        let result = axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| Error::io(local.to_string(), e));
        tracing::info!("Shutdown signal received");

        // Flush whatever the debounced task has not written yet
        persist_handle.abort();
        let state_path = self.config.state_path();
        match persist::save_registry(registry, &state_path).await {
            Ok(count) => {
                tracing::debug!(path = %state_path.display(), streams = count, "Saved stream state");
            }
            Err(e) => {
                tracing::warn!(path = %state_path.display(), error = %e, "Failed to save stream state");
            }
        }
        metrics_handle.abort();
        cleanup_handle.abort();

        let bound = self.config.supervisor.stop_grace_period + self.config.supervisor.stop_ack_timeout;
        self.manager.shutdown(bound).await;
        tracing::info!("All streams stopped");

        result
    }
}
