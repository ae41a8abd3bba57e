//! REST API
//!
//! JSON endpoints consumed by the dashboard. All responses use the
//! `{success, ...}` envelope from [`envelope`].
//!
//! | Method | Path                               | Handler                  |
//! |--------|------------------------------------|--------------------------|
//! | GET    | `/api/streams/list`                | [`streams::list`]        |
//! | GET    | `/api/streams/get/{id}`            | [`streams::get`]         |
//! | POST   | `/api/streams/start`               | [`streams::start`]       |
//! | POST   | `/api/streams/stop/{id}`           | [`streams::stop`]        |
//! | POST   | `/api/streams/stop-all`            | [`streams::stop_all`]    |
//! | POST   | `/api/streams/bulk-stop`           | [`streams::bulk_stop`]   |
//! | GET    | `/api/media/list`                  | [`media::list`]          |
//! | POST   | `/api/media/upload`                | [`media::upload`]        |
//! | POST   | `/api/files/browse`                | [`media::browse`]        |
//! | GET    | `/api/recordings/list`             | [`recordings::list`]     |
//! | GET    | `/api/recordings/download/{path}`  | [`recordings::download`] |
//! | DELETE | `/api/recordings/delete/{path}`    | [`recordings::delete`]   |
//! | GET    | `/api/obs/export/{id}`             | [`obs::export`]          |

pub mod envelope;
pub mod media;
pub mod obs;
pub mod recordings;
pub mod streams;

use std::sync::Arc;

use axum::extract::DefaultBodyLimit;
use axum::routing::{delete, get, post};
use axum::Router;

use crate::manager::StreamManager;
use crate::recording::RecordingManager;
use crate::registry::PlaybackEndpoints;

/// Shared handler state
#[derive(Clone)]
pub struct AppState {
    pub manager: Arc<StreamManager>,
    pub recordings: Arc<RecordingManager>,
    pub playback: PlaybackEndpoints,
}

impl AppState {
    pub fn new(manager: Arc<StreamManager>, recordings: Arc<RecordingManager>) -> Self {
        let playback = manager.registry().config().playback.clone();
        Self {
            manager,
            recordings,
            playback,
        }
    }
}

/// API routes; uploads may be up to `upload_limit` bytes
pub fn router(state: AppState, upload_limit: usize) -> Router {
    Router::new()
        .route("/api/streams/list", get(streams::list))
        .route("/api/streams/get/{id}", get(streams::get))
        .route("/api/streams/start", post(streams::start))
        .route("/api/streams/stop/{id}", post(streams::stop))
        .route("/api/streams/stop-all", post(streams::stop_all))
        .route("/api/streams/bulk-stop", post(streams::bulk_stop))
        .route("/api/media/list", get(media::list))
        .route(
            "/api/media/upload",
            post(media::upload).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/api/files/browse", post(media::browse))
        .route("/api/recordings/list", get(recordings::list))
        .route("/api/recordings/download/{*path}", get(recordings::download))
        .route("/api/recordings/delete/{*path}", delete(recordings::delete))
        .route("/api/obs/export/{id}", get(obs::export))
        .with_state(state)
}
