//! OBS export endpoint

use axum::extract::{Path, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};

use crate::error::Error;
use crate::obs;

use super::envelope::ApiResult;
use super::recordings::attachment;
use super::AppState;

pub async fn export(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Response> {
    let (stream, auth) = state.manager.export_source(&id).await?;
    let scene = obs::scene_collection(&stream, auth.as_ref(), &state.playback);
    let body = serde_json::to_string_pretty(&scene)
        .map_err(|e| Error::Config(format!("failed to encode scene: {}", e)))?;

    let headers = [
        (header::CONTENT_TYPE, "application/json".to_string()),
        (header::CONTENT_DISPOSITION, attachment(&obs::export_filename(&stream))),
    ];
    Ok((headers, body).into_response())
}
