//! Recording endpoints

use axum::body::Body;
use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use tokio_util::io::ReaderStream;

use crate::recording::RecordingGroup;

use super::envelope::{ApiResult, Empty, Success};
use super::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct ListQuery {
    stream: Option<String>,
}

#[derive(Serialize)]
pub struct RecordingList {
    recordings: Vec<RecordingGroup>,
}

pub async fn list(
    State(state): State<AppState>,
    query: Result<Query<ListQuery>, QueryRejection>,
) -> ApiResult<Success<RecordingList>> {
    let Query(query) = query?;
    let stream = query.stream.as_deref().filter(|s| !s.is_empty());
    let recordings = state.recordings.list(stream).await?;
    Ok(Success(RecordingList { recordings }))
}

pub async fn download(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Response> {
    let Path(path) = path?;
    let (file, name, len) = state.recordings.open(&path).await?;
    tracing::debug!(path = %path, bytes = len, "Serving recording");

    let headers = [
        (header::CONTENT_TYPE, "application/octet-stream".to_string()),
        (header::CONTENT_DISPOSITION, attachment(&name)),
        (header::CONTENT_LENGTH, len.to_string()),
    ];
    Ok((headers, Body::from_stream(ReaderStream::new(file))).into_response())
}

pub async fn delete(
    State(state): State<AppState>,
    path: Result<Path<String>, PathRejection>,
) -> ApiResult<Success<Empty>> {
    let Path(path) = path?;
    state.recordings.delete(&path).await?;
    Ok(Success(Empty {}))
}

/// `Content-Disposition` value for a download
///
/// Characters that cannot appear in a quoted header value are replaced.
pub(super) fn attachment(filename: &str) -> String {
    let safe: String = filename
        .chars()
        .map(|c| match c {
            '"' | '\\' => '_',
            c if c.is_ascii_graphic() || c == ' ' => c,
            _ => '_',
        })
        .collect();
    format!("attachment; filename=\"{}\"", safe)
}
