//! Media library endpoints

use axum::extract::multipart::MultipartRejection;
use axum::extract::{Multipart, State};
use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::source::DirectoryListing;

use super::envelope::{ApiResult, Success};
use super::AppState;

/// Multipart field carrying the upload
const UPLOAD_FIELD: &str = "file";

#[derive(Serialize)]
pub struct MediaList {
    files: Vec<String>,
}

#[derive(Serialize)]
pub struct Uploaded {
    filename: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct BrowseRequest {
    path: Option<String>,
}

pub async fn list(State(state): State<AppState>) -> ApiResult<Success<MediaList>> {
    let files = state.manager.resolver().list_media().await?;
    Ok(Success(MediaList { files }))
}

pub async fn upload(
    State(state): State<AppState>,
    multipart: Result<Multipart, MultipartRejection>,
) -> ApiResult<Success<Uploaded>> {
    let mut multipart = multipart?;

    while let Some(field) = multipart.next_field().await? {
        if field.name() != Some(UPLOAD_FIELD) {
            continue;
        }
        let filename = field.file_name().unwrap_or_default().to_string();
        let data = field.bytes().await?;

        let path = state
            .manager
            .resolver()
            .store_upload(&filename, &data)
            .await?;
        let filename = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        return Ok(Success(Uploaded { filename }));
    }

    Err(Error::validation("No file provided").into())
}

pub async fn browse(
    State(state): State<AppState>,
    body: Bytes,
) -> ApiResult<Success<DirectoryListing>> {
    let request: BrowseRequest = if body.is_empty() {
        BrowseRequest::default()
    } else {
        serde_json::from_slice(&body)
            .map_err(|e| Error::validation(format!("Invalid request body: {}", e)))?
    };
    let listing = state.manager.resolver().browse(request.path.as_deref()).await?;
    Ok(Success(listing))
}
