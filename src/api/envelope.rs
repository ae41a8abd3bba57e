//! Response envelope
//!
//! Every JSON response carries a `success` flag. Successful bodies are
//! flattened next to it; failures carry a single `error` string and a
//! status code chosen from the error's kind.

use axum::extract::multipart::{MultipartError, MultipartRejection};
use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::error::{Error, ErrorKind};

/// Result type for handlers
pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// A successful response body, flattened into the envelope
#[derive(Debug)]
pub struct Success<T>(pub T);

#[derive(Serialize)]
struct Envelope<T> {
    success: bool,
    #[serde(flatten)]
    body: T,
}

/// Body for responses that carry nothing but the flag
#[derive(Debug, Serialize)]
pub struct Empty {}

impl<T: Serialize> IntoResponse for Success<T> {
    fn into_response(self) -> Response {
        Json(Envelope {
            success: true,
            body: self.0,
        })
        .into_response()
    }
}

/// Error response
#[derive(Debug)]
pub struct ApiError(pub Error);

impl ApiError {
    fn status(&self) -> StatusCode {
        match self.0.kind() {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::InvalidTransition => StatusCode::CONFLICT,
            ErrorKind::Io
            | ErrorKind::Launch
            | ErrorKind::ReadinessTimeout
            | ErrorKind::Config
            | ErrorKind::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
struct Failure {
    success: bool,
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        } else {
            tracing::debug!(error = %self.0, status = %status, "Request rejected");
        }

        let body = Failure {
            success: false,
            error: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

impl From<Error> for ApiError {
    fn from(e: Error) -> Self {
        ApiError(e)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError(Error::validation(rejection.body_text()))
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError(Error::validation(rejection.body_text()))
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError(Error::not_found(rejection.body_text()))
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        ApiError(Error::validation(rejection.body_text()))
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        ApiError(Error::validation(e.body_text()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn body_json(response: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[derive(Serialize)]
    struct Files {
        files: Vec<&'static str>,
    }

    #[tokio::test]
    async fn test_success_is_flattened() {
        let response = Success(Files {
            files: vec!["a.mp4"],
        })
        .into_response();
        assert_eq!(response.status(), StatusCode::OK);

        let body = body_json(response).await;
        assert_eq!(body, serde_json::json!({"success": true, "files": ["a.mp4"]}));

        let body = body_json(Success(Empty {}).into_response()).await;
        assert_eq!(body, serde_json::json!({"success": true}));
    }

    #[tokio::test]
    async fn test_error_status_by_kind() {
        let cases = [
            (Error::validation("Stream name is required"), StatusCode::BAD_REQUEST),
            (Error::not_found("Recording not found"), StatusCode::NOT_FOUND),
            (Error::Launch("ffmpeg: not found".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            let message = error.to_string();
            let response = ApiError(error).into_response();
            assert_eq!(response.status(), status);

            let body = body_json(response).await;
            assert_eq!(body["success"], false);
            assert_eq!(body["error"], message);
        }
    }
}
