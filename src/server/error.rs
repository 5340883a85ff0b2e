use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;

use crate::error::VerifyError;

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("upload too large")]
    PayloadTooLarge,

    #[error("not found")]
    NotFound,

    #[error(transparent)]
    Verify(#[from] VerifyError),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Verify(e) if e.is_client_error() => StatusCode::BAD_REQUEST,
            ApiError::Verify(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::PayloadTooLarge => "PAYLOAD_TOO_LARGE",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Verify(VerifyError::InvalidEmbedding(_)) => "INVALID_EMBEDDING",
            ApiError::Verify(VerifyError::NoFaceDetected) => "NO_FACE_DETECTED",
            ApiError::Verify(VerifyError::InvalidImage(_)) => "INVALID_IMAGE",
            ApiError::Verify(VerifyError::Provider(_)) => "PROVIDER_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            log::error!("request failed: {}", self);
        }

        let body = Json(json!({
            "detail": self.to_string(),
            "code": self.error_code(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statuses() {
        let cases = [
            (ApiError::BadRequest("x".into()), StatusCode::BAD_REQUEST),
            (VerifyError::NoFaceDetected.into(), StatusCode::BAD_REQUEST),
            (
                VerifyError::InvalidEmbedding("x".into()).into(),
                StatusCode::BAD_REQUEST,
            ),
            (
                VerifyError::Provider("down".into()).into(),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::NotFound, StatusCode::NOT_FOUND),
        ];
        for (err, status) in cases {
            assert_eq!(err.status_code(), status, "{err}");
        }
    }
}
