use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::{error::SummarizerError, web::uploads::UploadError};

/// Canonical JSON payload for error responses.
#[derive(Debug, Serialize, Clone)]
pub struct ApiMessage {
    pub code: String,
    pub message: String,
}

impl ApiMessage {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

pub type ApiError = (StatusCode, Json<ApiMessage>);

pub fn json_error(
    status: StatusCode,
    code: impl Into<String>,
    message: impl Into<String>,
) -> ApiError {
    (status, Json(ApiMessage::new(code, message)))
}

pub fn summarizer_error(err: &SummarizerError) -> ApiError {
    let code = err.code();
    json_error(code.http_status(), code.as_str(), err.user_message())
}

pub fn upload_error(err: &UploadError) -> ApiError {
    json_error(err.status(), "validation_error", err.message())
}

pub fn unauthorized(message: impl Into<String>) -> Response {
    (
        StatusCode::UNAUTHORIZED,
        [(axum::http::header::WWW_AUTHENTICATE, "Bearer")],
        Json(ApiMessage::new("not_authenticated", message)),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_failures_map_to_bad_gateway() {
        let (status, Json(body)) =
            summarizer_error(&SummarizerError::Fetch("connection refused".to_string()));
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body.code, "fetch_error");
        assert!(!body.message.contains("refused"));
    }
}
