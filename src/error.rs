use axum::http::StatusCode;
use serde::Serialize;

pub type SummarizerResult<T> = Result<T, SummarizerError>;

/// Failure taxonomy shared by the extraction and completion stages.
///
/// The inner strings carry operator-facing detail. Only [`SummarizerError::user_message`]
/// is ever shown to end users.
#[derive(Debug, thiserror::Error)]
pub enum SummarizerError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("file processing failed: {0}")]
    FileProcessing(String),

    #[error("url fetch failed: {0}")]
    Fetch(String),

    #[error("tls certificate rejected: {0}")]
    Certificate(String),

    #[error("provider rejected credentials: {0}")]
    Authentication(String),

    #[error("provider unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Stable machine-readable category attached to failed results and API errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    ValidationError,
    FileProcessingError,
    FetchError,
    AuthenticationError,
    ServiceUnavailable,
    InternalError,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::ValidationError => "validation_error",
            ErrorCode::FileProcessingError => "file_processing_error",
            ErrorCode::FetchError => "fetch_error",
            ErrorCode::AuthenticationError => "authentication_error",
            ErrorCode::ServiceUnavailable => "service_unavailable",
            ErrorCode::InternalError => "internal_error",
        }
    }

    /// Reverse of [`ErrorCode::as_str`] for stored codes. Unknown values map to `InternalError`.
    pub fn from_code(value: &str) -> Self {
        match value {
            "validation_error" => ErrorCode::ValidationError,
            "file_processing_error" => ErrorCode::FileProcessingError,
            "fetch_error" => ErrorCode::FetchError,
            "authentication_error" => ErrorCode::AuthenticationError,
            "service_unavailable" => ErrorCode::ServiceUnavailable,
            _ => ErrorCode::InternalError,
        }
    }

    pub fn http_status(&self) -> StatusCode {
        match self {
            ErrorCode::ValidationError => StatusCode::BAD_REQUEST,
            ErrorCode::FileProcessingError => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::FetchError => StatusCode::BAD_GATEWAY,
            ErrorCode::AuthenticationError => StatusCode::BAD_GATEWAY,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

const FILE_PROCESSING_MESSAGE: &str =
    "We could not read text from this file. It may be corrupted, encrypted, or empty.";
const FETCH_MESSAGE: &str =
    "We could not retrieve content from that URL. Check the address and try again.";
const CERTIFICATE_MESSAGE: &str = "The site's SSL certificate could not be verified. \
     It may be self-signed or invalid.";
const AUTHENTICATION_MESSAGE: &str =
    "The summarization service is not configured correctly. Please contact the administrator.";
const UNAVAILABLE_MESSAGE: &str =
    "The summarization service is temporarily unavailable. Please try again later.";
const INTERNAL_MESSAGE: &str = "Something went wrong while summarizing. Please try again later.";

impl SummarizerError {
    pub fn validation(message: impl Into<String>) -> Self {
        SummarizerError::Validation(message.into())
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            SummarizerError::Validation(_) => ErrorCode::ValidationError,
            SummarizerError::FileProcessing(_) => ErrorCode::FileProcessingError,
            SummarizerError::Fetch(_) | SummarizerError::Certificate(_) => ErrorCode::FetchError,
            SummarizerError::Authentication(_) => ErrorCode::AuthenticationError,
            SummarizerError::ServiceUnavailable(_) => ErrorCode::ServiceUnavailable,
            SummarizerError::Internal(_) => ErrorCode::InternalError,
        }
    }

    /// Message safe to render to the end user.
    ///
    /// Validation messages are written for the user at the point of failure; every other
    /// category maps to a fixed sentence so parser or provider output never leaks.
    pub fn user_message(&self) -> String {
        match self {
            SummarizerError::Validation(message) => message.clone(),
            SummarizerError::FileProcessing(_) => FILE_PROCESSING_MESSAGE.to_string(),
            SummarizerError::Fetch(_) => FETCH_MESSAGE.to_string(),
            SummarizerError::Certificate(_) => CERTIFICATE_MESSAGE.to_string(),
            SummarizerError::Authentication(_) => AUTHENTICATION_MESSAGE.to_string(),
            SummarizerError::ServiceUnavailable(_) => UNAVAILABLE_MESSAGE.to_string(),
            SummarizerError::Internal(_) => INTERNAL_MESSAGE.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_message_hides_raw_detail() {
        let err = SummarizerError::FileProcessing("lopdf: invalid xref at 0x1f".to_string());
        let message = err.user_message();
        assert!(!message.contains("xref"));
        assert!(message.contains("file"));
    }

    #[test]
    fn validation_message_is_passed_through() {
        let err = SummarizerError::validation("Text cannot be empty.");
        assert_eq!(err.user_message(), "Text cannot be empty.");
        assert_eq!(err.code().http_status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn provider_outage_maps_to_503() {
        let err = SummarizerError::ServiceUnavailable("connect timeout".to_string());
        assert_eq!(err.code().http_status(), StatusCode::SERVICE_UNAVAILABLE);
        assert!(!err.user_message().contains("timeout"));
    }

    #[test]
    fn certificate_failures_are_fetch_errors_with_their_own_message() {
        let err = SummarizerError::Certificate("self signed certificate in chain".to_string());
        assert_eq!(err.code(), ErrorCode::FetchError);
        assert_eq!(err.code().http_status(), StatusCode::BAD_GATEWAY);
        assert!(err.user_message().contains("certificate"));
        assert_ne!(err.user_message(), SummarizerError::Fetch(String::new()).user_message());
    }

    #[test]
    fn unknown_stored_code_falls_back_to_internal() {
        assert_eq!(ErrorCode::from_code("something_new"), ErrorCode::InternalError);
        assert_eq!(ErrorCode::from_code("fetch_error"), ErrorCode::FetchError);
    }
}
