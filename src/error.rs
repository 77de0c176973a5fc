#![forbid(unsafe_code)]

use std::any::Any;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::{debug, error};

use crate::response::{INTERNAL_ERROR_MESSAGE, error_response, internal_error_response};

/// Error returned by every handler. Client mistakes carry their own message;
/// anything else collapses into the generic 500 after being logged.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn missing_video_id() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Missing video ID")
    }

    pub fn missing_parameters() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "Missing parameters")
    }

    pub fn invalid_video_id() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Invalid video ID")
    }

    pub fn format_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Format not found")
    }

    pub fn endpoint_not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "Endpoint not found")
    }

    pub fn internal() -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_ERROR_MESSAGE)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Logs the full cause chain; the caller only ever sees the generic message.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("request failed: {err:#}");
        Self::internal()
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if self.status.is_client_error() {
            debug!(status = %self.status, message = %self.message, "rejected request");
        }
        error_response(self.status, &self.message)
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Handler for `CatchPanicLayer`: a panicking request still gets exactly one
/// well-formed 500 and the server keeps running.
pub fn panic_response(payload: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else {
        "unknown panic payload"
    };
    error!(panic = detail, "handler panicked");
    internal_error_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use axum::body::to_bytes;
    use serde_json::Value;

    #[tokio::test]
    async fn client_errors_keep_their_message() {
        let response = ApiError::format_not_found().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed["error"], true);
        assert_eq!(parsed["message"], "Format not found");
    }

    #[tokio::test]
    async fn anyhow_errors_hide_details() {
        let err: ApiError = anyhow!("secret upstream detail")
            .context("fetching info")
            .into();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.message(), INTERNAL_ERROR_MESSAGE);

        let body = to_bytes(err.into_response().into_body(), usize::MAX)
            .await
            .unwrap();
        assert!(!String::from_utf8_lossy(&body).contains("secret"));
    }

    #[test]
    fn panic_response_is_internal_error() {
        let response = panic_response(Box::new("boom"));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let response = panic_response(Box::new(String::from("boom")));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let response = panic_response(Box::new(42_u8));
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
