#![forbid(unsafe_code)]

//! Response building shared by every endpoint: JSON bodies with an explicit
//! charset, the error envelope, and the CORS headers.

use axum::{
    http::{HeaderMap, HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tracing::error;

pub const JSON_CONTENT_TYPE: &str = "application/json; charset=utf-8";

pub const CORS_HEADERS: [(HeaderName, &str); 3] = [
    (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
    (header::ACCESS_CONTROL_ALLOW_METHODS, "GET, POST, OPTIONS"),
    (header::ACCESS_CONTROL_ALLOW_HEADERS, "Content-Type"),
];

pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

// Pre-rendered so the fallback path cannot fail itself.
const INTERNAL_ERROR_BODY: &str = r#"{"error":true,"message":"Internal server error"}"#;

/// Body of every non-2xx JSON response.
#[derive(Debug, Serialize)]
pub struct ErrorEnvelope<'a> {
    pub error: bool,
    pub message: &'a str,
}

pub fn json_response<T: Serialize>(status: StatusCode, payload: &T) -> Response {
    match serde_json::to_vec(payload) {
        Ok(body) => (status, [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)], body).into_response(),
        Err(err) => {
            error!(error = %err, "serializing response payload");
            internal_error_response()
        }
    }
}

pub fn error_response(status: StatusCode, message: &str) -> Response {
    json_response(
        status,
        &ErrorEnvelope {
            error: true,
            message,
        },
    )
}

pub fn internal_error_response() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        [(header::CONTENT_TYPE, JSON_CONTENT_TYPE)],
        INTERNAL_ERROR_BODY,
    )
        .into_response()
}

/// Overwrites any CORS headers a handler may have set.
pub fn apply_cors(headers: &mut HeaderMap) {
    for (name, value) in CORS_HEADERS {
        headers.insert(name, HeaderValue::from_static(value));
    }
}
