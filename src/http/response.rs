//! Response construction.
//!
//! # Responsibilities
//! - Serialize handler results as JSON
//! - Shape every error as `{"error": "<message>"}`
//! - Answer CORS preflight requests
//! - Stamp the headers every response carries (`Server`, CORS origin)

use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Value};

pub const ALLOWED_METHODS: &str = "POST, GET, DELETE, OPTIONS";
pub const ALLOWED_HEADERS: &str = "X-Requested-With, X-Session, Content-Type";
/// Preflight cache lifetime, in seconds (20 days).
pub const PREFLIGHT_MAX_AGE: u32 = 1_728_000;

pub fn server_header() -> HeaderValue {
    HeaderValue::from_static(concat!("pulse-agent/", env!("CARGO_PKG_VERSION")))
}

/// JSON response with the given status.
pub fn json(status: StatusCode, value: &Value) -> Response {
    stamp((status, Json(value)).into_response())
}

/// `{"error": message}` with the given status.
pub fn error(status: StatusCode, message: &str) -> Response {
    json(status, &json!({ "error": message }))
}

/// Answer to `OPTIONS`.
pub fn preflight() -> Response {
    let mut response = StatusCode::OK.into_response();
    let headers = response.headers_mut();
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_METHODS,
        HeaderValue::from_static(ALLOWED_METHODS),
    );
    headers.insert(
        header::ACCESS_CONTROL_ALLOW_HEADERS,
        HeaderValue::from_static(ALLOWED_HEADERS),
    );
    headers.insert(header::ACCESS_CONTROL_MAX_AGE, HeaderValue::from(PREFLIGHT_MAX_AGE));
    headers.insert(header::CONTENT_LENGTH, HeaderValue::from(0));
    stamp(response)
}

/// Empty `204`.
pub fn no_content() -> Response {
    stamp(StatusCode::NO_CONTENT.into_response())
}

fn stamp(mut response: Response) -> Response {
    let headers = response.headers_mut();
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::SERVER, server_header());
    response
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn error_body_shape() {
        let response = error(StatusCode::NOT_FOUND, "Not found.");
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "application/json");
        assert_eq!(response.headers()[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");

        let bytes = axum::body::to_bytes(response.into_body(), 1024).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({ "error": "Not found." }));
    }

    #[test]
    fn preflight_headers() {
        let response = preflight();
        assert_eq!(response.status(), StatusCode::OK);
        let h = response.headers();
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_ORIGIN], "*");
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_METHODS], ALLOWED_METHODS);
        assert_eq!(h[header::ACCESS_CONTROL_ALLOW_HEADERS], ALLOWED_HEADERS);
        assert_eq!(h[header::ACCESS_CONTROL_MAX_AGE], "1728000");
        assert!(h[header::SERVER].to_str().unwrap().starts_with("pulse-agent/"));
    }
}
