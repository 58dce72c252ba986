//! Request context handed to handlers.
//!
//! # Responsibilities
//! - Parse the query string into multi-valued parameters
//! - Read and decode the JSON body of POST requests, bounded in size
//! - Carry the path variables, headers and configuration snapshot
//!
//! # Design Decisions
//! - Body is read only for POST; other methods never see one
//! - A body that is not valid JSON fails the request before any handler runs
//! - The configuration is the snapshot captured when the connection was
//!   accepted, so a handler never sees two versions mid-request

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{header, HeaderMap, Method};
use serde_json::Value;
use uuid::Uuid;

use crate::config::MergedConfiguration;
use crate::http::handler::HandlerError;

/// Everything a handler gets to see of a request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: Uuid,
    pub method: Method,
    pub path: String,
    pub headers: HeaderMap,
    pub query: HashMap<String, Vec<String>>,
    pub body: Option<Value>,
    /// Decoded values of the route's capture segments, in order.
    pub vars: Vec<String>,
    pub config: Arc<MergedConfiguration>,
    pub peer: SocketAddr,
}

impl RequestContext {
    pub fn var(&self, index: usize) -> Option<&str> {
        self.vars.get(index).map(String::as_str)
    }

    /// First value of a query parameter.
    pub fn query_first(&self, key: &str) -> Option<&str> {
        self.query
            .get(key)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Field of the JSON body, if the body is an object holding it.
    pub fn body_field(&self, name: &str) -> Option<&Value> {
        self.body.as_ref().and_then(|b| b.get(name))
    }
}

/// Parse `a=1&a=2&b=x+y` into `{a: [1, 2], b: ["x y"]}`.
pub fn parse_query(query: Option<&str>) -> HashMap<String, Vec<String>> {
    let mut params: HashMap<String, Vec<String>> = HashMap::new();
    if let Some(query) = query {
        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            params.entry(key.into_owned()).or_default().push(value.into_owned());
        }
    }
    params
}

/// Read a POST body and decode it as JSON.
///
/// The declared `Content-Length` must be present and within `limit`.
pub async fn read_json_body(headers: &HeaderMap, body: Body, limit: usize) -> Result<Value, HandlerError> {
    let length = headers
        .get(header::CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<usize>().ok())
        .ok_or_else(|| invalid_json("missing or invalid Content-Length"))?;
    if length > limit {
        return Err(invalid_json(format!("body exceeds {} bytes", limit)));
    }

    let bytes = axum::body::to_bytes(body, length)
        .await
        .map_err(|e| invalid_json(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| invalid_json(e.to_string()))
}

fn invalid_json(reason: impl std::fmt::Display) -> HandlerError {
    HandlerError::bad_request(format!("Invalid json format: {}.", reason))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{HeaderValue, StatusCode};

    fn length(n: usize) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::CONTENT_LENGTH, HeaderValue::from(n));
        headers
    }

    #[test]
    fn query_is_multi_valued_and_decoded() {
        let q = parse_query(Some("filter=a&filter=b&name=Write+Ahead%20Log&empty="));
        assert_eq!(q["filter"], vec!["a".to_string(), "b".to_string()]);
        assert_eq!(q["name"], vec!["Write Ahead Log".to_string()]);
        assert_eq!(q["empty"], vec![String::new()]);
        assert!(parse_query(None).is_empty());
    }

    #[tokio::test]
    async fn json_body_is_decoded() {
        let raw = r#"{"sql": "SELECT 1"}"#;
        let value = read_json_body(&length(raw.len()), Body::from(raw), 1024)
            .await
            .unwrap();
        assert_eq!(value["sql"], "SELECT 1");
    }

    #[tokio::test]
    async fn malformed_body_is_bad_request() {
        let raw = "{not json";
        let err = read_json_body(&length(raw.len()), Body::from(raw), 1024)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        assert!(err.to_string().starts_with("Invalid json format:"));
    }

    #[tokio::test]
    async fn oversized_or_undeclared_body_is_rejected() {
        let raw = r#"{"a": 1}"#;
        let err = read_json_body(&length(raw.len()), Body::from(raw), 4)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);

        let err = read_json_body(&HeaderMap::new(), Body::from(raw), 1024)
            .await
            .unwrap_err();
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }
}
