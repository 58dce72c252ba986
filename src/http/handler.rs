//! Handler contract.
//!
//! A handler receives a [`RequestContext`] and returns the JSON value to
//! send with `200`, or a [`HandlerError`] carrying the status to answer with.
//! Handlers are shared, immutable and may run concurrently.

use std::error::Error as StdError;
use std::future::Future;
use std::sync::Arc;

use axum::http::StatusCode;
use futures_util::future::BoxFuture;
use futures_util::FutureExt;
use serde_json::Value;
use thiserror::Error;

use crate::http::request::RequestContext;
use crate::services::database::DatabaseError;

pub type HandlerResult = Result<Value, HandlerError>;

/// Type-erased request handler.
pub type Handler = Arc<dyn Fn(RequestContext) -> BoxFuture<'static, HandlerResult> + Send + Sync>;

/// Wrap an async closure into a [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(RequestContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = HandlerResult> + Send + 'static,
{
    Arc::new(move |ctx| f(ctx).boxed())
}

/// Failure reported by a handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Answered as `{"error": message}` with this status.
    #[error("{message}")]
    Http { status: StatusCode, message: String },

    /// Logged, answered as a generic 500.
    #[error("{0}")]
    Internal(Box<dyn StdError + Send + Sync>),
}

impl HandlerError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        HandlerError::Http {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn not_acceptable(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_ACCEPTABLE, message)
    }

    pub fn internal(error: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        HandlerError::Internal(error.into())
    }

    /// Status the client will see.
    pub fn status(&self) -> StatusCode {
        match self {
            HandlerError::Http { status, .. } => *status,
            HandlerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<DatabaseError> for HandlerError {
    fn from(e: DatabaseError) -> Self {
        HandlerError::internal(e)
    }
}

impl From<std::io::Error> for HandlerError {
    fn from(e: std::io::Error) -> Self {
        HandlerError::internal(e)
    }
}
