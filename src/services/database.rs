//! Database access interface.
//!
//! The agent needs two things from the monitored server: its version number
//! (to gate plugins) and the ability to run a query and get rows back as JSON
//! objects. Connection handling belongs to the implementation.

use futures_util::future::BoxFuture;
use serde_json::{Map, Value};
use thiserror::Error;

/// One result row, column name to value.
pub type Row = Map<String, Value>;

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("database unavailable: {0}")]
    Unavailable(String),

    #[error("query failed: {0}")]
    Query(String),
}

pub trait Database: Send + Sync {
    /// Numeric server version, e.g. `150004` for 15.4.
    fn server_version(&self) -> BoxFuture<'_, Result<u32, DatabaseError>>;

    fn query(&self, sql: String) -> BoxFuture<'_, Result<Vec<Row>, DatabaseError>>;
}

/// Used when no connector is configured: every call fails as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDatabase;

impl Database for UnavailableDatabase {
    fn server_version(&self) -> BoxFuture<'_, Result<u32, DatabaseError>> {
        Box::pin(async { Err(DatabaseError::Unavailable("no database connector configured".into())) })
    }

    fn query(&self, _sql: String) -> BoxFuture<'_, Result<Vec<Row>, DatabaseError>> {
        Box::pin(async { Err(DatabaseError::Unavailable("no database connector configured".into())) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unavailable_database_fails_every_call() {
        let db = UnavailableDatabase;
        assert!(matches!(db.server_version().await, Err(DatabaseError::Unavailable(_))));
        assert!(matches!(db.query("SELECT 1".into()).await, Err(DatabaseError::Unavailable(_))));
    }
}
