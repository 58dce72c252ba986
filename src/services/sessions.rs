//! Client sessions.
//!
//! # Responsibilities
//! - Open, look up and close sessions identified by a 64-hex-digit id
//! - Expire sessions idle for longer than the configured TTL
//! - Check the `X-Session` header of requests that need a session
//!
//! # Design Decisions
//! - Lookups refresh the idle timer
//! - Expiry runs from the server's housekeeping tick, not per request

use std::time::{Duration, Instant};

use axum::http::HeaderMap;
use dashmap::DashMap;
use uuid::Uuid;

use crate::http::handler::HandlerError;

pub const SESSION_HEADER: &str = "X-Session";

pub trait SessionStore: Send + Sync {
    /// Whether `id` is an open session. Refreshes its idle timer.
    fn lookup(&self, id: &str) -> bool;

    /// Drop sessions idle for at least `ttl`. Returns how many were dropped.
    fn purge_expired(&self, ttl: Duration) -> usize;
}

#[derive(Debug)]
struct Session {
    username: String,
    last_seen: Instant,
}

/// In-process session table.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    sessions: DashMap<String, Session>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a session for `username` and return its id.
    pub fn open(&self, username: impl Into<String>) -> String {
        let id = format!("{}{}", Uuid::new_v4().simple(), Uuid::new_v4().simple());
        self.sessions.insert(
            id.clone(),
            Session {
                username: username.into(),
                last_seen: Instant::now(),
            },
        );
        id
    }

    pub fn close(&self, id: &str) -> bool {
        self.sessions.remove(id).is_some()
    }

    pub fn username(&self, id: &str) -> Option<String> {
        self.sessions.get(id).map(|s| s.username.clone())
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    #[cfg(test)]
    fn age(&self, id: &str, by: Duration) {
        if let Some(mut s) = self.sessions.get_mut(id) {
            s.last_seen -= by;
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn lookup(&self, id: &str) -> bool {
        match self.sessions.get_mut(id) {
            Some(mut session) => {
                session.last_seen = Instant::now();
                true
            }
            None => false,
        }
    }

    fn purge_expired(&self, ttl: Duration) -> usize {
        let before = self.sessions.len();
        self.sessions.retain(|_, s| s.last_seen.elapsed() < ttl);
        before.saturating_sub(self.sessions.len())
    }
}

/// Check the request's `X-Session` header against `store`.
///
/// Missing or unknown session: 401. Malformed id: 406.
pub fn require_session(headers: &HeaderMap, store: &dyn SessionStore) -> Result<String, HandlerError> {
    let raw = headers
        .get(SESSION_HEADER)
        .ok_or_else(|| HandlerError::unauthorized("Invalid session."))?;
    let id = raw
        .to_str()
        .ok()
        .filter(|id| is_valid_session_id(id))
        .ok_or_else(|| HandlerError::not_acceptable("Parameter 'X-Session' is malformed."))?;
    if !store.lookup(id) {
        return Err(HandlerError::unauthorized("Invalid session."));
    }
    Ok(id.to_string())
}

fn is_valid_session_id(id: &str) -> bool {
    id.len() == 64 && id.bytes().all(|b| b.is_ascii_hexdigit())
}
