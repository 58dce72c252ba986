//! Collaborators the agent reaches through narrow interfaces.
//!
//! Plugins talk to the monitored database and check client sessions through
//! these traits; the agent only wires the concrete implementations in.

pub mod database;
pub mod sessions;

pub use database::{Database, DatabaseError, Row, UnavailableDatabase};
pub use sessions::{require_session, MemorySessionStore, SessionStore};
