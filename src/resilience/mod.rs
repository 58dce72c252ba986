//! Retry pacing.
//!
//! The agent retries only one thing on its own: discovering the database
//! server version when it could not be reached. Retries are spaced by
//! exponential backoff so an unreachable server is not hammered.

pub mod backoff;

pub use backoff::{calculate_backoff, RetrySchedule};
