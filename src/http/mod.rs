//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP/TLS connection
//!     → server.rs (one request per connection, snapshots taken at accept)
//!     → routing (method + segments → handler, captured vars)
//!     → request.rs (query string, JSON body within the size limit)
//!     → handler.rs (plugin handler, JSON value or HandlerError)
//!     → response.rs (JSON body, CORS and Server headers)
//!     → Send to client
//! ```

pub mod handler;
pub mod request;
pub mod response;
pub mod server;

pub use handler::{handler, Handler, HandlerError, HandlerResult};
pub use request::RequestContext;
pub use server::{dispatch, ConnectionSnapshot, DispatchServer};
