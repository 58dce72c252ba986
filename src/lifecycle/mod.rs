//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (startup.rs):
//!     Locate config file → Read → Resolve options → Logging
//!     → Reconcile plugins → Publish snapshots → Start listener
//!
//! Reload (reload.rs):
//!     SIGHUP / file change → ReloadTrigger (flag only)
//!     → ReloadCoordinator on the server tick → Agent::reload
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Stop accepting → Drain connections → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//!     SIGHUP → Request config reload
//! ```
//!
//! # Design Decisions
//! - Ordered startup: config first, then plugins, then listeners
//! - Ordered shutdown: stop accept, drain, unload plugins
//! - Shutdown has a deadline: in-flight requests are abandoned after it

pub mod context;
pub mod reload;
pub mod shutdown;
pub mod signals;
pub mod startup;

pub use context::{AgentStats, AppContext};
pub use reload::{ReloadCoordinator, ReloadTrigger};
pub use shutdown::Shutdown;
pub use startup::{Agent, AgentBuilder, ReloadError, ReloadReport, UserError};
