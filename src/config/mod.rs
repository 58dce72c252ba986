//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! OptionSpec[] (core + application + plugins)
//!     → store.rs (resolve: args > environ > file > default)
//!     → validation.rs (coerce & check each chosen value)
//!     → MergedConfiguration (immutable, shared via Arc)
//!
//! On reload signal:
//!     loader.rs re-reads the recorded file
//!     → store.rs re-resolves every registered option
//!     → atomic swap of Arc<MergedConfiguration>
//! ```
//!
//! # Design Decisions
//! - Options are declared, not hard-coded structs: plugins add their own
//!   sections at runtime
//! - A resolved configuration is never mutated; a reload builds a new one
//! - Resolution either succeeds for every option or fails as a whole

pub mod loader;
pub mod options;
pub mod schema;
pub mod spec;
pub mod store;
pub mod validation;
pub mod watcher;

use std::path::PathBuf;

use thiserror::Error;

pub use loader::{ArgSource, ConfigSources, FileSource};
pub use schema::{AgentSettings, MergedConfiguration, Section};
pub use spec::{OptionSpec, Validator};
pub use store::ConfigStore;

/// Prefix of the environment variables options are read from.
pub const ENV_PREFIX: &str = "PULSE";

/// Section holding the agent's own options.
pub const CORE_SECTION: &str = "agent";

/// Where the configuration file is looked for when nothing says otherwise.
pub const DEFAULT_CONFIGFILE: &str = "/etc/pulse-agent/agent.toml";

/// Errors raised while declaring or resolving options.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("option {section}.{name} is declared twice")]
    DuplicateOption { section: String, name: String },

    #[error("invalid value for {section}.{name}: {reason}")]
    Invalid {
        section: String,
        name: String,
        reason: String,
    },

    #[error("missing required option {section}.{name}")]
    Missing { section: String, name: String },

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no configuration file was loaded")]
    NoFile,
}

impl ConfigError {
    /// The `(section, name)` the error is about, if any.
    pub fn key(&self) -> Option<(&str, &str)> {
        match self {
            ConfigError::DuplicateOption { section, name }
            | ConfigError::Invalid { section, name, .. }
            | ConfigError::Missing { section, name } => Some((section, name)),
            _ => None,
        }
    }

    /// The section the error is about, if any.
    pub fn section(&self) -> Option<&str> {
        self.key().map(|(section, _)| section)
    }
}
