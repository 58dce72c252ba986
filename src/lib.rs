//! Plugin-based monitoring agent library.

pub mod config;
pub mod http;
pub mod net;
pub mod routing;

pub mod plugins;
pub mod services;

pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::{MergedConfiguration, CORE_SECTION};
pub use http::DispatchServer;
pub use lifecycle::{Agent, Shutdown};
pub use plugins::{builtin_catalog, Plugin, PluginCatalog};
