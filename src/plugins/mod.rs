//! Plugin subsystem.
//!
//! # Data Flow
//! ```text
//! PluginCatalog (filled at init: native extensions + legacy fallbacks)
//!     → registry.rs reconcile(agent.plugins)
//!         plan: every enabled name must resolve in the catalog
//!         unload removed plugins (hook, sweep routes, drop config section)
//!         discover server version (once, only if something loads)
//!         load new plugins (gate, construct, config, load hook)
//!         bootstrap newly loaded plugins once
//!     → Reconciled { config, routes snapshot, loaded, unloaded, excluded }
//! ```
//!
//! # Design Decisions
//! - Plugins are compiled in and registered by name; there is no dynamic
//!   library loading
//! - A plugin only touches routes through [`PluginRoutes`], which tags and
//!   scopes them to the plugin, so unloading can always sweep what it left
//! - A failing plugin is excluded; the others and the agent carry on

pub mod catalog;
pub mod dashboard;
pub mod pgconf;
pub mod registry;
pub mod slowqueries;

use axum::http::Method;
use thiserror::Error;

use crate::config::{ConfigError, MergedConfiguration};
use crate::routing::{Route, RouteError, RouteTableBuilder};

pub use catalog::{Compat, ConfigProvider, PluginCatalog, PluginConstructor, PluginEntry, Tier};
pub use registry::{PluginRegistry, PluginState, ReconcileError, Reconciled};

#[derive(Debug, Error)]
pub enum PluginError {
    /// The plugin cannot run in this environment.
    #[error("{0}")]
    Precondition(String),

    #[error("server version {current} is older than the required {minimum}")]
    Incompatible { current: u32, minimum: u32 },

    /// A schema option declared outside the plugin's own section.
    #[error("option {section}.{name} is outside section [{plugin}]")]
    ForeignOption {
        plugin: String,
        section: String,
        name: String,
    },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Route(#[from] RouteError),
}

/// Lifecycle hooks of a plugin.
pub trait Plugin: Send {
    /// Register routes and read configuration. An error excludes the plugin.
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), PluginError>;

    /// Remove the plugin's routes. Whatever it leaves behind is swept anyway.
    fn unload(&mut self, routes: &mut PluginRoutes<'_>) -> Result<(), PluginError>;

    /// Runs once, after the first successful load.
    fn bootstrap(&mut self) -> Result<(), PluginError> {
        Ok(())
    }
}

/// What a plugin gets during `load`.
pub struct LoadContext<'a> {
    /// Configuration including the plugin's own section.
    pub config: &'a MergedConfiguration,
    pub routes: PluginRoutes<'a>,
    /// `None` when the server could not be reached.
    pub server_version: Option<u32>,
}

/// Route table access scoped to one plugin.
pub struct PluginRoutes<'a> {
    owner: &'a str,
    table: &'a mut RouteTableBuilder,
}

impl<'a> PluginRoutes<'a> {
    pub(crate) fn new(owner: &'a str, table: &'a mut RouteTableBuilder) -> Self {
        Self { owner, table }
    }

    pub fn owner(&self) -> &str {
        self.owner
    }

    pub fn add(&mut self, route: Route) {
        self.table.add(route.with_owner(self.owner));
    }

    /// Build and add a route in one go.
    pub fn add_new(
        &mut self,
        method: Method,
        pattern: &str,
        handler: crate::http::handler::Handler,
    ) -> Result<(), PluginError> {
        self.add(Route::new(method, pattern, handler)?);
        Ok(())
    }

    pub fn remove(&mut self, method: &Method, pattern: &str) -> usize {
        self.table.remove(self.owner, method, pattern)
    }

    /// Remove every route of this plugin.
    pub fn clear(&mut self) -> usize {
        self.table.remove_owner(self.owner)
    }

    pub fn count(&self) -> usize {
        self.table.count_owned(self.owner)
    }
}

/// The plugins shipped with the agent.
pub fn builtin_catalog() -> PluginCatalog {
    let mut catalog = PluginCatalog::new();
    catalog.register(dashboard::entry());
    catalog.register(pgconf::entry());
    catalog.register(slowqueries::entry());
    catalog
}
