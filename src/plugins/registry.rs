//! Plugin reconciliation.
//!
//! # Responsibilities
//! - Bring the set of loaded plugins in line with `agent.plugins`
//! - Gate legacy plugins on the database server version
//! - Register plugin configuration (schema or function) in the store
//! - Own the mutable route table and publish snapshots of it
//!
//! # Design Decisions
//! - Every enabled name is resolved before anything is touched, so an
//!   unknown plugin aborts the pass with no side effect
//! - One plugin failing (gate, config, load hook) excludes that plugin only
//! - Server version is asked at most once per pass and only when something
//!   is about to load; failures schedule a reload with backoff
//! - `reconcile` takes `&mut self`: it is only ever run by the task that
//!   owns the agent

use std::collections::BTreeMap;
use std::sync::Arc;

use thiserror::Error;

use crate::config::{ConfigError, ConfigStore, MergedConfiguration};
use crate::lifecycle::context::AppContext;
use crate::observability::metrics;
use crate::plugins::catalog::{ConfigProvider, PluginCatalog, PluginEntry};
use crate::plugins::{LoadContext, Plugin, PluginError, PluginRoutes};
use crate::resilience::backoff::RetrySchedule;
use crate::routing::{RouteTable, RouteTableBuilder};

/// Version discovery retry pacing, in milliseconds.
const VERSION_RETRY_BASE_MS: u64 = 1_000;
const VERSION_RETRY_MAX_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PluginState {
    /// Found in the catalog, not loaded (yet, or after a failed load).
    Discovered,
    /// Excluded by the server version gate.
    GatedOut,
    Loaded,
    Unloaded,
}

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("missing plugin: {0}")]
    UnknownPlugin(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Outcome of a reconciliation pass.
#[derive(Debug)]
pub struct Reconciled {
    pub config: MergedConfiguration,
    pub routes: Arc<RouteTable>,
    pub loaded: Vec<String>,
    pub unloaded: Vec<String>,
    /// Plugins that were meant to load but did not, with the reason.
    pub excluded: Vec<(String, String)>,
}

struct LoadedPlugin {
    instance: Box<dyn Plugin>,
    config: Option<ConfigProvider>,
}

enum Exclusion {
    GatedOut(String),
    Failed(PluginError),
}

pub struct PluginRegistry {
    catalog: PluginCatalog,
    context: AppContext,
    loaded: BTreeMap<String, LoadedPlugin>,
    states: BTreeMap<String, PluginState>,
    routes: RouteTableBuilder,
    version_retry: RetrySchedule,
}

impl PluginRegistry {
    pub fn new(catalog: PluginCatalog, context: AppContext) -> Self {
        Self {
            catalog,
            context,
            loaded: BTreeMap::new(),
            states: BTreeMap::new(),
            routes: RouteTableBuilder::new(),
            version_retry: RetrySchedule::new(VERSION_RETRY_BASE_MS, VERSION_RETRY_MAX_MS),
        }
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.states.get(name).copied()
    }

    pub fn loaded(&self) -> impl Iterator<Item = &str> {
        self.loaded.keys().map(String::as_str)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.loaded.contains_key(name)
    }

    pub fn routes(&self) -> RouteTable {
        self.routes.build()
    }

    /// Load and unload plugins so that the loaded set matches the
    /// `agent.plugins` list of `config`.
    ///
    /// `store` is the staged store `config` was resolved from; plugin specs
    /// and sections are added to and removed from it.
    pub async fn reconcile(
        &mut self,
        store: &mut ConfigStore,
        config: MergedConfiguration,
    ) -> Result<Reconciled, ReconcileError> {
        let mut desired: Vec<String> = Vec::new();
        for name in config.plugins() {
            if !desired.contains(&name) {
                desired.push(name);
            }
        }

        let mut to_load: Vec<PluginEntry> = Vec::new();
        for name in &desired {
            if self.loaded.contains_key(name) {
                continue;
            }
            let entry = self
                .catalog
                .lookup(name)
                .ok_or_else(|| ReconcileError::UnknownPlugin(name.clone()))?;
            to_load.push(entry.clone());
        }
        let to_unload: Vec<String> = self
            .loaded
            .keys()
            .filter(|name| !desired.contains(name))
            .cloned()
            .collect();

        let mut report = Reconciled {
            config,
            routes: Arc::new(RouteTable::empty()),
            loaded: Vec::new(),
            unloaded: Vec::new(),
            excluded: Vec::new(),
        };

        for name in to_unload {
            self.unload_one(&name, store);
            report.unloaded.push(name);
        }

        let mut contributed = self.refresh_functions(store);

        let server_version = if to_load.is_empty() {
            None
        } else {
            self.discover_version().await
        };

        for entry in &to_load {
            match self.load_one(entry, store, server_version) {
                Ok(provided) => {
                    contributed |= provided;
                    report.loaded.push(entry.name().to_string());
                }
                Err(Exclusion::GatedOut(reason)) => {
                    tracing::warn!(plugin = %entry.name(), reason = %reason, "Plugin excluded by version gate");
                    self.states.insert(entry.name().to_string(), PluginState::GatedOut);
                    report.excluded.push((entry.name().to_string(), reason));
                }
                Err(Exclusion::Failed(e)) => {
                    tracing::error!(plugin = %entry.name(), error = %e, "Failed to load plugin");
                    self.states.insert(entry.name().to_string(), PluginState::Discovered);
                    report.excluded.push((entry.name().to_string(), e.to_string()));
                }
            }
        }

        if contributed {
            report.config = store.resolve()?;
        }

        let mut dropped = false;
        for name in report.loaded.clone() {
            dropped |= !self.bootstrap_one(&name, store, &mut report);
        }
        // A failed bootstrap removed its section from the store.
        if dropped {
            report.config = store.resolve()?;
        }

        metrics::set_plugins_loaded(self.loaded.len());
        report.routes = Arc::new(self.routes.build());
        Ok(report)
    }

    /// Unload every plugin, for shutdown.
    pub fn unload_all(&mut self, store: &mut ConfigStore) {
        let names: Vec<String> = self.loaded.keys().cloned().collect();
        for name in names {
            self.unload_one(&name, store);
        }
        metrics::set_plugins_loaded(0);
    }

    fn unload_one(&mut self, name: &str, store: &mut ConfigStore) {
        let Some(mut plugin) = self.loaded.remove(name) else {
            return;
        };
        tracing::info!(plugin = %name, "Unloading plugin");

        let mut routes = PluginRoutes::new(name, &mut self.routes);
        if let Err(e) = plugin.instance.unload(&mut routes) {
            tracing::error!(plugin = %name, error = %e, "Plugin unload hook failed");
        }
        let leftover = self.routes.remove_owner(name);
        if leftover > 0 {
            tracing::warn!(plugin = %name, routes = leftover, "Plugin left routes behind on unload, removed");
        }
        store.remove_section(name);
        self.states.insert(name.to_string(), PluginState::Unloaded);
    }

    /// Re-run the configuration functions of plugins that stay loaded, so a
    /// reload picks up their new file values. A failure keeps the old values.
    fn refresh_functions(&mut self, store: &mut ConfigStore) -> bool {
        let mut ran = false;
        let Ok(current) = store.resolve() else {
            return false;
        };
        for (name, plugin) in &self.loaded {
            if let Some(ConfigProvider::Function(f)) = plugin.config {
                let computed = f(&current, raw_section(store, name));
                match computed {
                    Ok(values) => {
                        store.provide_section(name.clone(), values);
                        ran = true;
                    }
                    Err(e) => {
                        tracing::error!(plugin = %name, error = %e, "Plugin configuration rejected, keeping previous values");
                    }
                }
            }
        }
        ran
    }

    async fn discover_version(&mut self) -> Option<u32> {
        match self.context.database().server_version().await {
            Ok(version) => {
                self.version_retry.succeeded();
                tracing::debug!(server_version = version, "Database server version discovered");
                Some(version)
            }
            Err(e) => {
                let delay = self.version_retry.failed();
                tracing::error!(
                    error = %e,
                    retry_in = ?delay,
                    "Not able to get the database server version, scheduling a reload"
                );
                let trigger = self.context.reload_trigger().clone();
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    trigger.request();
                });
                None
            }
        }
    }

    /// Returns whether the plugin contributed configuration.
    fn load_one(
        &mut self,
        entry: &PluginEntry,
        store: &mut ConfigStore,
        server_version: Option<u32>,
    ) -> Result<bool, Exclusion> {
        let name = entry.name();
        tracing::info!(plugin = %name, tier = ?entry.tier(), "Loading plugin");
        self.states.insert(name.to_string(), PluginState::Discovered);

        if let (Some(compat), Some(version)) = (entry.compat(), server_version) {
            if version < compat.min_server_version {
                return Err(Exclusion::GatedOut(format!(
                    "server version {} is older than the required {}",
                    version, compat.min_server_version
                )));
            }
        }

        let mut instance = entry.construct(&self.context).map_err(Exclusion::Failed)?;

        let contributed = match entry.config() {
            None => false,
            Some(provider) => {
                if let Err(e) = register_config(name, provider, store) {
                    store.remove_section(name);
                    return Err(Exclusion::Failed(e));
                }
                true
            }
        };

        let config = match store.resolve() {
            Ok(config) => config,
            Err(e) => {
                store.remove_section(name);
                return Err(Exclusion::Failed(e.into()));
            }
        };

        let mut ctx = LoadContext {
            config: &config,
            routes: PluginRoutes::new(name, &mut self.routes),
            server_version,
        };
        if let Err(e) = instance.load(&mut ctx) {
            self.routes.remove_owner(name);
            store.remove_section(name);
            return Err(Exclusion::Failed(e));
        }

        tracing::debug!(plugin = %name, routes = self.routes.count_owned(name), "Plugin loaded");
        self.loaded.insert(
            name.to_string(),
            LoadedPlugin {
                instance,
                config: entry.config(),
            },
        );
        self.states.insert(name.to_string(), PluginState::Loaded);
        Ok(contributed)
    }

    /// Returns false when the bootstrap failed and the plugin was unloaded.
    fn bootstrap_one(&mut self, name: &str, store: &mut ConfigStore, report: &mut Reconciled) -> bool {
        let Some(plugin) = self.loaded.get_mut(name) else {
            return true;
        };
        match plugin.instance.bootstrap() {
            Ok(()) => true,
            Err(e) => {
                tracing::error!(plugin = %name, error = %e, "Plugin bootstrap failed");
                self.unload_one(name, store);
                self.states.insert(name.to_string(), PluginState::Discovered);
                report.loaded.retain(|n| n != name);
                report.excluded.push((name.to_string(), e.to_string()));
                false
            }
        }
    }
}

fn register_config(name: &str, provider: ConfigProvider, store: &mut ConfigStore) -> Result<(), PluginError> {
    match provider {
        ConfigProvider::Schema(specs) => {
            // Unload removes exactly the plugin's section, so nothing else may be declared.
            let specs = specs();
            if let Some(foreign) = specs.iter().find(|s| s.section() != name) {
                return Err(PluginError::ForeignOption {
                    plugin: name.to_string(),
                    section: foreign.section().to_string(),
                    name: foreign.name().to_string(),
                });
            }
            store.add_specs(specs)?
        }
        ConfigProvider::Function(f) => {
            let current = store.resolve()?;
            let values = f(&current, raw_section(store, name))?;
            store.provide_section(name, values);
        }
    }
    Ok(())
}

fn raw_section<'a>(store: &'a ConfigStore, name: &str) -> Option<&'a toml::Table> {
    store
        .sources()
        .file
        .as_ref()
        .and_then(|f| f.table.get(name))
        .and_then(toml::Value::as_table)
}
