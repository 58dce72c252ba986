//! Startup orchestration and the reconfiguration sequencing point.
//!
//! # Responsibilities
//! - Resolve configuration in stages: locate the file, read it, resolve the
//!   full option set
//! - Apply configuration: logging, then plugin reconciliation, then publish
//!   the configuration and route snapshots
//! - Re-apply on reload, all-or-nothing
//!
//! # Design Decisions
//! - Fail fast: any startup error is a [`UserError`] with an exit code
//! - A reload stages a copy of the store and commits it only when the whole
//!   reconfiguration succeeded; otherwise the previous state stays
//! - `Agent` methods take `&mut self`: whoever owns the agent is the only
//!   one mutating configuration and routes

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::SystemTime;

use arc_swap::ArcSwap;
use thiserror::Error;

use crate::config::loader::load_file;
use crate::config::options::{bootstrap_specs, core_specs};
use crate::config::{
    ArgSource, ConfigError, ConfigSources, ConfigStore, MergedConfiguration, OptionSpec, CORE_SECTION,
};
use crate::lifecycle::context::AppContext;
use crate::net::ListenerError;
use crate::observability::logging::{self, LogHandle};
use crate::plugins::registry::{PluginRegistry, ReconcileError, Reconciled};
use crate::plugins::PluginCatalog;
use crate::routing::RouteTable;
use crate::services::database::{Database, UnavailableDatabase};
use crate::services::sessions::{MemorySessionStore, SessionStore};

/// Fatal, user-facing startup failure.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct UserError {
    message: String,
    exit_code: u8,
}

impl UserError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_code(message, 1)
    }

    pub fn with_code(message: impl Into<String>, exit_code: u8) -> Self {
        Self {
            message: message.into(),
            exit_code,
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn exit_code(&self) -> u8 {
        self.exit_code
    }
}

impl From<ConfigError> for UserError {
    fn from(e: ConfigError) -> Self {
        UserError::new(e.to_string())
    }
}

impl From<ReconcileError> for UserError {
    fn from(e: ReconcileError) -> Self {
        UserError::new(e.to_string())
    }
}

impl From<ListenerError> for UserError {
    fn from(e: ListenerError) -> Self {
        UserError::new(e.to_string())
    }
}

impl From<std::io::Error> for UserError {
    fn from(e: std::io::Error) -> Self {
        UserError::new(e.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Reconcile(#[from] ReconcileError),
}

/// What a successful reload changed.
#[derive(Debug, Clone)]
pub struct ReloadReport {
    pub loaded: Vec<String>,
    pub unloaded: Vec<String>,
    pub excluded: Vec<(String, String)>,
}

/// The running agent: configuration store, plugins and published snapshots.
pub struct Agent {
    store: ConfigStore,
    registry: PluginRegistry,
    context: AppContext,
    routes: Arc<ArcSwap<RouteTable>>,
    logging: Option<LogHandle>,
}

impl Agent {
    pub fn builder() -> AgentBuilder {
        AgentBuilder::default()
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn config(&self) -> Arc<MergedConfiguration> {
        self.context.config()
    }

    pub fn routes(&self) -> &Arc<ArcSwap<RouteTable>> {
        &self.routes
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn reload_count(&self) -> u64 {
        self.context.stats().reload_count()
    }

    pub fn last_reload(&self) -> Option<SystemTime> {
        self.context.stats().last_reload()
    }

    /// Re-read the configuration file and reconcile plugins against it.
    ///
    /// On error nothing is changed.
    pub async fn reload(&mut self) -> Result<ReloadReport, ReloadError> {
        let mut staged = self.store.clone();
        let config = staged.reload()?;
        let reconciled = self.registry.reconcile(&mut staged, config).await?;

        self.store = staged;
        let report = self.publish(reconciled);
        self.context.stats().record_reload();
        Ok(report)
    }

    /// Unload every plugin. Used on shutdown.
    pub fn shutdown(&mut self) {
        self.registry.unload_all(&mut self.store);
        self.routes.store(Arc::new(RouteTable::empty()));
    }

    fn publish(&mut self, reconciled: Reconciled) -> ReloadReport {
        if let Some(handle) = &self.logging {
            logging::apply(handle, &reconciled.config);
        }
        self.context.publish_config(reconciled.config);
        self.routes.store(reconciled.routes);
        ReloadReport {
            loaded: reconciled.loaded,
            unloaded: reconciled.unloaded,
            excluded: reconciled.excluded,
        }
    }
}

/// Collects what [`Agent::bootstrap`](AgentBuilder::bootstrap) needs.
pub struct AgentBuilder {
    args: ArgSource,
    environ: HashMap<String, String>,
    specs: Vec<OptionSpec>,
    catalog: PluginCatalog,
    database: Arc<dyn Database>,
    sessions: Arc<dyn SessionStore>,
    logging: Option<LogHandle>,
}

impl Default for AgentBuilder {
    fn default() -> Self {
        Self {
            args: ArgSource::new(),
            environ: HashMap::new(),
            specs: Vec::new(),
            catalog: PluginCatalog::new(),
            database: Arc::new(UnavailableDatabase),
            sessions: Arc::new(MemorySessionStore::new()),
            logging: None,
        }
    }
}

impl AgentBuilder {
    /// Values from the command line.
    pub fn args(mut self, args: ArgSource) -> Self {
        self.args = args;
        self
    }

    /// Captured process environment.
    pub fn environ(mut self, environ: HashMap<String, String>) -> Self {
        self.environ = environ;
        self
    }

    /// Application options on top of the core set.
    pub fn specs(mut self, specs: Vec<OptionSpec>) -> Self {
        self.specs.extend(specs);
        self
    }

    pub fn catalog(mut self, catalog: PluginCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn database(mut self, database: Arc<dyn Database>) -> Self {
        self.database = database;
        self
    }

    pub fn sessions(mut self, sessions: Arc<dyn SessionStore>) -> Self {
        self.sessions = sessions;
        self
    }

    pub fn logging(mut self, handle: LogHandle) -> Self {
        self.logging = Some(handle);
        self
    }

    /// Resolve configuration, load plugins and publish the first snapshots.
    pub async fn bootstrap(self) -> Result<Agent, UserError> {
        let mut store = ConfigStore::new();
        store.add_specs(bootstrap_specs())?;
        let located = store.load(ConfigSources::new(self.args, self.environ))?;

        let configfile = located
            .get_str(CORE_SECTION, "configfile")
            .ok_or_else(|| UserError::new("no configuration file location"))?
            .to_string();
        let file = load_file(Path::new(&configfile))?;
        tracing::info!(path = %configfile, "Configuration file read");

        let sources = store.sources().clone().with_file(file);
        store.add_specs(core_specs())?;
        store.add_specs(self.specs)?;
        let config = store.load(sources)?;

        if let Some(handle) = &self.logging {
            logging::apply(handle, &config);
        }

        let context = AppContext::new(self.database, self.sessions);
        context.publish_config(config.clone());

        let mut registry = PluginRegistry::new(self.catalog, context.clone());
        let reconciled = registry.reconcile(&mut store, config).await?;
        tracing::info!(
            plugins = ?reconciled.loaded,
            excluded = reconciled.excluded.len(),
            routes = reconciled.routes.len(),
            "Plugins loaded"
        );

        let mut agent = Agent {
            store,
            registry,
            context,
            routes: Arc::new(ArcSwap::from_pointee(RouteTable::empty())),
            logging: self.logging,
        };
        agent.publish(reconciled);
        Ok(agent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::builtin_catalog;
    use axum::http::Method;

    fn environ(path: &Path) -> HashMap<String, String> {
        HashMap::from([("PULSE_AGENT_CONFIGFILE".to_string(), path.display().to_string())])
    }

    #[tokio::test]
    async fn missing_file_is_a_user_error() {
        let err = Agent::builder()
            .environ(HashMap::from([(
                "PULSE_AGENT_CONFIGFILE".to_string(),
                "/nonexistent/agent.toml".to_string(),
            )]))
            .bootstrap()
            .await
            .err()
            .unwrap();
        assert!(err.message().contains("agent.configfile"));
        assert_eq!(err.exit_code(), 1);
    }

    #[tokio::test]
    async fn unknown_plugin_at_boot_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "[agent]\nplugins = [\"nope\"]\n").unwrap();

        let err = Agent::builder()
            .environ(environ(&path))
            .catalog(builtin_catalog())
            .bootstrap()
            .await
            .err()
            .unwrap();
        assert!(err.message().contains("nope"));
    }

    #[tokio::test]
    async fn reload_swaps_plugins_and_keeps_state_on_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agent.toml");
        std::fs::write(&path, "[agent]\nplugins = [\"dashboard\"]\n").unwrap();

        let mut agent = Agent::builder()
            .environ(environ(&path))
            .catalog(builtin_catalog())
            .bootstrap()
            .await
            .unwrap();
        let routes = agent.routes().load_full();
        assert!(routes.find(&Method::GET, "/dashboard/hostname").is_ok());
        assert!(routes.find(&Method::GET, "/pgconf/configuration").is_err());
        assert_eq!(agent.config().get_i64("dashboard", "history_length"), Some(150));

        std::fs::write(
            &path,
            "[agent]\nplugins = [\"pgconf\"]\n[dashboard]\nhistory_length = 20\n",
        )
        .unwrap();
        let report = agent.reload().await.unwrap();
        assert_eq!(report.unloaded, vec!["dashboard".to_string()]);
        assert_eq!(report.loaded, vec!["pgconf".to_string()]);
        let routes = agent.routes().load_full();
        assert!(routes.find(&Method::GET, "/dashboard/hostname").is_err());
        assert!(routes.find(&Method::GET, "/pgconf/configuration").is_ok());
        assert_eq!(agent.reload_count(), 1);
        assert!(agent.last_reload().is_some());

        std::fs::write(&path, "[agent]\nplugins = [\"dashboard\", \"ghost\"]\n").unwrap();
        assert!(matches!(
            agent.reload().await,
            Err(ReloadError::Reconcile(ReconcileError::UnknownPlugin(_)))
        ));
        std::fs::write(&path, "[agent]\nport = \"many\"\n").unwrap();
        assert!(matches!(agent.reload().await, Err(ReloadError::Config(_))));

        let routes = agent.routes().load_full();
        assert!(routes.find(&Method::GET, "/pgconf/configuration").is_ok());
        assert_eq!(agent.config().plugins(), vec!["pgconf".to_string()]);
        assert_eq!(agent.reload_count(), 1);
    }
}
