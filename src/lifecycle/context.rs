//! Shared application context.
//!
//! What plugins and the server hold on to between requests: the current
//! configuration snapshot, the database and session collaborators, the
//! reload trigger and a few runtime counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use arc_swap::ArcSwap;

use crate::config::MergedConfiguration;
use crate::lifecycle::reload::ReloadTrigger;
use crate::services::database::{Database, UnavailableDatabase};
use crate::services::sessions::{MemorySessionStore, SessionStore};

/// Process-wide runtime counters.
#[derive(Debug)]
pub struct AgentStats {
    started_at: SystemTime,
    reload_count: AtomicU64,
    last_reload_ms: AtomicU64,
}

impl AgentStats {
    fn new() -> Self {
        Self {
            started_at: SystemTime::now(),
            reload_count: AtomicU64::new(0),
            last_reload_ms: AtomicU64::new(0),
        }
    }

    pub fn started_at(&self) -> SystemTime {
        self.started_at
    }

    pub fn reload_count(&self) -> u64 {
        self.reload_count.load(Ordering::Relaxed)
    }

    /// When the last successful reload happened, if any.
    pub fn last_reload(&self) -> Option<SystemTime> {
        match self.last_reload_ms.load(Ordering::Relaxed) {
            0 => None,
            ms => Some(UNIX_EPOCH + std::time::Duration::from_millis(ms)),
        }
    }

    pub(crate) fn record_reload(&self) {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(1);
        self.last_reload_ms.store(now.max(1), Ordering::Relaxed);
        self.reload_count.fetch_add(1, Ordering::Relaxed);
    }
}

#[derive(Clone)]
pub struct AppContext {
    config: Arc<ArcSwap<MergedConfiguration>>,
    database: Arc<dyn Database>,
    sessions: Arc<dyn SessionStore>,
    reload: ReloadTrigger,
    stats: Arc<AgentStats>,
}

impl AppContext {
    pub fn new(database: Arc<dyn Database>, sessions: Arc<dyn SessionStore>) -> Self {
        Self {
            config: Arc::new(ArcSwap::from_pointee(MergedConfiguration::default())),
            database,
            sessions,
            reload: ReloadTrigger::new(),
            stats: Arc::new(AgentStats::new()),
        }
    }

    /// Current configuration snapshot.
    pub fn config(&self) -> Arc<MergedConfiguration> {
        self.config.load_full()
    }

    pub fn config_handle(&self) -> &Arc<ArcSwap<MergedConfiguration>> {
        &self.config
    }

    pub(crate) fn publish_config(&self, config: MergedConfiguration) {
        self.config.store(Arc::new(config));
    }

    pub fn database(&self) -> &Arc<dyn Database> {
        &self.database
    }

    pub fn sessions(&self) -> &Arc<dyn SessionStore> {
        &self.sessions
    }

    pub fn reload_trigger(&self) -> &ReloadTrigger {
        &self.reload
    }

    pub fn stats(&self) -> &Arc<AgentStats> {
        &self.stats
    }
}

impl Default for AppContext {
    fn default() -> Self {
        Self::new(Arc::new(UnavailableDatabase), Arc::new(MemorySessionStore::new()))
    }
}

impl std::fmt::Debug for AppContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppContext")
            .field("reload", &self.reload)
            .field("stats", &self.stats)
            .finish_non_exhaustive()
    }
}
