//! Plugin discovery.
//!
//! Two tiers are consulted by name: native extensions first, then legacy
//! plugins. A legacy plugin may declare the oldest server version it works
//! with, and usually computes its configuration with a function instead of
//! declaring options.

use std::collections::BTreeMap;
use std::fmt;

use crate::config::{ConfigError, MergedConfiguration, OptionSpec, Section};
use crate::lifecycle::context::AppContext;
use crate::plugins::{Plugin, PluginError};

pub type PluginConstructor = fn(&AppContext) -> Result<Box<dyn Plugin>, PluginError>;

/// Computes a plugin's configuration section from the resolved configuration
/// and the plugin's raw table in the configuration file, if any.
pub type ConfigFunction =
    fn(&MergedConfiguration, Option<&toml::Table>) -> Result<Section, ConfigError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tier {
    Extension,
    Legacy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Compat {
    pub min_server_version: u32,
}

/// How a plugin declares its configuration section.
#[derive(Clone, Copy)]
pub enum ConfigProvider {
    /// Options registered in the store and resolved like core options.
    Schema(fn() -> Vec<OptionSpec>),
    /// Values computed once per reconcile.
    Function(ConfigFunction),
}

impl fmt::Debug for ConfigProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigProvider::Schema(_) => f.write_str("Schema"),
            ConfigProvider::Function(_) => f.write_str("Function"),
        }
    }
}

#[derive(Clone)]
pub struct PluginEntry {
    name: String,
    tier: Tier,
    constructor: PluginConstructor,
    config: Option<ConfigProvider>,
    compat: Option<Compat>,
}

impl PluginEntry {
    pub fn extension(name: impl Into<String>, constructor: PluginConstructor) -> Self {
        Self::with_tier(name, Tier::Extension, constructor)
    }

    pub fn legacy(name: impl Into<String>, constructor: PluginConstructor) -> Self {
        Self::with_tier(name, Tier::Legacy, constructor)
    }

    fn with_tier(name: impl Into<String>, tier: Tier, constructor: PluginConstructor) -> Self {
        Self {
            name: name.into(),
            tier,
            constructor,
            config: None,
            compat: None,
        }
    }

    pub fn with_config(mut self, provider: ConfigProvider) -> Self {
        self.config = Some(provider);
        self
    }

    pub fn with_compat(mut self, compat: Compat) -> Self {
        self.compat = Some(compat);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tier(&self) -> Tier {
        self.tier
    }

    pub fn config(&self) -> Option<ConfigProvider> {
        self.config
    }

    pub fn compat(&self) -> Option<Compat> {
        self.compat
    }

    pub fn construct(&self, context: &AppContext) -> Result<Box<dyn Plugin>, PluginError> {
        (self.constructor)(context)
    }
}

impl fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginEntry")
            .field("name", &self.name)
            .field("tier", &self.tier)
            .field("config", &self.config)
            .field("compat", &self.compat)
            .finish()
    }
}

/// Every plugin the agent knows how to build, by tier.
#[derive(Debug, Clone, Default)]
pub struct PluginCatalog {
    extensions: BTreeMap<String, PluginEntry>,
    legacy: BTreeMap<String, PluginEntry>,
}

impl PluginCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry to its tier. A later entry with the same name in the
    /// same tier replaces the earlier one.
    pub fn register(&mut self, entry: PluginEntry) -> &mut Self {
        let tier = match entry.tier {
            Tier::Extension => &mut self.extensions,
            Tier::Legacy => &mut self.legacy,
        };
        if tier.contains_key(&entry.name) {
            tracing::warn!(plugin = %entry.name, tier = ?entry.tier, "Plugin registered twice, keeping the last one");
        }
        tier.insert(entry.name.clone(), entry);
        self
    }

    /// Extensions win over legacy plugins of the same name.
    pub fn lookup(&self, name: &str) -> Option<&PluginEntry> {
        self.extensions.get(name).or_else(|| self.legacy.get(name))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.extensions.keys().chain(self.legacy.keys()).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugins::{LoadContext, PluginRoutes};

    struct Noop;

    impl Plugin for Noop {
        fn load(&mut self, _ctx: &mut LoadContext<'_>) -> Result<(), PluginError> {
            Ok(())
        }

        fn unload(&mut self, _routes: &mut PluginRoutes<'_>) -> Result<(), PluginError> {
            Ok(())
        }
    }

    fn noop(_: &AppContext) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(Noop))
    }

    #[test]
    fn extension_shadows_legacy() {
        let mut catalog = PluginCatalog::new();
        catalog
            .register(PluginEntry::legacy("activity", noop).with_compat(Compat { min_server_version: 90400 }))
            .register(PluginEntry::extension("activity", noop));

        let entry = catalog.lookup("activity").unwrap();
        assert_eq!(entry.tier(), Tier::Extension);
        assert!(entry.compat().is_none());
        assert_eq!(catalog.names().count(), 2);
    }

    #[test]
    fn legacy_is_the_fallback() {
        let mut catalog = PluginCatalog::new();
        catalog.register(PluginEntry::legacy("monitoring", noop));
        assert_eq!(catalog.lookup("monitoring").unwrap().tier(), Tier::Legacy);
        assert!(catalog.lookup("missing").is_none());
    }
}
