//! Option registry and resolution.
//!
//! # Responsibilities
//! - Hold every registered [`OptionSpec`], unique by `(section, name)`
//! - Resolve each option by precedence: arguments > environment > file > default
//! - Remember the sources so plugins can add options and re-resolve later
//! - Re-read the configuration file on reload
//!
//! # Design Decisions
//! - Resolution is all-or-nothing: the first invalid or missing option fails
//!   the whole pass and nothing recorded is changed
//! - The store is `Clone` so a reload can stage a copy and commit it only once
//!   the whole reconfiguration has succeeded

use std::collections::BTreeMap;

use toml::Value;

use crate::config::loader::{load_file, ConfigSources};
use crate::config::schema::{MergedConfiguration, Section};
use crate::config::spec::OptionSpec;
use crate::config::ConfigError;

#[derive(Debug, Clone, Default)]
pub struct ConfigStore {
    specs: Vec<OptionSpec>,
    sources: ConfigSources,
    provided: BTreeMap<String, Section>,
}

impl ConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register new options. A duplicate `(section, name)`, against the
    /// registered set or within `specs`, rejects the whole batch.
    pub fn add_specs(&mut self, specs: impl IntoIterator<Item = OptionSpec>) -> Result<(), ConfigError> {
        let specs: Vec<OptionSpec> = specs.into_iter().collect();
        for (i, spec) in specs.iter().enumerate() {
            let clash = self.specs.iter().any(|s| s.key() == spec.key())
                || specs[..i].iter().any(|s| s.key() == spec.key());
            if clash {
                return Err(ConfigError::DuplicateOption {
                    section: spec.section().to_string(),
                    name: spec.name().to_string(),
                });
            }
        }
        self.specs.extend(specs);
        Ok(())
    }

    /// Forget every option and provided value of `section`.
    pub fn remove_section(&mut self, section: &str) {
        self.specs.retain(|s| s.section() != section);
        self.provided.remove(section);
    }

    /// Merge precomputed values for `section` into every later resolution.
    ///
    /// Used by plugins that compute their configuration with a function
    /// rather than declaring options.
    pub fn provide_section(&mut self, section: impl Into<String>, values: Section) {
        self.provided.insert(section.into(), values);
    }

    pub fn specs(&self) -> &[OptionSpec] {
        &self.specs
    }

    pub fn sources(&self) -> &ConfigSources {
        &self.sources
    }

    pub fn has_option(&self, section: &str, name: &str) -> bool {
        self.specs.iter().any(|s| s.key() == (section, name))
    }

    /// Resolve every registered option against `sources`. The sources are
    /// recorded only if resolution succeeds.
    pub fn load(&mut self, sources: ConfigSources) -> Result<MergedConfiguration, ConfigError> {
        let merged = self.resolve_with(&sources)?;
        self.sources = sources;
        Ok(merged)
    }

    /// Resolve again against the recorded sources.
    pub fn resolve(&self) -> Result<MergedConfiguration, ConfigError> {
        self.resolve_with(&self.sources)
    }

    /// Re-read the configuration file from its recorded location and
    /// resolve. On failure the recorded file is left untouched.
    pub fn reload(&mut self) -> Result<MergedConfiguration, ConfigError> {
        let path = self
            .sources
            .file
            .as_ref()
            .map(|f| f.path.clone())
            .ok_or(ConfigError::NoFile)?;
        let file = load_file(&path)?;
        let sources = self.sources.clone().with_file(file);
        self.load(sources)
    }

    fn resolve_with(&self, sources: &ConfigSources) -> Result<MergedConfiguration, ConfigError> {
        let mut sections: BTreeMap<String, Section> = BTreeMap::new();

        for spec in &self.specs {
            let Some(raw) = Self::pick(spec, sources) else {
                if spec.is_required() {
                    return Err(ConfigError::Missing {
                        section: spec.section().to_string(),
                        name: spec.name().to_string(),
                    });
                }
                continue;
            };

            let value = spec.validate(&raw).map_err(|reason| ConfigError::Invalid {
                section: spec.section().to_string(),
                name: spec.name().to_string(),
                reason,
            })?;

            sections
                .entry(spec.section().to_string())
                .or_default()
                .insert(spec.name().to_string(), value);
        }

        for (section, values) in &self.provided {
            let target = sections.entry(section.clone()).or_default();
            for (name, value) in values {
                target.insert(name.clone(), value.clone());
            }
        }

        Ok(MergedConfiguration::from_sections(sections))
    }

    fn pick(spec: &OptionSpec, sources: &ConfigSources) -> Option<Value> {
        let (section, name) = spec.key();
        if let Some(v) = sources.args.get(&(section.to_string(), name.to_string())) {
            return Some(v.clone());
        }
        if let Some(v) = sources.environ.get(&spec.env_var()) {
            return Some(Value::String(v.clone()));
        }
        if let Some(v) = sources.file.as_ref().and_then(|f| f.get(section, name)) {
            return Some(v.clone());
        }
        spec.default().cloned()
    }
}
