//! Resolved configuration.
//!
//! [`MergedConfiguration`] is the immutable result of resolving every
//! registered option against the configured sources. It is shared as
//! `Arc<MergedConfiguration>`; a reload builds a new one.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use toml::Value;

use crate::config::CORE_SECTION;

/// Values of one section, by option name.
pub type Section = BTreeMap<String, Value>;

/// Immutable configuration snapshot: section → (name → value).
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MergedConfiguration {
    sections: BTreeMap<String, Section>,
}

impl MergedConfiguration {
    pub(crate) fn from_sections(sections: BTreeMap<String, Section>) -> Self {
        Self { sections }
    }

    pub fn get(&self, section: &str, name: &str) -> Option<&Value> {
        self.sections.get(section).and_then(|s| s.get(name))
    }

    pub fn section(&self, section: &str) -> Option<&Section> {
        self.sections.get(section)
    }

    pub fn has_section(&self, section: &str) -> bool {
        self.sections.contains_key(section)
    }

    pub fn sections(&self) -> impl Iterator<Item = (&str, &Section)> {
        self.sections.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn get_str(&self, section: &str, name: &str) -> Option<&str> {
        self.get(section, name).and_then(Value::as_str)
    }

    pub fn get_i64(&self, section: &str, name: &str) -> Option<i64> {
        self.get(section, name).and_then(Value::as_integer)
    }

    pub fn get_bool(&self, section: &str, name: &str) -> Option<bool> {
        self.get(section, name).and_then(Value::as_bool)
    }

    /// A list of strings; non-string items are skipped.
    pub fn get_str_list(&self, section: &str, name: &str) -> Vec<String> {
        self.get(section, name)
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// The desired plugin names (`agent.plugins`), in declared order.
    pub fn plugins(&self) -> Vec<String> {
        self.get_str_list(CORE_SECTION, "plugins")
    }
}

/// Typed view over the `[agent]` section.
#[derive(Debug, Clone, PartialEq)]
pub struct AgentSettings {
    pub configfile: PathBuf,
    pub address: String,
    pub port: u16,
    pub tls: Option<TlsSettings>,
    pub hostname: String,
    pub max_connections: usize,
    pub max_body_size: usize,
    pub session_ttl: Duration,
    pub shutdown_grace: Duration,
    pub watch_config: bool,
    pub metrics_address: Option<SocketAddr>,
}

/// Certificate and key for the listener.
#[derive(Debug, Clone, PartialEq)]
pub struct TlsSettings {
    pub cert_path: PathBuf,
    pub key_path: PathBuf,
}

impl AgentSettings {
    /// Read the core section. Missing values fall back to the built-in
    /// defaults so that partially-specified test configurations work.
    pub fn from_config(config: &MergedConfiguration) -> Self {
        let s = CORE_SECTION;
        let tls = match (
            config.get_str(s, "ssl_cert_file"),
            config.get_str(s, "ssl_key_file"),
        ) {
            (Some(cert), Some(key)) => Some(TlsSettings {
                cert_path: cert.into(),
                key_path: key.into(),
            }),
            _ => None,
        };

        Self {
            configfile: config
                .get_str(s, "configfile")
                .unwrap_or(crate::config::DEFAULT_CONFIGFILE)
                .into(),
            address: config.get_str(s, "address").unwrap_or("0.0.0.0").to_string(),
            port: config
                .get_i64(s, "port")
                .and_then(|p| u16::try_from(p).ok())
                .unwrap_or(2345),
            tls,
            hostname: config
                .get_str(s, "hostname")
                .unwrap_or("localhost")
                .to_string(),
            max_connections: config
                .get_i64(s, "max_connections")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(256),
            max_body_size: config
                .get_i64(s, "max_body_size")
                .and_then(|v| usize::try_from(v).ok())
                .unwrap_or(2 * 1024 * 1024),
            session_ttl: Duration::from_secs(
                config
                    .get_i64(s, "session_ttl")
                    .and_then(|v| u64::try_from(v).ok())
                    .unwrap_or(3600),
            ),
            shutdown_grace: Duration::from_secs(
                config
                    .get_i64(s, "shutdown_grace")
                    .and_then(|v| u64::try_from(v).ok())
                    .unwrap_or(5),
            ),
            watch_config: config.get_bool(s, "watch_config").unwrap_or(false),
            metrics_address: config
                .get_str(s, "metrics_address")
                .and_then(|a| a.parse().ok()),
        }
    }

    /// `address:port` to bind the listener to.
    pub fn bind_address(&self) -> String {
        if self.address.contains(':') {
            format!("[{}]:{}", self.address, self.port)
        } else {
            format!("{}:{}", self.address, self.port)
        }
    }
}
