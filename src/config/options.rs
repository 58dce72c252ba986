//! Core option declarations.
//!
//! Split in two because of the bootstrap order: the location of the
//! configuration file must be resolved (from arguments, environment and
//! defaults) before the file itself can be read and the rest resolved.

use crate::config::spec::OptionSpec;
use crate::config::validation as v;
use crate::config::{CORE_SECTION, DEFAULT_CONFIGFILE};

/// Plugins enabled when `agent.plugins` is not set.
pub const DEFAULT_PLUGINS: &[&str] = &["dashboard", "pgconf", "slowqueries"];

/// Options needed to find the configuration file.
pub fn bootstrap_specs() -> Vec<OptionSpec> {
    vec![OptionSpec::new(CORE_SECTION, "configfile")
        .default_value(DEFAULT_CONFIGFILE)
        .validator(v::file())]
}

/// Options of the runtime itself: listener, plugins, logging, and the
/// database coordinates plugins need for version gating.
pub fn core_specs() -> Vec<OptionSpec> {
    let s = CORE_SECTION;
    let mut specs = vec![
        OptionSpec::new(s, "plugins")
            .default_value(DEFAULT_PLUGINS.to_vec())
            .validator(v::string_list()),
        OptionSpec::new(s, "address")
            .default_value("0.0.0.0")
            .validator(v::address()),
        OptionSpec::new(s, "port")
            .default_value(2345_i64)
            .validator(v::port()),
        OptionSpec::new(s, "hostname").default_value(default_hostname()),
        OptionSpec::new(s, "max_connections")
            .default_value(256_i64)
            .validator(v::integer_range(1, 65536)),
        OptionSpec::new(s, "max_body_size")
            .default_value(2 * 1024 * 1024_i64)
            .validator(v::positive()),
        OptionSpec::new(s, "session_ttl")
            .default_value(3600_i64)
            .validator(v::positive()),
        OptionSpec::new(s, "shutdown_grace")
            .default_value(5_i64)
            .validator(v::integer_range(0, 3600)),
        OptionSpec::new(s, "watch_config")
            .default_value(false)
            .validator(v::boolean()),
        OptionSpec::new(s, "metrics_address").validator(v::socket_address()),
    ];

    let s = "logging";
    specs.extend([
        OptionSpec::new(s, "level")
            .default_value("INFO")
            .validator(v::log_level()),
        OptionSpec::new(s, "debug")
            .default_value(false)
            .validator(v::debug_targets()),
    ]);

    let s = "postgresql";
    specs.extend([
        OptionSpec::new(s, "host").default_value("/var/run/postgresql"),
        OptionSpec::new(s, "instance").default_value("main"),
        OptionSpec::new(s, "port")
            .default_value(5432_i64)
            .validator(v::port()),
        OptionSpec::new(s, "user").default_value("postgres"),
        OptionSpec::new(s, "password"),
        OptionSpec::new(s, "dbname").default_value("postgres"),
    ]);

    specs
}

/// TLS listener options. The agent binary registers them; embedders serving
/// plain HTTP leave them out.
pub fn listener_specs() -> Vec<OptionSpec> {
    vec![
        OptionSpec::new(CORE_SECTION, "ssl_cert_file")
            .required()
            .validator(v::file()),
        OptionSpec::new(CORE_SECTION, "ssl_key_file")
            .required()
            .validator(v::file()),
    ]
}

fn default_hostname() -> String {
    std::fs::read_to_string("/etc/hostname")
        .ok()
        .map(|h| h.trim().to_string())
        .filter(|h| !h.is_empty())
        .unwrap_or_else(|| "localhost".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSources, ConfigStore};

    #[test]
    fn core_specs_are_unique_and_resolve_with_defaults() {
        let mut store = ConfigStore::new();
        store.add_specs(core_specs()).unwrap();
        let config = store.load(ConfigSources::default()).unwrap();

        assert_eq!(
            config.plugins(),
            vec!["dashboard".to_string(), "pgconf".into(), "slowqueries".into()]
        );
        assert_eq!(config.get_i64("agent", "port"), Some(2345));
        assert_eq!(config.get_str("logging", "level"), Some("INFO"));
        assert!(config.get("agent", "ssl_cert_file").is_none());
    }
}
