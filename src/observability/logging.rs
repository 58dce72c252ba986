//! Structured logging.
//!
//! # Responsibilities
//! - Initialize the tracing subscriber
//! - Derive the log filter from `logging.level` and `logging.debug`
//! - Swap the filter at runtime when configuration is (re)applied
//!
//! # Design Decisions
//! - `RUST_LOG`, when set, wins over configuration and is never replaced
//! - `logging.debug = true` turns on debug for the agent's own targets; a
//!   list turns it on for exactly those targets

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{reload, EnvFilter, Registry};

use crate::config::MergedConfiguration;

/// Handle to replace the active filter.
pub type LogHandle = reload::Handle<EnvFilter, Registry>;

const CRATE_TARGET: &str = "pulse_agent";

/// Install the global subscriber. Safe to call more than once; later calls
/// only return a detached handle.
pub fn init(debug: bool) -> LogHandle {
    let initial = match env_override() {
        Some(filter) => filter,
        None if debug => EnvFilter::new(format!("info,{}=debug", CRATE_TARGET)),
        None => EnvFilter::new("info"),
    };
    let (filter, handle) = reload::Layer::new(initial);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .try_init();
    handle
}

/// Replace the filter with the one `config` asks for.
pub fn apply(handle: &LogHandle, config: &MergedConfiguration) {
    if env_override().is_some() {
        return;
    }
    let directives = directives(config);
    if let Err(e) = handle.reload(EnvFilter::new(&directives)) {
        tracing::warn!(error = %e, "Failed to update log filter");
        return;
    }
    tracing::debug!(filter = %directives, "Log filter applied");
}

fn env_override() -> Option<EnvFilter> {
    std::env::var("RUST_LOG").ok()?;
    EnvFilter::try_from_default_env().ok()
}

/// Filter directives for the `[logging]` section.
pub fn directives(config: &MergedConfiguration) -> String {
    let base = level_directive(config.get_str("logging", "level").unwrap_or("INFO"));

    match config.get("logging", "debug") {
        Some(toml::Value::Boolean(true)) => format!("{},{}=debug", base, CRATE_TARGET),
        Some(toml::Value::Array(_)) => {
            let mut out = base.to_string();
            for target in config.get_str_list("logging", "debug") {
                out.push_str(&format!(",{}=debug", target));
            }
            out
        }
        _ => base.to_string(),
    }
}

fn level_directive(level: &str) -> &'static str {
    match level.to_ascii_uppercase().as_str() {
        "TRACE" => "trace",
        "DEBUG" => "debug",
        "WARNING" | "WARN" => "warn",
        "ERROR" | "CRITICAL" => "error",
        _ => "info",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::options::core_specs;
    use crate::config::{ConfigSources, ConfigStore};
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> MergedConfiguration {
        let mut store = ConfigStore::new();
        store.add_specs(core_specs()).unwrap();
        let environ: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        store.load(ConfigSources::new(Default::default(), environ)).unwrap()
    }

    #[test]
    fn level_maps_to_filter() {
        assert_eq!(directives(&config(&[])), "info");
        assert_eq!(directives(&config(&[("PULSE_LOGGING_LEVEL", "warning")])), "warn");
        assert_eq!(directives(&config(&[("PULSE_LOGGING_LEVEL", "CRITICAL")])), "error");
    }

    #[test]
    fn debug_flag_and_targets() {
        assert_eq!(
            directives(&config(&[("PULSE_LOGGING_DEBUG", "true")])),
            "info,pulse_agent=debug"
        );
        assert_eq!(
            directives(&config(&[("PULSE_LOGGING_DEBUG", "pulse_agent::plugins,hyper")])),
            "info,pulse_agent::plugins=debug,hyper=debug"
        );
        assert_eq!(directives(&config(&[("PULSE_LOGGING_DEBUG", "false")])), "info");
    }
}
