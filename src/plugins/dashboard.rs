//! Host and server overview.
//!
//! A legacy plugin: its two settings are computed by [`configuration`] from
//! the `[dashboard]` table of the configuration file rather than declared as
//! options, and a bad value falls back to its default instead of failing.

use std::time::{SystemTime, UNIX_EPOCH};

use serde_json::json;
use toml::Value;

use crate::config::validation as v;
use crate::config::{ConfigError, MergedConfiguration, Section, CORE_SECTION};
use crate::http::handler::{handler, HandlerError};
use crate::lifecycle::context::AppContext;
use crate::plugins::catalog::{ConfigProvider, PluginEntry};
use crate::plugins::{LoadContext, Plugin, PluginError, PluginRoutes};
use crate::routing::Route;

pub const NAME: &str = "dashboard";

const SCHEDULER_INTERVAL_DEFAULT: i64 = 2;
const HISTORY_LENGTH_DEFAULT: i64 = 150;

pub fn entry() -> PluginEntry {
    PluginEntry::legacy(NAME, DashboardPlugin::construct).with_config(ConfigProvider::Function(configuration))
}

/// Derive `scheduler_interval` (seconds, 1..86400) and `history_length`
/// (samples, 1..300) from the file's `[dashboard]` table.
pub fn configuration(_config: &MergedConfiguration, raw: Option<&toml::Table>) -> Result<Section, ConfigError> {
    let mut section = Section::new();
    section.insert(
        "scheduler_interval".to_string(),
        Value::Integer(setting(raw, "scheduler_interval", 1, 86_399, SCHEDULER_INTERVAL_DEFAULT)),
    );
    section.insert(
        "history_length".to_string(),
        Value::Integer(setting(raw, "history_length", 1, 299, HISTORY_LENGTH_DEFAULT)),
    );
    Ok(section)
}

fn setting(raw: Option<&toml::Table>, name: &str, min: i64, max: i64, default: i64) -> i64 {
    let Some(value) = raw.and_then(|t| t.get(name)) else {
        return default;
    };
    match v::integer_range(min, max)(value) {
        Ok(Value::Integer(n)) => n,
        Ok(_) | Err(_) => {
            tracing::error!(
                plugin = NAME,
                option = name,
                value = %value,
                default,
                "Invalid dashboard setting, using the default"
            );
            default
        }
    }
}

struct DashboardPlugin {
    context: AppContext,
}

impl DashboardPlugin {
    fn construct(context: &AppContext) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(Self {
            context: context.clone(),
        }))
    }
}

impl Plugin for DashboardPlugin {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), PluginError> {
        ctx.routes.add(Route::get(
            "/dashboard/hostname",
            handler(|req| async move { Ok(json!({ "hostname": hostname(&req.config) })) }),
        )?);

        ctx.routes.add(Route::get(
            "/dashboard/n_cpu",
            handler(|_| async {
                let n_cpu = std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1);
                Ok(json!({ "n_cpu": n_cpu }))
            }),
        )?);

        ctx.routes.add(Route::get(
            "/dashboard/loadaverage",
            handler(|_| async {
                let raw = tokio::fs::read_to_string("/proc/loadavg").await?;
                Ok(json!({ "loadaverage": parse_loadavg(&raw)? }))
            }),
        )?);

        let database = self.context.database().clone();
        ctx.routes.add(Route::get(
            "/dashboard/pg_version",
            handler(move |_| {
                let database = database.clone();
                async move {
                    let version = database.server_version().await?;
                    Ok(json!({ "pg_version": version }))
                }
            }),
        )?);

        let stats = self.context.stats().clone();
        ctx.routes.add(Route::get(
            "/dashboard/info",
            handler(move |req| {
                let stats = stats.clone();
                async move {
                    Ok(json!({
                        "hostname": hostname(&req.config),
                        "agent_version": env!("CARGO_PKG_VERSION"),
                        "start_time": unix_seconds(stats.started_at()),
                        "reload_time": stats.last_reload().map(unix_seconds),
                        "reload_count": stats.reload_count(),
                    }))
                }
            }),
        )?);

        ctx.routes.add(Route::get(
            "/dashboard/config",
            handler(|req| async move {
                Ok(json!({
                    "scheduler_interval": req.config.get_i64(NAME, "scheduler_interval"),
                    "history_length": req.config.get_i64(NAME, "history_length"),
                }))
            }),
        )?);

        Ok(())
    }

    fn unload(&mut self, routes: &mut PluginRoutes<'_>) -> Result<(), PluginError> {
        routes.clear();
        Ok(())
    }
}

fn hostname(config: &MergedConfiguration) -> String {
    config.get_str(CORE_SECTION, "hostname").unwrap_or("localhost").to_string()
}

fn unix_seconds(at: SystemTime) -> u64 {
    at.duration_since(UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

/// One-minute load average from `/proc/loadavg`.
fn parse_loadavg(raw: &str) -> Result<f64, HandlerError> {
    raw.split_whitespace()
        .next()
        .and_then(|field| field.parse().ok())
        .ok_or_else(|| HandlerError::internal(format!("unexpected /proc/loadavg content: {:?}", raw)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(toml: &str) -> toml::Table {
        toml::from_str(toml).unwrap()
    }

    #[test]
    fn defaults_without_a_section() {
        let section = configuration(&MergedConfiguration::default(), None).unwrap();
        assert_eq!(section["scheduler_interval"], Value::Integer(2));
        assert_eq!(section["history_length"], Value::Integer(150));
    }

    #[test]
    fn valid_values_are_kept_invalid_fall_back() {
        let raw = table("scheduler_interval = 10\nhistory_length = 500\n");
        let section = configuration(&MergedConfiguration::default(), Some(&raw)).unwrap();
        assert_eq!(section["scheduler_interval"], Value::Integer(10));
        assert_eq!(section["history_length"], Value::Integer(150));

        let raw = table("scheduler_interval = \"30\"\nhistory_length = 0\n");
        let section = configuration(&MergedConfiguration::default(), Some(&raw)).unwrap();
        assert_eq!(section["scheduler_interval"], Value::Integer(30));
        assert_eq!(section["history_length"], Value::Integer(150));
    }

    #[test]
    fn loadavg_first_field() {
        assert_eq!(parse_loadavg("0.52 0.58 0.59 1/467 1234\n").unwrap(), 0.52);
        assert!(parse_loadavg("").is_err());
    }
}
