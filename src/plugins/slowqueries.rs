//! Slow query statistics and plans.
//!
//! Native plugin. Requires a 9.5+ server: an older or unknown version fails
//! the load, which excludes the plugin without affecting the others. Every
//! route requires a session.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::validation as v;
use crate::config::OptionSpec;
use crate::http::handler::{handler, HandlerError};
use crate::http::request::RequestContext;
use crate::lifecycle::context::AppContext;
use crate::plugins::catalog::{ConfigProvider, PluginEntry};
use crate::plugins::{LoadContext, Plugin, PluginError, PluginRoutes};
use crate::routing::Route;
use crate::services::database::Database;
use crate::services::sessions::{require_session, SessionStore};

pub const NAME: &str = "slowqueries";
pub const MIN_SERVER_VERSION: u32 = 90500;

pub const EXPLAIN_FORMATS: &[&str] = &["text", "json", "xml", "yaml"];

pub fn entry() -> PluginEntry {
    PluginEntry::extension(NAME, SlowQueriesPlugin::construct).with_config(ConfigProvider::Schema(option_specs))
}

fn option_specs() -> Vec<OptionSpec> {
    vec![OptionSpec::new(NAME, "explain_format")
        .default_value("text")
        .validator(v::one_of(EXPLAIN_FORMATS))]
}

#[derive(Clone)]
struct Services {
    database: Arc<dyn Database>,
    sessions: Arc<dyn SessionStore>,
}

struct SlowQueriesPlugin {
    services: Services,
}

impl SlowQueriesPlugin {
    fn construct(context: &AppContext) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(Self {
            services: Services {
                database: context.database().clone(),
                sessions: context.sessions().clone(),
            },
        }))
    }
}

impl Plugin for SlowQueriesPlugin {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), PluginError> {
        let version = ctx.server_version.ok_or_else(|| {
            PluginError::Precondition("server version unknown, cannot check compatibility".to_string())
        })?;
        if version < MIN_SERVER_VERSION {
            return Err(PluginError::Incompatible {
                current: version,
                minimum: MIN_SERVER_VERSION,
            });
        }

        let services = self.services.clone();
        ctx.routes.add(Route::get(
            "/slowqueries",
            handler(move |req| {
                let services = services.clone();
                async move {
                    require_session(&req.headers, services.sessions.as_ref())?;
                    let rows = services
                        .database
                        .query("SELECT * FROM pg_track_slow_queries()".to_string())
                        .await?;
                    Ok(Value::Array(rows.into_iter().map(Value::Object).collect()))
                }
            }),
        )?);

        let services = self.services.clone();
        ctx.routes.add(Route::get(
            "/slowqueries/reset",
            handler(move |req| {
                let services = services.clone();
                async move {
                    require_session(&req.headers, services.sessions.as_ref())?;
                    services
                        .database
                        .query("SELECT pg_track_slow_queries_reset()".to_string())
                        .await?;
                    Ok(json!({ "ok": "done" }))
                }
            }),
        )?);

        let services = self.services.clone();
        ctx.routes.add(Route::post(
            "/slowqueries/explain",
            handler(move |req| {
                let services = services.clone();
                async move {
                    require_session(&req.headers, services.sessions.as_ref())?;
                    let sql = explain_statement(&req)?;
                    let rows = services.database.query(sql).await?;
                    rows.into_iter()
                        .next()
                        .and_then(|mut row| row.remove("QUERY PLAN"))
                        .ok_or_else(|| HandlerError::internal("EXPLAIN returned no plan"))
                }
            }),
        )?);

        Ok(())
    }

    fn unload(&mut self, routes: &mut PluginRoutes<'_>) -> Result<(), PluginError> {
        routes.clear();
        Ok(())
    }
}

/// Build the EXPLAIN statement from the body's `sql` and optional `format`,
/// defaulting to `slowqueries.explain_format`.
fn explain_statement(req: &RequestContext) -> Result<String, HandlerError> {
    let sql = req
        .body_field("sql")
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| HandlerError::bad_request("Missing parameter 'sql'."))?;

    let format = match req.body_field("format") {
        Some(value) => {
            let requested = value.as_str().unwrap_or_default();
            EXPLAIN_FORMATS
                .iter()
                .find(|f| f.eq_ignore_ascii_case(requested))
                .copied()
                .ok_or_else(|| HandlerError::bad_request(format!("Unknown format '{}'.", requested)))?
        }
        None => req.config.get_str(NAME, "explain_format").unwrap_or("text"),
    };

    Ok(format!("EXPLAIN (FORMAT {}) {}", format.to_uppercase(), sql))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigSources, ConfigStore};
    use axum::http::{HeaderMap, Method};
    use std::collections::HashMap;

    fn request(body: Value, default_format: &str) -> RequestContext {
        let mut store = ConfigStore::new();
        store.add_specs(option_specs()).unwrap();
        let environ = HashMap::from([(
            "PULSE_SLOWQUERIES_EXPLAIN_FORMAT".to_string(),
            default_format.to_string(),
        )]);
        let config = store.load(ConfigSources::new(Default::default(), environ)).unwrap();

        RequestContext {
            request_id: uuid::Uuid::new_v4(),
            method: Method::POST,
            path: "/slowqueries/explain".into(),
            headers: HeaderMap::new(),
            query: HashMap::new(),
            body: Some(body),
            vars: Vec::new(),
            config: Arc::new(config),
            peer: "127.0.0.1:1".parse().unwrap(),
        }
    }

    #[test]
    fn explain_uses_configured_format_uppercased() {
        let sql = explain_statement(&request(json!({ "sql": "SELECT 1" }), "json")).unwrap();
        assert_eq!(sql, "EXPLAIN (FORMAT JSON) SELECT 1");
    }

    #[test]
    fn explain_body_format_wins() {
        let req = request(json!({ "sql": "SELECT 1", "format": "yaml" }), "text");
        assert_eq!(explain_statement(&req).unwrap(), "EXPLAIN (FORMAT YAML) SELECT 1");

        let req = request(json!({ "sql": "SELECT 1", "format": "csv" }), "text");
        assert!(explain_statement(&req).is_err());
    }

    #[test]
    fn explain_requires_sql() {
        let err = explain_statement(&request(json!({ "format": "text" }), "text")).unwrap_err();
        assert_eq!(err.status(), axum::http::StatusCode::BAD_REQUEST);
    }
}
