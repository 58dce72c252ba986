//! Server settings browser.
//!
//! Lists `pg_settings`, optionally narrowed by name (`?filter=`) or by
//! category (capture route). Legacy plugin, gated on 9.4.

use std::sync::Arc;

use serde_json::Value;

use crate::http::handler::handler;
use crate::lifecycle::context::AppContext;
use crate::plugins::catalog::{Compat, PluginEntry};
use crate::plugins::{LoadContext, Plugin, PluginError, PluginRoutes};
use crate::routing::Route;
use crate::services::database::{Database, Row};

pub const NAME: &str = "pgconf";
pub const MIN_SERVER_VERSION: u32 = 90400;

const SETTINGS_QUERY: &str = "SELECT name, setting, unit, vartype, category, short_desc, \
     min_val, max_val, enumvals, boot_val, reset_val, pending_restart \
     FROM pg_catalog.pg_settings ORDER BY category, name";

pub fn entry() -> PluginEntry {
    PluginEntry::legacy(NAME, PgconfPlugin::construct).with_compat(Compat {
        min_server_version: MIN_SERVER_VERSION,
    })
}

struct PgconfPlugin {
    database: Arc<dyn Database>,
}

impl PgconfPlugin {
    fn construct(context: &AppContext) -> Result<Box<dyn Plugin>, PluginError> {
        Ok(Box::new(Self {
            database: context.database().clone(),
        }))
    }
}

impl Plugin for PgconfPlugin {
    fn load(&mut self, ctx: &mut LoadContext<'_>) -> Result<(), PluginError> {
        let database = self.database.clone();
        ctx.routes.add(Route::get(
            "/pgconf/configuration",
            handler(move |req| {
                let database = database.clone();
                async move {
                    let rows = database.query(SETTINGS_QUERY.to_string()).await?;
                    let names = req.query.get("filter").cloned().unwrap_or_default();
                    Ok(Value::Array(filter_rows(rows, "name", &names)))
                }
            }),
        )?);

        let database = self.database.clone();
        ctx.routes.add(Route::get(
            "/pgconf/configuration/category/(.+)",
            handler(move |req| {
                let database = database.clone();
                async move {
                    let rows = database.query(SETTINGS_QUERY.to_string()).await?;
                    let category = req.vars.clone();
                    Ok(Value::Array(filter_rows(rows, "category", &category)))
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

/// Keep rows whose `column` is one of `wanted`; an empty `wanted` keeps all.
fn filter_rows(rows: Vec<Row>, column: &str, wanted: &[String]) -> Vec<Value> {
    rows.into_iter()
        .filter(|row| {
            wanted.is_empty()
                || row
                    .get(column)
                    .and_then(Value::as_str)
                    .is_some_and(|v| wanted.iter().any(|w| w == v))
        })
        .map(Value::Object)
        .collect()
}
