//! pulse-agent
//!
//! Monitoring agent serving plugin-provided JSON endpoints over HTTPS.
//!
//! # Architecture Overview
//!
//! ```text
//!   CLI args, PULSE_* env, agent.toml
//!        │
//!        ▼
//!   ┌──────────┐   ┌──────────────┐   ┌───────────────┐
//!   │  config  │──▶│   plugins    │──▶│ route table   │──┐
//!   │  store   │   │  registry    │   │ (ArcSwap)     │  │
//!   └──────────┘   └──────────────┘   └───────────────┘  │
//!        ▲                                               ▼
//!   SIGHUP / watcher ─▶ reload trigger ─▶ tick ─▶ ┌──────────────┐
//!                                                 │   dispatch   │◀── client
//!                                                 │    server    │──▶ JSON
//!                                                 └──────────────┘
//! ```

use std::collections::HashMap;
use std::process::ExitCode;

use clap::Parser;
use toml::Value;

use pulse_agent::config::options::listener_specs;
use pulse_agent::config::watcher::ConfigWatcher;
use pulse_agent::config::{AgentSettings, ArgSource, CORE_SECTION};
use pulse_agent::http::DispatchServer;
use pulse_agent::lifecycle::{signals, Agent, Shutdown, UserError};
use pulse_agent::net::tls::load_tls_acceptor;
use pulse_agent::net::Listener;
use pulse_agent::observability::{logging, metrics};
use pulse_agent::plugins::builtin_catalog;

#[derive(Debug, Parser)]
#[command(name = "pulse-agent", version, about = "Plugin-based monitoring agent")]
struct Cli {
    /// Configuration file.
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    config: Option<String>,

    /// Debug logging, for the whole agent or a comma separated list of targets.
    #[arg(long, value_name = "TARGETS", num_args = 0..=1, default_missing_value = "true")]
    debug: Option<String>,
}

impl Cli {
    /// Command line values as an argument source. `DEBUG` in the environment
    /// stands in for a bare `--debug`.
    fn into_args(self, debug_env: bool) -> ArgSource {
        let mut args = ArgSource::new();
        if let Some(path) = self.config {
            args.insert((CORE_SECTION.to_string(), "configfile".to_string()), Value::String(path));
        }
        let debug = self.debug.or_else(|| debug_env.then(|| "true".to_string()));
        if let Some(targets) = debug {
            args.insert(("logging".to_string(), "debug".to_string()), Value::String(targets));
        }
        args
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let environ: HashMap<String, String> = std::env::vars().collect();
    let debug_env = detect_debug_mode(&environ);
    let log_handle = logging::init(cli.debug.is_some() || debug_env);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), "pulse-agent starting");

    match run(cli.into_args(debug_env), environ, log_handle).await {
        Ok(()) => {
            tracing::info!("Shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %e, "Fatal error");
            ExitCode::from(e.exit_code())
        }
    }
}

fn detect_debug_mode(environ: &HashMap<String, String>) -> bool {
    environ
        .get("DEBUG")
        .is_some_and(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "y" | "yes" | "true" | "on"))
}

async fn run(
    args: ArgSource,
    environ: HashMap<String, String>,
    log_handle: logging::LogHandle,
) -> Result<(), UserError> {
    let agent = Agent::builder()
        .args(args)
        .environ(environ)
        .specs(listener_specs())
        .catalog(builtin_catalog())
        .logging(log_handle)
        .bootstrap()
        .await?;

    let settings = AgentSettings::from_config(&agent.config());
    if let Some(addr) = settings.metrics_address {
        metrics::init_metrics(addr);
    }

    let shutdown = Shutdown::new();
    let trigger = agent.context().reload_trigger().clone();
    signals::install(trigger.clone(), shutdown.clone())?;

    let _watcher = if settings.watch_config {
        match ConfigWatcher::new(&settings.configfile, trigger).run() {
            Ok(watcher) => Some(watcher),
            Err(e) => {
                tracing::warn!(error = %e, "Could not watch the configuration file, SIGHUP still reloads");
                None
            }
        }
    } else {
        None
    };

    let listener = Listener::bind(&settings.bind_address(), settings.max_connections).await?;
    let tls = match &settings.tls {
        Some(tls) => Some(load_tls_acceptor(&tls.cert_path, &tls.key_path).await?),
        None => None,
    };

    tracing::info!(
        address = %listener.local_addr()?,
        tls = tls.is_some(),
        "Listening for connections"
    );

    DispatchServer::new(agent, listener, tls, shutdown.subscribe())
        .run()
        .await?;
    Ok(())
}
