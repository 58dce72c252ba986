//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::future::BoxFuture;
use serde_json::{json, Value};
use tempfile::TempDir;
use tokio::task::JoinHandle;

use pulse_agent::http::DispatchServer;
use pulse_agent::lifecycle::{Agent, ReloadTrigger, Shutdown};
use pulse_agent::net::Listener;
use pulse_agent::plugins::builtin_catalog;
use pulse_agent::services::{Database, DatabaseError, MemorySessionStore, Row};

/// Canned database: a fixed version and a few known queries.
pub struct FakeDatabase {
    version: Option<u32>,
    pub queries: Mutex<Vec<String>>,
}

impl FakeDatabase {
    pub fn new(version: Option<u32>) -> Self {
        Self {
            version,
            queries: Mutex::new(Vec::new()),
        }
    }
}

fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        _ => Row::new(),
    }
}

impl Database for FakeDatabase {
    fn server_version(&self) -> BoxFuture<'_, Result<u32, DatabaseError>> {
        let version = self.version;
        Box::pin(async move { version.ok_or_else(|| DatabaseError::Unavailable("connection refused".into())) })
    }

    fn query(&self, sql: String) -> BoxFuture<'_, Result<Vec<Row>, DatabaseError>> {
        self.queries.lock().unwrap().push(sql.clone());
        Box::pin(async move {
            if sql.starts_with("EXPLAIN") {
                return Ok(vec![row(json!({ "QUERY PLAN": "Result  (cost=0.00..0.01 rows=1 width=4)" }))]);
            }
            if sql.contains("pg_settings") {
                return Ok(vec![
                    row(json!({ "name": "fsync", "setting": "on", "category": "Write-Ahead Log / Settings" })),
                    row(json!({ "name": "work_mem", "setting": "4096", "category": "Resource Usage / Memory" })),
                ]);
            }
            if sql.contains("pg_track_slow_queries()") {
                return Ok(vec![row(json!({ "query": "SELECT pg_sleep(2)", "duration": 2001.3 }))]);
            }
            Ok(Vec::new())
        })
    }
}

/// A running agent on `127.0.0.1:<ephemeral>`, plain HTTP.
pub struct TestAgent {
    pub addr: SocketAddr,
    pub config_path: PathBuf,
    pub database: Arc<FakeDatabase>,
    pub sessions: Arc<MemorySessionStore>,
    pub trigger: ReloadTrigger,
    pub shutdown: Shutdown,
    pub client: reqwest::Client,
    server: JoinHandle<()>,
    _dir: TempDir,
}

impl TestAgent {
    pub async fn start(config: &str, version: Option<u32>) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let config_path = dir.path().join("agent.toml");
        std::fs::write(&config_path, config).unwrap();

        let database = Arc::new(FakeDatabase::new(version));
        let sessions = Arc::new(MemorySessionStore::new());
        let agent = Agent::builder()
            .environ(HashMap::from([(
                "PULSE_AGENT_CONFIGFILE".to_string(),
                config_path.display().to_string(),
            )]))
            .catalog(builtin_catalog())
            .database(database.clone())
            .sessions(sessions.clone())
            .bootstrap()
            .await
            .unwrap();
        let trigger = agent.context().reload_trigger().clone();

        let listener = Listener::bind("127.0.0.1:0", 64).await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shutdown = Shutdown::new();
        let server = DispatchServer::new(agent, listener, None, shutdown.subscribe());
        let server = tokio::spawn(async move {
            let _ = server.run().await;
        });

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .no_proxy()
            .build()
            .unwrap();

        Self {
            addr,
            config_path,
            database,
            sessions,
            trigger,
            shutdown,
            client,
            server,
            _dir: dir,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn get(&self, path: &str) -> reqwest::Response {
        self.client.get(self.url(path)).send().await.expect("agent unreachable")
    }

    pub fn rewrite_config(&self, config: &str) {
        std::fs::write(&self.config_path, config).unwrap();
    }

    /// Wait long enough for a pending reload to pass the debounce window and
    /// be picked up by the next housekeeping tick.
    pub async fn settle(&self) {
        tokio::time::sleep(Duration::from_millis(2600)).await;
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(10), self.server).await;
    }
}
