//! Dispatch server.
//!
//! # Responsibilities
//! - Accept connections (bounded), optionally through TLS
//! - Serve one request per connection against the snapshots current at
//!   accept time
//! - Route, read the body, invoke the handler, shape the response
//! - Run housekeeping every second: due reloads, session expiry
//! - Drain in-flight connections on shutdown, bounded by the grace period
//!
//! # Design Decisions
//! - The server loop owns the `Agent`; reloads run there and nowhere else
//! - Keep-alive is off: a connection's snapshot is a request's snapshot
//! - Handler faults (errors and panics) are logged in full and answered
//!   with a generic 500

use std::convert::Infallible;
use std::net::SocketAddr;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::response::Response;
use futures_util::FutureExt;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::broadcast;
use tokio_rustls::TlsAcceptor;
use uuid::Uuid;

use crate::config::{AgentSettings, MergedConfiguration};
use crate::http::handler::HandlerError;
use crate::http::request::{parse_query, read_json_body, RequestContext};
use crate::http::response;
use crate::lifecycle::reload::ReloadCoordinator;
use crate::lifecycle::startup::Agent;
use crate::net::{ConnectionPermit, ConnectionTracker, Listener};
use crate::observability::metrics;
use crate::routing::RouteTable;

/// Housekeeping period.
pub const TICK: Duration = Duration::from_secs(1);

/// What one connection is served against.
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    pub routes: Arc<RouteTable>,
    pub config: Arc<MergedConfiguration>,
    pub peer: SocketAddr,
    pub max_body_size: usize,
}

impl ConnectionSnapshot {
    pub fn capture(agent: &Agent, peer: SocketAddr) -> Self {
        let config = agent.config();
        let max_body_size = AgentSettings::from_config(&config).max_body_size;
        Self {
            routes: agent.routes().load_full(),
            config,
            peer,
            max_body_size,
        }
    }
}

pub struct DispatchServer {
    agent: Agent,
    listener: Listener,
    tls: Option<TlsAcceptor>,
    coordinator: ReloadCoordinator,
    tracker: ConnectionTracker,
    shutdown: broadcast::Receiver<()>,
}

impl DispatchServer {
    pub fn new(
        agent: Agent,
        listener: Listener,
        tls: Option<TlsAcceptor>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        let coordinator = ReloadCoordinator::new(agent.context().reload_trigger().clone());
        Self {
            agent,
            listener,
            tls,
            coordinator,
            tracker: ConnectionTracker::new(),
            shutdown,
        }
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve until the shutdown broadcast fires, then drain.
    pub async fn run(self) -> Result<(), std::io::Error> {
        let DispatchServer {
            mut agent,
            listener,
            tls,
            coordinator,
            tracker,
            mut shutdown,
        } = self;

        tracing::info!(
            address = %listener.local_addr()?,
            tls = tls.is_some(),
            "Dispatch server starting"
        );

        let mut ticker = tokio::time::interval(TICK);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, peer, permit)) => {
                        let snapshot = ConnectionSnapshot::capture(&agent, peer);
                        spawn_connection(stream, snapshot, permit, &tracker, tls.clone());
                    }
                    Err(e) => tracing::warn!(error = %e, "Accept failed"),
                },
                _ = ticker.tick() => housekeeping(&mut agent, &coordinator).await,
                _ = shutdown.recv() => break,
            }
        }

        drop(listener);
        let grace = AgentSettings::from_config(&agent.config()).shutdown_grace;
        tracing::info!(
            in_flight = tracker.active_count(),
            grace = ?grace,
            "Stopped accepting, draining connections"
        );
        if !tracker.drain(grace).await {
            tracing::warn!(
                abandoned = tracker.active_count(),
                "Grace period elapsed with requests in flight"
            );
        }

        agent.shutdown();
        tracing::info!("Dispatch server stopped");
        Ok(())
    }
}

async fn housekeeping(agent: &mut Agent, coordinator: &ReloadCoordinator) {
    coordinator.poll(agent).await;

    let ttl = AgentSettings::from_config(&agent.config()).session_ttl;
    let purged = agent.context().sessions().purge_expired(ttl);
    if purged > 0 {
        tracing::debug!(purged, "Expired sessions removed");
    }
}

fn spawn_connection(
    stream: TcpStream,
    snapshot: ConnectionSnapshot,
    permit: ConnectionPermit,
    tracker: &ConnectionTracker,
    tls: Option<TlsAcceptor>,
) {
    let guard = tracker.track();
    tokio::spawn(async move {
        let _permit = permit;
        let peer = snapshot.peer;
        let result = match tls {
            Some(acceptor) => match acceptor.accept(stream).await {
                Ok(stream) => serve_connection(stream, snapshot).await,
                Err(e) => {
                    tracing::debug!(client = %peer, error = %e, "TLS handshake failed");
                    return;
                }
            },
            None => serve_connection(stream, snapshot).await,
        };
        if let Err(e) = result {
            tracing::debug!(client = %peer, connection_id = %guard.id(), error = %e, "Connection error");
        }
        drop(guard);
    });
}

async fn serve_connection<S>(stream: S, snapshot: ConnectionSnapshot) -> Result<(), hyper::Error>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let snapshot = Arc::new(snapshot);
    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
        let snapshot = snapshot.clone();
        async move { Ok::<_, Infallible>(dispatch(&snapshot, req.map(Body::new)).await) }
    });

    hyper::server::conn::http1::Builder::new()
        .keep_alive(false)
        .serve_connection(TokioIo::new(stream), service)
        .await
}

/// Answer one request against `snapshot`.
pub async fn dispatch(snapshot: &ConnectionSnapshot, req: Request<Body>) -> Response {
    let start = Instant::now();
    let request_id = Uuid::new_v4();
    let method = req.method().clone();
    let path = req.uri().path().to_string();

    let response = route(snapshot, req, request_id).await;

    let status = response.status();
    tracing::info!(
        client = %snapshot.peer,
        request_id = %request_id,
        method = %method,
        path = %path,
        status = status.as_u16(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Request served"
    );
    metrics::record_request(method.as_str(), status.as_u16(), start);
    response
}

async fn route(snapshot: &ConnectionSnapshot, req: Request<Body>, request_id: Uuid) -> Response {
    match *req.method() {
        Method::OPTIONS => return response::preflight(),
        Method::PUT => return response::no_content(),
        Method::GET | Method::POST | Method::DELETE => {}
        _ => return response::error(StatusCode::NOT_IMPLEMENTED, "Unsupported method."),
    }

    let (parts, body) = req.into_parts();
    let Ok(matched) = snapshot.routes.find(&parts.method, parts.uri.path()) else {
        return response::error(StatusCode::NOT_FOUND, "Not found.");
    };

    let body = if parts.method == Method::POST {
        match read_json_body(&parts.headers, body, snapshot.max_body_size).await {
            Ok(value) => Some(value),
            Err(e) => return respond_error(e, request_id),
        }
    } else {
        None
    };

    let ctx = RequestContext {
        request_id,
        method: parts.method,
        path: parts.uri.path().to_string(),
        query: parse_query(parts.uri.query()),
        headers: parts.headers,
        body,
        vars: matched.vars,
        config: snapshot.config.clone(),
        peer: snapshot.peer,
    };

    let handler = matched.route.handler().clone();
    let outcome = AssertUnwindSafe(async move { handler(ctx).await })
        .catch_unwind()
        .await;

    match outcome {
        Ok(Ok(value)) => response::json(StatusCode::OK, &value),
        Ok(Err(e)) => respond_error(e, request_id),
        Err(panic) => {
            let detail = panic
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            tracing::error!(request_id = %request_id, panic = %detail, "Handler panicked");
            response::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error.")
        }
    }
}

fn respond_error(error: HandlerError, request_id: Uuid) -> Response {
    match error {
        HandlerError::Http { status, message } => response::error(status, &message),
        HandlerError::Internal(e) => {
            tracing::error!(request_id = %request_id, error = %e, "Handler failed");
            response::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error.")
        }
    }
}
