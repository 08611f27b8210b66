//! Axum-based HTTP gateway over the run store and run loop.
//!
//! - Request body size limits (64KB max)
//! - Request timeouts (30s) on everything except execution
//! - Per-run-id in-flight guard so one process never executes a run twice
//!   at the same time

mod handlers;

use handlers::{
    handle_create_run, handle_delete_run, handle_execute_run, handle_get_run, handle_health,
    handle_list_runs,
};

use crate::config::RunsConfig;
use crate::runner::RunLoop;
use anyhow::Result;
use axum::{
    Router,
    http::StatusCode,
    routing::{get, post},
};
use std::collections::HashSet;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;

/// Maximum request body size (64KB)
pub const MAX_BODY_SIZE: usize = 65_536;
/// Request timeout for CRUD routes
pub const REQUEST_TIMEOUT_SECS: u64 = 30;
/// Response timeout for execution. The run itself keeps going in the
/// background if the caller gives up first.
pub const EXECUTE_TIMEOUT_SECS: u64 = 900;

/// Run ids with an execution in progress in this process.
#[derive(Clone, Default)]
pub struct InFlight(Arc<Mutex<HashSet<String>>>);

impl InFlight {
    /// Claim `run_id`; `None` if it is already claimed.
    pub fn try_claim(&self, run_id: &str) -> Option<InFlightGuard> {
        let mut active = self.0.lock().unwrap_or_else(PoisonError::into_inner);
        if active.insert(run_id.to_string()) {
            Some(InFlightGuard {
                set: self.clone(),
                run_id: run_id.to_string(),
            })
        } else {
            None
        }
    }
}

/// Releases its run id on drop.
pub struct InFlightGuard {
    set: InFlight,
    run_id: String,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set
            .0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.run_id);
    }
}

/// Shared state for all axum handlers
#[derive(Clone)]
pub struct AppState {
    pub runner: RunLoop,
    pub runs: RunsConfig,
    pub in_flight: InFlight,
}

impl AppState {
    pub fn new(runner: RunLoop, runs: RunsConfig) -> Self {
        Self {
            runner,
            runs,
            in_flight: InFlight::default(),
        }
    }
}

/// Create-run request body
#[derive(Debug, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRunBody {
    pub title: Option<String>,
    pub task_text: Option<String>,
    pub max_attempts: Option<i64>,
    pub target_score: Option<i64>,
}

pub fn router(state: AppState) -> Router {
    let execute = Router::new()
        .route("/api/runs/{id}/execute", post(handle_execute_run))
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(EXECUTE_TIMEOUT_SECS),
        ));

    let crud = Router::new()
        .route("/health", get(handle_health))
        .route("/api/runs", get(handle_list_runs).post(handle_create_run))
        .route(
            "/api/runs/{id}",
            get(handle_get_run).delete(handle_delete_run),
        )
        .layer(TimeoutLayer::with_status_code(
            StatusCode::REQUEST_TIMEOUT,
            Duration::from_secs(REQUEST_TIMEOUT_SECS),
        ));

    crud.merge(execute)
        .with_state(state)
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
}

/// Run the HTTP gateway on `host:port` until Ctrl-C.
pub async fn run_gateway(host: &str, port: u16, state: AppState) -> Result<()> {
    let addr: SocketAddr = format!("{host}:{port}").parse()?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    run_gateway_with_listener(listener, state).await
}

/// Run the HTTP gateway from a pre-bound listener.
pub async fn run_gateway_with_listener(
    listener: tokio::net::TcpListener,
    state: AppState,
) -> Result<()> {
    let local_addr = listener.local_addr()?;
    let backend = state.runner.backends().mode();

    println!("◆ Gateway listening on http://{local_addr} ({backend} backend)");
    println!("  GET    /health");
    println!("  GET    /api/runs");
    println!("  POST   /api/runs");
    println!("  GET    /api/runs/{{id}}");
    println!("  DELETE /api/runs/{{id}}");
    println!("  POST   /api/runs/{{id}}/execute");
    println!("  Press Ctrl+C to stop.\n");

    tracing::info!(%local_addr, %backend, "gateway started");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("gateway stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for Ctrl+C");
        std::future::pending::<()>().await;
    }
}
