//! idp-reconciler -- submit documents to an asynchronous analysis provider and
//! reconcile each job to a terminal outcome.
//!
//! This crate provides the submission gateway, status probe, polling engine,
//! a bounded local history of executions, and a thin HTTP binding over them.

pub mod api;
pub mod config;
pub mod present;
pub mod probe;
pub mod provider;
pub mod reconcile;
pub mod storage;
pub mod submission;

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::config::AppConfig;
use crate::provider::HttpProvider;
use crate::reconcile::{PollPolicy, Reconciler, TokioClock};
use crate::storage::HistoryStore;

/// Wire the production reconciler: HTTP provider, tokio timer, SQLite ledger.
pub fn build_reconciler(config: &AppConfig) -> Result<Reconciler> {
    let provider = HttpProvider::new(&config.provider).context("failed to build provider client")?;
    let history = HistoryStore::open(&config.history).context("failed to open history store")?;
    tracing::info!(base_url = %provider.base_url(), "analysis provider configured");
    Ok(Reconciler::new(
        Arc::new(provider),
        Arc::new(TokioClock),
        PollPolicy::from(&config.polling),
        history,
    ))
}

/// Start the HTTP server. In-flight reconciliations are cancelled on Ctrl-C.
pub async fn serve(config: &AppConfig) -> Result<()> {
    let reconciler = build_reconciler(config)?;
    let inflight = reconciler.inflight().clone();
    let app = api::router(api::state::AppState { reconciler });

    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind))?;
    tracing::info!(%addr, "idp-reconciler listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(running = inflight.len(), "shutting down, cancelling reconciliations");
                inflight.cancel_all();
            }
        })
        .await?;

    Ok(())
}
