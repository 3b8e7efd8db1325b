//! Operational HTTP surface: health probe and plain-text counters.
//!
//! Everything interesting happens over the chat transport; this
//! listener only exists so deployments can probe liveness and scrape a
//! handful of counters.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::State;
use axum::routing::get;
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;

#[derive(Debug, Default)]
/// Counters shared between the chat runtime and the HTTP surface.
pub struct RuntimeMetrics {
    reconcile_cycles: AtomicU64,
    processed_lines: AtomicU64,
    published_messages: AtomicU64,
    deleted_messages: AtomicU64,
    transport_failures: AtomicU64,
}

impl RuntimeMetrics {
    pub fn record_cycle(&self, processed_lines: usize) {
        self.reconcile_cycles.fetch_add(1, Ordering::Relaxed);
        self.processed_lines
            .fetch_add(processed_lines as u64, Ordering::Relaxed);
    }

    pub fn record_published(&self, messages: usize) {
        self.published_messages
            .fetch_add(messages as u64, Ordering::Relaxed);
    }

    pub fn record_deleted(&self, messages: usize) {
        self.deleted_messages
            .fetch_add(messages as u64, Ordering::Relaxed);
    }

    pub fn record_transport_failure(&self) {
        self.transport_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Renders the counters in text exposition format.
    pub fn render(&self) -> String {
        let mut out = String::new();
        for (name, value) in [
            ("larder_reconcile_cycles_total", &self.reconcile_cycles),
            ("larder_processed_lines_total", &self.processed_lines),
            ("larder_published_messages_total", &self.published_messages),
            ("larder_deleted_messages_total", &self.deleted_messages),
            ("larder_transport_failures_total", &self.transport_failures),
        ] {
            out.push_str("# TYPE ");
            out.push_str(name);
            out.push_str(" counter\n");
            out.push_str(name);
            out.push(' ');
            out.push_str(&value.load(Ordering::Relaxed).to_string());
            out.push('\n');
        }
        out
    }
}

/// Serves `/healthz` and `/metrics` until the process shuts down.
pub async fn run_http_surface(bind: SocketAddr, metrics: Arc<RuntimeMetrics>) -> Result<()> {
    let listener = TcpListener::bind(bind)
        .await
        .with_context(|| format!("failed to bind http surface on {bind}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve http surface listen address")?;
    tracing::info!(%local_addr, "http surface listening");

    let app = build_router(metrics);
    axum::serve(listener, app)
        .await
        .context("http surface exited unexpectedly")?;
    Ok(())
}

fn build_router(metrics: Arc<RuntimeMetrics>) -> Router {
    Router::new()
        .route("/healthz", get(handle_healthz))
        .route("/metrics", get(handle_metrics))
        .with_state(metrics)
}

async fn handle_healthz() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn handle_metrics(State(metrics): State<Arc<RuntimeMetrics>>) -> String {
    metrics.render()
}
