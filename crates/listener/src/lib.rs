//! HTTP surface of the relay.
//!
//! Builds the axum [`Router`] serving:
//!
//! | Path | Purpose |
//! |------|---------|
//! | `POST /<prefix>/<target>_<route>` | GitHub webhook intake |
//! | `GET /healthz` | liveness and live route count |
//! | `/admin/...` | subscription management (only with an admin token) |
//!
//! ## Architectural Layer
//!
//! **Infrastructure.** Header extraction, status codes and JSON bodies live
//! here. Each webhook request is turned into a [`relay::Delivery`] and the
//! returned [`relay::Outcome`] into a response:
//!
//! | Outcome | Status | Body |
//! |---------|--------|------|
//! | dispatched, recorded, suppressed, unsubscribed | 200 | `{"status":"ok"}` |
//! | invalid signature | 401 | `Invalid signature` |
//! | invalid payload | 400 | `Invalid JSON` |
//! | failed | 500 | `Internal error` |
//! | no live route | 404 | `Not found` |
//!
//! Error bodies are `{"status":"error","message":...}` and never carry
//! internal detail.

use std::future::Future;
use std::sync::Arc;

use axum::extract::{DefaultBodyLimit, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use relay::Relay;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tracing::info;

mod admin;
mod response;
mod webhook;

/// GitHub caps webhook payloads at 25 MB.
const MAX_WEBHOOK_BODY: usize = 25 * 1024 * 1024;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub relay: Arc<Relay>,
    /// Public base URL used to build webhook URLs for new routes.
    pub base_url: String,
    /// Bearer token for the admin API; `None` leaves it unmounted.
    pub admin_token: Option<String>,
}

/// Builds the router for `state`.
pub fn router(state: AppState) -> Router {
    let prefix = state.relay.settings().path_prefix.trim_matches('/').to_string();

    let mut app = Router::new()
        .route(
            &format!("/{prefix}/{{hook}}"),
            post(webhook::handle_webhook).layer(DefaultBodyLimit::max(MAX_WEBHOOK_BODY)),
        )
        .route("/healthz", get(health));

    if state.admin_token.as_deref().is_some_and(|t| !t.is_empty()) {
        app = app.merge(admin::router(state.clone()));
    } else {
        info!("Admin API disabled (no admin token configured)");
    }

    app.fallback(|| async { response::not_found() })
        .with_state(state)
}

/// Serves `app` on `listener` until `shutdown` resolves, then drains
/// in-flight requests.
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> std::io::Result<()> {
    if let Ok(addr) = listener.local_addr() {
        info!(addr = %addr, "HTTP server listening");
    }
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
}

async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "routes": state.relay.registry().live_count(),
    }))
}
