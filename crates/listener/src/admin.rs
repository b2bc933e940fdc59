//! Subscription management API, mounted under `/admin` when a token is set.
//!
//! | Method | Path | Result |
//! |--------|------|--------|
//! | `POST` | `/admin/routes` | 201 `{route, webhook_url}` |
//! | `GET` | `/admin/routes?target_id=` | 200 `[route]` |
//! | `DELETE` | `/admin/routes/{id}` | 204 |
//! | `POST` | `/admin/routes/{id}/enable`, `/disable` | 200 `route` |
//! | `GET` | `/admin/routes/{id}/history?limit=` | 200 `[{event_type, timestamp}]` |
//!
//! Every request needs `Authorization: Bearer <admin token>`. Secrets are
//! never returned.

use std::collections::BTreeSet;

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use pipeline::{
    Clock, EventType, PlatformName, RepositoryName, RouteConfig, RouteId, TargetId, TargetType,
    Timestamp,
};
use relay::NewRoute;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::response::ApiError;
use crate::AppState;

const DEFAULT_HISTORY_LIMIT: usize = 10;

pub(crate) fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/admin/routes", post(create_route).get(list_routes))
        .route("/admin/routes/{id}", delete(remove_route))
        .route("/admin/routes/{id}/enable", post(enable_route))
        .route("/admin/routes/{id}/disable", post(disable_route))
        .route("/admin/routes/{id}/history", get(route_history))
        .route_layer(middleware::from_fn_with_state(state, require_token))
}

async fn require_token(State(state): State<AppState>, request: Request, next: Next) -> Response {
    let authorized = match state.admin_token.as_deref() {
        Some(expected) => request
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .is_some_and(|token| token == expected),
        None => false,
    };

    if !authorized {
        warn!(uri = %request.uri(), "Rejected admin request without a valid token");
        return ApiError::Unauthorized.into_response();
    }
    next.run(request).await
}

// ---------------------------------------------------------------------------
// Wire types
// ---------------------------------------------------------------------------

#[derive(Debug, Deserialize)]
struct CreateRouteRequest {
    target_id: String,
    target_type: TargetType,
    platform: String,
    repository: String,
    events: Vec<String>,
    #[serde(default)]
    secret: Option<String>,
}

impl CreateRouteRequest {
    fn into_new_route(self) -> Result<NewRoute, ApiError> {
        let bad = |m: &str| ApiError::BadRequest(m.to_string());

        let target_id =
            TargetId::new(self.target_id.trim()).ok_or_else(|| bad("target_id is empty"))?;
        let platform =
            PlatformName::new(self.platform.trim()).ok_or_else(|| bad("platform is empty"))?;
        let repository = RepositoryName::parse(&self.repository)
            .ok_or_else(|| bad("repository must look like owner/name"))?;

        let mut events = BTreeSet::new();
        for tag in &self.events {
            let event = EventType::parse_tag(tag).ok_or_else(|| {
                ApiError::BadRequest(format!(
                    "unsupported event '{tag}'; expected one of: {}",
                    EventType::SUBSCRIBABLE.join(", ")
                ))
            })?;
            events.insert(event);
        }

        Ok(NewRoute {
            target_id,
            target_type: self.target_type,
            platform,
            repository,
            events,
            secret: self.secret,
        })
    }
}

/// A route as returned by the API, without its secret.
#[derive(Debug, Serialize)]
struct RouteView {
    id: RouteId,
    target_id: TargetId,
    target_type: TargetType,
    platform: PlatformName,
    repository: RepositoryName,
    events: BTreeSet<EventType>,
    has_secret: bool,
    enabled: bool,
    created_at: Timestamp,
    path: String,
}

impl RouteView {
    fn new(config: RouteConfig, prefix: &str) -> Self {
        Self {
            path: config.path(prefix).to_string(),
            has_secret: config.secret.as_deref().is_some_and(|s| !s.is_empty()),
            id: config.id,
            target_id: config.target_id,
            target_type: config.target_type,
            platform: config.platform,
            repository: config.repository,
            events: config.subscribed_events,
            enabled: config.enabled,
            created_at: config.created_at,
        }
    }
}

#[derive(Debug, Serialize)]
struct CreatedRoute {
    route: RouteView,
    webhook_url: String,
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    target_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct HistoryQuery {
    limit: Option<usize>,
}

#[derive(Debug, Serialize)]
struct HistoryEntry {
    event_type: EventType,
    timestamp: Timestamp,
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

async fn create_route(
    State(state): State<AppState>,
    body: Result<Json<CreateRouteRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedRoute>), ApiError> {
    let Json(request) = body.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    let new_route = request.into_new_route()?;

    let registry = state.relay.registry();
    let (config, _) = registry
        .create(new_route, state.relay.clock().now())
        .await?;

    let webhook_url = registry.webhook_url(&config, &state.base_url);
    Ok((
        StatusCode::CREATED,
        Json(CreatedRoute {
            route: RouteView::new(config, registry.prefix()),
            webhook_url,
        }),
    ))
}

async fn list_routes(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<RouteView>>, ApiError> {
    let target = query.target_id.and_then(TargetId::new);
    let registry = state.relay.registry();
    let routes = registry.list(target.as_ref()).await?;
    Ok(Json(
        routes
            .into_iter()
            .map(|c| RouteView::new(c, registry.prefix()))
            .collect(),
    ))
}

async fn remove_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.relay.remove_route(&route_id(id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn enable_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RouteView>, ApiError> {
    toggle(&state, id, true).await
}

async fn disable_route(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<RouteView>, ApiError> {
    toggle(&state, id, false).await
}

async fn toggle(
    state: &AppState,
    id: String,
    enabled: bool,
) -> Result<Json<RouteView>, ApiError> {
    let registry = state.relay.registry();
    let config = registry.set_enabled(&route_id(id)?, enabled).await?;
    Ok(Json(RouteView::new(config, registry.prefix())))
}

async fn route_history(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<Json<Vec<HistoryEntry>>, ApiError> {
    let config = state.relay.registry().get(&route_id(id)?).await?;
    let limit = query.limit.unwrap_or(DEFAULT_HISTORY_LIMIT);
    Ok(Json(
        state
            .relay
            .recent_history(&config, limit)
            .into_iter()
            .map(|r| HistoryEntry {
                event_type: r.event_type,
                timestamp: r.timestamp,
            })
            .collect(),
    ))
}

fn route_id(raw: String) -> Result<RouteId, ApiError> {
    RouteId::new(raw).ok_or_else(|| ApiError::BadRequest("route id is empty".to_string()))
}
