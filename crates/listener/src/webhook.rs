use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::Response;
use bytes::Bytes;
use relay::{Delivery, Outcome, RejectReason};
use tracing::debug;

use crate::response;
use crate::AppState;

pub(crate) const EVENT_HEADER: &str = "x-github-event";
pub(crate) const DELIVERY_HEADER: &str = "x-github-delivery";
pub(crate) const SIGNATURE_HEADER: &str = "x-hub-signature-256";

/// `POST /<prefix>/<target>_<route>`.
pub(crate) async fn handle_webhook(
    State(state): State<AppState>,
    Path(hook): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let path = format!("/{}/{hook}", state.relay.settings().path_prefix.trim_matches('/'));

    let delivery = Delivery {
        event_type: header(&headers, EVENT_HEADER).unwrap_or_default(),
        delivery_id: header(&headers, DELIVERY_HEADER),
        signature: header(&headers, SIGNATURE_HEADER),
        body,
    };

    let Some(outcome) = state.relay.handle(&path, delivery).await else {
        debug!(path = %path, "No live route for webhook path");
        return response::not_found();
    };

    match outcome {
        Outcome::Dispatched
        | Outcome::Recorded
        | Outcome::Suppressed
        | Outcome::Rejected(RejectReason::UnsubscribedEvent) => response::ok(),
        Outcome::Rejected(RejectReason::InvalidSignature) => {
            response::error(StatusCode::UNAUTHORIZED, "Invalid signature")
        }
        Outcome::Rejected(RejectReason::InvalidPayload) => {
            response::error(StatusCode::BAD_REQUEST, "Invalid JSON")
        }
        Outcome::Failed => response::error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error"),
    }
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_owned)
}
