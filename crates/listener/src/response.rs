//! JSON response bodies shared by every endpoint.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use relay::RegistryError;
use serde::Serialize;
use tracing::error;

#[derive(Debug, Serialize)]
struct StatusBody<'a> {
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<&'a str>,
}

/// `200 {"status":"ok"}`.
pub(crate) fn ok() -> Response {
    (
        StatusCode::OK,
        Json(StatusBody {
            status: "ok",
            message: None,
        }),
    )
        .into_response()
}

/// `{"status":"error","message":...}` with the given status.
pub(crate) fn error(status: StatusCode, message: &str) -> Response {
    (
        status,
        Json(StatusBody {
            status: "error",
            message: Some(message),
        }),
    )
        .into_response()
}

pub(crate) fn not_found() -> Response {
    error(StatusCode::NOT_FOUND, "Not found")
}

/// Failure of an admin request.
#[derive(Debug)]
pub(crate) enum ApiError {
    BadRequest(String),
    Unauthorized,
    Registry(RegistryError),
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        Self::Registry(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        match self {
            Self::BadRequest(message) => error(StatusCode::BAD_REQUEST, &message),
            Self::Unauthorized => error(StatusCode::UNAUTHORIZED, "Unauthorized"),
            Self::Registry(e) => match e {
                RegistryError::NotFound { .. } => not_found(),
                RegistryError::Invalid { .. } => error(StatusCode::BAD_REQUEST, &e.to_string()),
                RegistryError::Disabled { .. } => error(StatusCode::CONFLICT, &e.to_string()),
                RegistryError::IdCollision { .. } | RegistryError::Store(_) => {
                    error!(error = %e, "Admin request failed");
                    error(StatusCode::INTERNAL_SERVER_ERROR, "Internal error")
                }
            },
        }
    }
}
