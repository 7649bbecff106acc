//! HTTP API for Strata
//!
//! - `GET /health`: liveness
//! - `GET /rooms/active`: resident rooms and their users
//! - `POST /validate-invitation`: accept an invite link
//! - `GET /ws/:room`: collaboration socket

pub mod health;
pub mod rooms;


use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::Serialize;
use strata_collab::{AuthError, RoomRegistry};

pub use health::health_routes;
pub use rooms::rooms_routes;

/// Build the application router
pub fn router(registry: RoomRegistry) -> Router {
    Router::new()
        .merge(health_routes())
        .merge(rooms_routes())
        .route("/ws/:room", get(strata_collab::ws_handler))
        .with_state(registry)
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    success: bool,
    error: String,
    code: &'static str,
}

/// JSON error response
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            success: false,
            error: self.message,
            code: self.code,
        };
        (self.status, Json(body)).into_response()
    }
}

impl From<strata_collab::Error> for ApiError {
    fn from(err: strata_collab::Error) -> Self {
        use strata_collab::Error;

        let status = match &err {
            Error::Client(_) => StatusCode::BAD_REQUEST,
            Error::PermissionDenied(_) => StatusCode::FORBIDDEN,
            Error::Auth(AuthError::Internal(_)) => StatusCode::INTERNAL_SERVER_ERROR,
            Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Closed => StatusCode::SERVICE_UNAVAILABLE,
            Error::Persistence(_) | Error::InternalFault(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            code: err.code(),
            message: err.to_string(),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        strata_collab::Error::from(err).into()
    }
}
