//! Liveness endpoint

use axum::extract::State;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use strata_collab::RoomRegistry;

/// Simple health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub resident_rooms: usize,
}

async fn health(State(registry): State<RoomRegistry>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy",
        version: env!("CARGO_PKG_VERSION"),
        resident_rooms: registry.len(),
    })
}

/// Health routes
pub fn health_routes() -> Router<RoomRegistry> {
    Router::new().route("/health", get(health))
}
