//! Room listing and invitation endpoints

use axum::extract::State;
use axum::response::Json;
use axum::routing::{get, post};
use axum::Router;
use serde::Deserialize;
use strata_collab::{ActiveRoom, InvitationAccepted, RoomRegistry};
use tracing::info;

use super::ApiError;
use crate::middleware::auth::RequireIdentity;

/// Body of `POST /validate-invitation`
#[derive(Debug, Deserialize)]
pub struct InvitationRequest {
    pub token: String,
}

async fn active_rooms(
    RequireIdentity(_identity): RequireIdentity,
    State(registry): State<RoomRegistry>,
) -> Json<Vec<ActiveRoom>> {
    Json(registry.active_rooms().await)
}

async fn validate_invitation(
    RequireIdentity(identity): RequireIdentity,
    State(registry): State<RoomRegistry>,
    Json(request): Json<InvitationRequest>,
) -> Result<Json<InvitationAccepted>, ApiError> {
    let accepted = registry
        .accept_invitation(&identity, &request.token)
        .await?;
    info!(
        room_id = %accepted.room_id,
        user = %identity.email,
        "invitation validated"
    );
    Ok(Json(accepted))
}

/// Room routes
pub fn rooms_routes() -> Router<RoomRegistry> {
    Router::new()
        .route("/rooms/active", get(active_rooms))
        .route("/validate-invitation", post(validate_invitation))
}
