//! Bearer authentication extractor

use axum::{
    extract::{FromRef, FromRequestParts},
    http::request::Parts,
};
use strata_collab::{AuthError, Identity, RoomRegistry};

use crate::api::ApiError;

/// Authenticated caller, resolved from `Authorization: Bearer <token>`
pub struct RequireIdentity(pub Identity);

#[async_trait::async_trait]
impl<S> FromRequestParts<S> for RequireIdentity
where
    S: Send + Sync,
    RoomRegistry: FromRef<S>,
{
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &S,
    ) -> std::result::Result<Self, Self::Rejection> {
        let registry = RoomRegistry::from_ref(state);
        let token = extract_token(parts)?;
        let identity = registry.authenticator().verify_bearer(&token)?;
        Ok(RequireIdentity(identity))
    }
}

fn extract_token(parts: &Parts) -> std::result::Result<String, AuthError> {
    parts
        .headers
        .get("authorization")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(|token| token.trim().to_string())
        .filter(|token| !token.is_empty())
        .ok_or(AuthError::MissingCredentials)
}
