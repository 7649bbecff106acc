//! Token authentication
//!
//! Bearer tokens identify a user; invite tokens admit a user to a room's
//! editor or reader list as long as the room's invite secret is unchanged.
//! Both are `base64url(claims).hex(hmac_sha256(base64url(claims)))`.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tracing::debug;

use crate::project::{Identity, InviteRole, RoomId};

type HmacSha256 = Hmac<Sha256>;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// No credentials provided
    #[error("Authentication required")]
    MissingCredentials,

    /// Malformed token or bad signature
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// Token past its expiry
    #[error("Token expired")]
    Expired,

    /// Internal error
    #[error("Auth internal error: {0}")]
    Internal(String),
}

impl AuthError {
    /// Get error code for protocol messages
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "missing_credentials",
            Self::InvalidCredentials => "invalid_credentials",
            Self::Expired => "token_expired",
            Self::Internal(_) => "auth_internal",
        }
    }
}

/// Verified contents of an invite token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invitation {
    pub room_id: RoomId,
    pub role: InviteRole,
    pub secret: String,
}

/// Identity collaborator of the connection handler
pub trait Authenticator: Send + Sync {
    /// Resolve a bearer token to a user identity
    fn verify_bearer(&self, token: &str) -> Result<Identity, AuthError>;

    /// Verify an invite token
    fn verify_invite(&self, token: &str) -> Result<Invitation, AuthError>;

    /// Issue an invite token for a room's membership list
    fn issue_invite(
        &self,
        room_id: &str,
        role: InviteRole,
        secret: &str,
    ) -> Result<String, AuthError>;
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "typ", rename_all = "lowercase")]
enum Claims {
    Bearer {
        sub: String,
        name: String,
        exp: i64,
    },
    Invite {
        room: String,
        role: InviteRole,
        secret: String,
        exp: i64,
    },
}

impl Claims {
    fn exp(&self) -> i64 {
        match self {
            Self::Bearer { exp, .. } | Self::Invite { exp, .. } => *exp,
        }
    }
}

/// HMAC-SHA256 signed token authenticator
pub struct SignedTokenAuthenticator {
    key: Vec<u8>,
    bearer_ttl: Duration,
    invite_ttl: Duration,
}

impl SignedTokenAuthenticator {
    /// Create an authenticator with the given signing key and token lifetimes
    #[must_use]
    pub fn new(key: impl AsRef<[u8]>, bearer_ttl_secs: i64, invite_ttl_secs: i64) -> Self {
        Self {
            key: key.as_ref().to_vec(),
            bearer_ttl: Duration::seconds(bearer_ttl_secs),
            invite_ttl: Duration::seconds(invite_ttl_secs),
        }
    }

    /// Issue a bearer token for a user
    pub fn issue_bearer(&self, identity: &Identity) -> Result<String, AuthError> {
        self.sign(&Claims::Bearer {
            sub: identity.email.clone(),
            name: identity.display_name.clone(),
            exp: (Utc::now() + self.bearer_ttl).timestamp(),
        })
    }

    fn mac(&self, payload: &str) -> Result<String, AuthError> {
        let mut mac = HmacSha256::new_from_slice(&self.key)
            .map_err(|_| AuthError::Internal("invalid signing key".to_string()))?;
        mac.update(payload.as_bytes());
        Ok(hex::encode(mac.finalize().into_bytes()))
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthError> {
        let json = serde_json::to_vec(claims).map_err(|e| AuthError::Internal(e.to_string()))?;
        let payload = URL_SAFE_NO_PAD.encode(json);
        let signature = self.mac(&payload)?;
        Ok(format!("{payload}.{signature}"))
    }

    fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        if token.is_empty() {
            return Err(AuthError::MissingCredentials);
        }

        let (payload, signature) = token
            .split_once('.')
            .ok_or(AuthError::InvalidCredentials)?;

        let expected = self.mac(payload)?;
        let matches: bool = expected.as_bytes().ct_eq(signature.as_bytes()).into();
        if !matches {
            debug!("token signature mismatch");
            return Err(AuthError::InvalidCredentials);
        }

        let json = URL_SAFE_NO_PAD
            .decode(payload)
            .map_err(|_| AuthError::InvalidCredentials)?;
        let claims: Claims =
            serde_json::from_slice(&json).map_err(|_| AuthError::InvalidCredentials)?;

        if claims.exp() < Utc::now().timestamp() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }
}

impl Authenticator for SignedTokenAuthenticator {
    fn verify_bearer(&self, token: &str) -> Result<Identity, AuthError> {
        match self.verify(token)? {
            Claims::Bearer { sub, name, .. } => Ok(Identity::new(sub, name)),
            Claims::Invite { .. } => Err(AuthError::InvalidCredentials),
        }
    }

    fn verify_invite(&self, token: &str) -> Result<Invitation, AuthError> {
        match self.verify(token)? {
            Claims::Invite {
                room, role, secret, ..
            } => Ok(Invitation {
                room_id: room,
                role,
                secret,
            }),
            Claims::Bearer { .. } => Err(AuthError::InvalidCredentials),
        }
    }

    fn issue_invite(
        &self,
        room_id: &str,
        role: InviteRole,
        secret: &str,
    ) -> Result<String, AuthError> {
        self.sign(&Claims::Invite {
            room: room_id.to_string(),
            role,
            secret: secret.to_string(),
            exp: (Utc::now() + self.invite_ttl).timestamp(),
        })
    }
}
