//! Strata Collab - Real-time collaboration for stratigraphic projects
//!
//! This crate turns the document model of `strata-core` into shared rooms:
//! - Project: persisted room record with membership and invite state
//! - Store: persistence collaborator (SQLite, in-memory)
//! - Auth: signed bearer and invite tokens
//! - Session: connected clients of a room
//! - Protocol: client/server JSON frames
//! - Hub: one actor per room serializing edits, history and autosave
//! - Registry: process-wide map of resident rooms
//! - WebSocket: per-connection handler
//!
//! ## Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use strata_collab::{CollabConfig, MemoryStore, RoomRegistry, SignedTokenAuthenticator};
//!
//! let registry = RoomRegistry::new(
//!     Arc::new(MemoryStore::new()),
//!     Arc::new(SignedTokenAuthenticator::new("key", 86_400, 604_800)),
//!     CollabConfig::default(),
//! );
//! let app = axum::Router::new()
//!     .route("/ws/:room", axum::routing::get(strata_collab::ws_handler))
//!     .with_state(registry);
//! ```

#![forbid(unsafe_code)]

pub mod auth;
pub mod config;
pub mod error;
pub mod hub;
pub mod project;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod store;
pub mod websocket;

pub use auth::{AuthError, Authenticator, Invitation, SignedTokenAuthenticator};
pub use config::CollabConfig;
pub use error::{Error, Result};
pub use hub::{JoinTicket, RoomHandle, RoomSnapshot};
pub use project::{Identity, InviteRole, Members, Project, ProjectInfo, Role, RoomId, SharedLink};
pub use protocol::{ClientMessage, Inbound, ServerMessage};
pub use registry::{ActiveRoom, InvitationAccepted, RoomRegistry};
pub use session::{ActiveUser, Frame, SessionId};
pub use store::{MemoryStore, SqliteStore, Store, StoreError};
pub use websocket::{serve_connection, ws_handler, ConnectParams};
