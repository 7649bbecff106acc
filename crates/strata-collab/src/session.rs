//! Session Registry
//!
//! Connected clients of one room. Owned by the room hub; every outbound
//! frame for a connection goes through its bounded queue and is written to
//! the socket by that connection's own task.

use rand::seq::SliceRandom;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::TrySendError};
use uuid::Uuid;

use crate::project::{Identity, Role};

/// Ephemeral connection id
pub type SessionId = Uuid;

/// Serialized outbound frame
pub type Frame = Arc<str>;

/// Per-connection outbound queue
pub type Outbound = mpsc::Sender<Frame>;

/// Presence colors handed out to joining users
pub const PALETTE: [&str; 9] = [
    "#FF5733", "#33FF57", "#3357FF", "#F0E68C", "#FF33A6", "#33FFF8", "#FF8333", "#B3FF33",
    "#C33FFF",
];

/// Pick a presence color; colors may repeat within a room
#[must_use]
pub fn random_color() -> String {
    PALETTE
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(PALETTE[0])
        .to_string()
}

/// One connected client
#[derive(Debug)]
pub struct Session {
    pub id: SessionId,
    pub identity: Identity,
    pub role: Role,
    pub color: String,
    /// Section the user is currently editing
    pub editing: Option<String>,
    outbound: Outbound,
}

impl Session {
    /// Create a session with a fresh id and color
    #[must_use]
    pub fn new(identity: Identity, role: Role, outbound: Outbound) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity,
            role,
            color: random_color(),
            editing: None,
            outbound,
        }
    }

    /// Queue a frame without waiting.
    ///
    /// Returns `false` if the queue is full or the connection is gone.
    pub fn send(&self, frame: &Frame) -> bool {
        match self.outbound.try_send(frame.clone()) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                tracing::warn!(session_id = %self.id, "outbound queue full, dropping peer");
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }

    /// Clone of the outbound queue, for replies sent from outside the hub
    #[must_use]
    pub fn outbound(&self) -> Outbound {
        self.outbound.clone()
    }
}

/// Roster entry of the initial sync frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RosterEntry {
    pub name: String,
    pub color: String,
}

/// "Who is editing what" entry of the initial sync frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EditingEntry {
    pub name: String,
    pub color: String,
    pub id: SessionId,
}

/// Active user summary for room listings
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActiveUser {
    pub email: String,
    pub editing: String,
    pub color: String,
}

/// Sessions of one room
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: HashMap<SessionId, Session>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: Session) {
        self.sessions.insert(session.id, session);
    }

    pub fn remove(&mut self, id: &SessionId) -> Option<Session> {
        self.sessions.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: &SessionId) -> Option<&Session> {
        self.sessions.get(id)
    }

    pub fn get_mut(&mut self, id: &SessionId) -> Option<&mut Session> {
        self.sessions.get_mut(id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Queue a frame to one session
    pub fn send_to(&self, id: &SessionId, frame: &Frame) -> bool {
        self.sessions.get(id).is_some_and(|s| s.send(frame))
    }

    /// Queue a frame to every session except `except`.
    ///
    /// Returns the sessions whose queue rejected the frame.
    pub fn broadcast_except(&self, except: Option<&SessionId>, frame: &Frame) -> Vec<SessionId> {
        self.sessions
            .values()
            .filter(|s| Some(&s.id) != except)
            .filter(|s| !s.send(frame))
            .map(|s| s.id)
            .collect()
    }

    /// Queue a frame to every session
    pub fn broadcast(&self, frame: &Frame) -> Vec<SessionId> {
        self.broadcast_except(None, frame)
    }

    /// Connected users keyed by session id
    #[must_use]
    pub fn roster(&self) -> BTreeMap<String, RosterEntry> {
        self.sessions
            .values()
            .map(|s| {
                (
                    s.id.to_string(),
                    RosterEntry {
                        name: s.identity.email.clone(),
                        color: s.color.clone(),
                    },
                )
            })
            .collect()
    }

    /// Editing sections keyed by section name
    #[must_use]
    pub fn editing(&self) -> BTreeMap<String, EditingEntry> {
        self.sessions
            .values()
            .filter_map(|s| {
                s.editing.as_ref().map(|section| {
                    (
                        section.clone(),
                        EditingEntry {
                            name: s.identity.email.clone(),
                            color: s.color.clone(),
                            id: s.id,
                        },
                    )
                })
            })
            .collect()
    }

    /// Summary of every connected user
    #[must_use]
    pub fn active_users(&self) -> Vec<ActiveUser> {
        self.sessions
            .values()
            .map(|s| ActiveUser {
                email: s.identity.email.clone(),
                editing: s.editing.clone().unwrap_or_default(),
                color: s.color.clone(),
            })
            .collect()
    }

    /// Remove and return every session
    pub fn drain(&mut self) -> Vec<Session> {
        self.sessions.drain().map(|(_, s)| s).collect()
    }
}
