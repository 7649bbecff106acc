//! Room Registry
//!
//! Process-wide map of resident rooms. A room is loaded and its hub started
//! on first join; the hub removes itself when it closes. Entries are tagged
//! with the hub generation so a closing hub never evicts its successor.

use dashmap::DashMap;
use serde::Serialize;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use tokio::sync::OnceCell;
use tracing::{debug, info};
use uuid::Uuid;

use crate::auth::Authenticator;
use crate::config::CollabConfig;
use crate::error::{Error, Result};
use crate::hub::RoomHandle;
use crate::project::{Identity, InviteRole, RoomId};
use crate::session::ActiveUser;
use crate::store::Store;

type Slot = Arc<OnceCell<RoomHandle>>;
type RoomMap = DashMap<RoomId, Slot>;

/// Resident room with its connected users
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveRoom {
    #[serde(rename = "roomID")]
    pub room_id: RoomId,
    pub users: Vec<ActiveUser>,
}

/// Outcome of a successful invitation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InvitationAccepted {
    pub status: &'static str,
    pub room_id: RoomId,
    pub role: InviteRole,
}

/// Registry of resident rooms
#[derive(Clone)]
pub struct RoomRegistry {
    rooms: Arc<RoomMap>,
    store: Arc<dyn Store>,
    authenticator: Arc<dyn Authenticator>,
    config: CollabConfig,
}

impl RoomRegistry {
    /// Create an empty registry
    pub fn new(
        store: Arc<dyn Store>,
        authenticator: Arc<dyn Authenticator>,
        config: CollabConfig,
    ) -> Self {
        Self {
            rooms: Arc::new(DashMap::new()),
            store,
            authenticator,
            config,
        }
    }

    /// Collaboration settings
    #[must_use]
    pub fn config(&self) -> &CollabConfig {
        &self.config
    }

    /// Project store
    #[must_use]
    pub fn store(&self) -> &Arc<dyn Store> {
        &self.store
    }

    /// Token authenticator
    #[must_use]
    pub fn authenticator(&self) -> &Arc<dyn Authenticator> {
        &self.authenticator
    }

    /// Number of resident rooms
    #[must_use]
    pub fn len(&self) -> usize {
        self.rooms.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rooms.is_empty()
    }

    /// Whether a room has an entry, loaded or loading
    #[must_use]
    pub fn contains(&self, room_id: &str) -> bool {
        self.rooms.contains_key(room_id)
    }

    /// Return the resident hub for a room, loading the room if needed.
    ///
    /// Concurrent callers for the same room share a single load.
    pub async fn get_or_create(&self, room_id: &str) -> Result<RoomHandle> {
        loop {
            let slot = self.rooms.entry(room_id.to_string()).or_default().clone();

            let result = slot
                .get_or_try_init(|| async {
                    let project = self.store.load(room_id).await?;
                    info!(room_id = %room_id, "room loaded");
                    Ok::<_, Error>(RoomHandle::spawn(
                        project,
                        self.store.clone(),
                        self.authenticator.clone(),
                        self.config.clone(),
                        self.evictor(room_id),
                    ))
                })
                .await;

            match result {
                Ok(handle) if !handle.is_closed() => return Ok(handle.clone()),
                Ok(handle) => {
                    debug!(room_id = %room_id, "dropping stale room entry");
                    self.evict(room_id, handle.generation());
                }
                Err(e) => {
                    self.rooms
                        .remove_if(room_id, |_, current| Arc::ptr_eq(current, &slot));
                    return Err(e);
                }
            }
        }
    }

    /// Resident hub for a room, without loading it
    #[must_use]
    pub fn resident(&self, room_id: &str) -> Option<RoomHandle> {
        self.rooms
            .get(room_id)
            .and_then(|slot| slot.get().cloned())
            .filter(|handle| !handle.is_closed())
    }

    /// Remove a room's entry if it still belongs to `generation`
    pub fn evict(&self, room_id: &str, generation: Uuid) -> bool {
        evict_generation(&self.rooms, room_id, generation)
    }

    fn evictor(&self, room_id: &str) -> crate::hub::OnClose {
        let rooms = Arc::downgrade(&self.rooms);
        let room_id = room_id.to_string();
        Box::new(move |generation| {
            if let Some(rooms) = rooms.upgrade() {
                evict_generation(&rooms, &room_id, generation);
            }
        })
    }

    /// Resident rooms that have connected users
    pub async fn active_rooms(&self) -> Vec<ActiveRoom> {
        let handles: Vec<RoomHandle> = self
            .rooms
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect();

        let mut rooms = Vec::with_capacity(handles.len());
        for handle in handles {
            let Ok(snapshot) = handle.snapshot().await else {
                continue;
            };
            if snapshot.users.is_empty() {
                continue;
            }
            rooms.push(ActiveRoom {
                room_id: handle.room_id().to_string(),
                users: snapshot.users,
            });
        }
        rooms.sort_by(|a, b| a.room_id.cmp(&b.room_id));
        rooms
    }

    /// Save unsaved changes of every resident room; returns how many rooms
    /// were flushed
    pub async fn flush_all(&self) -> usize {
        let handles: Vec<RoomHandle> = self
            .rooms
            .iter()
            .filter_map(|entry| entry.value().get().cloned())
            .collect();

        let mut flushed = 0;
        for handle in handles {
            match handle.flush().await {
                Ok(()) => flushed += 1,
                Err(e) => {
                    debug!(room_id = %handle.room_id(), error = %e, "room closed before flush");
                }
            }
        }
        info!(rooms = flushed, "flushed resident rooms");
        flushed
    }

    /// Admit the bearer of an invite token to the room it names.
    ///
    /// The token's secret must match the room's current invite secret; users
    /// that already hold a role keep it.
    pub async fn accept_invitation(
        &self,
        identity: &Identity,
        token: &str,
    ) -> Result<InvitationAccepted> {
        let invitation = self.authenticator.verify_invite(token)?;
        let room_id = invitation.room_id;
        let resident = self.resident(&room_id);

        let (members, secret) = match &resident {
            Some(handle) => match handle.invitation_state().await {
                Ok(state) => state,
                Err(Error::Closed) => self.store.members_and_secret(&room_id).await?,
                Err(e) => return Err(e),
            },
            None => self.store.members_and_secret(&room_id).await?,
        };

        let valid = !secret.is_empty()
            && bool::from(secret.as_bytes().ct_eq(invitation.secret.as_bytes()));
        if !valid {
            info!(room_id = %room_id, user = %identity.email, "stale invitation");
            return Err(Error::permission_denied("Invitation is no longer valid"));
        }

        if members.role_of(&identity.email).is_none() {
            if let Some(handle) = &resident {
                match handle.admit(&identity.email, invitation.role).await {
                    Ok(_) | Err(Error::Closed) => {}
                    Err(e) => return Err(e),
                }
            }
            self.store
                .add_member(&room_id, &identity.email, invitation.role)
                .await?;
            info!(
                room_id = %room_id,
                user = %identity.email,
                role = invitation.role.as_str(),
                "invitation accepted"
            );
        }

        Ok(InvitationAccepted {
            status: "valid",
            room_id,
            role: invitation.role,
        })
    }
}

fn evict_generation(rooms: &RoomMap, room_id: &str, generation: Uuid) -> bool {
    let removed = rooms
        .remove_if(room_id, |_, slot| {
            slot.get()
                .is_some_and(|handle| handle.generation() == generation)
        })
        .is_some();
    if removed {
        info!(room_id = %room_id, "room evicted");
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SignedTokenAuthenticator;
    use crate::project::Project;
    use crate::store::MemoryStore;
    use tokio::sync::mpsc;

    fn registry(store: Arc<MemoryStore>) -> RoomRegistry {
        RoomRegistry::new(
            store,
            Arc::new(SignedTokenAuthenticator::new("k", 60, 60)),
            CollabConfig::default(),
        )
    }

    fn store() -> Arc<MemoryStore> {
        Arc::new(MemoryStore::with_projects([Project::new(
            "r1",
            "Room 1",
            "owner@example.com",
        )]))
    }

    #[tokio::test]
    async fn test_concurrent_loads_share_one_hub() {
        let registry = registry(store());

        let (a, b) = tokio::join!(registry.get_or_create("r1"), registry.get_or_create("r1"));
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(a.generation(), b.generation());
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_missing_room_leaves_no_entry() {
        let registry = registry(store());

        let err = registry.get_or_create("nope").await.unwrap_err();
        assert_eq!(err.code(), "room_not_found");
        assert!(!registry.contains("nope"));
    }

    #[tokio::test]
    async fn test_evict_ignores_other_generation() {
        let registry = registry(store());
        let handle = registry.get_or_create("r1").await.unwrap();

        assert!(!registry.evict("r1", Uuid::new_v4()));
        assert!(registry.contains("r1"));
        assert!(registry.evict("r1", handle.generation()));
        assert!(registry.resident("r1").is_none());
    }

    #[tokio::test]
    async fn test_active_rooms_lists_connected_users() {
        let registry = registry(store());
        let handle = registry.get_or_create("r1").await.unwrap();
        let (tx, _rx) = mpsc::channel(8);
        handle
            .join(Identity::new("owner@example.com", "Owner"), tx)
            .await
            .unwrap();

        let rooms = registry.active_rooms().await;
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].room_id, "r1");
        assert_eq!(rooms[0].users[0].email, "owner@example.com");

        let json = serde_json::to_value(&rooms[0]).unwrap();
        assert_eq!(json["roomID"], "r1");
    }

    #[tokio::test]
    async fn test_flush_all_saves_only_unsaved_rooms() {
        let store = store();
        let registry = registry(store.clone());
        let handle = registry.get_or_create("r1").await.unwrap();
        let (tx, _rx) = mpsc::channel(8);
        let ticket = handle
            .join(Identity::new("owner@example.com", "Owner"), tx)
            .await
            .unwrap();

        assert_eq!(registry.flush_all().await, 1);
        assert_eq!(store.save_count("r1").await, 0);

        let edit = strata_core::Edit::from_parts("addRow", serde_json::json!({ "rowIndex": -1 }))
            .unwrap();
        handle
            .submit(ticket.session_id, crate::protocol::ClientMessage::Edit(edit))
            .await
            .unwrap();

        assert_eq!(registry.flush_all().await, 1);
        assert_eq!(store.save_count("r1").await, 1);
        assert_eq!(store.get("r1").await.unwrap().document.rows.len(), 1);

        registry.flush_all().await;
        assert_eq!(store.save_count("r1").await, 1);
        assert!(registry.contains("r1"));
    }
}
