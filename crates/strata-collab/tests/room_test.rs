//! Room lifecycle tests driven through the registry and hub handles

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use strata_collab::{
    AuthError, Authenticator, ClientMessage, CollabConfig, Frame, Identity, Invitation,
    InviteRole, Members, MemoryStore, Project, RoomHandle, RoomRegistry, SessionId,
    SignedTokenAuthenticator, Store, StoreError,
};
use strata_core::{Edit, Row};
use tokio::sync::mpsc;
use tokio_test::assert_ok;

const ROOM: &str = "room-1";

struct Peer {
    session_id: SessionId,
    rx: mpsc::Receiver<Frame>,
}

impl Peer {
    async fn next(&mut self) -> Value {
        let frame = tokio::time::timeout(Duration::from_secs(5), self.rx.recv())
            .await
            .expect("timed out waiting for a frame")
            .expect("hub dropped the session");
        serde_json::from_str(&frame).unwrap()
    }

    fn drain(&mut self) -> Vec<Value> {
        let mut frames = Vec::new();
        while let Ok(frame) = self.rx.try_recv() {
            frames.push(serde_json::from_str(&frame).unwrap());
        }
        frames
    }
}

fn project() -> Project {
    let mut project = Project::new(ROOM, "Quebrada Honda", "owner@example.com");
    project
        .info
        .members
        .editors
        .push("editor@example.com".to_string());
    project
        .info
        .members
        .readers
        .push("reader@example.com".to_string());
    project
}

fn setup(config: CollabConfig) -> (RoomRegistry, Arc<MemoryStore>) {
    setup_with(project(), config)
}

fn setup_with(project: Project, config: CollabConfig) -> (RoomRegistry, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::with_projects([project]));
    let registry = RoomRegistry::new(
        store.clone(),
        Arc::new(SignedTokenAuthenticator::new("test-key", 600, 600)),
        config,
    );
    (registry, store)
}

async fn join(handle: &RoomHandle, email: &str) -> Peer {
    let (tx, rx) = mpsc::channel(1024);
    let ticket = handle
        .join(Identity::new(email, email), tx)
        .await
        .expect("join should succeed");
    let mut peer = Peer {
        session_id: ticket.session_id,
        rx,
    };
    assert_eq!(peer.next().await["action"], "data");
    peer
}

fn edit(action: &str, data: Value) -> ClientMessage {
    ClientMessage::Edit(Edit::from_parts(action, data).unwrap())
}

async fn wait_for_saves(store: &MemoryStore, expected: usize) {
    for _ in 0..200 {
        if store.save_count(ROOM).await >= expected {
            return;
        }
        tokio::task::yield_now().await;
    }
    panic!(
        "expected {expected} saves, saw {}",
        store.save_count(ROOM).await
    );
}

#[tokio::test]
async fn test_add_row_then_undo_and_redo() {
    let mut seeded = project();
    seeded.document.rows = vec![Row::with_height(10.0), Row::with_height(20.0)];
    let (registry, _) = setup_with(seeded, CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let mut owner = join(&handle, "owner@example.com").await;
    let mut editor = join(&handle, "editor@example.com").await;
    assert_eq!(owner.next().await["action"], "userConnected");

    handle
        .submit(owner.session_id, edit("addRow", json!({ "rowIndex": -1 })))
        .await
        .unwrap();

    for peer in [&mut owner, &mut editor] {
        let frame = peer.next().await;
        assert_eq!(frame["action"], "addRowEnd");
        assert_eq!(frame["value"]["lithology"]["height"], 100.0);
    }
    let snapshot = handle.snapshot().await.unwrap();
    let rows = &snapshot.project.document.rows;
    assert_eq!(rows.len(), 3);
    assert_eq!(rows[2], Row::default());
    assert_eq!((snapshot.undo_len, snapshot.redo_len), (1, 0));

    handle
        .submit(owner.session_id, ClientMessage::Undo)
        .await
        .unwrap();
    for peer in [&mut owner, &mut editor] {
        let frame = peer.next().await;
        assert_eq!(frame, json!({ "action": "deleteRow", "rowIndex": 2 }));
    }
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(
        snapshot.project.document.rows,
        vec![Row::with_height(10.0), Row::with_height(20.0)]
    );
    assert_eq!((snapshot.undo_len, snapshot.redo_len), (0, 1));

    handle
        .submit(editor.session_id, ClientMessage::Redo)
        .await
        .unwrap();
    assert_eq!(owner.next().await["action"], "addRowEnd");
    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.project.document.rows.len(), 3);
    assert_eq!((snapshot.undo_len, snapshot.redo_len), (1, 0));
}

#[tokio::test]
async fn test_undo_on_empty_history_is_silent() {
    let (registry, _) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let mut owner = join(&handle, "owner@example.com").await;

    handle
        .submit(owner.session_id, ClientMessage::Undo)
        .await
        .unwrap();
    handle.snapshot().await.unwrap();

    assert!(owner.drain().is_empty());
}

#[tokio::test]
async fn test_reader_cannot_mutate() {
    let (registry, _) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let mut owner = join(&handle, "owner@example.com").await;
    handle
        .submit(owner.session_id, edit("addRow", json!({ "rowIndex": -1 })))
        .await
        .unwrap();
    let mut reader = join(&handle, "reader@example.com").await;
    owner.drain();

    handle
        .submit(reader.session_id, edit("deleteRow", json!({ "rowIndex": 0 })))
        .await
        .unwrap();

    let reply = reader.next().await;
    assert_eq!(reply["action"], "error");
    assert_eq!(reply["code"], "permission_denied");

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.project.document.rows.len(), 1);
    assert_eq!(snapshot.undo_len, 1);
    assert!(owner.drain().is_empty());
}

#[tokio::test]
async fn test_stranger_is_refused() {
    let (registry, _) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let _owner = join(&handle, "owner@example.com").await;

    let (tx, _rx) = mpsc::channel(8);
    let err = handle
        .join(Identity::new("stranger@example.com", "x"), tx)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "permission_denied");
}

#[tokio::test]
async fn test_concurrent_submissions_are_serialized() {
    const N: usize = 20;
    let (registry, _) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let mut owner = join(&handle, "owner@example.com").await;
    let mut editor = join(&handle, "editor@example.com").await;
    owner.drain();

    let mut tasks = Vec::new();
    for i in 0..N {
        let handle = handle.clone();
        let session_id = if i % 2 == 0 {
            owner.session_id
        } else {
            editor.session_id
        };
        tasks.push(tokio::spawn(async move {
            let height = (i + 1) as f64;
            handle
                .submit(
                    session_id,
                    edit("addRow", json!({ "rowIndex": -1, "height": height })),
                )
                .await
                .unwrap();
        }));
    }
    for task in tasks {
        task.await.unwrap();
    }

    let snapshot = handle.snapshot().await.unwrap();
    assert_eq!(snapshot.undo_len, N);
    assert_eq!(snapshot.project.document.rows.len(), N);

    let seen_by_owner: Vec<Value> = owner.drain().iter().map(|f| f["value"].clone()).collect();
    let seen_by_editor: Vec<Value> = editor.drain().iter().map(|f| f["value"].clone()).collect();
    assert_eq!(seen_by_owner.len(), N);
    assert_eq!(seen_by_owner, seen_by_editor);

    let applied: Vec<Value> = snapshot
        .project
        .document
        .rows
        .iter()
        .map(|row| serde_json::to_value(row).unwrap())
        .collect();
    assert_eq!(seen_by_owner, applied);
}

#[tokio::test]
async fn test_last_leave_saves_once_and_evicts() {
    let (registry, store) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let owner = join(&handle, "owner@example.com").await;
    let mut editor = join(&handle, "editor@example.com").await;

    handle
        .submit(editor.session_id, edit("addRow", json!({ "rowIndex": -1 })))
        .await
        .unwrap();

    handle.leave(owner.session_id).await.unwrap();
    assert_eq!(store.save_count(ROOM).await, 0);
    assert!(registry.contains(ROOM));
    let frames = editor.drain();
    assert_eq!(frames.last().unwrap()["action"], "userDisconnected");

    handle.leave(editor.session_id).await.unwrap();
    assert_eq!(store.save_count(ROOM).await, 1);
    assert!(!registry.contains(ROOM));
    assert!(handle.is_closed());
    assert_eq!(store.get(ROOM).await.unwrap().document.rows.len(), 1);

    let reopened = registry.get_or_create(ROOM).await.unwrap();
    assert_ne!(reopened.generation(), handle.generation());
    let snapshot = reopened.snapshot().await.unwrap();
    assert_eq!(snapshot.project.document.rows.len(), 1);
    assert_eq!(snapshot.undo_len, 0);
}

#[tokio::test]
async fn test_join_on_closed_hub_reports_closed() {
    let (registry, _) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let owner = join(&handle, "owner@example.com").await;
    handle.leave(owner.session_id).await.unwrap();

    let (tx, _rx) = mpsc::channel(8);
    let err = handle
        .join(Identity::new("owner@example.com", "o"), tx)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "room_closed");
}

#[tokio::test]
async fn test_threshold_triggers_one_save() {
    let config = CollabConfig {
        autosave_threshold: 30,
        ..CollabConfig::default()
    };
    let (registry, store) = setup(config);
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let owner = join(&handle, "owner@example.com").await;

    for _ in 0..29 {
        handle
            .submit(owner.session_id, edit("addRow", json!({ "rowIndex": -1 })))
            .await
            .unwrap();
    }
    handle.snapshot().await.unwrap();
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(store.save_count(ROOM).await, 0);

    handle
        .submit(owner.session_id, edit("addRow", json!({ "rowIndex": -1 })))
        .await
        .unwrap();
    handle.snapshot().await.unwrap();
    wait_for_saves(&store, 1).await;

    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(store.save_count(ROOM).await, 1);
    assert_eq!(store.get(ROOM).await.unwrap().document.rows.len(), 30);
}

#[tokio::test(start_paused = true)]
async fn test_quiet_period_triggers_one_save() {
    let (registry, store) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let owner = join(&handle, "owner@example.com").await;

    handle
        .submit(owner.session_id, edit("addRow", json!({ "rowIndex": -1 })))
        .await
        .unwrap();
    handle.snapshot().await.unwrap();

    tokio::time::sleep(Duration::from_secs(299)).await;
    assert_eq!(store.save_count(ROOM).await, 0);

    tokio::time::sleep(Duration::from_secs(2)).await;
    wait_for_saves(&store, 1).await;

    tokio::time::sleep(Duration::from_secs(600)).await;
    assert_eq!(store.save_count(ROOM).await, 1);
}

#[tokio::test(start_paused = true)]
async fn test_each_edit_restarts_the_quiet_period() {
    let (registry, store) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let owner = join(&handle, "owner@example.com").await;

    for _ in 0..2 {
        handle
            .submit(owner.session_id, edit("addRow", json!({ "rowIndex": -1 })))
            .await
            .unwrap();
        handle.snapshot().await.unwrap();
        tokio::time::sleep(Duration::from_secs(200)).await;
    }
    assert_eq!(store.save_count(ROOM).await, 0);

    tokio::time::sleep(Duration::from_secs(101)).await;
    wait_for_saves(&store, 1).await;
}

#[tokio::test(start_paused = true)]
async fn test_presence_does_not_arm_autosave() {
    let (registry, store) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let owner = join(&handle, "owner@example.com").await;

    handle
        .submit(
            owner.session_id,
            ClientMessage::EditingUser {
                section: "Litologia-0".to_string(),
            },
        )
        .await
        .unwrap();
    handle.snapshot().await.unwrap();

    tokio::time::sleep(Duration::from_secs(900)).await;
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(store.save_count(ROOM).await, 0);
}

#[tokio::test]
async fn test_manual_save_acknowledged() {
    let (registry, store) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let mut owner = join(&handle, "owner@example.com").await;

    handle
        .submit(owner.session_id, ClientMessage::Save)
        .await
        .unwrap();

    assert_eq!(owner.next().await, json!({ "action": "saved" }));
    assert_eq!(store.save_count(ROOM).await, 1);
}

#[tokio::test]
async fn test_failed_save_reported_to_requester() {
    let (registry, store) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let mut owner = join(&handle, "owner@example.com").await;
    store.set_fail_saves(true);

    handle
        .submit(owner.session_id, ClientMessage::Save)
        .await
        .unwrap();

    let reply = owner.next().await;
    assert_eq!(reply["action"], "error");
    assert_eq!(reply["code"], "persistence_error");
}

#[tokio::test]
async fn test_disconnect_notice_reaches_others() {
    let (registry, _) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let mut owner = join(&handle, "owner@example.com").await;
    let editor = join(&handle, "editor@example.com").await;

    let connected = owner.next().await;
    assert_eq!(connected["action"], "userConnected");
    assert_eq!(connected["mail"], "editor@example.com");

    handle.leave(editor.session_id).await.unwrap();
    let gone = owner.next().await;
    assert_eq!(
        gone,
        json!({ "action": "userDisconnected", "id": editor.session_id })
    );
}

// ============================================================================
// Save ordering and teardown
// ============================================================================

/// Holds back writes of snapshots with a given row count
struct SlowStore {
    inner: MemoryStore,
    slow_rows: usize,
}

#[async_trait]
impl Store for SlowStore {
    async fn load(&self, room_id: &str) -> Result<Project, StoreError> {
        self.inner.load(room_id).await
    }

    async fn save(&self, project: &Project) -> Result<(), StoreError> {
        if project.document.rows.len() == self.slow_rows {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.inner.save(project).await
    }

    async fn members_and_secret(&self, room_id: &str) -> Result<(Members, String), StoreError> {
        self.inner.members_and_secret(room_id).await
    }

    async fn create(&self, project: &Project) -> Result<(), StoreError> {
        self.inner.create(project).await
    }

    async fn add_member(
        &self,
        room_id: &str,
        email: &str,
        role: InviteRole,
    ) -> Result<(), StoreError> {
        self.inner.add_member(room_id, email, role).await
    }
}

/// Accepts bearer tokens but cannot sign invites
struct BrokenInviteSigner(SignedTokenAuthenticator);

impl Authenticator for BrokenInviteSigner {
    fn verify_bearer(&self, token: &str) -> Result<Identity, AuthError> {
        self.0.verify_bearer(token)
    }

    fn verify_invite(&self, token: &str) -> Result<Invitation, AuthError> {
        self.0.verify_invite(token)
    }

    fn issue_invite(&self, _: &str, _: InviteRole, _: &str) -> Result<String, AuthError> {
        panic!("invite signer unavailable");
    }
}

#[tokio::test(start_paused = true)]
async fn test_slow_autosave_does_not_overwrite_close_save() {
    let config = CollabConfig {
        autosave_threshold: 2,
        ..CollabConfig::default()
    };
    let store = Arc::new(SlowStore {
        inner: MemoryStore::with_projects([project()]),
        slow_rows: 2,
    });
    let registry = RoomRegistry::new(
        store.clone(),
        Arc::new(SignedTokenAuthenticator::new("test-key", 600, 600)),
        config,
    );
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let owner = join(&handle, "owner@example.com").await;

    for _ in 0..3 {
        assert_ok!(
            handle
                .submit(owner.session_id, edit("addRow", json!({ "rowIndex": -1 })))
                .await
        );
    }
    assert_ok!(handle.leave(owner.session_id).await);
    assert!(!registry.contains(ROOM));

    tokio::time::sleep(Duration::from_secs(30)).await;
    assert_eq!(
        store.inner.get(ROOM).await.unwrap().document.rows.len(),
        3
    );

    let reopened = registry.get_or_create(ROOM).await.unwrap();
    let snapshot = reopened.snapshot().await.unwrap();
    assert_eq!(snapshot.project.document.rows.len(), 3);
}

#[tokio::test]
async fn test_dropping_last_stalled_peer_saves_and_closes() {
    let (registry, store) = setup(CollabConfig::default());
    let handle = registry.get_or_create(ROOM).await.unwrap();

    // the data frame takes the only slot
    let (tx, _rx) = mpsc::channel(1);
    let owner = handle
        .join(Identity::new("owner@example.com", "Owner"), tx)
        .await
        .unwrap();
    assert_ok!(
        handle
            .submit(owner.session_id, edit("addRow", json!({ "rowIndex": -1 })))
            .await
    );

    let (stranger_tx, _stranger_rx) = mpsc::channel(8);
    let err = handle
        .join(Identity::new("stranger@example.com", "S"), stranger_tx)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "room_closed");
    let _ = handle.leave(owner.session_id).await;

    assert_eq!(store.save_count(ROOM).await, 1);
    assert_eq!(store.get(ROOM).await.unwrap().document.rows.len(), 1);
    assert!(!registry.contains(ROOM));
}

#[tokio::test]
async fn test_internal_fault_closes_and_evicts_room() {
    let store = Arc::new(MemoryStore::with_projects([project()]));
    let registry = RoomRegistry::new(
        store.clone(),
        Arc::new(BrokenInviteSigner(SignedTokenAuthenticator::new(
            "test-key", 600, 600,
        ))),
        CollabConfig::default(),
    );
    let handle = registry.get_or_create(ROOM).await.unwrap();
    let mut owner = join(&handle, "owner@example.com").await;
    let mut editor = join(&handle, "editor@example.com").await;
    assert_eq!(owner.next().await["action"], "userConnected");

    assert_ok!(
        handle
            .submit(owner.session_id, edit("addRow", json!({ "rowIndex": -1 })))
            .await
    );
    assert_ok!(
        handle
            .submit(owner.session_id, ClientMessage::GenerateTokenLink)
            .await
    );

    assert_eq!(owner.next().await["action"], "addRowEnd");
    let reply = owner.next().await;
    assert_eq!(reply["action"], "error");
    assert_eq!(reply["code"], "internal_error");
    assert_eq!(owner.next().await["action"], "close");

    assert_eq!(editor.next().await["action"], "addRowEnd");
    assert_eq!(
        editor.next().await,
        json!({ "action": "close", "message": "project closed" })
    );
    assert!(editor.rx.recv().await.is_none());

    assert!(handle.is_closed());
    assert!(!registry.contains(ROOM));
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
    assert_eq!(store.save_count(ROOM).await, 0);
}
