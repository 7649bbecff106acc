//! Integration tests for Strata
//!
//! These tests verify the integration between the crates:
//! - strata-core: document edits and history
//! - strata-collab: room hub, registry and SQLite persistence

use serde_json::json;
use sqlx::sqlite::SqlitePoolOptions;
use std::sync::Arc;
use strata_collab::{
    ClientMessage, CollabConfig, Identity, InviteRole, Project, RoomRegistry,
    SignedTokenAuthenticator, SqliteStore, Store,
};
use strata_core::Edit;
use tokio::sync::mpsc;
use tokio_test::assert_ok;

async fn sqlite_store() -> Arc<SqliteStore> {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    let store = SqliteStore::new(pool);
    store.init().await.unwrap();
    Arc::new(store)
}

fn registry(store: Arc<SqliteStore>) -> RoomRegistry {
    RoomRegistry::new(
        store,
        Arc::new(SignedTokenAuthenticator::new("integration-key", 600, 600)),
        CollabConfig::default(),
    )
}

// ============================================================================
// Room Persistence Integration Tests
// ============================================================================

#[tokio::test]
async fn test_room_state_survives_close_and_reopen() {
    let store = sqlite_store().await;
    assert_ok!(
        store
            .create(&Project::new("p1", "Cerro Bayo", "owner@example.com"))
            .await
    );
    let registry = registry(store.clone());

    let handle = registry.get_or_create("p1").await.unwrap();
    let (tx, _rx) = mpsc::channel(64);
    let ticket = handle
        .join(Identity::new("owner@example.com", "Owner"), tx)
        .await
        .unwrap();

    for data in [
        json!({ "rowIndex": -1 }),
        json!({ "rowIndex": 0, "height": 40.0 }),
    ] {
        let edit = Edit::from_parts("addRow", data).unwrap();
        assert_ok!(
            handle
                .submit(ticket.session_id, ClientMessage::Edit(edit))
                .await
        );
    }
    let text = Edit::from_parts(
        "editText",
        json!({ "rowIndex": 0, "key": "Formacion", "value": "Lajas" }),
    )
    .unwrap();
    assert_ok!(
        handle
            .submit(ticket.session_id, ClientMessage::Edit(text))
            .await
    );

    assert_ok!(handle.leave(ticket.session_id).await);
    assert!(!registry.contains("p1"));

    let stored = store.load("p1").await.unwrap();
    assert_eq!(stored.document.rows.len(), 2);
    assert_eq!(stored.document.rows[0].lithology.height, 40.0);
    assert_eq!(stored.document.rows[0].fields["Formacion"], "Lajas");

    let reopened = registry.get_or_create("p1").await.unwrap();
    let snapshot = reopened.snapshot().await.unwrap();
    assert_eq!(snapshot.project, stored);
    assert_eq!(snapshot.undo_len, 0);
}

#[tokio::test]
async fn test_unknown_room_is_not_found() {
    let registry = registry(sqlite_store().await);

    let err = registry.get_or_create("missing").await.unwrap_err();
    assert_eq!(err.code(), "room_not_found");
    assert!(registry.is_empty());
}

// ============================================================================
// Invite Link Integration Tests
// ============================================================================

#[tokio::test]
async fn test_generated_invite_admits_after_room_closes() {
    let store = sqlite_store().await;
    assert_ok!(
        store
            .create(&Project::new("p2", "Arroyo Seco", "owner@example.com"))
            .await
    );
    let registry = registry(store.clone());

    let handle = registry.get_or_create("p2").await.unwrap();
    let (tx, mut rx) = mpsc::channel(64);
    let ticket = handle
        .join(Identity::new("owner@example.com", "Owner"), tx)
        .await
        .unwrap();
    rx.recv().await.unwrap();

    assert_ok!(
        handle
            .submit(ticket.session_id, ClientMessage::GenerateTokenLink)
            .await
    );
    let frame: serde_json::Value = serde_json::from_str(&rx.recv().await.unwrap()).unwrap();
    assert_eq!(frame["action"], "tokenLink");
    let reader_invite = frame["reader"].as_str().unwrap().to_string();

    assert_ok!(handle.leave(ticket.session_id).await);

    let guest = Identity::new("guest@example.com", "Guest");
    let accepted = registry
        .accept_invitation(&guest, &reader_invite)
        .await
        .unwrap();
    assert_eq!(accepted.role, InviteRole::Readers);

    let (members, secret) = store.members_and_secret("p2").await.unwrap();
    assert_eq!(secret.len(), 16);
    assert!(members.readers.contains(&"guest@example.com".to_string()));
}
