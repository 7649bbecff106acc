//! Project Store
//!
//! Durable storage for projects. The room hub loads a project when a room
//! becomes resident and saves snapshots of it; saves are idempotent upserts.

use async_trait::async_trait;
use sqlx::{sqlite::SqlitePool, Row};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::project::{InviteRole, Members, Project};

/// Store error type
#[derive(Debug, Error)]
pub enum StoreError {
    /// No project with this id
    #[error("project not found: {0}")]
    NotFound(String),

    /// Database error
    #[error("database error: {0}")]
    Database(String),

    /// Stored record could not be encoded or decoded
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Persistence collaborator of the room hub
#[async_trait]
pub trait Store: Send + Sync {
    /// Load a project by id
    async fn load(&self, room_id: &str) -> Result<Project, StoreError>;

    /// Insert or replace a project
    async fn save(&self, project: &Project) -> Result<(), StoreError>;

    /// Membership and invite secret of a project that is not resident
    async fn members_and_secret(&self, room_id: &str) -> Result<(Members, String), StoreError>;

    /// Create a new project
    async fn create(&self, project: &Project) -> Result<(), StoreError>;

    /// Add `email` to a membership list unless already a member
    async fn add_member(
        &self,
        room_id: &str,
        email: &str,
        role: InviteRole,
    ) -> Result<(), StoreError>;
}

/// In-process store for tests and local development
#[derive(Default)]
pub struct MemoryStore {
    projects: RwLock<HashMap<String, Project>>,
    saves: RwLock<HashMap<String, usize>>,
    fail_saves: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding the given projects
    #[must_use]
    pub fn with_projects(projects: impl IntoIterator<Item = Project>) -> Self {
        let map = projects.into_iter().map(|p| (p.id.clone(), p)).collect();
        Self {
            projects: RwLock::new(map),
            ..Self::default()
        }
    }

    /// Number of successful saves for a room
    pub async fn save_count(&self, room_id: &str) -> usize {
        self.saves.read().await.get(room_id).copied().unwrap_or(0)
    }

    /// Current stored copy of a project
    pub async fn get(&self, room_id: &str) -> Option<Project> {
        self.projects.read().await.get(room_id).cloned()
    }

    /// Make every subsequent save fail
    pub fn set_fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn load(&self, room_id: &str) -> Result<Project, StoreError> {
        self.get(room_id)
            .await
            .ok_or_else(|| StoreError::NotFound(room_id.to_string()))
    }

    async fn save(&self, project: &Project) -> Result<(), StoreError> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(StoreError::Database("save rejected".to_string()));
        }
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project.clone());
        *self.saves.write().await.entry(project.id.clone()).or_default() += 1;
        Ok(())
    }

    async fn members_and_secret(&self, room_id: &str) -> Result<(Members, String), StoreError> {
        let project = self.load(room_id).await?;
        Ok((project.info.members, project.shared.secret))
    }

    async fn create(&self, project: &Project) -> Result<(), StoreError> {
        self.projects
            .write()
            .await
            .insert(project.id.clone(), project.clone());
        Ok(())
    }

    async fn add_member(
        &self,
        room_id: &str,
        email: &str,
        role: InviteRole,
    ) -> Result<(), StoreError> {
        let mut projects = self.projects.write().await;
        let project = projects
            .get_mut(room_id)
            .ok_or_else(|| StoreError::NotFound(room_id.to_string()))?;
        project.info.members.admit(email, role);
        Ok(())
    }
}

/// SQLite-backed store holding each project as one JSON record
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Create a new store with the given database pool
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Initialize the database schema
    pub async fn init(&self) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS projects (
                id TEXT PRIMARY KEY,
                project_json TEXT NOT NULL,
                updated_at TEXT NOT NULL
            );
            "#,
        )
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn upsert(&self, project: &Project) -> Result<(), StoreError> {
        let project_json = serde_json::to_string(project)?;

        sqlx::query(
            r#"
            INSERT OR REPLACE INTO projects (id, project_json, updated_at)
            VALUES (?, ?, ?)
            "#,
        )
        .bind(&project.id)
        .bind(&project_json)
        .bind(chrono::Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

#[async_trait]
impl Store for SqliteStore {
    async fn load(&self, room_id: &str) -> Result<Project, StoreError> {
        let row = sqlx::query("SELECT project_json FROM projects WHERE id = ?")
            .bind(room_id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| StoreError::NotFound(room_id.to_string()))?;

        let project_json: String = row.get("project_json");
        Ok(serde_json::from_str(&project_json)?)
    }

    async fn save(&self, project: &Project) -> Result<(), StoreError> {
        self.upsert(project).await
    }

    async fn members_and_secret(&self, room_id: &str) -> Result<(Members, String), StoreError> {
        let project = self.load(room_id).await?;
        Ok((project.info.members, project.shared.secret))
    }

    async fn create(&self, project: &Project) -> Result<(), StoreError> {
        self.upsert(project).await
    }

    async fn add_member(
        &self,
        room_id: &str,
        email: &str,
        role: InviteRole,
    ) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query("SELECT project_json FROM projects WHERE id = ?")
            .bind(room_id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StoreError::NotFound(room_id.to_string()))?;

        let project_json: String = row.get("project_json");
        let mut project: Project = serde_json::from_str(&project_json)?;

        if project.info.members.admit(email, role) {
            sqlx::query("UPDATE projects SET project_json = ?, updated_at = ? WHERE id = ?")
                .bind(serde_json::to_string(&project)?)
                .bind(chrono::Utc::now().to_rfc3339())
                .bind(room_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }
}
