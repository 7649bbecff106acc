//! Project records and membership

use serde::{Deserialize, Serialize};
use strata_core::Document;

/// Opaque persistence id of a room
pub type RoomId = String;

/// A persisted project: metadata, content and invite-link state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Project {
    /// Room id
    pub id: RoomId,
    /// Metadata and membership
    pub info: ProjectInfo,
    /// Editable content
    #[serde(default)]
    pub document: Document,
    /// Invite-link secret
    #[serde(default)]
    pub shared: SharedLink,
}

impl Project {
    /// Create an empty project owned by `owner`
    #[must_use]
    pub fn new(id: impl Into<RoomId>, name: impl Into<String>, owner: impl Into<String>) -> Self {
        let owner = owner.into();
        Self {
            id: id.into(),
            info: ProjectInfo {
                name: name.into(),
                owner: owner.clone(),
                members: Members {
                    owner,
                    editors: Vec::new(),
                    readers: Vec::new(),
                },
                creation_date: chrono::Utc::now().to_rfc3339(),
                description: String::new(),
                location: String::new(),
                lat: 0.0,
                long: 0.0,
                visible: false,
            },
            document: Document::default(),
            shared: SharedLink::default(),
        }
    }
}

/// Project metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectInfo {
    pub name: String,
    pub owner: String,
    pub members: Members,
    #[serde(default)]
    pub creation_date: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub lat: f64,
    #[serde(default)]
    pub long: f64,
    /// Public projects admit any authenticated user as a reader
    #[serde(default)]
    pub visible: bool,
}

impl ProjectInfo {
    /// Resolve the role of `email` in this project.
    ///
    /// Owner > Editor > Reader > Reader-if-visible; `None` means denied.
    #[must_use]
    pub fn role_of(&self, email: &str) -> Option<Role> {
        self.members.role_of(email).or(if self.visible {
            Some(Role::Reader)
        } else {
            None
        })
    }
}

/// Project membership lists, by email
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Members {
    pub owner: String,
    #[serde(default)]
    pub editors: Vec<String>,
    #[serde(default)]
    pub readers: Vec<String>,
}

impl Members {
    /// Explicit membership role of `email`
    #[must_use]
    pub fn role_of(&self, email: &str) -> Option<Role> {
        if self.owner == email {
            Some(Role::Owner)
        } else if self.editors.iter().any(|e| e == email) {
            Some(Role::Editor)
        } else if self.readers.iter().any(|e| e == email) {
            Some(Role::Reader)
        } else {
            None
        }
    }

    /// Add `email` to the invited list unless already a member.
    ///
    /// Returns `true` if the lists changed.
    pub fn admit(&mut self, email: &str, role: InviteRole) -> bool {
        if self.role_of(email).is_some() {
            return false;
        }
        match role {
            InviteRole::Editors => self.editors.push(email.to_string()),
            InviteRole::Readers => self.readers.push(email.to_string()),
        }
        true
    }
}

/// Invite-link state of a project
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedLink {
    /// Empty when no invite link is active
    #[serde(default)]
    pub secret: String,
}

impl SharedLink {
    #[must_use]
    pub fn is_active(&self) -> bool {
        !self.secret.is_empty()
    }
}

/// Authenticated user identity
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub email: String,
    pub display_name: String,
}

impl Identity {
    #[must_use]
    pub fn new(email: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            display_name: display_name.into(),
        }
    }
}

/// Permission level of a session within a room
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Editor,
    Reader,
}

impl Role {
    /// Owners and editors may mutate the document
    #[must_use]
    pub fn can_edit(&self) -> bool {
        matches!(self, Self::Owner | Self::Editor)
    }

    #[must_use]
    pub fn is_owner(&self) -> bool {
        matches!(self, Self::Owner)
    }
}

/// Membership list an invite link admits to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InviteRole {
    Editors,
    Readers,
}

impl InviteRole {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Editors => "editors",
            Self::Readers => "readers",
        }
    }
}
