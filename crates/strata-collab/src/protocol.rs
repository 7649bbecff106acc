//! WebSocket Protocol
//!
//! Every frame in both directions is a JSON object tagged by `action`.
//! Inbound frames carry their payload under `data`; outbound frames are
//! flat.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use strata_core::{
    Column, Command, ControlPoint, DocumentConfig, Edit, FaciesSection, Fossil, LithologyField,
    Row, Sample,
};

use crate::error::{Error, Result};
use crate::project::ProjectInfo;
use crate::session::{EditingEntry, Frame, RosterEntry, SessionId};

#[derive(Debug, Deserialize)]
struct Envelope {
    action: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
struct PresencePayload {
    #[serde(default)]
    section: String,
}

fn presence_section(data: Value) -> Result<String> {
    let payload: Option<PresencePayload> = serde_json::from_value(data)?;
    Ok(payload.map(|p| p.section).unwrap_or_default())
}

/// A decoded inbound message
#[derive(Debug, Clone, PartialEq)]
pub enum ClientMessage {
    Undo,
    Redo,
    Save,
    GenerateTokenLink,
    RevokeTokenLink,
    /// Mark the sender as editing a section
    EditingUser { section: String },
    /// Clear the sender's editing mark
    DeleteEditingUser { section: String },
    /// Document mutation
    Edit(Edit),
}

impl ClientMessage {
    /// Wire action name
    #[must_use]
    pub fn action(&self) -> &'static str {
        match self {
            Self::Undo => "undo",
            Self::Redo => "redo",
            Self::Save => "save",
            Self::GenerateTokenLink => "generateTokenLink",
            Self::RevokeTokenLink => "revokeTokenLink",
            Self::EditingUser { .. } => "editingUser",
            Self::DeleteEditingUser { .. } => "deleteEditingUser",
            Self::Edit(_) => "edit",
        }
    }
}

/// Result of decoding one inbound text frame
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// A recognised action with a valid payload
    Message(ClientMessage),
    /// An action name this server does not handle
    Unknown(String),
}

/// Decode an inbound text frame.
///
/// Errors are [`Error::Client`]: the envelope or the payload of a known
/// action did not parse.
pub fn decode(text: &str) -> Result<Inbound> {
    let envelope: Envelope = serde_json::from_str(text)?;
    let data = envelope.data;

    let message = match envelope.action.as_str() {
        "undo" => ClientMessage::Undo,
        "redo" => ClientMessage::Redo,
        "save" => ClientMessage::Save,
        "generateTokenLink" => ClientMessage::GenerateTokenLink,
        "revokeTokenLink" | "deletetokenLink" => ClientMessage::RevokeTokenLink,
        "editingUser" => ClientMessage::EditingUser {
            section: presence_section(data)?,
        },
        "deleteEditingUser" => ClientMessage::DeleteEditingUser {
            section: presence_section(data)?,
        },
        action if Edit::is_edit_action(action) => {
            ClientMessage::Edit(Edit::from_parts(action, data).map_err(|e| {
                Error::client(format!("{action}: {e}"))
            })?)
        }
        _ => return Ok(Inbound::Unknown(envelope.action.clone())),
    };

    Ok(Inbound::Message(message))
}

/// Full room state sent to a joining connection
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DataFrame {
    pub project_info: ProjectInfo,
    pub rows: Vec<Row>,
    pub config: DocumentConfig,
    pub fossils: BTreeMap<String, Fossil>,
    pub samples: BTreeMap<String, Sample>,
    pub facies: BTreeMap<String, Vec<FaciesSection>>,
    pub users: BTreeMap<String, RosterEntry>,
    pub user_editing: BTreeMap<String, EditingEntry>,
}

/// Identity attached to presence broadcasts
#[derive(Debug, Clone, Serialize)]
pub struct PresenceUser {
    pub id: SessionId,
    pub name: String,
    pub color: String,
}

/// Outbound frames
#[derive(Debug, Clone, Serialize)]
#[serde(
    tag = "action",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum ServerMessage {
    Data(Box<DataFrame>),

    AddRow { row_index: usize, value: Row },
    AddRowEnd { value: Row },
    DeleteRow { row_index: usize },
    DropReorder { active_id: usize, over_id: usize },

    AddControlPoint { row_index: usize, value: Vec<ControlPoint> },
    DeleteControlPoint { row_index: usize, value: Vec<ControlPoint> },
    EditControlPoint { row_index: usize, value: Vec<ControlPoint> },

    EditText { row_index: usize, key: String, value: Value },
    EditPolygonField { row_index: usize, key: LithologyField, value: Value },

    AddFossil { id_fossil: String, value: Fossil },
    EditFossil { id_fossil: String, value: Fossil },
    DeleteFossil { id_fossil: String },
    AddSample { id_sample: String, value: Sample },
    EditSample { id_sample: String, value: Sample },
    DeleteSample { id_sample: String },

    AddFacie { facie: String, sections: Vec<FaciesSection> },
    DeleteFacie { facie: String },
    AddFacieSection { facie: String, index: usize, y1: f64, y2: f64 },
    DeleteFacieSection { facie: String, index: usize },

    AddColumn { column: Column, index: usize },
    DeleteColumn { column: String },
    ToggleColumn { column: String, visible: bool },
    ToggleInverted {
        is_inverted: bool,
        fossils: BTreeMap<String, Fossil>,
        samples: BTreeMap<String, Sample>,
        facies: BTreeMap<String, Vec<FaciesSection>>,
    },

    EditingUser { value: String, data: PresenceUser },
    DeleteEditingUser { value: String, user_name: String },
    UserConnected { id: SessionId, mail: String, color: String },
    UserDisconnected { id: SessionId },

    /// Invite tokens, sent to the requesting owner only
    TokenLink { editor: String, reader: String },
    /// Acknowledges a manual save
    Saved,
    Error { code: String, message: String },
    /// The room was torn down
    Close { message: String },
}

impl ServerMessage {
    /// Create an error message
    #[must_use]
    pub fn error(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.into(),
            message: message.into(),
        }
    }

    /// Create an error message from a collaboration error
    #[must_use]
    pub fn from_error(err: &Error) -> Self {
        Self::error(err.code(), err.to_string())
    }

    /// The room-teardown notice
    #[must_use]
    pub fn closed() -> Self {
        Self::Close {
            message: "project closed".to_string(),
        }
    }

    /// Build the broadcast for a command that was just applied to `doc`
    #[must_use]
    pub fn for_command(command: &Command, doc: &strata_core::Document) -> Self {
        let points = |row: usize| {
            doc.rows
                .get(row)
                .map(|r| r.lithology.control_points.clone())
                .unwrap_or_default()
        };

        match command {
            Command::InsertRow { index, row, append } => {
                if *append {
                    Self::AddRowEnd { value: row.clone() }
                } else {
                    Self::AddRow {
                        row_index: *index,
                        value: row.clone(),
                    }
                }
            }
            Command::RemoveRow { index } => Self::DeleteRow { row_index: *index },
            Command::SwapRows { active, over } => Self::DropReorder {
                active_id: *active,
                over_id: *over,
            },
            Command::InsertControlPoint { row, .. } => Self::AddControlPoint {
                row_index: *row,
                value: points(*row),
            },
            Command::RemoveControlPoint { row, .. } => Self::DeleteControlPoint {
                row_index: *row,
                value: points(*row),
            },
            Command::SetControlPoint { row, .. } => Self::EditControlPoint {
                row_index: *row,
                value: points(*row),
            },
            Command::SetText { row, key, value } => Self::EditText {
                row_index: *row,
                key: key.clone(),
                value: value.clone().unwrap_or_else(|| Value::String(String::new())),
            },
            Command::SetLithologyField { row, field, value } => Self::EditPolygonField {
                row_index: *row,
                key: *field,
                value: value.clone(),
            },
            Command::AddFossil { id, fossil } => Self::AddFossil {
                id_fossil: id.clone(),
                value: fossil.clone(),
            },
            Command::EditFossil { id, fossil } => Self::EditFossil {
                id_fossil: id.clone(),
                value: fossil.clone(),
            },
            Command::DeleteFossil { id } => Self::DeleteFossil {
                id_fossil: id.clone(),
            },
            Command::AddSample { id, sample } => Self::AddSample {
                id_sample: id.clone(),
                value: sample.clone(),
            },
            Command::EditSample { id, sample } => Self::EditSample {
                id_sample: id.clone(),
                value: sample.clone(),
            },
            Command::DeleteSample { id } => Self::DeleteSample {
                id_sample: id.clone(),
            },
            Command::AddFacies { name, sections } => Self::AddFacie {
                facie: name.clone(),
                sections: sections.clone(),
            },
            Command::DeleteFacies { name } => Self::DeleteFacie {
                facie: name.clone(),
            },
            Command::InsertFaciesSection {
                facie,
                index,
                section,
            } => Self::AddFacieSection {
                facie: facie.clone(),
                index: *index,
                y1: section.y1,
                y2: section.y2,
            },
            Command::RemoveFaciesSection { facie, index } => Self::DeleteFacieSection {
                facie: facie.clone(),
                index: *index,
            },
            Command::InsertColumn { index, column } => Self::AddColumn {
                column: column.clone(),
                index: *index,
            },
            Command::RemoveColumn { name } => Self::DeleteColumn {
                column: name.clone(),
            },
            Command::SetColumnVisibility { name, visible } => Self::ToggleColumn {
                column: name.clone(),
                visible: *visible,
            },
            Command::SetInverted { value, .. } => Self::ToggleInverted {
                is_inverted: *value,
                fossils: doc.fossils.clone(),
                samples: doc.samples.clone(),
                facies: doc.facies.clone(),
            },
        }
    }

    /// Serialize once for fan-out
    pub fn encode(&self) -> Result<Frame> {
        let json = serde_json::to_string(self).map_err(|e| Error::internal(e.to_string()))?;
        Ok(Arc::from(json))
    }
}
