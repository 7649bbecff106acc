//! Client edit requests
//!
//! An [`Edit`] is the decoded `data` payload of one mutating wire action.
//! It carries indices and values exactly as the client sent them; turning it
//! into an applicable [`Action`](crate::Action) is done by
//! [`Document::prepare`](crate::Document::prepare), which resolves sentinel
//! indices and captures the state needed for undo.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::document::{Fossil, LithologyField, Sample};

/// A mutating request, tagged by its wire action name
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", content = "data", rename_all = "camelCase")]
pub enum Edit {
    /// Insert a default row
    AddRow(AddRow),
    /// Remove a row
    DeleteRow(RowRef),
    /// Swap two rows
    DropReorder(DropReorder),
    /// Insert a control point into a row's boundary curve
    AddControlPoint(AddControlPoint),
    /// Remove a control point
    DeleteControlPoint(ControlPointRef),
    /// Move or relabel a control point
    EditControlPoint(EditControlPoint),
    /// Set a text cell
    EditText(EditText),
    /// Set one lithology attribute
    EditPolygonField(EditPolygonField),
    /// Create a fossil under a fresh id
    AddFossil(Fossil),
    /// Replace an existing fossil
    EditFossil(EditFossil),
    /// Remove a fossil
    DeleteFossil(FossilRef),
    /// Create a sample under a fresh id
    AddSample(Sample),
    /// Replace an existing sample
    EditSample(EditSample),
    /// Remove a sample
    DeleteSample(SampleRef),
    /// Create an empty facies
    AddFacie(FaciesRef),
    /// Remove a facies with all its sections
    DeleteFacie(FaciesRef),
    /// Insert a depth interval into a facies
    AddFacieSection(AddFaciesSection),
    /// Remove a depth interval from a facies
    DeleteFacieSection(FaciesSectionRef),
    /// Append a custom column
    AddColumn(ColumnRef),
    /// Remove a removable column
    DeleteColumn(ColumnRef),
    /// Show or hide a column
    ToggleColumn(ToggleColumn),
    /// Flip the depth axis
    ToggleInverted(ToggleInverted),
}

impl Edit {
    /// Wire action names decoded as edits
    pub const ACTIONS: &'static [&'static str] = &[
        "addRow",
        "deleteRow",
        "dropReorder",
        "addControlPoint",
        "deleteControlPoint",
        "editControlPoint",
        "editText",
        "editPolygonField",
        "addFossil",
        "editFossil",
        "deleteFossil",
        "addSample",
        "editSample",
        "deleteSample",
        "addFacie",
        "deleteFacie",
        "addFacieSection",
        "deleteFacieSection",
        "addColumn",
        "deleteColumn",
        "toggleColumn",
        "toggleInverted",
    ];

    /// Whether `action` names an edit
    #[must_use]
    pub fn is_edit_action(action: &str) -> bool {
        Self::ACTIONS.contains(&action)
    }

    /// Decode an edit from an envelope's action name and payload
    pub fn from_parts(action: &str, data: Value) -> serde_json::Result<Self> {
        serde_json::from_value(serde_json::json!({ "action": action, "data": data }))
    }
}

/// `addRow` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddRow {
    /// Insertion position, `-1` appends
    pub row_index: i64,
    /// Overrides the default height when non-zero
    #[serde(default)]
    pub height: f64,
}

/// Payload naming one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowRef {
    /// Row position, `-1` is the last row
    pub row_index: i64,
}

/// `dropReorder` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DropReorder {
    /// Dragged row
    pub active_id: i64,
    /// Row it was dropped on
    pub over_id: i64,
}

/// `addControlPoint` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AddControlPoint {
    /// Row holding the curve
    pub row_index: i64,
    /// Insertion position within the curve
    pub insert_index: i64,
    /// Vertical position of the new point
    pub point: f64,
}

/// `deleteControlPoint` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPointRef {
    /// Row holding the curve
    pub row_index: i64,
    /// Point position within the curve
    pub delete_index: i64,
}

/// `editControlPoint` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditControlPoint {
    /// Row holding the curve
    pub row_index: i64,
    /// Point position within the curve
    pub edit_index: i64,
    /// New horizontal position
    pub x: f64,
    /// New label
    #[serde(default)]
    pub name: String,
}

/// `editText` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditText {
    /// Row holding the cell
    pub row_index: i64,
    /// Column name
    pub key: String,
    /// New text
    pub value: String,
}

/// `editPolygonField` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditPolygonField {
    /// Row holding the lithology
    pub row_index: i64,
    /// Attribute to change
    pub column: LithologyField,
    /// New value
    pub value: Value,
}

/// `editFossil` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditFossil {
    /// Fossil id
    pub id_fossil: String,
    /// Replacement record
    #[serde(flatten)]
    pub fossil: Fossil,
}

/// `deleteFossil` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FossilRef {
    /// Fossil id
    pub id_fossil: String,
}

/// `editSample` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EditSample {
    /// Sample id
    pub id_sample: String,
    /// Replacement record
    #[serde(flatten)]
    pub sample: Sample,
}

/// `deleteSample` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SampleRef {
    /// Sample id
    pub id_sample: String,
}

/// Payload naming one facies
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaciesRef {
    /// Facies name
    pub facie: String,
}

/// `addFacieSection` payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddFaciesSection {
    /// Facies name
    pub facie: String,
    /// Top of the interval
    pub y1: f64,
    /// Bottom of the interval
    pub y2: f64,
    /// Insertion position, `-1` appends
    #[serde(default = "append_index")]
    pub index: i64,
}

fn append_index() -> i64 {
    -1
}

/// `deleteFacieSection` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FaciesSectionRef {
    /// Facies name
    pub facie: String,
    /// Section position, `-1` is the last section
    pub index: i64,
}

/// Payload naming one column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    /// Column name
    #[serde(alias = "column")]
    pub name: String,
}

/// `toggleColumn` payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToggleColumn {
    /// Column name
    #[serde(alias = "column")]
    pub name: String,
    /// New visibility
    pub visible: bool,
}

/// `toggleInverted` payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToggleInverted {
    /// Requested orientation
    pub is_inverted: bool,
}
