//! Reversible document commands
//!
//! Every accepted edit becomes an [`Action`]: a forward [`Command`] and the
//! inverse [`Command`] that restores the exact prior state. Both halves carry
//! all the data they need, so undo and redo never re-derive anything from the
//! original request.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::document::{
    element_index, insertion_index, Column, ControlPoint, DepthCoordinates, Document,
    FaciesSection, Fossil, Lithology, LithologyField, Row, Sample,
};
use crate::edit::Edit;
use crate::error::{Error, Result};

/// A single data-carrying document mutation with resolved indices
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Command {
    /// Insert `row` before `index`; `append` marks an end-of-table insert
    InsertRow { index: usize, row: Row, append: bool },
    /// Remove the row at `index`
    RemoveRow { index: usize },
    /// Exchange two rows
    SwapRows { active: usize, over: usize },
    /// Insert a point into a row's boundary curve
    InsertControlPoint {
        row: usize,
        index: usize,
        point: ControlPoint,
    },
    /// Remove a point from a row's boundary curve
    RemoveControlPoint { row: usize, index: usize },
    /// Replace a point of a row's boundary curve
    SetControlPoint {
        row: usize,
        index: usize,
        point: ControlPoint,
    },
    /// Set a text cell; `None` removes the key
    SetText {
        row: usize,
        key: String,
        value: Option<Value>,
    },
    /// Set one lithology attribute
    SetLithologyField {
        row: usize,
        field: LithologyField,
        value: Value,
    },
    AddFossil { id: String, fossil: Fossil },
    EditFossil { id: String, fossil: Fossil },
    DeleteFossil { id: String },
    AddSample { id: String, sample: Sample },
    EditSample { id: String, sample: Sample },
    DeleteSample { id: String },
    /// Create a facies with the given sections
    AddFacies {
        name: String,
        sections: Vec<FaciesSection>,
    },
    DeleteFacies { name: String },
    InsertFaciesSection {
        facie: String,
        index: usize,
        section: FaciesSection,
    },
    RemoveFaciesSection { facie: String, index: usize },
    InsertColumn { index: usize, column: Column },
    RemoveColumn { name: String },
    SetColumnVisibility { name: String, visible: bool },
    /// Set the depth orientation. Without `depths` every depth coordinate
    /// is mirrored; with `depths` the captured coordinates are restored.
    SetInverted {
        value: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        depths: Option<DepthCoordinates>,
    },
}

/// A forward command paired with its exact inverse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Mutation to run on execute and redo
    pub forward: Command,
    /// Mutation to run on undo
    pub inverse: Command,
}

impl Action {
    /// Pair a forward command with its inverse
    #[must_use]
    pub fn new(forward: Command, inverse: Command) -> Self {
        Self { forward, inverse }
    }
}

impl Document {
    /// Validate an edit against the current state and build its action.
    ///
    /// Returns `None` when the edit refers to something out of range or
    /// absent, or would not change anything. Such edits are dropped without
    /// touching history.
    #[must_use]
    pub fn prepare(&self, edit: Edit) -> Option<Action> {
        use Command as C;

        let action = match edit {
            Edit::AddRow(e) => {
                let index = insertion_index(e.row_index, self.rows.len())?;
                if e.height < 0.0 {
                    return None;
                }
                let mut row = Row::default();
                if e.height != 0.0 {
                    row.lithology.height = e.height;
                }
                Action::new(
                    C::InsertRow {
                        index,
                        row,
                        append: e.row_index == -1,
                    },
                    C::RemoveRow { index },
                )
            }

            Edit::DeleteRow(e) => {
                let index = element_index(e.row_index, self.rows.len())?;
                Action::new(
                    C::RemoveRow { index },
                    C::InsertRow {
                        index,
                        row: self.rows[index].clone(),
                        append: false,
                    },
                )
            }

            Edit::DropReorder(e) => {
                let active = element_index(e.active_id, self.rows.len())?;
                let over = element_index(e.over_id, self.rows.len())?;
                if active == over {
                    return None;
                }
                Action::new(
                    C::SwapRows { active, over },
                    C::SwapRows {
                        active: over,
                        over: active,
                    },
                )
            }

            Edit::AddControlPoint(e) => {
                let (row, points) = self.points(e.row_index)?;
                let index = insertion_index(e.insert_index, points.len())?;
                Action::new(
                    C::InsertControlPoint {
                        row,
                        index,
                        point: ControlPoint::at(e.point),
                    },
                    C::RemoveControlPoint { row, index },
                )
            }

            Edit::DeleteControlPoint(e) => {
                let (row, points) = self.points(e.row_index)?;
                let index = element_index(e.delete_index, points.len())?;
                Action::new(
                    C::RemoveControlPoint { row, index },
                    C::InsertControlPoint {
                        row,
                        index,
                        point: points[index].clone(),
                    },
                )
            }

            Edit::EditControlPoint(e) => {
                let (row, points) = self.points(e.row_index)?;
                let index = element_index(e.edit_index, points.len())?;
                let prior = points[index].clone();
                let mut point = prior.clone();
                point.x = e.x;
                point.name = e.name;
                Action::new(
                    C::SetControlPoint { row, index, point },
                    C::SetControlPoint {
                        row,
                        index,
                        point: prior,
                    },
                )
            }

            Edit::EditText(e) => {
                let row = element_index(e.row_index, self.rows.len())?;
                let prior = self.rows[row].fields.get(&e.key).cloned();
                Action::new(
                    C::SetText {
                        row,
                        key: e.key.clone(),
                        value: Some(Value::String(e.value)),
                    },
                    C::SetText {
                        row,
                        key: e.key,
                        value: prior,
                    },
                )
            }

            Edit::EditPolygonField(e) => {
                let row = element_index(e.row_index, self.rows.len())?;
                Lithology::validate_field(e.column, &e.value).ok()?;
                let prior = self.rows[row].lithology.field(e.column);
                Action::new(
                    C::SetLithologyField {
                        row,
                        field: e.column,
                        value: e.value,
                    },
                    C::SetLithologyField {
                        row,
                        field: e.column,
                        value: prior,
                    },
                )
            }

            Edit::AddFossil(fossil) => {
                if !fossil.has_valid_bounds() {
                    return None;
                }
                let id = Uuid::new_v4().to_string();
                Action::new(
                    C::AddFossil {
                        id: id.clone(),
                        fossil,
                    },
                    C::DeleteFossil { id },
                )
            }

            Edit::EditFossil(e) => {
                let prior = self.fossils.get(&e.id_fossil)?.clone();
                if !e.fossil.has_valid_bounds() {
                    return None;
                }
                Action::new(
                    C::EditFossil {
                        id: e.id_fossil.clone(),
                        fossil: e.fossil,
                    },
                    C::EditFossil {
                        id: e.id_fossil,
                        fossil: prior,
                    },
                )
            }

            Edit::DeleteFossil(e) => {
                let prior = self.fossils.get(&e.id_fossil)?.clone();
                Action::new(
                    C::DeleteFossil {
                        id: e.id_fossil.clone(),
                    },
                    C::AddFossil {
                        id: e.id_fossil,
                        fossil: prior,
                    },
                )
            }

            Edit::AddSample(sample) => {
                if !sample.has_valid_bounds() {
                    return None;
                }
                let id = Uuid::new_v4().to_string();
                Action::new(
                    C::AddSample {
                        id: id.clone(),
                        sample,
                    },
                    C::DeleteSample { id },
                )
            }

            Edit::EditSample(e) => {
                let prior = self.samples.get(&e.id_sample)?.clone();
                if !e.sample.has_valid_bounds() {
                    return None;
                }
                Action::new(
                    C::EditSample {
                        id: e.id_sample.clone(),
                        sample: e.sample,
                    },
                    C::EditSample {
                        id: e.id_sample,
                        sample: prior,
                    },
                )
            }

            Edit::DeleteSample(e) => {
                let prior = self.samples.get(&e.id_sample)?.clone();
                Action::new(
                    C::DeleteSample {
                        id: e.id_sample.clone(),
                    },
                    C::AddSample {
                        id: e.id_sample,
                        sample: prior,
                    },
                )
            }

            Edit::AddFacie(e) => {
                if e.facie.is_empty() || self.facies.contains_key(&e.facie) {
                    return None;
                }
                Action::new(
                    C::AddFacies {
                        name: e.facie.clone(),
                        sections: Vec::new(),
                    },
                    C::DeleteFacies { name: e.facie },
                )
            }

            Edit::DeleteFacie(e) => {
                let sections = self.facies.get(&e.facie)?.clone();
                Action::new(
                    C::DeleteFacies {
                        name: e.facie.clone(),
                    },
                    C::AddFacies {
                        name: e.facie,
                        sections,
                    },
                )
            }

            Edit::AddFacieSection(e) => {
                let sections = self.facies.get(&e.facie)?;
                let index = insertion_index(e.index, sections.len())?;
                Action::new(
                    C::InsertFaciesSection {
                        facie: e.facie.clone(),
                        index,
                        section: FaciesSection { y1: e.y1, y2: e.y2 },
                    },
                    C::RemoveFaciesSection {
                        facie: e.facie,
                        index,
                    },
                )
            }

            Edit::DeleteFacieSection(e) => {
                let sections = self.facies.get(&e.facie)?;
                let index = element_index(e.index, sections.len())?;
                Action::new(
                    C::RemoveFaciesSection {
                        facie: e.facie.clone(),
                        index,
                    },
                    C::InsertFaciesSection {
                        facie: e.facie,
                        index,
                        section: sections[index],
                    },
                )
            }

            Edit::AddColumn(e) => {
                if e.name.is_empty() || self.column(&e.name).is_some() {
                    return None;
                }
                Action::new(
                    C::InsertColumn {
                        index: self.config.columns.len(),
                        column: Column::custom(e.name.clone()),
                    },
                    C::RemoveColumn { name: e.name },
                )
            }

            Edit::DeleteColumn(e) => {
                let (index, column) = self.column(&e.name)?;
                if !column.removable {
                    return None;
                }
                Action::new(
                    C::RemoveColumn { name: e.name },
                    C::InsertColumn {
                        index,
                        column: column.clone(),
                    },
                )
            }

            Edit::ToggleColumn(e) => {
                let (_, column) = self.column(&e.name)?;
                if column.visible == e.visible {
                    return None;
                }
                Action::new(
                    C::SetColumnVisibility {
                        name: e.name.clone(),
                        visible: e.visible,
                    },
                    C::SetColumnVisibility {
                        name: e.name,
                        visible: column.visible,
                    },
                )
            }

            Edit::ToggleInverted(e) => {
                if self.config.is_inverted == e.is_inverted {
                    return None;
                }
                Action::new(
                    C::SetInverted {
                        value: e.is_inverted,
                        depths: None,
                    },
                    C::SetInverted {
                        value: self.config.is_inverted,
                        depths: Some(DepthCoordinates::capture(self)),
                    },
                )
            }
        };

        Some(action)
    }

    /// Run one command against the document.
    ///
    /// Commands produced by [`Document::prepare`] always apply; an error here
    /// means the document and the command history have diverged.
    pub fn apply(&mut self, command: &Command) -> Result<()> {
        match command {
            Command::InsertRow { index, row, .. } => {
                if *index > self.rows.len() {
                    return Err(Error::invariant(format!("row insert at {index}")));
                }
                self.rows.insert(*index, row.clone());
            }

            Command::RemoveRow { index } => {
                if *index >= self.rows.len() {
                    return Err(Error::invariant(format!("row remove at {index}")));
                }
                self.rows.remove(*index);
            }

            Command::SwapRows { active, over } => {
                if *active >= self.rows.len() || *over >= self.rows.len() {
                    return Err(Error::invariant(format!("row swap {active}<->{over}")));
                }
                self.rows.swap(*active, *over);
            }

            Command::InsertControlPoint { row, index, point } => {
                let points = self.points_mut(*row)?;
                if *index > points.len() {
                    return Err(Error::invariant(format!("control point insert at {index}")));
                }
                points.insert(*index, point.clone());
            }

            Command::RemoveControlPoint { row, index } => {
                let points = self.points_mut(*row)?;
                if *index >= points.len() {
                    return Err(Error::invariant(format!("control point remove at {index}")));
                }
                points.remove(*index);
            }

            Command::SetControlPoint { row, index, point } => {
                let slot = self
                    .points_mut(*row)?
                    .get_mut(*index)
                    .ok_or_else(|| Error::invariant(format!("control point {index}")))?;
                *slot = point.clone();
            }

            Command::SetText { row, key, value } => {
                let fields = &mut self.row_mut(*row)?.fields;
                match value {
                    Some(v) => {
                        fields.insert(key.clone(), v.clone());
                    }
                    None => {
                        fields.remove(key);
                    }
                }
            }

            Command::SetLithologyField { row, field, value } => {
                self.row_mut(*row)?.lithology.set_field(*field, value)?;
            }

            Command::AddFossil { id, fossil } | Command::EditFossil { id, fossil } => {
                if matches!(command, Command::EditFossil { .. }) && !self.fossils.contains_key(id)
                {
                    return Err(Error::invariant(format!("fossil {id} missing")));
                }
                self.fossils.insert(id.clone(), fossil.clone());
            }

            Command::DeleteFossil { id } => {
                self.fossils
                    .remove(id)
                    .ok_or_else(|| Error::invariant(format!("fossil {id} missing")))?;
            }

            Command::AddSample { id, sample } | Command::EditSample { id, sample } => {
                if matches!(command, Command::EditSample { .. }) && !self.samples.contains_key(id)
                {
                    return Err(Error::invariant(format!("sample {id} missing")));
                }
                self.samples.insert(id.clone(), sample.clone());
            }

            Command::DeleteSample { id } => {
                self.samples
                    .remove(id)
                    .ok_or_else(|| Error::invariant(format!("sample {id} missing")))?;
            }

            Command::AddFacies { name, sections } => {
                self.facies.insert(name.clone(), sections.clone());
            }

            Command::DeleteFacies { name } => {
                self.facies
                    .remove(name)
                    .ok_or_else(|| Error::invariant(format!("facies {name} missing")))?;
            }

            Command::InsertFaciesSection {
                facie,
                index,
                section,
            } => {
                let sections = self.sections_mut(facie)?;
                if *index > sections.len() {
                    return Err(Error::invariant(format!("section insert at {index}")));
                }
                sections.insert(*index, *section);
            }

            Command::RemoveFaciesSection { facie, index } => {
                let sections = self.sections_mut(facie)?;
                if *index >= sections.len() {
                    return Err(Error::invariant(format!("section remove at {index}")));
                }
                sections.remove(*index);
            }

            Command::InsertColumn { index, column } => {
                if *index > self.config.columns.len() || self.column(&column.name).is_some() {
                    return Err(Error::invariant(format!("column insert {}", column.name)));
                }
                self.config.columns.insert(*index, column.clone());
            }

            Command::RemoveColumn { name } => {
                let (index, _) = self
                    .column(name)
                    .ok_or_else(|| Error::invariant(format!("column {name} missing")))?;
                self.config.columns.remove(index);
            }

            Command::SetColumnVisibility { name, visible } => {
                let column = self
                    .config
                    .columns
                    .iter_mut()
                    .find(|c| &c.name == name)
                    .ok_or_else(|| Error::invariant(format!("column {name} missing")))?;
                column.visible = *visible;
            }

            Command::SetInverted { value, depths } => {
                if self.config.is_inverted != *value {
                    self.config.is_inverted = *value;
                    match depths {
                        Some(saved) => saved.restore(self),
                        None => self.mirror_depths(),
                    }
                }
            }
        }

        Ok(())
    }

    fn points(&self, row_index: i64) -> Option<(usize, &[ControlPoint])> {
        let row = element_index(row_index, self.rows.len())?;
        Some((row, &self.rows[row].lithology.control_points))
    }

    fn row_mut(&mut self, row: usize) -> Result<&mut Row> {
        self.rows
            .get_mut(row)
            .ok_or_else(|| Error::invariant(format!("row {row} missing")))
    }

    fn points_mut(&mut self, row: usize) -> Result<&mut Vec<ControlPoint>> {
        Ok(&mut self.row_mut(row)?.lithology.control_points)
    }

    fn sections_mut(&mut self, facie: &str) -> Result<&mut Vec<FaciesSection>> {
        self.facies
            .get_mut(facie)
            .ok_or_else(|| Error::invariant(format!("facies {facie} missing")))
    }
}
