//! Stratigraphic Document Types
//!
//! A document is an ordered column of rows (one per stratigraphic layer)
//! plus identity-keyed fossils and samples, named facies with their depth
//! intervals, and the display configuration of the table.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

use crate::error::{Error, Result};

/// One room's editable content
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    /// Ordered stratigraphic rows, top first
    #[serde(default)]
    pub rows: Vec<Row>,

    /// Column layout and depth orientation
    #[serde(default)]
    pub config: DocumentConfig,

    /// Fossils by opaque id
    #[serde(default)]
    pub fossils: BTreeMap<String, Fossil>,

    /// Samples by opaque id
    #[serde(default)]
    pub samples: BTreeMap<String, Sample>,

    /// Facies name to its depth intervals, in insertion order
    #[serde(default)]
    pub facies: BTreeMap<String, Vec<FaciesSection>>,
}

impl Default for Document {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            config: DocumentConfig::default(),
            fossils: BTreeMap::new(),
            samples: BTreeMap::new(),
            facies: BTreeMap::new(),
        }
    }
}

impl Document {
    /// Sum of all row heights; the depth of the bottom of the column.
    #[must_use]
    pub fn total_height(&self) -> f64 {
        self.rows.iter().map(|r| r.lithology.height).sum()
    }

    /// Look up a column by name
    #[must_use]
    pub fn column(&self, name: &str) -> Option<(usize, &Column)> {
        self.config
            .columns
            .iter()
            .enumerate()
            .find(|(_, c)| c.name == name)
    }

    /// Mirror every fossil, sample and facies coordinate around the bottom
    /// of the column (`value -> total_height - value`).
    ///
    /// Facies sections swap their bounds so that `y1 <= y2` keeps holding.
    /// Applying this twice with an unchanged total height is the identity.
    pub fn mirror_depths(&mut self) {
        let total = self.total_height();

        for fossil in self.fossils.values_mut() {
            fossil.upper = total - fossil.upper;
            fossil.lower = total - fossil.lower;
        }

        for sample in self.samples.values_mut() {
            sample.upper = total - sample.upper;
            sample.lower = total - sample.lower;
        }

        for sections in self.facies.values_mut() {
            for section in sections.iter_mut() {
                let (y1, y2) = (section.y1, section.y2);
                section.y1 = total - y2;
                section.y2 = total - y1;
            }
        }
    }
}

/// Every depth coordinate that [`Document::mirror_depths`] rewrites
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DepthCoordinates {
    pub fossils: BTreeMap<String, Fossil>,
    pub samples: BTreeMap<String, Sample>,
    pub facies: BTreeMap<String, Vec<FaciesSection>>,
}

impl DepthCoordinates {
    /// Copy the current coordinates out of a document
    #[must_use]
    pub fn capture(doc: &Document) -> Self {
        Self {
            fossils: doc.fossils.clone(),
            samples: doc.samples.clone(),
            facies: doc.facies.clone(),
        }
    }

    /// Put the captured coordinates back verbatim
    pub fn restore(&self, doc: &mut Document) {
        doc.fossils.clone_from(&self.fossils);
        doc.samples.clone_from(&self.samples);
        doc.facies.clone_from(&self.facies);
    }
}

/// One stratigraphic layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Row {
    /// Free-form text cells keyed by column name
    #[serde(default)]
    pub fields: Map<String, Value>,

    /// Drawing attributes of the layer
    pub lithology: Lithology,
}

impl Default for Row {
    fn default() -> Self {
        Self {
            fields: Map::new(),
            lithology: Lithology::default(),
        }
    }
}

impl Row {
    /// Create a default row with the given height
    #[must_use]
    pub fn with_height(height: f64) -> Self {
        let mut row = Self::default();
        row.lithology.height = height;
        row
    }
}

/// Lithology drawing attributes of a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Lithology {
    /// Fill color (`#rrggbb`)
    pub fill_color: String,
    /// Stroke color (`#rrggbb`)
    pub stroke_color: String,
    /// Pattern reference
    pub pattern: String,
    /// Contact code with the next layer
    pub contact: String,
    /// Pattern zoom in percent
    pub zoom: i64,
    /// Pattern rotation in degrees
    pub rotation: i64,
    /// Layer thickness; never negative
    pub height: f64,
    /// Boundary curve tension
    pub tension: f64,
    /// Points of the right-hand boundary curve
    #[serde(default)]
    pub control_points: Vec<ControlPoint>,
}

impl Default for Lithology {
    fn default() -> Self {
        Self {
            fill_color: "#ffffff".to_string(),
            stroke_color: "#000000".to_string(),
            pattern: "Sin Pattern".to_string(),
            contact: "111".to_string(),
            zoom: 100,
            rotation: 0,
            height: 100.0,
            tension: 0.0,
            control_points: vec![
                ControlPoint::fixed(0.0, 0.0),
                ControlPoint::new(0.5, 0.0),
                ControlPoint::new(0.5, 1.0),
                ControlPoint::fixed(0.0, 1.0),
            ],
        }
    }
}

impl Lithology {
    /// Read one attribute as JSON
    #[must_use]
    pub fn field(&self, field: LithologyField) -> Value {
        match field {
            LithologyField::FillColor => Value::from(self.fill_color.clone()),
            LithologyField::StrokeColor => Value::from(self.stroke_color.clone()),
            LithologyField::Pattern => Value::from(self.pattern.clone()),
            LithologyField::Contact => Value::from(self.contact.clone()),
            LithologyField::Zoom => Value::from(self.zoom),
            LithologyField::Rotation => Value::from(self.rotation),
            LithologyField::Height => Value::from(self.height),
            LithologyField::Tension => Value::from(self.tension),
        }
    }

    /// Check that `value` fits `field` without writing it
    pub fn validate_field(field: LithologyField, value: &Value) -> Result<()> {
        let ok = match field {
            LithologyField::FillColor
            | LithologyField::StrokeColor
            | LithologyField::Pattern
            | LithologyField::Contact => value.is_string(),
            LithologyField::Zoom | LithologyField::Rotation => value.as_i64().is_some(),
            LithologyField::Height => value.as_f64().is_some_and(|h| h >= 0.0),
            LithologyField::Tension => value.as_f64().is_some(),
        };

        if ok {
            Ok(())
        } else {
            Err(Error::InvalidFieldValue {
                field: field.as_str(),
                value: value.to_string(),
            })
        }
    }

    /// Write one attribute from JSON
    pub fn set_field(&mut self, field: LithologyField, value: &Value) -> Result<()> {
        Self::validate_field(field, value)?;

        let text = || value.as_str().unwrap_or_default().to_string();
        match field {
            LithologyField::FillColor => self.fill_color = text(),
            LithologyField::StrokeColor => self.stroke_color = text(),
            LithologyField::Pattern => self.pattern = text(),
            LithologyField::Contact => self.contact = text(),
            LithologyField::Zoom => self.zoom = value.as_i64().unwrap_or(self.zoom),
            LithologyField::Rotation => self.rotation = value.as_i64().unwrap_or(self.rotation),
            LithologyField::Height => self.height = value.as_f64().unwrap_or(self.height),
            LithologyField::Tension => self.tension = value.as_f64().unwrap_or(self.tension),
        }
        Ok(())
    }
}

/// Editable lithology attribute names
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum LithologyField {
    /// Fill color
    FillColor,
    /// Stroke color
    StrokeColor,
    /// Pattern reference
    Pattern,
    /// Contact code
    Contact,
    /// Pattern zoom
    Zoom,
    /// Pattern rotation
    Rotation,
    /// Layer height
    Height,
    /// Curve tension
    Tension,
}

impl LithologyField {
    /// Wire name of the field
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FillColor => "fillColor",
            Self::StrokeColor => "strokeColor",
            Self::Pattern => "pattern",
            Self::Contact => "contact",
            Self::Zoom => "zoom",
            Self::Rotation => "rotation",
            Self::Height => "height",
            Self::Tension => "tension",
        }
    }
}

/// A point on a lithology boundary curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ControlPoint {
    /// Horizontal position, 0..1
    pub x: f64,
    /// Vertical position, 0..1 within the row
    pub y: f64,
    /// Handle radius
    pub radius: f64,
    /// Whether the user may drag it
    pub movable: bool,
    /// Label
    #[serde(default)]
    pub name: String,
}

impl ControlPoint {
    /// A movable, unnamed point
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            radius: 5.0,
            movable: true,
            name: "none".to_string(),
        }
    }

    /// A fixed point anchoring the left edge
    #[must_use]
    pub fn fixed(x: f64, y: f64) -> Self {
        Self {
            x,
            y,
            radius: 5.0,
            movable: false,
            name: String::new(),
        }
    }

    /// The point inserted by `addControlPoint` at vertical position `y`
    #[must_use]
    pub fn at(y: f64) -> Self {
        Self::new(0.5, y)
    }
}

/// A fossil marker spanning a depth interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fossil {
    /// Upper depth bound
    pub upper: f64,
    /// Lower depth bound
    pub lower: f64,
    /// Image reference
    #[serde(rename = "fossilImg", default)]
    pub image: String,
    /// Horizontal offset
    #[serde(default)]
    pub x: f64,
}

impl Fossil {
    /// Depth bounds must be non-negative
    #[must_use]
    pub fn has_valid_bounds(&self) -> bool {
        self.upper >= 0.0 && self.lower >= 0.0
    }
}

/// A sample marker spanning a depth interval
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sample {
    /// Upper depth bound
    pub upper: f64,
    /// Lower depth bound
    pub lower: f64,
    /// Sample label
    #[serde(rename = "sampleText", default)]
    pub text: String,
    /// Horizontal offset
    #[serde(default)]
    pub x: f64,
}

impl Sample {
    /// Depth bounds must be non-negative
    #[must_use]
    pub fn has_valid_bounds(&self) -> bool {
        self.upper >= 0.0 && self.lower >= 0.0
    }
}

/// One occurrence interval of a facies
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FaciesSection {
    /// Top of the interval
    pub y1: f64,
    /// Bottom of the interval
    pub y2: f64,
}

/// Table layout of a document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentConfig {
    /// Columns in display order; names are unique
    pub columns: Vec<Column>,
    /// Depth axis grows upwards when set
    #[serde(default)]
    pub is_inverted: bool,
}

impl Default for DocumentConfig {
    fn default() -> Self {
        let column = |name: &str, removable: bool| Column {
            name: name.to_string(),
            visible: true,
            removable,
        };
        Self {
            columns: vec![
                column("Sistema", true),
                column("Edad", true),
                column("Formacion", true),
                column("Miembro", true),
                column("Espesor", false),
                column("Litologia", false),
                column("Estructura fosil", false),
                column("Facie", false),
                column("Muestras", false),
                column("AmbienteDepositacional", true),
                column("Descripcion", true),
            ],
            is_inverted: false,
        }
    }
}

/// A table column
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Column {
    /// Unique column name
    pub name: String,
    /// Whether the column is shown
    pub visible: bool,
    /// Whether users may delete it
    pub removable: bool,
}

impl Column {
    /// A user-added column: visible and removable
    #[must_use]
    pub fn custom(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            visible: true,
            removable: true,
        }
    }
}

/// Resolve an insertion position where `-1` means "append".
///
/// Valid positions are `0..=len`.
#[must_use]
pub fn insertion_index(index: i64, len: usize) -> Option<usize> {
    match index {
        -1 => Some(len),
        i if i >= 0 && (i as usize) <= len => Some(i as usize),
        _ => None,
    }
}

/// Resolve an existing element position where `-1` means "last".
///
/// Valid positions are `0..len`.
#[must_use]
pub fn element_index(index: i64, len: usize) -> Option<usize> {
    match index {
        -1 => len.checked_sub(1),
        i if i >= 0 && (i as usize) < len => Some(i as usize),
        _ => None,
    }
}
