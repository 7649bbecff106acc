//! Strata Core - Stratigraphic document model
//!
//! This crate holds everything about a room's content that does not touch
//! the network or the disk:
//! - Document: rows, lithology, fossils, samples, facies and column config
//! - Edit: decoded client requests for mutating a document
//! - Command/Action: reversible, data-carrying forward/inverse operations
//! - History: linear undo/redo stacks
//! - Autosave: debounce/threshold policy deciding when a room is persisted
//!
//! ## Usage
//!
//! ```ignore
//! use strata_core::{Document, Edit, History, edit::AddRow};
//!
//! let mut doc = Document::default();
//! let mut history = History::new();
//!
//! if let Some(action) = doc.prepare(Edit::AddRow(AddRow { row_index: -1, height: 0.0 })) {
//!     history.record(&mut doc, action)?;
//! }
//! history.undo(&mut doc)?;
//! ```

#![forbid(unsafe_code)]

pub mod autosave;
pub mod command;
pub mod document;
pub mod edit;
pub mod error;
pub mod history;

pub use autosave::{AutosaveDecision, AutosavePolicy};
pub use command::{Action, Command};
pub use document::{
    Column, ControlPoint, DepthCoordinates, Document, DocumentConfig, FaciesSection, Fossil,
    Lithology, LithologyField, Row, Sample,
};
pub use edit::Edit;
pub use error::{Error, Result};
pub use history::History;
