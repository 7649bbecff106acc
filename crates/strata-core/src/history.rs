//! Linear undo/redo history

use tracing::debug;

use crate::command::{Action, Command};
use crate::document::Document;
use crate::error::Result;

/// Undo and redo stacks for one document
#[derive(Debug, Clone, Default)]
pub struct History {
    undo: Vec<Action>,
    redo: Vec<Action>,
    limit: Option<usize>,
}

impl History {
    /// Create an unbounded history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a history keeping at most `limit` undo entries
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::default()
        }
    }

    /// Execute an action and push it on the undo stack.
    ///
    /// Clears the redo stack. On error the document is untouched and the
    /// history is unchanged.
    pub fn record(&mut self, doc: &mut Document, action: Action) -> Result<()> {
        doc.apply(&action.forward)?;
        self.redo.clear();
        self.undo.push(action);

        if let Some(limit) = self.limit {
            if self.undo.len() > limit {
                let excess = self.undo.len() - limit;
                self.undo.drain(..excess);
                debug!(dropped = excess, "history limit reached");
            }
        }

        Ok(())
    }

    /// Revert the most recent action.
    ///
    /// Returns the inverse command that was applied, or `None` if there was
    /// nothing to undo.
    pub fn undo(&mut self, doc: &mut Document) -> Result<Option<Command>> {
        let Some(action) = self.undo.pop() else {
            return Ok(None);
        };

        if let Err(e) = doc.apply(&action.inverse) {
            self.undo.push(action);
            return Err(e);
        }

        let inverse = action.inverse.clone();
        self.redo.push(action);
        Ok(Some(inverse))
    }

    /// Re-apply the most recently undone action.
    ///
    /// Returns the forward command that was applied, or `None` if there was
    /// nothing to redo.
    pub fn redo(&mut self, doc: &mut Document) -> Result<Option<Command>> {
        let Some(action) = self.redo.pop() else {
            return Ok(None);
        };

        if let Err(e) = doc.apply(&action.forward) {
            self.redo.push(action);
            return Err(e);
        }

        let forward = action.forward.clone();
        self.undo.push(action);
        Ok(Some(forward))
    }

    /// Number of undoable actions
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Number of redoable actions
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }
}
