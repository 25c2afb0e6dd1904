//! Linear undo/redo history

use tracing::{debug, warn};

use crate::command::{Change, Command};
use crate::error::Result;
use crate::provider::Provider;
use crate::tree::NodeTree;

/// Undo and redo stacks of applied changes
#[derive(Debug, Default)]
pub struct UndoLog {
    undo: Vec<Change>,
    redo: Vec<Change>,
    limit: usize,
}

impl UndoLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keep at most `limit` undo steps; 0 means unbounded
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit,
            ..Self::default()
        }
    }

    /// Apply a command and record it.
    ///
    /// A rejected command leaves the tree, the provider and both stacks
    /// untouched.
    pub fn execute(
        &mut self,
        command: Command,
        tree: &mut NodeTree,
        provider: &mut dyn Provider,
    ) -> Result<()> {
        let description = command.to_string();
        match command.apply(tree, provider) {
            Ok(change) => {
                self.push(change);
                Ok(())
            }
            Err(e) => {
                warn!("Rejected {}: {}", description, e);
                Err(e)
            }
        }
    }

    /// Record an already applied change; clears the redo side
    pub fn push(&mut self, change: Change) {
        self.redo.clear();
        self.undo.push(change);
        if self.limit > 0 && self.undo.len() > self.limit {
            let excess = self.undo.len() - self.limit;
            self.undo.drain(..excess);
        }
    }

    /// Revert the most recent change. Returns `false` when there is nothing to undo.
    pub fn undo(&mut self, tree: &mut NodeTree, provider: &mut dyn Provider) -> Result<bool> {
        let Some(change) = self.undo.last() else {
            return Ok(false);
        };
        if let Err(e) = change.invert(tree, provider) {
            warn!("Undo of {} failed: {}", change.label(), e);
            return Err(e);
        }
        debug!("Undid {}", change.label());
        if let Some(change) = self.undo.pop() {
            self.redo.push(change);
        }
        Ok(true)
    }

    /// Reapply the most recently undone change. Returns `false` when there is nothing to redo.
    pub fn redo(&mut self, tree: &mut NodeTree, provider: &mut dyn Provider) -> Result<bool> {
        let Some(change) = self.redo.last() else {
            return Ok(false);
        };
        if let Err(e) = change.apply(tree, provider) {
            warn!("Redo of {} failed: {}", change.label(), e);
            return Err(e);
        }
        debug!("Redid {}", change.label());
        if let Some(change) = self.redo.pop() {
            self.undo.push(change);
        }
        Ok(true)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Label of the change the next undo would revert
    pub fn undo_label(&self) -> Option<&'static str> {
        self.undo.last().map(Change::label)
    }

    pub fn redo_label(&self) -> Option<&'static str> {
        self.redo.last().map(Change::label)
    }

    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
