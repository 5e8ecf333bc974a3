//! Undo / redo stacks of exact inverses

use crate::mutation::Inverse;
use std::collections::VecDeque;

/// Default number of undoable edits kept
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Bounded undo history
#[derive(Debug)]
pub struct UndoHistory {
    undo: VecDeque<Inverse>,
    redo: Vec<Inverse>,
    limit: usize,
}

impl Default for UndoHistory {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_LIMIT)
    }
}

impl UndoHistory {
    /// Create history keeping at most `limit` edits
    #[must_use]
    pub fn new(limit: usize) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: Vec::new(),
            limit: limit.max(1),
        }
    }

    /// Record a fresh edit; clears the redo stack
    pub fn record(&mut self, inverse: Inverse) {
        self.redo.clear();
        self.undo.push_back(inverse);
        if self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    /// Take the most recent undo entry
    pub fn pop_undo(&mut self) -> Option<Inverse> {
        self.undo.pop_back()
    }

    /// Take the most recent redo entry
    pub fn pop_redo(&mut self) -> Option<Inverse> {
        self.redo.pop()
    }

    /// Store the counterpart of an undone edit
    pub fn push_redo(&mut self, inverse: Inverse) {
        self.redo.push(inverse);
    }

    /// Store the counterpart of a redone edit, keeping the redo stack
    pub fn push_undo(&mut self, inverse: Inverse) {
        self.undo.push_back(inverse);
        if self.undo.len() > self.limit {
            self.undo.pop_front();
        }
    }

    /// Undoable edits
    #[inline]
    #[must_use]
    pub fn undo_len(&self) -> usize {
        self.undo.len()
    }

    /// Redoable edits
    #[inline]
    #[must_use]
    pub fn redo_len(&self) -> usize {
        self.redo.len()
    }

    /// Forget everything
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
    }
}
