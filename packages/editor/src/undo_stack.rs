//! # Undo/Redo Stack
//!
//! Tracks edit transactions as before/after snapshots.
//!
//! ## Design
//!
//! - Each committed transaction is recorded with a [`HistoryTag`]
//! - Consecutive `Typing` entries coalesce into one undo step
//! - `Historic` entries never coalesce, in either direction
//! - Undo restores the `before` snapshot and moves the entry to the redo stack
//! - New entries clear the redo stack
//!
//! ## Example
//!
//! ```rust,ignore
//! let mut stack = UndoStack::new();
//! let before = doc.snapshot();
//! // ... mutate ...
//! doc.commit();
//! stack.record(before, doc.snapshot(), HistoryTag::Typing);
//!
//! stack.undo(&mut doc);
//! doc.commit();
//! ```

use serde::{Deserialize, Serialize};

use crate::document::{Document, DocumentSnapshot};

/// How a transaction participates in history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HistoryTag {
    /// Ordinary editing; merges with adjacent typing
    Typing,

    /// A discrete action (e.g. resolving a suggestion) that stays its own step
    Historic,
}

/// One undo step
///
/// `before_state`/`after_state` carry host data that lives outside the tree
/// but must rewind with it; hosts without any use `()`.
#[derive(Debug, Clone)]
pub struct HistoryEntry<T = ()> {
    pub before: DocumentSnapshot,
    pub after: DocumentSnapshot,
    pub before_state: T,
    pub after_state: T,
    pub tag: HistoryTag,
    pub description: Option<String>,
}

/// Undo/redo stack for document editing
#[derive(Debug)]
pub struct UndoStack<T = ()> {
    /// Applied entries (most recent last)
    undo_stack: Vec<HistoryEntry<T>>,

    /// Undone entries (most recent last)
    redo_stack: Vec<HistoryEntry<T>>,

    /// Maximum number of undo levels (0 = unlimited)
    max_levels: usize,

    /// Forces the next typing entry to start a new step
    boundary: bool,
}

impl UndoStack {
    /// Create a new undo stack with default max levels (100)
    pub fn new() -> Self {
        Self::with_max_levels(100)
    }

    pub fn with_max_levels(max_levels: usize) -> Self {
        Self::with_state(max_levels)
    }

    /// Record a committed transaction
    pub fn record(&mut self, before: DocumentSnapshot, after: DocumentSnapshot, tag: HistoryTag) {
        self.record_described(before, after, tag, None);
    }

    pub fn record_described(
        &mut self,
        before: DocumentSnapshot,
        after: DocumentSnapshot,
        tag: HistoryTag,
        description: Option<String>,
    ) {
        self.record_with_state((before, ()), (after, ()), tag, description);
    }
}

impl<T> UndoStack<T> {
    /// Stack whose entries also carry host state of type `T`
    pub fn with_state(max_levels: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_levels,
            boundary: false,
        }
    }

    /// Record a committed transaction with the host state on either side
    pub fn record_with_state(
        &mut self,
        (before, before_state): (DocumentSnapshot, T),
        (after, after_state): (DocumentSnapshot, T),
        tag: HistoryTag,
        description: Option<String>,
    ) {
        self.redo_stack.clear();

        let boundary = std::mem::take(&mut self.boundary);
        if let Some(last) = self.undo_stack.last_mut() {
            let consecutive = last.after.version == before.version;
            if !boundary
                && consecutive
                && tag == HistoryTag::Typing
                && last.tag == HistoryTag::Typing
            {
                last.after = after;
                last.after_state = after_state;
                return;
            }
        }

        self.undo_stack.push(HistoryEntry {
            before,
            after,
            before_state,
            after_state,
            tag,
            description,
        });
        if self.max_levels > 0 && self.undo_stack.len() > self.max_levels {
            self.undo_stack.remove(0);
        }
    }

    /// Stop the next typing transaction from merging into the current step
    pub fn break_coalescing(&mut self) {
        self.boundary = true;
    }

    /// Undo the most recent step; the caller commits the resulting mutations
    pub fn undo(&mut self, doc: &mut Document) -> bool {
        self.undo_entry(doc).is_some()
    }

    /// Redo the most recently undone step; the caller commits
    pub fn redo(&mut self, doc: &mut Document) -> bool {
        self.redo_entry(doc).is_some()
    }

    /// Like [`undo`](Self::undo), handing back the entry so the host can
    /// rewind its own state to `before_state`
    pub fn undo_entry(&mut self, doc: &mut Document) -> Option<&HistoryEntry<T>> {
        let entry = self.undo_stack.pop()?;
        doc.restore(&entry.before);
        self.redo_stack.push(entry);
        self.boundary = true;
        self.redo_stack.last()
    }

    /// Like [`redo`](Self::redo); the host moves its state to `after_state`
    pub fn redo_entry(&mut self, doc: &mut Document) -> Option<&HistoryEntry<T>> {
        let entry = self.redo_stack.pop()?;
        doc.restore(&entry.after);
        self.undo_stack.push(entry);
        self.boundary = true;
        self.undo_stack.last()
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_levels(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_levels(&self) -> usize {
        self.redo_stack.len()
    }

    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.boundary = false;
    }

    pub fn undo_description(&self) -> Option<&str> {
        self.undo_stack
            .last()
            .and_then(|entry| entry.description.as_deref())
    }

    pub fn redo_description(&self) -> Option<&str> {
        self.redo_stack
            .last()
            .and_then(|entry| entry.description.as_deref())
    }
}

impl Default for UndoStack {
    fn default() -> Self {
        Self::new()
    }
}
