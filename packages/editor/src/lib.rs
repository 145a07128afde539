//! # Redline Editor
//!
//! Rich document runtime consumed by the suggestion engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────┐
//! │ commands: EditCommand → CommandRegistry     │
//! │  - priority-ordered handlers                │
//! │  - default (untracked) editing              │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ document: arena tree + mutation primitives  │
//! │  - Element / Text / Mark nodes by key       │
//! │  - selection points and ranges              │
//! │  - commit → mutation-notification feed      │
//! └─────────────────────────────────────────────┘
//!                     ↓
//! ┌─────────────────────────────────────────────┐
//! │ undo_stack: snapshot history, tagged steps  │
//! └─────────────────────────────────────────────┘
//! ```
//!
//! ## Core Principles
//!
//! 1. **Keys, not references**: nodes are re-resolved by key on every read
//! 2. **Observable mutations**: every primitive feeds the next commit
//! 3. **Plain values**: selections are data, validated by their consumers
//!
//! ## Usage
//!
//! ```rust,ignore
//! use redline_editor::{apply_default, Document, EditCommand, Selection};
//!
//! let mut doc = Document::from_blocks(["Hello"]);
//! let caret = doc.point_at(0, 5).unwrap();
//! doc.set_selection(Some(Selection::collapsed(caret)));
//!
//! apply_default(&mut doc, &EditCommand::InsertText { text: "!".into() });
//! let commit = doc.commit();
//! assert_eq!(doc.plain_text(), "Hello!");
//! ```

mod commands;
mod document;
mod errors;
mod mutations;
mod selection;
pub mod text;
mod undo_stack;
pub mod visitor;

pub use commands::{
    apply_default, char_after, char_before, delete_range_plain, resolve_caret, CommandHandler,
    CommandOutcome, CommandRegistry, EditCommand, HandlerId, Priority,
};
pub use document::{Commit, Document, DocumentSnapshot, Node, NodeKey, NodeKind, NodeType};
pub use errors::EditorError;
pub use mutations::{MutationError, MutationKind, NodeMutation};
pub use selection::{Point, Selection};
pub use undo_stack::{HistoryEntry, HistoryTag, UndoStack};
pub use visitor::Visitor;
