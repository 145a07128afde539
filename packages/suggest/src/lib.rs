//! # Redline Suggest
//!
//! Track-changes ("suggested edits") on top of the redline document runtime.
//!
//! ## Architecture
//!
//! ```text
//! EditCommand ──► Editor ──► CommandRegistry
//!                              │ High: SuggestionEngine::handle_command
//!                              │ Low:  apply_default (direct editing)
//!                              ▼
//!   ┌───────────────── SuggestionEngine ─────────────────┐
//!   │ normalize  selection → text range                  │
//!   │ intercept  extend / create / bypass / skip         │
//!   │ marks      split, annotate, merge, dissolve        │
//!   │ resolve    accept / reject                         │
//!   │ index      suggestion id → mark keys               │
//!   │ store      records, clock, ids, replication hook   │
//!   └────────────────────────────────────────────────────┘
//!                              │ commit
//!                              ▼
//!            index.observe ─► thread events ─► ThreadListener
//! ```
//!
//! Annotation ids on marks take the form `suggestion:<id>:<insert|delete>`;
//! `suggestion:<id>` alone links a mark to the suggestion's comment thread.
//!
//! ## Usage
//!
//! ```rust,ignore
//! use redline_suggest::{Author, EditCommand, Editor, EngineConfig};
//!
//! let config = EngineConfig { suggest_mode: true, ..EngineConfig::default() };
//! let mut editor = Editor::from_blocks(["Hello world"], config, 1);
//! editor.set_author(Some(Author::new("ada", "Ada")));
//! editor.select(0, 5, 5);
//! editor.dispatch(EditCommand::InsertText { text: ",".into() });
//!
//! let id = editor.engine().store().open()[0].id.clone();
//! editor.accept(&id);
//! ```

pub mod annotation;
pub mod config;
pub mod crdt;
mod editor;
mod engine;
mod errors;
pub mod id_generator;
pub mod index;
mod intercept;
pub mod marks;
pub mod markup;
pub mod normalize;
pub mod permissions;
mod resolve;
pub mod store;
pub mod suggestion;
pub mod threads;

pub use annotation::{AnnotationId, AnnotationKind};
pub use config::{ConfigError, EngineConfig, Labels, MissingAuthorPolicy};
pub use crdt::{CollabProvider, CrdtError, LoopbackProvider, SuggestionReplica};
pub use editor::{Editor, EditorState};
pub use engine::{SuggestionAnchor, SuggestionEngine};
pub use errors::SuggestError;
pub use id_generator::IdGenerator;
pub use index::AnnotationIndex;
pub use markup::{block_spans, markup, Span};
pub use permissions::AccessLevel;
pub use resolve::ResolveOutcome;
pub use store::{Clock, ManualClock, MergeOutcome, Rewound, StoreError, StoreSnapshot, SuggestionStore, SystemClock};
pub use suggestion::{Author, ResolveAction, Suggestion, SuggestionState, SuggestionType};
pub use threads::{ThreadEvent, ThreadListener, ThreadLog};

pub use redline_editor::{CommandOutcome, Document, EditCommand, NodeKey, Point, Selection};
