//! Suggestion records and their lifecycle.
//!
//! ```text
//!            accept
//!   open ───────────► accepted
//!     │
//!     └─────────────► rejected
//!            reject
//! ```
//!
//! Both terminal states are final. Resolution effects on the tree mirror each
//! other: accepting keeps inserted text and removes deleted text, rejecting
//! does the opposite.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::annotation::AnnotationKind;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionType {
    Insert,
    Delete,
    Replace,
}

impl SuggestionType {
    /// Annotation kinds present in the tree for this type
    pub fn sides(self) -> &'static [AnnotationKind] {
        match self {
            SuggestionType::Insert => &[AnnotationKind::Insert],
            SuggestionType::Delete => &[AnnotationKind::Delete],
            SuggestionType::Replace => &[AnnotationKind::Delete, AnnotationKind::Insert],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SuggestionType::Insert => "insert",
            SuggestionType::Delete => "delete",
            SuggestionType::Replace => "replace",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionState {
    Open,
    Accepted,
    Rejected,
}

impl SuggestionState {
    pub fn is_terminal(self) -> bool {
        !matches!(self, SuggestionState::Open)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveAction {
    Accept,
    Reject,
}

impl ResolveAction {
    pub fn target_state(self) -> SuggestionState {
        match self {
            ResolveAction::Accept => SuggestionState::Accepted,
            ResolveAction::Reject => SuggestionState::Rejected,
        }
    }
}

/// What resolution does to one annotated side
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SideEffect {
    /// Keep the text, drop the annotation
    Strip,
    /// Remove the annotated text from the tree
    Remove,
}

/// Per-side effects of resolving a suggestion of a given type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolutionPlan {
    pub steps: Vec<(AnnotationKind, SideEffect)>,
}

impl ResolutionPlan {
    pub fn new(suggestion_type: SuggestionType, action: ResolveAction) -> Self {
        let steps = suggestion_type
            .sides()
            .iter()
            .map(|kind| (*kind, Self::effect(*kind, action)))
            .collect();
        Self { steps }
    }

    /// Accept keeps insertions and applies deletions; reject is the mirror.
    pub fn effect(kind: AnnotationKind, action: ResolveAction) -> SideEffect {
        match (kind, action) {
            (AnnotationKind::Insert, ResolveAction::Accept)
            | (AnnotationKind::Delete, ResolveAction::Reject) => SideEffect::Strip,
            (AnnotationKind::Insert, ResolveAction::Reject)
            | (AnnotationKind::Delete, ResolveAction::Accept) => SideEffect::Remove,
        }
    }
}

/// A user identity attached to suggestions
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Author {
    pub id: String,
    pub name: String,
}

impl Author {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }

    /// Stand-in identity for a client that has not signed in
    pub fn anonymous(client_id: u64) -> Self {
        Self::new(format!("anonymous-{client_id}"), "Anonymous")
    }
}

/// Metadata for one tracked change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Suggestion {
    pub id: String,
    #[serde(rename = "type")]
    pub suggestion_type: SuggestionType,
    pub author_id: String,
    pub author_name: String,
    pub state: SuggestionState,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Suggestion {
    pub fn new(
        id: impl Into<String>,
        suggestion_type: SuggestionType,
        author: &Author,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: id.into(),
            suggestion_type,
            author_id: author.id.clone(),
            author_name: author.name.clone(),
            state: SuggestionState::Open,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_open(&self) -> bool {
        self.state == SuggestionState::Open
    }

    pub fn is_authored_by(&self, author_id: &str) -> bool {
        self.author_id == author_id
    }

    pub fn plan(&self, action: ResolveAction) -> ResolutionPlan {
        ResolutionPlan::new(self.suggestion_type, action)
    }
}
