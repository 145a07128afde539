//! Annotation ids carried by mark nodes.
//!
//! ```text
//! suggestion:<suggestionId>:insert   insert side of a suggestion
//! suggestion:<suggestionId>:delete   delete side of a suggestion
//! suggestion:<suggestionId>          thread reference (no kind), set by the thread UI
//! anything else                      foreign decoration, ignored here
//! ```

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

pub const SUGGESTION_PREFIX: &str = "suggestion";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnnotationKind {
    Insert,
    Delete,
}

impl AnnotationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            AnnotationKind::Insert => "insert",
            AnnotationKind::Delete => "delete",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "insert" => Some(AnnotationKind::Insert),
            "delete" => Some(AnnotationKind::Delete),
            _ => None,
        }
    }
}

/// Parsed form of a raw mark id
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationId {
    Suggestion {
        suggestion_id: String,
        kind: AnnotationKind,
    },
    ThreadRef {
        suggestion_id: String,
    },
    Other(String),
}

impl AnnotationId {
    pub fn suggestion(suggestion_id: impl Into<String>, kind: AnnotationKind) -> Self {
        AnnotationId::Suggestion {
            suggestion_id: suggestion_id.into(),
            kind,
        }
    }

    pub fn thread_ref(suggestion_id: impl Into<String>) -> Self {
        AnnotationId::ThreadRef {
            suggestion_id: suggestion_id.into(),
        }
    }

    pub fn parse(raw: &str) -> Self {
        let mut parts = raw.splitn(3, ':');
        let prefix = parts.next();
        let id = parts.next().filter(|id| !id.is_empty());
        let kind = parts.next();

        match (prefix, id, kind) {
            (Some(SUGGESTION_PREFIX), Some(id), None) => AnnotationId::thread_ref(id),
            (Some(SUGGESTION_PREFIX), Some(id), Some(kind)) => match AnnotationKind::parse(kind) {
                Some(kind) => AnnotationId::suggestion(id, kind),
                None => AnnotationId::Other(raw.to_string()),
            },
            _ => AnnotationId::Other(raw.to_string()),
        }
    }

    /// The referenced suggestion, for both kinded ids and thread references
    pub fn suggestion_id(&self) -> Option<&str> {
        match self {
            AnnotationId::Suggestion { suggestion_id, .. }
            | AnnotationId::ThreadRef { suggestion_id } => Some(suggestion_id),
            AnnotationId::Other(_) => None,
        }
    }

    pub fn kind(&self) -> Option<AnnotationKind> {
        match self {
            AnnotationId::Suggestion { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl fmt::Display for AnnotationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AnnotationId::Suggestion {
                suggestion_id,
                kind,
            } => write!(f, "{SUGGESTION_PREFIX}:{suggestion_id}:{}", kind.as_str()),
            AnnotationId::ThreadRef { suggestion_id } => {
                write!(f, "{SUGGESTION_PREFIX}:{suggestion_id}")
            }
            AnnotationId::Other(raw) => f.write_str(raw),
        }
    }
}

/// Raw id string for one side of a suggestion
pub fn annotation_key(suggestion_id: &str, kind: AnnotationKind) -> String {
    AnnotationId::suggestion(suggestion_id, kind).to_string()
}

/// The (suggestion id, kind) pairs of a mark's id set
pub fn signature(ids: &BTreeSet<String>) -> BTreeSet<(String, AnnotationKind)> {
    ids.iter()
        .filter_map(|raw| match AnnotationId::parse(raw) {
            AnnotationId::Suggestion {
                suggestion_id,
                kind,
            } => Some((suggestion_id, kind)),
            _ => None,
        })
        .collect()
}

/// Every suggestion referenced by a mark's id set, thread references included
pub fn referenced_suggestions(ids: &BTreeSet<String>) -> BTreeSet<String> {
    ids.iter()
        .filter_map(|raw| AnnotationId::parse(raw).suggestion_id().map(str::to_string))
        .collect()
}

/// Whether a mark's id set references `suggestion_id` in any form
pub fn references(ids: &BTreeSet<String>, suggestion_id: &str) -> bool {
    ids.iter()
        .any(|raw| AnnotationId::parse(raw).suggestion_id() == Some(suggestion_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_kinded_ids() {
        assert_eq!(
            AnnotationId::parse("suggestion:a1-3:insert"),
            AnnotationId::suggestion("a1-3", AnnotationKind::Insert)
        );
        assert_eq!(
            AnnotationId::parse("suggestion:a1-3:delete").kind(),
            Some(AnnotationKind::Delete)
        );
    }

    #[test]
    fn test_parse_thread_refs_and_foreign_ids() {
        assert_eq!(
            AnnotationId::parse("suggestion:a1-3"),
            AnnotationId::thread_ref("a1-3")
        );
        assert_eq!(
            AnnotationId::parse("comment:77"),
            AnnotationId::Other("comment:77".into())
        );
        assert_eq!(
            AnnotationId::parse("suggestion:a1:bold"),
            AnnotationId::Other("suggestion:a1:bold".into())
        );
        assert_eq!(AnnotationId::parse("suggestion:"), AnnotationId::Other("suggestion:".into()));
    }

    #[test]
    fn test_display_round_trips() {
        let id = AnnotationId::suggestion("x-1", AnnotationKind::Delete);
        assert_eq!(id.to_string(), "suggestion:x-1:delete");
        assert_eq!(AnnotationId::parse(&id.to_string()), id);
    }

    #[test]
    fn test_signature_ignores_foreign_ids() {
        let a = set(&["suggestion:s1:insert", "highlight:yellow"]);
        let b = set(&["suggestion:s1:insert", "suggestion:s1"]);
        assert_eq!(signature(&a), signature(&b));
        assert!(references(&b, "s1"));
        assert!(!references(&a, "s2"));
        assert_eq!(referenced_suggestions(&b), set(&["s1"]));
    }
}
