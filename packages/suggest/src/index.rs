//! Annotation index: suggestion id → mark nodes carrying it.
//!
//! Maintained from mark mutation notifications. Each mark's last seen id set
//! is remembered so a notification can be diffed against it; applying the
//! same notification twice is harmless, which lets the engine catch the index
//! up mid-transaction and again on commit.

use std::collections::{BTreeSet, HashMap, HashSet};

use redline_editor::visitor::{walk_children, walk_document, Visitor};
use redline_editor::{Commit, Document, MutationKind, NodeKey, NodeMutation, NodeType};
use tracing::debug;

use crate::annotation::{referenced_suggestions, AnnotationId, AnnotationKind};
use crate::store::SuggestionStore;

#[derive(Debug, Default, Clone)]
pub struct AnnotationIndex {
    by_suggestion: HashMap<String, HashSet<NodeKey>>,
    recorded: HashMap<NodeKey, BTreeSet<String>>,
}

impl AnnotationIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Index built from a full scan of the tree
    pub fn from_document(doc: &Document) -> Self {
        let mut index = Self::new();
        index.rebuild(doc);
        index
    }

    /// Apply the mark notifications of a committed transaction
    pub fn observe(&mut self, doc: &Document, commit: &Commit) {
        for mutation in commit.mutations_of(NodeType::Mark) {
            self.apply(doc, mutation);
        }
    }

    /// Apply notifications not yet committed
    pub fn catch_up(&mut self, doc: &Document) {
        for mutation in doc.pending() {
            if mutation.node_type == NodeType::Mark {
                self.apply(doc, mutation);
            }
        }
    }

    fn apply(&mut self, doc: &Document, mutation: &NodeMutation) {
        let previous = self.recorded.get(&mutation.key).cloned().unwrap_or_default();
        let current = match (mutation.kind, doc.mark_ids(mutation.key)) {
            (MutationKind::Destroyed, _) | (_, None) => BTreeSet::new(),
            (_, Some(ids)) => ids.clone(),
        };

        let before = referenced_suggestions(&previous);
        let after = referenced_suggestions(&current);
        for gone in before.difference(&after) {
            if let Some(keys) = self.by_suggestion.get_mut(gone) {
                keys.remove(&mutation.key);
                if keys.is_empty() {
                    self.by_suggestion.remove(gone);
                }
            }
        }
        for added in after.difference(&before) {
            self.by_suggestion
                .entry(added.clone())
                .or_default()
                .insert(mutation.key);
        }

        if current.is_empty() {
            self.recorded.remove(&mutation.key);
        } else {
            self.recorded.insert(mutation.key, current);
        }
    }

    /// Discard everything and rescan the tree
    pub fn rebuild(&mut self, doc: &Document) {
        let mut scan = MarkScan::default();
        walk_document(&mut scan, doc);
        self.by_suggestion.clear();
        self.recorded.clear();
        for (key, ids) in scan.marks {
            for suggestion_id in referenced_suggestions(&ids) {
                self.by_suggestion.entry(suggestion_id).or_default().insert(key);
            }
            self.recorded.insert(key, ids);
        }
        debug!(suggestions = self.by_suggestion.len(), "Annotation index rebuilt");
    }

    /// Marks referencing `suggestion_id`; empty when unknown
    pub fn nodes(&self, suggestion_id: &str) -> HashSet<NodeKey> {
        self.by_suggestion.get(suggestion_id).cloned().unwrap_or_default()
    }

    /// Live marks referencing `suggestion_id`, in document order
    pub fn ordered_nodes(&self, doc: &Document, suggestion_id: &str) -> Vec<NodeKey> {
        let mut keyed: Vec<(Vec<usize>, NodeKey)> = self
            .by_suggestion
            .get(suggestion_id)
            .into_iter()
            .flatten()
            .filter_map(|key| doc.path(*key).map(|path| (path, *key)))
            .collect();
        keyed.sort();
        keyed.into_iter().map(|(_, key)| key).collect()
    }

    /// Live marks carrying one side of a suggestion, in document order
    pub fn side_nodes(&self, doc: &Document, suggestion_id: &str, kind: AnnotationKind) -> Vec<NodeKey> {
        let wanted = AnnotationId::suggestion(suggestion_id, kind).to_string();
        self.ordered_nodes(doc, suggestion_id)
            .into_iter()
            .filter(|key| doc.mark_ids(*key).is_some_and(|ids| ids.contains(&wanted)))
            .collect()
    }

    /// Concatenated text of one side of a suggestion
    pub fn side_text(&self, doc: &Document, suggestion_id: &str, kind: AnnotationKind) -> String {
        self.side_nodes(doc, suggestion_id, kind)
            .into_iter()
            .map(|key| doc.text_content(key))
            .collect()
    }

    pub fn contains(&self, suggestion_id: &str) -> bool {
        self.by_suggestion.contains_key(suggestion_id)
    }

    pub fn suggestion_ids(&self) -> BTreeSet<String> {
        self.by_suggestion.keys().cloned().collect()
    }

    /// Suggestion ids present in the tree but unknown to the store
    pub fn orphans(&self, store: &SuggestionStore) -> Vec<String> {
        let mut orphans: Vec<String> = self
            .by_suggestion
            .keys()
            .filter(|id| !store.contains(id))
            .cloned()
            .collect();
        orphans.sort();
        orphans
    }

    pub fn len(&self) -> usize {
        self.by_suggestion.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_suggestion.is_empty()
    }
}

#[derive(Default)]
struct MarkScan {
    marks: Vec<(NodeKey, BTreeSet<String>)>,
}

impl Visitor for MarkScan {
    fn visit_mark(&mut self, doc: &Document, key: NodeKey, ids: &BTreeSet<String>) {
        if !ids.is_empty() {
            self.marks.push((key, ids.clone()));
        }
        walk_children(self, doc, key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::annotation::annotation_key;

    fn doc_with_mark(ids: &[&str]) -> (Document, NodeKey) {
        let mut doc = Document::from_blocks(["hello"]);
        let text = doc.text_nodes()[0];
        let mark = doc.wrap(text, text, ids.iter().copied()).unwrap();
        (doc, mark)
    }

    #[test]
    fn test_observe_created_mark() {
        let (mut doc, mark) = doc_with_mark(&["suggestion:s1:insert"]);
        let mut index = AnnotationIndex::new();
        let commit = doc.commit();
        index.observe(&doc, &commit);

        assert_eq!(index.nodes("s1"), HashSet::from([mark]));
        assert!(index.nodes("unknown").is_empty());
    }

    #[test]
    fn test_updated_ids_are_diffed() {
        let (mut doc, mark) = doc_with_mark(&["suggestion:s1:insert"]);
        let mut index = AnnotationIndex::new();
        let commit = doc.commit();
        index.observe(&doc, &commit);

        doc.remove_mark_id(mark, "suggestion:s1:insert").unwrap();
        doc.add_mark_id(mark, "suggestion:s2").unwrap();
        let commit = doc.commit();
        index.observe(&doc, &commit);

        assert!(!index.contains("s1"));
        assert_eq!(index.nodes("s2"), HashSet::from([mark]));
    }

    #[test]
    fn test_destroyed_mark_uses_recorded_ids() {
        let (mut doc, mark) = doc_with_mark(&["suggestion:s1:delete"]);
        let mut index = AnnotationIndex::new();
        let commit = doc.commit();
        index.observe(&doc, &commit);

        doc.unwrap(mark).unwrap();
        let commit = doc.commit();
        index.observe(&doc, &commit);
        assert!(index.is_empty());
    }

    #[test]
    fn test_catch_up_is_idempotent() {
        let (mut doc, mark) = doc_with_mark(&["suggestion:s1:insert"]);
        let mut index = AnnotationIndex::new();
        index.catch_up(&doc);
        index.catch_up(&doc);
        let commit = doc.commit();
        index.observe(&doc, &commit);

        assert_eq!(index.nodes("s1"), HashSet::from([mark]));
    }

    #[test]
    fn test_rebuild_matches_incremental() {
        let (mut doc, _) = doc_with_mark(&["suggestion:s1:insert", "suggestion:s1"]);
        let mut incremental = AnnotationIndex::new();
        let commit = doc.commit();
        incremental.observe(&doc, &commit);

        let rebuilt = AnnotationIndex::from_document(&doc);
        assert_eq!(rebuilt.suggestion_ids(), incremental.suggestion_ids());
        assert_eq!(rebuilt.nodes("s1"), incremental.nodes("s1"));
    }

    #[test]
    fn test_side_text() {
        let mut doc = Document::from_blocks(["oldnew"]);
        let text = doc.text_nodes()[0];
        let tail = doc.split_text(text, 3).unwrap();
        doc.wrap(text, text, [annotation_key("r", AnnotationKind::Delete)]).unwrap();
        doc.wrap(tail, tail, [annotation_key("r", AnnotationKind::Insert)]).unwrap();
        let index = AnnotationIndex::from_document(&doc);

        assert_eq!(index.side_text(&doc, "r", AnnotationKind::Delete), "old");
        assert_eq!(index.side_text(&doc, "r", AnnotationKind::Insert), "new");
        assert_eq!(index.ordered_nodes(&doc, "r").len(), 2);
    }
}
