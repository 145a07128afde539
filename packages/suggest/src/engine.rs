//! The suggestion engine: state shared by interception, resolution and the
//! host-facing queries.

use chrono::{DateTime, Utc};
use redline_editor::{char_after, char_before, Commit, Document, NodeKey, Point};
use tracing::{debug, info, warn};

use crate::annotation::{AnnotationId, AnnotationKind};
use crate::config::EngineConfig;
use crate::crdt::{CrdtError, SuggestionReplica};
use crate::id_generator::IdGenerator;
use crate::index::AnnotationIndex;
use crate::marks::{is_mark, normalize_children, normalize_tree, strip_suggestion};
use crate::normalize::normalize_selection;
use crate::permissions::AccessLevel;
use crate::store::{MergeOutcome, Rewound, StoreError, StoreSnapshot, SuggestionStore};
use crate::suggestion::{Author, Suggestion, SuggestionState, SuggestionType};
use crate::threads::{DeferredQueue, ThreadEvent};

/// Memory of the latest insertion, so continued typing at the same caret
/// keeps extending the same suggestion
#[derive(Debug, Clone)]
pub(crate) struct LastInsertion {
    pub suggestion_id: String,
    pub author_id: String,
    pub caret: Point,
    pub at: DateTime<Utc>,
}

/// An open suggestion touching the selection, with the marks anchoring it
#[derive(Debug, Clone, PartialEq)]
pub struct SuggestionAnchor {
    pub suggestion: Suggestion,
    pub marks: Vec<NodeKey>,
}

#[derive(Debug)]
pub struct SuggestionEngine {
    pub(crate) config: EngineConfig,
    pub(crate) store: SuggestionStore,
    pub(crate) index: AnnotationIndex,
    pub(crate) deferred: DeferredQueue,
    pub(crate) access: AccessLevel,
    pub(crate) author: Option<Author>,
    pub(crate) suggest_mode: bool,
    pub(crate) last_insertion: Option<LastInsertion>,
}

impl SuggestionEngine {
    pub fn new(config: EngineConfig, store: SuggestionStore) -> Self {
        let suggest_mode = config.suggest_mode;
        Self {
            config,
            store,
            index: AnnotationIndex::new(),
            deferred: DeferredQueue::new(),
            access: AccessLevel::default(),
            author: None,
            suggest_mode,
            last_insertion: None,
        }
    }

    /// Engine with a wall-clock store whose ids are seeded by this client
    pub fn for_client(config: EngineConfig, client_id: u64) -> Self {
        let store = SuggestionStore::new(IdGenerator::new(&config.document_id, client_id));
        Self::new(config, store)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &SuggestionStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut SuggestionStore {
        &mut self.store
    }

    pub fn index(&self) -> &AnnotationIndex {
        &self.index
    }

    pub fn author(&self) -> Option<&Author> {
        self.author.as_ref()
    }

    pub fn set_author(&mut self, author: Option<Author>) {
        if self.author != author {
            self.last_insertion = None;
        }
        self.author = author;
    }

    pub(crate) fn require_author(&self) -> Result<Author, StoreError> {
        self.author.clone().ok_or(StoreError::MissingAuthor)
    }

    pub fn access_level(&self) -> AccessLevel {
        self.access
    }

    pub fn set_access_level(&mut self, access: AccessLevel) {
        self.access = access;
        if access.locks_suggest_mode() {
            self.suggest_mode = true;
        } else if !access.can_suggest() {
            self.suggest_mode = false;
        }
    }

    pub fn is_suggest_mode(&self) -> bool {
        self.suggest_mode
    }

    /// Enter or leave suggest mode; returns the effective mode
    pub fn set_suggest_mode(&mut self, on: bool) -> bool {
        self.suggest_mode = if self.access.locks_suggest_mode() {
            true
        } else {
            on && self.access.can_suggest()
        };
        self.last_insertion = None;
        self.suggest_mode
    }

    pub fn toggle_suggest_mode(&mut self) -> bool {
        self.set_suggest_mode(!self.suggest_mode)
    }

    pub fn can_accept(&self) -> bool {
        self.access.can_accept()
    }

    pub fn can_reject(&self, suggestion_id: &str) -> bool {
        self.store
            .get(suggestion_id)
            .is_some_and(|record| self.access.can_reject(record, self.author.as_ref()))
    }

    /// Feed a committed transaction into the annotation index
    pub fn observe(&mut self, doc: &Document, commit: &Commit) {
        self.index.observe(doc, commit);
    }

    pub fn rebuild_index(&mut self, doc: &Document) {
        self.index.rebuild(doc);
    }

    /// Bring the index up to date with uncommitted mutations
    pub(crate) fn sync_index(&mut self, doc: &Document) {
        self.index.catch_up(doc);
    }

    /// Forget the typing session used for insertion merging
    pub fn end_typing_session(&mut self) {
        self.last_insertion = None;
    }

    /// Move the records that differ between two store snapshots back to
    /// `to`, queueing the thread events a host needs to follow along
    pub fn rewind_records(&mut self, from: &StoreSnapshot, to: &StoreSnapshot) {
        for change in self.store.rewind(from, to) {
            match change {
                Rewound::Restored(id) => {
                    let label = self
                        .store
                        .get(&id)
                        .map(|record| self.label_for(record.suggestion_type).to_string())
                        .unwrap_or_default();
                    self.deferred.created(&id, &label);
                }
                Rewound::Removed(id) => self.deferred.discarded(&id),
                Rewound::StateChanged(id, SuggestionState::Open) => self.deferred.reopened(&id),
                Rewound::StateChanged(id, state) => self.deferred.resolved(&id, state),
                Rewound::Updated(id) => self.deferred.text_changed(&id),
            }
        }
    }

    /// Drop record changes made by a transaction that was abandoned
    ///
    /// No thread events are queued; the caller truncates the queue back to
    /// where the transaction started.
    pub(crate) fn rollback_records(&mut self, records: &StoreSnapshot) {
        let current = self.store.snapshot();
        self.store.rewind(&current, records);
    }

    /// Restore the mark invariants after an edit
    pub fn settle(&mut self, doc: &mut Document) {
        if let Err(e) = normalize_tree(doc) {
            warn!(error = %e, "Mark normalization failed");
        }
    }

    /// Turn work queued since the last call into thread events
    pub fn take_thread_events(&mut self, doc: &Document) -> Vec<ThreadEvent> {
        let mut queue = std::mem::take(&mut self.deferred);
        queue.drain(|id| self.preview_text(doc, id))
    }

    /// Text quoted by a suggestion's thread
    pub fn preview_text(&self, doc: &Document, suggestion_id: &str) -> String {
        let inserted = self.index.side_text(doc, suggestion_id, AnnotationKind::Insert);
        let deleted = || self.index.side_text(doc, suggestion_id, AnnotationKind::Delete);
        match self.store.get(suggestion_id).map(|s| s.suggestion_type) {
            Some(SuggestionType::Delete) => deleted(),
            _ if inserted.is_empty() => deleted(),
            _ => inserted,
        }
    }

    pub(crate) fn label_for(&self, suggestion_type: SuggestionType) -> &str {
        let labels = &self.config.labels;
        match suggestion_type {
            SuggestionType::Insert => &labels.insert,
            SuggestionType::Delete => &labels.delete,
            SuggestionType::Replace => &labels.replace,
        }
    }

    /// Marks enclosing a text leaf, innermost first
    pub(crate) fn marks_over(&self, doc: &Document, text: NodeKey) -> Vec<NodeKey> {
        let mut marks = Vec::new();
        let mut current = doc.parent(text);
        while let Some(key) = current.filter(|k| is_mark(doc, *k)) {
            marks.push(key);
            current = doc.parent(key);
        }
        marks
    }

    /// The open suggestion touching the current selection, if any
    pub fn suggestion_at_selection(&self, doc: &Document) -> Option<SuggestionAnchor> {
        let range = normalize_selection(doc, doc.selection()?)?;
        let leaves: Vec<NodeKey> = if range.is_collapsed() {
            [char_before(doc, range.start), char_after(doc, range.start)]
                .into_iter()
                .flatten()
                .map(|(key, _)| key)
                .chain(std::iter::once(range.start.key))
                .collect()
        } else {
            let texts = doc.text_nodes();
            let from = texts.iter().position(|k| *k == range.start.key)?;
            let to = texts.iter().position(|k| *k == range.end.key)?;
            texts[from..=to].to_vec()
        };

        for leaf in leaves {
            for mark in self.marks_over(doc, leaf) {
                let Some(ids) = doc.mark_ids(mark) else {
                    continue;
                };
                for raw in ids {
                    let parsed = AnnotationId::parse(raw);
                    let Some(record) = parsed.suggestion_id().and_then(|id| self.store.get(id)) else {
                        continue;
                    };
                    if record.is_open() {
                        return Some(SuggestionAnchor {
                            suggestion: record.clone(),
                            marks: self.index.ordered_nodes(doc, &record.id),
                        });
                    }
                }
            }
        }
        None
    }

    /// Strip annotations whose suggestion the store does not know
    ///
    /// Returns the number of orphaned suggestion ids removed.
    pub fn cleanup_orphans(&mut self, doc: &mut Document) -> usize {
        self.index.rebuild(doc);
        let orphans = self.index.orphans(&self.store);
        for suggestion_id in &orphans {
            warn!(suggestion_id = %suggestion_id, "Removing orphaned annotation");
            let mut parents = Vec::new();
            for mark in self.index.ordered_nodes(doc, suggestion_id) {
                parents.extend(doc.parent(mark));
                if let Err(e) = strip_suggestion(doc, mark, suggestion_id) {
                    warn!(suggestion_id = %suggestion_id, error = %e, "Failed to strip orphan");
                }
            }
            for parent in parents {
                if doc.contains(parent) {
                    if let Err(e) = normalize_children(doc, parent) {
                        warn!(error = %e, "Mark normalization failed");
                    }
                }
            }
        }
        orphans.len()
    }

    /// Mirror the store into a replica, now and on every later change
    pub fn attach_replica(&mut self, replica: SuggestionReplica) -> Result<(), CrdtError> {
        for record in self.store.all() {
            replica.put(record)?;
        }
        info!(document_id = replica.document_id(), "Suggestion store replicated");
        self.store.set_replication(Box::new(replica));
        Ok(())
    }

    /// Fold every record of a replica into the store
    ///
    /// Returns how many local records were inserted or replaced.
    pub fn merge_remote_records(&mut self, replica: &SuggestionReplica) -> Result<usize, CrdtError> {
        let mut changed = 0;
        for record in replica.records()? {
            let id = record.id.clone();
            match self.store.merge_remote(record) {
                MergeOutcome::Inserted | MergeOutcome::Updated => {
                    debug!(suggestion_id = %id, "Remote suggestion merged");
                    if self
                        .last_insertion
                        .as_ref()
                        .is_some_and(|m| m.suggestion_id == id && !self.store.is_open(&id))
                    {
                        self.last_insertion = None;
                    }
                    changed += 1;
                }
                MergeOutcome::KeptLocal => {}
            }
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_editor::Selection;

    fn engine() -> SuggestionEngine {
        let mut engine = SuggestionEngine::new(
            EngineConfig::default(),
            SuggestionStore::new(IdGenerator::from_seed("t")),
        );
        engine.set_author(Some(Author::new("ada", "Ada")));
        engine
    }

    #[test]
    fn test_suggest_mode_follows_access_level() {
        let mut engine = engine();
        assert!(!engine.is_suggest_mode());
        assert!(engine.toggle_suggest_mode());

        engine.set_access_level(AccessLevel::Suggest);
        assert!(engine.set_suggest_mode(false));
        assert!(engine.is_suggest_mode());

        engine.set_access_level(AccessLevel::View);
        assert!(!engine.toggle_suggest_mode());
        assert!(!engine.can_accept());
    }

    #[test]
    fn test_suggestion_at_selection_finds_open_record() {
        let mut engine = engine();
        let record = engine.store.create(SuggestionType::Insert, &Author::new("ada", "Ada"));
        let mut doc = Document::from_blocks(["abc"]);
        let text = doc.text_nodes()[0];
        let mark = doc
            .wrap(text, text, [crate::annotation::annotation_key(&record.id, AnnotationKind::Insert)])
            .unwrap();
        engine.rebuild_index(&doc);
        doc.set_selection(Some(Selection::collapsed(Point::new(text, 1))));

        let anchor = engine.suggestion_at_selection(&doc).unwrap();
        assert_eq!(anchor.suggestion.id, record.id);
        assert_eq!(anchor.marks, vec![mark]);
    }

    #[test]
    fn test_cleanup_orphans_strips_unknown_ids() {
        let mut engine = engine();
        let mut doc = Document::from_blocks(["abc"]);
        let text = doc.text_nodes()[0];
        doc.wrap(text, text, ["suggestion:ghost:insert"]).unwrap();
        doc.commit();

        assert_eq!(engine.cleanup_orphans(&mut doc), 1);
        assert!(doc.marks().is_empty());
        assert_eq!(doc.plain_text(), "abc");
    }
}
