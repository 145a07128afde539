//! Edit interception.
//!
//! In suggest mode every insert, delete, paste and drop is claimed here before
//! the default handler sees it. Each operation ends in one of:
//!
//! ```text
//! extend     text goes into (or is marked next to) an open suggestion by the same author
//! create     a new suggestion record plus a new mark
//! bypass     the edit touches the author's own pending insertion and is applied directly
//! skip       the text is already pending deletion; only the caret moves
//! ```

use chrono::Duration;
use redline_editor::text::char_len;
use redline_editor::{
    char_after, char_before, resolve_caret, CommandOutcome, Document, EditCommand, NodeKey, Point,
    Selection,
};
use std::cmp::Ordering;
use tracing::{debug, warn};

use crate::annotation::{annotation_key, AnnotationId, AnnotationKind};
use crate::config::MissingAuthorPolicy;
use crate::engine::{LastInsertion, SuggestionEngine};
use crate::errors::SuggestError;
use crate::marks::{annotate_leaf, insert_marked_text, merge_around, split_range, strip_suggestion};
use crate::normalize::normalize_selection;
use crate::suggestion::{Author, SuggestionType};

/// What already covers a character
#[derive(Debug, Clone, PartialEq, Eq)]
enum Coverage {
    /// Delete side of an open replace suggestion
    ReplaceDelete(NodeKey),
    /// Delete side of any other open suggestion
    PendingDelete(NodeKey),
    /// The current author's own open insertion
    OwnInsert(String),
    Plain,
}

/// Result of marking a span as deleted
#[derive(Debug)]
struct Deletion {
    /// Suggestion covering the newly annotated text
    suggestion_id: Option<String>,
    /// Leaves annotated in this step, in document order
    annotated: Vec<NodeKey>,
    /// Caret position when nothing was annotated
    fallback: Point,
}

impl SuggestionEngine {
    /// Command handler; returns `NotHandled` to let default editing run
    pub fn handle_command(&mut self, doc: &mut Document, command: &EditCommand) -> CommandOutcome {
        if !self.access.can_suggest() {
            debug!(command = command.name(), "Read-only access, edit dropped");
            return CommandOutcome::Handled;
        }
        if !self.suggest_mode {
            return CommandOutcome::NotHandled;
        }
        let author = match self.require_author() {
            Ok(author) => author,
            Err(e) => {
                warn!(command = command.name(), error = %e, "Suggestion refused");
                return match self.config.missing_author {
                    MissingAuthorPolicy::Fallthrough => CommandOutcome::NotHandled,
                    MissingAuthorPolicy::Drop => CommandOutcome::Handled,
                };
            }
        };
        if let Some(selection) = doc.selection() {
            if !doc.selection_is_live(selection) {
                warn!(command = command.name(), "Stale selection, edit abandoned");
                return CommandOutcome::NotHandled;
            }
        }

        self.transact(doc, command.name(), |engine, doc| match command {
            EditCommand::InsertText { text } | EditCommand::Paste { text } => {
                engine.suggest_insert(doc, &author, text)
            }
            EditCommand::DeleteCharacter { backward } => engine.suggest_delete(doc, &author, *backward),
            EditCommand::Drop {
                text,
                target,
                source,
            } => engine.suggest_drop(doc, &author, text, *target, *source),
        })
    }

    /// Run one tracked edit
    ///
    /// On failure the tree, the suggestion records and the queued thread
    /// events are put back as they were, and the edit is declined.
    pub(crate) fn transact<F>(&mut self, doc: &mut Document, name: &str, edit: F) -> CommandOutcome
    where
        F: FnOnce(&mut Self, &mut Document) -> Result<CommandOutcome, SuggestError>,
    {
        let before = doc.snapshot();
        let records = self.store.snapshot();
        let queued = self.deferred.len();
        match edit(self, doc) {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(command = name, error = %e, "Suggestion tracking failed, edit abandoned");
                doc.restore(&before);
                self.rollback_records(&records);
                self.deferred.truncate(queued);
                self.last_insertion = None;
                self.index.rebuild(doc);
                CommandOutcome::NotHandled
            }
        }
    }

    fn suggest_insert(
        &mut self,
        doc: &mut Document,
        author: &Author,
        text: &str,
    ) -> Result<CommandOutcome, SuggestError> {
        let Some(selection) = doc.selection().copied() else {
            return Ok(CommandOutcome::NotHandled);
        };
        let Some(range) = normalize_selection(doc, &selection) else {
            debug!("Unresolvable selection, falling through");
            return Ok(CommandOutcome::NotHandled);
        };
        if text.is_empty() {
            return Ok(CommandOutcome::Handled);
        }

        let caret = if range.is_collapsed() {
            range.start
        } else {
            let deletion = self.mark_deleted(doc, author, range.start, range.end, true)?;
            match (deletion.suggestion_id, deletion.annotated.last()) {
                (Some(suggestion_id), Some(last)) => {
                    let at = Point::new(*last, doc.text_len(*last));
                    self.insert_new_mark(doc, author, &suggestion_id, at, text)?;
                    return Ok(CommandOutcome::Handled);
                }
                _ => deletion.fallback,
            }
        };
        let Some(caret) = resolve_caret(doc, caret)? else {
            return Ok(CommandOutcome::NotHandled);
        };

        if let Some((suggestion_id, at)) = self.insert_merge_target(doc, author, caret) {
            debug!(suggestion_id = %suggestion_id, "Extending insertion");
            doc.insert_text(at.key, at.offset, text)?;
            self.store.touch(&suggestion_id)?;
            self.deferred.text_changed(&suggestion_id);
            let caret = Point::new(at.key, at.offset + char_len(text));
            self.remember_insertion(author, &suggestion_id, caret);
            doc.set_selection(Some(Selection::collapsed(caret)));
            return Ok(CommandOutcome::Handled);
        }

        let record = self.store.create(SuggestionType::Insert, author);
        let label = self.label_for(SuggestionType::Insert).to_string();
        self.deferred.created(&record.id, &label);
        self.insert_new_mark(doc, author, &record.id, caret, text)?;
        Ok(CommandOutcome::Handled)
    }

    /// Insert `text` in a fresh insert-kind mark of `suggestion_id`
    fn insert_new_mark(
        &mut self,
        doc: &mut Document,
        author: &Author,
        suggestion_id: &str,
        at: Point,
        text: &str,
    ) -> Result<(), SuggestError> {
        let id = annotation_key(suggestion_id, AnnotationKind::Insert);
        let (mark, leaf) = insert_marked_text(doc, at, text, &id)?;
        merge_around(doc, mark)?;
        self.deferred.text_changed(suggestion_id);

        let caret = Point::new(leaf, char_len(text));
        self.remember_insertion(author, suggestion_id, caret);
        doc.set_selection(Some(Selection::collapsed(caret)));
        Ok(())
    }

    fn remember_insertion(&mut self, author: &Author, suggestion_id: &str, caret: Point) {
        self.last_insertion = Some(LastInsertion {
            suggestion_id: suggestion_id.to_string(),
            author_id: author.id.clone(),
            caret,
            at: self.store.now(),
        });
    }

    /// Where typing at `caret` continues an open insertion by `author`
    fn insert_merge_target(&self, doc: &Document, author: &Author, caret: Point) -> Option<(String, Point)> {
        // Trailing edge of (or inside) an own insertion
        if let Some((key, offset)) = char_before(doc, caret) {
            if let Some(id) = self.own_insert_at(doc, key, author) {
                return Some((id, Point::new(key, offset + 1)));
            }
        }
        // Leading edge of a following own insertion
        if let Some((key, offset)) = char_after(doc, caret) {
            if let Some(id) = self.own_insert_at(doc, key, author) {
                return Some((id, Point::new(key, offset)));
            }
        }

        let memory = self.last_insertion.as_ref()?;
        if memory.caret != caret || memory.author_id != author.id {
            return None;
        }
        let window = Duration::milliseconds(i64::try_from(self.config.merge_window_ms).unwrap_or(i64::MAX));
        if self.store.now() - memory.at > window || !doc.is_text(caret.key) {
            return None;
        }
        let id = self.own_insert_at(doc, caret.key, author)?;
        (id == memory.suggestion_id).then_some((id, caret))
    }

    /// Open insertion by `author` covering `text`, unless it is pending deletion
    fn own_insert_at(&self, doc: &Document, text: NodeKey, author: &Author) -> Option<String> {
        match self.coverage(doc, text, author) {
            Coverage::OwnInsert(id) => Some(id),
            _ => None,
        }
    }

    fn coverage(&self, doc: &Document, text: NodeKey, author: &Author) -> Coverage {
        let mut pending = None;
        let mut own = None;
        for mark in self.marks_over(doc, text) {
            let Some(ids) = doc.mark_ids(mark) else {
                continue;
            };
            for raw in ids {
                let AnnotationId::Suggestion {
                    suggestion_id,
                    kind,
                } = AnnotationId::parse(raw)
                else {
                    continue;
                };
                // Orphaned ids are inert
                let Some(record) = self.store.get(&suggestion_id).filter(|r| r.is_open()) else {
                    continue;
                };
                match kind {
                    AnnotationKind::Delete if record.suggestion_type == SuggestionType::Replace => {
                        return Coverage::ReplaceDelete(mark);
                    }
                    AnnotationKind::Delete => pending = pending.or(Some(mark)),
                    AnnotationKind::Insert if record.is_authored_by(&author.id) => {
                        own = own.or(Some(suggestion_id));
                    }
                    AnnotationKind::Insert => {}
                }
            }
        }
        match (pending, own) {
            (Some(mark), _) => Coverage::PendingDelete(mark),
            (None, Some(id)) => Coverage::OwnInsert(id),
            (None, None) => Coverage::Plain,
        }
    }

    fn suggest_delete(
        &mut self,
        doc: &mut Document,
        author: &Author,
        backward: bool,
    ) -> Result<CommandOutcome, SuggestError> {
        let Some(selection) = doc.selection().copied() else {
            return Ok(CommandOutcome::NotHandled);
        };
        let Some(range) = normalize_selection(doc, &selection) else {
            debug!("Unresolvable selection, falling through");
            return Ok(CommandOutcome::NotHandled);
        };
        self.last_insertion = None;

        if !range.is_collapsed() {
            let deletion = self.mark_deleted(doc, author, range.start, range.end, false)?;
            let caret = self.caret_beside(doc, &deletion, backward);
            doc.set_selection(Some(Selection::collapsed(caret)));
            return Ok(CommandOutcome::Handled);
        }

        let mut caret = range.start;
        // Each pass either finishes or moves the caret across one mark
        for _ in 0..=doc.len() {
            let target = if backward {
                char_before(doc, caret)
            } else {
                char_after(doc, caret)
            };
            let Some((key, offset)) = target else {
                debug!(backward, "Block boundary, nothing to suggest");
                doc.set_selection(Some(Selection::collapsed(caret)));
                return Ok(CommandOutcome::Handled);
            };

            match self.coverage(doc, key, author) {
                Coverage::ReplaceDelete(mark) => {
                    let caret = across(doc, mark, backward).unwrap_or(caret);
                    doc.set_selection(Some(Selection::collapsed(caret)));
                    return Ok(CommandOutcome::Handled);
                }
                Coverage::PendingDelete(mark) => {
                    caret = across(doc, mark, backward).unwrap_or(caret);
                }
                Coverage::OwnInsert(suggestion_id) => {
                    debug!(suggestion_id = %suggestion_id, "Deleting inside own insertion");
                    let caret = self.delete_own_char(doc, key, offset)?;
                    self.after_own_shrink(doc, &suggestion_id)?;
                    doc.set_selection(Some(Selection::collapsed(caret)));
                    return Ok(CommandOutcome::Handled);
                }
                Coverage::Plain => {
                    let deletion = self.mark_deleted(
                        doc,
                        author,
                        Point::new(key, offset),
                        Point::new(key, offset + 1),
                        false,
                    )?;
                    let caret = self.caret_beside(doc, &deletion, backward);
                    doc.set_selection(Some(Selection::collapsed(caret)));
                    return Ok(CommandOutcome::Handled);
                }
            }
        }
        doc.set_selection(Some(Selection::collapsed(caret)));
        Ok(CommandOutcome::Handled)
    }

    /// Annotate `[start, end)` as deleted
    ///
    /// The author's own pending insertions inside the span are removed
    /// directly and text already pending deletion is left alone. The rest
    /// joins an adjacent open deletion by the same author or a new suggestion
    /// (`replace` when the deletion precedes replacement text).
    fn mark_deleted(
        &mut self,
        doc: &mut Document,
        author: &Author,
        start: Point,
        end: Point,
        replace: bool,
    ) -> Result<Deletion, SuggestError> {
        let covered = split_range(doc, start, end)?;
        let (Some(first), Some(last)) = (covered.first().copied(), covered.last().copied()) else {
            return Ok(Deletion {
                suggestion_id: None,
                annotated: Vec::new(),
                fallback: start,
            });
        };

        let fallback = char_before(doc, Point::new(first, 0))
            .map(|(key, offset)| Point::new(key, offset + 1))
            .or_else(|| {
                char_after(doc, Point::new(last, doc.text_len(last))).map(|(key, offset)| Point::new(key, offset))
            })
            .or_else(|| doc.block_of(first).map(|block| Point::new(block, 0)))
            .unwrap_or(start);

        let mut annotate = Vec::new();
        let mut shrunk: Vec<String> = Vec::new();
        for leaf in covered {
            match self.coverage(doc, leaf, author) {
                Coverage::OwnInsert(id) => {
                    self.remove_leaf(doc, leaf)?;
                    if !shrunk.contains(&id) {
                        shrunk.push(id);
                    }
                }
                Coverage::ReplaceDelete(_) | Coverage::PendingDelete(_) => {}
                Coverage::Plain => annotate.push(leaf),
            }
        }
        for id in &shrunk {
            self.after_own_shrink(doc, id)?;
        }

        let (Some(first), Some(last)) = (annotate.first().copied(), annotate.last().copied()) else {
            return Ok(Deletion {
                suggestion_id: None,
                annotated: annotate,
                fallback,
            });
        };

        let suggestion_id = match self.adjacent_own_deletion(doc, author, first, last) {
            Some(id) => {
                debug!(suggestion_id = %id, replace, "Extending deletion");
                if replace {
                    self.store.set_type(&id, SuggestionType::Replace)?;
                } else {
                    self.store.touch(&id)?;
                }
                self.deferred.text_changed(&id);
                id
            }
            None => {
                let kind = if replace {
                    SuggestionType::Replace
                } else {
                    SuggestionType::Delete
                };
                let record = self.store.create(kind, author);
                let label = self.label_for(kind).to_string();
                self.deferred.created(&record.id, &label);
                record.id
            }
        };

        let id = annotation_key(&suggestion_id, AnnotationKind::Delete);
        let mut marks = Vec::with_capacity(annotate.len());
        for leaf in &annotate {
            marks.push(annotate_leaf(doc, *leaf, &id)?);
        }
        for mark in marks {
            if doc.contains(mark) {
                merge_around(doc, mark)?;
            }
        }

        Ok(Deletion {
            suggestion_id: Some(suggestion_id),
            annotated: annotate,
            fallback,
        })
    }

    /// An open deletion or replacement by `author` whose delete side touches
    /// the span `first..=last`
    fn adjacent_own_deletion(&self, doc: &Document, author: &Author, first: NodeKey, last: NodeKey) -> Option<String> {
        let before = char_before(doc, Point::new(first, 0));
        let after = char_after(doc, Point::new(last, doc.text_len(last)));

        before.into_iter().chain(after).find_map(|(key, _)| {
            self.marks_over(doc, key).into_iter().find_map(|mark| {
                doc.mark_ids(mark)?.iter().find_map(|raw| match AnnotationId::parse(raw) {
                    AnnotationId::Suggestion {
                        suggestion_id,
                        kind: AnnotationKind::Delete,
                    } => self
                        .store
                        .get(&suggestion_id)
                        .filter(|r| {
                            r.is_open()
                                && r.is_authored_by(&author.id)
                                && matches!(r.suggestion_type, SuggestionType::Delete | SuggestionType::Replace)
                        })
                        .map(|r| r.id.clone()),
                    _ => None,
                })
            })
        })
    }

    /// Caret on the proper side of the deletion's mark
    fn caret_beside(&self, doc: &Document, deletion: &Deletion, backward: bool) -> Point {
        let edge = if backward {
            deletion.annotated.first()
        } else {
            deletion.annotated.last()
        };
        edge.and_then(|leaf| doc.parent(*leaf))
            .and_then(|mark| across(doc, mark, backward))
            .unwrap_or(deletion.fallback)
    }

    /// Delete one char of an own insertion; returns the caret
    fn delete_own_char(&mut self, doc: &mut Document, key: NodeKey, offset: usize) -> Result<Point, SuggestError> {
        doc.delete_text(key, offset, offset + 1)?;
        if doc.text_len(key) > 0 {
            return Ok(Point::new(key, offset));
        }

        let caret = char_before(doc, Point::new(key, 0))
            .map(|(k, o)| Point::new(k, o + 1))
            .or_else(|| char_after(doc, Point::new(key, 0)).map(|(k, o)| Point::new(k, o)))
            .or_else(|| doc.block_of(key).map(|block| Point::new(block, 0)))
            .unwrap_or(Point::new(doc.root(), 0));
        self.remove_leaf(doc, key)?;
        Ok(caret)
    }

    /// Remove a text leaf and every mark it leaves childless
    fn remove_leaf(&mut self, doc: &mut Document, leaf: NodeKey) -> Result<(), SuggestError> {
        let mut parent = doc.parent(leaf);
        doc.remove(leaf)?;
        while let Some(mark) = parent.filter(|p| doc.mark_ids(*p).is_some() && doc.children(*p).is_empty()) {
            parent = doc.parent(mark);
            doc.remove(mark)?;
        }
        Ok(())
    }

    /// Bookkeeping after an own insertion lost text
    fn after_own_shrink(&mut self, doc: &mut Document, suggestion_id: &str) -> Result<(), SuggestError> {
        self.sync_index(doc);
        let remaining = self.index.side_text(doc, suggestion_id, AnnotationKind::Insert);
        if !remaining.is_empty() {
            self.store.touch(suggestion_id)?;
            self.deferred.text_changed(suggestion_id);
            return Ok(());
        }

        match self.store.get(suggestion_id).map(|r| r.suggestion_type) {
            Some(SuggestionType::Replace) => {
                debug!(suggestion_id, "Replacement text gone, now a deletion");
                self.store.set_type(suggestion_id, SuggestionType::Delete)?;
                self.deferred.text_changed(suggestion_id);
            }
            Some(_) => {
                for mark in self.index.ordered_nodes(doc, suggestion_id) {
                    strip_suggestion(doc, mark, suggestion_id)?;
                }
                self.store.discard(suggestion_id);
                self.deferred.discarded(suggestion_id);
                if self
                    .last_insertion
                    .as_ref()
                    .is_some_and(|m| m.suggestion_id == suggestion_id)
                {
                    self.last_insertion = None;
                }
            }
            None => {}
        }
        Ok(())
    }

    fn suggest_drop(
        &mut self,
        doc: &mut Document,
        author: &Author,
        text: &str,
        target: Point,
        source: Option<Selection>,
    ) -> Result<CommandOutcome, SuggestError> {
        let Some(source) = source.filter(|s| !s.is_collapsed()) else {
            doc.set_selection(Some(Selection::collapsed(target)));
            return self.suggest_insert(doc, author, text);
        };

        let (source_start, source_end) = if doc.is_backward(&source) {
            (source.focus, source.anchor)
        } else {
            (source.anchor, source.focus)
        };
        let inside = matches!(doc.compare_points(target, source_start), Some(Ordering::Greater))
            && matches!(doc.compare_points(target, source_end), Some(Ordering::Less));
        if inside {
            debug!("Drop target inside the dragged text, ignored");
            return Ok(CommandOutcome::Handled);
        }

        // Edit the later position first so the earlier one stays valid
        let target_first = matches!(
            doc.compare_points(target, source_end),
            Some(Ordering::Greater | Ordering::Equal)
        );
        if target_first {
            doc.set_selection(Some(Selection::collapsed(target)));
            self.suggest_insert(doc, author, text)?;
            let after = doc.selection().copied();
            doc.set_selection(Some(source));
            self.suggest_delete(doc, author, true)?;
            doc.set_selection(after);
        } else {
            // Marking the source splits leaves; plain offsets do not move
            let Some((block, offset)) = doc.locate(target) else {
                return Ok(CommandOutcome::NotHandled);
            };
            doc.set_selection(Some(source));
            self.suggest_delete(doc, author, true)?;
            let target = doc.point_at(block, offset).unwrap_or(target);
            doc.set_selection(Some(Selection::collapsed(target)));
            self.suggest_insert(doc, author, text)?;
        }
        Ok(CommandOutcome::Handled)
    }
}

/// Caret just outside `mark`: before it when moving backward, after it otherwise
fn across(doc: &Document, mark: NodeKey, backward: bool) -> Option<Point> {
    if backward {
        doc.first_text_in(mark).map(|text| Point::new(text, 0))
    } else {
        doc.last_text_in(mark)
            .map(|text| Point::new(text, doc.text_len(text)))
    }
}
