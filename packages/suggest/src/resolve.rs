//! Accepting and rejecting suggestions.

use std::collections::BTreeSet;

use redline_editor::Document;
use tracing::{debug, info, warn};

use crate::annotation::{referenced_suggestions, AnnotationId};
use crate::engine::SuggestionEngine;
use crate::errors::SuggestError;
use crate::marks::{normalize_children, strip_suggestion};
use crate::suggestion::{ResolveAction, SideEffect, SuggestionState};

/// Result of a resolve request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveOutcome {
    Applied(SuggestionState),
    /// Already accepted or rejected; nothing changed
    NotOpen,
    Unknown,
    /// The current access level or author may not perform the action
    Forbidden,
    /// The document could not be updated; it was left as it was
    Failed,
}

impl ResolveOutcome {
    pub fn is_applied(self) -> bool {
        matches!(self, ResolveOutcome::Applied(_))
    }
}

impl SuggestionEngine {
    /// Accept or reject a suggestion, rewriting every mark that carries it
    pub fn resolve(&mut self, doc: &mut Document, suggestion_id: &str, action: ResolveAction) -> ResolveOutcome {
        let Some(record) = self.store.get(suggestion_id) else {
            warn!(suggestion_id, ?action, "Resolve requested for unknown suggestion");
            return ResolveOutcome::Unknown;
        };
        if !record.is_open() {
            debug!(suggestion_id, state = ?record.state, "Suggestion already resolved");
            return ResolveOutcome::NotOpen;
        }
        let allowed = match action {
            ResolveAction::Accept => self.access.can_accept(),
            ResolveAction::Reject => self.access.can_reject(record, self.author.as_ref()),
        };
        if !allowed {
            warn!(suggestion_id, ?action, access = ?self.access, "Resolve not permitted");
            return ResolveOutcome::Forbidden;
        }

        let before = doc.snapshot();
        let records = self.store.snapshot();
        let queued = self.deferred.len();
        match self.apply_resolution(doc, suggestion_id, action) {
            Ok(state) => {
                info!(suggestion_id, ?state, "Suggestion resolved");
                ResolveOutcome::Applied(state)
            }
            Err(e) => {
                warn!(suggestion_id, error = %e, "Resolution failed, document restored");
                doc.restore(&before);
                self.rollback_records(&records);
                self.deferred.truncate(queued);
                self.index.rebuild(doc);
                ResolveOutcome::Failed
            }
        }
    }

    pub fn accept(&mut self, doc: &mut Document, suggestion_id: &str) -> ResolveOutcome {
        self.resolve(doc, suggestion_id, ResolveAction::Accept)
    }

    pub fn reject(&mut self, doc: &mut Document, suggestion_id: &str) -> ResolveOutcome {
        self.resolve(doc, suggestion_id, ResolveAction::Reject)
    }

    fn apply_resolution(
        &mut self,
        doc: &mut Document,
        suggestion_id: &str,
        action: ResolveAction,
    ) -> Result<SuggestionState, SuggestError> {
        self.sync_index(doc);
        let plan = match self.store.get(suggestion_id) {
            Some(record) => record.plan(action),
            None => return Ok(action.target_state()),
        };

        let mut parents = Vec::new();
        let mut bystanders = BTreeSet::new();
        for mark in self.index.ordered_nodes(doc, suggestion_id) {
            let Some(ids) = doc.mark_ids(mark) else {
                continue;
            };
            let remove = ids.iter().any(|raw| match AnnotationId::parse(raw) {
                AnnotationId::Suggestion {
                    suggestion_id: sid,
                    kind,
                } if sid == suggestion_id => plan
                    .steps
                    .iter()
                    .any(|(side, effect)| *side == kind && *effect == SideEffect::Remove),
                _ => false,
            });
            parents.extend(doc.parent(mark));

            if remove {
                bystanders.extend(referenced_suggestions(ids));
                doc.remove(mark)?;
            } else {
                strip_suggestion(doc, mark, suggestion_id)?;
            }
        }
        for parent in parents {
            if doc.contains(parent) {
                normalize_children(doc, parent)?;
            }
        }

        let state = self.store.transition(suggestion_id, action)?;
        self.deferred.resolved(suggestion_id, state);
        if self
            .last_insertion
            .as_ref()
            .is_some_and(|m| m.suggestion_id == suggestion_id)
        {
            self.last_insertion = None;
        }

        // Suggestions whose only text went away with a removed mark
        self.sync_index(doc);
        bystanders.remove(suggestion_id);
        for other in bystanders {
            if !self.index.contains(&other) && self.store.discard(&other).is_some() {
                debug!(suggestion_id = %other, "Suggestion lost all of its text");
                self.deferred.discarded(&other);
            }
        }
        Ok(state)
    }
}
