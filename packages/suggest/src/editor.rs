//! Host wiring: a document, the suggestion engine, command dispatch and
//! undo history behind one facade.
//!
//! The engine is registered as a high-priority command handler ahead of the
//! runtime's default handler, so in direct mode (or when the engine declines)
//! edits fall through to plain editing.

use redline_editor::{
    apply_default, CommandOutcome, CommandRegistry, Document, DocumentSnapshot, EditCommand, HistoryTag,
    Priority, Selection, UndoStack,
};
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::crdt::{CollabProvider, SuggestionReplica};
use crate::engine::{SuggestionAnchor, SuggestionEngine};
use crate::errors::SuggestError;
use crate::resolve::ResolveOutcome;
use crate::store::StoreSnapshot;
use crate::suggestion::{Author, ResolveAction};
use crate::threads::{ThreadEvent, ThreadListener};

/// Context handed to command handlers
#[derive(Debug)]
pub struct EditorState {
    pub document: Document,
    pub engine: SuggestionEngine,
    /// Set while dispatching a command built against an outdated document
    stale: bool,
}

pub struct Editor {
    state: EditorState,
    registry: CommandRegistry<EditorState>,
    history: UndoStack<StoreSnapshot>,
    listeners: Vec<Box<dyn ThreadListener>>,
    replica: Option<SuggestionReplica>,
    /// State vector at the last push, so pushes only carry new changes
    pushed: Option<Vec<u8>>,
}

impl Editor {
    pub fn new(document: Document, mut engine: SuggestionEngine) -> Self {
        engine.rebuild_index(&document);
        let history = UndoStack::with_state(engine.config().history_levels);

        let mut registry = CommandRegistry::new();
        registry.register(Priority::High, |state: &mut EditorState, command: &EditCommand| {
            if state.stale {
                warn!(command = command.name(), "Stale command, suggestion tracking skipped");
                return CommandOutcome::NotHandled;
            }
            state.engine.handle_command(&mut state.document, command)
        });
        registry.register(Priority::Low, |state: &mut EditorState, command: &EditCommand| {
            apply_default(&mut state.document, command)
        });

        Self {
            state: EditorState {
                document,
                engine,
                stale: false,
            },
            registry,
            history,
            listeners: Vec::new(),
            replica: None,
            pushed: None,
        }
    }

    /// Editor over plain-text blocks with a wall-clock engine for `client_id`
    pub fn from_blocks<I, S>(blocks: I, config: EngineConfig, client_id: u64) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let engine = SuggestionEngine::for_client(config, client_id);
        Self::new(Document::from_blocks(blocks), engine)
    }

    pub fn document(&self) -> &Document {
        &self.state.document
    }

    pub fn engine(&self) -> &SuggestionEngine {
        &self.state.engine
    }

    pub fn engine_mut(&mut self) -> &mut SuggestionEngine {
        &mut self.state.engine
    }

    pub fn history(&self) -> &UndoStack<StoreSnapshot> {
        &self.history
    }

    /// Register extra command handlers next to the built-in ones
    pub fn registry_mut(&mut self) -> &mut CommandRegistry<EditorState> {
        &mut self.registry
    }

    pub fn plain_text(&self) -> String {
        self.state.document.plain_text()
    }

    pub fn set_author(&mut self, author: Option<Author>) {
        self.state.engine.set_author(author);
    }

    pub fn add_thread_listener(&mut self, listener: impl ThreadListener + 'static) {
        self.listeners.push(Box::new(listener));
    }

    /// Move the selection; ends the current typing session
    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.state.document.set_selection(selection);
        self.state.engine.end_typing_session();
        self.history.break_coalescing();
    }

    /// Select `[start, end)` chars of a block; returns false if out of range
    pub fn select(&mut self, block: usize, start: usize, end: usize) -> bool {
        let doc = &self.state.document;
        let (Some(anchor), Some(focus)) = (doc.point_at(block, start), doc.point_at(block, end)) else {
            return false;
        };
        self.set_selection(Some(Selection::range(anchor, focus)));
        true
    }

    pub fn toggle_suggest_mode(&mut self) -> bool {
        self.state.engine.toggle_suggest_mode()
    }

    pub fn suggestion_at_selection(&self) -> Option<SuggestionAnchor> {
        self.state.engine.suggestion_at_selection(&self.state.document)
    }

    /// Run an edit command as one transaction
    pub fn dispatch(&mut self, command: EditCommand) -> CommandOutcome {
        self.run(&command)
    }

    /// Run a command built against document version `observed`
    pub fn dispatch_observed(&mut self, command: EditCommand, observed: u64) -> CommandOutcome {
        let current = self.state.document.version();
        self.state.stale = observed != current;
        if self.state.stale {
            debug!(observed, current, "Command built against an older document");
        }
        let outcome = self.run(&command);
        self.state.stale = false;
        outcome
    }

    /// Document and suggestion records as one restorable point
    fn checkpoint(&self) -> (DocumentSnapshot, StoreSnapshot) {
        (self.state.document.snapshot(), self.state.engine.store().snapshot())
    }

    fn run(&mut self, command: &EditCommand) -> CommandOutcome {
        let before = self.checkpoint();
        let outcome = self.registry.dispatch(&mut self.state, command);
        if outcome.is_handled() {
            self.state.engine.settle(&mut self.state.document);
        }
        if !matches!(command, EditCommand::InsertText { .. }) {
            self.history.break_coalescing();
        }
        self.finish(before, HistoryTag::Typing, None);
        outcome
    }

    /// Commit, feed the index, record history and flush thread events
    fn finish(&mut self, before: (DocumentSnapshot, StoreSnapshot), tag: HistoryTag, description: Option<String>) {
        let commit = self.state.document.commit();
        self.state.engine.observe(&self.state.document, &commit);
        if !commit.is_empty() {
            let after = self.checkpoint();
            self.history.record_with_state(before, after, tag, description);
        }
        self.flush_events();
    }

    fn flush_events(&mut self) {
        let events = self.state.engine.take_thread_events(&self.state.document);
        for event in &events {
            for listener in &mut self.listeners {
                listener.on_thread_event(event);
            }
        }
    }

    /// Accept or reject as its own undo step
    pub fn resolve(&mut self, suggestion_id: &str, action: ResolveAction) -> ResolveOutcome {
        let before = self.checkpoint();
        let outcome = self
            .state
            .engine
            .resolve(&mut self.state.document, suggestion_id, action);
        let description = match action {
            ResolveAction::Accept => format!("Accept suggestion {suggestion_id}"),
            ResolveAction::Reject => format!("Reject suggestion {suggestion_id}"),
        };
        self.finish(before, HistoryTag::Historic, Some(description));
        outcome
    }

    pub fn accept(&mut self, suggestion_id: &str) -> ResolveOutcome {
        self.resolve(suggestion_id, ResolveAction::Accept)
    }

    pub fn reject(&mut self, suggestion_id: &str) -> ResolveOutcome {
        self.resolve(suggestion_id, ResolveAction::Reject)
    }

    /// Step back one history entry, tree and suggestion records together
    pub fn undo(&mut self) -> bool {
        let undone = match self.history.undo_entry(&mut self.state.document) {
            Some(entry) => {
                self.state.engine.rewind_records(&entry.after_state, &entry.before_state);
                true
            }
            None => false,
        };
        self.after_history(undone);
        undone
    }

    pub fn redo(&mut self) -> bool {
        let redone = match self.history.redo_entry(&mut self.state.document) {
            Some(entry) => {
                self.state.engine.rewind_records(&entry.before_state, &entry.after_state);
                true
            }
            None => false,
        };
        self.after_history(redone);
        redone
    }

    fn after_history(&mut self, changed: bool) {
        if !changed {
            return;
        }
        self.state.document.commit();
        self.state.engine.rebuild_index(&self.state.document);
        self.state.engine.end_typing_session();
        self.flush_events();
    }

    /// Strip annotations of suggestions the store does not know
    pub fn cleanup_orphans(&mut self) -> usize {
        let before = self.checkpoint();
        let removed = self.state.engine.cleanup_orphans(&mut self.state.document);
        if removed > 0 {
            self.finish(before, HistoryTag::Historic, Some("Remove orphaned annotations".to_string()));
        }
        removed
    }

    /// Apply edits that arrived from elsewhere; they are not undoable locally
    pub fn apply_remote<F>(&mut self, edit: F)
    where
        F: FnOnce(&mut Document),
    {
        edit(&mut self.state.document);
        self.state.engine.settle(&mut self.state.document);
        let commit = self.state.document.commit();
        self.state.engine.observe(&self.state.document, &commit);
        self.state.engine.end_typing_session();
        self.history.break_coalescing();
        self.flush_events();
    }

    /// Replicate the suggestion store through `replica`
    pub fn attach_replica(&mut self, replica: SuggestionReplica) -> Result<(), SuggestError> {
        self.state.engine.attach_replica(replica.clone())?;
        self.replica = Some(replica);
        self.pushed = None;
        Ok(())
    }

    pub fn replica(&self) -> Option<&SuggestionReplica> {
        self.replica.as_ref()
    }

    /// Send local record changes since the last push
    pub fn push_suggestions(&mut self, provider: &mut dyn CollabProvider) -> Result<(), SuggestError> {
        let Some(replica) = &self.replica else {
            return Ok(());
        };
        let update = match &self.pushed {
            Some(state_vector) => replica.encode_delta(state_vector)?,
            None => replica.encode_state(),
        };
        provider.broadcast(replica.document_id(), replica.client_id(), update);
        self.pushed = Some(replica.state_vector());
        Ok(())
    }

    /// Apply peers' updates and fold their records into the store
    ///
    /// Returns how many local records changed.
    pub fn pull_suggestions(&mut self, provider: &mut dyn CollabProvider) -> Result<usize, SuggestError> {
        let Some(replica) = &self.replica else {
            return Ok(0);
        };
        let updates = provider.receive(replica.document_id(), replica.client_id());
        for update in &updates {
            replica.apply_update(update)?;
        }
        let changed = self.state.engine.merge_remote_records(replica)?;
        if changed > 0 {
            info!(changed, "Merged remote suggestions");
        }
        Ok(changed)
    }

    /// Thread events of the last transaction, for hosts without listeners
    pub fn drain_events(&mut self) -> Vec<ThreadEvent> {
        self.state.engine.take_thread_events(&self.state.document)
    }
}

impl std::fmt::Debug for Editor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Editor")
            .field("state", &self.state)
            .field("undo_levels", &self.history.undo_levels())
            .field("listeners", &self.listeners.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::threads::ThreadLog;

    fn editor(blocks: &[&str]) -> Editor {
        let config = EngineConfig {
            suggest_mode: true,
            ..EngineConfig::default()
        };
        let mut editor = Editor::from_blocks(blocks.iter().copied(), config, 1);
        editor.set_author(Some(Author::new("ada", "Ada")));
        editor
    }

    fn type_text(editor: &mut Editor, text: &str) {
        for ch in text.chars() {
            editor.dispatch(EditCommand::InsertText { text: ch.to_string() });
        }
    }

    #[test]
    fn test_direct_mode_uses_default_handler() {
        let mut editor = editor(&["ab"]);
        editor.toggle_suggest_mode();
        editor.select(0, 1, 1);
        assert!(editor.dispatch(EditCommand::InsertText { text: "x".into() }).is_handled());
        assert_eq!(editor.plain_text(), "axb");
        assert!(editor.engine().store().is_empty());
    }

    #[test]
    fn test_stale_command_falls_through() {
        let mut editor = editor(&["ab"]);
        editor.select(0, 1, 1);
        let observed = editor.document().version();
        type_text(&mut editor, "x");

        editor.dispatch_observed(EditCommand::InsertText { text: "y".into() }, observed);
        assert_eq!(editor.engine().store().len(), 1);
        assert_eq!(editor.plain_text(), "axyb");
    }

    #[test]
    fn test_listeners_get_events_after_commit() {
        let mut editor = editor(&["ab"]);
        let log = ThreadLog::new();
        editor.add_thread_listener(log.clone());
        editor.select(0, 1, 1);
        type_text(&mut editor, "xy");

        let events = log.take();
        assert!(matches!(&events[0], ThreadEvent::Created { text, .. } if text == "x"));
        assert!(matches!(events.last(), Some(ThreadEvent::TextChanged { text, .. }) if text == "xy"));
    }

    #[test]
    fn test_undo_typing_then_resolution_separately() {
        let mut editor = editor(&["ab"]);
        editor.select(0, 1, 1);
        type_text(&mut editor, "xy");
        let id = editor.engine().store().open()[0].id.clone();
        assert!(editor.reject(&id).is_applied());
        assert_eq!(editor.plain_text(), "ab");

        assert!(editor.undo());
        assert_eq!(editor.plain_text(), "axyb");
        assert_eq!(editor.engine().index().side_text(editor.document(), &id, crate::annotation::AnnotationKind::Insert), "xy");
        assert!(editor.engine().store().is_open(&id));

        assert!(editor.undo());
        assert_eq!(editor.plain_text(), "ab");
        assert!(editor.engine().store().is_empty());
        assert!(!editor.undo());
    }
}
