//! # Command Dispatch
//!
//! Keystroke- and clipboard-level operations are expressed as [`EditCommand`]s
//! and routed through a [`CommandRegistry`]. Handlers run from the highest
//! [`Priority`] down; the first one that reports [`CommandOutcome::Handled`]
//! claims the command. Handlers of equal priority run in registration order.
//!
//! [`apply_default`] is the runtime's own behavior: plain, untracked edits.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::{Document, NodeKey, NodeType};
use crate::mutations::MutationError;
use crate::selection::{Point, Selection};

/// Atomic editing operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum EditCommand {
    /// Typed text replacing the selection
    InsertText { text: String },

    /// Backspace (`backward: true`) or Delete
    DeleteCharacter { backward: bool },

    /// Clipboard text replacing the selection
    Paste { text: String },

    /// Dragged text dropped at `target`; `source` is removed when the drag was a move
    Drop {
        text: String,
        target: Point,
        source: Option<Selection>,
    },
}

impl EditCommand {
    pub fn name(&self) -> &'static str {
        match self {
            EditCommand::InsertText { .. } => "insert-text",
            EditCommand::DeleteCharacter { backward: true } => "delete-backward",
            EditCommand::DeleteCharacter { backward: false } => "delete-forward",
            EditCommand::Paste { .. } => "paste",
            EditCommand::Drop { .. } => "drop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandOutcome {
    Handled,
    NotHandled,
}

impl CommandOutcome {
    pub fn is_handled(self) -> bool {
        matches!(self, CommandOutcome::Handled)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Priority {
    Low,
    Normal,
    High,
    Critical,
}

/// Registration handle, used to unregister
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

pub type CommandHandler<C> = Box<dyn FnMut(&mut C, &EditCommand) -> CommandOutcome>;

struct Registered<C> {
    id: HandlerId,
    priority: Priority,
    handler: CommandHandler<C>,
}

/// Priority-ordered command handlers over a context `C`
pub struct CommandRegistry<C> {
    handlers: Vec<Registered<C>>,
    next_id: u64,
}

impl<C> CommandRegistry<C> {
    pub fn new() -> Self {
        Self {
            handlers: Vec::new(),
            next_id: 0,
        }
    }

    /// Register a handler
    pub fn register<F>(&mut self, priority: Priority, handler: F) -> HandlerId
    where
        F: FnMut(&mut C, &EditCommand) -> CommandOutcome + 'static,
    {
        let id = HandlerId(self.next_id);
        self.next_id += 1;
        self.handlers.push(Registered {
            id,
            priority,
            handler: Box::new(handler),
        });
        // Stable sort keeps registration order within a priority
        self.handlers.sort_by(|a, b| match b.priority.cmp(&a.priority) {
            Ordering::Equal => a.id.0.cmp(&b.id.0),
            other => other,
        });
        id
    }

    /// Remove a handler; returns whether it was registered
    pub fn unregister(&mut self, id: HandlerId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|h| h.id != id);
        before != self.handlers.len()
    }

    /// Offer `command` to each handler until one claims it
    pub fn dispatch(&mut self, context: &mut C, command: &EditCommand) -> CommandOutcome {
        for registered in &mut self.handlers {
            if (registered.handler)(context, command).is_handled() {
                debug!(command = command.name(), priority = ?registered.priority, "Command handled");
                return CommandOutcome::Handled;
            }
        }
        CommandOutcome::NotHandled
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl<C> Default for CommandRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// The runtime's default handling: edit text directly, no bookkeeping
pub fn apply_default(doc: &mut Document, command: &EditCommand) -> CommandOutcome {
    let result = match command {
        EditCommand::InsertText { text } | EditCommand::Paste { text } => insert_plain(doc, text),
        EditCommand::DeleteCharacter { backward } => delete_plain(doc, *backward),
        EditCommand::Drop {
            text,
            target,
            source,
        } => drop_plain(doc, text, *target, *source),
    };

    match result {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!(command = command.name(), error = %e, "Default edit failed");
            CommandOutcome::NotHandled
        }
    }
}

/// Resolve a point to a text position, creating an empty text leaf when the
/// container around the point holds none
pub fn resolve_caret(doc: &mut Document, point: Point) -> Result<Option<Point>, MutationError> {
    let Some(node) = doc.node(point.key) else {
        return Ok(None);
    };
    if node.node_type() == NodeType::Text {
        let len = doc.text_len(point.key);
        return Ok(Some(Point::new(point.key, point.offset.min(len))));
    }

    let children = doc.children(point.key).to_vec();
    let index = point.offset.min(children.len());
    if let Some(text) = index
        .checked_sub(1)
        .and_then(|i| doc.last_text_in(children[i]))
    {
        return Ok(Some(Point::new(text, doc.text_len(text))));
    }
    if let Some(text) = children.get(index).and_then(|c| doc.first_text_in(*c)) {
        return Ok(Some(Point::new(text, 0)));
    }

    // The root holds blocks, not inline content
    let container = if point.key == doc.root() {
        match children.get(index).or(children.last()) {
            Some(block) => *block,
            None => {
                let block = doc.create_element("p");
                doc.append_child(point.key, block)?;
                block
            }
        }
    } else {
        point.key
    };
    let leaf = doc.create_text("");
    let at = if container == point.key { index } else { 0 };
    doc.insert_child(container, at, leaf)?;
    Ok(Some(Point::new(leaf, 0)))
}

/// Order a selection into (start, end) text points
fn ordered_range(doc: &mut Document, selection: Selection) -> Result<Option<(Point, Point)>, MutationError> {
    let (first, second) = if doc.is_backward(&selection) {
        (selection.focus, selection.anchor)
    } else {
        (selection.anchor, selection.focus)
    };
    let start = resolve_caret(doc, first)?;
    let end = resolve_caret(doc, second)?;
    Ok(start.zip(end))
}

fn insert_plain(doc: &mut Document, text: &str) -> Result<CommandOutcome, MutationError> {
    let Some(selection) = doc.selection().copied() else {
        return Ok(CommandOutcome::NotHandled);
    };
    let caret = if selection.is_collapsed() {
        resolve_caret(doc, selection.anchor)?
    } else {
        match ordered_range(doc, selection)? {
            Some((start, end)) => Some(delete_range_plain(doc, start, end)?),
            None => None,
        }
    };
    let Some(caret) = caret else {
        return Ok(CommandOutcome::NotHandled);
    };

    doc.insert_text(caret.key, caret.offset, text)?;
    let after = Point::new(caret.key, caret.offset + text.chars().count());
    doc.set_selection(Some(Selection::collapsed(after)));
    Ok(CommandOutcome::Handled)
}

fn delete_plain(doc: &mut Document, backward: bool) -> Result<CommandOutcome, MutationError> {
    let Some(selection) = doc.selection().copied() else {
        return Ok(CommandOutcome::NotHandled);
    };
    if !selection.is_collapsed() {
        let Some((start, end)) = ordered_range(doc, selection)? else {
            return Ok(CommandOutcome::NotHandled);
        };
        let caret = delete_range_plain(doc, start, end)?;
        doc.set_selection(Some(Selection::collapsed(caret)));
        return Ok(CommandOutcome::Handled);
    }

    let Some(caret) = resolve_caret(doc, selection.anchor)? else {
        return Ok(CommandOutcome::NotHandled);
    };

    let target = if backward {
        char_before(doc, caret)
    } else {
        char_after(doc, caret)
    };
    match target {
        Some((key, offset)) => {
            doc.delete_text(key, offset, offset + 1)?;
            let caret = if backward { Point::new(key, offset) } else { caret };
            doc.set_selection(Some(Selection::collapsed(caret)));
        }
        None => {
            let caret = merge_blocks(doc, caret, backward)?;
            doc.set_selection(Some(Selection::collapsed(caret)));
        }
    }
    Ok(CommandOutcome::Handled)
}

fn drop_plain(
    doc: &mut Document,
    text: &str,
    target: Point,
    source: Option<Selection>,
) -> Result<CommandOutcome, MutationError> {
    let Some(source) = source.filter(|s| !s.is_collapsed()) else {
        doc.set_selection(Some(Selection::collapsed(target)));
        return insert_plain(doc, text);
    };

    // Edit the later position first so the earlier one stays valid
    let source_end = if doc.is_backward(&source) {
        source.anchor
    } else {
        source.focus
    };
    let target_first = matches!(
        doc.compare_points(target, source_end),
        Some(Ordering::Greater | Ordering::Equal)
    );

    if target_first {
        doc.set_selection(Some(Selection::collapsed(target)));
        insert_plain(doc, text)?;
        let after = doc.selection().copied();
        doc.set_selection(Some(source));
        delete_plain(doc, true)?;
        doc.set_selection(after);
    } else {
        doc.set_selection(Some(source));
        delete_plain(doc, true)?;
        doc.set_selection(Some(Selection::collapsed(target)));
        insert_plain(doc, text)?;
    }
    Ok(CommandOutcome::Handled)
}

/// The (text, offset) of the char right before `caret` within its block
pub fn char_before(doc: &Document, caret: Point) -> Option<(NodeKey, usize)> {
    if caret.offset > 0 {
        return Some((caret.key, caret.offset - 1));
    }
    let block = doc.block_of(caret.key)?;
    let mut current = caret.key;
    while let Some(prev) = doc.previous_text(current) {
        if doc.block_of(prev) != Some(block) {
            return None;
        }
        let len = doc.text_len(prev);
        if len > 0 {
            return Some((prev, len - 1));
        }
        current = prev;
    }
    None
}

/// The (text, offset) of the char right after `caret` within its block
pub fn char_after(doc: &Document, caret: Point) -> Option<(NodeKey, usize)> {
    if caret.offset < doc.text_len(caret.key) {
        return Some((caret.key, caret.offset));
    }
    let block = doc.block_of(caret.key)?;
    let mut current = caret.key;
    while let Some(next) = doc.next_text(current) {
        if doc.block_of(next) != Some(block) {
            return None;
        }
        if doc.text_len(next) > 0 {
            return Some((next, 0));
        }
        current = next;
    }
    None
}

/// Join the caret's block with its neighbor; returns the new caret
fn merge_blocks(doc: &mut Document, caret: Point, backward: bool) -> Result<Point, MutationError> {
    let Some(block) = doc.block_of(caret.key) else {
        return Ok(caret);
    };
    let (keep, absorb) = if backward {
        match doc.previous_sibling(block) {
            Some(prev) => (prev, block),
            None => return Ok(caret),
        }
    } else {
        match doc.next_sibling(block) {
            Some(next) => (block, next),
            None => return Ok(caret),
        }
    };

    let joint = match doc.last_text_in(keep) {
        Some(text) => Point::new(text, doc.text_len(text)),
        None => caret,
    };
    doc.move_children(absorb, keep)?;
    doc.remove(absorb)?;
    Ok(joint)
}

/// Delete everything between two text points; returns the collapsed caret
pub fn delete_range_plain(doc: &mut Document, start: Point, end: Point) -> Result<Point, MutationError> {
    if start.key == end.key {
        let (from, to) = (start.offset.min(end.offset), start.offset.max(end.offset));
        doc.delete_text(start.key, from, to)?;
        return Ok(Point::new(start.key, from));
    }

    let texts = doc.text_nodes();
    let from = texts.iter().position(|k| *k == start.key);
    let to = texts.iter().position(|k| *k == end.key);
    let (Some(from), Some(to)) = (from, to) else {
        return Ok(start);
    };

    for key in &texts[from + 1..to] {
        doc.remove(*key)?;
    }
    let start_len = doc.text_len(start.key);
    doc.delete_text(start.key, start.offset, start_len)?;
    doc.delete_text(end.key, 0, end.offset)?;

    let start_block = doc.block_of(start.key);
    let end_block = doc.block_of(end.key);
    if let (Some(first), Some(last)) = (start_block, end_block) {
        if first != last {
            let blocks = doc.blocks().to_vec();
            let i = blocks.iter().position(|b| *b == first).unwrap_or(0);
            let j = blocks.iter().position(|b| *b == last).unwrap_or(i);
            for block in blocks.iter().take(j).skip(i + 1) {
                doc.remove(*block)?;
            }
            doc.move_children(last, first)?;
            doc.remove(last)?;
        }
    }
    Ok(Point::new(start.key, start.offset))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn caret(doc: &mut Document, block: usize, offset: usize) {
        let point = doc.point_at(block, offset).unwrap();
        doc.set_selection(Some(Selection::collapsed(point)));
    }

    #[test]
    fn test_registry_dispatches_by_priority() {
        let mut registry: CommandRegistry<Vec<&'static str>> = CommandRegistry::new();
        registry.register(Priority::Low, |log, _| {
            log.push("low");
            CommandOutcome::Handled
        });
        registry.register(Priority::High, |log, _| {
            log.push("high");
            CommandOutcome::NotHandled
        });

        let mut log = Vec::new();
        let outcome = registry.dispatch(&mut log, &EditCommand::InsertText { text: "x".into() });

        assert_eq!(outcome, CommandOutcome::Handled);
        assert_eq!(log, vec!["high", "low"]);
    }

    #[test]
    fn test_registry_unregister() {
        let mut registry: CommandRegistry<u32> = CommandRegistry::new();
        let id = registry.register(Priority::Normal, |count, _| {
            *count += 1;
            CommandOutcome::Handled
        });
        assert!(registry.unregister(id));
        assert!(!registry.unregister(id));

        let mut count = 0;
        let outcome = registry.dispatch(&mut count, &EditCommand::DeleteCharacter { backward: true });
        assert_eq!(outcome, CommandOutcome::NotHandled);
        assert_eq!(count, 0);
    }

    #[test]
    fn test_default_insert_and_backspace() {
        let mut doc = Document::from_blocks(["Hello"]);
        caret(&mut doc, 0, 5);

        apply_default(&mut doc, &EditCommand::InsertText { text: "!".into() });
        assert_eq!(doc.plain_text(), "Hello!");

        apply_default(&mut doc, &EditCommand::DeleteCharacter { backward: true });
        apply_default(&mut doc, &EditCommand::DeleteCharacter { backward: true });
        assert_eq!(doc.plain_text(), "Hell");
    }

    #[test]
    fn test_default_insert_into_empty_block_creates_text() {
        let mut doc = Document::from_blocks([""]);
        caret(&mut doc, 0, 0);

        let outcome = apply_default(&mut doc, &EditCommand::InsertText { text: "hi".into() });

        assert_eq!(outcome, CommandOutcome::Handled);
        assert_eq!(doc.plain_text(), "hi");
    }

    #[test]
    fn test_default_backspace_at_block_start_merges_blocks() {
        let mut doc = Document::from_blocks(["ab", "cd"]);
        caret(&mut doc, 1, 0);

        apply_default(&mut doc, &EditCommand::DeleteCharacter { backward: true });

        assert_eq!(doc.plain_text(), "abcd");
        assert_eq!(doc.blocks().len(), 1);
    }

    #[test]
    fn test_default_range_replace_across_blocks() {
        let mut doc = Document::from_blocks(["Hello", "middle", "World"]);
        let start = doc.point_at(0, 2).unwrap();
        let end = doc.point_at(2, 3).unwrap();
        doc.set_selection(Some(Selection::range(start, end)));

        apply_default(&mut doc, &EditCommand::Paste { text: "-".into() });

        assert_eq!(doc.plain_text(), "He-ld");
    }

    #[test]
    fn test_default_drop_moves_text() {
        let mut doc = Document::from_blocks(["abcdef"]);
        let source = Selection::range(doc.point_at(0, 0).unwrap(), doc.point_at(0, 2).unwrap());
        let target = doc.point_at(0, 6).unwrap();

        apply_default(
            &mut doc,
            &EditCommand::Drop {
                text: "ab".into(),
                target,
                source: Some(source),
            },
        );

        assert_eq!(doc.plain_text(), "cdefab");
    }
}
