//! Integration tests for the editor runtime

use std::collections::BTreeSet;

use anyhow::Result;
use redline_editor::visitor::{walk_children, walk_document, Visitor};
use redline_editor::{
    apply_default, CommandOutcome, CommandRegistry, Document, DocumentSnapshot, EditCommand, HistoryTag,
    MutationKind, NodeKey, NodeType, Priority, Selection, UndoStack,
};

fn caret(doc: &mut Document, block: usize, offset: usize) {
    let point = doc.point_at(block, offset).expect("point in range");
    doc.set_selection(Some(Selection::collapsed(point)));
}

#[test]
fn test_document_lifecycle() -> Result<()> {
    let mut doc = Document::from_blocks(["Hello", "world"]);
    assert_eq!(doc.version(), 0);
    assert!(!doc.has_pending());

    let text = doc.text_nodes()[0];
    doc.insert_text(text, 5, ",")?;
    let commit = doc.commit();

    assert_eq!(doc.version(), 1);
    assert_eq!(commit.version, 1);
    assert_eq!(doc.plain_text(), "Hello,\nworld");
    assert!(commit
        .mutations_of(NodeType::Text)
        .any(|m| m.key == text && m.kind == MutationKind::Updated));

    // Empty transactions do not bump the version
    doc.commit();
    assert_eq!(doc.version(), 1);
    Ok(())
}

#[test]
fn test_mark_notifications_feed() -> Result<()> {
    let mut doc = Document::from_blocks(["abc"]);
    let text = doc.text_nodes()[0];
    let mark = doc.wrap(text, text, ["suggestion:s-1:insert"])?;
    doc.add_mark_id(mark, "suggestion:s-1")?;
    doc.unwrap(mark)?;
    let commit = doc.commit();

    let kinds: Vec<MutationKind> = commit.mutations_of(NodeType::Mark).map(|m| m.kind).collect();
    assert_eq!(kinds.first(), Some(&MutationKind::Created));
    assert_eq!(kinds.last(), Some(&MutationKind::Destroyed));
    assert!(doc.marks().is_empty());
    assert_eq!(doc.plain_text(), "abc");
    Ok(())
}

#[test]
fn test_registry_priority_order() {
    let mut registry: CommandRegistry<Vec<&'static str>> = CommandRegistry::new();
    registry.register(Priority::Low, |log, _| {
        log.push("low");
        CommandOutcome::Handled
    });
    let high = registry.register(Priority::High, |log, _| {
        log.push("high");
        CommandOutcome::NotHandled
    });

    let mut log = Vec::new();
    let command = EditCommand::InsertText { text: "x".into() };
    assert!(registry.dispatch(&mut log, &command).is_handled());
    assert_eq!(log, vec!["high", "low"]);

    assert!(registry.unregister(high));
    assert!(!registry.unregister(high));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_default_editing_round() {
    let mut doc = Document::from_blocks(["ab", "cd"]);
    caret(&mut doc, 0, 2);
    apply_default(&mut doc, &EditCommand::InsertText { text: "!".into() });
    assert_eq!(doc.plain_text(), "ab!\ncd");

    caret(&mut doc, 1, 0);
    apply_default(&mut doc, &EditCommand::DeleteCharacter { backward: true });
    assert_eq!(doc.plain_text(), "ab!cd");
    assert_eq!(doc.blocks().len(), 1);
    doc.commit();
}

#[test]
fn test_undo_redo_sequence() {
    let mut doc = Document::from_blocks(["v0"]);
    let mut stack = UndoStack::new();
    let text = doc.text_nodes()[0];

    for i in 1..=5 {
        let before = doc.snapshot();
        doc.set_text(text, format!("v{i}")).unwrap();
        doc.commit();
        stack.record(before, doc.snapshot(), HistoryTag::Historic);
    }
    assert_eq!(stack.undo_levels(), 5);

    for _ in 0..5 {
        assert!(stack.undo(&mut doc));
        doc.commit();
    }
    assert_eq!(doc.plain_text(), "v0");
    assert_eq!(stack.redo_levels(), 5);

    for _ in 0..3 {
        assert!(stack.redo(&mut doc));
        doc.commit();
    }
    assert_eq!(doc.plain_text(), "v3");

    let before = doc.snapshot();
    doc.set_text(text, "branch").unwrap();
    doc.commit();
    stack.record(before, doc.snapshot(), HistoryTag::Typing);
    assert_eq!(stack.redo_levels(), 0);
}

#[test]
fn test_snapshot_json_roundtrip() -> Result<()> {
    let mut doc = Document::from_blocks(["abc"]);
    let text = doc.text_nodes()[0];
    doc.wrap(text, text, ["suggestion:s-1:delete"])?;
    doc.commit();

    let json = doc.snapshot().to_json()?;
    let restored = Document::from_snapshot(DocumentSnapshot::from_json(&json)?)?;
    assert_eq!(restored.snapshot(), doc.snapshot());
    assert_eq!(restored.marks().len(), 1);
    Ok(())
}

#[test]
fn test_visitor_collects_mark_ids() -> Result<()> {
    #[derive(Default)]
    struct Ids(BTreeSet<String>, Vec<NodeKey>);

    impl Visitor for Ids {
        fn visit_mark(&mut self, doc: &Document, key: NodeKey, ids: &BTreeSet<String>) {
            self.0.extend(ids.iter().cloned());
            self.1.push(key);
            walk_children(self, doc, key);
        }
    }

    let mut doc = Document::from_blocks(["ab", "cd"]);
    let texts = doc.text_nodes();
    doc.wrap(texts[0], texts[0], ["a"])?;
    doc.wrap(texts[1], texts[1], ["b"])?;

    let mut ids = Ids::default();
    walk_document(&mut ids, &doc);
    assert_eq!(ids.0.into_iter().collect::<Vec<_>>(), vec!["a", "b"]);
    assert_eq!(ids.1, doc.marks());
    Ok(())
}
