//! Two peers sharing suggestion records through replicas

use anyhow::Result;
use chrono::{TimeZone, Utc};
use redline_suggest::{
    markup, Author, EditCommand, Editor, EngineConfig, IdGenerator, LoopbackProvider, ManualClock, ResolveOutcome,
    SuggestionEngine, SuggestionReplica, SuggestionState, SuggestionStore,
};

const DOC: &str = "shared-doc";

fn config() -> EngineConfig {
    EngineConfig {
        suggest_mode: true,
        document_id: DOC.to_string(),
        ..EngineConfig::default()
    }
}

fn peer(document: redline_suggest::Document, client_id: u64, author: &str, clock: &ManualClock) -> Result<Editor> {
    let store = SuggestionStore::with_clock(IdGenerator::new(DOC, client_id), Box::new(clock.clone()));
    let mut editor = Editor::new(document, SuggestionEngine::new(config(), store));
    editor.set_author(Some(Author::new(author, author)));
    editor.attach_replica(SuggestionReplica::new(DOC, client_id))?;
    Ok(editor)
}

fn sync(a: &mut Editor, b: &mut Editor, hub: &mut LoopbackProvider) -> Result<()> {
    a.push_suggestions(hub)?;
    b.push_suggestions(hub)?;
    a.pull_suggestions(hub)?;
    b.pull_suggestions(hub)?;
    Ok(())
}

fn type_text(editor: &mut Editor, text: &str) {
    for ch in text.chars() {
        editor.dispatch(EditCommand::InsertText { text: ch.to_string() });
    }
}

#[test]
fn test_records_reach_the_other_peer() -> Result<()> {
    let clock = ManualClock::new(Utc::now());
    let mut hub = LoopbackProvider::new();
    let mut ada = peer(redline_suggest::Document::from_blocks(["Hello"]), 1, "ada", &clock)?;
    ada.select(0, 5, 5);
    type_text(&mut ada, "!");
    let id = ada.engine().store().open()[0].id.clone();

    let mut bob = peer(ada.document().clone(), 2, "bob", &clock)?;
    ada.push_suggestions(&mut hub)?;
    assert_eq!(bob.pull_suggestions(&mut hub)?, 1);

    let record = bob.engine().store().get(&id).expect("replicated record");
    assert_eq!(record.author_id, "ada");
    assert_eq!(record.state, SuggestionState::Open);
    Ok(())
}

#[test]
fn test_peers_mint_distinct_ids() -> Result<()> {
    let clock = ManualClock::new(Utc::now());
    let mut hub = LoopbackProvider::new();
    let mut ada = peer(redline_suggest::Document::from_blocks(["one", "two"]), 1, "ada", &clock)?;
    let mut bob = peer(redline_suggest::Document::from_blocks(["one", "two"]), 2, "bob", &clock)?;

    ada.select(0, 3, 3);
    type_text(&mut ada, "A");
    bob.select(1, 3, 3);
    type_text(&mut bob, "B");
    sync(&mut ada, &mut bob, &mut hub)?;

    assert_eq!(ada.engine().store().len(), 2);
    assert_eq!(bob.engine().store().len(), 2);
    let ids: Vec<String> = ada.engine().store().all().iter().map(|s| s.id.clone()).collect();
    assert_ne!(ids[0], ids[1]);
    Ok(())
}

#[test]
fn test_remote_resolution_wins_over_local_attempt() -> Result<()> {
    let clock = ManualClock::new(Utc::now());
    let mut hub = LoopbackProvider::new();
    let mut ada = peer(redline_suggest::Document::from_blocks(["a foo b"]), 1, "ada", &clock)?;
    ada.select(0, 2, 5);
    type_text(&mut ada, "bar");
    let id = ada.engine().store().open()[0].id.clone();

    let mut bob = peer(ada.document().clone(), 2, "bob", &clock)?;
    sync(&mut ada, &mut bob, &mut hub)?;

    clock.advance_ms(1_000);
    assert!(ada.accept(&id).is_applied());
    sync(&mut ada, &mut bob, &mut hub)?;

    // Bob's copy of the tree still shows the suggestion, but the record is closed
    let before = markup(bob.document());
    assert_eq!(bob.reject(&id), ResolveOutcome::NotOpen);
    assert_eq!(markup(bob.document()), before);
    assert_eq!(bob.engine().store().get(&id).unwrap().state, SuggestionState::Accepted);
    Ok(())
}

#[test]
fn test_concurrent_resolutions_converge() -> Result<()> {
    let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    let mut hub = LoopbackProvider::new();
    let mut ada = peer(redline_suggest::Document::from_blocks(["abc"]), 1, "ada", &clock)?;
    ada.select(0, 3, 3);
    type_text(&mut ada, "d");
    let id = ada.engine().store().open()[0].id.clone();

    let mut bob = peer(ada.document().clone(), 2, "bob", &clock)?;
    sync(&mut ada, &mut bob, &mut hub)?;

    // Same instant on both sides: the tie goes to acceptance
    assert!(ada.accept(&id).is_applied());
    assert!(bob.reject(&id).is_applied());
    sync(&mut ada, &mut bob, &mut hub)?;
    sync(&mut ada, &mut bob, &mut hub)?;

    assert_eq!(ada.engine().store().get(&id).unwrap().state, SuggestionState::Accepted);
    assert_eq!(bob.engine().store().get(&id).unwrap().state, SuggestionState::Accepted);
    Ok(())
}

#[test]
fn test_unknown_annotations_are_inert_and_cleaned_up() -> Result<()> {
    let clock = ManualClock::new(Utc::now());
    let mut ada = peer(redline_suggest::Document::from_blocks(["Hello"]), 1, "ada", &clock)?;
    ada.select(0, 5, 5);
    type_text(&mut ada, "!!");

    // Bob got the tree but never the records
    let mut bob = peer(ada.document().clone(), 2, "bob", &clock)?;
    assert!(bob.suggestion_at_selection().is_none());
    bob.select(0, 5, 5);
    type_text(&mut bob, "?");
    assert_eq!(bob.engine().store().len(), 1);

    assert_eq!(bob.cleanup_orphans(), 1);
    assert_eq!(markup(bob.document()), "Hello{+?+}!!");
    Ok(())
}
