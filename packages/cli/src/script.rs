//! Edit scripts: a starting document plus a list of editing steps.
//!
//! ```json
//! {
//!   "blocks": ["The quick brown fox"],
//!   "config": { "suggestMode": true },
//!   "steps": [
//!     { "op": "author", "id": "ada", "name": "Ada" },
//!     { "op": "select", "block": 0, "start": 4, "end": 9 },
//!     { "op": "type", "text": "slow " },
//!     { "op": "accept", "suggestion": "last" }
//!   ]
//! }
//! ```
//!
//! Suggestion ids are generated while the script runs, so `accept` and
//! `reject` name their target as `last` (newest record), `#n` (the n-th
//! record, oldest first, 1-based) or a literal id.

use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use redline_suggest::{
    AccessLevel, Author, CommandOutcome, Document, EditCommand, Editor, EngineConfig, IdGenerator, ManualClock,
    ResolveOutcome, Selection, SuggestionEngine, SuggestionStore, ThreadEvent, ThreadLog,
};
use serde::Deserialize;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Script {
    pub blocks: Vec<String>,

    /// Overrides the configuration found next to the script
    #[serde(default)]
    pub config: Option<EngineConfig>,

    #[serde(default = "default_client_id")]
    pub client_id: u64,

    /// Clock start for record timestamps; now if absent
    #[serde(default)]
    pub start: Option<DateTime<Utc>>,

    #[serde(default)]
    pub steps: Vec<Step>,
}

fn default_client_id() -> u64 {
    1
}

fn one() -> usize {
    1
}

/// A char range within one block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
pub struct Range {
    pub block: usize,
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Step {
    Author {
        id: String,
        #[serde(default)]
        name: Option<String>,
    },
    SignOut,
    Access {
        level: AccessLevel,
    },
    SuggestMode {
        on: bool,
    },
    /// Caret when `end` is absent
    Select {
        block: usize,
        start: usize,
        #[serde(default)]
        end: Option<usize>,
    },
    /// Typed one char per command, like a keyboard would
    Type {
        text: String,
    },
    Backspace {
        #[serde(default = "one")]
        count: usize,
    },
    Delete {
        #[serde(default = "one")]
        count: usize,
    },
    Paste {
        text: String,
    },
    Drop {
        text: String,
        block: usize,
        offset: usize,
        #[serde(default)]
        from: Option<Range>,
    },
    Accept {
        suggestion: String,
    },
    Reject {
        suggestion: String,
    },
    Undo,
    Redo,
    /// Let the clock run, closing the typing merge window
    Wait {
        ms: i64,
    },
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Author { .. } => "author",
            Step::SignOut => "signOut",
            Step::Access { .. } => "access",
            Step::SuggestMode { .. } => "suggestMode",
            Step::Select { .. } => "select",
            Step::Type { .. } => "type",
            Step::Backspace { .. } => "backspace",
            Step::Delete { .. } => "delete",
            Step::Paste { .. } => "paste",
            Step::Drop { .. } => "drop",
            Step::Accept { .. } => "accept",
            Step::Reject { .. } => "reject",
            Step::Undo => "undo",
            Step::Redo => "redo",
            Step::Wait { .. } => "wait",
        }
    }
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("Step {step} ({op}): block {block} has no range {start}..{end}")]
    OutOfRange {
        step: usize,
        op: &'static str,
        block: usize,
        start: usize,
        end: usize,
    },

    #[error("Step {step} ({op}): no suggestion matches '{target}'")]
    UnknownTarget {
        step: usize,
        op: &'static str,
        target: String,
    },
}

impl Script {
    pub fn from_json(source: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(source)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
        Self::from_json(&source).with_context(|| format!("Failed to parse {}", path.display()))
    }
}

/// What a step did
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepResult {
    /// Edit commands dispatched, and how many the suggestion engine tracked
    Edited { commands: usize, tracked: usize },
    Resolved { suggestion_id: String, outcome: ResolveOutcome },
    /// Undo or redo; false when there was nothing to do
    History(bool),
    Settled,
}

/// An editor driven by a script, with a hand-driven clock
pub struct Session {
    editor: Editor,
    clock: ManualClock,
    log: ThreadLog,
    steps_run: usize,
}

impl Session {
    pub fn new(script: &Script, config: EngineConfig) -> Self {
        let config = script.config.clone().unwrap_or(config);
        let clock = ManualClock::new(script.start.unwrap_or_else(Utc::now));
        let store = SuggestionStore::with_clock(
            IdGenerator::new(&config.document_id, script.client_id),
            Box::new(clock.clone()),
        );
        let engine = SuggestionEngine::new(config, store);
        let mut editor = Editor::new(Document::from_blocks(script.blocks.iter().cloned()), engine);

        let log = ThreadLog::new();
        editor.add_thread_listener(log.clone());

        Self {
            editor,
            clock,
            log,
            steps_run: 0,
        }
    }

    pub fn editor(&self) -> &Editor {
        &self.editor
    }

    pub fn events(&self) -> Vec<ThreadEvent> {
        self.log.events()
    }

    pub fn run(&mut self, steps: &[Step]) -> Result<Vec<StepResult>, ScriptError> {
        steps.iter().map(|step| self.step(step)).collect()
    }

    /// Run one step; each step moves the clock forward by a millisecond
    pub fn step(&mut self, step: &Step) -> Result<StepResult, ScriptError> {
        self.steps_run += 1;
        self.clock.advance_ms(1);
        debug!(step = self.steps_run, op = step.name(), "Replaying step");

        let result = match step {
            Step::Author { id, name } => {
                let name = name.clone().unwrap_or_else(|| id.clone());
                self.editor.set_author(Some(Author::new(id.clone(), name)));
                StepResult::Settled
            }
            Step::SignOut => {
                self.editor.set_author(None);
                StepResult::Settled
            }
            Step::Access { level } => {
                self.editor.engine_mut().set_access_level(*level);
                StepResult::Settled
            }
            Step::SuggestMode { on } => {
                self.editor.engine_mut().set_suggest_mode(*on);
                StepResult::Settled
            }
            Step::Select { block, start, end } => {
                let end = end.unwrap_or(*start);
                if !self.editor.select(*block, *start, end) {
                    return Err(self.out_of_range(step, *block, *start, end));
                }
                StepResult::Settled
            }
            Step::Type { text } => {
                let commands = text.chars().map(|ch| EditCommand::InsertText { text: ch.to_string() });
                self.edit(commands)
            }
            Step::Backspace { count } => self.edit((0..*count).map(|_| EditCommand::DeleteCharacter { backward: true })),
            Step::Delete { count } => self.edit((0..*count).map(|_| EditCommand::DeleteCharacter { backward: false })),
            Step::Paste { text } => self.edit([EditCommand::Paste { text: text.clone() }]),
            Step::Drop {
                text,
                block,
                offset,
                from,
            } => {
                let doc = self.editor.document();
                let target = doc
                    .point_at(*block, *offset)
                    .ok_or_else(|| self.out_of_range(step, *block, *offset, *offset))?;
                let source = match from {
                    Some(range) => {
                        let points = (doc.point_at(range.block, range.start), doc.point_at(range.block, range.end));
                        let (Some(anchor), Some(focus)) = points else {
                            return Err(self.out_of_range(step, range.block, range.start, range.end));
                        };
                        Some(Selection::range(anchor, focus))
                    }
                    None => None,
                };
                self.edit([EditCommand::Drop {
                    text: text.clone(),
                    target,
                    source,
                }])
            }
            Step::Accept { suggestion } | Step::Reject { suggestion } => {
                let suggestion_id = self.target(step, suggestion)?;
                let outcome = match step {
                    Step::Accept { .. } => self.editor.accept(&suggestion_id),
                    _ => self.editor.reject(&suggestion_id),
                };
                StepResult::Resolved { suggestion_id, outcome }
            }
            Step::Undo => StepResult::History(self.editor.undo()),
            Step::Redo => StepResult::History(self.editor.redo()),
            Step::Wait { ms } => {
                self.clock.advance_ms(*ms);
                StepResult::Settled
            }
        };
        Ok(result)
    }

    fn edit(&mut self, commands: impl IntoIterator<Item = EditCommand>) -> StepResult {
        let mut dispatched = 0;
        let mut tracked = 0;
        for command in commands {
            dispatched += 1;
            if self.editor.dispatch(command) == CommandOutcome::Handled {
                tracked += 1;
            }
        }
        StepResult::Edited {
            commands: dispatched,
            tracked,
        }
    }

    /// Resolve `last`, `#n` or a literal id against the store
    fn target(&self, step: &Step, target: &str) -> Result<String, ScriptError> {
        let store = self.editor.engine().store();
        let records = store.all();
        let found = match target {
            "last" => records.last().map(|s| s.id.clone()),
            _ => match target.strip_prefix('#').map(str::parse::<usize>) {
                Some(Ok(n)) if n > 0 => records.get(n - 1).map(|s| s.id.clone()),
                Some(_) => None,
                None => store.get(target).map(|s| s.id.clone()),
            },
        };
        found.ok_or_else(|| ScriptError::UnknownTarget {
            step: self.steps_run,
            op: step.name(),
            target: target.to_string(),
        })
    }

    fn out_of_range(&self, step: &Step, block: usize, start: usize, end: usize) -> ScriptError {
        ScriptError::OutOfRange {
            step: self.steps_run,
            op: step.name(),
            block,
            start,
            end,
        }
    }
}
