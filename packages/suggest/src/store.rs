//! Suggestion metadata store.
//!
//! Holds every [`Suggestion`] record for one document, enforces the
//! open → accepted/rejected state machine, and optionally mirrors each change
//! into a replication backend.

use std::cell::Cell;
use std::collections::{BTreeSet, HashMap};
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tracing::{debug, info};

use crate::id_generator::IdGenerator;
use crate::suggestion::{Author, ResolveAction, Suggestion, SuggestionState, SuggestionType};

/// Time source for record timestamps and the merge window
pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Hand-driven clock; clones share the same instant
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Rc<Cell<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Rc::new(Cell::new(start)),
        }
    }

    pub fn advance_ms(&self, ms: i64) {
        self.now.set(self.now.get() + Duration::milliseconds(ms));
    }

    pub fn set(&self, at: DateTime<Utc>) {
        self.now.set(at);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.now.get()
    }
}

/// Receives every local record change
pub trait ReplicationHook {
    fn publish(&mut self, record: &Suggestion);

    /// The record was discarded before ever being resolved
    fn retract(&mut self, suggestion_id: &str);
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Unknown suggestion: {0}")]
    UnknownSuggestion(String),

    #[error("Suggestion {id} is already {state:?}")]
    NotOpen { id: String, state: SuggestionState },

    #[error("No author identity to attribute the suggestion to")]
    MissingAuthor,
}

/// How a remote record was folded into the local store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    Inserted,
    Updated,
    KeptLocal,
}

/// Copy of every record at one point in time, kept by undo history
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreSnapshot {
    records: HashMap<String, Suggestion>,
}

impl StoreSnapshot {
    pub fn get(&self, id: &str) -> Option<&Suggestion> {
        self.records.get(id)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// A record moved by [`SuggestionStore::rewind`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Rewound {
    /// Back in the store after having been removed
    Restored(String),
    Removed(String),
    /// Now in this state, e.g. open again after an accept was undone
    StateChanged(String, SuggestionState),
    /// Same state, other fields changed
    Updated(String),
}

pub struct SuggestionStore {
    records: HashMap<String, Suggestion>,
    ids: IdGenerator,
    clock: Box<dyn Clock>,
    hook: Option<Box<dyn ReplicationHook>>,
}

impl SuggestionStore {
    pub fn new(ids: IdGenerator) -> Self {
        Self::with_clock(ids, Box::new(SystemClock))
    }

    pub fn with_clock(ids: IdGenerator, clock: Box<dyn Clock>) -> Self {
        Self {
            records: HashMap::new(),
            ids,
            clock,
            hook: None,
        }
    }

    pub fn set_replication(&mut self, hook: Box<dyn ReplicationHook>) {
        self.hook = Some(hook);
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Create an open suggestion with a fresh id
    pub fn create(&mut self, suggestion_type: SuggestionType, author: &Author) -> Suggestion {
        let id = self.ids.next_id();
        let record = Suggestion::new(id, suggestion_type, author, self.clock.now());
        info!(id = %record.id, kind = record.suggestion_type.as_str(), author = %author.id, "Suggestion created");
        self.records.insert(record.id.clone(), record.clone());
        self.publish(&record.id);
        record
    }

    pub fn get(&self, id: &str) -> Option<&Suggestion> {
        self.records.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.records.contains_key(id)
    }

    pub fn is_open(&self, id: &str) -> bool {
        self.records.get(id).is_some_and(Suggestion::is_open)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Every record, oldest first
    pub fn all(&self) -> Vec<&Suggestion> {
        let mut records: Vec<&Suggestion> = self.records.values().collect();
        records.sort_by(|a, b| a.created_at.cmp(&b.created_at).then_with(|| a.id.cmp(&b.id)));
        records
    }

    pub fn open(&self) -> Vec<&Suggestion> {
        self.all().into_iter().filter(|s| s.is_open()).collect()
    }

    pub fn by_author(&self, author_id: &str) -> Vec<&Suggestion> {
        self.all()
            .into_iter()
            .filter(|s| s.is_authored_by(author_id))
            .collect()
    }

    /// Bump `updatedAt` after the annotated text changed
    pub fn touch(&mut self, id: &str) -> Result<(), StoreError> {
        let now = self.clock.now();
        self.open_record_mut(id)?.updated_at = now;
        self.publish(id);
        Ok(())
    }

    pub fn set_type(&mut self, id: &str, suggestion_type: SuggestionType) -> Result<(), StoreError> {
        let now = self.clock.now();
        let record = self.open_record_mut(id)?;
        if record.suggestion_type != suggestion_type {
            debug!(id, from = record.suggestion_type.as_str(), to = suggestion_type.as_str(), "Suggestion type changed");
            record.suggestion_type = suggestion_type;
        }
        record.updated_at = now;
        self.publish(id);
        Ok(())
    }

    /// Move an open suggestion to its terminal state
    pub fn transition(&mut self, id: &str, action: ResolveAction) -> Result<SuggestionState, StoreError> {
        let now = self.clock.now();
        let record = self.open_record_mut(id)?;
        record.state = action.target_state();
        record.updated_at = now;
        let state = record.state;
        self.publish(id);
        Ok(state)
    }

    /// Drop an open suggestion whose annotated text vanished
    pub fn discard(&mut self, id: &str) -> Option<Suggestion> {
        if !self.is_open(id) {
            return None;
        }
        let record = self.records.remove(id)?;
        debug!(id, "Suggestion discarded");
        if let Some(hook) = self.hook.as_mut() {
            hook.retract(id);
        }
        Some(record)
    }

    pub fn snapshot(&self) -> StoreSnapshot {
        StoreSnapshot {
            records: self.records.clone(),
        }
    }

    /// Move every record that differs between `from` and `to` to its `to` version
    ///
    /// Records the two snapshots agree on are left alone, so changes made
    /// since (by peers, or by later steps) survive. Rewound records get a
    /// fresh `updatedAt` and are republished.
    pub fn rewind(&mut self, from: &StoreSnapshot, to: &StoreSnapshot) -> Vec<Rewound> {
        let ids: BTreeSet<&String> = from.records.keys().chain(to.records.keys()).collect();
        let now = self.clock.now();
        let mut changes = Vec::new();

        for id in ids {
            let target = to.records.get(id);
            if from.records.get(id) == target {
                continue;
            }
            match target {
                Some(record) => {
                    let mut record = record.clone();
                    record.updated_at = now;
                    let previous = self.records.insert(id.clone(), record.clone());
                    changes.push(match previous {
                        None => Rewound::Restored(id.clone()),
                        Some(prev) if prev.state != record.state => Rewound::StateChanged(id.clone(), record.state),
                        Some(_) => Rewound::Updated(id.clone()),
                    });
                    self.publish(id);
                }
                None => {
                    if self.records.remove(id).is_some() {
                        if let Some(hook) = self.hook.as_mut() {
                            hook.retract(id);
                        }
                        changes.push(Rewound::Removed(id.clone()));
                    }
                }
            }
        }
        if !changes.is_empty() {
            debug!(count = changes.len(), "Suggestion records rewound");
        }
        changes
    }

    /// Fold in a record received from a peer
    ///
    /// Terminal states are sticky: an open record never overwrites a resolved
    /// one, and a resolved record always overwrites an open one regardless of
    /// timestamps. Otherwise the later `updatedAt` wins, and a tie between two
    /// different terminal states goes to `Accepted`.
    pub fn merge_remote(&mut self, remote: Suggestion) -> MergeOutcome {
        let Some(local) = self.records.get(&remote.id) else {
            self.records.insert(remote.id.clone(), remote);
            return MergeOutcome::Inserted;
        };
        if *local == remote {
            return MergeOutcome::KeptLocal;
        }

        let take_remote = match (local.state.is_terminal(), remote.state.is_terminal()) {
            (true, false) => false,
            (false, true) => true,
            (true, true) => match remote.updated_at.cmp(&local.updated_at) {
                std::cmp::Ordering::Greater => true,
                std::cmp::Ordering::Less => false,
                std::cmp::Ordering::Equal => remote.state == SuggestionState::Accepted,
            },
            (false, false) => remote.updated_at > local.updated_at,
        };

        if take_remote {
            self.records.insert(remote.id.clone(), remote);
            MergeOutcome::Updated
        } else {
            // Re-announce so the peer converges on the surviving version
            let id = remote.id;
            self.publish(&id);
            MergeOutcome::KeptLocal
        }
    }

    fn open_record_mut(&mut self, id: &str) -> Result<&mut Suggestion, StoreError> {
        let record = self
            .records
            .get_mut(id)
            .ok_or_else(|| StoreError::UnknownSuggestion(id.to_string()))?;
        if !record.is_open() {
            return Err(StoreError::NotOpen {
                id: id.to_string(),
                state: record.state,
            });
        }
        Ok(record)
    }

    fn publish(&mut self, id: &str) {
        if let (Some(hook), Some(record)) = (self.hook.as_mut(), self.records.get(id)) {
            hook.publish(record);
        }
    }
}

impl std::fmt::Debug for SuggestionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionStore")
            .field("records", &self.records.len())
            .field("seed", &self.ids.seed())
            .field("replicated", &self.hook.is_some())
            .finish()
    }
}
