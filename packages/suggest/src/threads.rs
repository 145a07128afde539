//! Thread (comment) notifications.
//!
//! Changes are queued during an edit transaction and turned into
//! [`ThreadEvent`]s only after the transaction commits, so listeners never run
//! while the tree is mid-mutation.

use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use serde::Serialize;

use crate::suggestion::SuggestionState;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ThreadEvent {
    #[serde(rename_all = "camelCase")]
    Created {
        suggestion_id: String,
        label: String,
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    TextChanged { suggestion_id: String, text: String },
    #[serde(rename_all = "camelCase")]
    Resolved {
        suggestion_id: String,
        state: SuggestionState,
    },
    #[serde(rename_all = "camelCase")]
    Discarded { suggestion_id: String },
    /// A resolution was undone; the thread is live again
    #[serde(rename_all = "camelCase")]
    Reopened { suggestion_id: String },
}

impl ThreadEvent {
    pub fn suggestion_id(&self) -> &str {
        match self {
            ThreadEvent::Created { suggestion_id, .. }
            | ThreadEvent::TextChanged { suggestion_id, .. }
            | ThreadEvent::Resolved { suggestion_id, .. }
            | ThreadEvent::Discarded { suggestion_id }
            | ThreadEvent::Reopened { suggestion_id } => suggestion_id,
        }
    }
}

pub trait ThreadListener {
    fn on_thread_event(&mut self, event: &ThreadEvent);
}

impl<F> ThreadListener for F
where
    F: FnMut(&ThreadEvent),
{
    fn on_thread_event(&mut self, event: &ThreadEvent) {
        self(event)
    }
}

/// Listener that keeps every event; clones share the same log
#[derive(Debug, Clone, Default)]
pub struct ThreadLog {
    events: Rc<RefCell<Vec<ThreadEvent>>>,
}

impl ThreadLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<ThreadEvent> {
        self.events.borrow().clone()
    }

    pub fn take(&self) -> Vec<ThreadEvent> {
        std::mem::take(&mut *self.events.borrow_mut())
    }
}

impl ThreadListener for ThreadLog {
    fn on_thread_event(&mut self, event: &ThreadEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Deferred {
    Created { suggestion_id: String, label: String },
    TextChanged(String),
    Resolved(String, SuggestionState),
    Discarded(String),
    Reopened(String),
}

/// Thread work recorded during a transaction
#[derive(Debug, Default)]
pub struct DeferredQueue {
    pending: Vec<Deferred>,
}

impl DeferredQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn created(&mut self, suggestion_id: &str, label: &str) {
        self.pending.push(Deferred::Created {
            suggestion_id: suggestion_id.to_string(),
            label: label.to_string(),
        });
    }

    pub fn text_changed(&mut self, suggestion_id: &str) {
        self.pending.push(Deferred::TextChanged(suggestion_id.to_string()));
    }

    pub fn resolved(&mut self, suggestion_id: &str, state: SuggestionState) {
        self.pending
            .push(Deferred::Resolved(suggestion_id.to_string(), state));
    }

    pub fn discarded(&mut self, suggestion_id: &str) {
        self.pending.push(Deferred::Discarded(suggestion_id.to_string()));
    }

    pub fn reopened(&mut self, suggestion_id: &str) {
        self.pending.push(Deferred::Reopened(suggestion_id.to_string()));
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn clear(&mut self) {
        self.pending.clear();
    }

    /// Forget work queued after the first `len` items
    pub fn truncate(&mut self, len: usize) {
        self.pending.truncate(len);
    }

    /// Turn queued work into events
    ///
    /// `text_of` computes a suggestion's current quote from the committed
    /// tree. Text changes collapse to one event per suggestion, and a
    /// suggestion both created and discarded in this batch produces nothing.
    pub fn drain<F>(&mut self, text_of: F) -> Vec<ThreadEvent>
    where
        F: Fn(&str) -> String,
    {
        let pending = std::mem::take(&mut self.pending);
        let created: HashSet<String> = pending
            .iter()
            .filter_map(|d| match d {
                Deferred::Created { suggestion_id, .. } => Some(suggestion_id.clone()),
                _ => None,
            })
            .collect();
        let discarded: HashSet<String> = pending
            .iter()
            .filter_map(|d| match d {
                Deferred::Discarded(id) => Some(id.clone()),
                _ => None,
            })
            .collect();

        let mut reported: HashSet<String> = HashSet::new();
        let mut events = Vec::new();
        for item in pending {
            match item {
                Deferred::Created {
                    suggestion_id,
                    label,
                } => {
                    if discarded.contains(&suggestion_id) {
                        continue;
                    }
                    let text = text_of(&suggestion_id);
                    events.push(ThreadEvent::Created {
                        suggestion_id,
                        label,
                        text,
                    });
                }
                Deferred::TextChanged(id) => {
                    if created.contains(&id) || discarded.contains(&id) || !reported.insert(id.clone()) {
                        continue;
                    }
                    let text = text_of(&id);
                    events.push(ThreadEvent::TextChanged {
                        suggestion_id: id,
                        text,
                    });
                }
                Deferred::Resolved(id, state) => events.push(ThreadEvent::Resolved {
                    suggestion_id: id,
                    state,
                }),
                Deferred::Discarded(id) => {
                    if !created.contains(&id) {
                        events.push(ThreadEvent::Discarded { suggestion_id: id });
                    }
                }
                Deferred::Reopened(id) => events.push(ThreadEvent::Reopened { suggestion_id: id }),
            }
        }
        events
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_changes_collapse() {
        let mut queue = DeferredQueue::new();
        queue.text_changed("a");
        queue.text_changed("a");
        queue.text_changed("b");

        let events = queue.drain(|id| format!("text of {id}"));
        assert_eq!(
            events,
            vec![
                ThreadEvent::TextChanged {
                    suggestion_id: "a".into(),
                    text: "text of a".into()
                },
                ThreadEvent::TextChanged {
                    suggestion_id: "b".into(),
                    text: "text of b".into()
                },
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_created_carries_latest_text() {
        let mut queue = DeferredQueue::new();
        queue.created("a", "Suggested edit");
        queue.text_changed("a");

        let events = queue.drain(|_| "abc".to_string());
        assert_eq!(
            events,
            vec![ThreadEvent::Created {
                suggestion_id: "a".into(),
                label: "Suggested edit".into(),
                text: "abc".into()
            }]
        );
    }

    #[test]
    fn test_created_then_discarded_is_silent() {
        let mut queue = DeferredQueue::new();
        queue.created("a", "Suggested edit");
        queue.discarded("a");
        queue.discarded("b");

        let events = queue.drain(|_| String::new());
        assert_eq!(
            events,
            vec![ThreadEvent::Discarded {
                suggestion_id: "b".into()
            }]
        );
    }

    #[test]
    fn test_event_json_shape() {
        let event = ThreadEvent::TextChanged {
            suggestion_id: "s-1".into(),
            text: "hi".into(),
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], "textChanged");
        assert_eq!(json["suggestionId"], "s-1");
    }

    #[test]
    fn test_thread_log_clones_share_events() {
        let log = ThreadLog::new();
        let mut listener = log.clone();
        listener.on_thread_event(&ThreadEvent::Discarded {
            suggestion_id: "x".into(),
        });
        assert_eq!(log.events().len(), 1);
        assert_eq!(log.take().len(), 1);
        assert!(log.events().is_empty());
    }
}
