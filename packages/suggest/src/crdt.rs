//! Replication of suggestion records over a Yjs-compatible CRDT.
//!
//! Each logical document gets one shared map, `suggestions:<documentId>`,
//! holding every record as a JSON string keyed by suggestion id. Tree
//! mutations travel through the host's own transport; only metadata lives
//! here.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use thiserror::Error;
use tracing::warn;
use yrs::updates::decoder::Decode;
use yrs::updates::encoder::Encode;
use yrs::{Any, Doc, Map, MapRef, Out, ReadTxn, StateVector, Transact, Update};

use crate::store::ReplicationHook;
use crate::suggestion::Suggestion;

#[derive(Debug, Error)]
pub enum CrdtError {
    #[error("Failed to decode: {0}")]
    DecodeError(String),

    #[error("Failed to apply update: {0}")]
    ApplyError(String),

    #[error("Invalid record {key}: {reason}")]
    InvalidRecord { key: String, reason: String },
}

/// Replicated view of one document's suggestion records
///
/// Clones share the same underlying CRDT document.
#[derive(Clone)]
pub struct SuggestionReplica {
    doc: Doc,
    records: MapRef,
    document_id: String,
}

impl SuggestionReplica {
    pub fn new(document_id: &str, client_id: u64) -> Self {
        let doc = Doc::with_client_id(client_id);
        let records = doc.get_or_insert_map(format!("suggestions:{document_id}"));
        Self {
            doc,
            records,
            document_id: document_id.to_string(),
        }
    }

    pub fn document_id(&self) -> &str {
        &self.document_id
    }

    pub fn client_id(&self) -> u64 {
        self.doc.client_id()
    }

    /// Write a record
    pub fn put(&self, record: &Suggestion) -> Result<(), CrdtError> {
        let json = serde_json::to_string(record).map_err(|e| CrdtError::InvalidRecord {
            key: record.id.clone(),
            reason: e.to_string(),
        })?;
        let mut txn = self.doc.transact_mut();
        self.records.insert(&mut txn, record.id.as_str(), json);
        Ok(())
    }

    pub fn remove(&self, suggestion_id: &str) {
        let mut txn = self.doc.transact_mut();
        self.records.remove(&mut txn, suggestion_id);
    }

    pub fn get(&self, suggestion_id: &str) -> Result<Option<Suggestion>, CrdtError> {
        let txn = self.doc.transact();
        match self.records.get(&txn, suggestion_id) {
            Some(value) => decode_record(suggestion_id, value).map(Some),
            None => Ok(None),
        }
    }

    /// Every replicated record, sorted by id
    pub fn records(&self) -> Result<Vec<Suggestion>, CrdtError> {
        let txn = self.doc.transact();
        let mut records = self
            .records
            .iter(&txn)
            .map(|(key, value)| decode_record(key, value))
            .collect::<Result<Vec<_>, _>>()?;
        records.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(records)
    }

    pub fn len(&self) -> usize {
        let txn = self.doc.transact();
        self.records.len(&txn) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Current state vector (for delta sync)
    pub fn state_vector(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.state_vector().encode_v1()
    }

    /// Encode the full replica state
    pub fn encode_state(&self) -> Vec<u8> {
        let txn = self.doc.transact();
        txn.encode_state_as_update_v1(&StateVector::default())
    }

    /// Encode what a peer with `state_vector` is missing
    pub fn encode_delta(&self, state_vector: &[u8]) -> Result<Vec<u8>, CrdtError> {
        let sv = StateVector::decode_v1(state_vector)
            .map_err(|e| CrdtError::DecodeError(e.to_string()))?;
        let txn = self.doc.transact();
        Ok(txn.encode_state_as_update_v1(&sv))
    }

    /// Apply an update from a peer
    pub fn apply_update(&self, update: &[u8]) -> Result<(), CrdtError> {
        let update = Update::decode_v1(update)
            .map_err(|e| CrdtError::DecodeError(e.to_string()))?;

        let mut txn = self.doc.transact_mut();
        txn.apply_update(update)
            .map_err(|e| CrdtError::ApplyError(e.to_string()))?;
        Ok(())
    }
}

fn decode_record(key: &str, value: Out) -> Result<Suggestion, CrdtError> {
    let Out::Any(Any::String(json)) = value else {
        return Err(CrdtError::InvalidRecord {
            key: key.to_string(),
            reason: "expected a JSON string".to_string(),
        });
    };
    serde_json::from_str(&json).map_err(|e| CrdtError::InvalidRecord {
        key: key.to_string(),
        reason: e.to_string(),
    })
}

impl ReplicationHook for SuggestionReplica {
    fn publish(&mut self, record: &Suggestion) {
        if let Err(e) = self.put(record) {
            warn!(suggestion_id = %record.id, error = %e, "Failed to replicate suggestion");
        }
    }

    fn retract(&mut self, suggestion_id: &str) {
        self.remove(suggestion_id);
    }
}

impl std::fmt::Debug for SuggestionReplica {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SuggestionReplica")
            .field("document_id", &self.document_id)
            .field("client_id", &self.client_id())
            .finish()
    }
}

/// Transport that carries replica updates between peers of a document
pub trait CollabProvider {
    /// Send an update from `origin` to every other peer of `document_id`
    fn broadcast(&mut self, document_id: &str, origin: u64, update: Vec<u8>);

    /// Updates for `document_id` that `peer` has not received yet
    fn receive(&mut self, document_id: &str, peer: u64) -> Vec<Vec<u8>>;
}

/// In-process provider; clones are connected to the same channels
#[derive(Debug, Clone, Default)]
pub struct LoopbackProvider {
    channels: Rc<RefCell<HashMap<String, Vec<(u64, Vec<u8>)>>>>,
    cursors: Rc<RefCell<HashMap<(String, u64), usize>>>,
}

impl LoopbackProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl CollabProvider for LoopbackProvider {
    fn broadcast(&mut self, document_id: &str, origin: u64, update: Vec<u8>) {
        self.channels
            .borrow_mut()
            .entry(document_id.to_string())
            .or_default()
            .push((origin, update));
    }

    fn receive(&mut self, document_id: &str, peer: u64) -> Vec<Vec<u8>> {
        let channels = self.channels.borrow();
        let Some(log) = channels.get(document_id) else {
            return Vec::new();
        };
        let mut cursors = self.cursors.borrow_mut();
        let cursor = cursors.entry((document_id.to_string(), peer)).or_default();
        let fresh = log[*cursor..]
            .iter()
            .filter(|(origin, _)| *origin != peer)
            .map(|(_, update)| update.clone())
            .collect();
        *cursor = log.len();
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::suggestion::{Author, SuggestionState, SuggestionType};
    use chrono::Utc;

    fn record(id: &str) -> Suggestion {
        Suggestion::new(id, SuggestionType::Insert, &Author::new("ada", "Ada"), Utc::now())
    }

    #[test]
    fn test_put_and_read_back() {
        let replica = SuggestionReplica::new("doc", 1);
        let r = record("a-1");
        replica.put(&r).unwrap();

        assert_eq!(replica.get("a-1").unwrap(), Some(r));
        assert_eq!(replica.len(), 1);
        assert!(replica.get("missing").unwrap().is_none());
    }

    #[test]
    fn test_full_state_sync() {
        let a = SuggestionReplica::new("doc", 1);
        let b = SuggestionReplica::new("doc", 2);
        a.put(&record("a-1")).unwrap();

        b.apply_update(&a.encode_state()).unwrap();
        assert_eq!(b.records().unwrap().len(), 1);
    }

    #[test]
    fn test_delta_sync_carries_updates() {
        let a = SuggestionReplica::new("doc", 1);
        let b = SuggestionReplica::new("doc", 2);
        let mut r = record("a-1");
        a.put(&r).unwrap();
        b.apply_update(&a.encode_state()).unwrap();

        r.state = SuggestionState::Accepted;
        a.put(&r).unwrap();
        let delta = a.encode_delta(&b.state_vector()).unwrap();
        b.apply_update(&delta).unwrap();

        assert_eq!(b.get("a-1").unwrap().unwrap().state, SuggestionState::Accepted);
    }

    #[test]
    fn test_invalid_update_is_an_error() {
        let replica = SuggestionReplica::new("doc", 1);
        assert!(matches!(
            replica.apply_update(&[0xff, 0xff, 0xff]),
            Err(CrdtError::DecodeError(_))
        ));
    }

    #[test]
    fn test_loopback_skips_own_updates() {
        let mut hub = LoopbackProvider::new();
        hub.broadcast("doc", 1, vec![1]);
        hub.broadcast("doc", 2, vec![2]);

        let mut peer = hub.clone();
        assert_eq!(peer.receive("doc", 1), vec![vec![2]]);
        assert!(peer.receive("doc", 1).is_empty());
        assert_eq!(hub.receive("doc", 2), vec![vec![1]]);
        assert!(hub.receive("other", 2).is_empty());
    }
}
