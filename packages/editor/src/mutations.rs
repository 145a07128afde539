//! # Tree Mutations
//!
//! Primitive operations on the document tree.
//!
//! ## Design Principles
//!
//! 1. **Validated**: every primitive checks its inputs before touching the arena
//! 2. **Observable**: every change records a [`NodeMutation`] for the next commit
//! 3. **Idempotent where possible**: mark id changes are set operations
//!
//! ## Semantics
//!
//! ### Remove
//! - Detaches the node and destroys its whole subtree
//!
//! ### Unwrap
//! - Lifts a container's children into its parent at the container's position
//! - The container itself is destroyed
//!
//! ### Mark ids
//! - `add_mark_id` / `remove_mark_id` report whether the set changed
//! - Re-applying either is a no-op

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::{Document, Node, NodeKey, NodeKind, NodeType};
use crate::text::{char_len, split_at_char};

/// What happened to a node during a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MutationKind {
    Created,
    Updated,
    Destroyed,
}

/// One entry of the mutation-notification feed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeMutation {
    pub key: NodeKey,
    pub node_type: NodeType,
    pub kind: MutationKind,
}

impl NodeMutation {
    pub fn new(key: NodeKey, node_type: NodeType, kind: MutationKind) -> Self {
        Self {
            key,
            node_type,
            kind,
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum MutationError {
    #[error("Node not found: {0}")]
    NodeNotFound(NodeKey),

    #[error("Node is not a container: {0}")]
    NotAContainer(NodeKey),

    #[error("Node is not text: {0}")]
    NotText(NodeKey),

    #[error("Node is not a mark: {0}")]
    NotAMark(NodeKey),

    #[error("Node {0} is already attached")]
    AlreadyAttached(NodeKey),

    #[error("Node {0} has no parent")]
    Detached(NodeKey),

    #[error("Would create cycle")]
    CycleDetected,

    #[error("Offset {offset} out of range for {key} (length {len})")]
    OffsetOutOfRange {
        key: NodeKey,
        offset: usize,
        len: usize,
    },

    #[error("Nodes {0} and {1} are not siblings")]
    NotSiblings(NodeKey, NodeKey),

    #[error("Cannot modify the root")]
    RootImmutable,
}

impl Document {
    fn record(&mut self, key: NodeKey, kind: MutationKind) {
        if let Some(node_type) = self.node_type(key) {
            self.pending.push(NodeMutation::new(key, node_type, kind));
        }
    }

    fn node_mut(&mut self, key: NodeKey) -> Result<&mut Node, MutationError> {
        self.nodes
            .get_mut(&key)
            .ok_or(MutationError::NodeNotFound(key))
    }

    fn insert_node(&mut self, kind: NodeKind) -> NodeKey {
        let key = self.alloc_key();
        self.nodes.insert(
            key,
            Node {
                key,
                parent: None,
                kind,
            },
        );
        self.record(key, MutationKind::Created);
        key
    }

    /// Create a detached text node
    pub fn create_text(&mut self, text: impl Into<String>) -> NodeKey {
        self.insert_node(NodeKind::Text { text: text.into() })
    }

    /// Create a detached element
    pub fn create_element(&mut self, tag: impl Into<String>) -> NodeKey {
        self.insert_node(NodeKind::Element {
            tag: tag.into(),
            children: Vec::new(),
        })
    }

    /// Create a detached mark carrying `ids`
    pub fn create_mark<I, S>(&mut self, ids: I) -> NodeKey
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let ids: BTreeSet<String> = ids.into_iter().map(Into::into).collect();
        self.insert_node(NodeKind::Mark {
            ids,
            children: Vec::new(),
        })
    }

    /// Attach a detached node under `parent` at `index` (clamped)
    pub fn insert_child(
        &mut self,
        parent: NodeKey,
        index: usize,
        child: NodeKey,
    ) -> Result<(), MutationError> {
        if child == self.root {
            return Err(MutationError::RootImmutable);
        }
        let child_node = self.node(child).ok_or(MutationError::NodeNotFound(child))?;
        if child_node.parent.is_some() {
            return Err(MutationError::AlreadyAttached(child));
        }
        if !self.node(parent).ok_or(MutationError::NodeNotFound(parent))?.is_container() {
            return Err(MutationError::NotAContainer(parent));
        }
        if self.is_ancestor_or_self(child, parent) {
            return Err(MutationError::CycleDetected);
        }

        let children = self
            .node_mut(parent)?
            .children_mut()
            .ok_or(MutationError::NotAContainer(parent))?;
        let index = index.min(children.len());
        children.insert(index, child);
        self.node_mut(child)?.parent = Some(parent);

        self.record(parent, MutationKind::Updated);
        self.record(child, MutationKind::Updated);
        Ok(())
    }

    /// Append a detached node as the last child of `parent`
    pub fn append_child(&mut self, parent: NodeKey, child: NodeKey) -> Result<(), MutationError> {
        let len = self.children(parent).len();
        self.insert_child(parent, len, child)
    }

    /// Attach a detached node right before `reference`
    pub fn insert_before(&mut self, reference: NodeKey, node: NodeKey) -> Result<(), MutationError> {
        let parent = self.parent(reference).ok_or(MutationError::Detached(reference))?;
        let index = self
            .index_in_parent(reference)
            .ok_or(MutationError::Detached(reference))?;
        self.insert_child(parent, index, node)
    }

    /// Attach a detached node right after `reference`
    pub fn insert_after(&mut self, reference: NodeKey, node: NodeKey) -> Result<(), MutationError> {
        let parent = self.parent(reference).ok_or(MutationError::Detached(reference))?;
        let index = self
            .index_in_parent(reference)
            .ok_or(MutationError::Detached(reference))?;
        self.insert_child(parent, index + 1, node)
    }

    /// Remove a node from its parent without destroying it
    pub fn detach(&mut self, key: NodeKey) -> Result<(), MutationError> {
        if key == self.root {
            return Err(MutationError::RootImmutable);
        }
        let parent = match self.node(key) {
            Some(node) => node.parent,
            None => return Err(MutationError::NodeNotFound(key)),
        };
        let Some(parent) = parent else {
            return Ok(());
        };

        if let Some(children) = self.node_mut(parent)?.children_mut() {
            children.retain(|c| *c != key);
        }
        self.node_mut(key)?.parent = None;

        self.record(parent, MutationKind::Updated);
        self.record(key, MutationKind::Updated);
        Ok(())
    }

    /// Detach a node and destroy its subtree
    pub fn remove(&mut self, key: NodeKey) -> Result<(), MutationError> {
        self.detach(key)?;
        let mut doomed = self.descendants(key);
        doomed.insert(0, key);
        for k in doomed {
            self.record(k, MutationKind::Destroyed);
            self.nodes.remove(&k);
        }
        Ok(())
    }

    /// Replace the string of a text node
    pub fn set_text(&mut self, key: NodeKey, text: impl Into<String>) -> Result<(), MutationError> {
        match &mut self.node_mut(key)?.kind {
            NodeKind::Text { text: current } => {
                *current = text.into();
            }
            _ => return Err(MutationError::NotText(key)),
        }
        self.record(key, MutationKind::Updated);
        Ok(())
    }

    /// Insert `text` at a char offset of a text node
    pub fn insert_text(&mut self, key: NodeKey, offset: usize, text: &str) -> Result<(), MutationError> {
        let current = self.text(key).ok_or(MutationError::NotText(key))?;
        let len = char_len(current);
        if offset > len {
            return Err(MutationError::OffsetOutOfRange { key, offset, len });
        }
        let (head, tail) = split_at_char(current, offset);
        let updated = format!("{head}{text}{tail}");
        self.set_text(key, updated)
    }

    /// Delete chars `start..end` of a text node
    pub fn delete_text(&mut self, key: NodeKey, start: usize, end: usize) -> Result<(), MutationError> {
        let current = self.text(key).ok_or(MutationError::NotText(key))?;
        let len = char_len(current);
        if start > end || end > len {
            return Err(MutationError::OffsetOutOfRange {
                key,
                offset: end.max(start),
                len,
            });
        }
        let (head, rest) = split_at_char(current, start);
        let (_, tail) = split_at_char(rest, end - start);
        let updated = format!("{head}{tail}");
        self.set_text(key, updated)
    }

    /// Split a text node at `offset`
    ///
    /// The original node keeps the head; a new sibling right after it holds
    /// the tail. Returns the new node's key.
    pub fn split_text(&mut self, key: NodeKey, offset: usize) -> Result<NodeKey, MutationError> {
        let current = self.text(key).ok_or(MutationError::NotText(key))?;
        let len = char_len(current);
        if offset > len {
            return Err(MutationError::OffsetOutOfRange { key, offset, len });
        }
        let (head, tail) = split_at_char(current, offset);
        let (head, tail) = (head.to_string(), tail.to_string());

        self.set_text(key, head)?;
        let right = self.create_text(tail);
        self.insert_after(key, right)?;
        Ok(right)
    }

    /// Split a container before child `index`
    ///
    /// A new container of the same kind (same tag or same mark ids) is inserted
    /// right after `key` and receives `children[index..]`.
    pub fn split_container(&mut self, key: NodeKey, index: usize) -> Result<NodeKey, MutationError> {
        let node = self.node(key).ok_or(MutationError::NodeNotFound(key))?;
        let kind = match &node.kind {
            NodeKind::Element { tag, .. } => NodeKind::Element {
                tag: tag.clone(),
                children: Vec::new(),
            },
            NodeKind::Mark { ids, .. } => NodeKind::Mark {
                ids: ids.clone(),
                children: Vec::new(),
            },
            NodeKind::Text { .. } => return Err(MutationError::NotAContainer(key)),
        };
        let moved: Vec<NodeKey> = node.children().iter().skip(index).copied().collect();

        let sibling = self.insert_node(kind);
        self.insert_after(key, sibling)?;
        for child in moved {
            self.detach(child)?;
            self.append_child(sibling, child)?;
        }
        Ok(sibling)
    }

    /// Wrap the contiguous siblings `first..=last` in a new mark
    pub fn wrap<I, S>(&mut self, first: NodeKey, last: NodeKey, ids: I) -> Result<NodeKey, MutationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let parent = self.parent(first).ok_or(MutationError::Detached(first))?;
        if self.parent(last) != Some(parent) {
            return Err(MutationError::NotSiblings(first, last));
        }
        let start = self.index_in_parent(first).ok_or(MutationError::Detached(first))?;
        let end = self.index_in_parent(last).ok_or(MutationError::Detached(last))?;
        if end < start {
            return Err(MutationError::NotSiblings(first, last));
        }
        let run: Vec<NodeKey> = self.children(parent)[start..=end].to_vec();

        let mark = self.create_mark(ids);
        self.insert_child(parent, start, mark)?;
        for child in run {
            self.detach(child)?;
            self.append_child(mark, child)?;
        }
        Ok(mark)
    }

    /// Lift a container's children into its parent and destroy it
    pub fn unwrap(&mut self, key: NodeKey) -> Result<(), MutationError> {
        let parent = self.parent(key).ok_or(MutationError::Detached(key))?;
        let index = self.index_in_parent(key).ok_or(MutationError::Detached(key))?;
        let children: Vec<NodeKey> = self.children(key).to_vec();

        for (offset, child) in children.into_iter().enumerate() {
            self.detach(child)?;
            self.insert_child(parent, index + 1 + offset, child)?;
        }
        self.remove(key)
    }

    /// Move every child of `from` to the end of `to`
    pub fn move_children(&mut self, from: NodeKey, to: NodeKey) -> Result<(), MutationError> {
        if !self.node(to).ok_or(MutationError::NodeNotFound(to))?.is_container() {
            return Err(MutationError::NotAContainer(to));
        }
        let children: Vec<NodeKey> = self.children(from).to_vec();
        for child in children {
            self.detach(child)?;
            self.append_child(to, child)?;
        }
        Ok(())
    }

    /// Add an id to a mark; returns whether the set changed
    pub fn add_mark_id(&mut self, key: NodeKey, id: impl Into<String>) -> Result<bool, MutationError> {
        let changed = match &mut self.node_mut(key)?.kind {
            NodeKind::Mark { ids, .. } => ids.insert(id.into()),
            _ => return Err(MutationError::NotAMark(key)),
        };
        if changed {
            self.record(key, MutationKind::Updated);
        }
        Ok(changed)
    }

    /// Remove an id from a mark; returns whether the set changed
    pub fn remove_mark_id(&mut self, key: NodeKey, id: &str) -> Result<bool, MutationError> {
        let changed = match &mut self.node_mut(key)?.kind {
            NodeKind::Mark { ids, .. } => ids.remove(id),
            _ => return Err(MutationError::NotAMark(key)),
        };
        if changed {
            self.record(key, MutationKind::Updated);
        }
        Ok(changed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn single_text(doc: &Document) -> NodeKey {
        doc.text_nodes()[0]
    }

    #[test]
    fn test_split_text_keeps_head_in_place() {
        let mut doc = Document::from_blocks(["Hello world"]);
        let text = single_text(&doc);

        let right = doc.split_text(text, 5).unwrap();

        assert_eq!(doc.text(text), Some("Hello"));
        assert_eq!(doc.text(right), Some(" world"));
        assert_eq!(doc.next_sibling(text), Some(right));
        assert_eq!(doc.plain_text(), "Hello world");
    }

    #[test]
    fn test_split_text_rejects_out_of_range_offset() {
        let mut doc = Document::from_blocks(["abc"]);
        let text = single_text(&doc);
        assert!(matches!(
            doc.split_text(text, 4),
            Err(MutationError::OffsetOutOfRange { offset: 4, len: 3, .. })
        ));
    }

    #[test]
    fn test_wrap_and_unwrap_round_trip() {
        let mut doc = Document::from_blocks(["abc"]);
        let text = single_text(&doc);
        let block = doc.blocks()[0];

        let mark = doc.wrap(text, text, ["x"]).unwrap();
        assert_eq!(doc.children(block), &[mark]);
        assert_eq!(doc.parent(text), Some(mark));

        doc.unwrap(mark).unwrap();
        assert_eq!(doc.children(block), &[text]);
        assert!(!doc.contains(mark));
    }

    #[test]
    fn test_mark_ids_are_set_operations() {
        let mut doc = Document::from_blocks(["abc"]);
        let text = single_text(&doc);
        let mark = doc.wrap(text, text, ["a"]).unwrap();
        doc.commit();

        assert!(doc.add_mark_id(mark, "b").unwrap());
        assert!(!doc.add_mark_id(mark, "b").unwrap());
        assert!(doc.remove_mark_id(mark, "a").unwrap());
        assert!(!doc.remove_mark_id(mark, "a").unwrap());

        let ids: Vec<&str> = doc.mark_ids(mark).unwrap().iter().map(String::as_str).collect();
        assert_eq!(ids, vec!["b"]);
        assert_eq!(doc.commit().mutations.len(), 2);
    }

    #[test]
    fn test_remove_destroys_subtree() {
        let mut doc = Document::from_blocks(["abc"]);
        let text = single_text(&doc);
        let mark = doc.wrap(text, text, ["a"]).unwrap();
        doc.commit();

        doc.remove(mark).unwrap();
        let commit = doc.commit();

        assert!(!doc.contains(text));
        let destroyed: Vec<NodeKey> = commit
            .mutations
            .iter()
            .filter(|m| m.kind == MutationKind::Destroyed)
            .map(|m| m.key)
            .collect();
        assert_eq!(destroyed, vec![mark, text]);
    }

    #[test]
    fn test_insert_child_rejects_cycles_and_attached_nodes() {
        let mut doc = Document::from_blocks(["abc"]);
        let block = doc.blocks()[0];
        let text = single_text(&doc);

        assert_eq!(
            doc.insert_child(block, 0, text),
            Err(MutationError::AlreadyAttached(text))
        );

        let outer = doc.create_element("span");
        let inner = doc.create_element("span");
        doc.append_child(outer, inner).unwrap();
        assert_eq!(doc.append_child(inner, outer), Err(MutationError::CycleDetected));
    }

    #[test]
    fn test_split_container_moves_tail_children() {
        let mut doc = Document::from_blocks(["abc"]);
        let text = single_text(&doc);
        let right = doc.split_text(text, 1).unwrap();
        let mark = doc.wrap(text, right, ["m"]).unwrap();

        let tail = doc.split_container(mark, 1).unwrap();

        assert_eq!(doc.children(mark), &[text]);
        assert_eq!(doc.children(tail), &[right]);
        assert_eq!(doc.mark_ids(tail), doc.mark_ids(mark));
        assert_eq!(doc.next_sibling(mark), Some(tail));
    }

    #[test]
    fn test_insert_and_delete_text_count_chars() {
        let mut doc = Document::from_blocks(["naïve"]);
        let text = single_text(&doc);

        doc.insert_text(text, 3, "-").unwrap();
        assert_eq!(doc.text(text), Some("naï-ve"));

        doc.delete_text(text, 2, 4).unwrap();
        assert_eq!(doc.text(text), Some("nave"));
    }
}
