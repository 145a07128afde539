//! # Document Tree
//!
//! Arena-backed rich document tree.
//!
//! Nodes live in a single map keyed by [`NodeKey`]. Callers hold keys, never
//! node references, and re-resolve a key on every read: a key that no longer
//! resolves simply means the node was destroyed.
//!
//! ## Shape
//!
//! ```text
//! root (Element)
//!  ├─ p (Element)
//!  │   ├─ Text "Hello "
//!  │   ├─ Mark {suggestion:a1-1:insert}
//!  │   │   └─ Text "brave "
//!  │   └─ Text "world"
//!  └─ p (Element)
//!      └─ Text "Second block"
//! ```
//!
//! ## Lifecycle
//!
//! ```text
//! mutate → mutate → commit → notification feed
//!   ↓        ↓         ↓
//! pending  pending  version + 1
//! ```

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::mutations::{MutationKind, NodeMutation};
use crate::selection::{Point, Selection};
use crate::text::char_len;
use crate::EditorError;

/// Stable identity of a node inside one [`Document`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct NodeKey(pub u64);

impl fmt::Display for NodeKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "n{}", self.0)
    }
}

/// Coarse node classification used to filter mutation notifications
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum NodeType {
    Element,
    Text,
    Mark,
}

/// Node payload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum NodeKind {
    /// Ordered container (root, paragraphs, ...)
    Element { tag: String, children: Vec<NodeKey> },

    /// Leaf holding a string
    Text { text: String },

    /// Container wrapping a run of siblings, tagged with a set of annotation ids
    Mark {
        ids: BTreeSet<String>,
        children: Vec<NodeKey>,
    },
}

/// A node in the arena
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub key: NodeKey,
    pub parent: Option<NodeKey>,
    pub kind: NodeKind,
}

impl Node {
    pub fn node_type(&self) -> NodeType {
        match self.kind {
            NodeKind::Element { .. } => NodeType::Element,
            NodeKind::Text { .. } => NodeType::Text,
            NodeKind::Mark { .. } => NodeType::Mark,
        }
    }

    /// Children of a container; empty for text
    pub fn children(&self) -> &[NodeKey] {
        match &self.kind {
            NodeKind::Element { children, .. } | NodeKind::Mark { children, .. } => children,
            NodeKind::Text { .. } => &[],
        }
    }

    pub(crate) fn children_mut(&mut self) -> Option<&mut Vec<NodeKey>> {
        match &mut self.kind {
            NodeKind::Element { children, .. } | NodeKind::Mark { children, .. } => Some(children),
            NodeKind::Text { .. } => None,
        }
    }

    pub fn text(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Text { text } => Some(text),
            _ => None,
        }
    }

    pub fn mark_ids(&self) -> Option<&BTreeSet<String>> {
        match &self.kind {
            NodeKind::Mark { ids, .. } => Some(ids),
            _ => None,
        }
    }

    pub fn is_container(&self) -> bool {
        !matches!(self.kind, NodeKind::Text { .. })
    }
}

/// Editable rich document
#[derive(Debug, Clone)]
pub struct Document {
    pub(crate) nodes: HashMap<NodeKey, Node>,
    pub(crate) root: NodeKey,
    pub(crate) next_key: u64,
    pub(crate) version: u64,
    pub(crate) selection: Option<Selection>,
    pub(crate) pending: Vec<NodeMutation>,
}

/// Frozen copy of the tree, used for undo history and serialization
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentSnapshot {
    pub root: NodeKey,
    pub version: u64,
    pub nodes: Vec<Node>,
    pub selection: Option<Selection>,
}

impl DocumentSnapshot {
    pub fn to_json(&self) -> Result<String, EditorError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self, EditorError> {
        Ok(serde_json::from_str(json)?)
    }
}

/// Result of closing an edit transaction
#[derive(Debug, Clone, Default)]
pub struct Commit {
    /// Document version after the commit
    pub version: u64,

    /// Per-node notifications in the order they were recorded
    pub mutations: Vec<NodeMutation>,
}

impl Commit {
    /// Notifications for one node type only
    pub fn mutations_of(&self, node_type: NodeType) -> impl Iterator<Item = &NodeMutation> {
        self.mutations
            .iter()
            .filter(move |m| m.node_type == node_type)
    }

    pub fn is_empty(&self) -> bool {
        self.mutations.is_empty()
    }
}

impl Document {
    /// Create an empty document (a bare root element)
    pub fn new() -> Self {
        let root = NodeKey(0);
        let mut nodes = HashMap::new();
        nodes.insert(
            root,
            Node {
                key: root,
                parent: None,
                kind: NodeKind::Element {
                    tag: "root".to_string(),
                    children: Vec::new(),
                },
            },
        );

        Self {
            nodes,
            root,
            next_key: 1,
            version: 0,
            selection: None,
            pending: Vec::new(),
        }
    }

    /// Create a document with one paragraph per block
    ///
    /// Empty blocks get an empty paragraph with no text node.
    pub fn from_blocks<I, S>(blocks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut doc = Self::new();
        let root = doc.root;
        for block in blocks {
            let text: String = block.into();
            let paragraph = doc.create_element("p");
            doc.attach_unchecked(root, paragraph);
            if !text.is_empty() {
                let leaf = doc.create_text(text);
                doc.attach_unchecked(paragraph, leaf);
            }
        }
        // Initial construction is not an edit
        doc.pending.clear();
        doc
    }

    pub fn root(&self) -> NodeKey {
        self.root
    }

    /// Monotonic counter bumped by every non-empty commit
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn node(&self, key: NodeKey) -> Option<&Node> {
        self.nodes.get(&key)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains_key(&key)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks().is_empty()
    }

    pub fn node_type(&self, key: NodeKey) -> Option<NodeType> {
        self.node(key).map(Node::node_type)
    }

    pub fn parent(&self, key: NodeKey) -> Option<NodeKey> {
        self.node(key).and_then(|n| n.parent)
    }

    pub fn children(&self, key: NodeKey) -> &[NodeKey] {
        self.node(key).map(Node::children).unwrap_or(&[])
    }

    pub fn index_in_parent(&self, key: NodeKey) -> Option<usize> {
        let parent = self.parent(key)?;
        self.children(parent).iter().position(|c| *c == key)
    }

    pub fn previous_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let index = self.index_in_parent(key)?;
        index
            .checked_sub(1)
            .and_then(|i| self.children(parent).get(i).copied())
    }

    pub fn next_sibling(&self, key: NodeKey) -> Option<NodeKey> {
        let parent = self.parent(key)?;
        let index = self.index_in_parent(key)?;
        self.children(parent).get(index + 1).copied()
    }

    pub fn text(&self, key: NodeKey) -> Option<&str> {
        self.node(key).and_then(Node::text)
    }

    /// Length of a text node in chars (0 for anything else)
    pub fn text_len(&self, key: NodeKey) -> usize {
        self.text(key).map(char_len).unwrap_or(0)
    }

    pub fn is_text(&self, key: NodeKey) -> bool {
        self.node_type(key) == Some(NodeType::Text)
    }

    pub fn mark_ids(&self, key: NodeKey) -> Option<&BTreeSet<String>> {
        self.node(key).and_then(Node::mark_ids)
    }

    /// Concatenated text of a subtree
    pub fn text_content(&self, key: NodeKey) -> String {
        let mut out = String::new();
        self.collect_text(key, &mut out);
        out
    }

    fn collect_text(&self, key: NodeKey, out: &mut String) {
        match self.node(key) {
            Some(Node {
                kind: NodeKind::Text { text },
                ..
            }) => out.push_str(text),
            Some(node) => {
                for child in node.children() {
                    self.collect_text(*child, out);
                }
            }
            None => {}
        }
    }

    /// Top-level blocks (children of the root)
    pub fn blocks(&self) -> &[NodeKey] {
        self.children(self.root)
    }

    /// The top-level block containing `key`
    pub fn block_of(&self, key: NodeKey) -> Option<NodeKey> {
        let mut current = key;
        loop {
            let parent = self.parent(current)?;
            if parent == self.root {
                return Some(current);
            }
            current = parent;
        }
    }

    /// Plain text of the whole document, blocks separated by newlines
    pub fn plain_text(&self) -> String {
        self.blocks()
            .iter()
            .map(|block| self.text_content(*block))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Pre-order descendants of `key`, excluding `key` itself
    pub fn descendants(&self, key: NodeKey) -> Vec<NodeKey> {
        let mut out = Vec::new();
        let mut stack: Vec<NodeKey> = self.children(key).iter().rev().copied().collect();
        while let Some(next) = stack.pop() {
            out.push(next);
            stack.extend(self.children(next).iter().rev().copied());
        }
        out
    }

    /// Text leaves of a subtree in document order (the node itself if it is text)
    pub fn text_nodes_in(&self, key: NodeKey) -> Vec<NodeKey> {
        if self.is_text(key) {
            return vec![key];
        }
        self.descendants(key)
            .into_iter()
            .filter(|k| self.is_text(*k))
            .collect()
    }

    /// Every text leaf in document order
    pub fn text_nodes(&self) -> Vec<NodeKey> {
        self.text_nodes_in(self.root)
    }

    /// Every mark node in document order
    pub fn marks(&self) -> Vec<NodeKey> {
        self.descendants(self.root)
            .into_iter()
            .filter(|k| self.node_type(*k) == Some(NodeType::Mark))
            .collect()
    }

    pub fn first_text_in(&self, key: NodeKey) -> Option<NodeKey> {
        self.text_nodes_in(key).first().copied()
    }

    pub fn last_text_in(&self, key: NodeKey) -> Option<NodeKey> {
        self.text_nodes_in(key).last().copied()
    }

    /// Text leaf preceding `key` in document order
    pub fn previous_text(&self, key: NodeKey) -> Option<NodeKey> {
        let texts = self.text_nodes();
        let index = texts.iter().position(|k| *k == key)?;
        index.checked_sub(1).map(|i| texts[i])
    }

    /// Text leaf following `key` in document order
    pub fn next_text(&self, key: NodeKey) -> Option<NodeKey> {
        let texts = self.text_nodes();
        let index = texts.iter().position(|k| *k == key)?;
        texts.get(index + 1).copied()
    }

    /// Child-index path from the root to `key`
    pub fn path(&self, key: NodeKey) -> Option<Vec<usize>> {
        let mut path = Vec::new();
        let mut current = key;
        while current != self.root {
            path.push(self.index_in_parent(current)?);
            current = self.parent(current)?;
        }
        path.reverse();
        Some(path)
    }

    /// True when `ancestor` is `key` or one of its ancestors
    pub fn is_ancestor_or_self(&self, ancestor: NodeKey, key: NodeKey) -> bool {
        let mut current = Some(key);
        while let Some(k) = current {
            if k == ancestor {
                return true;
            }
            current = self.parent(k);
        }
        false
    }

    pub fn selection(&self) -> Option<&Selection> {
        self.selection.as_ref()
    }

    /// Replace the selection (selection changes are not tree mutations)
    pub fn set_selection(&mut self, selection: Option<Selection>) {
        self.selection = selection;
    }

    /// Map a char offset in a block's plain text to a tree point
    ///
    /// Offsets on a boundary between two text leaves resolve to the end of
    /// the earlier leaf. Offsets past the end clamp to the end of the block.
    pub fn point_at(&self, block_index: usize, offset: usize) -> Option<Point> {
        let block = *self.blocks().get(block_index)?;
        let texts = self.text_nodes_in(block);
        let Some(last) = texts.last().copied() else {
            return Some(Point::new(block, 0));
        };

        let mut consumed = 0;
        for text in &texts {
            let len = self.text_len(*text);
            if offset <= consumed + len {
                return Some(Point::new(*text, offset - consumed));
            }
            consumed += len;
        }
        Some(Point::new(last, self.text_len(last)))
    }

    /// Block index and plain-text offset of `point`; the inverse of
    /// [`point_at`](Self::point_at), stable across splits and wraps
    pub fn locate(&self, point: Point) -> Option<(usize, usize)> {
        let block = self.block_of(point.key)?;
        let index = self.blocks().iter().position(|b| *b == block)?;
        if !self.is_text(point.key) {
            return Some((index, 0));
        }

        let mut consumed = 0;
        for text in self.text_nodes_in(block) {
            let len = self.text_len(text);
            if text == point.key {
                return Some((index, consumed + point.offset.min(len)));
            }
            consumed += len;
        }
        None
    }

    /// Freeze the current tree
    pub fn snapshot(&self) -> DocumentSnapshot {
        let mut nodes: Vec<Node> = self.nodes.values().cloned().collect();
        nodes.sort_by_key(|n| n.key);
        DocumentSnapshot {
            root: self.root,
            version: self.version,
            nodes,
            selection: self.selection,
        }
    }

    /// Rebuild a document from a snapshot
    pub fn from_snapshot(snapshot: DocumentSnapshot) -> Result<Self, EditorError> {
        let next_key = snapshot.nodes.iter().map(|n| n.key.0).max().unwrap_or(0) + 1;
        let nodes: HashMap<NodeKey, Node> =
            snapshot.nodes.into_iter().map(|n| (n.key, n)).collect();
        if !nodes.contains_key(&snapshot.root) {
            return Err(EditorError::InvalidSnapshot(format!(
                "root {} missing",
                snapshot.root
            )));
        }
        Ok(Self {
            nodes,
            root: snapshot.root,
            next_key,
            version: snapshot.version,
            selection: snapshot.selection,
            pending: Vec::new(),
        })
    }

    /// Replace the tree with a snapshot, recording notifications for the swap
    ///
    /// Keys are never reused: the key counter only moves forward.
    pub fn restore(&mut self, snapshot: &DocumentSnapshot) {
        let incoming: HashMap<NodeKey, Node> = snapshot
            .nodes
            .iter()
            .cloned()
            .map(|n| (n.key, n))
            .collect();

        let mut removed: Vec<&Node> = self
            .nodes
            .values()
            .filter(|n| !incoming.contains_key(&n.key))
            .collect();
        removed.sort_by_key(|n| n.key);
        let mut notes: Vec<NodeMutation> = removed
            .into_iter()
            .map(|n| NodeMutation::new(n.key, n.node_type(), MutationKind::Destroyed))
            .collect();

        let mut restored: Vec<&Node> = incoming.values().collect();
        restored.sort_by_key(|n| n.key);
        for node in restored {
            let kind = match self.nodes.get(&node.key) {
                None => MutationKind::Created,
                Some(existing) if existing != node => MutationKind::Updated,
                Some(_) => continue,
            };
            notes.push(NodeMutation::new(node.key, node.node_type(), kind));
        }

        let max_key = incoming.keys().map(|k| k.0).max().unwrap_or(0);
        self.next_key = self.next_key.max(max_key + 1);
        self.nodes = incoming;
        self.root = snapshot.root;
        self.selection = snapshot.selection;
        self.pending.extend(notes);
    }

    /// Whether uncommitted mutations exist
    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Notifications recorded since the last commit
    pub fn pending(&self) -> &[NodeMutation] {
        &self.pending
    }

    /// Close the current edit transaction
    ///
    /// Returns the notification feed accumulated since the previous commit.
    /// The version only moves when something actually changed.
    pub fn commit(&mut self) -> Commit {
        let mutations = std::mem::take(&mut self.pending);
        if !mutations.is_empty() {
            self.version += 1;
        }
        Commit {
            version: self.version,
            mutations,
        }
    }

    pub(crate) fn alloc_key(&mut self) -> NodeKey {
        let key = NodeKey(self.next_key);
        self.next_key += 1;
        key
    }

    /// Attach without validation; only used while building fresh trees
    fn attach_unchecked(&mut self, parent: NodeKey, child: NodeKey) {
        if let Some(children) = self.nodes.get_mut(&parent).and_then(Node::children_mut) {
            children.push(child);
        }
        if let Some(node) = self.nodes.get_mut(&child) {
            node.parent = Some(parent);
        }
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_document_from_blocks() {
        let doc = Document::from_blocks(["Hello", "", "World"]);

        assert_eq!(doc.blocks().len(), 3);
        assert_eq!(doc.plain_text(), "Hello\n\nWorld");
        assert_eq!(doc.version(), 0);
        assert!(!doc.has_pending());
    }

    #[test]
    fn test_point_at_resolves_across_leaves() {
        let mut doc = Document::from_blocks(["Hello world"]);
        let text = doc.text_nodes()[0];
        let right = doc.split_text(text, 5).unwrap();

        assert_eq!(doc.point_at(0, 5), Some(Point::new(text, 5)));
        assert_eq!(doc.point_at(0, 6), Some(Point::new(right, 1)));
        assert_eq!(doc.point_at(0, 99), Some(Point::new(right, 6)));
    }

    #[test]
    fn test_locate_survives_a_split() {
        let mut doc = Document::from_blocks(["one", "Hello world"]);
        let text = doc.text_nodes()[1];
        let point = Point::new(text, 8);
        assert_eq!(doc.locate(point), Some((1, 8)));

        let right = doc.split_text(text, 5).unwrap();
        assert_eq!(doc.locate(Point::new(right, 3)), Some((1, 8)));
        assert_eq!(doc.point_at(1, 8), Some(Point::new(right, 3)));
        assert_eq!(doc.locate(Point::new(doc.blocks()[0], 0)), Some((0, 0)));
    }

    #[test]
    fn test_point_at_empty_block_is_element_point() {
        let doc = Document::from_blocks([""]);
        let block = doc.blocks()[0];
        assert_eq!(doc.point_at(0, 3), Some(Point::new(block, 0)));
        assert_eq!(doc.point_at(1, 0), None);
    }

    #[test]
    fn test_commit_bumps_version_only_on_change() {
        let mut doc = Document::from_blocks(["abc"]);
        assert_eq!(doc.commit().version, 0);

        let text = doc.text_nodes()[0];
        doc.set_text(text, "abcd").unwrap();
        let commit = doc.commit();

        assert_eq!(commit.version, 1);
        assert_eq!(commit.mutations_of(NodeType::Text).count(), 1);
        assert!(!doc.has_pending());
    }

    #[test]
    fn test_snapshot_round_trip_preserves_tree() {
        let doc = Document::from_blocks(["one", "two"]);
        let snapshot = doc.snapshot();
        let rebuilt = Document::from_snapshot(snapshot.clone()).unwrap();

        assert_eq!(rebuilt.plain_text(), "one\ntwo");
        assert_eq!(rebuilt.snapshot(), snapshot);
    }

    #[test]
    fn test_restore_reports_destroyed_and_created_nodes() {
        let mut doc = Document::from_blocks(["abc"]);
        let before = doc.snapshot();
        let text = doc.text_nodes()[0];
        doc.remove(text).unwrap();
        doc.commit();

        doc.restore(&before);
        let commit = doc.commit();

        assert_eq!(doc.plain_text(), "abc");
        assert!(commit
            .mutations
            .iter()
            .any(|m| m.key == text && m.kind == MutationKind::Created));
    }
}
