//! Visitor pattern for traversing the document tree
//!
//! Default implementations walk the entire subtree in document order.
//! Override specific `visit_*` methods to act on nodes; call the matching
//! `walk_*` function to keep descending.

use std::collections::BTreeSet;

use crate::document::{Document, NodeKey, NodeKind};

pub trait Visitor: Sized {
    fn visit_node(&mut self, doc: &Document, key: NodeKey) {
        walk_node(self, doc, key);
    }

    fn visit_element(&mut self, doc: &Document, key: NodeKey, _tag: &str) {
        walk_children(self, doc, key);
    }

    fn visit_text(&mut self, _doc: &Document, _key: NodeKey, _text: &str) {
        // Leaf node, no children to walk
    }

    fn visit_mark(&mut self, doc: &Document, key: NodeKey, _ids: &BTreeSet<String>) {
        walk_children(self, doc, key);
    }
}

pub fn walk_node<V: Visitor>(visitor: &mut V, doc: &Document, key: NodeKey) {
    let Some(node) = doc.node(key) else {
        return;
    };
    match &node.kind {
        NodeKind::Element { tag, .. } => visitor.visit_element(doc, key, tag),
        NodeKind::Text { text } => visitor.visit_text(doc, key, text),
        NodeKind::Mark { ids, .. } => visitor.visit_mark(doc, key, ids),
    }
}

pub fn walk_children<V: Visitor>(visitor: &mut V, doc: &Document, key: NodeKey) {
    for child in doc.children(key) {
        visitor.visit_node(doc, *child);
    }
}

/// Walk the whole document from the root
pub fn walk_document<V: Visitor>(visitor: &mut V, doc: &Document) {
    visitor.visit_node(doc, doc.root());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Default)]
    struct MarkedText {
        marked: String,
        unmarked: String,
        depth: usize,
    }

    impl Visitor for MarkedText {
        fn visit_text(&mut self, _doc: &Document, _key: NodeKey, text: &str) {
            if self.depth > 0 {
                self.marked.push_str(text);
            } else {
                self.unmarked.push_str(text);
            }
        }

        fn visit_mark(&mut self, doc: &Document, key: NodeKey, _ids: &BTreeSet<String>) {
            self.depth += 1;
            walk_children(self, doc, key);
            self.depth -= 1;
        }
    }

    #[test]
    fn test_visitor_sees_marks_and_text() {
        let mut doc = Document::from_blocks(["Hello world"]);
        let text = doc.text_nodes()[0];
        let tail = doc.split_text(text, 6).unwrap();
        doc.wrap(tail, tail, ["m"]).unwrap();

        let mut visitor = MarkedText::default();
        walk_document(&mut visitor, &doc);

        assert_eq!(visitor.unmarked, "Hello ");
        assert_eq!(visitor.marked, "world");
    }
}
