//! Mark merge engine and annotation span helpers.
//!
//! Two marks are mergeable when they carry the same set of
//! `(suggestion id, kind)` pairs. Thread references and foreign decorations do
//! not affect equality and are unioned into the survivor on merge. Marks that
//! carry no suggestion annotation at all only merge when their full id sets
//! are identical.

use std::collections::BTreeSet;

use redline_editor::{Document, MutationError, Node, NodeKey, NodeType, Point};

use crate::annotation::{signature, AnnotationId};

pub fn can_merge(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    let (left, right) = (signature(a), signature(b));
    if left.is_empty() && right.is_empty() {
        return a == b;
    }
    left == right
}

pub fn is_mark(doc: &Document, key: NodeKey) -> bool {
    doc.node_type(key) == Some(NodeType::Mark)
}

fn mergeable(doc: &Document, a: NodeKey, b: NodeKey) -> bool {
    match (doc.mark_ids(a), doc.mark_ids(b)) {
        (Some(left), Some(right)) => can_merge(left, right),
        _ => false,
    }
}

/// Fold `from` into `into`, which must precede it
fn absorb(doc: &mut Document, into: NodeKey, from: NodeKey) -> Result<(), MutationError> {
    doc.move_children(from, into)?;
    let ids = doc.mark_ids(from).cloned().unwrap_or_default();
    for id in ids {
        doc.add_mark_id(into, id)?;
    }
    doc.remove(from)
}

/// Merge `mark` with equal siblings on both sides; returns the surviving mark
pub fn merge_around(doc: &mut Document, mark: NodeKey) -> Result<NodeKey, MutationError> {
    let mut survivor = mark;
    while let Some(prev) = doc.previous_sibling(survivor) {
        if !mergeable(doc, prev, survivor) {
            break;
        }
        absorb(doc, prev, survivor)?;
        survivor = prev;
    }
    while let Some(next) = doc.next_sibling(survivor) {
        if !mergeable(doc, survivor, next) {
            break;
        }
        absorb(doc, survivor, next)?;
    }
    Ok(survivor)
}

/// Clear degenerate marks among `parent`'s children
///
/// Childless marks are removed; marks with no ids or no text are unwrapped so
/// any leaves they hold stay in place. Returns the number of marks dissolved.
pub fn dissolve_empty(doc: &mut Document, parent: NodeKey) -> Result<usize, MutationError> {
    let mut dissolved = 0;
    loop {
        let mut changed = false;
        for child in doc.children(parent).to_vec() {
            let Some(ids) = doc.mark_ids(child) else {
                continue;
            };
            if doc.children(child).is_empty() {
                doc.remove(child)?;
            } else if ids.is_empty() || doc.text_content(child).is_empty() {
                doc.unwrap(child)?;
            } else {
                continue;
            }
            changed = true;
            dissolved += 1;
        }
        if !changed {
            return Ok(dissolved);
        }
    }
}

/// Dissolve and merge the direct children of `parent`
pub fn normalize_children(doc: &mut Document, parent: NodeKey) -> Result<(), MutationError> {
    dissolve_empty(doc, parent)?;
    let mut i = 0;
    loop {
        let children = doc.children(parent);
        if i + 1 >= children.len() {
            return Ok(());
        }
        let (a, b) = (children[i], children[i + 1]);
        if mergeable(doc, a, b) {
            absorb(doc, a, b)?;
        } else {
            i += 1;
        }
    }
}

/// Restore the mark invariants over the whole tree
///
/// Running it on an already normalized tree changes nothing.
pub fn normalize_tree(doc: &mut Document) -> Result<(), MutationError> {
    let root = doc.root();
    let containers: Vec<NodeKey> = std::iter::once(root)
        .chain(doc.descendants(root))
        .filter(|key| doc.node(*key).is_some_and(Node::is_container))
        .collect();
    for parent in containers {
        if doc.contains(parent) {
            normalize_children(doc, parent)?;
        }
    }
    Ok(())
}

/// Give `text` a mark of its own by splitting its enclosing mark around it
///
/// Returns `None` when the text is not directly inside a mark.
pub fn isolate(doc: &mut Document, text: NodeKey) -> Result<Option<NodeKey>, MutationError> {
    let Some(mark) = doc.parent(text).filter(|p| is_mark(doc, *p)) else {
        return Ok(None);
    };
    let index = doc.index_in_parent(text).ok_or(MutationError::Detached(text))?;
    let count = doc.children(mark).len();
    if index + 1 < count {
        doc.split_container(mark, index + 1)?;
    }
    if index > 0 {
        return doc.split_container(mark, index).map(Some);
    }
    Ok(Some(mark))
}

/// Add `id` to the mark covering exactly `text`, creating one if needed
pub fn annotate_leaf(doc: &mut Document, text: NodeKey, id: &str) -> Result<NodeKey, MutationError> {
    match isolate(doc, text)? {
        Some(mark) => {
            doc.add_mark_id(mark, id)?;
            Ok(mark)
        }
        None => doc.wrap(text, text, [id]),
    }
}

/// Split text leaves so `[start, end)` is covered by whole leaves
///
/// Returns the covered non-empty leaves in document order.
pub fn split_range(doc: &mut Document, start: Point, end: Point) -> Result<Vec<NodeKey>, MutationError> {
    if start.key == end.key {
        let (from, to) = (start.offset.min(end.offset), start.offset.max(end.offset));
        if from == to {
            return Ok(Vec::new());
        }
        if to < doc.text_len(start.key) {
            doc.split_text(start.key, to)?;
        }
        let middle = if from > 0 {
            doc.split_text(start.key, from)?
        } else {
            start.key
        };
        return Ok(vec![middle]);
    }

    let texts = doc.text_nodes();
    let from = texts.iter().position(|k| *k == start.key);
    let to = texts.iter().position(|k| *k == end.key);
    let (Some(from), Some(to)) = (from, to) else {
        return Ok(Vec::new());
    };
    if from > to {
        return Ok(Vec::new());
    }

    let mut covered = Vec::new();
    let start_len = doc.text_len(start.key);
    if start.offset == 0 {
        covered.push(start.key);
    } else if start.offset < start_len {
        covered.push(doc.split_text(start.key, start.offset)?);
    }
    covered.extend(texts[from + 1..to].iter().copied());
    if end.offset > 0 {
        if end.offset < doc.text_len(end.key) {
            doc.split_text(end.key, end.offset)?;
        }
        covered.push(end.key);
    }

    covered.retain(|key| doc.text_len(*key) > 0);
    Ok(covered)
}

/// Insert `content` in a new mark carrying `id` at a text point
///
/// The new mark never nests inside another mark: an enclosing mark is split
/// at the insertion point. Returns the new mark and its text leaf.
pub fn insert_marked_text(
    doc: &mut Document,
    at: Point,
    content: &str,
    id: &str,
) -> Result<(NodeKey, NodeKey), MutationError> {
    let len = doc.text_len(at.key);
    let offset = at.offset.min(len);
    let mut before = offset == 0 && len > 0;
    if offset > 0 && offset < len {
        doc.split_text(at.key, offset)?;
    }

    let mut reference = at.key;
    while let Some(mark) = doc.parent(reference).filter(|p| is_mark(doc, *p)) {
        let index = doc
            .index_in_parent(reference)
            .ok_or(MutationError::Detached(reference))?;
        let count = doc.children(mark).len();
        reference = if before {
            if index == 0 {
                mark
            } else {
                doc.split_container(mark, index)?
            }
        } else {
            if index + 1 < count {
                doc.split_container(mark, index + 1)?;
            }
            mark
        };
    }

    let mark = doc.create_mark([id]);
    let leaf = doc.create_text(content);
    doc.append_child(mark, leaf)?;
    if before {
        doc.insert_before(reference, mark)?;
    } else {
        doc.insert_after(reference, mark)?;
    }
    Ok((mark, leaf))
}

/// Remove every id referencing `suggestion_id`; unwraps the mark if none remain
///
/// Returns whether the mark survived.
pub fn strip_suggestion(doc: &mut Document, mark: NodeKey, suggestion_id: &str) -> Result<bool, MutationError> {
    let ids: Vec<String> = doc
        .mark_ids(mark)
        .ok_or(MutationError::NotAMark(mark))?
        .iter()
        .filter(|raw| AnnotationId::parse(raw).suggestion_id() == Some(suggestion_id))
        .cloned()
        .collect();
    for id in ids {
        doc.remove_mark_id(mark, &id)?;
    }
    if doc.mark_ids(mark).is_some_and(BTreeSet::is_empty) {
        doc.unwrap(mark)?;
        return Ok(false);
    }
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn set(ids: &[&str]) -> BTreeSet<String> {
        ids.iter().map(|s| s.to_string()).collect()
    }

    /// Paragraph of one text per piece, each wrapped in a mark when ids are given
    fn paragraph(pieces: &[(&str, &[&str])]) -> (Document, NodeKey) {
        let mut doc = Document::from_blocks([""]);
        let block = doc.blocks()[0];
        for (text, ids) in pieces {
            let leaf = doc.create_text(*text);
            if ids.is_empty() {
                doc.append_child(block, leaf).unwrap();
            } else {
                let mark = doc.create_mark(ids.iter().copied());
                doc.append_child(mark, leaf).unwrap();
                doc.append_child(block, mark).unwrap();
            }
        }
        doc.commit();
        (doc, block)
    }

    #[test]
    fn test_can_merge_compares_suggestion_pairs_only() {
        assert!(can_merge(
            &set(&["suggestion:a:insert", "suggestion:a"]),
            &set(&["suggestion:a:insert", "comment:1"])
        ));
        assert!(!can_merge(
            &set(&["suggestion:a:insert"]),
            &set(&["suggestion:a:delete"])
        ));
        assert!(!can_merge(&set(&["comment:1"]), &set(&["comment:2"])));
        assert!(can_merge(&set(&["comment:1"]), &set(&["comment:1"])));
    }

    #[test]
    fn test_merge_around_joins_both_sides() {
        let ins: &[&str] = &["suggestion:a:insert"];
        let (mut doc, block) = paragraph(&[("x", ins), ("y", ins), ("z", ins)]);
        let middle = doc.children(block)[1];

        let survivor = merge_around(&mut doc, middle).unwrap();
        assert_eq!(doc.children(block), &[survivor]);
        assert_eq!(doc.text_content(survivor), "xyz");
    }

    #[test]
    fn test_merge_unions_non_suggestion_ids() {
        let (mut doc, block) = paragraph(&[
            ("x", &["suggestion:a:insert", "suggestion:a"]),
            ("y", &["suggestion:a:insert"]),
        ]);
        let second = doc.children(block)[1];

        let survivor = merge_around(&mut doc, second).unwrap();
        assert_eq!(
            doc.mark_ids(survivor).unwrap(),
            &set(&["suggestion:a", "suggestion:a:insert"])
        );
    }

    #[test]
    fn test_different_suggestions_stay_apart() {
        let (mut doc, block) = paragraph(&[
            ("x", &["suggestion:a:insert"]),
            ("y", &["suggestion:b:insert"]),
        ]);
        let second = doc.children(block)[1];
        merge_around(&mut doc, second).unwrap();
        assert_eq!(doc.children(block).len(), 2);
    }

    #[test]
    fn test_normalize_tree_is_idempotent() {
        let (mut doc, block) = paragraph(&[
            ("a", &["suggestion:s:delete"]),
            ("b", &["suggestion:s:delete"]),
            ("c", &[]),
            ("d", &["suggestion:t:insert"]),
        ]);
        let empty = doc.create_mark(Vec::<String>::new());
        let leaf = doc.create_text("e");
        doc.append_child(empty, leaf).unwrap();
        doc.append_child(block, empty).unwrap();
        let childless = doc.create_mark(["suggestion:u:insert"]);
        doc.append_child(block, childless).unwrap();

        normalize_tree(&mut doc).unwrap();
        let once = doc.snapshot().nodes;
        doc.commit();

        normalize_tree(&mut doc).unwrap();
        assert!(!doc.has_pending());
        assert_eq!(doc.snapshot().nodes, once);
        assert_eq!(doc.children(block).len(), 4);
        assert_eq!(doc.plain_text(), "abcde");
    }

    #[test]
    fn test_split_range_within_one_leaf() {
        let mut doc = Document::from_blocks(["abcdef"]);
        let text = doc.text_nodes()[0];

        let covered = split_range(&mut doc, Point::new(text, 2), Point::new(text, 4)).unwrap();
        assert_eq!(covered.len(), 1);
        assert_eq!(doc.text(covered[0]), Some("cd"));
        assert_eq!(doc.plain_text(), "abcdef");
    }

    #[test]
    fn test_split_range_across_blocks() {
        let mut doc = Document::from_blocks(["abc", "def"]);
        let texts = doc.text_nodes();

        let covered = split_range(&mut doc, Point::new(texts[0], 1), Point::new(texts[1], 2)).unwrap();
        let pieces: Vec<&str> = covered.iter().filter_map(|k| doc.text(*k)).collect();
        assert_eq!(pieces, vec!["bc", "de"]);
    }

    #[test]
    fn test_annotate_leaf_inside_foreign_mark() {
        let (mut doc, block) = paragraph(&[("abc", &["suggestion:b:insert"])]);
        let text = doc.text_nodes()[0];
        let covered = split_range(&mut doc, Point::new(text, 1), Point::new(text, 2)).unwrap();

        let mark = annotate_leaf(&mut doc, covered[0], "suggestion:a:delete").unwrap();
        assert_eq!(doc.children(block).len(), 3);
        assert_eq!(doc.text_content(mark), "b");
        assert_eq!(
            doc.mark_ids(mark).unwrap(),
            &set(&["suggestion:a:delete", "suggestion:b:insert"])
        );
    }

    #[test]
    fn test_insert_marked_text_splits_enclosing_mark() {
        let (mut doc, block) = paragraph(&[("abcd", &["comment:1"])]);
        let text = doc.text_nodes()[0];

        let (mark, leaf) = insert_marked_text(&mut doc, Point::new(text, 2), "X", "suggestion:s:insert").unwrap();
        assert_eq!(doc.parent(mark), Some(block));
        assert_eq!(doc.text(leaf), Some("X"));
        assert_eq!(doc.children(block).len(), 3);
        assert_eq!(doc.plain_text(), "abXcd");
    }

    #[test]
    fn test_insert_marked_text_at_leaf_start() {
        let mut doc = Document::from_blocks(["abc"]);
        let text = doc.text_nodes()[0];

        insert_marked_text(&mut doc, Point::new(text, 0), "X", "suggestion:s:insert").unwrap();
        assert_eq!(doc.plain_text(), "Xabc");
    }

    #[test]
    fn test_strip_suggestion_unwraps_when_empty() {
        let (mut doc, block) = paragraph(&[("abc", &["suggestion:s:insert", "suggestion:s"])]);
        let mark = doc.children(block)[0];

        assert!(!strip_suggestion(&mut doc, mark, "s").unwrap());
        assert!(!doc.contains(mark));
        assert_eq!(doc.plain_text(), "abc");
    }
}
