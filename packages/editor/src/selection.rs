//! Selection points and ranges.
//!
//! A [`Point`] addresses either a char offset inside a text node or a child
//! index inside a container. Points are plain values: they are not adjusted
//! when the tree changes, so a point may go stale (missing key, offset past
//! the end) and consumers must re-validate before use.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::document::{Document, NodeKey};

/// A position in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    pub key: NodeKey,
    pub offset: usize,
}

impl Point {
    pub fn new(key: NodeKey, offset: usize) -> Self {
        Self { key, offset }
    }
}

/// Anchor/focus pair; anchor is where the selection started
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point,
            focus: point,
        }
    }

    pub fn range(anchor: Point, focus: Point) -> Self {
        Self { anchor, focus }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

impl Document {
    /// Order two points in document order
    ///
    /// Returns `None` when either key no longer resolves.
    pub fn compare_points(&self, a: Point, b: Point) -> Option<Ordering> {
        let mut left = self.path(a.key)?;
        left.push(a.offset);
        let mut right = self.path(b.key)?;
        right.push(b.offset);
        Some(left.cmp(&right))
    }

    /// True when the focus precedes the anchor
    pub fn is_backward(&self, selection: &Selection) -> bool {
        matches!(
            self.compare_points(selection.anchor, selection.focus),
            Some(Ordering::Greater)
        )
    }

    /// Whether every key referenced by the selection still exists
    pub fn selection_is_live(&self, selection: &Selection) -> bool {
        self.contains(selection.anchor.key) && self.contains(selection.focus.key)
    }
}
