//! Selection normalization.
//!
//! Maps raw selection endpoints, which may address a container child index,
//! to positions inside text leaves so the interception logic only ever deals
//! with text points.

use std::cmp::Ordering;

use redline_editor::{Document, Point, Selection};

/// Ordered pair of text points
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextRange {
    pub start: Point,
    pub end: Point,
    /// Focus preceded anchor in the raw selection
    pub backward: bool,
}

impl TextRange {
    pub fn is_collapsed(&self) -> bool {
        self.start == self.end
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Bias {
    /// Prefer the end of the preceding text
    Before,
    /// Prefer the start of the following text
    After,
}

/// Resolve a selection to text points; `None` when no text surrounds it
pub fn normalize_selection(doc: &Document, selection: &Selection) -> Option<TextRange> {
    if selection.is_collapsed() {
        let bias = if selection.anchor.offset > 0 {
            Bias::Before
        } else {
            Bias::After
        };
        let point = resolve_point(doc, selection.anchor, bias)?;
        return Some(TextRange {
            start: point,
            end: point,
            backward: false,
        });
    }

    let backward = doc.is_backward(selection);
    let (first, second) = if backward {
        (selection.focus, selection.anchor)
    } else {
        (selection.anchor, selection.focus)
    };
    let start = resolve_point(doc, first, Bias::Before)?;
    let end = resolve_point(doc, second, Bias::After)?;

    // Resolution can reorder points that straddle an empty container
    let (start, end) = match doc.compare_points(start, end) {
        Some(Ordering::Greater) => (end, start),
        Some(_) => (start, end),
        None => return None,
    };
    Some(TextRange {
        start,
        end,
        backward,
    })
}

/// Resolve a single caret point
pub fn normalize_point(doc: &Document, point: Point) -> Option<Point> {
    normalize_selection(doc, &Selection::collapsed(point)).map(|range| range.start)
}

fn resolve_point(doc: &Document, point: Point, bias: Bias) -> Option<Point> {
    doc.node(point.key)?;
    if doc.is_text(point.key) {
        let len = doc.text_len(point.key);
        return Some(Point::new(point.key, point.offset.min(len)));
    }

    let children = doc.children(point.key);
    let index = point.offset.min(children.len());
    let before = children[..index]
        .iter()
        .rev()
        .find_map(|child| doc.last_text_in(*child))
        .map(|text| Point::new(text, doc.text_len(text)));
    let after = children[index..]
        .iter()
        .find_map(|child| doc.first_text_in(*child))
        .map(|text| Point::new(text, 0));

    match bias {
        Bias::Before => before.or(after),
        Bias::After => after.or(before),
    }
}
