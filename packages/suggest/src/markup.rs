//! Inline rendering of suggestions as text markup.
//!
//! Pending insertions render as `{+text+}` and pending deletions as
//! `[-text-]`; text that is both (an insertion someone proposed deleting)
//! renders as `[-{+text+}-]`. Blocks are separated by newlines.

use redline_editor::{Document, NodeKey};

use crate::annotation::{AnnotationId, AnnotationKind};

/// A run of text leaves sharing the same annotation sides
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub text: String,
    pub inserted: bool,
    pub deleted: bool,
}

impl Span {
    pub fn is_plain(&self) -> bool {
        !self.inserted && !self.deleted
    }
}

fn sides(doc: &Document, text: NodeKey) -> (bool, bool) {
    let mut inserted = false;
    let mut deleted = false;
    let mut current = doc.parent(text);
    while let Some(key) = current {
        if let Some(ids) = doc.mark_ids(key) {
            for raw in ids {
                match AnnotationId::parse(raw).kind() {
                    Some(AnnotationKind::Insert) => inserted = true,
                    Some(AnnotationKind::Delete) => deleted = true,
                    None => {}
                }
            }
        }
        current = doc.parent(key);
    }
    (inserted, deleted)
}

/// Spans of each block, adjacent leaves with equal sides joined
pub fn block_spans(doc: &Document) -> Vec<Vec<Span>> {
    doc.blocks()
        .iter()
        .map(|block| {
            let mut spans: Vec<Span> = Vec::new();
            for leaf in doc.text_nodes_in(*block) {
                let text = doc.text(leaf).unwrap_or_default();
                if text.is_empty() {
                    continue;
                }
                let (inserted, deleted) = sides(doc, leaf);
                match spans.last_mut() {
                    Some(last) if last.inserted == inserted && last.deleted == deleted => {
                        last.text.push_str(text);
                    }
                    _ => spans.push(Span {
                        text: text.to_string(),
                        inserted,
                        deleted,
                    }),
                }
            }
            spans
        })
        .collect()
}

pub fn markup(doc: &Document) -> String {
    block_spans(doc)
        .iter()
        .map(|spans| {
            spans
                .iter()
                .map(|span| match (span.inserted, span.deleted) {
                    (false, false) => span.text.clone(),
                    (true, false) => format!("{{+{}+}}", span.text),
                    (false, true) => format!("[-{}-]", span.text),
                    (true, true) => format!("[-{{+{}+}}-]", span.text),
                })
                .collect::<String>()
        })
        .collect::<Vec<_>>()
        .join("\n")
}
