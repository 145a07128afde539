//! Terminal rendering of a tracked document.

use colored::{ColoredString, Colorize};
use redline_suggest::{block_spans, Editor, Span, SuggestionState, ThreadEvent};

fn paint(span: &Span) -> ColoredString {
    match (span.inserted, span.deleted) {
        (false, false) => span.text.normal(),
        (true, false) => format!("{{+{}+}}", span.text).green().underline(),
        (false, true) => format!("[-{}-]", span.text).red().strikethrough(),
        (true, true) => format!("[-{{+{}+}}-]", span.text).yellow().strikethrough(),
    }
}

/// One line per block, with insertions and deletions marked up
pub fn document(editor: &Editor) -> String {
    block_spans(editor.document())
        .iter()
        .enumerate()
        .map(|(i, spans)| {
            let body: String = spans.iter().map(|span| paint(span).to_string()).collect();
            format!("{} {}", format!("{i:>3} │").dimmed(), body)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn state(state: SuggestionState) -> ColoredString {
    match state {
        SuggestionState::Open => "open".bright_blue(),
        SuggestionState::Accepted => "accepted".green(),
        SuggestionState::Rejected => "rejected".red(),
    }
}

fn quoted(text: &str) -> String {
    const MAX: usize = 32;
    if text.chars().count() > MAX {
        let head: String = text.chars().take(MAX - 1).collect();
        format!("\"{head}…\"")
    } else {
        format!("\"{text}\"")
    }
}

/// Suggestion records, oldest first
pub fn suggestions(editor: &Editor) -> String {
    let engine = editor.engine();
    let records = engine.store().all();
    if records.is_empty() {
        return format!("  {}", "No suggestions".dimmed());
    }

    records
        .iter()
        .enumerate()
        .map(|(i, record)| {
            let text = engine.preview_text(editor.document(), &record.id);
            format!(
                "  #{:<3} {:<24} {:<8} {:<9} {:<12} {}",
                i + 1,
                record.id.bright_white(),
                record.suggestion_type.as_str(),
                state(record.state),
                record.author_name,
                quoted(&text)
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn event(event: &ThreadEvent) -> String {
    match event {
        ThreadEvent::Created {
            suggestion_id,
            label,
            text,
        } => format!("  {} {suggestion_id} {label} {}", "+".green(), quoted(text)),
        ThreadEvent::TextChanged { suggestion_id, text } => {
            format!("  {} {suggestion_id} {}", "~".yellow(), quoted(text))
        }
        ThreadEvent::Resolved { suggestion_id, state: s } => {
            format!("  {} {suggestion_id} {}", "✓".green(), state(*s))
        }
        ThreadEvent::Discarded { suggestion_id } => format!("  {} {suggestion_id} discarded", "✗".red()),
        ThreadEvent::Reopened { suggestion_id } => format!("  {} {suggestion_id} reopened", "↺".bright_blue()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redline_suggest::{Author, EditCommand, EngineConfig};

    fn plain() {
        colored::control::set_override(false);
    }

    #[test]
    fn test_document_marks_spans() {
        plain();
        let config = EngineConfig {
            suggest_mode: true,
            ..EngineConfig::default()
        };
        let mut editor = Editor::from_blocks(["ab", "cd"], config, 1);
        editor.set_author(Some(Author::new("ada", "Ada")));
        editor.select(0, 2, 2);
        editor.dispatch(EditCommand::InsertText { text: "x".into() });

        assert_eq!(document(&editor), "  0 │ ab{+x+}\n  1 │ cd");
        assert!(suggestions(&editor).contains("insert"));
        assert!(suggestions(&editor).contains("\"x\""));
    }

    #[test]
    fn test_empty_table() {
        plain();
        let editor = Editor::from_blocks(["ab"], EngineConfig::default(), 1);
        assert_eq!(suggestions(&editor), "  No suggestions");
    }

    #[test]
    fn test_long_text_is_cut() {
        let quoted = quoted(&"a".repeat(40));
        assert_eq!(quoted.chars().count(), 34);
        assert!(quoted.ends_with("…\""));
    }
}
