use anyhow::Result;
use clap::Args;
use colored::Colorize;
use redline_suggest::config::DEFAULT_CONFIG_NAME;
use redline_suggest::{EngineConfig, MissingAuthorPolicy};
use std::fs;
use std::path::Path;

pub const EXAMPLE_SCRIPT_NAME: &str = "example.redline.json";

const EXAMPLE_SCRIPT: &str = r##"{
  "blocks": ["The quick brown fox", "jumps over the lazy dog"],
  "steps": [
    { "op": "suggestMode", "on": true },
    { "op": "author", "id": "ada", "name": "Ada" },
    { "op": "select", "block": 0, "start": 4, "end": 9 },
    { "op": "type", "text": "slow" },
    { "op": "select", "block": 1, "start": 11, "end": 15 },
    { "op": "backspace" },
    { "op": "author", "id": "bob", "name": "Bob" },
    { "op": "select", "block": 1, "start": 23 },
    { "op": "paste", "text": " again" },
    { "op": "author", "id": "ada", "name": "Ada" },
    { "op": "accept", "suggestion": "#1" }
  ]
}
"##;

#[derive(Debug, Args)]
pub struct InitArgs {
    /// Start new editors in suggest mode
    #[arg(long)]
    pub suggest_mode: bool,

    /// Drop suggest-mode edits from users without an identity instead of applying them
    #[arg(long)]
    pub drop_anonymous: bool,

    /// Logical document id used for replication and id seeding
    #[arg(long, default_value = "default")]
    pub document_id: String,

    /// Force overwrite existing config
    #[arg(short, long)]
    pub force: bool,
}

pub fn init(args: InitArgs, cwd: &Path) -> Result<()> {
    let config_path = cwd.join(DEFAULT_CONFIG_NAME);

    if config_path.exists() && !args.force {
        println!(
            "{} {} already exists",
            "⚠️".yellow(),
            DEFAULT_CONFIG_NAME.bright_white()
        );
        println!("Use --force to overwrite");
        return Ok(());
    }

    println!("{}", "📝 Initializing redline workspace...".bright_blue().bold());

    let config = EngineConfig {
        suggest_mode: args.suggest_mode,
        missing_author: if args.drop_anonymous {
            MissingAuthorPolicy::Drop
        } else {
            MissingAuthorPolicy::Fallthrough
        },
        document_id: args.document_id,
        ..EngineConfig::default()
    };
    fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;
    println!("  {} Created {}", "✓".green(), DEFAULT_CONFIG_NAME);

    let example = cwd.join(EXAMPLE_SCRIPT_NAME);
    if !example.exists() {
        fs::write(&example, EXAMPLE_SCRIPT)?;
        println!("  {} Created {}", "✓".green(), EXAMPLE_SCRIPT_NAME);
    }

    println!();
    println!("Next steps:");
    println!("  1. Edit {EXAMPLE_SCRIPT_NAME}");
    println!("  2. Run: redline replay {EXAMPLE_SCRIPT_NAME}");

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::Script;

    #[test]
    fn test_init_writes_config_and_example() {
        let dir = tempfile::tempdir().unwrap();
        let args = InitArgs {
            suggest_mode: true,
            drop_anonymous: true,
            document_id: "doc-7".into(),
            force: false,
        };
        init(args, dir.path()).unwrap();

        let config = EngineConfig::load(dir.path()).unwrap();
        assert!(config.suggest_mode);
        assert_eq!(config.missing_author, MissingAuthorPolicy::Drop);
        assert_eq!(config.document_id, "doc-7");

        let script = Script::load(dir.path().join(EXAMPLE_SCRIPT_NAME)).unwrap();
        assert_eq!(script.blocks.len(), 2);
        assert_eq!(script.steps.len(), 11);
    }

    #[test]
    fn test_init_keeps_existing_config_without_force() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join(DEFAULT_CONFIG_NAME), r#"{ "mergeWindowMs": 10 }"#).unwrap();

        let args = InitArgs {
            suggest_mode: false,
            drop_anonymous: false,
            document_id: "default".into(),
            force: false,
        };
        init(args, dir.path()).unwrap();

        assert_eq!(EngineConfig::load(dir.path()).unwrap().merge_window_ms, 10);
        assert!(!dir.path().join(EXAMPLE_SCRIPT_NAME).exists());
    }
}
