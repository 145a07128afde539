use anyhow::Result;
use clap::Args;
use colored::Colorize;
use redline_suggest::EngineConfig;
use std::path::{Path, PathBuf};

use crate::render;
use crate::script::{Script, Session, StepResult};

#[derive(Debug, Args)]
pub struct ReplayArgs {
    /// Edit script (JSON)
    pub script: PathBuf,

    /// Config file; defaults to redline.config.json in the working directory
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Print every step as it runs
    #[arg(short, long)]
    pub trace: bool,

    /// Print thread events
    #[arg(short, long)]
    pub events: bool,

    /// Print the final document as plain text too
    #[arg(long)]
    pub plain: bool,
}

pub fn replay(args: ReplayArgs, cwd: &Path) -> Result<()> {
    let config = match &args.config {
        Some(path) => EngineConfig::load_file(cwd.join(path))?,
        None => EngineConfig::load(cwd)?,
    };
    let script = Script::load(cwd.join(&args.script))?;

    println!(
        "{} {} ({} steps)",
        "▶".bright_blue(),
        args.script.display().to_string().bright_white(),
        script.steps.len()
    );

    let mut session = Session::new(&script, config);
    for (i, step) in script.steps.iter().enumerate() {
        let result = session.step(step)?;
        if args.trace {
            println!("  {:>3} {:<12} {}", i + 1, step.name(), describe(&result));
        }
    }

    let editor = session.editor();
    println!();
    println!("{}", "Document".bold());
    println!("{}", render::document(editor));
    if args.plain {
        println!();
        println!("{}", editor.plain_text());
    }

    println!();
    println!("{}", "Suggestions".bold());
    println!("{}", render::suggestions(editor));

    if args.events {
        println!();
        println!("{}", "Thread events".bold());
        for event in session.events() {
            println!("{}", render::event(&event));
        }
    }

    Ok(())
}

fn describe(result: &StepResult) -> String {
    match result {
        StepResult::Edited { commands, tracked } if tracked == commands => format!("{tracked} tracked"),
        StepResult::Edited { commands, tracked } => {
            format!("{tracked}/{commands} tracked").yellow().to_string()
        }
        StepResult::Resolved { suggestion_id, outcome } if outcome.is_applied() => {
            format!("{suggestion_id} {outcome:?}").green().to_string()
        }
        StepResult::Resolved { suggestion_id, outcome } => {
            format!("{suggestion_id} {outcome:?}").red().to_string()
        }
        StepResult::History(true) => "done".to_string(),
        StepResult::History(false) => "nothing to do".dimmed().to_string(),
        StepResult::Settled => String::new(),
    }
}
