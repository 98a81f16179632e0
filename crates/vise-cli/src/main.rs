//! Vise CLI
//!
//! Runs line-delimited JSON command batches against a fresh workbench and
//! reports per-line outcomes. One bad line never aborts a batch; the exit
//! code reflects whether every line succeeded.

use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

use vise_core::Workbench;

#[derive(Parser)]
#[command(name = "vise")]
#[command(author, version, about = "Graph-structured constraint workbench")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a JSONL command batch against a fresh workbench.
    Run {
        /// Batch file; `-` reads stdin.
        input: PathBuf,
        /// Emit raw JSON outcome lines instead of the readable report.
        #[arg(long)]
        json: bool,
        /// Write the final workbench state as JSON.
        #[arg(long, value_name = "FILE")]
        state_out: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run {
            input,
            json,
            state_out,
        } => cmd_run(&input, json, state_out.as_deref()),
    }
}

fn cmd_run(input: &std::path::Path, json: bool, state_out: Option<&std::path::Path>) -> Result<()> {
    let batch = if input.as_os_str() == "-" {
        let mut text = String::new();
        io::stdin()
            .read_to_string(&mut text)
            .context("reading batch from stdin")?;
        text
    } else {
        fs::read_to_string(input).with_context(|| format!("reading {}", input.display()))?
    };

    let mut wb = Workbench::new();
    let outcomes = wb.run_batch(&batch);

    let mut failed = 0usize;
    for (index, outcome) in outcomes.iter().enumerate() {
        if !outcome.ok {
            failed += 1;
        }
        if json {
            println!("{}", serde_json::to_string(outcome)?);
            continue;
        }
        let op = outcome.op.as_deref().unwrap_or("?");
        if outcome.ok {
            let result = outcome
                .result
                .as_ref()
                .map(compact)
                .unwrap_or_default();
            println!("{} {:<2} {:<18} {}", "ok".green(), index + 1, op, result);
        } else {
            let error = outcome.error.as_deref().unwrap_or("unknown error");
            println!(
                "{} {:<2} {:<18} {}",
                "err".red().bold(),
                index + 1,
                op,
                error
            );
        }
    }

    if !json {
        let summary = format!("{} ok, {} failed", outcomes.len() - failed, failed);
        if failed == 0 {
            println!("{}", summary.green());
        } else {
            println!("{}", summary.yellow());
        }
    }

    if let Some(path) = state_out {
        let state = serde_json::to_string_pretty(&wb)?;
        fs::write(path, state).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), version = wb.version(), "state written");
    }

    if failed > 0 {
        std::process::exit(1);
    }
    Ok(())
}

/// Compact single-line rendering, truncated so wide results stay readable.
fn compact(value: &serde_json::Value) -> String {
    let text = value.to_string();
    if text.chars().count() > 96 {
        let head: String = text.chars().take(95).collect();
        format!("{head}…")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_writes_outcomes_and_state() {
        let dir = tempfile::tempdir().unwrap();
        let batch_path = dir.path().join("batch.jsonl");
        let state_path = dir.path().join("state.json");
        fs::write(
            &batch_path,
            concat!(
                r#"{"op":"create_node","type":"Factor","id":"x"}"#,
                "\n",
                r#"{"op":"set_attr","target":"x.level","value":[0.1,0.2]}"#,
                "\n",
            ),
        )
        .unwrap();

        cmd_run(&batch_path, true, Some(state_path.as_path())).unwrap();

        let state: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&state_path).unwrap()).unwrap();
        assert_eq!(state["version"], 2);
        assert_eq!(state["graph"]["nodes"]["x"]["attrs"]["level"]["kind"], "interval");
    }

    #[test]
    fn compact_is_char_boundary_safe() {
        let wide = serde_json::json!({"line": "→".repeat(200)});
        let text = compact(&wide);
        assert!(text.ends_with('…'));
    }
}

