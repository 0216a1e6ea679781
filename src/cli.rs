use anyhow::Result;
use clap::{Parser, Subcommand};

use crate::commands::{self, CommandReport};

#[derive(Debug, Parser)]
#[command(
    name = "devlog",
    version,
    about = "Turn an append-only notes file into a stylized devlog and RSS feed"
)]
struct Cli {
    /// Print the command report as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ingest unseen notes once (the default).
    Run,
    /// Poll the notes file and ingest after each debounced change.
    Watch,
    /// Show cursor, store and backend state without generating.
    Status,
}

fn render(report: &CommandReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
        return Ok(());
    }
    let verdict = if report.ok { "ok" } else { "failed" };
    println!("devlog {}: {verdict}", report.command);
    for line in &report.details {
        println!("  {line}");
    }
    for issue in &report.issues {
        println!("  ! {issue}");
    }
    Ok(())
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();
    let report = match cli.command.unwrap_or(Command::Run) {
        Command::Run => commands::run::run()?,
        Command::Watch => commands::watch::run()?,
        Command::Status => commands::status::run()?,
    };
    render(&report, cli.json)?;
    if !report.ok {
        anyhow::bail!("{} reported {} issue(s)", report.command, report.issues.len());
    }
    Ok(())
}
