//! CLI handlers for `trellis feedback` subcommands.

use std::io::Read;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{SecondsFormat, Utc};

use trellis_core::{FeedbackEntry, FeedbackLedger, validate};

use crate::FeedbackCommands;
use crate::files::PlanFile;
use crate::plan_cmds::commit;

/// Dispatch a `FeedbackCommands` variant to the appropriate handler.
pub fn run_feedback_command(command: FeedbackCommands, path: &Path) -> Result<()> {
    match command {
        FeedbackCommands::List => cmd_list(path),
        FeedbackCommands::Marker => cmd_marker(path),
        FeedbackCommands::Add { message, id } => cmd_add(path, &message, id),
    }
}

/// Print every entry in full, followed by the marker for what was printed.
///
/// Works on plans that fail validation, since the ledger may explain how to
/// fix them.
fn cmd_list(path: &Path) -> Result<()> {
    let file = PlanFile::open(path)?;
    let ledger = file.plan.ledger();

    if ledger.is_empty() {
        println!("No feedback recorded.");
    }
    for entry in ledger.entries() {
        print!("{}", format_entry(entry));
    }
    println!("marker: {}", ledger.consult());
    Ok(())
}

/// Header line, then the message exactly as stored, then a blank line.
fn format_entry(entry: &FeedbackEntry) -> String {
    let mut out = format!(
        "[{}] {} ({}, {})\n",
        entry.position(),
        entry.id(),
        entry.kind(),
        entry.timestamp().to_rfc3339_opts(SecondsFormat::AutoSi, true)
    );
    out.push_str(entry.message());
    if !entry.message().ends_with('\n') {
        out.push('\n');
    }
    out.push('\n');
    out
}

fn cmd_marker(path: &Path) -> Result<()> {
    let file = PlanFile::open(path)?;
    println!("{}", file.plan.ledger().consult());
    Ok(())
}

/// Append a feedback entry. A message of `-` is read from stdin.
fn cmd_add(path: &Path, message: &str, id: Option<String>) -> Result<()> {
    let file = PlanFile::open(path)?;

    let message = if message == "-" {
        let mut buf = String::new();
        std::io::stdin()
            .read_to_string(&mut buf)
            .context("failed to read feedback message from stdin")?;
        buf
    } else {
        message.to_owned()
    };
    let id = id.unwrap_or_else(|| next_feedback_id(file.plan.ledger()));

    let entry = FeedbackEntry::new(&id, message, Utc::now())
        .with_context(|| format!("invalid feedback entry {id:?}"))?;
    let candidate = file
        .plan
        .with_feedback(entry)
        .with_context(|| format!("cannot append feedback {id:?}"))?;
    let accepted = commit(&file, validate(&candidate))?;

    let added = accepted
        .ledger()
        .tail()
        .context("ledger is empty after append")?;
    println!("Appended {} ({}, position {}).", added.id(), added.kind(), added.position());
    println!("Re-read the ledger with `trellis feedback list` before the next change.");
    Ok(())
}

/// First free id of the form `FB-<n>`, counting from the ledger length.
fn next_feedback_id(ledger: &FeedbackLedger) -> String {
    (ledger.len() + 1..)
        .map(|n| format!("FB-{n}"))
        .find(|id| ledger.find(id).is_none())
        .unwrap_or_else(|| format!("FB-{}", ledger.len() + 1))
}
