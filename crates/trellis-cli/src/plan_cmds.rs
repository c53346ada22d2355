//! CLI handlers for commands that read or change a plan file.
//!
//! Implements:
//! - `trellis validate`                 -- validate and print the consultation marker
//! - `trellis show`                     -- render the plan as an outline or diagram
//! - `trellis ready`                    -- list tasks whose dependencies are complete
//! - `trellis status`                   -- task progress summary
//! - `trellis start|complete <id>`      -- move an entity one step forward
//! - `trellis set-status <id> <status>` -- set a status directly
//! - `trellis reopen <id>`              -- reopen a task and cascade to dependents

use std::path::Path;

use anyhow::{Context, Result};

use trellis_core::status::dispatch;
use trellis_core::view::{self, render};
use trellis_core::{
    ConsultationMarker, Plan, Status, StatusEngine, ValidatedPlan, ValidationResult, progress,
    ready_tasks, validate, validate_mutation, validate_reopen,
};

use crate::config::ViewFormat;
use crate::files::PlanFile;

/// Options for `trellis show`.
#[derive(Debug, Clone, Copy)]
pub struct ShowOptions {
    pub format: ViewFormat,
    pub include_scope: bool,
    pub descriptions: bool,
}

// -----------------------------------------------------------------------
// Shared helpers
// -----------------------------------------------------------------------

/// Validate the plan as loaded. Every command works from an accepted plan.
pub(crate) fn accepted(file: &PlanFile) -> Result<ValidatedPlan> {
    validate(&file.plan).with_context(|| format!("plan file {} is invalid", file.path.display()))
}

pub(crate) fn require_marker(marker: Option<ConsultationMarker>) -> Result<ConsultationMarker> {
    marker.context(
        "a consultation marker is required; read the ledger with `trellis feedback list` \
         and pass the marker it prints with --marker",
    )
}

/// Save an accepted candidate, or report why it was rejected.
pub(crate) fn commit(file: &PlanFile, outcome: ValidationResult) -> Result<ValidatedPlan> {
    match outcome {
        Ok(accepted) => {
            file.save(accepted.plan())?;
            tracing::debug!(plan = %file.path.display(), "plan file updated");
            Ok(accepted)
        }
        Err(violations) => {
            tracing::warn!(
                plan = %file.path.display(),
                violations = violations.len(),
                "mutation rejected"
            );
            Err(violations).context("mutation rejected; plan file left unchanged")
        }
    }
}

// -----------------------------------------------------------------------
// Read-only commands
// -----------------------------------------------------------------------

pub fn cmd_validate(path: &Path) -> Result<()> {
    let file = PlanFile::open(path)?;
    let plan = accepted(&file)?;

    println!("Plan is valid.");
    println!();
    println!("  Version:          {}", plan.version());
    println!("  Epics:            {}", plan.epics().len());
    println!("  Stories:          {}", plan.stories().count());
    println!("  Tasks:            {}", plan.tasks().count());
    println!("  Dependency edges: {}", plan.graph().edge_count());
    println!("  Feedback entries: {}", plan.ledger().len());
    println!();
    println!("marker: {}", plan.ledger().consult());
    Ok(())
}

pub fn cmd_show(path: &Path, options: ShowOptions) -> Result<()> {
    let file = PlanFile::open(path)?;
    let plan = accepted(&file)?;
    print!("{}", render_view(&plan, options)?);
    Ok(())
}

fn render_view(plan: &Plan, options: ShowOptions) -> Result<String> {
    let text = match options.format {
        ViewFormat::Outline => {
            let mut out = String::new();
            for line in view::outline(plan) {
                out.push_str(&line.to_string());
                out.push('\n');
            }
            out
        }
        ViewFormat::Markdown => render::markdown(
            plan,
            render::MarkdownOptions {
                include_scope: options.include_scope,
                ..render::MarkdownOptions::default()
            },
        ),
        ViewFormat::Mermaid => render::mermaid(&view::graph(plan), options.descriptions),
        ViewFormat::Graphviz => render::graphviz(&view::graph(plan), options.descriptions),
        ViewFormat::Json => {
            let mut json = serde_json::to_string_pretty(&view::graph(plan))
                .context("failed to serialize plan graph")?;
            json.push('\n');
            json
        }
    };
    Ok(text)
}

pub fn cmd_ready(path: &Path, include_in_progress: bool) -> Result<()> {
    let file = PlanFile::open(path)?;
    let plan = accepted(&file)?;
    let ready = ready_tasks(&plan, include_in_progress);

    if ready.is_empty() {
        println!("No tasks are ready.");
        return Ok(());
    }

    println!("{:<16} {:<12} {:<4} DESCRIPTION", "TASK", "STATUS", "PRI");
    for task in ready {
        println!(
            "{:<16} {:<12} {:<4} {}",
            task.id(),
            task.status().to_string(),
            task.priority().get(),
            task.description()
        );
    }
    Ok(())
}

pub fn cmd_status(path: &Path, json: bool) -> Result<()> {
    let file = PlanFile::open(path)?;
    let plan = accepted(&file)?;
    let progress = progress(&plan);

    if json {
        let text = serde_json::to_string_pretty(&progress).context("failed to serialize progress")?;
        println!("{text}");
        return Ok(());
    }

    println!(
        "Tasks: {}/{} complete ({:.0}%)",
        progress.complete,
        progress.total,
        progress.ratio() * 100.0
    );
    println!("  pending:     {}", progress.pending);
    println!("  in_progress: {}", progress.in_progress);
    println!("  complete:    {}", progress.complete);
    for epic in plan.epics() {
        println!("  {:<16} {}", epic.id(), epic.status());
    }
    Ok(())
}

// -----------------------------------------------------------------------
// Mutations
// -----------------------------------------------------------------------

/// Which forward step `trellis start` / `trellis complete` takes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Start,
    Complete,
}

pub fn cmd_step(
    path: &Path,
    id: &str,
    step: Step,
    marker: Option<ConsultationMarker>,
) -> Result<()> {
    let marker = require_marker(marker)?;
    let file = PlanFile::open(path)?;
    let prior = accepted(&file)?;

    let candidate = match step {
        Step::Start => dispatch::start(&prior, id),
        Step::Complete => dispatch::complete(&prior, id),
    }
    .with_context(|| format!("cannot update {id:?}"))?;
    let changed = changed_ids(&prior, &candidate);

    let accepted = commit(&file, validate_mutation(&prior, &candidate, &marker))?;
    for changed_id in changed {
        if let Some(status) = StatusEngine::status_of(&accepted, &changed_id) {
            println!("{changed_id} -> {status}");
        }
    }
    Ok(())
}

pub fn cmd_set_status(
    path: &Path,
    id: &str,
    status: Status,
    marker: Option<ConsultationMarker>,
) -> Result<()> {
    let marker = require_marker(marker)?;
    let file = PlanFile::open(path)?;
    let prior = accepted(&file)?;

    let candidate = prior
        .with_status(id, status)
        .with_context(|| format!("cannot update {id:?}"))?;
    commit(&file, validate_mutation(&prior, &candidate, &marker))?;
    println!("{id} -> {status}");
    Ok(())
}

pub fn cmd_reopen(path: &Path, id: &str, marker: Option<ConsultationMarker>) -> Result<()> {
    let marker = require_marker(marker)?;
    let file = PlanFile::open(path)?;
    let prior = accepted(&file)?;

    let reopened = StatusEngine::reopen(&prior, prior.graph(), id)
        .with_context(|| format!("cannot reopen {id:?}"))?;
    let affected: Vec<&str> = reopened.affected().collect();
    let accepted = commit(
        &file,
        validate_reopen(&prior, &reopened.plan, &marker, &affected),
    )?;

    println!("Reopened {id}.");
    for reset in &reopened.reset {
        println!("  {reset} -> pending");
    }
    for demoted in &reopened.demoted {
        if let Some(status) = StatusEngine::status_of(&accepted, demoted) {
            println!("  {demoted} -> {status}");
        }
    }
    Ok(())
}

/// Ids whose status differs between two plans, in plan order.
fn changed_ids(prior: &Plan, candidate: &Plan) -> Vec<String> {
    candidate
        .entities()
        .filter(|entity| {
            StatusEngine::status_of(prior, entity.id()).is_some_and(|s| s != entity.status())
        })
        .map(|entity| entity.id().to_owned())
        .collect()
}
