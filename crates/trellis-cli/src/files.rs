//! Plan file loading and write-back.
//!
//! - [`PlanFile::open`] reads a plan document, picking TOML, JSON or XML by
//!   extension, and keeps the original text for write-back.
//! - [`save_plan`] writes a plan back atomically. For TOML files the
//!   existing document is patched with `toml_edit` (statuses updated, new
//!   feedback appended) so comments and layout survive; anything else is
//!   re-serialized in full.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::SecondsFormat;
use toml_edit::{ArrayOfTables, DocumentMut, Item, Table, value};

use trellis_core::{Format, Plan, parse, serialize};

/// Format of the plan file at `path`. Files without a known extension are
/// treated as TOML.
pub fn format_of(path: &Path) -> Format {
    Format::from_path(path).unwrap_or_default()
}

/// A plan loaded from disk together with the text it came from.
#[derive(Debug)]
pub struct PlanFile {
    pub path: PathBuf,
    pub text: String,
    pub plan: Plan,
}

impl PlanFile {
    pub fn open(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read plan file: {}", path.display()))?;
        let plan = parse(&text, format_of(path))
            .with_context(|| format!("failed to parse plan file: {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            text,
            plan,
        })
    }

    /// Replace the file's contents with `plan`.
    pub fn save(&self, plan: &Plan) -> Result<()> {
        save_plan(&self.path, plan, Some(&self.text))
    }
}

/// Write `plan` to `path`, replacing the file atomically.
///
/// `original` is the text the plan was loaded from, if any.
pub fn save_plan(path: &Path, plan: &Plan, original: Option<&str>) -> Result<()> {
    let format = format_of(path);
    let text = match (format, original) {
        (Format::Toml, Some(original)) => patch_or_serialize(original, plan)?,
        _ => serialize(plan, format).context("failed to serialize plan")?,
    };
    write_atomic(path, &text)
}

fn patch_or_serialize(original: &str, plan: &Plan) -> Result<String> {
    match patch_toml(original, plan) {
        Ok(patched) if parse(&patched, Format::Toml).is_ok_and(|p| p == *plan) => Ok(patched),
        Ok(_) => {
            tracing::debug!("patched document diverged from plan; rewriting in full");
            serialize(plan, Format::Toml).context("failed to serialize plan")
        }
        Err(err) => {
            tracing::debug!(error = %err, "cannot patch plan document; rewriting in full");
            serialize(plan, Format::Toml).context("failed to serialize plan")
        }
    }
}

/// Update statuses and append new feedback entries in an existing TOML
/// plan document, preserving everything else.
pub fn patch_toml(original: &str, plan: &Plan) -> Result<String> {
    let mut doc: DocumentMut = original
        .parse()
        .context("failed to parse plan as TOML document")?;

    if let Some(epics) = doc.get_mut("epics").and_then(Item::as_array_of_tables_mut) {
        for epic in epics.iter_mut() {
            set_status(epic, plan);
            let Some(stories) = epic.get_mut("stories").and_then(Item::as_array_of_tables_mut)
            else {
                continue;
            };
            for story in stories.iter_mut() {
                set_status(story, plan);
                let Some(tasks) = story.get_mut("tasks").and_then(Item::as_array_of_tables_mut)
                else {
                    continue;
                };
                for task in tasks.iter_mut() {
                    set_status(task, plan);
                }
            }
        }
    }

    let entries = plan.ledger().entries();
    let existing = doc
        .get("user_feedback")
        .and_then(Item::as_array_of_tables)
        .map_or(0, ArrayOfTables::len);
    if existing > entries.len() {
        bail!("plan document has more feedback entries than the plan");
    }
    if existing < entries.len() {
        if !doc.contains_key("user_feedback") {
            doc.insert("user_feedback", Item::ArrayOfTables(ArrayOfTables::new()));
        }
        let feedback = doc
            .get_mut("user_feedback")
            .and_then(Item::as_array_of_tables_mut)
            .context("user_feedback is not an array of tables")?;
        for entry in &entries[existing..] {
            let mut table = Table::new();
            table.insert("id", value(entry.id()));
            table.insert(
                "timestamp",
                value(entry.timestamp().to_rfc3339_opts(SecondsFormat::AutoSi, true)),
            );
            table.insert("message", value(entry.message()));
            feedback.push(table);
        }
    }

    Ok(doc.to_string())
}

fn set_status(table: &mut Table, plan: &Plan) {
    let Some(id) = table.get("id").and_then(Item::as_str).map(str::to_owned) else {
        return;
    };
    let Some(entity) = plan.find(&id) else {
        return;
    };
    let status = entity.status().to_string();
    if table.get("status").and_then(Item::as_str) != Some(status.as_str()) {
        table["status"] = value(status);
    }
}

fn write_atomic(path: &Path, text: &str) -> Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let mut file = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("failed to create temporary file in {}", dir.display()))?;
    file.write_all(text.as_bytes())
        .with_context(|| format!("failed to write plan file: {}", path.display()))?;
    file.persist(path)
        .with_context(|| format!("failed to replace plan file: {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use trellis_core::{FeedbackEntry, Status};
    use trellis_test_utils::{SAMPLE_PLAN_TOML, at_minute};

    use super::*;

    const COMMENTED: &str = "# Release plan\n";

    fn commented_sample() -> String {
        format!("{COMMENTED}{SAMPLE_PLAN_TOML}")
    }

    #[test]
    fn patch_updates_status_and_keeps_comments() {
        let original = commented_sample();
        let plan = parse(&original, Format::Toml).unwrap();
        let edited = plan.with_status("task4", Status::InProgress).unwrap();

        let patched = patch_toml(&original, &edited).unwrap();
        assert!(patched.starts_with(COMMENTED), "got:\n{patched}");
        assert_eq!(parse(&patched, Format::Toml).unwrap(), edited);
        assert_eq!(patched.lines().count(), original.lines().count());
    }

    #[test]
    fn patch_appends_feedback() {
        let original = commented_sample();
        let plan = parse(&original, Format::Toml).unwrap();
        let entry = FeedbackEntry::new("FB-3", "Keep \"quotes\"\nand newlines", at_minute(60 * 48))
            .unwrap();
        let edited = plan.with_feedback(entry).unwrap();

        let patched = patch_toml(&original, &edited).unwrap();
        let reparsed = parse(&patched, Format::Toml).unwrap();
        assert_eq!(reparsed, edited);
        assert_eq!(
            reparsed.ledger().tail().unwrap().message(),
            "Keep \"quotes\"\nand newlines"
        );
    }

    #[test]
    fn save_and_load_roundtrip_in_every_format() {
        let tmp = tempfile::TempDir::new().unwrap();
        let plan = parse(SAMPLE_PLAN_TOML, Format::Toml).unwrap();
        for name in ["plan.toml", "plan.json", "plan.xml"] {
            let path = tmp.path().join(name);
            save_plan(&path, &plan, None).unwrap();
            assert_eq!(PlanFile::open(&path).unwrap().plan, plan, "{name}");
        }
    }

    #[test]
    fn save_with_original_preserves_comments() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("plan.toml");
        let original = commented_sample();
        std::fs::write(&path, &original).unwrap();

        let file = PlanFile::open(&path).unwrap();
        assert_eq!(file.text, original);
        let edited = file.plan.with_status("task3", Status::Complete).unwrap();
        file.save(&edited).unwrap();

        let written = std::fs::read_to_string(&path).unwrap();
        assert!(written.starts_with(COMMENTED));
        assert_eq!(PlanFile::open(&path).unwrap().plan, edited);
    }

    #[test]
    fn load_reports_path_on_failure() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("missing.toml");
        let err = PlanFile::open(&path).unwrap_err();
        assert!(
            err.to_string().contains("missing.toml"),
            "unexpected error: {err}"
        );
    }

    #[test]
    fn unknown_extension_is_toml() {
        assert_eq!(format_of(Path::new("plan.txt")), Format::Toml);
        assert_eq!(format_of(Path::new("plan.JSON")), Format::Json);
    }
}
