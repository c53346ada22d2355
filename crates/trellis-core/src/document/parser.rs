//! Plan document parser.
//!
//! Parses TOML, JSON or XML text into a [`PlanDocument`], then builds the model
//! types, which validate their own fields:
//! - Statuses are valid enum variants.
//! - Ids, descriptions, priorities and points are well-formed.
//! - Epics have stories and stories have tasks.
//! - Feedback entries are in timestamp order with unique ids.
//!
//! Plan-wide checks (unique ids, dependency graph, status consistency) are
//! left to [`crate::validate`].

use thiserror::Error;

use super::Format;
use super::format::{EpicDocument, FeedbackDocument, PlanDocument, StoryDocument, TaskDocument};
use crate::ledger::{FeedbackEntry, FeedbackLedger, LedgerOrderError};
use crate::model::{EntityKind, Epic, Plan, Status, Story, Task, Timestamps, ValidationError};

/// Errors that can occur while parsing a plan document.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("XML parse error: {0}")]
    Xml(#[from] super::XmlError),

    #[error("invalid status {value:?} on {kind} {id:?} (expected pending, in_progress, or complete)")]
    InvalidStatus {
        kind: EntityKind,
        id: String,
        value: String,
    },

    #[error(transparent)]
    Invalid(#[from] ValidationError),

    #[error("invalid feedback ledger: {0}")]
    Ledger(#[from] LedgerOrderError),
}

/// Parse a plan document in the given format.
pub fn parse(text: &str, format: Format) -> Result<Plan, ParseError> {
    let document: PlanDocument = match format {
        Format::Toml => toml::from_str(text)?,
        Format::Json => serde_json::from_str(text)?,
        Format::Xml => super::xml::from_xml(text)?,
    };
    let plan = from_document(document)?;
    tracing::debug!(
        %format,
        version = plan.version(),
        tasks = plan.tasks().count(),
        feedback = plan.ledger().len(),
        "plan document parsed"
    );
    Ok(plan)
}

/// Build a [`Plan`] from its document form.
pub fn from_document(document: PlanDocument) -> Result<Plan, ParseError> {
    let epics = document
        .epics
        .into_iter()
        .map(epic)
        .collect::<Result<Vec<_>, _>>()?;
    let entries = document
        .user_feedback
        .into_iter()
        .map(feedback)
        .collect::<Result<Vec<_>, _>>()?;
    let ledger = FeedbackLedger::from_entries(entries)?;
    Ok(Plan::new(document.version, epics, ledger, document.metadata)?)
}

fn status(kind: EntityKind, id: &str, value: String) -> Result<Status, ParseError> {
    value.parse().map_err(|_| ParseError::InvalidStatus {
        kind,
        id: id.to_owned(),
        value,
    })
}

fn timestamps(
    created_at: Option<chrono::DateTime<chrono::Utc>>,
    updated_at: Option<chrono::DateTime<chrono::Utc>>,
) -> Timestamps {
    Timestamps {
        created_at,
        updated_at,
    }
}

fn epic(doc: EpicDocument) -> Result<Epic, ParseError> {
    let status = status(EntityKind::Epic, &doc.id, doc.status)?;
    let stories = doc
        .stories
        .into_iter()
        .map(story)
        .collect::<Result<Vec<_>, _>>()?;
    let epic = Epic::new(doc.id, doc.description, doc.priority, status, stories)?
        .with_timestamps(timestamps(doc.created_at, doc.updated_at))?;
    Ok(epic)
}

fn story(doc: StoryDocument) -> Result<Story, ParseError> {
    let status = status(EntityKind::Story, &doc.id, doc.status)?;
    let tasks = doc
        .tasks
        .into_iter()
        .map(task)
        .collect::<Result<Vec<_>, _>>()?;
    let story = Story::new(doc.id, doc.description, doc.priority, doc.points, status, tasks)?
        .with_timestamps(timestamps(doc.created_at, doc.updated_at))?;
    Ok(story)
}

fn task(doc: TaskDocument) -> Result<Task, ParseError> {
    let status = status(EntityKind::Task, &doc.id, doc.status)?;
    let task = Task::new(doc.id, doc.description, doc.priority, status)?
        .depends_on(doc.dependencies)?
        .with_timestamps(timestamps(doc.created_at, doc.updated_at))?;
    Ok(task)
}

fn feedback(doc: FeedbackDocument) -> Result<FeedbackEntry, ParseError> {
    Ok(FeedbackEntry::new(doc.id, doc.message, doc.timestamp)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    const VALID: &str = r#"
version = "1.0"

[[epics]]
id = "epic1"
status = "in_progress"
description = "Core engine"
priority = 1

[[epics.stories]]
id = "story1"
status = "in_progress"
description = "Parse plans"
priority = 1
points = 3

[[epics.stories.tasks]]
id = "task1"
status = "complete"
description = "Write the parser"
priority = 1

[[epics.stories.tasks]]
id = "task2"
status = "pending"
description = "Wire the CLI"
priority = 2
dependencies = ["task1"]

[[user_feedback]]
id = "FB-1"
timestamp = "2024-02-13T09:00:00Z"
message = "Build a plan engine."
"#;

    #[test]
    fn parse_valid_plan() {
        let plan = parse(VALID, Format::Toml).expect("should parse");
        assert_eq!(plan.version(), "1.0");
        assert_eq!(plan.tasks().count(), 2);
        assert_eq!(plan.task("task2").unwrap().dependencies(), ["task1"]);
        assert_eq!(plan.ledger().initial_scope().unwrap().id(), "FB-1");
    }

    #[test]
    fn rejects_invalid_status() {
        let text = VALID.replace("status = \"complete\"", "status = \"done\"");
        let err = parse(&text, Format::Toml).unwrap_err();
        assert!(
            matches!(
                err,
                ParseError::InvalidStatus { kind: EntityKind::Task, ref id, ref value }
                    if id == "task1" && value == "done"
            ),
            "expected InvalidStatus, got: {err}"
        );
    }

    #[test]
    fn rejects_priority_out_of_range() {
        let text = VALID.replace("priority = 2", "priority = 9");
        let err = parse(&text, Format::Toml).unwrap_err();
        assert!(
            matches!(
                err,
                ParseError::Invalid(ValidationError::PriorityOutOfRange { value: 9, .. })
            ),
            "expected PriorityOutOfRange, got: {err}"
        );
    }

    #[test]
    fn rejects_story_without_tasks() {
        let text = r#"
version = "1.0"

[[epics]]
id = "epic1"
status = "pending"
description = "Core engine"
priority = 1

[[epics.stories]]
id = "story1"
status = "pending"
description = "Parse plans"
priority = 1
points = 3
"#;
        let err = parse(text, Format::Toml).unwrap_err();
        assert!(
            matches!(
                err,
                ParseError::Invalid(ValidationError::NoChildren {
                    kind: EntityKind::Story,
                    ..
                })
            ),
            "expected NoChildren, got: {err}"
        );
    }

    #[test]
    fn rejects_out_of_order_feedback() {
        let text = format!(
            "{VALID}\n[[user_feedback]]\nid = \"FB-2\"\ntimestamp = \"2024-02-12T09:00:00Z\"\nmessage = \"earlier\"\n"
        );
        let err = parse(&text, Format::Toml).unwrap_err();
        assert!(
            matches!(err, ParseError::Ledger(LedgerOrderError::TimestampRegression { .. })),
            "expected TimestampRegression, got: {err}"
        );
    }

    #[test]
    fn rejects_malformed_toml() {
        let err = parse("version = ", Format::Toml).unwrap_err();
        assert!(matches!(err, ParseError::Toml(_)), "expected Toml, got: {err}");
    }

    #[test]
    fn xml_plans_get_the_same_field_checks() {
        let text = r#"<plan version="1.0">
  <epics>
    <epic id="e1" status="pending">
      <description>Epic</description>
      <stories>
        <story id="s1" status="pending">
          <description>Story</description>
          <tasks>
            <task id="t1" status="done"><description>Task</description></task>
          </tasks>
        </story>
      </stories>
    </epic>
  </epics>
</plan>"#;
        let err = parse(text, Format::Xml).unwrap_err();
        assert!(
            matches!(
                err,
                ParseError::InvalidStatus {
                    kind: EntityKind::Task,
                    ref value,
                    ..
                } if value == "done"
            ),
            "expected InvalidStatus, got: {err}"
        );

        let plan = parse(&text.replace("\"done\"", "\"pending\""), Format::Xml).unwrap();
        assert_eq!(plan.task("t1").unwrap().priority().get(), 1);

        let err = parse("<plan>", Format::Xml).unwrap_err();
        assert!(matches!(err, ParseError::Xml(_)), "expected Xml, got: {err}");
    }

    #[test]
    fn parses_json() {
        let text = r#"{
  "version": "1.0",
  "epics": [{
    "id": "e1", "status": "pending", "description": "Epic", "priority": 3,
    "stories": [{
      "id": "s1", "status": "pending", "description": "Story", "priority": 3, "points": 0,
      "tasks": [{ "id": "t1", "status": "pending", "description": "Task", "priority": 5 }]
    }]
  }]
}"#;
        let plan = parse(text, Format::Json).expect("should parse");
        assert_eq!(plan.task("t1").unwrap().priority().get(), 5);
        assert!(plan.ledger().is_empty());

        let err = parse("{", Format::Json).unwrap_err();
        assert!(matches!(err, ParseError::Json(_)), "expected Json, got: {err}");
    }
}
