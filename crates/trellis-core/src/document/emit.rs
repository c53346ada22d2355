//! Plan document serializer.

use thiserror::Error;

use super::Format;
use super::format::{EpicDocument, FeedbackDocument, PlanDocument, StoryDocument, TaskDocument};
use crate::model::Plan;

#[derive(Debug, Error)]
pub enum SerializeError {
    #[error("TOML serialize error: {0}")]
    Toml(#[from] toml::ser::Error),

    #[error("JSON serialize error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Serialize a plan. The output always ends with a newline.
pub fn serialize(plan: &Plan, format: Format) -> Result<String, SerializeError> {
    let document = to_document(plan);
    let mut text = match format {
        Format::Toml => toml::to_string_pretty(&document)?,
        Format::Json => serde_json::to_string_pretty(&document)?,
        Format::Xml => super::xml::to_xml(&document),
    };
    if !text.ends_with('\n') {
        text.push('\n');
    }
    Ok(text)
}

/// Convert a plan to its document form.
pub fn to_document(plan: &Plan) -> PlanDocument {
    PlanDocument {
        version: plan.version().to_owned(),
        metadata: plan.metadata().clone(),
        epics: plan
            .epics()
            .iter()
            .map(|epic| EpicDocument {
                id: epic.id().to_owned(),
                status: epic.status().to_string(),
                description: epic.description().to_owned(),
                priority: i64::from(epic.priority().get()),
                created_at: epic.timestamps().created_at,
                updated_at: epic.timestamps().updated_at,
                stories: epic
                    .stories()
                    .iter()
                    .map(|story| StoryDocument {
                        id: story.id().to_owned(),
                        status: story.status().to_string(),
                        description: story.description().to_owned(),
                        priority: i64::from(story.priority().get()),
                        points: i64::from(story.points()),
                        created_at: story.timestamps().created_at,
                        updated_at: story.timestamps().updated_at,
                        tasks: story
                            .tasks()
                            .iter()
                            .map(|task| TaskDocument {
                                id: task.id().to_owned(),
                                status: task.status().to_string(),
                                description: task.description().to_owned(),
                                priority: i64::from(task.priority().get()),
                                dependencies: task.dependencies().to_vec(),
                                created_at: task.timestamps().created_at,
                                updated_at: task.timestamps().updated_at,
                            })
                            .collect(),
                    })
                    .collect(),
            })
            .collect(),
        user_feedback: plan
            .ledger()
            .entries()
            .iter()
            .map(|entry| FeedbackDocument {
                id: entry.id().to_owned(),
                timestamp: entry.timestamp(),
                message: entry.message().to_owned(),
            })
            .collect(),
    }
}
