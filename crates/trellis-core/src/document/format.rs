//! Serde types for the plan document.
//!
//! These map one-to-one onto the on-disk shape and carry no validation;
//! [`super::parser`] turns them into model types. Statuses stay strings
//! here so a bad value is reported with the entity it belongs to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::PlanMetadata;

/// Top-level structure of a plan document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PlanDocument {
    pub version: String,
    #[serde(default, skip_serializing_if = "metadata_is_empty")]
    pub metadata: PlanMetadata,
    #[serde(default)]
    pub epics: Vec<EpicDocument>,
    /// Feedback ledger, in append order.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub user_feedback: Vec<FeedbackDocument>,
}

/// A single `[[epics]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EpicDocument {
    pub id: String,
    pub status: String,
    pub description: String,
    pub priority: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub stories: Vec<StoryDocument>,
}

/// A single `[[epics.stories]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoryDocument {
    pub id: String,
    pub status: String,
    pub description: String,
    pub priority: i64,
    pub points: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub tasks: Vec<TaskDocument>,
}

/// A single `[[epics.stories.tasks]]` entry.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskDocument {
    pub id: String,
    pub status: String,
    pub description: String,
    pub priority: i64,
    /// Ids of tasks that must complete first.
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

/// A single `[[user_feedback]]` entry. The message is kept byte for byte.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeedbackDocument {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

fn metadata_is_empty(metadata: &PlanMetadata) -> bool {
    *metadata == PlanMetadata::default()
}
