//! Plan entities: status and kind enums, field validation, and the
//! epic/story/task/plan value types.

pub mod entity;
pub mod plan;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use entity::{Epic, Story, Task, Timestamps};
pub use plan::{Entities, EntityRef, Location, Plan, PlanEditError, PlanIndex, PlanMetadata};

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// Progress status shared by epics, stories and tasks.
///
/// Variants are ordered by progress, so `Pending < InProgress < Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Pending,
    InProgress,
    Complete,
}

impl Status {
    /// All statuses in progress order.
    pub const ALL: [Status; 3] = [Status::Pending, Status::InProgress, Status::Complete];

    /// Whether `self -> next` is a single forward step of the state machine:
    ///
    /// ```text
    /// pending     -> in_progress
    /// in_progress -> complete
    /// ```
    pub fn can_advance_to(self, next: Status) -> bool {
        matches!(
            (self, next),
            (Status::Pending, Status::InProgress) | (Status::InProgress, Status::Complete)
        )
    }

    /// Whether moving from `self` to `next` goes backwards.
    pub fn regresses_to(self, next: Status) -> bool {
        next < self
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Complete => "complete",
        };
        f.write_str(s)
    }
}

impl FromStr for Status {
    type Err = StatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(Self::Pending),
            "in_progress" => Ok(Self::InProgress),
            "complete" => Ok(Self::Complete),
            other => Err(StatusParseError(other.to_owned())),
        }
    }
}

/// Error returned when parsing an invalid [`Status`] string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid status: {0:?} (expected pending, in_progress, or complete)")]
pub struct StatusParseError(pub String);

// ---------------------------------------------------------------------------

/// The kind of an identified plan element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Epic,
    Story,
    Task,
    Feedback,
}

impl EntityKind {
    /// Nesting depth in the epic/story/task hierarchy.
    pub fn depth(self) -> usize {
        match self {
            Self::Epic | Self::Feedback => 0,
            Self::Story => 1,
            Self::Task => 2,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Epic => "epic",
            Self::Story => "story",
            Self::Task => "task",
            Self::Feedback => "feedback entry",
        };
        f.write_str(s)
    }
}

// ---------------------------------------------------------------------------
// Field validation
// ---------------------------------------------------------------------------

/// Priority of a plan element, from 1 (highest) to 5 (lowest).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct Priority(u8);

impl Priority {
    pub const MIN: i64 = 1;
    pub const MAX: i64 = 5;

    /// Returns `None` when `value` is outside `1..=5`.
    pub fn new(value: i64) -> Option<Self> {
        if (Self::MIN..=Self::MAX).contains(&value) {
            u8::try_from(value).ok().map(Self)
        } else {
            None
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A field constraint violated while constructing an entity.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("invalid id {0:?} (expected ASCII letters, digits, '-', '_' or '.')")]
    InvalidId(String),

    #[error("{kind} {id:?} has an empty description")]
    EmptyDescription { kind: EntityKind, id: String },

    #[error("{kind} {id:?} has priority {value} (expected 1 to 5)")]
    PriorityOutOfRange {
        kind: EntityKind,
        id: String,
        value: i64,
    },

    #[error("story {id:?} has negative points {value}")]
    NegativePoints { id: String, value: i64 },

    #[error("story {id:?} has points {value} (at most {max})", max = u32::MAX)]
    PointsOutOfRange { id: String, value: i64 },

    #[error("{kind} {id:?} must contain at least one {child}")]
    NoChildren {
        kind: EntityKind,
        id: String,
        child: EntityKind,
    },

    #[error("task {id:?} lists dependency {dependency:?} more than once")]
    DuplicateDependency { id: String, dependency: String },

    #[error("{kind} {id:?} has updated_at earlier than created_at")]
    TimestampOrder { kind: EntityKind, id: String },

    #[error("feedback entry {id:?} has an empty message")]
    EmptyMessage { id: String },

    #[error("plan version must not be empty")]
    EmptyVersion,
}

/// Check that `id` is a well-formed entity id.
pub(crate) fn checked_id(id: String) -> Result<String, ValidationError> {
    let well_formed = !id.is_empty()
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if well_formed {
        Ok(id)
    } else {
        Err(ValidationError::InvalidId(id))
    }
}

pub(crate) fn checked_description(
    kind: EntityKind,
    id: &str,
    description: String,
) -> Result<String, ValidationError> {
    if description.trim().is_empty() {
        return Err(ValidationError::EmptyDescription {
            kind,
            id: id.to_owned(),
        });
    }
    Ok(description)
}

pub(crate) fn checked_priority(
    kind: EntityKind,
    id: &str,
    value: i64,
) -> Result<Priority, ValidationError> {
    Priority::new(value).ok_or_else(|| ValidationError::PriorityOutOfRange {
        kind,
        id: id.to_owned(),
        value,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_roundtrips_through_strings() {
        for status in Status::ALL {
            let parsed: Status = status.to_string().parse().unwrap();
            assert_eq!(parsed, status);
        }
        assert!("done".parse::<Status>().is_err());
    }

    #[test]
    fn status_advances_one_step_at_a_time() {
        assert!(Status::Pending.can_advance_to(Status::InProgress));
        assert!(Status::InProgress.can_advance_to(Status::Complete));
        assert!(!Status::Pending.can_advance_to(Status::Complete));
        assert!(!Status::Complete.can_advance_to(Status::Pending));
        assert!(!Status::InProgress.can_advance_to(Status::InProgress));
    }

    #[test]
    fn regression_is_any_backwards_move() {
        assert!(Status::Complete.regresses_to(Status::Pending));
        assert!(Status::Complete.regresses_to(Status::InProgress));
        assert!(!Status::Pending.regresses_to(Status::Complete));
        assert!(!Status::Complete.regresses_to(Status::Complete));
    }

    #[test]
    fn priority_bounds() {
        assert!(Priority::new(0).is_none());
        assert_eq!(Priority::new(1).map(Priority::get), Some(1));
        assert_eq!(Priority::new(5).map(Priority::get), Some(5));
        assert!(Priority::new(6).is_none());
        assert!(Priority::new(-3).is_none());
    }

    #[test]
    fn id_charset() {
        assert!(checked_id("task-1.a_b".into()).is_ok());
        assert!(checked_id(String::new()).is_err());
        assert!(checked_id("task 1".into()).is_err());
        assert!(checked_id("FB:1".into()).is_err());
    }
}
