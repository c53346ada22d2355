//! The plan aggregate.
//!
//! A [`Plan`] is an immutable snapshot. Edits go through the `with_*`
//! methods, which return a new plan and leave `self` untouched.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::{EntityKind, Epic, Status, Story, Task, ValidationError};
use crate::ledger::{FeedbackEntry, FeedbackLedger, LedgerOrderError};

/// Informational metadata. The engine never interprets it.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub provider: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<String>,
}

/// Errors from plan rebuild operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlanEditError {
    #[error("no epic, story or task with id {0:?}")]
    UnknownEntity(String),

    #[error("no task with id {0:?}")]
    UnknownTask(String),

    #[error(transparent)]
    Ledger(#[from] LedgerOrderError),
}

// ---------------------------------------------------------------------------
// Entity references
// ---------------------------------------------------------------------------

/// A borrowed epic, story or task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityRef<'a> {
    Epic(&'a Epic),
    Story(&'a Story),
    Task(&'a Task),
}

impl<'a> EntityRef<'a> {
    pub fn id(&self) -> &'a str {
        match self {
            Self::Epic(e) => e.id(),
            Self::Story(s) => s.id(),
            Self::Task(t) => t.id(),
        }
    }

    pub fn kind(&self) -> EntityKind {
        match self {
            Self::Epic(_) => EntityKind::Epic,
            Self::Story(_) => EntityKind::Story,
            Self::Task(_) => EntityKind::Task,
        }
    }

    pub fn status(&self) -> Status {
        match self {
            Self::Epic(e) => e.status(),
            Self::Story(s) => s.status(),
            Self::Task(t) => t.status(),
        }
    }

    pub fn description(&self) -> &'a str {
        match self {
            Self::Epic(e) => e.description(),
            Self::Story(s) => s.description(),
            Self::Task(t) => t.description(),
        }
    }
}

/// Depth-first walk over a plan: each epic, then each of its stories
/// followed by that story's tasks.
#[derive(Debug, Clone)]
pub struct Entities<'a> {
    epics: &'a [Epic],
    epic: usize,
    story: Option<usize>,
    task: Option<usize>,
}

impl<'a> Iterator for Entities<'a> {
    type Item = EntityRef<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let epic = self.epics.get(self.epic)?;
        let Some(s) = self.story else {
            self.story = Some(0);
            return Some(EntityRef::Epic(epic));
        };
        let Some(story) = epic.stories().get(s) else {
            self.epic += 1;
            self.story = None;
            self.task = None;
            return self.next();
        };
        let Some(t) = self.task else {
            self.task = Some(0);
            return Some(EntityRef::Story(story));
        };
        let Some(task) = story.tasks().get(t) else {
            self.story = Some(s + 1);
            self.task = None;
            return self.next();
        };
        self.task = Some(t + 1);
        Some(EntityRef::Task(task))
    }
}

// ---------------------------------------------------------------------------
// Lookup index
// ---------------------------------------------------------------------------

/// Position of an entity in the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    Epic(usize),
    Story(usize, usize),
    Task(usize, usize, usize),
}

/// Id-keyed index into a plan, derived on demand.
///
/// When an id is used twice the first occurrence wins; duplicate ids are
/// reported by the validator.
#[derive(Debug, Clone, Default)]
pub struct PlanIndex {
    locations: HashMap<String, Location>,
}

impl PlanIndex {
    pub fn build(plan: &Plan) -> Self {
        let mut locations = HashMap::new();
        for (e, epic) in plan.epics.iter().enumerate() {
            locations
                .entry(epic.id().to_owned())
                .or_insert(Location::Epic(e));
            for (s, story) in epic.stories().iter().enumerate() {
                locations
                    .entry(story.id().to_owned())
                    .or_insert(Location::Story(e, s));
                for (t, task) in story.tasks().iter().enumerate() {
                    locations
                        .entry(task.id().to_owned())
                        .or_insert(Location::Task(e, s, t));
                }
            }
        }
        Self { locations }
    }

    pub fn locate(&self, id: &str) -> Option<Location> {
        self.locations.get(id).copied()
    }
}

// ---------------------------------------------------------------------------
// Plan
// ---------------------------------------------------------------------------

/// A versioned tree of epics with its feedback ledger and metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Plan {
    version: String,
    epics: Vec<Epic>,
    ledger: FeedbackLedger,
    metadata: PlanMetadata,
}

impl Plan {
    pub fn new(
        version: impl Into<String>,
        epics: Vec<Epic>,
        ledger: FeedbackLedger,
        metadata: PlanMetadata,
    ) -> Result<Self, ValidationError> {
        let version = version.into();
        if version.trim().is_empty() {
            return Err(ValidationError::EmptyVersion);
        }
        Ok(Self {
            version,
            epics,
            ledger,
            metadata,
        })
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn epics(&self) -> &[Epic] {
        &self.epics
    }

    pub fn ledger(&self) -> &FeedbackLedger {
        &self.ledger
    }

    pub fn metadata(&self) -> &PlanMetadata {
        &self.metadata
    }

    /// Every epic, story and task in depth-first plan order.
    pub fn entities(&self) -> Entities<'_> {
        Entities {
            epics: &self.epics,
            epic: 0,
            story: None,
            task: None,
        }
    }

    pub fn stories(&self) -> impl Iterator<Item = &Story> {
        self.epics.iter().flat_map(|e| e.stories().iter())
    }

    /// Every task in plan order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.epics.iter().flat_map(Epic::tasks)
    }

    pub fn find(&self, id: &str) -> Option<EntityRef<'_>> {
        self.entities().find(|e| e.id() == id)
    }

    pub fn task(&self, id: &str) -> Option<&Task> {
        self.tasks().find(|t| t.id() == id)
    }

    pub fn index(&self) -> PlanIndex {
        PlanIndex::build(self)
    }

    /// Id of the story owning a task, or of the epic owning a story.
    pub fn parent_of(&self, id: &str) -> Option<&str> {
        match self.index().locate(id)? {
            Location::Epic(_) => None,
            Location::Story(e, _) => Some(self.epics[e].id()),
            Location::Task(e, s, _) => Some(self.epics[e].stories()[s].id()),
        }
    }

    /// A copy of the plan with one entity's status changed.
    pub fn with_status(&self, id: &str, status: Status) -> Result<Plan, PlanEditError> {
        let location = self
            .index()
            .locate(id)
            .ok_or_else(|| PlanEditError::UnknownEntity(id.to_owned()))?;
        let mut next = self.clone();
        next.set_status_at(location, status);
        Ok(next)
    }

    /// A copy of the plan with the task of the same id replaced by `task`.
    pub fn with_task(&self, task: Task) -> Result<Plan, PlanEditError> {
        let Some(Location::Task(e, s, t)) = self.index().locate(task.id()) else {
            return Err(PlanEditError::UnknownTask(task.id().to_owned()));
        };
        let mut next = self.clone();
        if let Some(slot) = next.epics[e]
            .story_mut(s)
            .and_then(|story| story.task_mut(t))
        {
            *slot = task;
        }
        Ok(next)
    }

    /// A copy of the plan with `entry` appended to its ledger.
    pub fn with_feedback(&self, entry: FeedbackEntry) -> Result<Plan, PlanEditError> {
        let mut next = self.clone();
        next.ledger.append(entry)?;
        Ok(next)
    }

    pub(crate) fn set_status_at(&mut self, location: Location, status: Status) {
        match location {
            Location::Epic(e) => self.epics[e].set_status(status),
            Location::Story(e, s) => {
                if let Some(story) = self.epics[e].story_mut(s) {
                    story.set_status(status);
                }
            }
            Location::Task(e, s, t) => {
                if let Some(task) = self.epics[e]
                    .story_mut(s)
                    .and_then(|story| story.task_mut(t))
                {
                    task.set_status(status);
                }
            }
        }
    }
}
