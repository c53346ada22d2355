//! Epic, story and task value types.
//!
//! Every constructor validates its fields and returns a [`ValidationError`]
//! on the first violated constraint. Children are owned in order; a task
//! never points back at its story; parent lookups go through
//! [`super::PlanIndex`].

use chrono::{DateTime, Utc};

use super::{
    EntityKind, Priority, Status, ValidationError, checked_description, checked_id,
    checked_priority,
};

/// Optional creation and modification times carried by any plan element.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Timestamps {
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Timestamps {
    fn checked(self, kind: EntityKind, id: &str) -> Result<Self, ValidationError> {
        if let (Some(created), Some(updated)) = (self.created_at, self.updated_at) {
            if updated < created {
                return Err(ValidationError::TimestampOrder {
                    kind,
                    id: id.to_owned(),
                });
            }
        }
        Ok(self)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// The smallest unit of work. Depends on other tasks by id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    id: String,
    description: String,
    priority: Priority,
    status: Status,
    dependencies: Vec<String>,
    timestamps: Timestamps,
}

impl Task {
    /// Create a task with no dependencies.
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        priority: i64,
        status: Status,
    ) -> Result<Self, ValidationError> {
        let id = checked_id(id.into())?;
        let description = checked_description(EntityKind::Task, &id, description.into())?;
        let priority = checked_priority(EntityKind::Task, &id, priority)?;
        Ok(Self {
            id,
            description,
            priority,
            status,
            dependencies: Vec::new(),
            timestamps: Timestamps::default(),
        })
    }

    /// Append dependency ids, keeping declaration order.
    ///
    /// Ids must be well-formed and not repeat. Whether they resolve is a
    /// plan-level question answered by [`crate::graph::DependencyGraph`].
    pub fn depends_on<I, S>(mut self, dependencies: I) -> Result<Self, ValidationError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        for dependency in dependencies {
            let dependency = checked_id(dependency.into())?;
            if self.dependencies.contains(&dependency) {
                return Err(ValidationError::DuplicateDependency {
                    id: self.id,
                    dependency,
                });
            }
            self.dependencies.push(dependency);
        }
        Ok(self)
    }

    pub fn with_timestamps(mut self, timestamps: Timestamps) -> Result<Self, ValidationError> {
        self.timestamps = timestamps.checked(EntityKind::Task, &self.id)?;
        Ok(self)
    }

    /// The same task with a different status.
    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn dependencies(&self) -> &[String] {
        &self.dependencies
    }

    pub fn timestamps(&self) -> Timestamps {
        self.timestamps
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }
}

// ---------------------------------------------------------------------------
// Story
// ---------------------------------------------------------------------------

/// A user-facing slice of an epic, estimated in points.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Story {
    id: String,
    description: String,
    priority: Priority,
    points: u32,
    status: Status,
    tasks: Vec<Task>,
    timestamps: Timestamps,
}

impl Story {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        priority: i64,
        points: i64,
        status: Status,
        tasks: Vec<Task>,
    ) -> Result<Self, ValidationError> {
        let id = checked_id(id.into())?;
        let description = checked_description(EntityKind::Story, &id, description.into())?;
        let priority = checked_priority(EntityKind::Story, &id, priority)?;
        let points = u32::try_from(points).map_err(|_| {
            let id = id.clone();
            if points < 0 {
                ValidationError::NegativePoints { id, value: points }
            } else {
                ValidationError::PointsOutOfRange { id, value: points }
            }
        })?;
        if tasks.is_empty() {
            return Err(ValidationError::NoChildren {
                kind: EntityKind::Story,
                id,
                child: EntityKind::Task,
            });
        }
        Ok(Self {
            id,
            description,
            priority,
            points,
            status,
            tasks,
            timestamps: Timestamps::default(),
        })
    }

    pub fn with_timestamps(mut self, timestamps: Timestamps) -> Result<Self, ValidationError> {
        self.timestamps = timestamps.checked(EntityKind::Story, &self.id)?;
        Ok(self)
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn points(&self) -> u32 {
        self.points
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn tasks(&self) -> &[Task] {
        &self.tasks
    }

    pub fn timestamps(&self) -> Timestamps {
        self.timestamps
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub(crate) fn task_mut(&mut self, index: usize) -> Option<&mut Task> {
        self.tasks.get_mut(index)
    }
}

// ---------------------------------------------------------------------------
// Epic
// ---------------------------------------------------------------------------

/// A large body of work made of stories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Epic {
    id: String,
    description: String,
    priority: Priority,
    status: Status,
    stories: Vec<Story>,
    timestamps: Timestamps,
}

impl Epic {
    pub fn new(
        id: impl Into<String>,
        description: impl Into<String>,
        priority: i64,
        status: Status,
        stories: Vec<Story>,
    ) -> Result<Self, ValidationError> {
        let id = checked_id(id.into())?;
        let description = checked_description(EntityKind::Epic, &id, description.into())?;
        let priority = checked_priority(EntityKind::Epic, &id, priority)?;
        if stories.is_empty() {
            return Err(ValidationError::NoChildren {
                kind: EntityKind::Epic,
                id,
                child: EntityKind::Story,
            });
        }
        Ok(Self {
            id,
            description,
            priority,
            status,
            stories,
            timestamps: Timestamps::default(),
        })
    }

    pub fn with_timestamps(mut self, timestamps: Timestamps) -> Result<Self, ValidationError> {
        self.timestamps = timestamps.checked(EntityKind::Epic, &self.id)?;
        Ok(self)
    }

    pub fn with_status(mut self, status: Status) -> Self {
        self.status = status;
        self
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn stories(&self) -> &[Story] {
        &self.stories
    }

    /// Every task of every story, in order.
    pub fn tasks(&self) -> impl Iterator<Item = &Task> {
        self.stories.iter().flat_map(|s| s.tasks.iter())
    }

    pub fn timestamps(&self) -> Timestamps {
        self.timestamps
    }

    pub(crate) fn set_status(&mut self, status: Status) {
        self.status = status;
    }

    pub(crate) fn story_mut(&mut self, index: usize) -> Option<&mut Story> {
        self.stories.get_mut(index)
    }
}
