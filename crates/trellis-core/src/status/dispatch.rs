//! Forward status changes with semantic names.
//!
//! Each helper checks the state machine edge and the completion
//! preconditions before returning the updated plan.

use thiserror::Error;

use crate::model::{EntityKind, EntityRef, Plan, PlanEditError, Status};

use super::StatusEngine;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error(transparent)]
    Edit(#[from] PlanEditError),

    #[error("invalid status transition for {kind} {id:?}: {from} -> {to}")]
    Invalid {
        id: String,
        kind: EntityKind,
        from: Status,
        to: Status,
    },

    #[error("{kind} {id:?} cannot complete before {}", join(.blocking))]
    Blocked {
        id: String,
        kind: EntityKind,
        blocking: Vec<String>,
    },
}

fn join(ids: &[String]) -> String {
    ids.join(", ")
}

/// Move `id` one step forward to `to`.
///
/// Starting an entity also starts any pending story or epic above it.
/// Completing one requires every dependency (for a task) or child (for a
/// story or epic) to be complete already.
pub fn transition(plan: &Plan, id: &str, to: Status) -> Result<Plan, TransitionError> {
    let entity = plan
        .find(id)
        .ok_or_else(|| PlanEditError::UnknownEntity(id.to_owned()))?;
    let from = entity.status();
    if !StatusEngine::is_valid_transition(from, to) {
        return Err(TransitionError::Invalid {
            id: id.to_owned(),
            kind: entity.kind(),
            from,
            to,
        });
    }

    if to == Status::Complete {
        let blocking = blocking(plan, entity);
        if !blocking.is_empty() {
            return Err(TransitionError::Blocked {
                id: id.to_owned(),
                kind: entity.kind(),
                blocking,
            });
        }
    }

    let mut next = plan.with_status(id, to)?;
    if to == Status::InProgress {
        let mut current = id.to_owned();
        while let Some(parent) = next.parent_of(&current).map(str::to_owned) {
            if StatusEngine::status_of(&next, &parent) == Some(Status::Pending) {
                next = next.with_status(&parent, Status::InProgress)?;
            }
            current = parent;
        }
    }
    tracing::debug!(id, %from, %to, "status advanced");
    Ok(next)
}

/// `pending -> in_progress`.
pub fn start(plan: &Plan, id: &str) -> Result<Plan, TransitionError> {
    transition(plan, id, Status::InProgress)
}

/// `in_progress -> complete`.
pub fn complete(plan: &Plan, id: &str) -> Result<Plan, TransitionError> {
    transition(plan, id, Status::Complete)
}

/// Ids that must be complete before `entity` can be.
fn blocking(plan: &Plan, entity: EntityRef<'_>) -> Vec<String> {
    let required: Vec<(&str, Option<Status>)> = match entity {
        EntityRef::Task(task) => task
            .dependencies()
            .iter()
            .map(|dep| (dep.as_str(), plan.task(dep).map(|t| t.status())))
            .collect(),
        EntityRef::Story(story) => story
            .tasks()
            .iter()
            .map(|t| (t.id(), Some(t.status())))
            .collect(),
        EntityRef::Epic(epic) => epic
            .stories()
            .iter()
            .map(|s| (s.id(), Some(s.status())))
            .collect(),
    };
    required
        .into_iter()
        .filter(|(_, status)| *status != Some(Status::Complete))
        .map(|(id, _)| id.to_owned())
        .collect()
}
