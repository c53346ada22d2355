//! Status state machine and cross-level consistency rules.
//!
//! Every epic, story and task moves through
//!
//! ```text
//! pending     -> in_progress
//! in_progress -> complete
//! ```
//!
//! Moving backwards is only legal through [`StatusEngine::reopen`].
//! Consistency rules are checked over *effective* completeness: an entity
//! counts as complete only if it says so and its own rule holds, so one
//! bad completion shows up on every dependent and container above it.

pub mod dispatch;
pub mod queries;

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;

use crate::graph::DependencyGraph;
use crate::model::{EntityKind, Location, Plan, Status, Task};

/// The rule an entity's status fails to satisfy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnmetCondition {
    /// A dependency is not complete.
    DependencyIncomplete { dependency: String, status: Status },
    /// A dependency says complete but its own completion is invalid.
    DependencyCompletionInvalid { dependency: String },
    /// Some children are not (effectively) complete.
    ChildrenIncomplete { child: EntityKind, ids: Vec<String> },
    /// In progress, yet every descendant is still pending.
    NoActiveDescendant,
}

impl fmt::Display for UnmetCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::DependencyIncomplete { dependency, status } => {
                write!(f, "dependency {dependency:?} is {status}")
            }
            Self::DependencyCompletionInvalid { dependency } => {
                write!(f, "dependency {dependency:?} is not validly complete")
            }
            Self::ChildrenIncomplete { child, ids } => {
                write!(f, "not every {child} is complete ({})", ids.join(", "))
            }
            Self::NoActiveDescendant => f.write_str("nothing under it has started"),
        }
    }
}

/// An entity whose status contradicts its children or dependencies.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} {id:?} is {status} but {condition}")]
pub struct StatusConsistencyError {
    pub id: String,
    pub kind: EntityKind,
    pub status: Status,
    pub condition: UnmetCondition,
}

/// A status that moved backwards between two versions of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} {id:?} went from {from} back to {to}; only reopen may move work backwards")]
pub struct StatusRegression {
    pub id: String,
    pub kind: EntityKind,
    pub from: Status,
    pub to: Status,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReopenError {
    #[error("no task with id {0:?}")]
    UnknownTask(String),

    #[error("task {id:?} is {status}; only complete tasks can be reopened")]
    NotComplete { id: String, status: Status },
}

/// Result of [`StatusEngine::reopen`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reopened {
    pub plan: Plan,
    /// Tasks reset to pending: the reopened task first, then its complete
    /// transitive dependents.
    pub reset: Vec<String>,
    /// Stories and epics moved back because of the reset.
    pub demoted: Vec<String>,
}

impl Reopened {
    /// Every id whose status changed.
    pub fn affected(&self) -> impl Iterator<Item = &str> {
        self.reset.iter().chain(&self.demoted).map(String::as_str)
    }
}

/// The status engine.
pub struct StatusEngine;

impl StatusEngine {
    /// Whether `from -> to` is an edge of the state machine.
    pub fn is_valid_transition(from: Status, to: Status) -> bool {
        from.can_advance_to(to)
    }

    /// Collect every consistency violation in `plan`.
    ///
    /// Tasks are checked in topological order so effective completeness is
    /// known for each dependency before its dependents. On a cyclic graph
    /// tasks fall back to plan order and unvisited dependencies are taken
    /// at their stated status.
    pub fn check(plan: &Plan, graph: &DependencyGraph) -> Vec<StatusConsistencyError> {
        let mut tasks: HashMap<&str, &Task> = HashMap::new();
        for task in plan.tasks() {
            tasks.entry(task.id()).or_insert(task);
        }
        let order = graph
            .topological_order()
            .unwrap_or_else(|| graph.ids().collect());

        let mut errors = Vec::new();
        let mut effective: HashMap<&str, bool> = HashMap::new();

        for id in order {
            let Some(task) = tasks.get(id) else { continue };
            let mut valid = true;
            if task.status() == Status::Complete {
                for dependency in graph.dependencies_of(id) {
                    let Some(dep) = tasks.get(dependency) else { continue };
                    let stated = dep.status() == Status::Complete;
                    if effective.get(dependency).copied().unwrap_or(stated) {
                        continue;
                    }
                    valid = false;
                    let condition = if stated {
                        UnmetCondition::DependencyCompletionInvalid {
                            dependency: dependency.to_owned(),
                        }
                    } else {
                        UnmetCondition::DependencyIncomplete {
                            dependency: dependency.to_owned(),
                            status: dep.status(),
                        }
                    };
                    errors.push(StatusConsistencyError {
                        id: id.to_owned(),
                        kind: EntityKind::Task,
                        status: task.status(),
                        condition,
                    });
                }
            }
            effective.insert(id, valid && task.status() == Status::Complete);
        }

        let is_done = |id: &str| effective.get(id).copied().unwrap_or(false);
        let mut story_done: HashMap<&str, bool> = HashMap::new();

        for story in plan.stories() {
            let incomplete: Vec<String> = story
                .tasks()
                .iter()
                .filter(|t| !is_done(t.id()))
                .map(|t| t.id().to_owned())
                .collect();
            let active = story.tasks().iter().any(|t| t.status() != Status::Pending);
            if let Some(condition) =
                container_condition(story.status(), EntityKind::Task, incomplete, active)
            {
                errors.push(StatusConsistencyError {
                    id: story.id().to_owned(),
                    kind: EntityKind::Story,
                    status: story.status(),
                    condition,
                });
            } else {
                story_done.insert(story.id(), story.status() == Status::Complete);
            }
        }

        for epic in plan.epics() {
            let incomplete: Vec<String> = epic
                .stories()
                .iter()
                .filter(|s| !story_done.get(s.id()).copied().unwrap_or(false))
                .map(|s| s.id().to_owned())
                .collect();
            let active = epic.stories().iter().any(|s| s.status() != Status::Pending)
                || epic.tasks().any(|t| t.status() != Status::Pending);
            if let Some(condition) =
                container_condition(epic.status(), EntityKind::Story, incomplete, active)
            {
                errors.push(StatusConsistencyError {
                    id: epic.id().to_owned(),
                    kind: EntityKind::Epic,
                    status: epic.status(),
                    condition,
                });
            }
        }

        errors
    }

    /// Every entity present in both plans whose status went backwards.
    pub fn regressions(prior: &Plan, candidate: &Plan) -> Vec<StatusRegression> {
        let before: HashMap<&str, Status> = prior
            .entities()
            .map(|e| (e.id(), e.status()))
            .collect();
        candidate
            .entities()
            .filter_map(|e| {
                let from = *before.get(e.id())?;
                from.regresses_to(e.status()).then(|| StatusRegression {
                    id: e.id().to_owned(),
                    kind: e.kind(),
                    from,
                    to: e.status(),
                })
            })
            .collect()
    }

    /// Reopen a complete task.
    ///
    /// The task and every complete task depending on it, directly or not,
    /// go back to pending. Each story and epic containing one of those tasks
    /// is then demoted if its status no longer holds: a complete container
    /// becomes in_progress while something under it has started, pending
    /// otherwise; an in_progress container with nothing started becomes
    /// pending.
    pub fn reopen(
        plan: &Plan,
        graph: &DependencyGraph,
        task_id: &str,
    ) -> Result<Reopened, ReopenError> {
        let task = plan
            .task(task_id)
            .ok_or_else(|| ReopenError::UnknownTask(task_id.to_owned()))?;
        if task.status() != Status::Complete {
            return Err(ReopenError::NotComplete {
                id: task_id.to_owned(),
                status: task.status(),
            });
        }

        let index = plan.index();
        let mut next = plan.clone();
        let mut reset = vec![task_id.to_owned()];
        reset.extend(
            graph
                .transitive_dependents(task_id)
                .into_iter()
                .filter(|id| plan.task(id).is_some_and(|t| t.status() == Status::Complete))
                .map(str::to_owned),
        );

        let mut stories = BTreeSet::new();
        for id in &reset {
            if let Some(location @ Location::Task(e, s, _)) = index.locate(id) {
                next.set_status_at(location, Status::Pending);
                stories.insert((e, s));
            }
        }

        let mut demoted = Vec::new();
        for &(e, s) in &stories {
            let story = &next.epics()[e].stories()[s];
            let active = story.tasks().iter().any(|t| t.status() != Status::Pending);
            if let Some(status) = demotion(story.status(), active) {
                demoted.push(story.id().to_owned());
                next.set_status_at(Location::Story(e, s), status);
            }
        }

        let epics: BTreeSet<usize> = stories.iter().map(|&(e, _)| e).collect();
        for e in epics {
            let epic = &next.epics()[e];
            let active = epic.stories().iter().any(|s| s.status() != Status::Pending)
                || epic.tasks().any(|t| t.status() != Status::Pending);
            if let Some(status) = demotion(epic.status(), active) {
                demoted.push(epic.id().to_owned());
                next.set_status_at(Location::Epic(e), status);
            }
        }

        tracing::info!(
            task = task_id,
            reset = reset.len(),
            demoted = demoted.len(),
            "task reopened"
        );
        Ok(Reopened {
            plan: next,
            reset,
            demoted,
        })
    }

    /// Status of `id` in `plan`, whatever its kind.
    pub fn status_of(plan: &Plan, id: &str) -> Option<Status> {
        plan.find(id).map(|e| e.status())
    }
}

fn container_condition(
    status: Status,
    child: EntityKind,
    incomplete: Vec<String>,
    active: bool,
) -> Option<UnmetCondition> {
    match status {
        Status::Complete if !incomplete.is_empty() => Some(UnmetCondition::ChildrenIncomplete {
            child,
            ids: incomplete,
        }),
        Status::InProgress if !active => Some(UnmetCondition::NoActiveDescendant),
        _ => None,
    }
}

fn demotion(status: Status, active: bool) -> Option<Status> {
    match (status, active) {
        (Status::Complete, true) => Some(Status::InProgress),
        (Status::Complete, false) | (Status::InProgress, false) => Some(Status::Pending),
        _ => None,
    }
}
