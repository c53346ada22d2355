//! Read-only projections of a plan.
//!
//! [`outline`] lists the hierarchy one line per entity; [`graph`] flattens
//! it into nodes and edges for renderers and JSON consumers.

pub mod render;

use std::collections::HashSet;
use std::fmt;

use serde::Serialize;

use crate::model::{Entities, EntityKind, EntityRef, Plan, Status};

// ---------------------------------------------------------------------------
// Outline
// ---------------------------------------------------------------------------

/// One entity of the outline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct OutlineLine<'a> {
    pub id: &'a str,
    pub kind: EntityKind,
    /// Epic 0, story 1, task 2.
    pub depth: usize,
    pub status: Status,
    pub description: &'a str,
}

impl fmt::Display for OutlineLine<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:indent$}{} [{}] {}",
            "",
            self.id,
            self.status,
            self.description,
            indent = self.depth * 2
        )
    }
}

impl<'a> From<EntityRef<'a>> for OutlineLine<'a> {
    fn from(entity: EntityRef<'a>) -> Self {
        let kind = entity.kind();
        Self {
            id: entity.id(),
            kind,
            depth: kind.depth(),
            status: entity.status(),
            description: entity.description(),
        }
    }
}

/// Lazy outline of a plan in depth-first order. Clone it to walk again.
#[derive(Debug, Clone)]
pub struct Outline<'a> {
    entities: Entities<'a>,
}

impl<'a> Iterator for Outline<'a> {
    type Item = OutlineLine<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        self.entities.next().map(OutlineLine::from)
    }
}

pub fn outline(plan: &Plan) -> Outline<'_> {
    Outline {
        entities: plan.entities(),
    }
}

// ---------------------------------------------------------------------------
// Graph
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphNode {
    pub id: String,
    pub kind: EntityKind,
    pub status: Status,
    pub description: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EdgeKind {
    /// Epic to story, story to task.
    Contains,
    /// Task to a task it depends on.
    DependsOn,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GraphEdge {
    pub from: String,
    pub to: String,
    pub kind: EdgeKind,
}

/// Node/edge projection of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlanGraph {
    pub nodes: Vec<GraphNode>,
    pub edges: Vec<GraphEdge>,
}

impl PlanGraph {
    pub fn edges_of_kind(&self, kind: EdgeKind) -> impl Iterator<Item = &GraphEdge> {
        self.edges.iter().filter(move |e| e.kind == kind)
    }
}

/// Project `plan` into nodes and edges.
///
/// Nodes follow the outline order. Each node's incoming containment edge
/// comes right before its own dependency edges, which follow declaration
/// order. Dependencies on ids that are not tasks are left out.
pub fn graph(plan: &Plan) -> PlanGraph {
    let task_ids: HashSet<&str> = plan.tasks().map(|t| t.id()).collect();
    let mut graph = PlanGraph::default();
    let mut epic = "";
    let mut story = "";

    for entity in plan.entities() {
        graph.nodes.push(GraphNode {
            id: entity.id().to_owned(),
            kind: entity.kind(),
            status: entity.status(),
            description: entity.description().to_owned(),
        });
        let parent = match entity {
            EntityRef::Epic(e) => {
                epic = e.id();
                None
            }
            EntityRef::Story(s) => {
                story = s.id();
                Some(epic)
            }
            EntityRef::Task(_) => Some(story),
        };
        if let Some(parent) = parent {
            graph.edges.push(GraphEdge {
                from: parent.to_owned(),
                to: entity.id().to_owned(),
                kind: EdgeKind::Contains,
            });
        }
        if let EntityRef::Task(task) = entity {
            for dependency in task.dependencies() {
                if task_ids.contains(dependency.as_str()) {
                    graph.edges.push(GraphEdge {
                        from: task.id().to_owned(),
                        to: dependency.clone(),
                        kind: EdgeKind::DependsOn,
                    });
                }
            }
        }
    }
    graph
}
