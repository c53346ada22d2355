//! Task dependency graph.
//!
//! Built from scratch on every validation pass. Nodes are tasks in plan
//! order; each node points at its dependencies in declared order, so every
//! traversal here is deterministic.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use thiserror::Error;

use crate::model::Plan;

/// A task depends on an id that is not a task in the plan.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("task {task:?} depends on unknown task {missing:?}")]
pub struct DanglingDependencyError {
    pub task: String,
    pub missing: String,
}

/// A dependency cycle. `cycle[i]` depends on `cycle[i + 1]`, and the last
/// id depends on the first.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("dependency cycle: {}", CyclePath(.cycle))]
pub struct CyclicDependencyError {
    pub cycle: Vec<String>,
}

struct CyclePath<'a>(&'a [String]);

impl fmt::Display for CyclePath<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for id in self.0 {
            write!(f, "{id} -> ")?;
        }
        match self.0.first() {
            Some(first) => f.write_str(first),
            None => Ok(()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GraphError {
    #[error(transparent)]
    Dangling(#[from] DanglingDependencyError),
    #[error(transparent)]
    Cyclic(#[from] CyclicDependencyError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    OnStack,
    Done,
}

/// Directed graph with an edge from each task to each of its dependencies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyGraph {
    ids: Vec<String>,
    index: HashMap<String, usize>,
    dependencies: Vec<Vec<usize>>,
    dependents: Vec<Vec<usize>>,
    /// Dependencies before dependents; `None` when a cycle exists.
    order: Option<Vec<usize>>,
}

impl DependencyGraph {
    /// Build the graph, failing with every dangling reference and every
    /// cycle found.
    pub fn build(plan: &Plan) -> Result<Self, Vec<GraphError>> {
        let (graph, errors) = Self::analyze(plan);
        if errors.is_empty() {
            Ok(graph)
        } else {
            Err(errors)
        }
    }

    /// Build the graph and report problems alongside it.
    ///
    /// Dangling references produce no edge. When a task id repeats, the
    /// first task with that id is the node.
    pub fn analyze(plan: &Plan) -> (Self, Vec<GraphError>) {
        let mut ids = Vec::new();
        let mut index = HashMap::new();
        let mut tasks = Vec::new();
        for task in plan.tasks() {
            if index.contains_key(task.id()) {
                continue;
            }
            index.insert(task.id().to_owned(), ids.len());
            ids.push(task.id().to_owned());
            tasks.push(task);
        }

        let mut errors = Vec::new();
        let mut dependencies = vec![Vec::new(); ids.len()];
        let mut dependents = vec![Vec::new(); ids.len()];
        for (node, task) in tasks.iter().enumerate() {
            for dependency in task.dependencies() {
                match index.get(dependency) {
                    Some(&target) => {
                        dependencies[node].push(target);
                        dependents[target].push(node);
                    }
                    None => errors.push(GraphError::Dangling(DanglingDependencyError {
                        task: task.id().to_owned(),
                        missing: dependency.clone(),
                    })),
                }
            }
        }

        let mut graph = Self {
            ids,
            index,
            dependencies,
            dependents,
            order: None,
        };
        let (postorder, cycles) = graph.depth_first();
        if cycles.is_empty() {
            graph.order = Some(postorder);
        }
        errors.extend(cycles.into_iter().map(|cycle| {
            GraphError::Cyclic(CyclicDependencyError {
                cycle: cycle.into_iter().map(|n| graph.ids[n].clone()).collect(),
            })
        }));

        tracing::debug!(
            tasks = graph.len(),
            edges = graph.edge_count(),
            problems = errors.len(),
            "dependency graph built"
        );
        (graph, errors)
    }

    /// Iterative DFS from every node in plan order. Returns the postorder
    /// and each distinct cycle closed by a back edge, rotated to start at
    /// its earliest node.
    fn depth_first(&self) -> (Vec<usize>, Vec<Vec<usize>>) {
        let mut marks = vec![Mark::Unvisited; self.ids.len()];
        let mut postorder = Vec::with_capacity(self.ids.len());
        let mut cycles = Vec::new();
        let mut seen = HashSet::new();

        for root in 0..self.ids.len() {
            if marks[root] != Mark::Unvisited {
                continue;
            }
            marks[root] = Mark::OnStack;
            let mut stack: Vec<(usize, usize)> = vec![(root, 0)];

            while let Some(&(node, cursor)) = stack.last() {
                let Some(&next) = self.dependencies[node].get(cursor) else {
                    marks[node] = Mark::Done;
                    postorder.push(node);
                    stack.pop();
                    continue;
                };
                if let Some(top) = stack.last_mut() {
                    top.1 += 1;
                }
                match marks[next] {
                    Mark::Unvisited => {
                        marks[next] = Mark::OnStack;
                        stack.push((next, 0));
                    }
                    Mark::OnStack => {
                        if let Some(start) = stack.iter().position(|&(n, _)| n == next) {
                            let mut cycle: Vec<usize> =
                                stack[start..].iter().map(|&(n, _)| n).collect();
                            let earliest = (0..cycle.len()).min_by_key(|&i| cycle[i]).unwrap_or(0);
                            cycle.rotate_left(earliest);
                            if seen.insert(cycle.clone()) {
                                cycles.push(cycle);
                            }
                        }
                    }
                    Mark::Done => {}
                }
            }
        }
        (postorder, cycles)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn edge_count(&self) -> usize {
        self.dependencies.iter().map(Vec::len).sum()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn is_acyclic(&self) -> bool {
        self.order.is_some()
    }

    /// Task ids in plan order.
    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.ids.iter().map(String::as_str)
    }

    /// Every task after all of its dependencies, or `None` if the graph has
    /// a cycle.
    pub fn topological_order(&self) -> Option<Vec<&str>> {
        self.order
            .as_ref()
            .map(|order| order.iter().map(|&n| self.ids[n].as_str()).collect())
    }

    /// Resolved dependencies of `id`, in declared order.
    pub fn dependencies_of(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, &self.dependencies)
    }

    /// Tasks that depend directly on `id`, in plan order.
    pub fn dependents_of(&self, id: &str) -> Vec<&str> {
        self.neighbours(id, &self.dependents)
    }

    /// Every task that depends on `id` directly or indirectly, nearest
    /// first. `id` itself is never included.
    pub fn transitive_dependents(&self, id: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(id) else {
            return Vec::new();
        };
        let mut visited = vec![false; self.ids.len()];
        visited[start] = true;
        let mut queue = VecDeque::from([start]);
        let mut found = Vec::new();
        while let Some(node) = queue.pop_front() {
            for &next in &self.dependents[node] {
                if !visited[next] {
                    visited[next] = true;
                    found.push(self.ids[next].as_str());
                    queue.push_back(next);
                }
            }
        }
        found
    }

    fn neighbours<'a>(&'a self, id: &str, adjacency: &'a [Vec<usize>]) -> Vec<&'a str> {
        self.index
            .get(id)
            .map(|&n| adjacency[n].iter().map(|&m| self.ids[m].as_str()).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::FeedbackLedger;
    use crate::model::{Epic, PlanMetadata, Status, Story, Task};

    /// One epic, one story, tasks given as `(id, deps)`.
    fn plan(tasks: &[(&str, &[&str])]) -> Plan {
        let tasks = tasks
            .iter()
            .map(|(id, deps)| {
                Task::new(*id, "work", 1, Status::Pending)
                    .and_then(|t| t.depends_on(deps.iter().copied()))
                    .unwrap()
            })
            .collect();
        let story = Story::new("s1", "story", 1, 1, Status::Pending, tasks).unwrap();
        let epic = Epic::new("e1", "epic", 1, Status::Pending, vec![story]).unwrap();
        Plan::new("1.0", vec![epic], FeedbackLedger::new(), PlanMetadata::default()).unwrap()
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let graph = DependencyGraph::build(&plan(&[
            ("deploy", &["build", "test"]),
            ("test", &["build"]),
            ("build", &[]),
        ]))
        .unwrap();
        assert_eq!(graph.topological_order().unwrap(), ["build", "test", "deploy"]);
        assert_eq!(graph.edge_count(), 3);
    }

    #[test]
    fn reverse_lookup() {
        let graph = DependencyGraph::build(&plan(&[
            ("a", &[]),
            ("b", &["a"]),
            ("c", &["a"]),
            ("d", &["b"]),
        ]))
        .unwrap();
        assert_eq!(graph.dependencies_of("d"), ["b"]);
        assert_eq!(graph.dependents_of("a"), ["b", "c"]);
        assert_eq!(graph.transitive_dependents("a"), ["b", "c", "d"]);
        assert!(graph.transitive_dependents("d").is_empty());
        assert!(graph.dependents_of("missing").is_empty());
    }

    #[test]
    fn two_task_cycle_names_both() {
        let errors =
            DependencyGraph::build(&plan(&[("t1", &["t2"]), ("t2", &["t1"])])).unwrap_err();
        assert_eq!(
            errors,
            [GraphError::Cyclic(CyclicDependencyError {
                cycle: vec!["t1".into(), "t2".into()],
            })]
        );
        assert_eq!(errors[0].to_string(), "dependency cycle: t1 -> t2 -> t1");
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let (graph, errors) = DependencyGraph::analyze(&plan(&[("t1", &["t1"])]));
        assert!(!graph.is_acyclic());
        assert!(graph.topological_order().is_none());
        assert!(matches!(&errors[..], [GraphError::Cyclic(c)] if c.cycle == ["t1"]));
    }

    #[test]
    fn distinct_cycles_reported_once_each() {
        let (_, errors) = DependencyGraph::analyze(&plan(&[
            ("a", &["b"]),
            ("b", &["a"]),
            ("c", &["d"]),
            ("d", &["e"]),
            ("e", &["c"]),
            ("f", &["a", "c"]),
        ]));
        let cycles: Vec<&[String]> = errors
            .iter()
            .map(|e| match e {
                GraphError::Cyclic(c) => c.cycle.as_slice(),
                other => panic!("unexpected {other}"),
            })
            .collect();
        assert_eq!(cycles.len(), 2);
        assert_eq!(cycles[0], ["a", "b"]);
        assert_eq!(cycles[1], ["c", "d", "e"]);
    }

    #[test]
    fn every_dangling_reference_is_reported() {
        let (graph, errors) =
            DependencyGraph::analyze(&plan(&[("a", &["x", "y"]), ("b", &["a", "z"])]));
        let missing: Vec<(&str, &str)> = errors
            .iter()
            .filter_map(|e| match e {
                GraphError::Dangling(d) => Some((d.task.as_str(), d.missing.as_str())),
                GraphError::Cyclic(_) => None,
            })
            .collect();
        assert_eq!(missing, [("a", "x"), ("a", "y"), ("b", "z")]);
        // Dangling edges are left out; the rest of the graph still orders.
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.topological_order().unwrap(), ["a", "b"]);
    }

    #[test]
    fn long_chain_does_not_recurse() {
        let ids: Vec<String> = (0..5000).map(|i| format!("t{i}")).collect();
        let tasks: Vec<Task> = ids
            .iter()
            .enumerate()
            .map(|(i, id)| {
                let t = Task::new(id.clone(), "step", 1, Status::Pending).unwrap();
                match i.checked_sub(1) {
                    Some(prev) => t.depends_on([ids[prev].clone()]).unwrap(),
                    None => t,
                }
            })
            .rev()
            .collect();
        let story = Story::new("s1", "story", 1, 1, Status::Pending, tasks).unwrap();
        let epic = Epic::new("e1", "epic", 1, Status::Pending, vec![story]).unwrap();
        let plan =
            Plan::new("1.0", vec![epic], FeedbackLedger::new(), PlanMetadata::default()).unwrap();

        let graph = DependencyGraph::build(&plan).unwrap();
        let order = graph.topological_order().unwrap();
        assert_eq!(order.first(), Some(&"t0"));
        assert_eq!(order.last(), Some(&"t4999"));
    }
}
