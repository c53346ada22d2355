//! Plan validation.
//!
//! Runs the checks in a fixed order and aggregates every problem found:
//!
//! 1. Structure: ids are unique across the plan. A duplicate makes every
//!    id-keyed check meaningless, so the remaining stages are skipped.
//! 2. Dependency graph: dangling references and cycles.
//! 3. Status consistency, skipped when the graph has a cycle.
//! 4. For mutations: ledger history, ledger consultation and status
//!    regressions against the prior plan.

use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;

use thiserror::Error;

use crate::graph::{CyclicDependencyError, DanglingDependencyError, DependencyGraph, GraphError};
use crate::ledger::{ConsultationMarker, LedgerOrderError, UnconsultedFeedbackError};
use crate::model::{EntityKind, Plan};
use crate::status::{StatusConsistencyError, StatusEngine, StatusRegression};

/// A structural defect that stops validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructuralError {
    #[error("id {id:?} is used by both a {first} and a {second}")]
    DuplicateId {
        id: String,
        first: EntityKind,
        second: EntityKind,
    },
}

/// A single validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
    #[error(transparent)]
    Structural(#[from] StructuralError),
    #[error(transparent)]
    Dangling(#[from] DanglingDependencyError),
    #[error(transparent)]
    Cyclic(#[from] CyclicDependencyError),
    #[error(transparent)]
    Status(#[from] StatusConsistencyError),
    #[error(transparent)]
    Regression(#[from] StatusRegression),
    #[error(transparent)]
    Ledger(#[from] LedgerOrderError),
    #[error(transparent)]
    Unconsulted(#[from] UnconsultedFeedbackError),
}

impl From<GraphError> for Violation {
    fn from(err: GraphError) -> Self {
        match err {
            GraphError::Dangling(e) => Self::Dangling(e),
            GraphError::Cyclic(e) => Self::Cyclic(e),
        }
    }
}

impl Violation {
    /// Whether this violation stopped the remaining checks.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Structural(_))
    }
}

/// A non-empty, ordered list of violations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violations(Vec<Violation>);

impl Violations {
    pub fn iter(&self) -> std::slice::Iter<'_, Violation> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_vec(self) -> Vec<Violation> {
        self.0
    }
}

impl fmt::Display for Violations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "plan rejected with {} violation(s):", self.0.len())?;
        for violation in &self.0 {
            write!(f, "\n  - {violation}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Violations {}

impl<'a> IntoIterator for &'a Violations {
    type Item = &'a Violation;
    type IntoIter = std::slice::Iter<'a, Violation>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

/// A plan that passed validation, with the graph built for it.
#[derive(Debug, Clone)]
pub struct ValidatedPlan {
    plan: Plan,
    graph: DependencyGraph,
}

impl ValidatedPlan {
    pub fn plan(&self) -> &Plan {
        &self.plan
    }

    pub fn graph(&self) -> &DependencyGraph {
        &self.graph
    }

    pub fn into_plan(self) -> Plan {
        self.plan
    }
}

impl Deref for ValidatedPlan {
    type Target = Plan;

    fn deref(&self) -> &Plan {
        &self.plan
    }
}

pub type ValidationResult = Result<ValidatedPlan, Violations>;

/// Validate a plan on its own.
pub fn validate(plan: &Plan) -> ValidationResult {
    let (graph, violations) = check_plan(plan);
    finish(plan, graph, violations)
}

/// Validate `candidate` as the successor of `prior`.
///
/// On top of [`validate`], the candidate's ledger must extend the prior
/// one, `marker` must cover the candidate's full ledger, and no status may
/// move backwards.
pub fn validate_mutation(
    prior: &Plan,
    candidate: &Plan,
    marker: &ConsultationMarker,
) -> ValidationResult {
    validate_change(prior, candidate, marker, &[])
}

/// Like [`validate_mutation`], but the ids in `reopened` may move
/// backwards. Pass the ids reported by [`StatusEngine::reopen`].
pub fn validate_reopen<S: AsRef<str>>(
    prior: &Plan,
    candidate: &Plan,
    marker: &ConsultationMarker,
    reopened: &[S],
) -> ValidationResult {
    let allowed: Vec<&str> = reopened.iter().map(|id| id.as_ref()).collect();
    validate_change(prior, candidate, marker, &allowed)
}

fn validate_change(
    prior: &Plan,
    candidate: &Plan,
    marker: &ConsultationMarker,
    allowed: &[&str],
) -> ValidationResult {
    let (graph, mut violations) = check_plan(candidate);
    if graph.is_none() {
        tracing::debug!(stage = "mutation", "skipped: structural violations");
        return finish(candidate, graph, violations);
    }

    if let Err(err) = candidate.ledger().ensure_extends(prior.ledger()) {
        violations.push(err.into());
    }
    if let Err(err) = candidate.ledger().require_consulted(marker) {
        violations.push(err.into());
    }
    let regressions = StatusEngine::regressions(prior, candidate)
        .into_iter()
        .filter(|r| !allowed.contains(&r.id.as_str()));
    violations.extend(regressions.map(Violation::from));

    tracing::debug!(stage = "mutation", violations = violations.len(), "mutation checks done");
    finish(candidate, graph, violations)
}

/// Stages 1 to 3. Returns no graph when the structural check failed.
fn check_plan(plan: &Plan) -> (Option<DependencyGraph>, Vec<Violation>) {
    let structural = check_structure(plan);
    tracing::debug!(stage = "structure", violations = structural.len(), "stage done");
    if !structural.is_empty() {
        return (None, structural.into_iter().map(Violation::from).collect());
    }

    let (graph, graph_errors) = DependencyGraph::analyze(plan);
    let mut violations: Vec<Violation> = graph_errors.into_iter().map(Violation::from).collect();
    tracing::debug!(stage = "graph", violations = violations.len(), "stage done");

    if graph.is_acyclic() {
        let status = StatusEngine::check(plan, &graph);
        tracing::debug!(stage = "status", violations = status.len(), "stage done");
        violations.extend(status.into_iter().map(Violation::from));
    } else {
        tracing::debug!(stage = "status", "skipped: dependency graph has a cycle");
    }
    (Some(graph), violations)
}

fn check_structure(plan: &Plan) -> Vec<StructuralError> {
    let mut seen: HashMap<&str, EntityKind> = HashMap::new();
    let mut errors = Vec::new();
    let ids = plan
        .entities()
        .map(|e| (e.id(), e.kind()))
        .chain(plan.ledger().entries().iter().map(|f| (f.id(), EntityKind::Feedback)));
    for (id, kind) in ids {
        match seen.get(id) {
            Some(&first) => errors.push(StructuralError::DuplicateId {
                id: id.to_owned(),
                first,
                second: kind,
            }),
            None => {
                seen.insert(id, kind);
            }
        }
    }
    errors
}

fn finish(
    plan: &Plan,
    graph: Option<DependencyGraph>,
    violations: Vec<Violation>,
) -> ValidationResult {
    match graph {
        Some(graph) if violations.is_empty() => {
            tracing::info!(version = plan.version(), tasks = graph.len(), "plan valid");
            Ok(ValidatedPlan {
                plan: plan.clone(),
                graph,
            })
        }
        _ => {
            tracing::info!(
                version = plan.version(),
                violations = violations.len(),
                "plan rejected"
            );
            Err(Violations(violations))
        }
    }
}
