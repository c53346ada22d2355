//! Plan consistency and dependency engine.
//!
//! A plan is a tree of epics, stories and tasks with task-to-task
//! dependencies overlaid on it, plus an append-only ledger of user feedback.
//! This crate parses plan documents, validates them in a single pass
//! (structure, dependency graph, status consistency, ledger consultation)
//! and projects accepted plans into outlines and graph descriptions.

pub mod document;
pub mod graph;
pub mod ledger;
pub mod model;
pub mod status;
pub mod validate;
pub mod view;

pub use document::{Format, ParseError, SerializeError, parse, serialize};
pub use graph::{CyclicDependencyError, DanglingDependencyError, DependencyGraph, GraphError};
pub use ledger::{
    ConsultationMarker, FeedbackEntry, FeedbackKind, FeedbackLedger, LedgerOrderError,
    SharedLedger, UnconsultedFeedbackError,
};
pub use model::{
    EntityKind, EntityRef, Epic, Plan, PlanEditError, PlanMetadata, Priority, Status, Story, Task,
    Timestamps, ValidationError,
};
pub use status::dispatch::TransitionError;
pub use status::queries::{PlanProgress, progress, ready_tasks};
pub use status::{
    ReopenError, Reopened, StatusConsistencyError, StatusEngine, StatusRegression, UnmetCondition,
};
pub use validate::{
    StructuralError, ValidatedPlan, ValidationResult, Violation, Violations, validate,
    validate_mutation, validate_reopen,
};
