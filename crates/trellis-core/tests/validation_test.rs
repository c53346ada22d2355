//! End-to-end validation scenarios over whole plans.

use trellis_core::view::{self, render};
use trellis_core::{
    Format, GraphError, Status, StatusEngine, UnconsultedFeedbackError, UnmetCondition, Violation,
    parse, serialize, validate, validate_mutation, validate_reopen,
};
use trellis_test_utils::{PlanBuilder, SAMPLE_PLAN_TOML, numbered_ledger};

#[test]
fn sample_document_is_valid() {
    let plan = parse(SAMPLE_PLAN_TOML, Format::Toml).expect("sample should parse");
    let validated = validate(&plan).expect("sample should validate");

    assert_eq!(validated.epics().len(), 2);
    assert_eq!(
        validated.graph().topological_order().unwrap(),
        ["task1", "task2", "task3", "task4", "task5"]
    );
    let scope = validated.ledger().initial_scope().unwrap();
    assert_eq!(scope.id(), "FB-1");
    assert!(scope.message().ends_with("Every change must respect dependencies."));
}

#[test]
fn sample_document_roundtrips() {
    let plan = parse(SAMPLE_PLAN_TOML, Format::Toml).unwrap();
    for format in [Format::Toml, Format::Json] {
        let text = serialize(&plan, format).unwrap();
        assert_eq!(parse(&text, format).unwrap(), plan, "{format} roundtrip");
    }
}

#[test]
fn complete_task_with_pending_dependency_is_rejected() {
    let plan = PlanBuilder::new()
        .epic("epic1", Status::InProgress)
        .story("story1", Status::InProgress)
        .task("task1", Status::Pending, &[])
        .task("task2", Status::Complete, &["task1"])
        .build();
    let violations = validate(&plan).unwrap_err().into_vec();
    assert_eq!(violations.len(), 1);
    match &violations[0] {
        Violation::Status(err) => {
            assert_eq!(err.id, "task2");
            assert!(matches!(
                &err.condition,
                UnmetCondition::DependencyIncomplete { dependency, status: Status::Pending }
                    if dependency == "task1"
            ));
        }
        other => panic!("expected status violation, got: {other}"),
    }
}

#[test]
fn mutual_dependency_names_both_tasks() {
    let plan = PlanBuilder::new()
        .epic("epic1", Status::Pending)
        .story("story1", Status::Pending)
        .task("t1", Status::Pending, &["t2"])
        .task("t2", Status::Pending, &["t1"])
        .build();
    let violations = validate(&plan).unwrap_err();
    let cycle = violations
        .iter()
        .find_map(|v| match v {
            Violation::Cyclic(c) => Some(&c.cycle),
            _ => None,
        })
        .expect("cycle reported");
    assert!(cycle.contains(&"t1".to_owned()));
    assert!(cycle.contains(&"t2".to_owned()));
}

#[test]
fn dangling_dependency_is_reported() {
    let plan = PlanBuilder::new()
        .epic("epic1", Status::Pending)
        .story("story1", Status::Pending)
        .task("task1", Status::Pending, &["ghost"])
        .build();
    let violations = validate(&plan).unwrap_err().into_vec();
    assert!(matches!(
        &violations[..],
        [Violation::Dangling(d)] if d.task == "task1" && d.missing == "ghost"
    ));

    let errors = trellis_core::DependencyGraph::build(&plan).unwrap_err();
    assert!(matches!(&errors[..], [GraphError::Dangling(_)]));
}

#[test]
fn reopen_resets_dependent_task() {
    let prior = PlanBuilder::new()
        .epic("epic1", Status::Complete)
        .story("story1", Status::Complete)
        .task("task1", Status::Complete, &[])
        .task("task2", Status::Complete, &["task1"])
        .feedback("FB-1", "initial scope")
        .build();
    let validated = validate(&prior).unwrap();

    let reopened = StatusEngine::reopen(&prior, validated.graph(), "task1").unwrap();
    assert_eq!(reopened.reset, ["task1", "task2"]);
    for id in ["task1", "task2"] {
        assert_eq!(reopened.plan.task(id).unwrap().status(), Status::Pending);
    }

    let marker = reopened.plan.ledger().consult();
    let affected: Vec<&str> = reopened.affected().collect();
    let accepted = validate_reopen(&prior, &reopened.plan, &marker, &affected).unwrap();
    assert!(accepted.tasks().all(|t| t.status() == Status::Pending));

    // Reverting by hand instead of through reopen is a regression.
    let violations = validate_mutation(&prior, &reopened.plan, &marker).unwrap_err();
    assert!(violations.iter().any(|v| matches!(v, Violation::Regression(_))));
}

#[test]
fn stale_marker_blocks_mutation() {
    let prior_ledger = numbered_ledger(5);
    let marker = prior_ledger.consult();
    let ledger = numbered_ledger(7);
    let err = ledger.require_consulted(&marker).unwrap_err();
    assert_eq!(
        err,
        UnconsultedFeedbackError::Stale {
            acknowledged: "FB-5".into(),
            tail: "FB-7".into(),
            unread: 2,
        }
    );
    assert!(err.to_string().contains("FB-7"));

    let mut plan = PlanBuilder::new()
        .epic("epic1", Status::Pending)
        .story("story1", Status::Pending)
        .task("task1", Status::Pending, &[])
        .build();
    for entry in ledger.entries() {
        plan = plan.with_feedback(entry.clone()).unwrap();
    }
    let candidate = plan.with_status("task1", Status::InProgress).unwrap();
    let violations = validate_mutation(&plan, &candidate, &marker).unwrap_err();
    assert!(violations.iter().any(|v| matches!(v, Violation::Unconsulted(_))));
    assert!(validate_mutation(&plan, &candidate, &ledger.consult()).is_ok());
}

#[test]
fn views_are_deterministic() {
    let plan = parse(SAMPLE_PLAN_TOML, Format::Toml).unwrap();
    let outline_a: Vec<String> = view::outline(&plan).map(|l| l.to_string()).collect();
    let outline_b: Vec<String> = view::outline(&plan).map(|l| l.to_string()).collect();
    assert_eq!(outline_a, outline_b);
    assert_eq!(outline_a[0], "epic1 [in_progress] Plan consistency engine");
    assert_eq!(outline_a[2], "    task1 [complete] Define the document schema");

    let graph = view::graph(&plan);
    assert_eq!(graph, view::graph(&plan));
    assert_eq!(render::mermaid(&graph, false), render::mermaid(&view::graph(&plan), false));
    assert_eq!(
        render::markdown(&plan, render::MarkdownOptions::default()),
        render::markdown(&plan, render::MarkdownOptions::default())
    );
}
