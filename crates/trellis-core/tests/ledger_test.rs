//! Feedback ledger gating across concurrent editors.

use std::sync::Arc;
use std::thread;

use trellis_core::{
    ConsultationMarker, FeedbackEntry, SharedLedger, Status, UnconsultedFeedbackError,
    ValidatedPlan, validate, validate_mutation,
};
use trellis_test_utils::{PlanBuilder, at_minute, numbered_ledger};

fn assert_send_sync<T: Send + Sync>() {}

#[test]
fn validated_plan_is_shareable() {
    assert_send_sync::<ValidatedPlan>();
    assert_send_sync::<SharedLedger>();

    let plan = PlanBuilder::new()
        .epic("epic1", Status::InProgress)
        .story("story1", Status::InProgress)
        .task("task1", Status::InProgress, &[])
        .feedback("FB-1", "scope")
        .build();
    let validated = Arc::new(validate(&plan).unwrap());
    let readers: Vec<_> = (0..4)
        .map(|_| {
            let validated = Arc::clone(&validated);
            thread::spawn(move || validated.graph().len())
        })
        .collect();
    for reader in readers {
        assert_eq!(reader.join().unwrap(), 1);
    }
}

#[test]
fn editor_must_reread_after_concurrent_feedback() {
    let shared = SharedLedger::new(numbered_ledger(5));
    let (snapshot, marker) = shared.consult();
    assert_eq!(snapshot.len(), 5);

    // Two more pieces of feedback arrive while the editor is working.
    for i in 6..=7 {
        let entry = FeedbackEntry::new(format!("FB-{i}"), "late", at_minute(i)).unwrap();
        shared.append(entry).unwrap();
    }
    assert!(matches!(
        shared.require_consulted(&marker),
        Err(UnconsultedFeedbackError::Stale { unread: 2, .. })
    ));

    let (current, fresh) = shared.consult();
    assert_eq!(current.tail().map(FeedbackEntry::id), Some("FB-7"));
    assert!(shared.require_consulted(&fresh).is_ok());
}

#[test]
fn marker_survives_text_form() {
    let plan = PlanBuilder::new()
        .epic("epic1", Status::Pending)
        .story("story1", Status::Pending)
        .task("task1", Status::Pending, &[])
        .feedback("FB-1", "scope")
        .feedback("FB-2", "revision")
        .build();
    let candidate = plan.with_status("task1", Status::InProgress).unwrap();
    let text = candidate.ledger().consult().to_string();
    assert!(text.starts_with("2:FB-2:"));

    let marker: ConsultationMarker = text.parse().unwrap();
    assert!(validate_mutation(&plan, &candidate, &marker).is_ok());
}
