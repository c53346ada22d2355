//! Shared test utilities for trellis tests.
//!
//! Provides [`PlanBuilder`] for assembling plans in a few lines and the
//! sample plan document shipped under `docs/examples`.

use chrono::{DateTime, Duration, TimeZone, Utc};

use trellis_core::{Epic, FeedbackEntry, FeedbackLedger, Plan, PlanMetadata, Status, Story, Task};

/// The sample plan document, in TOML.
pub const SAMPLE_PLAN_TOML: &str = include_str!("../../../docs/examples/sample_plan.toml");

/// Fixed base time for feedback timestamps.
pub fn base_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 13, 9, 0, 0).unwrap()
}

/// `base_time()` plus `minutes`.
pub fn at_minute(minutes: i64) -> DateTime<Utc> {
    base_time() + Duration::minutes(minutes)
}

struct StoryDraft {
    id: String,
    status: Status,
    tasks: Vec<Task>,
}

struct EpicDraft {
    id: String,
    status: Status,
    stories: Vec<StoryDraft>,
}

/// Fluent builder for test plans.
///
/// Entities attach to the most recently added parent:
///
/// ```ignore
/// let plan = PlanBuilder::new()
///     .epic("epic1", Status::InProgress)
///     .story("story1", Status::InProgress)
///     .task("task1", Status::Complete, &[])
///     .task("task2", Status::Pending, &["task1"])
///     .feedback("FB-1", "initial scope")
///     .build();
/// ```
///
/// Panics on invalid input; it is meant for tests only.
#[derive(Default)]
pub struct PlanBuilder {
    epics: Vec<EpicDraft>,
    feedback: Vec<FeedbackEntry>,
}

impl PlanBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn epic(mut self, id: &str, status: Status) -> Self {
        self.epics.push(EpicDraft {
            id: id.to_owned(),
            status,
            stories: Vec::new(),
        });
        self
    }

    pub fn story(mut self, id: &str, status: Status) -> Self {
        let epic = self.epics.last_mut().expect("story() needs an epic first");
        epic.stories.push(StoryDraft {
            id: id.to_owned(),
            status,
            tasks: Vec::new(),
        });
        self
    }

    pub fn task(mut self, id: &str, status: Status, dependencies: &[&str]) -> Self {
        let story = self
            .epics
            .last_mut()
            .and_then(|e| e.stories.last_mut())
            .expect("task() needs a story first");
        let task = Task::new(id, format!("Task {id}"), 1, status)
            .and_then(|t| t.depends_on(dependencies.iter().copied()))
            .unwrap_or_else(|e| panic!("invalid task {id}: {e}"));
        story.tasks.push(task);
        self
    }

    /// Append a feedback entry one minute after the previous one.
    pub fn feedback(mut self, id: &str, message: &str) -> Self {
        let minute = self.feedback.len() as i64;
        let entry = FeedbackEntry::new(id, message, at_minute(minute))
            .unwrap_or_else(|e| panic!("invalid feedback {id}: {e}"));
        self.feedback.push(entry);
        self
    }

    pub fn build(self) -> Plan {
        let epics = self
            .epics
            .into_iter()
            .map(|epic| {
                let stories = epic
                    .stories
                    .into_iter()
                    .map(|story| {
                        Story::new(
                            &story.id,
                            format!("Story {}", story.id),
                            1,
                            1,
                            story.status,
                            story.tasks,
                        )
                        .unwrap_or_else(|e| panic!("invalid story {}: {e}", story.id))
                    })
                    .collect();
                Epic::new(&epic.id, format!("Epic {}", epic.id), 1, epic.status, stories)
                    .unwrap_or_else(|e| panic!("invalid epic {}: {e}", epic.id))
            })
            .collect();
        let ledger = FeedbackLedger::from_entries(self.feedback).expect("feedback in order");
        Plan::new("1.0", epics, ledger, PlanMetadata::default()).expect("valid version")
    }
}

/// Ledger with entries `FB-1` to `FB-n`, one minute apart.
pub fn numbered_ledger(n: usize) -> FeedbackLedger {
    FeedbackLedger::from_entries((1..=n).map(|i| {
        FeedbackEntry::new(format!("FB-{i}"), format!("feedback number {i}"), at_minute(i as i64))
            .expect("valid feedback")
    }))
    .expect("feedback in order")
}
