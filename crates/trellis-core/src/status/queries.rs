//! Query helpers for plan progress tracking.

use serde::Serialize;

use crate::model::{Plan, Status, Task};

/// Tasks ready to be worked on, in plan order.
///
/// A task is ready when:
/// - It is `pending`, or `in_progress` if `include_in_progress` is set.
/// - Every dependency is `complete`.
pub fn ready_tasks(plan: &Plan, include_in_progress: bool) -> Vec<&Task> {
    plan.tasks()
        .filter(|task| match task.status() {
            Status::Pending => true,
            Status::InProgress => include_in_progress,
            Status::Complete => false,
        })
        .filter(|task| {
            task.dependencies()
                .iter()
                .all(|dep| plan.task(dep).is_some_and(|d| d.status() == Status::Complete))
        })
        .collect()
}

/// Task counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PlanProgress {
    pub pending: usize,
    pub in_progress: usize,
    pub complete: usize,
    pub total: usize,
}

impl PlanProgress {
    /// Fraction of tasks complete, `0.0` for a plan with no tasks.
    pub fn ratio(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.complete as f64 / self.total as f64
        }
    }

    pub fn is_complete(&self) -> bool {
        self.total > 0 && self.complete == self.total
    }
}

/// Summarize task progress for a plan.
pub fn progress(plan: &Plan) -> PlanProgress {
    let mut progress = PlanProgress::default();
    for task in plan.tasks() {
        match task.status() {
            Status::Pending => progress.pending += 1,
            Status::InProgress => progress.in_progress += 1,
            Status::Complete => progress.complete += 1,
        }
        progress.total += 1;
    }
    progress
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::FeedbackLedger;
    use crate::model::{Epic, PlanMetadata, Story};

    fn plan() -> Plan {
        let tasks = vec![
            Task::new("a", "a", 1, Status::Complete).unwrap(),
            Task::new("b", "b", 1, Status::Pending)
                .unwrap()
                .depends_on(["a"])
                .unwrap(),
            Task::new("c", "c", 1, Status::InProgress).unwrap(),
            Task::new("d", "d", 1, Status::Pending)
                .unwrap()
                .depends_on(["b"])
                .unwrap(),
        ];
        let story = Story::new("s1", "story", 1, 5, Status::InProgress, tasks).unwrap();
        let epic = Epic::new("e1", "epic", 1, Status::InProgress, vec![story]).unwrap();
        Plan::new("1.0", vec![epic], FeedbackLedger::new(), PlanMetadata::default()).unwrap()
    }

    fn ids(tasks: Vec<&Task>) -> Vec<&str> {
        tasks.into_iter().map(Task::id).collect()
    }

    #[test]
    fn ready_tasks_have_complete_dependencies() {
        let plan = plan();
        assert_eq!(ids(ready_tasks(&plan, false)), ["b"]);
        assert_eq!(ids(ready_tasks(&plan, true)), ["b", "c"]);
    }

    #[test]
    fn progress_counts() {
        let progress = progress(&plan());
        assert_eq!(
            progress,
            PlanProgress {
                pending: 2,
                in_progress: 1,
                complete: 1,
                total: 4,
            }
        );
        assert!((progress.ratio() - 0.25).abs() < f64::EPSILON);
        assert!(!progress.is_complete());
    }
}
