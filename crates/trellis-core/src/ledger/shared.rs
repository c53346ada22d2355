//! Single-writer handle for a ledger shared between concurrent editors.

use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;

use super::{
    ConsultationMarker, FeedbackEntry, FeedbackLedger, LedgerOrderError, UnconsultedFeedbackError,
};
use crate::model::ValidationError;

/// Errors from [`SharedLedger::append_now`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AppendError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Order(#[from] LedgerOrderError),
}

/// A ledger behind a mutex. Every append takes the lock, so append order is
/// the order in which writers acquired it.
#[derive(Debug, Clone, Default)]
pub struct SharedLedger {
    inner: Arc<Mutex<FeedbackLedger>>,
}

impl SharedLedger {
    pub fn new(ledger: FeedbackLedger) -> Self {
        Self {
            inner: Arc::new(Mutex::new(ledger)),
        }
    }

    /// Append a prepared entry. Returns its position.
    pub fn append(&self, entry: FeedbackEntry) -> Result<usize, LedgerOrderError> {
        let mut ledger = self.inner.lock();
        ledger.append(entry).map(FeedbackEntry::position)
    }

    /// Append a message stamped with the current time while holding the
    /// lock, so timestamps follow append order across writers.
    pub fn append_now(
        &self,
        id: impl Into<String>,
        message: impl Into<String>,
    ) -> Result<usize, AppendError> {
        let mut ledger = self.inner.lock();
        let entry = FeedbackEntry::new(id, message, Utc::now())?;
        let position = ledger.append(entry)?.position();
        tracing::debug!(position, "feedback appended");
        Ok(position)
    }

    /// Optimistic append: fails if another writer got there first.
    pub fn append_at(
        &self,
        position: usize,
        entry: FeedbackEntry,
    ) -> Result<usize, LedgerOrderError> {
        let mut ledger = self.inner.lock();
        ledger.append_at(position, entry).map(FeedbackEntry::position)
    }

    /// Copy of the current contents together with the marker for them.
    pub fn consult(&self) -> (FeedbackLedger, ConsultationMarker) {
        let ledger = self.inner.lock();
        (ledger.clone(), ledger.consult())
    }

    pub fn snapshot(&self) -> FeedbackLedger {
        self.inner.lock().clone()
    }

    pub fn require_consulted(
        &self,
        marker: &ConsultationMarker,
    ) -> Result<(), UnconsultedFeedbackError> {
        self.inner.lock().require_consulted(marker)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use std::thread;

    use super::*;

    #[test]
    fn concurrent_appends_stay_contiguous() {
        let shared = SharedLedger::default();
        let handles: Vec<_> = (0..8)
            .map(|writer| {
                let shared = shared.clone();
                thread::spawn(move || {
                    for n in 0..25 {
                        shared
                            .append_now(format!("FB-{writer}-{n}"), "note")
                            .unwrap();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let ledger = shared.snapshot();
        assert_eq!(ledger.len(), 200);
        for (i, entry) in ledger.entries().iter().enumerate() {
            assert_eq!(entry.position(), i);
        }
        assert!(
            ledger
                .entries()
                .windows(2)
                .all(|w| w[0].timestamp() <= w[1].timestamp())
        );
    }

    #[test]
    fn optimistic_append_loses_race() {
        let shared = SharedLedger::default();
        let (snapshot, _) = shared.consult();
        let next = snapshot.len();

        shared.append_now("FB-1", "first writer").unwrap();
        let late = FeedbackEntry::new("FB-2", "second writer", Utc::now()).unwrap();
        let err = shared.append_at(next, late).unwrap_err();
        assert!(matches!(err, LedgerOrderError::OutOfOrder { requested: 0, expected: 1, .. }));
    }

    #[test]
    fn marker_goes_stale_after_another_append() {
        let shared = SharedLedger::default();
        shared.append_now("FB-1", "scope").unwrap();
        let (_, marker) = shared.consult();
        assert!(shared.require_consulted(&marker).is_ok());

        shared.append_now("FB-2", "change of plan").unwrap();
        assert!(matches!(
            shared.require_consulted(&marker),
            Err(UnconsultedFeedbackError::Stale { unread: 1, .. })
        ));
    }
}
