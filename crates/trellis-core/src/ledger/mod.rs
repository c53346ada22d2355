//! Append-only ledger of user feedback.
//!
//! Entries are kept in append order and never change once appended. The
//! first entry is the initial scope of work; later entries are revisions.
//! Before a plan mutation is accepted the caller must prove it read the
//! whole ledger by presenting the [`ConsultationMarker`] returned from
//! [`FeedbackLedger::consult`].

pub mod shared;

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;
use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::model::{ValidationError, checked_id};

pub use shared::SharedLedger;

// ---------------------------------------------------------------------------
// Entries
// ---------------------------------------------------------------------------

/// Role of an entry, derived from its position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackKind {
    InitialScope,
    Revision,
}

impl fmt::Display for FeedbackKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::InitialScope => "initial scope",
            Self::Revision => "revision",
        };
        f.write_str(s)
    }
}

/// One piece of user feedback. The message is stored verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedbackEntry {
    id: String,
    message: String,
    timestamp: DateTime<Utc>,
    position: usize,
}

impl FeedbackEntry {
    /// Create an entry. Its position is assigned when it is appended.
    pub fn new(
        id: impl Into<String>,
        message: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Result<Self, ValidationError> {
        let id = checked_id(id.into())?;
        let message = message.into();
        if message.trim().is_empty() {
            return Err(ValidationError::EmptyMessage { id });
        }
        Ok(Self {
            id,
            message,
            timestamp,
            position: 0,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    /// Zero-based append position.
    pub fn position(&self) -> usize {
        self.position
    }

    pub fn kind(&self) -> FeedbackKind {
        if self.position == 0 {
            FeedbackKind::InitialScope
        } else {
            FeedbackKind::Revision
        }
    }

    fn same_content(&self, other: &FeedbackEntry) -> bool {
        self.id == other.id && self.message == other.message && self.timestamp == other.timestamp
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// An append or history check that would break append order.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerOrderError {
    #[error("feedback entry {id:?} already exists at position {position}")]
    DuplicateId { id: String, position: usize },

    #[error("feedback entry {id:?} targets position {requested} but the next position is {expected}")]
    OutOfOrder {
        id: String,
        requested: usize,
        expected: usize,
    },

    #[error(
        "feedback entry {id:?} is timestamped {timestamp}, earlier than the tail entry {tail:?} at {tail_timestamp}"
    )]
    TimestampRegression {
        id: String,
        timestamp: DateTime<Utc>,
        tail: String,
        tail_timestamp: DateTime<Utc>,
    },

    #[error("feedback entry {id:?} at position {position} was modified")]
    EntryModified { id: String, position: usize },

    #[error("feedback entry {id:?} at position {position} was removed")]
    EntryRemoved { id: String, position: usize },
}

/// Raised when a mutation is attempted without having read the full ledger.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UnconsultedFeedbackError {
    #[error(
        "feedback ledger tail is {tail} but only {acknowledged} was consulted ({unread} unread); re-read the ledger before updating the plan"
    )]
    Stale {
        acknowledged: String,
        tail: String,
        unread: usize,
    },

    #[error(
        "consultation marker {presented} does not match the feedback ledger ({current}); re-read the ledger before updating the plan"
    )]
    Mismatch {
        presented: ConsultationMarker,
        current: ConsultationMarker,
    },
}

// ---------------------------------------------------------------------------
// Consultation marker
// ---------------------------------------------------------------------------

/// Proof of having read a ledger: entry count, tail id and content digest.
///
/// Text form is `<count>:<last_id>:<digest>`, with an empty last id for an
/// empty ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConsultationMarker {
    pub count: usize,
    pub last_id: Option<String>,
    pub digest: String,
}

impl fmt::Display for ConsultationMarker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.count,
            self.last_id.as_deref().unwrap_or(""),
            self.digest
        )
    }
}

/// Error returned when parsing an invalid [`ConsultationMarker`] string.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid consultation marker: {0:?} (expected <count>:<last_id>:<digest>)")]
pub struct MarkerParseError(pub String);

impl FromStr for ConsultationMarker {
    type Err = MarkerParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MarkerParseError(s.to_owned());
        let mut parts = s.splitn(3, ':');
        let count = parts
            .next()
            .and_then(|c| c.parse::<usize>().ok())
            .ok_or_else(invalid)?;
        let last_id = parts.next().ok_or_else(invalid)?;
        let digest = parts.next().ok_or_else(invalid)?;
        if digest.is_empty() || !digest.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(invalid());
        }
        let last_id = match (count, last_id) {
            (0, "") => None,
            (0, _) | (_, "") => return Err(invalid()),
            (_, id) => Some(id.to_owned()),
        };
        Ok(Self {
            count,
            last_id,
            digest: digest.to_ascii_lowercase(),
        })
    }
}

// ---------------------------------------------------------------------------
// Ledger
// ---------------------------------------------------------------------------

/// Ordered, append-only feedback log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FeedbackLedger {
    entries: Vec<FeedbackEntry>,
}

impl FeedbackLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a ledger by appending `entries` in order.
    pub fn from_entries(
        entries: impl IntoIterator<Item = FeedbackEntry>,
    ) -> Result<Self, LedgerOrderError> {
        let mut ledger = Self::new();
        for entry in entries {
            ledger.append(entry)?;
        }
        Ok(ledger)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[FeedbackEntry] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&FeedbackEntry> {
        self.entries.get(position)
    }

    pub fn find(&self, id: &str) -> Option<&FeedbackEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    /// The entry describing the initial scope of work.
    pub fn initial_scope(&self) -> Option<&FeedbackEntry> {
        self.entries.first()
    }

    pub fn tail(&self) -> Option<&FeedbackEntry> {
        self.entries.last()
    }

    /// Append `entry` after every existing entry.
    ///
    /// Fails if the id is already present or the timestamp is earlier than
    /// the current tail's.
    pub fn append(&mut self, mut entry: FeedbackEntry) -> Result<&FeedbackEntry, LedgerOrderError> {
        if let Some(existing) = self.find(&entry.id) {
            return Err(LedgerOrderError::DuplicateId {
                id: entry.id,
                position: existing.position,
            });
        }
        if let Some(tail) = self.tail() {
            if entry.timestamp < tail.timestamp {
                return Err(LedgerOrderError::TimestampRegression {
                    id: entry.id,
                    timestamp: entry.timestamp,
                    tail: tail.id.clone(),
                    tail_timestamp: tail.timestamp,
                });
            }
        }
        entry.position = self.entries.len();
        self.entries.push(entry);
        Ok(&self.entries[self.entries.len() - 1])
    }

    /// Append `entry` only if `position` is the next free slot.
    ///
    /// Used by writers that computed the position from an earlier read; an
    /// insert before the tail or past it is rejected.
    pub fn append_at(
        &mut self,
        position: usize,
        entry: FeedbackEntry,
    ) -> Result<&FeedbackEntry, LedgerOrderError> {
        let expected = self.entries.len();
        if position != expected {
            return Err(LedgerOrderError::OutOfOrder {
                id: entry.id,
                requested: position,
                expected,
            });
        }
        self.append(entry)
    }

    /// Check that `self` starts with every entry of `prior`, unchanged.
    pub fn ensure_extends(&self, prior: &FeedbackLedger) -> Result<(), LedgerOrderError> {
        for old in &prior.entries {
            match self.entries.get(old.position) {
                Some(new) if new.same_content(old) => {}
                Some(_) => {
                    return Err(LedgerOrderError::EntryModified {
                        id: old.id.clone(),
                        position: old.position,
                    });
                }
                None => {
                    return Err(LedgerOrderError::EntryRemoved {
                        id: old.id.clone(),
                        position: old.position,
                    });
                }
            }
        }
        Ok(())
    }

    /// Read the full ledger and return the marker proving it.
    pub fn consult(&self) -> ConsultationMarker {
        ConsultationMarker {
            count: self.entries.len(),
            last_id: self.tail().map(|e| e.id.clone()),
            digest: self.digest(),
        }
    }

    /// Fail unless `marker` covers the current ledger contents.
    pub fn require_consulted(
        &self,
        marker: &ConsultationMarker,
    ) -> Result<(), UnconsultedFeedbackError> {
        let current = self.consult();
        if marker == &current {
            return Ok(());
        }

        // A marker taken from an earlier, unchanged prefix is merely stale.
        let prefix_matches = marker.count < current.count
            && marker.last_id.as_deref()
                == marker
                    .count
                    .checked_sub(1)
                    .and_then(|i| self.entries.get(i))
                    .map(|e| e.id.as_str());
        if prefix_matches {
            return Err(UnconsultedFeedbackError::Stale {
                acknowledged: marker.last_id.clone().unwrap_or_else(|| "(none)".into()),
                tail: current.last_id.unwrap_or_else(|| "(none)".into()),
                unread: current.count - marker.count,
            });
        }

        Err(UnconsultedFeedbackError::Mismatch {
            presented: marker.clone(),
            current,
        })
    }

    /// SHA-256 over every entry's id, message and timestamp, hex-encoded.
    fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for entry in &self.entries {
            let timestamp = entry.timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true);
            for field in [entry.id.as_bytes(), entry.message.as_bytes(), timestamp.as_bytes()] {
                hasher.update((field.len() as u64).to_le_bytes());
                hasher.update(field);
            }
        }
        hex::encode(hasher.finalize())
    }
}
