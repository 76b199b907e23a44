//! Cache entries and the [`CacheStore`] trait.
//!
//! A cache entry is either absent or fully populated. Writers never patch an
//! entry in place; they take a [`Ticket`] for the key before reading facts and
//! hand the finished computation back through [`CacheStore::commit`]. A commit
//! whose ticket predates an invalidation of the same key is discarded, so
//! facts read before a mutation can never overwrite a deliberately emptied
//! entry.

use std::future::Future;

use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString, FromRepr};

use crate::{
  invalidation::InvalidationScope,
  model::{GradeableId, StudentId},
};

// ─── Keys ────────────────────────────────────────────────────────────────────

/// Identifies one cell of the student × gradeable matrix.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct CacheKey {
  pub student:   StudentId,
  pub gradeable: GradeableId,
}

impl CacheKey {
  pub fn new(student: StudentId, gradeable: GradeableId) -> Self {
    Self { student, gradeable }
  }
}

// ─── Status ──────────────────────────────────────────────────────────────────

/// The late-day status of a single submission.
///
/// The discriminant is the integer stored in the `late_day_status` column.
#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  Display,
  EnumString,
  AsRefStr,
  FromRepr,
)]
#[repr(u8)]
#[serde(rename_all = "snake_case")]
pub enum LateDayStatus {
  #[strum(serialize = "No Submission")]
  NoSubmission = 0,
  #[strum(serialize = "Good")]
  Good = 1,
  #[strum(serialize = "Late")]
  Late = 2,
  #[strum(serialize = "Bad (too many late days used this term)")]
  BadTooManyForTerm = 3,
  #[strum(serialize = "Bad (too many late days used on this assignment)")]
  BadTooManyForAssignment = 4,
  #[strum(serialize = "Cancelled Submission")]
  CancelledSubmission = 5,
}

impl LateDayStatus {
  pub fn code(self) -> u8 { self as u8 }
}

// ─── Entry ───────────────────────────────────────────────────────────────────

/// The memoized late-day result for one (student, gradeable) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
  /// Days late after any extension has been applied.
  pub days_late:      u32,
  /// The gradeable's per-assignment cap.
  pub days_allowed:   u32,
  /// Term balance before this submission consumes anything.
  pub days_remaining: u32,
  /// Days deducted from the term balance; non-zero only for `Late`.
  pub days_charged:   u32,
  pub status:         LateDayStatus,
}

impl CacheEntry {
  /// Term balance left once this gradeable's charge is taken.
  pub fn remaining_after(&self) -> u32 {
    self.days_remaining.saturating_sub(self.days_charged)
  }

  /// Text shown in the gradeable's column of the bulk summary. Cancelled
  /// submissions show blank; their status is still readable from the entry.
  pub fn cell(&self) -> String {
    match self.status {
      LateDayStatus::CancelledSubmission => String::new(),
      _ => self.days_charged.to_string(),
    }
  }
}

/// Why the calculator produced no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum EmptyReason {
  NoDueDate,
  LateSubmissionDisabled,
  GradeableInactive,
}

/// Outcome of running the calculator for a pair.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Computation {
  Empty(EmptyReason),
  Entry(CacheEntry),
}

impl Computation {
  pub fn entry(&self) -> Option<&CacheEntry> {
    match self {
      Self::Entry(e) => Some(e),
      Self::Empty(_) => None,
    }
  }

  pub fn into_entry(self) -> Option<CacheEntry> {
    match self {
      Self::Entry(e) => Some(e),
      Self::Empty(_) => None,
    }
  }
}

// ─── Tickets ─────────────────────────────────────────────────────────────────

/// Permission to write one key, issued before its facts are read.
///
/// `epoch` is never reused by a store, so a ticket issued before an
/// invalidation can never match the slot created after it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ticket {
  pub key:   CacheKey,
  pub epoch: u64,
}

/// What happened to a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitOutcome {
  /// The entry replaced whatever the slot held.
  Stored,
  /// The computation was empty; the slot now reads as absent.
  Cleared,
  /// The key was invalidated after the ticket was issued.
  Discarded,
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Abstraction over a late-day cache backend.
///
/// `get` never computes. Operations on the same key are mutually exclusive;
/// operations on distinct keys need not coordinate.
pub trait CacheStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  /// Read the entry for `key`. Absent means not yet computed or invalidated.
  fn get(
    &self,
    key: CacheKey,
  ) -> impl Future<Output = Result<Option<CacheEntry>, Self::Error>> + Send + '_;

  /// Reserve `key` for a write. Returns `None` when the key's gradeable has
  /// been removed, in which case nothing may be written for it.
  fn begin(
    &self,
    key: CacheKey,
  ) -> impl Future<Output = Result<Option<Ticket>, Self::Error>> + Send + '_;

  /// Publish a computation for the ticket's key, atomically.
  fn commit(
    &self,
    ticket: Ticket,
    entry: Option<CacheEntry>,
  ) -> impl Future<Output = Result<CommitOutcome, Self::Error>> + Send + '_;

  /// Remove every entry within `scope` and revoke outstanding tickets for
  /// those keys. Returns the number of slots dropped; idempotent.
  fn invalidate<'a>(
    &'a self,
    scope: &'a InvalidationScope,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + 'a;

  /// Drop every entry.
  fn invalidate_all(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Permanently drop the gradeable's entries and refuse further tickets for
  /// it until [`restore_gradeable`](Self::restore_gradeable).
  fn remove_gradeable(
    &self,
    gradeable: GradeableId,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  /// Allow tickets for a gradeable again (it was re-created).
  fn restore_gradeable(
    &self,
    gradeable: GradeableId,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  /// Snapshot of every populated entry.
  fn entries(
    &self,
  ) -> impl Future<Output = Result<Vec<(CacheKey, CacheEntry)>, Self::Error>>
  + Send
  + '_;
}

#[cfg(test)]
mod tests {
  use std::str::FromStr;

  use super::*;

  #[test]
  fn status_labels_match_display_text() {
    assert_eq!(
      LateDayStatus::BadTooManyForTerm.to_string(),
      "Bad (too many late days used this term)"
    );
    assert_eq!(
      LateDayStatus::from_str("Cancelled Submission").unwrap(),
      LateDayStatus::CancelledSubmission
    );
  }

  #[test]
  fn status_codes_round_through_repr() {
    assert_eq!(LateDayStatus::BadTooManyForAssignment.code(), 4);
    assert_eq!(LateDayStatus::from_repr(2), Some(LateDayStatus::Late));
  }

  #[test]
  fn remaining_after_subtracts_charge() {
    let entry = CacheEntry {
      days_late:      1,
      days_allowed:   1,
      days_remaining: 2,
      days_charged:   1,
      status:         LateDayStatus::Late,
    };
    assert_eq!(entry.remaining_after(), 1);
    assert_eq!(entry.cell(), "1");
  }

  #[test]
  fn cancelled_entry_renders_blank() {
    let entry = CacheEntry {
      days_late:      0,
      days_allowed:   1,
      days_remaining: 2,
      days_charged:   0,
      status:         LateDayStatus::CancelledSubmission,
    };
    assert_eq!(entry.cell(), "");
    assert_eq!(entry.remaining_after(), 2);
  }
}
