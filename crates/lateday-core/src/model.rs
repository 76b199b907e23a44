//! Upstream facts the engine reads: students, gradeables, late-day grants,
//! extensions and submissions.
//!
//! These records are owned by external ledgers. The engine never mutates them;
//! it only reads them during recompute and is told about changes through
//! [`crate::invalidation::MutationEvent`].

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ─── Identity ────────────────────────────────────────────────────────────────

/// A student's user id.
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct StudentId(pub String);

/// A gradeable's id (e.g. `late_allowed_homework`).
#[derive(
  Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GradeableId(pub String);

impl StudentId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl GradeableId {
  pub fn new(id: impl Into<String>) -> Self { Self(id.into()) }

  pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for StudentId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

impl fmt::Display for GradeableId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

// ─── Gradeable ───────────────────────────────────────────────────────────────

/// Late-day relevant configuration of a gradeable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Gradeable {
  pub id:                      GradeableId,
  pub title:                   String,
  /// `None` when the gradeable has no due date (late submission untimed).
  pub due_date:                Option<DateTime<Utc>>,
  #[serde(default = "default_true")]
  pub late_submission_allowed: bool,
  /// Late days a student may spend on this gradeable.
  #[serde(default)]
  pub allowed_late_days:       i32,
  #[serde(default = "default_true")]
  pub active:                  bool,
}

fn default_true() -> bool { true }

impl Gradeable {
  /// Whether this gradeable takes part in late-day accounting at all.
  ///
  /// Gradeables that do not track late days have no column in the bulk
  /// summary and never hold cache entries.
  pub fn tracks_late_days(&self) -> bool {
    self.active && self.late_submission_allowed && self.due_date.is_some()
  }
}

// ─── Ledgers ─────────────────────────────────────────────────────────────────

/// An instructor-issued late-day balance for a student, effective from
/// `effective_at` onwards until a later grant replaces it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LateDayGrant {
  #[serde(default = "Uuid::new_v4")]
  pub grant_id:     Uuid,
  pub student:      StudentId,
  pub effective_at: DateTime<Utc>,
  pub days:         i32,
}

/// Extra late days granted to one student on one gradeable only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Extension {
  pub student:   StudentId,
  pub gradeable: GradeableId,
  pub days:      i32,
}

/// The active submission version of a student for a gradeable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
  pub student:        StudentId,
  pub gradeable:      GradeableId,
  /// `0` means no version is selected for grading.
  pub active_version: u32,
  pub submitted_at:   DateTime<Utc>,
  #[serde(default)]
  pub cancelled:      bool,
}

impl Submission {
  /// A withdrawn submission contributes no late days.
  pub fn is_cancelled(&self) -> bool { self.cancelled || self.active_version == 0 }
}

/// Picks the grant in effect at `at`: the most recent grant whose effective
/// date is not after `at`. Later entries win ties.
pub fn grant_in_effect<'a>(
  grants: &'a [LateDayGrant],
  at: DateTime<Utc>,
) -> Option<&'a LateDayGrant> {
  grants
    .iter()
    .filter(|g| g.effective_at <= at)
    .fold(None, |best: Option<&LateDayGrant>, g| match best {
      Some(b) if b.effective_at > g.effective_at => Some(b),
      _ => Some(g),
    })
}
