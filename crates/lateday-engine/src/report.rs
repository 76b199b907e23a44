//! Recompute reports and per-pair diagnostics.

use chrono::{DateTime, Utc};
use lateday_core::{Error as CoreError, cache::CacheKey};
use serde::Serialize;
use uuid::Uuid;

/// Why a pair was left absent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiagnosticKind {
  /// A ledger or registry query failed.
  FactSourceUnavailable,
  /// The facts could not describe a valid pair.
  InconsistentFacts,
  /// The cache backend rejected the write.
  CacheUnavailable,
}

/// A non-fatal failure recorded during a pass.
#[derive(Debug, Clone, Serialize)]
pub struct PairDiagnostic {
  pub key:     CacheKey,
  pub kind:    DiagnosticKind,
  pub message: String,
}

impl PairDiagnostic {
  pub(crate) fn from_core(key: CacheKey, error: &CoreError) -> Self {
    let kind = match error {
      CoreError::InconsistentFacts(_) => DiagnosticKind::InconsistentFacts,
      _ => DiagnosticKind::FactSourceUnavailable,
    };
    Self { key, kind, message: error.to_string() }
  }
}

/// Outcome counts of one recompute pass (full or targeted).
#[derive(Debug, Clone, Serialize)]
pub struct RecomputeReport {
  pub pass_id:     Uuid,
  pub started_at:  DateTime<Utc>,
  pub finished_at: DateTime<Utc>,
  pub students:    usize,
  /// Pairs now holding an entry.
  pub stored:      usize,
  /// Pairs deliberately left absent (gradeable outside late-day accounting).
  pub cleared:     usize,
  /// Commits dropped because the key was invalidated mid-pass.
  pub discarded:   usize,
  pub diagnostics: Vec<PairDiagnostic>,
}

impl RecomputeReport {
  pub(crate) fn new(pass_id: Uuid, started_at: DateTime<Utc>) -> Self {
    Self {
      pass_id,
      started_at,
      finished_at: started_at,
      students: 0,
      stored: 0,
      cleared: 0,
      discarded: 0,
      diagnostics: Vec::new(),
    }
  }

  pub(crate) fn absorb(&mut self, tally: StudentTally) {
    self.students += 1;
    self.stored += tally.stored;
    self.cleared += tally.cleared;
    self.discarded += tally.discarded;
    self.diagnostics.extend(tally.diagnostics);
  }

  pub fn failed(&self) -> usize { self.diagnostics.len() }
}

/// What happened to one student's pairs.
#[derive(Debug, Default)]
pub(crate) struct StudentTally {
  pub stored:      usize,
  pub cleared:     usize,
  pub discarded:   usize,
  pub diagnostics: Vec<PairDiagnostic>,
}
