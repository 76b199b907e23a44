//! The invalidation router: a fixed rule table from upstream mutation events
//! to the cache keys they invalidate.
//!
//! Routing is conservative. A plan may cover more keys than a mutation truly
//! affects, never fewer. Term balances are cumulative across a student's
//! gradeables in due-date order, so anything that changes what one gradeable
//! charges also reaches that student's later gradeables; the table widens
//! those rows to the whole student (or to everything, for gradeable-level
//! edits that reorder or re-charge every student).

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use strum::AsRefStr;

use crate::{
  cache::CacheKey,
  model::{GradeableId, StudentId},
};

// ─── Events ──────────────────────────────────────────────────────────────────

/// How a ledger record changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LedgerChange {
  Created,
  Updated,
  Deleted,
}

/// An upstream mutation the engine must react to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, AsRefStr)]
#[serde(tag = "event", rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum MutationEvent {
  GrantChanged {
    student: StudentId,
    change:  LedgerChange,
  },
  /// Several grants removed in one bulk operation.
  GrantsDeleted {
    students: BTreeSet<StudentId>,
  },
  ExtensionChanged {
    student:   StudentId,
    gradeable: GradeableId,
    change:    LedgerChange,
  },
  /// The due date moved, or was enabled or disabled.
  DueDateChanged {
    gradeable: GradeableId,
  },
  AllowedLateDaysChanged {
    gradeable: GradeableId,
  },
  LateSubmissionToggled {
    gradeable: GradeableId,
    allowed:   bool,
  },
  GradeableCreated {
    gradeable: GradeableId,
  },
  GradeableDeleted {
    gradeable: GradeableId,
  },
  /// A new active version, a version change, or a cancellation.
  SubmissionChanged {
    student:   StudentId,
    gradeable: GradeableId,
  },
  InitialLateDaysChanged,
}

// ─── Scopes ──────────────────────────────────────────────────────────────────

/// A set of cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "scope", content = "keys", rename_all = "snake_case")]
pub enum InvalidationScope {
  Nothing,
  Pair(CacheKey),
  Student(StudentId),
  Students(BTreeSet<StudentId>),
  Gradeable(GradeableId),
  /// Students whose balance comes from the course default for at least one
  /// gradeable. Resolved against the grant ledger before it reaches a cache;
  /// an unresolved value is treated as [`InvalidationScope::All`].
  DefaultBalanceUsers,
  All,
}

impl InvalidationScope {
  /// Whether `key` falls within the scope.
  pub fn contains(&self, key: &CacheKey) -> bool {
    match self {
      Self::Nothing => false,
      Self::Pair(k) => k == key,
      Self::Student(s) => s == &key.student,
      Self::Students(set) => set.contains(&key.student),
      Self::Gradeable(g) => g == &key.gradeable,
      Self::DefaultBalanceUsers | Self::All => true,
    }
  }

  pub fn is_nothing(&self) -> bool {
    match self {
      Self::Nothing => true,
      Self::Students(set) => set.is_empty(),
      _ => false,
    }
  }
}

/// What the engine must do to the cache for one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidationPlan {
  /// Entries to drop; their keys read as absent until recomputed.
  pub scope:   InvalidationScope,
  /// A gradeable whose entries are removed for good.
  pub remove:  Option<GradeableId>,
  /// A gradeable that may hold entries again.
  pub restore: Option<GradeableId>,
}

impl InvalidationPlan {
  fn scope(scope: InvalidationScope) -> Self {
    Self { scope, remove: None, restore: None }
  }
}

// ─── Rule table ──────────────────────────────────────────────────────────────

/// Map a mutation to its invalidation plan.
pub fn route(event: &MutationEvent) -> InvalidationPlan {
  use InvalidationScope as S;
  use MutationEvent as E;

  match event {
    E::GrantChanged { student, .. } => InvalidationPlan::scope(S::Student(student.clone())),
    E::GrantsDeleted { students } => InvalidationPlan::scope(S::Students(students.clone())),
    E::ExtensionChanged { student, .. } | E::SubmissionChanged { student, .. } => {
      InvalidationPlan::scope(S::Student(student.clone()))
    }
    E::DueDateChanged { .. }
    | E::AllowedLateDaysChanged { .. }
    | E::LateSubmissionToggled { .. } => InvalidationPlan::scope(S::All),
    E::GradeableCreated { gradeable } => InvalidationPlan {
      scope:   S::Nothing,
      remove:  None,
      restore: Some(gradeable.clone()),
    },
    E::GradeableDeleted { gradeable } => InvalidationPlan {
      scope:   S::All,
      remove:  Some(gradeable.clone()),
      restore: None,
    },
    E::InitialLateDaysChanged => InvalidationPlan::scope(S::DefaultBalanceUsers),
  }
}
