//! Error types for `lateday-core`.

use thiserror::Error;
use uuid::Uuid;

use crate::model::{GradeableId, StudentId};

#[derive(Debug, Error)]
pub enum Error {
  /// A ledger or registry query failed.
  #[error("fact source unavailable: {0}")]
  FactSourceUnavailable(String),

  /// The facts for a pair cannot be turned into a late-day result.
  #[error("inconsistent facts: {0}")]
  InconsistentFacts(String),

  #[error("gradeable not found: {0}")]
  GradeableNotFound(GradeableId),

  #[error("late-day grant not found: {0}")]
  GrantNotFound(Uuid),

  #[error("no submission from {0} for {1}")]
  SubmissionNotFound(StudentId, GradeableId),

  #[error("fixture error: {0}")]
  Fixture(#[from] toml::de::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
