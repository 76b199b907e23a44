//! Error type for `lateday-engine`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
  #[error("cache error: {0}")]
  Cache(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("fact source error: {0}")]
  FactSource(#[source] Box<dyn std::error::Error + Send + Sync>),

  /// The pass could not even enumerate students or gradeables.
  #[error("recompute pass failed: {0}")]
  PassFailed(String),

  /// The pass ended without publishing a report (its task panicked).
  #[error("recompute pass aborted before reporting")]
  RecomputeAborted,
}

impl EngineError {
  pub(crate) fn cache<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Cache(Box::new(e))
  }

  pub(crate) fn facts<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::FactSource(Box::new(e))
  }
}

pub type Result<T, E = EngineError> = std::result::Result<T, E>;
