//! The [`FactSource`] trait: read-only access to the gradeable registry and
//! the grant, extension and submission ledgers.
//!
//! The engine queries these during recompute and never writes through them.
//! Whatever persists a ledger change is responsible for telling the engine
//! about it afterwards.

use std::future::Future;

use chrono::{DateTime, Utc};

use crate::model::{
  Extension, Gradeable, GradeableId, LateDayGrant, StudentId, Submission,
};

/// Abstraction over the external fact ledgers.
///
/// All methods return `Send` futures so the trait can be used from spawned
/// tokio tasks.
pub trait FactSource: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Registry ──────────────────────────────────────────────────────────

  /// Every student enrolled in the course.
  fn list_students(
    &self,
  ) -> impl Future<Output = Result<Vec<StudentId>, Self::Error>> + Send + '_;

  /// Every active (not deleted) gradeable.
  fn list_gradeables(
    &self,
  ) -> impl Future<Output = Result<Vec<Gradeable>, Self::Error>> + Send + '_;

  /// Configuration of a single gradeable. `None` if it does not exist.
  fn gradeable(
    &self,
    id: GradeableId,
  ) -> impl Future<Output = Result<Option<Gradeable>, Self::Error>> + Send + '_;

  /// The course-wide "Initial Late Days" balance.
  fn initial_late_days(
    &self,
  ) -> impl Future<Output = Result<i32, Self::Error>> + Send + '_;

  // ── Ledgers ───────────────────────────────────────────────────────────

  /// Grants for `student` whose effective date is not after `up_to`, in
  /// insertion order.
  fn grants_for_student(
    &self,
    student: StudentId,
    up_to: DateTime<Utc>,
  ) -> impl Future<Output = Result<Vec<LateDayGrant>, Self::Error>> + Send + '_;

  /// Students holding at least one grant, along with the earliest effective
  /// date among their grants.
  fn students_with_grants(
    &self,
  ) -> impl Future<Output = Result<Vec<(StudentId, DateTime<Utc>)>, Self::Error>>
  + Send
  + '_;

  fn extension(
    &self,
    student: StudentId,
    gradeable: GradeableId,
  ) -> impl Future<Output = Result<Option<Extension>, Self::Error>> + Send + '_;

  /// The student's active submission version for the gradeable.
  fn active_submission(
    &self,
    student: StudentId,
    gradeable: GradeableId,
  ) -> impl Future<Output = Result<Option<Submission>, Self::Error>> + Send + '_;
}
