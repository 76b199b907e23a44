//! [`MemoryLedger`]: an in-process [`FactSource`] over typed records.
//!
//! Every mutating method returns the [`MutationEvent`] the caller must pass
//! on to the engine, mirroring how a persisting component notifies the cache
//! before its change is considered complete.

use std::{
  collections::{BTreeMap, BTreeSet},
  sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::{
  Error, Result,
  facts::FactSource,
  fixture::FactFixture,
  invalidation::{LedgerChange, MutationEvent},
  model::{
    Extension, Gradeable, GradeableId, LateDayGrant, StudentId, Submission,
  },
};

type PairKey = (StudentId, GradeableId);

#[derive(Debug, Default)]
struct Ledgers {
  initial_late_days: i32,
  students:          BTreeSet<StudentId>,
  gradeables:        BTreeMap<GradeableId, Gradeable>,
  /// Insertion order; later grants win effective-date ties.
  grants:            Vec<LateDayGrant>,
  extensions:        BTreeMap<PairKey, Extension>,
  submissions:       BTreeMap<PairKey, Submission>,
}

/// An in-memory set of fact ledgers.
///
/// Cloning is cheap; clones share the same records.
#[derive(Debug, Clone, Default)]
pub struct MemoryLedger {
  inner: Arc<RwLock<Ledgers>>,
}

impl MemoryLedger {
  pub fn new() -> Self { Self::default() }

  pub fn from_fixture(fixture: FactFixture) -> Self {
    let mut ledgers = Ledgers {
      initial_late_days: fixture.initial_late_days,
      students: fixture.students.into_iter().collect(),
      gradeables: fixture
        .gradeables
        .into_iter()
        .map(|g| (g.id.clone(), g))
        .collect(),
      grants: fixture.grants,
      ..Ledgers::default()
    };
    for ext in fixture.extensions {
      ledgers
        .extensions
        .insert((ext.student.clone(), ext.gradeable.clone()), ext);
    }
    for sub in fixture.submissions {
      ledgers
        .submissions
        .insert((sub.student.clone(), sub.gradeable.clone()), sub);
    }
    Self { inner: Arc::new(RwLock::new(ledgers)) }
  }

  fn read(&self) -> RwLockReadGuard<'_, Ledgers> {
    self.inner.read().unwrap_or_else(PoisonError::into_inner)
  }

  fn write(&self) -> RwLockWriteGuard<'_, Ledgers> {
    self.inner.write().unwrap_or_else(PoisonError::into_inner)
  }

  // ── Course ────────────────────────────────────────────────────────────

  pub fn add_student(&self, student: StudentId) { self.write().students.insert(student); }

  pub fn set_initial_late_days(&self, days: i32) -> MutationEvent {
    self.write().initial_late_days = days;
    MutationEvent::InitialLateDaysChanged
  }

  // ── Gradeables ────────────────────────────────────────────────────────

  /// Create or edit a gradeable. Returns one event per changed setting.
  pub fn upsert_gradeable(&self, gradeable: Gradeable) -> Vec<MutationEvent> {
    let mut ledgers = self.write();
    let id = gradeable.id.clone();
    let previous = ledgers.gradeables.insert(id.clone(), gradeable.clone());

    let Some(old) = previous else {
      return vec![MutationEvent::GradeableCreated { gradeable: id }];
    };

    let mut events = Vec::new();
    if old.due_date != gradeable.due_date {
      events.push(MutationEvent::DueDateChanged { gradeable: id.clone() });
    }
    if old.allowed_late_days != gradeable.allowed_late_days {
      events.push(MutationEvent::AllowedLateDaysChanged { gradeable: id.clone() });
    }
    if old.late_submission_allowed != gradeable.late_submission_allowed {
      events.push(MutationEvent::LateSubmissionToggled {
        gradeable: id.clone(),
        allowed:   gradeable.late_submission_allowed,
      });
    }
    if old.active != gradeable.active {
      // Deactivation takes the column away just like a disabled due date.
      events.push(MutationEvent::DueDateChanged { gradeable: id });
    }
    events
  }

  pub fn delete_gradeable(&self, id: &GradeableId) -> Result<MutationEvent> {
    let mut ledgers = self.write();
    ledgers
      .gradeables
      .remove(id)
      .ok_or_else(|| Error::GradeableNotFound(id.clone()))?;
    ledgers.extensions.retain(|(_, g), _| g != id);
    ledgers.submissions.retain(|(_, g), _| g != id);
    Ok(MutationEvent::GradeableDeleted { gradeable: id.clone() })
  }

  // ── Grants ────────────────────────────────────────────────────────────

  pub fn grant(
    &self,
    student: StudentId,
    effective_at: DateTime<Utc>,
    days: i32,
  ) -> (LateDayGrant, MutationEvent) {
    let grant = LateDayGrant {
      grant_id: Uuid::new_v4(),
      student: student.clone(),
      effective_at,
      days,
    };
    self.write().grants.push(grant.clone());
    let event = MutationEvent::GrantChanged { student, change: LedgerChange::Created };
    (grant, event)
  }

  pub fn update_grant(&self, grant_id: Uuid, days: i32) -> Result<MutationEvent> {
    let mut ledgers = self.write();
    let grant = ledgers
      .grants
      .iter_mut()
      .find(|g| g.grant_id == grant_id)
      .ok_or(Error::GrantNotFound(grant_id))?;
    grant.days = days;
    Ok(MutationEvent::GrantChanged {
      student: grant.student.clone(),
      change:  LedgerChange::Updated,
    })
  }

  pub fn delete_grant(&self, grant_id: Uuid) -> Result<MutationEvent> {
    let mut ledgers = self.write();
    let index = ledgers
      .grants
      .iter()
      .position(|g| g.grant_id == grant_id)
      .ok_or(Error::GrantNotFound(grant_id))?;
    let grant = ledgers.grants.remove(index);
    Ok(MutationEvent::GrantChanged { student: grant.student, change: LedgerChange::Deleted })
  }

  /// Delete every listed grant in one operation. Unknown ids are skipped.
  pub fn bulk_delete_grants(&self, grant_ids: &[Uuid]) -> MutationEvent {
    let wanted: BTreeSet<Uuid> = grant_ids.iter().copied().collect();
    let mut students = BTreeSet::new();
    self.write().grants.retain(|g| {
      if wanted.contains(&g.grant_id) {
        students.insert(g.student.clone());
        false
      } else {
        true
      }
    });
    MutationEvent::GrantsDeleted { students }
  }

  /// Every grant on record, in insertion order.
  pub fn grants(&self) -> Vec<LateDayGrant> { self.read().grants.clone() }

  // ── Extensions ────────────────────────────────────────────────────────

  pub fn set_extension(
    &self,
    student: StudentId,
    gradeable: GradeableId,
    days: i32,
  ) -> MutationEvent {
    let ext = Extension { student: student.clone(), gradeable: gradeable.clone(), days };
    let previous = self
      .write()
      .extensions
      .insert((student.clone(), gradeable.clone()), ext);
    let change = if previous.is_some() { LedgerChange::Updated } else { LedgerChange::Created };
    MutationEvent::ExtensionChanged { student, gradeable, change }
  }

  /// Remove the extension entirely. `None` if there was none.
  pub fn delete_extension(
    &self,
    student: &StudentId,
    gradeable: &GradeableId,
  ) -> Option<MutationEvent> {
    self
      .write()
      .extensions
      .remove(&(student.clone(), gradeable.clone()))
      .map(|ext| MutationEvent::ExtensionChanged {
        student:   ext.student,
        gradeable: ext.gradeable,
        change:    LedgerChange::Deleted,
      })
  }

  // ── Submissions ───────────────────────────────────────────────────────

  /// Record a new submission, which becomes the active version.
  pub fn submit(
    &self,
    student: StudentId,
    gradeable: GradeableId,
    submitted_at: DateTime<Utc>,
  ) -> MutationEvent {
    let mut ledgers = self.write();
    let key = (student.clone(), gradeable.clone());
    let version = ledgers
      .submissions
      .get(&key)
      .map_or(1, |s| s.active_version.max(1) + 1);
    ledgers.submissions.insert(key, Submission {
      student: student.clone(),
      gradeable: gradeable.clone(),
      active_version: version,
      submitted_at,
      cancelled: false,
    });
    MutationEvent::SubmissionChanged { student, gradeable }
  }

  /// Mark the active version as not to be graded.
  pub fn cancel_submission(
    &self,
    student: &StudentId,
    gradeable: &GradeableId,
  ) -> Result<MutationEvent> {
    self.set_cancelled(student, gradeable, true)
  }

  /// Put a cancelled version back in place.
  pub fn reinstate_submission(
    &self,
    student: &StudentId,
    gradeable: &GradeableId,
  ) -> Result<MutationEvent> {
    self.set_cancelled(student, gradeable, false)
  }

  fn set_cancelled(
    &self,
    student: &StudentId,
    gradeable: &GradeableId,
    cancelled: bool,
  ) -> Result<MutationEvent> {
    let mut ledgers = self.write();
    let submission = ledgers
      .submissions
      .get_mut(&(student.clone(), gradeable.clone()))
      .ok_or_else(|| Error::SubmissionNotFound(student.clone(), gradeable.clone()))?;
    submission.cancelled = cancelled;
    if !cancelled && submission.active_version == 0 {
      submission.active_version = 1;
    }
    Ok(MutationEvent::SubmissionChanged {
      student:   student.clone(),
      gradeable: gradeable.clone(),
    })
  }
}

// ─── FactSource impl ─────────────────────────────────────────────────────────

impl FactSource for MemoryLedger {
  type Error = Error;

  async fn list_students(&self) -> Result<Vec<StudentId>> {
    Ok(self.read().students.iter().cloned().collect())
  }

  async fn list_gradeables(&self) -> Result<Vec<Gradeable>> {
    Ok(self.read().gradeables.values().filter(|g| g.active).cloned().collect())
  }

  async fn gradeable(&self, id: GradeableId) -> Result<Option<Gradeable>> {
    Ok(self.read().gradeables.get(&id).cloned())
  }

  async fn initial_late_days(&self) -> Result<i32> { Ok(self.read().initial_late_days) }

  async fn grants_for_student(
    &self,
    student: StudentId,
    up_to: DateTime<Utc>,
  ) -> Result<Vec<LateDayGrant>> {
    Ok(
      self
        .read()
        .grants
        .iter()
        .filter(|g| g.student == student && g.effective_at <= up_to)
        .cloned()
        .collect(),
    )
  }

  async fn students_with_grants(&self) -> Result<Vec<(StudentId, DateTime<Utc>)>> {
    let mut earliest: BTreeMap<StudentId, DateTime<Utc>> = BTreeMap::new();
    for g in &self.read().grants {
      earliest
        .entry(g.student.clone())
        .and_modify(|at| *at = (*at).min(g.effective_at))
        .or_insert(g.effective_at);
    }
    Ok(earliest.into_iter().collect())
  }

  async fn extension(
    &self,
    student: StudentId,
    gradeable: GradeableId,
  ) -> Result<Option<Extension>> {
    Ok(self.read().extensions.get(&(student, gradeable)).cloned())
  }

  async fn active_submission(
    &self,
    student: StudentId,
    gradeable: GradeableId,
  ) -> Result<Option<Submission>> {
    Ok(self.read().submissions.get(&(student, gradeable)).cloned())
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  fn due() -> DateTime<Utc> { Utc.with_ymd_and_hms(1972, 1, 1, 23, 59, 59).unwrap() }

  fn homework() -> Gradeable {
    Gradeable {
      id:                      GradeableId::new("late_allowed_homework"),
      title:                   "Late Allowed Homework".into(),
      due_date:                Some(due()),
      late_submission_allowed: true,
      allowed_late_days:       1,
      active:                  true,
    }
  }

  #[test]
  fn editing_a_gradeable_reports_each_changed_setting() {
    let ledger = MemoryLedger::new();
    let created = ledger.upsert_gradeable(homework());
    assert_eq!(created, vec![MutationEvent::GradeableCreated {
      gradeable: GradeableId::new("late_allowed_homework"),
    }]);

    let mut edited = homework();
    edited.due_date = None;
    edited.late_submission_allowed = false;
    let events = ledger.upsert_gradeable(edited);
    assert_eq!(events.len(), 2);
    assert!(matches!(events[0], MutationEvent::DueDateChanged { .. }));
    assert!(matches!(events[1], MutationEvent::LateSubmissionToggled { allowed: false, .. }));

    assert!(ledger.upsert_gradeable(homework()).len() == 2);
    assert!(ledger.upsert_gradeable(homework()).is_empty());
  }

  #[test]
  fn bulk_delete_reports_affected_students() {
    let ledger = MemoryLedger::new();
    let (a, _) = ledger.grant(StudentId::new("harbel"), due(), 2);
    let (b, _) = ledger.grant(StudentId::new("moscie"), due(), 2);
    let (_keep, _) = ledger.grant(StudentId::new("barteh"), due(), 2);

    let event = ledger.bulk_delete_grants(&[a.grant_id, b.grant_id, Uuid::new_v4()]);
    let MutationEvent::GrantsDeleted { students } = event else {
      panic!("unexpected event {event:?}");
    };
    assert_eq!(students.len(), 2);
    assert!(students.contains(&StudentId::new("harbel")));
    assert_eq!(ledger.grants().len(), 1);
  }

  #[tokio::test]
  async fn grants_are_filtered_by_effective_date() {
    let ledger = MemoryLedger::new();
    let harbel = StudentId::new("harbel");
    ledger.grant(harbel.clone(), due() - chrono::Duration::days(2), 2);
    ledger.grant(harbel.clone(), due() + chrono::Duration::days(2), 5);

    let in_scope = ledger.grants_for_student(harbel.clone(), due()).await.unwrap();
    assert_eq!(in_scope.len(), 1);
    assert_eq!(in_scope[0].days, 2);

    let earliest = ledger.students_with_grants().await.unwrap();
    assert_eq!(earliest, vec![(harbel, due() - chrono::Duration::days(2))]);
  }

  #[tokio::test]
  async fn resubmitting_bumps_the_active_version() {
    let ledger = MemoryLedger::new();
    let student = StudentId::new("student");
    let hw = GradeableId::new("late_allowed_homework");
    ledger.submit(student.clone(), hw.clone(), due());
    ledger.submit(student.clone(), hw.clone(), due());
    ledger.cancel_submission(&student, &hw).unwrap();

    let sub = ledger.active_submission(student.clone(), hw.clone()).await.unwrap().unwrap();
    assert_eq!(sub.active_version, 2);
    assert!(sub.is_cancelled());

    ledger.reinstate_submission(&student, &hw).unwrap();
    let sub = ledger.active_submission(student, hw).await.unwrap().unwrap();
    assert!(!sub.is_cancelled());
  }

  #[test]
  fn deleting_missing_extension_is_none() {
    let ledger = MemoryLedger::new();
    assert!(
      ledger
        .delete_extension(&StudentId::new("harbel"), &GradeableId::new("hw"))
        .is_none()
    );
  }
}
