//! The late-day calculator: a pure function from the facts of one
//! (student, gradeable) pair to a [`Computation`].
//!
//! Nothing here touches a cache or a ledger. The caller supplies the term
//! balance the student has left before this gradeable (see
//! [`crate::timeline`]).

use chrono::{DateTime, TimeDelta, Utc};

use crate::{
  Error, Result,
  cache::{CacheEntry, Computation, EmptyReason, LateDayStatus},
  model::{Extension, Gradeable, GradeableId, StudentId, Submission},
};

/// Everything the calculator needs for one pair.
#[derive(Debug, Clone, Copy)]
pub struct PairFacts<'a> {
  pub student:        &'a StudentId,
  pub gradeable:      &'a Gradeable,
  /// Term balance before this gradeable consumes anything.
  pub days_remaining: u32,
  pub extension:      Option<&'a Extension>,
  pub submission:     Option<&'a Submission>,
}

/// Whole days between `due` and `submitted_at`, rounded up; zero when on
/// time.
pub fn days_late(submitted_at: DateTime<Utc>, due: DateTime<Utc>) -> u32 {
  let late = submitted_at - due;
  if late <= TimeDelta::zero() {
    return 0;
  }
  let whole = late.num_days();
  let partial = late - TimeDelta::days(whole) > TimeDelta::zero();
  u32::try_from(whole + i64::from(partial)).unwrap_or(u32::MAX)
}

/// The four-way status rule.
///
/// Term exhaustion is checked before the per-assignment cap, so a submission
/// that breaks both is reported as too many late days for the term.
pub fn late_day_status(
  days_allowed: u32,
  days_late: u32,
  days_remaining: u32,
) -> LateDayStatus {
  if days_late == 0 {
    LateDayStatus::Good
  } else if days_late <= days_allowed && days_late <= days_remaining {
    LateDayStatus::Late
  } else if days_late > days_remaining {
    LateDayStatus::BadTooManyForTerm
  } else {
    LateDayStatus::BadTooManyForAssignment
  }
}

/// Run the calculator for one pair.
///
/// Returns [`Computation::Empty`] for gradeables outside late-day accounting
/// and [`Error::InconsistentFacts`] when the facts cannot describe a valid
/// pair.
pub fn compute(facts: &PairFacts<'_>) -> Result<Computation> {
  let gradeable = facts.gradeable;

  if !gradeable.active {
    return Ok(Computation::Empty(EmptyReason::GradeableInactive));
  }
  let Some(due) = gradeable.due_date else {
    return Ok(Computation::Empty(EmptyReason::NoDueDate));
  };
  if !gradeable.late_submission_allowed {
    return Ok(Computation::Empty(EmptyReason::LateSubmissionDisabled));
  }

  let days_allowed = u32::try_from(gradeable.allowed_late_days).map_err(|_| {
    Error::InconsistentFacts(format!(
      "gradeable {} allows {} late days",
      gradeable.id, gradeable.allowed_late_days
    ))
  })?;

  let extension_days = match facts.extension {
    Some(ext) => {
      check_pair(facts, &ext.student, &ext.gradeable, "extension")?;
      u32::try_from(ext.days).map_err(|_| {
        Error::InconsistentFacts(format!(
          "extension of {} days for {} on {}",
          ext.days, ext.student, ext.gradeable
        ))
      })?
    }
    None => 0,
  };

  let Some(submission) = facts.submission else {
    return Ok(Computation::Entry(CacheEntry {
      days_late: 0,
      days_allowed,
      days_remaining: facts.days_remaining,
      days_charged: 0,
      status: LateDayStatus::NoSubmission,
    }));
  };
  check_pair(facts, &submission.student, &submission.gradeable, "submission")?;

  if submission.is_cancelled() {
    return Ok(Computation::Entry(CacheEntry {
      days_late: 0,
      days_allowed,
      days_remaining: facts.days_remaining,
      days_charged: 0,
      status: LateDayStatus::CancelledSubmission,
    }));
  }

  // The extension moves this gradeable's deadline only.
  let late = days_late(submission.submitted_at, due).saturating_sub(extension_days);
  let status = late_day_status(days_allowed, late, facts.days_remaining);

  Ok(Computation::Entry(CacheEntry {
    days_late: late,
    days_allowed,
    days_remaining: facts.days_remaining,
    days_charged: if status == LateDayStatus::Late { late } else { 0 },
    status,
  }))
}

fn check_pair(
  facts: &PairFacts<'_>,
  student: &StudentId,
  gradeable: &GradeableId,
  what: &str,
) -> Result<()> {
  if student != facts.student || gradeable != &facts.gradeable.id {
    return Err(Error::InconsistentFacts(format!(
      "{what} for ({student}, {gradeable}) supplied for ({}, {})",
      facts.student, facts.gradeable.id
    )));
  }
  Ok(())
}

#[cfg(test)]
mod tests {
  use chrono::{Duration, TimeZone};

  use super::*;

  fn due() -> DateTime<Utc> { Utc.with_ymd_and_hms(1972, 1, 1, 23, 59, 59).unwrap() }

  fn homework(allowed: i32) -> Gradeable {
    Gradeable {
      id:                      GradeableId::new("late_allowed_homework"),
      title:                   "Late Allowed Homework".into(),
      due_date:                Some(due()),
      late_submission_allowed: true,
      allowed_late_days:       allowed,
      active:                  true,
    }
  }

  fn submitted(student: &StudentId, days: i64) -> Submission {
    Submission {
      student:        student.clone(),
      gradeable:      GradeableId::new("late_allowed_homework"),
      active_version: 1,
      submitted_at:   due() + Duration::days(days) - Duration::minutes(5),
      cancelled:      false,
    }
  }

  #[test]
  fn status_rule_concrete_cases() {
    for remaining in 0..4 {
      assert_eq!(late_day_status(1, 0, remaining), LateDayStatus::Good);
    }
    assert_eq!(late_day_status(1, 3, 0), LateDayStatus::BadTooManyForTerm);
    assert_eq!(late_day_status(1, 2, 2), LateDayStatus::BadTooManyForAssignment);
    assert_eq!(late_day_status(1, 1, 2), LateDayStatus::Late);
    assert_eq!(late_day_status(1, 3, 2), LateDayStatus::BadTooManyForTerm);
  }

  #[test]
  fn status_rule_is_total() {
    for allowed in 0..5 {
      for late in 0..6 {
        for remaining in 0..6 {
          let status = late_day_status(allowed, late, remaining);
          let expected = if late == 0 {
            LateDayStatus::Good
          } else if late <= allowed && late <= remaining {
            LateDayStatus::Late
          } else if late > remaining {
            LateDayStatus::BadTooManyForTerm
          } else {
            LateDayStatus::BadTooManyForAssignment
          };
          assert_eq!(status, expected, "({allowed}, {late}, {remaining})");
        }
      }
    }
  }

  #[test]
  fn days_late_rounds_partial_days_up() {
    assert_eq!(days_late(due() - Duration::hours(1), due()), 0);
    assert_eq!(days_late(due(), due()), 0);
    assert_eq!(days_late(due() + Duration::seconds(1), due()), 1);
    assert_eq!(days_late(due() + Duration::milliseconds(500), due()), 1);
    assert_eq!(days_late(due() + Duration::nanoseconds(1), due()), 1);
    assert_eq!(days_late(due() + Duration::days(1), due()), 1);
    assert_eq!(days_late(due() + Duration::days(1) + Duration::microseconds(1), due()), 2);
    assert_eq!(days_late(due() + Duration::hours(25), due()), 2);
  }

  #[test]
  fn disabled_gradeables_compute_empty() {
    let student = StudentId::new("harbel");
    let mut g = homework(1);
    g.due_date = None;
    let facts = PairFacts {
      student:        &student,
      gradeable:      &g,
      days_remaining: 0,
      extension:      None,
      submission:     None,
    };
    assert_eq!(compute(&facts).unwrap(), Computation::Empty(EmptyReason::NoDueDate));

    let mut g = homework(1);
    g.late_submission_allowed = false;
    let facts = PairFacts { gradeable: &g, ..facts };
    assert_eq!(
      compute(&facts).unwrap(),
      Computation::Empty(EmptyReason::LateSubmissionDisabled)
    );
  }

  #[test]
  fn one_day_late_without_balance_is_bad_for_term() {
    let student = StudentId::new("harbel");
    let g = homework(1);
    let sub = submitted(&student, 1);
    let facts = PairFacts {
      student:        &student,
      gradeable:      &g,
      days_remaining: 0,
      extension:      None,
      submission:     Some(&sub),
    };
    let entry = compute(&facts).unwrap().into_entry().unwrap();
    assert_eq!(entry.status, LateDayStatus::BadTooManyForTerm);
    assert_eq!(entry.days_late, 1);
    assert_eq!(entry.days_charged, 0);
  }

  #[test]
  fn late_status_charges_the_balance() {
    let student = StudentId::new("harbel");
    let g = homework(1);
    let sub = submitted(&student, 1);
    let facts = PairFacts {
      student:        &student,
      gradeable:      &g,
      days_remaining: 2,
      extension:      None,
      submission:     Some(&sub),
    };
    let entry = compute(&facts).unwrap().into_entry().unwrap();
    assert_eq!(entry.status, LateDayStatus::Late);
    assert_eq!(entry.days_charged, 1);
    assert_eq!(entry.remaining_after(), 1);
  }

  #[test]
  fn extension_moves_the_deadline() {
    let g = homework(1);
    let cases = [
      ("moscie", 3, LateDayStatus::BadTooManyForTerm),
      ("barteh", 2, LateDayStatus::Good),
      ("harbel", 1, LateDayStatus::Good),
    ];
    for (name, late, expected) in cases {
      let student = StudentId::new(name);
      let sub = submitted(&student, late);
      let ext = Extension { student: student.clone(), gradeable: g.id.clone(), days: 2 };
      let facts = PairFacts {
        student:        &student,
        gradeable:      &g,
        days_remaining: 0,
        extension:      Some(&ext),
        submission:     Some(&sub),
      };
      let entry = compute(&facts).unwrap().into_entry().unwrap();
      assert_eq!(entry.status, expected, "{name}");
    }
  }

  #[test]
  fn cancelled_submission_reports_special_status() {
    let student = StudentId::new("student");
    let g = homework(1);
    let mut sub = submitted(&student, 4);
    sub.cancelled = true;
    let facts = PairFacts {
      student:        &student,
      gradeable:      &g,
      days_remaining: 0,
      extension:      None,
      submission:     Some(&sub),
    };
    let entry = compute(&facts).unwrap().into_entry().unwrap();
    assert_eq!(entry.status, LateDayStatus::CancelledSubmission);
    assert_eq!(entry.days_late, 0);
    assert_eq!(entry.days_charged, 0);
    assert_eq!(entry.cell(), "");
  }

  #[test]
  fn negative_extension_is_inconsistent() {
    let student = StudentId::new("harbel");
    let g = homework(1);
    let ext = Extension { student: student.clone(), gradeable: g.id.clone(), days: -1 };
    let facts = PairFacts {
      student:        &student,
      gradeable:      &g,
      days_remaining: 0,
      extension:      Some(&ext),
      submission:     None,
    };
    assert!(matches!(compute(&facts), Err(Error::InconsistentFacts(_))));
  }

  #[test]
  fn submission_for_another_student_is_inconsistent() {
    let student = StudentId::new("harbel");
    let other = StudentId::new("moscie");
    let g = homework(1);
    let sub = submitted(&other, 1);
    let facts = PairFacts {
      student:        &student,
      gradeable:      &g,
      days_remaining: 0,
      extension:      None,
      submission:     Some(&sub),
    };
    assert!(matches!(compute(&facts), Err(Error::InconsistentFacts(_))));
  }
}
