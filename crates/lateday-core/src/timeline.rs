//! A student's term timeline: the calculator applied to each of their
//! gradeables in due-date order, threading the term balance through.
//!
//! The balance available at a gradeable is the grant in effect at its due
//! date (or the course default) minus every late day charged on earlier
//! gradeables. A pair that cannot be computed leaves the balance of every
//! later gradeable unknown, so those pairs fail too.

use std::cmp::Ordering;

use crate::{
  Error, Result,
  cache::{CacheKey, Computation},
  calculator::{PairFacts, compute},
  model::{
    Extension, Gradeable, LateDayGrant, StudentId, Submission, grant_in_effect,
  },
};

/// Ledger facts for one pair, or the error raised while fetching them.
#[derive(Debug)]
pub struct PairInput {
  pub gradeable: Gradeable,
  pub ledgers:   Result<PairLedgers>,
}

#[derive(Debug, Clone, Default)]
pub struct PairLedgers {
  pub extension:  Option<Extension>,
  pub submission: Option<Submission>,
}

/// The calculator's verdict for one pair.
#[derive(Debug)]
pub struct PairResult {
  pub key:    CacheKey,
  pub result: Result<Computation>,
}

/// Order gradeables the way balances are consumed: by due date, undated
/// last, then by id.
pub fn timeline_order(a: &Gradeable, b: &Gradeable) -> Ordering {
  match (a.due_date, b.due_date) {
    (Some(x), Some(y)) => x.cmp(&y),
    (Some(_), None) => Ordering::Less,
    (None, Some(_)) => Ordering::Greater,
    (None, None) => Ordering::Equal,
  }
  .then_with(|| a.id.cmp(&b.id))
}

/// Walk one student's gradeables and compute every pair.
pub fn walk(
  student: &StudentId,
  initial_late_days: i32,
  grants: &[LateDayGrant],
  mut inputs: Vec<PairInput>,
) -> Vec<PairResult> {
  inputs.sort_by(|a, b| timeline_order(&a.gradeable, &b.gradeable));

  let mut charged: u32 = 0;
  let mut blocked_by: Option<String> = None;
  let mut results = Vec::with_capacity(inputs.len());

  for PairInput { gradeable, ledgers } in inputs {
    let key = CacheKey::new(student.clone(), gradeable.id.clone());
    let result = step(
      student,
      initial_late_days,
      grants,
      &gradeable,
      ledgers,
      charged,
      blocked_by.as_deref(),
    );

    match &result {
      Ok(computation) => {
        if let Some(entry) = computation.entry() {
          charged = charged.saturating_add(entry.days_charged);
        }
      }
      Err(_) if gradeable.tracks_late_days() && blocked_by.is_none() => {
        blocked_by = Some(gradeable.id.to_string());
      }
      Err(_) => {}
    }

    results.push(PairResult { key, result });
  }

  results
}

fn step(
  student: &StudentId,
  initial_late_days: i32,
  grants: &[LateDayGrant],
  gradeable: &Gradeable,
  ledgers: Result<PairLedgers>,
  charged: u32,
  blocked_by: Option<&str>,
) -> Result<Computation> {
  let Some(due) = gradeable.due_date.filter(|_| gradeable.tracks_late_days()) else {
    // Outside late-day accounting: empty regardless of ledgers or balance.
    let facts = PairFacts {
      student,
      gradeable,
      days_remaining: 0,
      extension: None,
      submission: None,
    };
    return compute(&facts);
  };

  if let Some(earlier) = blocked_by {
    return Err(Error::InconsistentFacts(format!(
      "balance for {student} unknown after failure on {earlier}"
    )));
  }

  let ledgers = ledgers?;

  let balance = match grant_in_effect(grants, due) {
    Some(grant) => u32::try_from(grant.days).map_err(|_| {
      Error::InconsistentFacts(format!(
        "grant {} for {student} has {} days",
        grant.grant_id, grant.days
      ))
    })?,
    None => u32::try_from(initial_late_days).map_err(|_| {
      Error::InconsistentFacts(format!(
        "course default of {initial_late_days} initial late days"
      ))
    })?,
  };

  compute(&PairFacts {
    student,
    gradeable,
    days_remaining: balance.saturating_sub(charged),
    extension: ledgers.extension.as_ref(),
    submission: ledgers.submission.as_ref(),
  })
}

#[cfg(test)]
mod tests {
  use chrono::{DateTime, Duration, TimeZone, Utc};
  use uuid::Uuid;

  use super::*;
  use crate::{cache::LateDayStatus, model::GradeableId};

  fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(1972, 1, day, 23, 59, 59).unwrap()
  }

  fn gradeable(id: &str, due_day: u32) -> Gradeable {
    Gradeable {
      id:                      GradeableId::new(id),
      title:                   id.to_uppercase(),
      due_date:                Some(at(due_day)),
      late_submission_allowed: true,
      allowed_late_days:       2,
      active:                  true,
    }
  }

  fn late_by(student: &StudentId, g: &Gradeable, days: i64) -> PairInput {
    let due = g.due_date.unwrap();
    PairInput {
      gradeable: g.clone(),
      ledgers:   Ok(PairLedgers {
        extension:  None,
        submission: Some(Submission {
          student:        student.clone(),
          gradeable:      g.id.clone(),
          active_version: 1,
          submitted_at:   due + Duration::days(days) - Duration::minutes(1),
          cancelled:      false,
        }),
      }),
    }
  }

  fn status_of(results: &[PairResult], id: &str) -> Option<LateDayStatus> {
    results
      .iter()
      .find(|r| r.key.gradeable.as_str() == id)
      .and_then(|r| r.result.as_ref().ok())
      .and_then(|c| c.entry())
      .map(|e| e.status)
  }

  #[test]
  fn charges_accumulate_in_due_date_order() {
    let s = StudentId::new("moscie");
    let hw1 = gradeable("hw1", 1);
    let hw2 = gradeable("hw2", 8);
    // Supplied out of order on purpose.
    let inputs = vec![late_by(&s, &hw2, 2), late_by(&s, &hw1, 2)];

    let results = walk(&s, 3, &[], inputs);
    assert_eq!(results[0].key.gradeable.as_str(), "hw1");
    assert_eq!(status_of(&results, "hw1"), Some(LateDayStatus::Late));
    // One day left after hw1, hw2 needs two.
    assert_eq!(status_of(&results, "hw2"), Some(LateDayStatus::BadTooManyForTerm));
  }

  #[test]
  fn grant_in_effect_at_due_date_sets_the_balance() {
    let s = StudentId::new("harbel");
    let hw1 = gradeable("hw1", 1);
    let hw2 = gradeable("hw2", 8);
    let grants = vec![LateDayGrant {
      grant_id:     Uuid::new_v4(),
      student:      s.clone(),
      effective_at: at(5),
      days:         4,
    }];

    let results = walk(&s, 0, &grants, vec![late_by(&s, &hw1, 1), late_by(&s, &hw2, 1)]);
    assert_eq!(status_of(&results, "hw1"), Some(LateDayStatus::BadTooManyForTerm));
    assert_eq!(status_of(&results, "hw2"), Some(LateDayStatus::Late));
  }

  #[test]
  fn failure_blocks_later_pairs_only() {
    let s = StudentId::new("barteh");
    let hw1 = gradeable("hw1", 1);
    let hw2 = gradeable("hw2", 4);
    let hw3 = gradeable("hw3", 8);
    let broken = PairInput {
      gradeable: hw2.clone(),
      ledgers:   Err(Error::FactSourceUnavailable("submissions offline".into())),
    };

    let results = walk(&s, 2, &[], vec![late_by(&s, &hw1, 0), broken, late_by(&s, &hw3, 1)]);
    assert_eq!(status_of(&results, "hw1"), Some(LateDayStatus::Good));
    assert!(matches!(results[1].result, Err(Error::FactSourceUnavailable(_))));
    assert!(matches!(results[2].result, Err(Error::InconsistentFacts(_))));
  }

  #[test]
  fn negative_grant_is_inconsistent() {
    let s = StudentId::new("harbel");
    let hw1 = gradeable("hw1", 8);
    let grants = vec![LateDayGrant {
      grant_id:     Uuid::new_v4(),
      student:      s.clone(),
      effective_at: at(1),
      days:         -2,
    }];

    let results = walk(&s, 0, &grants, vec![late_by(&s, &hw1, 1)]);
    assert!(matches!(results[0].result, Err(Error::InconsistentFacts(_))));
  }

  #[test]
  fn untracked_gradeables_stay_empty_after_failure() {
    let s = StudentId::new("harbel");
    let hw1 = gradeable("hw1", 1);
    let mut untimed = gradeable("untimed", 3);
    untimed.due_date = None;
    let broken = PairInput {
      gradeable: hw1,
      ledgers:   Err(Error::FactSourceUnavailable("down".into())),
    };
    let results = walk(
      &s,
      0,
      &[],
      vec![broken, PairInput { gradeable: untimed, ledgers: Ok(PairLedgers::default()) }],
    );
    assert!(matches!(results[1].result, Ok(Computation::Empty(_))));
  }
}
