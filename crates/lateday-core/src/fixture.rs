//! Typed fact fixtures: the full set of upstream records for a course,
//! loadable from TOML.
//!
//! Timestamps are RFC 3339 strings (`"1972-01-01T23:59:59Z"`), not TOML
//! datetime literals.

use serde::{Deserialize, Serialize};

use crate::{
  Result,
  model::{Extension, Gradeable, LateDayGrant, StudentId, Submission},
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FactFixture {
  /// The course's "Initial Late Days".
  #[serde(default)]
  pub initial_late_days: i32,
  #[serde(default)]
  pub students:          Vec<StudentId>,
  #[serde(default)]
  pub gradeables:        Vec<Gradeable>,
  #[serde(default)]
  pub grants:            Vec<LateDayGrant>,
  #[serde(default)]
  pub extensions:        Vec<Extension>,
  #[serde(default)]
  pub submissions:       Vec<Submission>,
}

impl FactFixture {
  pub fn from_toml_str(raw: &str) -> Result<Self> { Ok(toml::from_str(raw)?) }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_toml_fixture() {
    let raw = r#"
      initial_late_days = 0
      students = ["harbel", "moscie"]

      [[gradeables]]
      id = "late_allowed_homework"
      title = "Late Allowed Homework"
      due_date = "1972-01-01T23:59:59Z"
      allowed_late_days = 1

      [[submissions]]
      student = "harbel"
      gradeable = "late_allowed_homework"
      active_version = 1
      submitted_at = "1972-01-02T20:00:00Z"

      [[extensions]]
      student = "moscie"
      gradeable = "late_allowed_homework"
      days = 2
    "#;

    let fixture = FactFixture::from_toml_str(raw).unwrap();
    assert_eq!(fixture.students.len(), 2);
    assert!(fixture.gradeables[0].late_submission_allowed);
    assert!(fixture.gradeables[0].active);
    assert_eq!(fixture.gradeables[0].allowed_late_days, 1);
    assert!(!fixture.submissions[0].cancelled);
    assert_eq!(fixture.extensions[0].days, 2);
    assert!(fixture.grants.is_empty());
  }

  #[test]
  fn rejects_toml_datetime_literals() {
    let raw = r#"
      [[gradeables]]
      id = "hw"
      title = "Homework"
      due_date = 1972-01-01T23:59:59Z
    "#;
    assert!(FactFixture::from_toml_str(raw).is_err());
  }
}
