//! The bulk late-days table, assembled from cached entries only.

use std::collections::HashMap;

use lateday_core::{
  cache::{CacheEntry, CacheKey},
  model::{Gradeable, GradeableId, StudentId},
  timeline::timeline_order,
};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryColumn {
  pub id:    GradeableId,
  pub title: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
  pub student:             StudentId,
  pub initial_late_days:   i32,
  /// One cell per column; `None` renders blank.
  pub cells:               Vec<Option<CacheEntry>>,
  /// Balance after the last column. Only known once every cell is.
  pub late_days_remaining: Option<u32>,
}

impl SummaryRow {
  /// Cell display text, blank for absent entries.
  pub fn cell_texts(&self) -> Vec<String> {
    self
      .cells
      .iter()
      .map(|c| c.as_ref().map(CacheEntry::cell).unwrap_or_default())
      .collect()
  }
}

#[derive(Debug, Clone, Serialize)]
pub struct BulkSummary {
  pub initial_late_days: i32,
  pub columns:           Vec<SummaryColumn>,
  pub rows:              Vec<SummaryRow>,
}

impl BulkSummary {
  pub(crate) fn build(
    initial_late_days: i32,
    mut students: Vec<StudentId>,
    mut gradeables: Vec<Gradeable>,
    entries: Vec<(CacheKey, CacheEntry)>,
  ) -> Self {
    gradeables.retain(Gradeable::tracks_late_days);
    gradeables.sort_by(timeline_order);
    students.sort();

    let mut entries: HashMap<CacheKey, CacheEntry> = entries.into_iter().collect();
    let rows = students
      .into_iter()
      .map(|student| {
        let cells: Vec<Option<CacheEntry>> = gradeables
          .iter()
          .map(|g| entries.remove(&CacheKey::new(student.clone(), g.id.clone())))
          .collect();
        let late_days_remaining = match cells.last() {
          Some(Some(last)) if cells.iter().all(Option::is_some) => Some(last.remaining_after()),
          _ => None,
        };
        SummaryRow { student, initial_late_days, cells, late_days_remaining }
      })
      .collect();

    let columns = gradeables
      .into_iter()
      .map(|g| SummaryColumn { id: g.id, title: g.title })
      .collect();

    Self { initial_late_days, columns, rows }
  }

  pub fn row(&self, student: &StudentId) -> Option<&SummaryRow> {
    self.rows.iter().find(|r| &r.student == student)
  }

  /// Index of a gradeable's column, if it is shown.
  pub fn column(&self, gradeable: &GradeableId) -> Option<usize> {
    self.columns.iter().position(|c| &c.id == gradeable)
  }
}
