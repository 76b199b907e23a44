//! Terminal rendering of the bulk late-days table and pass reports.

use comfy_table::{Table, modifiers::UTF8_ROUND_CORNERS, presets::UTF8_FULL};
use lateday_engine::{BulkSummary, RecomputeReport, SummaryRow};

fn header(summary: &BulkSummary) -> Vec<String> {
  let mut header = vec!["Student".to_owned(), "Initial Late Days".to_owned()];
  header.extend(summary.columns.iter().map(|c| c.title.clone()));
  header.push("Late Days Remaining".to_owned());
  header
}

/// Display cells for one row, in header order. Absent cells are blank.
fn row_cells(row: &SummaryRow) -> Vec<String> {
  let mut cells = vec![row.student.to_string(), row.initial_late_days.to_string()];
  cells.extend(row.cell_texts());
  cells.push(row.late_days_remaining.map(|d| d.to_string()).unwrap_or_default());
  cells
}

/// Render `summary` as a table, one row per student.
pub fn summary_table(summary: &BulkSummary) -> Table {
  let mut table = Table::new();
  table
    .load_preset(UTF8_FULL)
    .apply_modifier(UTF8_ROUND_CORNERS)
    .set_header(header(summary));
  for row in &summary.rows {
    table.add_row(row_cells(row));
  }
  table
}

/// One-line account of a pass.
pub fn report_line(report: &RecomputeReport) -> String {
  format!(
    "pass {}: {} students, {} stored, {} empty, {} discarded, {} failed",
    report.pass_id,
    report.students,
    report.stored,
    report.cleared,
    report.discarded,
    report.failed(),
  )
}
