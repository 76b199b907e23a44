//! Conversions between cache entries and their integer columns.

use lateday_core::{
  cache::{CacheEntry, CacheKey, LateDayStatus},
  model::{GradeableId, StudentId},
};

use crate::{Error, Result};

pub fn encode_status(s: LateDayStatus) -> i64 { i64::from(s.code()) }

pub fn decode_status(code: i64) -> Result<LateDayStatus> {
  u8::try_from(code)
    .ok()
    .and_then(LateDayStatus::from_repr)
    .ok_or(Error::UnknownStatus(code))
}

fn decode_days(column: &'static str, value: i64) -> Result<u32> {
  u32::try_from(value).map_err(|_| Error::OutOfRange { column, value })
}

/// The value columns of a populated row, as read from SQLite.
#[derive(Debug)]
pub struct RawEntry {
  pub status:         i64,
  pub days_remaining: i64,
  pub days_late:      i64,
  pub days_allowed:   i64,
  pub days_charged:   i64,
}

impl RawEntry {
  /// Reads columns `offset..offset + 5` in schema order.
  pub fn from_row(row: &rusqlite::Row<'_>, offset: usize) -> rusqlite::Result<Self> {
    Ok(Self {
      status:         row.get(offset)?,
      days_remaining: row.get(offset + 1)?,
      days_late:      row.get(offset + 2)?,
      days_allowed:   row.get(offset + 3)?,
      days_charged:   row.get(offset + 4)?,
    })
  }

  pub fn into_entry(self) -> Result<CacheEntry> {
    Ok(CacheEntry {
      days_late:      decode_days("days_late", self.days_late)?,
      days_allowed:   decode_days("days_allowed", self.days_allowed)?,
      days_remaining: decode_days("late_days_remaining", self.days_remaining)?,
      days_charged:   decode_days("days_charged", self.days_charged)?,
      status:         decode_status(self.status)?,
    })
  }
}

/// Column values for an `UPDATE`; all `None` clears the row.
pub fn encode_entry(entry: Option<&CacheEntry>) -> [Option<i64>; 5] {
  match entry {
    Some(e) => [
      Some(encode_status(e.status)),
      Some(i64::from(e.days_remaining)),
      Some(i64::from(e.days_late)),
      Some(i64::from(e.days_allowed)),
      Some(i64::from(e.days_charged)),
    ],
    None => [None; 5],
  }
}

/// A populated row together with its key.
#[derive(Debug)]
pub struct RawRow {
  pub g_id:    String,
  pub user_id: String,
  pub entry:   RawEntry,
}

impl RawRow {
  pub fn into_pair(self) -> Result<(CacheKey, CacheEntry)> {
    let key = CacheKey::new(StudentId(self.user_id), GradeableId(self.g_id));
    Ok((key, self.entry.into_entry()?))
  }
}
