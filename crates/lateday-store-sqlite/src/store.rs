//! [`SqliteCache`]: the SQLite implementation of [`CacheStore`].

use std::path::Path;

use lateday_core::{
  cache::{CacheEntry, CacheKey, CacheStore, CommitOutcome, Ticket},
  invalidation::InvalidationScope,
  model::GradeableId,
};
use rusqlite::{OptionalExtension as _, Transaction, params, params_from_iter};

use crate::{
  Error, Result,
  encode::{RawEntry, RawRow, encode_entry},
  schema::SCHEMA,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A late-day cache backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteCache {
  conn: tokio_rusqlite::Connection,
}

impl SqliteCache {
  /// Open (or create) a cache at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let cache = Self { conn };
    cache.init_schema().await?;
    Ok(cache)
  }

  /// Open an in-memory cache, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let cache = Self { conn };
    cache.init_schema().await?;
    Ok(cache)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

/// `WHERE` fragments and their arguments covering `scope`.
fn scope_filters(scope: &InvalidationScope) -> Vec<(&'static str, Vec<String>)> {
  match scope {
    InvalidationScope::Nothing => Vec::new(),
    InvalidationScope::Pair(key) => vec![(
      "g_id = ?1 AND user_id = ?2",
      vec![key.gradeable.to_string(), key.student.to_string()],
    )],
    InvalidationScope::Student(s) => vec![("user_id = ?1", vec![s.to_string()])],
    InvalidationScope::Students(set) => set
      .iter()
      .map(|s| ("user_id = ?1", vec![s.to_string()]))
      .collect(),
    InvalidationScope::Gradeable(g) => vec![("g_id = ?1", vec![g.to_string()])],
    InvalidationScope::DefaultBalanceUsers | InvalidationScope::All => {
      vec![("1 = 1", Vec::new())]
    }
  }
}

/// Delete the rows matching `filter`; returns how many were populated.
fn drop_rows(tx: &Transaction<'_>, filter: &str, args: &[String]) -> rusqlite::Result<usize> {
  let populated: usize = tx.query_row(
    &format!(
      "SELECT COUNT(*) FROM late_day_cache
       WHERE late_day_status IS NOT NULL AND ({filter})"
    ),
    params_from_iter(args.iter()),
    |r| r.get(0),
  )?;
  tx.execute(
    &format!("DELETE FROM late_day_cache WHERE {filter}"),
    params_from_iter(args.iter()),
  )?;
  Ok(populated)
}

// ─── CacheStore impl ─────────────────────────────────────────────────────────

impl CacheStore for SqliteCache {
  type Error = Error;

  async fn get(&self, key: CacheKey) -> Result<Option<CacheEntry>> {
    let raw: Option<RawEntry> = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              "SELECT late_day_status, late_days_remaining, days_late,
                      days_allowed, days_charged
               FROM late_day_cache
               WHERE g_id = ?1 AND user_id = ?2 AND late_day_status IS NOT NULL",
              params![key.gradeable.as_str(), key.student.as_str()],
              |r| RawEntry::from_row(r, 0),
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawEntry::into_entry).transpose()
  }

  async fn begin(&self, key: CacheKey) -> Result<Option<Ticket>> {
    let epoch: Option<i64> = self
      .conn
      .call({
        let key = key.clone();
        move |conn| {
          let tx = conn.transaction()?;
          let removed = tx
            .query_row(
              "SELECT 1 FROM late_day_cache_removed WHERE g_id = ?1",
              params![key.gradeable.as_str()],
              |_| Ok(()),
            )
            .optional()?
            .is_some();
          if removed {
            return Ok(None);
          }
          tx.execute(
            "INSERT OR IGNORE INTO late_day_cache (g_id, user_id) VALUES (?1, ?2)",
            params![key.gradeable.as_str(), key.student.as_str()],
          )?;
          let id: i64 = tx.query_row(
            "SELECT id FROM late_day_cache WHERE g_id = ?1 AND user_id = ?2",
            params![key.gradeable.as_str(), key.student.as_str()],
            |r| r.get(0),
          )?;
          tx.commit()?;
          Ok(Some(id))
        }
      })
      .await?;

    Ok(epoch.map(|id| Ticket { key, epoch: id.unsigned_abs() }))
  }

  async fn commit(&self, ticket: Ticket, entry: Option<CacheEntry>) -> Result<CommitOutcome> {
    let outcome = if entry.is_some() { CommitOutcome::Stored } else { CommitOutcome::Cleared };
    let [status, remaining, late, allowed, charged] = encode_entry(entry.as_ref());
    let Ok(id) = i64::try_from(ticket.epoch) else {
      return Ok(CommitOutcome::Discarded);
    };

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE late_day_cache
           SET late_day_status = ?4, late_days_remaining = ?5, days_late = ?6,
               days_allowed = ?7, days_charged = ?8
           WHERE id = ?1 AND g_id = ?2 AND user_id = ?3",
          params![
            id,
            ticket.key.gradeable.as_str(),
            ticket.key.student.as_str(),
            status,
            remaining,
            late,
            allowed,
            charged,
          ],
        )?)
      })
      .await?;

    Ok(if updated == 0 { CommitOutcome::Discarded } else { outcome })
  }

  async fn invalidate<'a>(&'a self, scope: &'a InvalidationScope) -> Result<usize> {
    let filters = scope_filters(scope);
    if filters.is_empty() {
      return Ok(0);
    }
    let dropped = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let mut dropped = 0;
        for (filter, args) in &filters {
          dropped += drop_rows(&tx, filter, args)?;
        }
        tx.commit()?;
        Ok(dropped)
      })
      .await?;
    Ok(dropped)
  }

  async fn invalidate_all(&self) -> Result<usize> {
    self.invalidate(&InvalidationScope::All).await
  }

  async fn remove_gradeable(&self, gradeable: GradeableId) -> Result<usize> {
    let dropped = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT OR IGNORE INTO late_day_cache_removed (g_id) VALUES (?1)",
          params![gradeable.as_str()],
        )?;
        let dropped = drop_rows(&tx, "g_id = ?1", &[gradeable.to_string()])?;
        tx.commit()?;
        Ok(dropped)
      })
      .await?;
    Ok(dropped)
  }

  async fn restore_gradeable(&self, gradeable: GradeableId) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "DELETE FROM late_day_cache_removed WHERE g_id = ?1",
          params![gradeable.as_str()],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn entries(&self) -> Result<Vec<(CacheKey, CacheEntry)>> {
    let rows: Vec<RawRow> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT g_id, user_id, late_day_status, late_days_remaining,
                  days_late, days_allowed, days_charged
           FROM late_day_cache
           WHERE late_day_status IS NOT NULL
           ORDER BY user_id, g_id",
        )?;
        let rows = stmt
          .query_map([], |r| {
            Ok(RawRow { g_id: r.get(0)?, user_id: r.get(1)?, entry: RawEntry::from_row(r, 2)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    rows.into_iter().map(RawRow::into_pair).collect()
  }
}
