//! [`MemoryCache`]: the in-process [`CacheStore`].
//!
//! One mutex guards the slot map. Every operation is a short critical
//! section with no `.await` inside, which makes `begin`, `commit` and
//! `invalidate` on the same key mutually exclusive without any per-key
//! locking.

use std::{
  collections::{HashMap, HashSet},
  convert::Infallible,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use lateday_core::{
  cache::{CacheEntry, CacheKey, CacheStore, CommitOutcome, Ticket},
  invalidation::InvalidationScope,
  model::GradeableId,
};

#[derive(Debug)]
struct Slot {
  epoch: u64,
  entry: Option<CacheEntry>,
}

#[derive(Debug, Default)]
struct Slots {
  next_epoch: u64,
  slots:      HashMap<CacheKey, Slot>,
  removed:    HashSet<GradeableId>,
}

impl Slots {
  fn fresh_epoch(&mut self) -> u64 {
    self.next_epoch += 1;
    self.next_epoch
  }

  /// Drop every slot matching `pred`; counts the populated ones.
  fn drop_where(&mut self, pred: impl Fn(&CacheKey) -> bool) -> usize {
    let mut dropped = 0;
    self.slots.retain(|key, slot| {
      if pred(key) {
        dropped += usize::from(slot.entry.is_some());
        false
      } else {
        true
      }
    });
    dropped
  }
}

/// A late-day cache held in memory.
///
/// Cloning is cheap; clones share the same slots.
#[derive(Debug, Clone, Default)]
pub struct MemoryCache {
  inner: Arc<Mutex<Slots>>,
}

impl MemoryCache {
  pub fn new() -> Self { Self::default() }

  fn lock(&self) -> MutexGuard<'_, Slots> {
    self.inner.lock().unwrap_or_else(PoisonError::into_inner)
  }
}

impl CacheStore for MemoryCache {
  type Error = Infallible;

  async fn get(&self, key: CacheKey) -> Result<Option<CacheEntry>, Infallible> {
    Ok(self.lock().slots.get(&key).and_then(|s| s.entry.clone()))
  }

  async fn begin(&self, key: CacheKey) -> Result<Option<Ticket>, Infallible> {
    let mut slots = self.lock();
    if slots.removed.contains(&key.gradeable) {
      return Ok(None);
    }
    if let Some(slot) = slots.slots.get(&key) {
      return Ok(Some(Ticket { epoch: slot.epoch, key }));
    }
    let epoch = slots.fresh_epoch();
    slots.slots.insert(key.clone(), Slot { epoch, entry: None });
    Ok(Some(Ticket { key, epoch }))
  }

  async fn commit(
    &self,
    ticket: Ticket,
    entry: Option<CacheEntry>,
  ) -> Result<CommitOutcome, Infallible> {
    let mut slots = self.lock();
    let Some(slot) = slots.slots.get_mut(&ticket.key) else {
      return Ok(CommitOutcome::Discarded);
    };
    if slot.epoch != ticket.epoch {
      return Ok(CommitOutcome::Discarded);
    }
    let outcome = if entry.is_some() { CommitOutcome::Stored } else { CommitOutcome::Cleared };
    slot.entry = entry;
    Ok(outcome)
  }

  async fn invalidate<'a>(&'a self, scope: &'a InvalidationScope) -> Result<usize, Infallible> {
    if scope.is_nothing() {
      return Ok(0);
    }
    Ok(self.lock().drop_where(|key| scope.contains(key)))
  }

  async fn invalidate_all(&self) -> Result<usize, Infallible> {
    Ok(self.lock().drop_where(|_| true))
  }

  async fn remove_gradeable(&self, gradeable: GradeableId) -> Result<usize, Infallible> {
    let mut slots = self.lock();
    let dropped = slots.drop_where(|key| key.gradeable == gradeable);
    slots.removed.insert(gradeable);
    Ok(dropped)
  }

  async fn restore_gradeable(&self, gradeable: GradeableId) -> Result<(), Infallible> {
    self.lock().removed.remove(&gradeable);
    Ok(())
  }

  async fn entries(&self) -> Result<Vec<(CacheKey, CacheEntry)>, Infallible> {
    Ok(
      self
        .lock()
        .slots
        .iter()
        .filter_map(|(k, s)| s.entry.clone().map(|e| (k.clone(), e)))
        .collect(),
    )
  }
}

#[cfg(test)]
mod tests {
  use lateday_core::{cache::LateDayStatus, model::StudentId};

  use super::*;

  fn key(student: &str, gradeable: &str) -> CacheKey {
    CacheKey::new(StudentId::new(student), GradeableId::new(gradeable))
  }

  fn entry(status: LateDayStatus) -> CacheEntry {
    CacheEntry {
      days_late:      1,
      days_allowed:   1,
      days_remaining: 2,
      days_charged:   u32::from(status == LateDayStatus::Late),
      status,
    }
  }

  async fn populated(cache: &MemoryCache, k: CacheKey, e: CacheEntry) {
    let ticket = cache.begin(k).await.unwrap().unwrap();
    assert_eq!(cache.commit(ticket, Some(e)).await.unwrap(), CommitOutcome::Stored);
  }

  #[tokio::test]
  async fn get_never_computes() {
    let cache = MemoryCache::new();
    assert_eq!(cache.get(key("harbel", "hw")).await.unwrap(), None);
    cache.begin(key("harbel", "hw")).await.unwrap();
    // A reserved but uncommitted slot still reads as absent.
    assert_eq!(cache.get(key("harbel", "hw")).await.unwrap(), None);
  }

  #[tokio::test]
  async fn invalidation_is_idempotent() {
    let cache = MemoryCache::new();
    populated(&cache, key("harbel", "hw"), entry(LateDayStatus::Late)).await;

    let scope = InvalidationScope::Pair(key("harbel", "hw"));
    assert_eq!(cache.invalidate(&scope).await.unwrap(), 1);
    assert_eq!(cache.invalidate(&scope).await.unwrap(), 0);
    assert_eq!(cache.get(key("harbel", "hw")).await.unwrap(), None);

    // Invalidating a key that was never written is a no-op.
    let absent = InvalidationScope::Pair(key("nobody", "hw"));
    assert_eq!(cache.invalidate(&absent).await.unwrap(), 0);
  }

  #[tokio::test]
  async fn commit_after_invalidation_is_discarded() {
    let cache = MemoryCache::new();
    let k = key("harbel", "hw");
    let stale = cache.begin(k.clone()).await.unwrap().unwrap();

    cache.invalidate(&InvalidationScope::Student(StudentId::new("harbel"))).await.unwrap();
    // A fresh ticket after the invalidation must not share the stale epoch.
    let fresh = cache.begin(k.clone()).await.unwrap().unwrap();
    assert_ne!(stale.epoch, fresh.epoch);

    let outcome = cache.commit(stale, Some(entry(LateDayStatus::Good))).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Discarded);
    assert_eq!(cache.get(k.clone()).await.unwrap(), None);

    let outcome = cache.commit(fresh, Some(entry(LateDayStatus::Late))).await.unwrap();
    assert_eq!(outcome, CommitOutcome::Stored);
    assert_eq!(cache.get(k).await.unwrap().map(|e| e.status), Some(LateDayStatus::Late));
  }

  #[tokio::test]
  async fn commit_replaces_whole_entry() {
    let cache = MemoryCache::new();
    let k = key("moscie", "hw");
    populated(&cache, k.clone(), entry(LateDayStatus::BadTooManyForTerm)).await;
    populated(&cache, k.clone(), entry(LateDayStatus::Late)).await;
    assert_eq!(cache.get(k).await.unwrap(), Some(entry(LateDayStatus::Late)));
  }

  #[tokio::test]
  async fn removed_gradeable_refuses_tickets_until_restored() {
    let cache = MemoryCache::new();
    populated(&cache, key("harbel", "deleteme"), entry(LateDayStatus::Good)).await;
    populated(&cache, key("harbel", "hw"), entry(LateDayStatus::Good)).await;

    assert_eq!(cache.remove_gradeable(GradeableId::new("deleteme")).await.unwrap(), 1);
    assert!(cache.begin(key("moscie", "deleteme")).await.unwrap().is_none());
    assert_eq!(cache.entries().await.unwrap().len(), 1);

    cache.restore_gradeable(GradeableId::new("deleteme")).await.unwrap();
    assert!(cache.begin(key("moscie", "deleteme")).await.unwrap().is_some());
  }
}
