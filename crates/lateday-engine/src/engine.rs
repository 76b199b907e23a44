//! [`LateDayEngine`]: the facade the surrounding application talks to.

use std::{collections::BTreeSet, sync::Arc};

use chrono::Utc;
use lateday_core::{
  cache::{CacheEntry, CacheKey, CacheStore, CommitOutcome, Ticket},
  facts::FactSource,
  invalidation::{InvalidationScope, MutationEvent, route},
  model::{Gradeable, GradeableId, StudentId},
  timeline::{PairInput, PairLedgers, walk},
};
use tokio::{sync::Semaphore, task::JoinSet};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{
  EngineConfig, EngineError,
  coordinator::{Coordinator, PassResult, Progress, RecomputeJob, RecomputeOutcome, RecomputeStatus},
  error::Result,
  report::{DiagnosticKind, PairDiagnostic, RecomputeReport, StudentTally},
  summary::BulkSummary,
};

// ─── Engine ──────────────────────────────────────────────────────────────────

/// The late-day cache engine.
///
/// Cloning is cheap; clones share the cache, the fact source and the
/// single-flight state.
pub struct LateDayEngine<F, C> {
  inner:       Arc<Inner<F, C>>,
  coordinator: Arc<Coordinator>,
}

impl<F, C> Clone for LateDayEngine<F, C> {
  fn clone(&self) -> Self {
    Self { inner: self.inner.clone(), coordinator: self.coordinator.clone() }
  }
}

struct Inner<F, C> {
  facts:  F,
  cache:  C,
  config: EngineConfig,
}

impl<F, C> LateDayEngine<F, C>
where
  F: FactSource + 'static,
  C: CacheStore + 'static,
{
  pub fn new(facts: F, cache: C, config: EngineConfig) -> Self {
    Self {
      inner:       Arc::new(Inner { facts, cache, config }),
      coordinator: Arc::new(Coordinator::new()),
    }
  }

  pub fn facts(&self) -> &F { &self.inner.facts }

  pub fn cache(&self) -> &C { &self.inner.cache }

  // ── Reads ─────────────────────────────────────────────────────────────

  /// The cached entry for a pair. Never triggers computation.
  pub async fn get(
    &self,
    student: StudentId,
    gradeable: GradeableId,
  ) -> Result<Option<CacheEntry>> {
    self
      .inner
      .cache
      .get(CacheKey::new(student, gradeable))
      .await
      .map_err(EngineError::cache)
  }

  /// Display text for a pair: days charged, or blank when absent.
  pub async fn cell(&self, student: StudentId, gradeable: GradeableId) -> Result<String> {
    Ok(self.get(student, gradeable).await?.map(|e| e.cell()).unwrap_or_default())
  }

  /// The bulk late-days table, read straight from the cache.
  pub async fn summary(&self) -> Result<BulkSummary> {
    let facts = &self.inner.facts;
    let students = facts.list_students().await.map_err(EngineError::facts)?;
    let gradeables = facts.list_gradeables().await.map_err(EngineError::facts)?;
    let initial = facts.initial_late_days().await.map_err(EngineError::facts)?;
    let entries = self.inner.cache.entries().await.map_err(EngineError::cache)?;
    Ok(BulkSummary::build(initial, students, gradeables, entries))
  }

  // ── Status ────────────────────────────────────────────────────────────

  pub fn status(&self) -> RecomputeStatus { self.coordinator.status() }

  pub fn is_running(&self) -> bool { self.status().is_running() }

  pub fn subscribe_status(&self) -> tokio::sync::watch::Receiver<RecomputeStatus> {
    self.coordinator.subscribe()
  }

  // ── Invalidation ──────────────────────────────────────────────────────

  /// Apply the invalidation rules for `event`. Callers await this before
  /// considering their mutation complete. Returns the number of populated
  /// entries dropped.
  pub async fn notify_mutation(&self, event: &MutationEvent) -> Result<usize> {
    let plan = route(event);
    let cache = &self.inner.cache;
    let mut dropped = 0;

    if let Some(gradeable) = plan.restore {
      cache.restore_gradeable(gradeable).await.map_err(EngineError::cache)?;
    }
    if let Some(gradeable) = plan.remove {
      dropped += cache.remove_gradeable(gradeable).await.map_err(EngineError::cache)?;
    }

    let scope = match plan.scope {
      InvalidationScope::DefaultBalanceUsers => self.default_balance_users().await,
      other => other,
    };
    dropped += match &scope {
      InvalidationScope::All => cache.invalidate_all().await,
      scope => cache.invalidate(scope).await,
    }
    .map_err(EngineError::cache)?;

    debug!(event = event.as_ref(), ?scope, dropped, "invalidated late-day cache");
    Ok(dropped)
  }

  /// Students that take their balance from the course default for at least
  /// one gradeable: everyone without a grant, plus anyone whose first grant
  /// starts after the earliest due date.
  async fn default_balance_users(&self) -> InvalidationScope {
    let facts = &self.inner.facts;
    let resolved = async {
      let students = facts.list_students().await?;
      let granted = facts.students_with_grants().await?;
      let gradeables = facts.list_gradeables().await?;
      Ok::<_, F::Error>((students, granted, gradeables))
    }
    .await;

    let (students, granted, gradeables) = match resolved {
      Ok(parts) => parts,
      Err(e) => {
        warn!(error = %e, "cannot resolve default-balance students; invalidating everything");
        return InvalidationScope::All;
      }
    };

    let first_due = gradeables
      .iter()
      .filter(|g| g.tracks_late_days())
      .filter_map(|g| g.due_date)
      .min();
    let covered: BTreeSet<StudentId> = granted
      .into_iter()
      .filter(|(_, earliest)| first_due.is_none_or(|due| *earliest <= due))
      .map(|(s, _)| s)
      .collect();

    InvalidationScope::Students(
      students.into_iter().filter(|s| !covered.contains(s)).collect(),
    )
  }

  // ── Recompute ─────────────────────────────────────────────────────────

  /// Start a full pass, or join the one already running.
  ///
  /// Must be called from within a tokio runtime.
  pub fn trigger_recompute(&self) -> RecomputeJob {
    let inner = self.inner.clone();
    self.coordinator.start_or_join(move |progress| async move {
      inner.run(InvalidationScope::All, Some(progress)).await
    })
  }

  /// Run a full pass and wait for it. A request that finds a pass already
  /// running waits for that one and reports
  /// [`RecomputeOutcome::ConcurrentRecomputeRejected`].
  pub async fn recompute_all(&self) -> Result<RecomputeOutcome> {
    self.trigger_recompute().wait().await
  }

  /// Refresh only the pairs within `scope`, bypassing single-flight.
  pub async fn recompute(&self, scope: InvalidationScope) -> Result<RecomputeReport> {
    let scope = match scope {
      InvalidationScope::DefaultBalanceUsers => self.default_balance_users().await,
      other => other,
    };
    match self.inner.clone().run(scope, None).await {
      Ok(report) => Ok(Arc::unwrap_or_clone(report)),
      Err(message) => Err(EngineError::PassFailed(message)),
    }
  }
}

// ─── Pass ────────────────────────────────────────────────────────────────────

impl<F, C> Inner<F, C>
where
  F: FactSource + 'static,
  C: CacheStore + 'static,
{
  async fn run(self: Arc<Self>, scope: InvalidationScope, progress: Option<Progress>) -> PassResult {
    let pass_id = progress.as_ref().map_or_else(Uuid::new_v4, Progress::pass_id);
    let started_at = Utc::now();
    let mut report = RecomputeReport::new(pass_id, started_at);

    let (students, gradeables, initial) = self
      .roster()
      .await
      .map_err(|e| {
        warn!(%pass_id, error = %e, "recompute pass could not load the roster");
        e.to_string()
      })?;

    let students: Vec<StudentId> = students
      .into_iter()
      .filter(|s| {
        gradeables
          .iter()
          .any(|g| scope.contains(&CacheKey::new(s.clone(), g.id.clone())))
      })
      .collect();
    if let Some(p) = &progress {
      p.set_total(students.len());
    }
    info!(
      %pass_id,
      students = students.len(),
      gradeables = gradeables.len(),
      "recompute pass started"
    );

    let gradeables = Arc::new(gradeables);
    let scope = Arc::new(scope);
    let permits = Arc::new(Semaphore::new(self.config.max_concurrency.max(1)));
    let mut tasks = JoinSet::new();

    for student in students {
      let inner = self.clone();
      let gradeables = gradeables.clone();
      let scope = scope.clone();
      let permits = permits.clone();
      tasks.spawn(async move {
        let _permit = permits.acquire_owned().await;
        inner.refresh_student(student, &gradeables, &scope, initial).await
      });
    }

    while let Some(joined) = tasks.join_next().await {
      match joined {
        Ok(tally) => report.absorb(tally),
        Err(e) => warn!(%pass_id, error = %e, "student timeline task failed"),
      }
      if let Some(p) = &progress {
        p.advance();
      }
    }

    report.finished_at = Utc::now();
    info!(
      %pass_id,
      stored = report.stored,
      cleared = report.cleared,
      discarded = report.discarded,
      failed = report.failed(),
      "recompute pass finished"
    );
    Ok(Arc::new(report))
  }

  async fn roster(&self) -> std::result::Result<(Vec<StudentId>, Vec<Gradeable>, i32), F::Error> {
    let students = self.facts.list_students().await?;
    let gradeables = self.facts.list_gradeables().await?;
    let initial = self.facts.initial_late_days().await?;
    Ok((students, gradeables, initial))
  }

  /// Recompute one student's timeline and commit the pairs within `scope`.
  async fn refresh_student(
    &self,
    student: StudentId,
    gradeables: &[Gradeable],
    scope: &InvalidationScope,
    initial_late_days: i32,
  ) -> StudentTally {
    let mut tally = StudentTally::default();

    // Tickets first: anything invalidated from here on voids our commit.
    let mut tickets = Vec::new();
    for g in gradeables {
      let key = CacheKey::new(student.clone(), g.id.clone());
      if !scope.contains(&key) {
        continue;
      }
      match self.cache.begin(key.clone()).await {
        Ok(Some(ticket)) => tickets.push(ticket),
        Ok(None) => {}
        Err(e) => tally.diagnostics.push(PairDiagnostic {
          key,
          kind: DiagnosticKind::CacheUnavailable,
          message: e.to_string(),
        }),
      }
    }
    if tickets.is_empty() {
      return tally;
    }

    let horizon = gradeables
      .iter()
      .filter_map(|g| g.due_date)
      .max()
      .unwrap_or_else(Utc::now);
    let grants = match self.facts.grants_for_student(student.clone(), horizon).await {
      Ok(grants) => grants,
      Err(e) => {
        warn!(%student, error = %e, "grant ledger unavailable; student left absent");
        for ticket in tickets {
          let error = lateday_core::Error::FactSourceUnavailable(e.to_string());
          tally.diagnostics.push(PairDiagnostic::from_core(ticket.key.clone(), &error));
          self.clear(ticket, &mut tally).await;
        }
        return tally;
      }
    };

    let mut inputs = Vec::with_capacity(gradeables.len());
    for g in gradeables {
      inputs.push(PairInput { gradeable: g.clone(), ledgers: self.ledgers(&student, g).await });
    }

    for result in walk(&student, initial_late_days, &grants, inputs) {
      let Some(index) = tickets.iter().position(|t| t.key == result.key) else {
        continue;
      };
      let ticket = tickets.swap_remove(index);
      match result.result {
        Ok(computation) => self.commit(ticket, computation.into_entry(), &mut tally).await,
        Err(e) => {
          warn!(
            student = %result.key.student,
            gradeable = %result.key.gradeable,
            error = %e,
            "late-day pair left absent"
          );
          tally.diagnostics.push(PairDiagnostic::from_core(result.key, &e));
          self.clear(ticket, &mut tally).await;
        }
      }
    }

    tally
  }

  async fn ledgers(
    &self,
    student: &StudentId,
    gradeable: &Gradeable,
  ) -> lateday_core::Result<PairLedgers> {
    if !gradeable.tracks_late_days() {
      return Ok(PairLedgers::default());
    }
    let unavailable = |e: F::Error| lateday_core::Error::FactSourceUnavailable(e.to_string());
    let extension = self
      .facts
      .extension(student.clone(), gradeable.id.clone())
      .await
      .map_err(unavailable)?;
    let submission = self
      .facts
      .active_submission(student.clone(), gradeable.id.clone())
      .await
      .map_err(unavailable)?;
    Ok(PairLedgers { extension, submission })
  }

  async fn commit(&self, ticket: Ticket, entry: Option<CacheEntry>, tally: &mut StudentTally) {
    let key = ticket.key.clone();
    match self.cache.commit(ticket, entry).await {
      Ok(CommitOutcome::Stored) => tally.stored += 1,
      Ok(CommitOutcome::Cleared) => tally.cleared += 1,
      Ok(CommitOutcome::Discarded) => {
        debug!(student = %key.student, gradeable = %key.gradeable, "discarded commit for invalidated key");
        tally.discarded += 1;
      }
      Err(e) => tally.diagnostics.push(PairDiagnostic {
        key,
        kind: DiagnosticKind::CacheUnavailable,
        message: e.to_string(),
      }),
    }
  }

  /// Leave a failed pair absent. Already diagnosed, so not counted.
  async fn clear(&self, ticket: Ticket, tally: &mut StudentTally) {
    let key = ticket.key.clone();
    if let Err(e) = self.cache.commit(ticket, None).await {
      tally.diagnostics.push(PairDiagnostic {
        key,
        kind: DiagnosticKind::CacheUnavailable,
        message: e.to_string(),
      });
    }
  }
}
