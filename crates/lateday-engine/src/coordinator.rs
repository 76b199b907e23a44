//! Single-flight coordination of bulk recompute passes.
//!
//! At most one full pass runs at a time. A request made while a pass is in
//! flight joins it and receives that pass's report instead of starting
//! another. Passes run on their own tokio task, so dropping the future of
//! whoever started a pass never strands the callers that joined it.
//!
//! The Idle/Running state is published on a [`watch`] channel and can be
//! queried at any time, independently of any job handle.

use std::{
  future::Future,
  sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{EngineError, error::Result, report::RecomputeReport};

/// A finished pass: its report, or why it could not run.
pub(crate) type PassResult = std::result::Result<Arc<RecomputeReport>, String>;

// ─── Status ──────────────────────────────────────────────────────────────────

/// Externally visible state of the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RecomputeStatus {
  Idle,
  Running {
    pass_id:   Uuid,
    /// Student timelines finished so far.
    completed: usize,
    /// Student timelines in the pass; zero until the roster is loaded.
    total:     usize,
  },
}

impl RecomputeStatus {
  pub fn is_running(&self) -> bool { matches!(self, Self::Running { .. }) }
}

/// How a `recompute_all` request was served.
#[derive(Debug, Clone)]
pub enum RecomputeOutcome {
  /// This request started the pass.
  Ran(Arc<RecomputeReport>),
  /// A pass was already running; this request waited for it instead.
  ConcurrentRecomputeRejected(Arc<RecomputeReport>),
}

impl RecomputeOutcome {
  pub fn report(&self) -> &Arc<RecomputeReport> {
    match self {
      Self::Ran(r) | Self::ConcurrentRecomputeRejected(r) => r,
    }
  }
}

// ─── Job handle ──────────────────────────────────────────────────────────────

/// Handle to a started or joined pass.
#[derive(Debug)]
pub struct RecomputeJob {
  pass_id: Uuid,
  joined:  bool,
  result:  watch::Receiver<Option<PassResult>>,
  status:  watch::Receiver<RecomputeStatus>,
}

impl RecomputeJob {
  pub fn pass_id(&self) -> Uuid { self.pass_id }

  /// `true` if the pass was already running when this job was requested.
  pub fn joined(&self) -> bool { self.joined }

  /// Current coordinator status.
  pub fn status(&self) -> RecomputeStatus { *self.status.borrow() }

  /// Wait for the pass to finish.
  pub async fn wait(mut self) -> Result<RecomputeOutcome> {
    let finished = {
      let value = self
        .result
        .wait_for(Option::is_some)
        .await
        .map_err(|_| EngineError::RecomputeAborted)?;
      value.clone()
    };

    let report = match finished {
      Some(Ok(report)) => report,
      Some(Err(message)) => return Err(EngineError::PassFailed(message)),
      None => return Err(EngineError::RecomputeAborted),
    };

    Ok(if self.joined {
      RecomputeOutcome::ConcurrentRecomputeRejected(report)
    } else {
      RecomputeOutcome::Ran(report)
    })
  }
}

// ─── Coordinator ─────────────────────────────────────────────────────────────

#[derive(Debug)]
struct InFlight {
  pass_id: Uuid,
  result:  watch::Receiver<Option<PassResult>>,
}

#[derive(Debug)]
pub(crate) struct Coordinator {
  status: watch::Sender<RecomputeStatus>,
  flight: Mutex<Option<InFlight>>,
}

impl Coordinator {
  pub(crate) fn new() -> Self {
    let (status, _) = watch::channel(RecomputeStatus::Idle);
    Self { status, flight: Mutex::new(None) }
  }

  fn flight(&self) -> MutexGuard<'_, Option<InFlight>> {
    self.flight.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub(crate) fn status(&self) -> RecomputeStatus { *self.status.borrow() }

  pub(crate) fn subscribe(&self) -> watch::Receiver<RecomputeStatus> {
    self.status.subscribe()
  }

  /// Join the running pass, or spawn `pass` as a new one.
  ///
  /// Must be called from within a tokio runtime.
  pub(crate) fn start_or_join<P, Fut>(self: &Arc<Self>, pass: P) -> RecomputeJob
  where
    P: FnOnce(Progress) -> Fut,
    Fut: Future<Output = PassResult> + Send + 'static,
  {
    let mut flight = self.flight();
    if let Some(running) = flight.as_ref() {
      tracing::debug!(pass_id = %running.pass_id, "joining in-flight recompute");
      return RecomputeJob {
        pass_id: running.pass_id,
        joined:  true,
        result:  running.result.clone(),
        status:  self.subscribe(),
      };
    }

    let pass_id = Uuid::new_v4();
    let (tx, rx) = watch::channel(None);
    *flight = Some(InFlight { pass_id, result: rx.clone() });
    self.status.send_replace(RecomputeStatus::Running { pass_id, completed: 0, total: 0 });
    drop(flight);

    let guard = FlightGuard { coordinator: self.clone() };
    let work = pass(Progress { coordinator: self.clone(), pass_id });
    tokio::spawn(async move {
      let result = work.await;
      // Back to Idle before the result is visible, so anyone reacting to the
      // result and asking again starts a fresh pass.
      drop(guard);
      tx.send_replace(Some(result));
    });

    RecomputeJob { pass_id, joined: false, result: rx, status: self.subscribe() }
  }
}

/// Releases the single-flight slot when the pass ends, including by panic.
struct FlightGuard {
  coordinator: Arc<Coordinator>,
}

impl Drop for FlightGuard {
  fn drop(&mut self) {
    self.coordinator.flight().take();
    self.coordinator.status.send_replace(RecomputeStatus::Idle);
  }
}

/// Progress reporting for a running pass.
#[derive(Debug, Clone)]
pub(crate) struct Progress {
  coordinator: Arc<Coordinator>,
  pass_id:     Uuid,
}

impl Progress {
  pub(crate) fn pass_id(&self) -> Uuid { self.pass_id }

  pub(crate) fn set_total(&self, n: usize) {
    let pass_id = self.pass_id;
    self.coordinator.status.send_modify(|status| {
      if let RecomputeStatus::Running { pass_id: p, total, .. } = status
        && *p == pass_id
      {
        *total = n;
      }
    });
  }

  pub(crate) fn advance(&self) {
    let pass_id = self.pass_id;
    self.coordinator.status.send_modify(|status| {
      if let RecomputeStatus::Running { pass_id: p, completed, .. } = status
        && *p == pass_id
      {
        *completed += 1;
      }
    });
  }
}
