//! Applying one contact change to every report that embeds the contact.
//!
//! Reports are drained from a shared queue by a small pool of workers, so at
//! most `max_workers` replaces are in flight at once. Each report is handled
//! independently: a replace that fails or panics is recorded and the rest
//! carry on.

use std::{
  collections::VecDeque,
  sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;
use tokio::task::JoinSet;
use tracing::{debug, error};
use vr_core::{RECORD_TYPE, contact::ContactChange, report::VisitReport, store::ReportStore};

/// Default upper bound on concurrent replaces for one contact change.
pub const DEFAULT_MAX_WORKERS: usize = 16;

/// Why a single replace did not go through.
#[derive(Debug, Error)]
pub enum ReplaceError<E> {
  #[error("{0}")]
  Store(E),
  /// The replace panicked or its worker stopped before reaching the report.
  #[error("replace aborted: {0}")]
  Aborted(String),
}

/// A report whose replace failed.
#[derive(Debug)]
pub struct ReplaceFailure<E> {
  pub report_id: String,
  pub error:     ReplaceError<E>,
}

/// Outcome of one fan-out.
#[derive(Debug)]
pub struct FanOutReport<E> {
  pub succeeded:       usize,
  pub failures:        Vec<ReplaceFailure<E>>,
  /// Workers that stopped outside a replace. Reports still queued at that
  /// point are recorded under `failures`.
  pub aborted_workers: usize,
}

impl<E> FanOutReport<E> {
  /// `true` when every report was replaced.
  pub fn is_complete(&self) -> bool {
    self.failures.is_empty() && self.aborted_workers == 0
  }
}

impl<E> Default for FanOutReport<E> {
  fn default() -> Self {
    Self { succeeded: 0, failures: Vec::new(), aborted_workers: 0 }
  }
}

pub struct FanOutUpdater<S> {
  store:       Arc<S>,
  max_workers: usize,
}

impl<S> Clone for FanOutUpdater<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), max_workers: self.max_workers }
  }
}

impl<S: ReportStore + 'static> FanOutUpdater<S> {
  pub fn new(store: Arc<S>) -> Self {
    Self { store, max_workers: DEFAULT_MAX_WORKERS }
  }

  /// Clamped to at least one worker.
  pub fn with_max_workers(mut self, max_workers: usize) -> Self {
    self.max_workers = max_workers.max(1);
    self
  }

  pub fn max_workers(&self) -> usize { self.max_workers }

  /// Overwrite the embedded contact of each report with `change` and replace
  /// it in the store. Returns once every report has been attempted.
  pub async fn apply(
    &self,
    reports: Vec<VisitReport>,
    change: &ContactChange,
  ) -> FanOutReport<S::Error> {
    let mut outcome = FanOutReport::default();
    if reports.is_empty() {
      return outcome;
    }

    let workers = self.max_workers.min(reports.len());
    let queue = Arc::new(Mutex::new(VecDeque::from(reports)));
    let change = Arc::new(change.clone());
    debug!(contact_id = %change.id, workers, "fanning out contact change");

    let mut set = JoinSet::new();
    for _ in 0..workers {
      let store = self.store.clone();
      let queue = queue.clone();
      let change = change.clone();
      set.spawn(async move { drain(store, queue, change).await });
    }

    while let Some(joined) = set.join_next().await {
      match joined {
        Ok(partial) => {
          outcome.succeeded += partial.succeeded;
          outcome.failures.extend(partial.failures);
        }
        Err(e) => {
          error!(contact_id = %change.id, error = %e, "fan-out worker aborted");
          outcome.aborted_workers += 1;
        }
      }
    }

    let stranded = std::mem::take(&mut *queue.lock().unwrap_or_else(PoisonError::into_inner));
    for report in stranded {
      error!(report_id = %report.id, contact_id = %change.id, "visit report never attempted");
      outcome.failures.push(ReplaceFailure {
        report_id: report.id,
        error:     ReplaceError::Aborted("no worker left to attempt it".into()),
      });
    }
    outcome
  }
}

/// One worker: take reports off the queue until it is empty. Each replace runs
/// in its own task so a panicking store call only costs that one report.
async fn drain<S: ReportStore + 'static>(
  store: Arc<S>,
  queue: Arc<Mutex<VecDeque<VisitReport>>>,
  change: Arc<ContactChange>,
) -> FanOutReport<S::Error> {
  let mut partial = FanOutReport::default();

  loop {
    let next = queue
      .lock()
      .unwrap_or_else(PoisonError::into_inner)
      .pop_front();
    let Some(mut report) = next else { break };

    change.apply_to(&mut report.contact);
    report.record_type = RECORD_TYPE.to_owned();

    let report_id = report.id.clone();
    let task = {
      let store = store.clone();
      tokio::spawn(async move { store.replace(RECORD_TYPE, &report.id, &report).await })
    };
    let result = match task.await {
      Ok(result) => result.map_err(ReplaceError::Store),
      Err(e) => Err(ReplaceError::Aborted(e.to_string())),
    };

    match result {
      Ok(()) => partial.succeeded += 1,
      Err(error) => {
        error!(
          %report_id,
          contact_id = %change.id,
          error = %error,
          "failed to replace visit report"
        );
        partial.failures.push(ReplaceFailure { report_id, error });
      }
    }
  }
  partial
}
