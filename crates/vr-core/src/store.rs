//! The `ReportStore` trait: the gateway to the document store.
//!
//! The trait is implemented by storage backends (e.g. `vr-store-sqlite`).
//! Higher layers (`vr-sync`, `vr-api`) depend on this abstraction, not on any
//! concrete backend.

use std::future::Future;

use crate::{
  report::VisitReport,
  stats::{ContactStats, OverallStats, TimelineEntry},
};

/// Abstraction over the visit report document store.
///
/// Every call is scoped by a partition key. For visit reports that is always
/// [`RECORD_TYPE`](crate::RECORD_TYPE); backends reject documents whose `type`
/// does not match the partition they are written to.
///
/// Writes are whole-document: there is no patch operation and no concurrency
/// token, so the last replace wins.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait ReportStore: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  // ── Single documents ──────────────────────────────────────────────────

  /// Fetch a report by id. Returns `None` if not found.
  fn get<'a>(
    &'a self,
    partition: &'a str,
    id: &'a str,
  ) -> impl Future<Output = Result<Option<VisitReport>, Self::Error>> + Send + 'a;

  /// Persist a new report. Fails if a report with the same id already exists
  /// in the partition.
  fn create<'a>(
    &'a self,
    partition: &'a str,
    report: &'a VisitReport,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Replace the stored document `id` with `report`. Fails if no such
  /// document exists or if `report.id != id`.
  fn replace<'a>(
    &'a self,
    partition: &'a str,
    id: &'a str,
    report: &'a VisitReport,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;

  /// Hard-delete a report. Returns `false` if nothing was removed.
  fn delete<'a>(
    &'a self,
    partition: &'a str,
    id: &'a str,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + 'a;

  // ── Queries ───────────────────────────────────────────────────────────

  /// All reports in the partition.
  fn list<'a>(
    &'a self,
    partition: &'a str,
  ) -> impl Future<Output = Result<Vec<VisitReport>, Self::Error>> + Send + 'a;

  /// All reports whose embedded `contact.id` equals `contact_id`.
  fn query_by_contact_id<'a>(
    &'a self,
    partition: &'a str,
    contact_id: &'a str,
  ) -> impl Future<Output = Result<Vec<VisitReport>, Self::Error>> + Send + 'a;

  // ── Aggregates (reports with a non-empty result only) ─────────────────

  /// Sentiment statistics over the whole partition; `None` when no report
  /// has a result yet.
  fn stats_overall<'a>(
    &'a self,
    partition: &'a str,
  ) -> impl Future<Output = Result<Option<OverallStats>, Self::Error>> + Send + 'a;

  /// Sentiment statistics for one contact. Empty when the contact has no
  /// scored reports.
  fn stats_by_contact<'a>(
    &'a self,
    partition: &'a str,
    contact_id: &'a str,
  ) -> impl Future<Output = Result<Vec<ContactStats>, Self::Error>> + Send + 'a;

  /// Scored visits per visit date, ascending by date.
  fn timeline<'a>(
    &'a self,
    partition: &'a str,
  ) -> impl Future<Output = Result<Vec<TimelineEntry>, Self::Error>> + Send + 'a;
}
