//! [`SqliteStore`]: the SQLite implementation of [`ReportStore`].

use std::path::Path;

use rusqlite::OptionalExtension as _;
use tracing::debug;

use vr_core::{
  report::VisitReport,
  stats::{ContactStats, OverallStats, TimelineEntry},
  store::ReportStore,
};

use crate::{
  Error, Result,
  encode::{RawStats, check_identity, decode_report, decode_reports, encode_report},
  schema::SCHEMA,
};

/// Filter shared by every aggregate: only reports with a recorded result.
const SCORED: &str = "partition = ?1 AND COALESCE(json_extract(body, '$.result'), '') != ''";

// ─── Store ───────────────────────────────────────────────────────────────────

/// A visit report document store backed by a single SQLite file.
///
/// Cloning is cheap: the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store: useful for testing.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
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

  /// Run a query returning one JSON body per row.
  async fn query_bodies(
    &self,
    sql: &'static str,
    partition: String,
    filter: Option<String>,
  ) -> Result<Vec<String>> {
    let bodies = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(sql)?;
        let rows = match filter {
          Some(f) => stmt
            .query_map(rusqlite::params![partition, f], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?,
          None => stmt
            .query_map(rusqlite::params![partition], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?,
        };
        Ok(rows)
      })
      .await?;
    Ok(bodies)
  }

  /// Run a sentiment aggregate query returning [`RawStats`] rows.
  async fn query_stats(
    &self,
    sql: String,
    partition: String,
    contact_id: Option<String>,
  ) -> Result<Vec<RawStats>> {
    let rows = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let map = |row: &rusqlite::Row<'_>| {
          Ok(RawStats {
            contact_id: row.get(0)?,
            count:      row.get(1)?,
            min:        row.get(2)?,
            max:        row.get(3)?,
            avg:        row.get(4)?,
          })
        };
        let rows = match contact_id {
          Some(c) => stmt
            .query_map(rusqlite::params![partition, c], map)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
          None => stmt
            .query_map(rusqlite::params![partition], map)?
            .collect::<rusqlite::Result<Vec<_>>>()?,
        };
        Ok(rows)
      })
      .await?;
    Ok(rows)
  }
}

// ─── ReportStore impl ────────────────────────────────────────────────────────

impl ReportStore for SqliteStore {
  type Error = Error;

  // ── Single documents ──────────────────────────────────────────────────────

  async fn get(&self, partition: &str, id: &str) -> Result<Option<VisitReport>> {
    let partition_str = partition.to_owned();
    let id_str        = id.to_owned();

    let body: Option<String> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT body FROM documents WHERE partition = ?1 AND id = ?2",
            rusqlite::params![partition_str, id_str],
            |row| row.get(0),
          )
          .optional()?)
      })
      .await?;

    body.as_deref().map(decode_report).transpose()
  }

  async fn create(&self, partition: &str, report: &VisitReport) -> Result<()> {
    check_identity(partition, None, report)?;

    let partition_str = partition.to_owned();
    let id_str        = report.id.clone();
    let body          = encode_report(report)?;

    let inserted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "INSERT OR IGNORE INTO documents (partition, id, body) VALUES (?1, ?2, ?3)",
          rusqlite::params![partition_str, id_str, body],
        )?)
      })
      .await?;

    if inserted == 0 {
      return Err(Error::AlreadyExists {
        partition: partition.to_owned(),
        id:        report.id.clone(),
      });
    }
    debug!(partition, id = %report.id, "created document");
    Ok(())
  }

  async fn replace(&self, partition: &str, id: &str, report: &VisitReport) -> Result<()> {
    check_identity(partition, Some(id), report)?;

    let partition_str = partition.to_owned();
    let id_str        = id.to_owned();
    let body          = encode_report(report)?;

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE documents SET body = ?3 WHERE partition = ?1 AND id = ?2",
          rusqlite::params![partition_str, id_str, body],
        )?)
      })
      .await?;

    if updated == 0 {
      return Err(Error::NotFound {
        partition: partition.to_owned(),
        id:        id.to_owned(),
      });
    }
    debug!(partition, id, "replaced document");
    Ok(())
  }

  async fn delete(&self, partition: &str, id: &str) -> Result<bool> {
    let partition_str = partition.to_owned();
    let id_str        = id.to_owned();

    let deleted = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "DELETE FROM documents WHERE partition = ?1 AND id = ?2",
          rusqlite::params![partition_str, id_str],
        )?)
      })
      .await?;

    Ok(deleted > 0)
  }

  // ── Queries ───────────────────────────────────────────────────────────────

  async fn list(&self, partition: &str) -> Result<Vec<VisitReport>> {
    let bodies = self
      .query_bodies(
        "SELECT body FROM documents WHERE partition = ?1 ORDER BY rowid",
        partition.to_owned(),
        None,
      )
      .await?;
    decode_reports(bodies)
  }

  async fn query_by_contact_id(
    &self,
    partition:  &str,
    contact_id: &str,
  ) -> Result<Vec<VisitReport>> {
    let bodies = self
      .query_bodies(
        "SELECT body FROM documents
         WHERE partition = ?1 AND json_extract(body, '$.contact.id') = ?2
         ORDER BY rowid",
        partition.to_owned(),
        Some(contact_id.to_owned()),
      )
      .await?;
    decode_reports(bodies)
  }

  // ── Aggregates ────────────────────────────────────────────────────────────

  async fn stats_overall(&self, partition: &str) -> Result<Option<OverallStats>> {
    let sql = format!(
      "SELECT NULL, COUNT(1),
              MIN(CAST(json_extract(body, '$.visitResultSentimentScore') AS REAL)),
              MAX(CAST(json_extract(body, '$.visitResultSentimentScore') AS REAL)),
              AVG(CAST(json_extract(body, '$.visitResultSentimentScore') AS REAL))
       FROM documents
       WHERE {SCORED}"
    );
    let rows = self.query_stats(sql, partition.to_owned(), None).await?;

    // An aggregate without GROUP BY always yields one row; zero count means
    // nothing has been scored yet.
    Ok(rows.into_iter().find(|r| r.count > 0).map(|r| OverallStats {
      count_score: r.count as f64,
      min_score:   r.min.unwrap_or_default(),
      max_score:   r.max.unwrap_or_default(),
      avg_score:   r.avg.unwrap_or_default(),
    }))
  }

  async fn stats_by_contact(
    &self,
    partition:  &str,
    contact_id: &str,
  ) -> Result<Vec<ContactStats>> {
    let sql = format!(
      "SELECT json_extract(body, '$.contact.id') AS contact_id, COUNT(1),
              MIN(CAST(json_extract(body, '$.visitResultSentimentScore') AS REAL)),
              MAX(CAST(json_extract(body, '$.visitResultSentimentScore') AS REAL)),
              AVG(CAST(json_extract(body, '$.visitResultSentimentScore') AS REAL))
       FROM documents
       WHERE {SCORED} AND json_extract(body, '$.contact.id') = ?2
       GROUP BY contact_id"
    );
    let rows = self
      .query_stats(sql, partition.to_owned(), Some(contact_id.to_owned()))
      .await?;

    Ok(
      rows
        .into_iter()
        .map(|r| ContactStats {
          id:          r.contact_id.unwrap_or_default(),
          count_score: r.count as f64,
          min_score:   r.min.unwrap_or_default(),
          max_score:   r.max.unwrap_or_default(),
          avg_score:   r.avg.unwrap_or_default(),
        })
        .collect(),
    )
  }

  async fn timeline(&self, partition: &str) -> Result<Vec<TimelineEntry>> {
    let sql = format!(
      "SELECT json_extract(body, '$.visitDate') AS visit_date, COUNT(1)
       FROM documents
       WHERE {SCORED}
       GROUP BY visit_date
       ORDER BY visit_date"
    );
    let partition_str = partition.to_owned();

    let entries = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(rusqlite::params![partition_str], |row| {
            Ok(TimelineEntry {
              visit_date: row.get::<_, Option<String>>(0)?.unwrap_or_default(),
              visits:     row.get(1)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    Ok(entries)
  }
}
