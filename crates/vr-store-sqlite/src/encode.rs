//! Encoding and decoding helpers between visit reports and the JSON text
//! stored in the `documents.body` column.

use vr_core::report::VisitReport;

use crate::{Error, Result};

pub fn encode_report(report: &VisitReport) -> Result<String> {
  Ok(serde_json::to_string(report)?)
}

pub fn decode_report(body: &str) -> Result<VisitReport> {
  Ok(serde_json::from_str(body)?)
}

pub fn decode_reports(bodies: Vec<String>) -> Result<Vec<VisitReport>> {
  bodies.iter().map(|b| decode_report(b)).collect()
}

/// Reject a document whose identity does not match where it is being written.
pub fn check_identity(
  partition: &str,
  id:        Option<&str>,
  report:    &VisitReport,
) -> Result<()> {
  if report.record_type != partition {
    return Err(Error::PartitionMismatch {
      expected: partition.to_owned(),
      found:    report.record_type.clone(),
    });
  }
  if let Some(id) = id
    && report.id != id
  {
    return Err(Error::IdMismatch {
      expected: id.to_owned(),
      found:    report.id.clone(),
    });
  }
  Ok(())
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw aggregate columns for a sentiment statistics row.
pub struct RawStats {
  pub contact_id: Option<String>,
  pub count:      i64,
  pub min:        Option<f64>,
  pub max:        Option<f64>,
  pub avg:        Option<f64>,
}
