//! Aggregates over reports that have a recorded result.

use serde::{Deserialize, Serialize};

/// Sentiment statistics across every scored report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OverallStats {
  pub count_score: f64,
  pub min_score:   f64,
  pub max_score:   f64,
  pub avg_score:   f64,
}

/// Sentiment statistics for the reports of one contact.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactStats {
  /// The contact id.
  pub id:          String,
  pub count_score: f64,
  pub min_score:   f64,
  pub max_score:   f64,
  pub avg_score:   f64,
}

/// Number of scored visits on a given visit date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry {
  pub visit_date: String,
  pub visits:     i64,
}
