//! The visit report document and its projections.
//!
//! [`VisitReport`] is the full stored document, including the partition key.
//! Everything that leaves the service (HTTP responses, domain events) uses the
//! [`VisitReportView`] projection instead.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{Error, RECORD_TYPE, Result, contact::ContactSnapshot};

/// Maximum length of a report subject, in characters.
pub const MAX_SUBJECT_LEN: usize = 255;
/// Maximum length of free-text description and result fields, in characters.
pub const MAX_TEXT_LEN: usize = 500;

// ─── Stored document ─────────────────────────────────────────────────────────

/// A visit report as persisted in the document store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitReport {
  pub id:                           String,
  /// Partition discriminator; always [`RECORD_TYPE`] for persisted reports.
  #[serde(rename = "type")]
  pub record_type:                  String,
  #[serde(default)]
  pub detected_language:            String,
  pub subject:                      String,
  #[serde(default)]
  pub description:                  String,
  pub visit_date:                   String,
  #[serde(default)]
  pub result:                       String,
  #[serde(default)]
  pub visit_result_sentiment_score: f64,
  #[serde(default)]
  pub visit_result_key_phrases:     Vec<String>,
  pub contact:                      ContactSnapshot,
}

impl VisitReport {
  /// Build a fresh report from validated create input, assigning a new id and
  /// the fixed record type.
  pub fn from_new(input: NewVisitReport) -> Self {
    Self {
      id:                           Uuid::new_v4().to_string(),
      record_type:                  RECORD_TYPE.to_owned(),
      detected_language:            String::new(),
      subject:                      input.subject,
      description:                  input.description,
      visit_date:                   input.visit_date,
      result:                       String::new(),
      visit_result_sentiment_score: 0.0,
      visit_result_key_phrases:     Vec::new(),
      contact:                      input.contact,
    }
  }

  /// Overlay the mutable fields of `update`. The embedded contact is replaced
  /// as a whole; `id` and `record_type` are kept.
  pub fn apply_update(&mut self, update: VisitReportUpdate) {
    self.subject     = update.subject;
    self.description = update.description;
    self.result      = update.result;
    self.visit_date  = update.visit_date;
    self.contact     = update.contact;
  }

  /// The externally visible projection of this report.
  pub fn view(&self) -> VisitReportView {
    VisitReportView {
      id:                           self.id.clone(),
      subject:                      self.subject.clone(),
      description:                  self.description.clone(),
      visit_date:                   self.visit_date.clone(),
      result:                       self.result.clone(),
      visit_result_sentiment_score: self.visit_result_sentiment_score,
      visit_result_key_phrases:     self.visit_result_key_phrases.clone(),
      contact:                      self.contact.clone(),
    }
  }

  pub fn list_item(&self) -> VisitReportListItem {
    VisitReportListItem {
      id:          self.id.clone(),
      record_type: self.record_type.clone(),
      subject:     self.subject.clone(),
      visit_date:  self.visit_date.clone(),
      contact:     self.contact.clone(),
    }
  }
}

// ─── Projections ─────────────────────────────────────────────────────────────

/// The readable projection of a report: every field except the partition key
/// and internal enrichment state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitReportView {
  pub id:                           String,
  pub subject:                      String,
  pub description:                  String,
  pub visit_date:                   String,
  pub result:                       String,
  pub visit_result_sentiment_score: f64,
  pub visit_result_key_phrases:     Vec<String>,
  pub contact:                      ContactSnapshot,
}

/// Compact row returned by the list endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitReportListItem {
  pub id:          String,
  #[serde(rename = "type")]
  pub record_type: String,
  pub subject:     String,
  pub visit_date:  String,
  pub contact:     ContactSnapshot,
}

// ─── Inputs ──────────────────────────────────────────────────────────────────

/// Body accepted when creating a report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewVisitReport {
  pub subject:     String,
  #[serde(default)]
  pub description: String,
  pub visit_date:  String,
  pub contact:     ContactSnapshot,
}

impl NewVisitReport {
  pub fn validate(&self) -> Result<()> {
    validate_common(&self.subject, &self.description, &self.visit_date, &self.contact)
  }
}

/// Body accepted when updating a report.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VisitReportUpdate {
  /// Optional echo of the path id; must match it when present.
  #[serde(default)]
  pub id:          Option<String>,
  pub subject:     String,
  #[serde(default)]
  pub description: String,
  #[serde(default)]
  pub result:      String,
  pub visit_date:  String,
  pub contact:     ContactSnapshot,
}

impl VisitReportUpdate {
  /// Validate the update against the id of the report it targets.
  pub fn validate(&self, report_id: &str) -> Result<()> {
    if let Some(id) = &self.id
      && id != report_id
    {
      return Err(Error::Validation(format!(
        "body id {id:?} does not match report {report_id:?}"
      )));
    }
    validate_common(&self.subject, &self.description, &self.visit_date, &self.contact)?;
    check_len("result", &self.result, MAX_TEXT_LEN)
  }
}

fn validate_common(
  subject:     &str,
  description: &str,
  visit_date:  &str,
  contact:     &ContactSnapshot,
) -> Result<()> {
  if subject.trim().is_empty() {
    return Err(Error::Validation("subject is required".into()));
  }
  check_len("subject", subject, MAX_SUBJECT_LEN)?;
  check_len("description", description, MAX_TEXT_LEN)?;
  if visit_date.trim().is_empty() {
    return Err(Error::Validation("visitDate is required".into()));
  }
  if contact.id.trim().is_empty() {
    return Err(Error::Validation("contact.id is required".into()));
  }
  Ok(())
}

fn check_len(field: &str, value: &str, max: usize) -> Result<()> {
  if value.chars().count() > max {
    return Err(Error::Validation(format!(
      "{field} must be at most {max} characters"
    )));
  }
  Ok(())
}
