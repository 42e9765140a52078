//! Outbound domain events describing visit report changes.

use serde::{Deserialize, Serialize};

use crate::report::{VisitReport, VisitReportView};

/// Schema tag carried by every event this service emits.
pub const EVENT_VERSION: &str = "1";

/// Discriminant of a [`DomainEvent`]; serialised verbatim as `eventType`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
  VisitReportCreatedEvent,
  VisitReportUpdatedEvent,
}

/// A versioned event carrying the full readable state of a report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainEvent {
  pub event_type: EventType,
  pub version:    String,
  #[serde(flatten)]
  pub report:     VisitReportView,
}

impl DomainEvent {
  pub fn created(report: &VisitReport) -> Self {
    Self::new(EventType::VisitReportCreatedEvent, report)
  }

  pub fn updated(report: &VisitReport) -> Self {
    Self::new(EventType::VisitReportUpdatedEvent, report)
  }

  fn new(event_type: EventType, report: &VisitReport) -> Self {
    Self {
      event_type,
      version: EVENT_VERSION.to_owned(),
      report: report.view(),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{RECORD_TYPE, contact::ContactSnapshot};

  fn report() -> VisitReport {
    VisitReport {
      id:                           "r1".into(),
      record_type:                  RECORD_TYPE.into(),
      detected_language:            "en".into(),
      subject:                      "Q1 review".into(),
      description:                  "Check-in".into(),
      visit_date:                   "2024-03-01".into(),
      result:                       "Signed".into(),
      visit_result_sentiment_score: 0.75,
      visit_result_key_phrases:     vec!["contract".into()],
      contact:                      ContactSnapshot {
        id:              "c1".into(),
        firstname:       "Ann".into(),
        lastname:        "Lee".into(),
        avatar_location: "a.png".into(),
        company:         "Acme".into(),
      },
    }
  }

  #[test]
  fn wire_shape_is_flat() {
    let json = serde_json::to_value(DomainEvent::created(&report())).unwrap();
    assert_eq!(json["eventType"], "VisitReportCreatedEvent");
    assert_eq!(json["version"], "1");
    assert_eq!(json["id"], "r1");
    assert_eq!(json["result"], "Signed");
    assert_eq!(json["visitResultSentimentScore"], 0.75);
    assert_eq!(json["visitResultKeyPhrases"][0], "contract");
    assert_eq!(json["contact"]["avatarLocation"], "a.png");
    assert!(json.get("type").is_none());
  }

  #[test]
  fn updated_event_type() {
    let event = DomainEvent::updated(&report());
    assert_eq!(event.event_type, EventType::VisitReportUpdatedEvent);
    assert_eq!(event.version, EVENT_VERSION);
  }
}
