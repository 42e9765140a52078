//! Create, update and delete of visit reports.
//!
//! A successful create or update is followed by a domain event. Publishing
//! is best-effort: the write has already happened, so a failed publish is
//! logged and the mutation still succeeds.

use std::sync::Arc;

use tracing::{info, warn};
use vr_core::{
  RECORD_TYPE,
  event::DomainEvent,
  report::{NewVisitReport, VisitReport, VisitReportUpdate, VisitReportView},
  store::ReportStore,
  transport::Topic,
};

use crate::{EventPublisher, MutationError};

pub struct ReportMutations<S, T> {
  store:     Arc<S>,
  publisher: Arc<EventPublisher<T>>,
}

impl<S, T> Clone for ReportMutations<S, T> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), publisher: self.publisher.clone() }
  }
}

impl<S: ReportStore, T: Topic> ReportMutations<S, T> {
  pub fn new(store: Arc<S>, publisher: Arc<EventPublisher<T>>) -> Self {
    Self { store, publisher }
  }

  pub fn store(&self) -> &Arc<S> { &self.store }

  pub fn publisher(&self) -> &Arc<EventPublisher<T>> { &self.publisher }

  /// Validate and persist a new report, then announce it.
  pub async fn create(&self, input: NewVisitReport) -> Result<VisitReportView, MutationError> {
    input.validate()?;

    let report = VisitReport::from_new(input);
    self
      .store
      .create(RECORD_TYPE, &report)
      .await
      .map_err(MutationError::store)?;

    // Re-read so the event and the response carry what was actually stored.
    let stored = self
      .store
      .get(RECORD_TYPE, &report.id)
      .await
      .map_err(MutationError::store)?
      .ok_or_else(|| MutationError::NotFound(report.id.clone()))?;

    info!(id = %stored.id, contact_id = %stored.contact.id, "visit report created");
    self.notify(DomainEvent::created(&stored)).await;
    Ok(stored.view())
  }

  /// Overlay `input` onto report `id`, replace it, then announce it.
  pub async fn update(
    &self,
    id: &str,
    input: VisitReportUpdate,
  ) -> Result<VisitReportView, MutationError> {
    input.validate(id)?;

    let mut report = self
      .store
      .get(RECORD_TYPE, id)
      .await
      .map_err(MutationError::store)?
      .ok_or_else(|| MutationError::NotFound(id.to_owned()))?;

    report.apply_update(input);
    self
      .store
      .replace(RECORD_TYPE, id, &report)
      .await
      .map_err(MutationError::store)?;

    info!(id, contact_id = %report.contact.id, "visit report updated");
    self.notify(DomainEvent::updated(&report)).await;
    Ok(report.view())
  }

  /// Hard-delete report `id`. No event is published.
  pub async fn delete(&self, id: &str) -> Result<(), MutationError> {
    let removed = self
      .store
      .delete(RECORD_TYPE, id)
      .await
      .map_err(MutationError::store)?;
    if !removed {
      return Err(MutationError::NotFound(id.to_owned()));
    }
    info!(id, "visit report deleted");
    Ok(())
  }

  async fn notify(&self, event: DomainEvent) {
    if let Err(e) = self.publisher.publish(&event).await {
      warn!(
        report_id = %event.report.id,
        event_type = ?event.event_type,
        error = %e,
        "failed to publish domain event"
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use vr_core::{
    contact::ContactSnapshot,
    event::{EVENT_VERSION, EventType},
  };

  use super::*;
  use crate::testing::{FlakyStore, RecordingTopic, report};

  type Mutations = ReportMutations<FlakyStore, RecordingTopic>;

  async fn setup() -> (Mutations, Arc<FlakyStore>) {
    let store = Arc::new(FlakyStore::new().await);
    let publisher = Arc::new(EventPublisher::new(RecordingTopic::default()));
    (ReportMutations::new(store.clone(), publisher), store)
  }

  fn events(m: &Mutations) -> Vec<DomainEvent> {
    m.publisher()
      .topic()
      .sent()
      .iter()
      .map(|msg| serde_json::from_slice(&msg.body).unwrap())
      .collect()
  }

  fn q1_review() -> NewVisitReport {
    NewVisitReport {
      subject:     "Q1 review".into(),
      description: String::new(),
      visit_date:  "2024-03-01".into(),
      contact:     ContactSnapshot { firstname: "Ann".into(), ..ContactSnapshot::with_id("c1") },
    }
  }

  fn update_for(id: &str, result: &str) -> VisitReportUpdate {
    VisitReportUpdate {
      id:          Some(id.into()),
      subject:     format!("Visit {id}"),
      description: String::new(),
      result:      result.into(),
      visit_date:  "2024-03-01".into(),
      contact:     ContactSnapshot::with_id("c1"),
    }
  }

  #[tokio::test]
  async fn create_persists_and_publishes_once() {
    let (m, store) = setup().await;

    let view = m.create(q1_review()).await.unwrap();

    assert_eq!(view.subject, "Q1 review");
    assert_eq!(view.contact.firstname, "Ann");
    let stored = store.inner().get(RECORD_TYPE, &view.id).await.unwrap().unwrap();
    assert_eq!(stored.record_type, RECORD_TYPE);

    let events = events(&m);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::VisitReportCreatedEvent);
    assert_eq!(events[0].version, EVENT_VERSION);
    assert_eq!(events[0].report, view);
  }

  #[tokio::test]
  async fn invalid_create_touches_nothing() {
    let (m, store) = setup().await;
    let mut input = q1_review();
    input.subject.clear();

    let err = m.create(input).await.unwrap_err();

    assert!(matches!(err, MutationError::Validation(_)));
    assert_eq!(store.calls(), 0);
    assert!(events(&m).is_empty());
  }

  #[tokio::test]
  async fn update_overlays_and_publishes() {
    let (m, store) = setup().await;
    store.seed(&report("r1", "c1")).await;

    let view = m.update("r1", update_for("r1", "Order placed")).await.unwrap();

    assert_eq!(view.result, "Order placed");
    let stored = store.inner().get(RECORD_TYPE, "r1").await.unwrap().unwrap();
    assert_eq!(stored.result, "Order placed");

    let events = events(&m);
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].event_type, EventType::VisitReportUpdatedEvent);
    assert_eq!(events[0].report.result, "Order placed");
  }

  #[tokio::test]
  async fn update_succeeds_when_publish_fails() {
    let (m, store) = setup().await;
    store.seed(&report("r1", "c1")).await;
    m.publisher().topic().fail_sends(true);

    let view = m.update("r1", update_for("r1", "Signed")).await.unwrap();

    assert_eq!(view.result, "Signed");
    let stored = store.inner().get(RECORD_TYPE, "r1").await.unwrap().unwrap();
    assert_eq!(stored.result, "Signed");
    assert!(events(&m).is_empty());
  }

  #[tokio::test]
  async fn update_missing_is_not_found() {
    let (m, _store) = setup().await;
    let err = m.update("r9", update_for("r9", "x")).await.unwrap_err();
    assert!(matches!(err, MutationError::NotFound(id) if id == "r9"));
    assert!(events(&m).is_empty());
  }

  #[tokio::test]
  async fn update_with_mismatched_body_id_is_rejected() {
    let (m, store) = setup().await;
    store.seed(&report("r1", "c1")).await;

    let err = m.update("r1", update_for("r2", "x")).await.unwrap_err();

    assert!(matches!(err, MutationError::Validation(_)));
    assert_eq!(store.calls(), 0);
  }

  #[tokio::test]
  async fn delete_removes_without_event() {
    let (m, store) = setup().await;
    store.seed(&report("r1", "c1")).await;

    m.delete("r1").await.unwrap();

    assert!(store.inner().get(RECORD_TYPE, "r1").await.unwrap().is_none());
    assert!(events(&m).is_empty());
    assert!(matches!(m.delete("r1").await, Err(MutationError::NotFound(_))));
  }
}
