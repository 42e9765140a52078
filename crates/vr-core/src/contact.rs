//! Contact data as seen from the visit report side.
//!
//! Contacts are owned by another service. A visit report only carries a
//! denormalised [`ContactSnapshot`], which is kept eventually consistent by
//! applying inbound [`ContactChange`] notifications.

use serde::{Deserialize, Deserializer, Serialize};

use crate::{Error, Result};

// ─── Snapshot ────────────────────────────────────────────────────────────────

/// The copy of a contact embedded in a visit report.
///
/// `id` is the foreign key to the contact service and never changes once the
/// report is created. The remaining fields are free text and are overwritten
/// wholesale whenever the contact changes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactSnapshot {
  pub id:              String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub firstname:       String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub lastname:        String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub avatar_location: String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub company:         String,
}

impl ContactSnapshot {
  /// A snapshot carrying only the contact id.
  pub fn with_id(id: impl Into<String>) -> Self {
    Self { id: id.into(), ..Self::default() }
  }
}

// ─── Change notification ─────────────────────────────────────────────────────

/// Inbound notification that a contact changed, carrying its full current
/// state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContactChange {
  pub id:              String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub firstname:       String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub lastname:        String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub avatar_location: String,
  #[serde(default, deserialize_with = "null_as_empty")]
  pub company:         String,
}

impl ContactChange {
  /// Decode a raw message payload.
  ///
  /// The payload must be a JSON object with a non-empty `id`; the descriptive
  /// fields default to empty strings when absent or `null`.
  pub fn decode(payload: &[u8]) -> Result<Self> {
    let change: Self = serde_json::from_slice(payload)?;
    if change.id.trim().is_empty() {
      return Err(Error::MissingContactId);
    }
    Ok(change)
  }

  /// Overwrite the descriptive fields of `snapshot`. The snapshot id is left
  /// untouched.
  pub fn apply_to(&self, snapshot: &mut ContactSnapshot) {
    snapshot.firstname       = self.firstname.clone();
    snapshot.lastname        = self.lastname.clone();
    snapshot.avatar_location = self.avatar_location.clone();
    snapshot.company         = self.company.clone();
  }
}

/// Read an optional string, mapping `null` to `""`.
fn null_as_empty<'de, D: Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
  Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}
