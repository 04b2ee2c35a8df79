//! Serde-deserializable types matching park API responses.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::cache::{ChangeBatch, ChangedDocument};

// ============================================================================
// Changes feed
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiChangesResponse {
  #[serde(default)]
  pub results: Vec<ApiChange>,
  /// Numeric or string depending on the gateway version
  pub last_seq: Option<Value>,
}

#[derive(Debug, Deserialize)]
pub struct ApiChange {
  pub id: String,
  #[serde(default)]
  pub deleted: bool,
  /// Channels the document left; present when it is no longer readable here
  #[serde(default)]
  pub removed: Option<Value>,
  pub doc: Option<Value>,
}

impl ApiChange {
  fn is_gone(&self) -> bool {
    self.deleted || self.removed.as_ref().is_some_and(|removed| !removed.is_null())
  }
}

impl ApiChangesResponse {
  pub fn into_batch(self) -> ChangeBatch {
    ChangeBatch {
      documents: self
        .results
        .into_iter()
        .map(|change| {
          let deleted = change.is_gone();
          ChangedDocument {
            id: change.id,
            deleted,
            body: change.doc.filter(|_| !deleted).map(|doc| doc.to_string()),
          }
        })
        .collect(),
      last_seq: self.last_seq.and_then(seq_to_string),
    }
  }
}

fn seq_to_string(seq: Value) -> Option<String> {
  match seq {
    Value::String(s) => Some(s),
    Value::Number(n) => Some(n.to_string()),
    _ => None,
  }
}

// ============================================================================
// Schedule endpoint
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct ApiScheduleResponse {
  #[serde(default)]
  pub schedules: Vec<ApiScheduleEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiScheduleEntry {
  #[serde(rename = "type")]
  pub schedule_type: Option<String>,
  pub start_time: Option<String>,
  pub end_time: Option<String>,
}

// ============================================================================
// Facility document
// ============================================================================

/// The fields of a facilities channel document that make up its facility row.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiFacilityDocument {
  pub id: Option<String>,
  pub name: Option<String>,
  #[serde(rename = "type")]
  pub entity_type: Option<String>,
  pub sub_type: Option<String>,
  pub ancestor_theme_park_id: Option<String>,
  pub ancestor_water_park_id: Option<String>,
  pub ancestor_resort_id: Option<String>,
  pub ancestor_land_id: Option<String>,
  pub ancestor_resort_area_id: Option<String>,
  pub ancestor_entertainment_venue_id: Option<String>,
}

/// A facet attached to a facility (interest, height requirement, ...).
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Facet {
  pub id: String,
  #[serde(default)]
  pub name: String,
  pub facet_group_type: Option<String>,
  #[serde(flatten)]
  pub extra: HashMap<String, Value>,
}
