//! Test fixtures: an in-process park API and sample facility data.

use std::collections::VecDeque;
use std::sync::Mutex;

use chrono::NaiveDate;

use crate::cache::{Ancestors, ChangeBatch, ChangedDocument, ChannelSource, FacilityRecord};
use crate::park::ScheduleSource;
use crate::{Error, Result};

/// Park API fake that replays queued responses.
///
/// An empty queue answers with a connectivity error, like an unreachable remote.
#[derive(Default)]
pub struct FakeParkApi {
  changes: Mutex<VecDeque<Result<ChangeBatch>>>,
  schedules: Mutex<VecDeque<Result<String>>>,
  change_calls: Mutex<Vec<(String, Option<String>)>>,
  schedule_calls: Mutex<Vec<(String, NaiveDate)>>,
}

impl FakeParkApi {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn push_changes(&self, response: Result<ChangeBatch>) {
    self.changes.lock().unwrap().push_back(response);
  }

  pub fn push_schedule(&self, response: Result<String>) {
    self.schedules.lock().unwrap().push_back(response);
  }

  pub fn change_calls(&self) -> Vec<(String, Option<String>)> {
    self.change_calls.lock().unwrap().clone()
  }

  pub fn schedule_calls(&self) -> Vec<(String, NaiveDate)> {
    self.schedule_calls.lock().unwrap().clone()
  }
}

impl ChannelSource for FakeParkApi {
  async fn fetch_changes(&self, channel: &str, since: Option<&str>) -> Result<ChangeBatch> {
    self
      .change_calls
      .lock()
      .unwrap()
      .push((channel.to_string(), since.map(String::from)));
    self
      .changes
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| Err(Error::Connectivity("remote unreachable".to_string())))
  }
}

impl ScheduleSource for FakeParkApi {
  async fn fetch_schedule(&self, entity_id: &str, date: NaiveDate) -> Result<String> {
    self
      .schedule_calls
      .lock()
      .unwrap()
      .push((entity_id.to_string(), date));
    self
      .schedules
      .lock()
      .unwrap()
      .pop_front()
      .unwrap_or_else(|| Err(Error::Connectivity("remote unreachable".to_string())))
  }
}

/// A change batch of `(id, body)` documents ending at `last_seq`.
pub fn batch(last_seq: &str, docs: &[(&str, &str)]) -> ChangeBatch {
  ChangeBatch {
    documents: docs
      .iter()
      .map(|(id, body)| ChangedDocument {
        id: id.to_string(),
        deleted: false,
        body: Some(body.to_string()),
      })
      .collect(),
    last_seq: Some(last_seq.to_string()),
  }
}

pub const SPACE_MOUNTAIN_DOC: &str = "80010190;entityType=Attraction;destination=wdw";

pub fn space_mountain() -> FacilityRecord {
  FacilityRecord {
    id: "80010190".to_string(),
    name: "Space Mountain".to_string(),
    entity_type: "Attraction".to_string(),
    sub_type: Some("Roller Coaster".to_string()),
    doc_id: SPACE_MOUNTAIN_DOC.to_string(),
    destination_code: "wdw".to_string(),
    ancestors: Ancestors {
      park: Some("80007944".to_string()),
      resort: None,
      land: Some("80007798".to_string()),
      resort_area: None,
      entertainment_venue: None,
    },
  }
}

pub const SPACE_MOUNTAIN_FACILITY: &str = r#"{
  "id": "80010190",
  "name": "Space Mountain",
  "type": "Attraction",
  "subType": "Roller Coaster",
  "ancestorThemeParkId": "80007944;entityType=theme-park",
  "ancestorLandId": "80007798;entityType=land",
  "lastUpdate": "2024-05-30T14:02:11Z",
  "latitude": "28.4192",
  "longitude": -81.5625,
  "description": "Rocket through the darkness of outer space.",
  "listImageUrl": "https://cdn.example.com/space-mountain.jpg",
  "facets": [
    {"id": "thrill-rides", "name": "Thrill Rides", "facetGroupType": "interests"},
    {"id": "44in-112cm-or-taller", "name": "44 in (112 cm) or taller", "facetGroupType": "height"}
  ]
}"#;
