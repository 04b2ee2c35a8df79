//! A single attraction: static facility data plus live status and hours.

use std::fmt;

use chrono::{Local, NaiveDate, NaiveDateTime};
use serde_json::Value;
use tracing::warn;

use super::api_types::Facet;
use super::schedule::{parse_schedule, OperatingHours, Rollover};
use super::{facilities_channel, facility_status_channel, ScheduleSource};
use crate::cache::{
  Ancestors, ChannelSource, DocumentLookup, FacilityLookup, FacilityRecord, SyncManager,
};
use crate::{Error, Result};

/// Entity type of attraction rows in the facilities table.
pub const ATTRACTION_TYPE: &str = "Attraction";

/// Wire format of timestamps in facility and status documents.
const WIRE_TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Current FastPass return window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FastPassWindow {
  pub start: NaiveDateTime,
  pub end: NaiveDateTime,
}

/// An attraction loaded from the local store.
///
/// The facility record and document are a snapshot taken at load time.
/// Live fields go through [`SyncManager::refresh`] on every call, and
/// schedules are requested from the remote directly.
pub struct Attraction<'a, S> {
  manager: &'a SyncManager<S>,
  record: FacilityRecord,
  facility_data: String,
  facility: Value,
  rollover: Rollover,
}

impl<'a, S> Attraction<'a, S>
where
  S: ChannelSource + ScheduleSource,
{
  /// Load attraction `id` from the store.
  ///
  /// Fails with [`Error::NotFound`] if there is no facility row for `id` or
  /// its facility document was never synced.
  pub fn load(manager: &'a SyncManager<S>, id: &str) -> Result<Self> {
    let record = match manager.facility(id)? {
      FacilityLookup::Found(record) => record,
      FacilityLookup::NotFound => return Err(Error::NotFound(format!("attraction {}", id))),
    };

    let channel = facilities_channel(&record.destination_code);
    let facility_data = match manager.document(&channel, &record.doc_id)? {
      DocumentLookup::Present(doc) => doc.body,
      DocumentLookup::Absent => {
        return Err(Error::NotFound(format!(
          "facility document {}",
          record.doc_id
        )))
      }
    };

    // Unparseable payloads surface as DataFormat errors from the field accessors
    let facility = serde_json::from_str(&facility_data).unwrap_or_else(|e| {
      warn!(id, error = %e, "facility document is not valid JSON");
      Value::Null
    });

    Ok(Self {
      manager,
      record,
      facility_data,
      facility,
      rollover: Rollover::default(),
    })
  }

  /// Use a different midnight rollover rule for schedules.
  pub fn with_rollover(mut self, rollover: Rollover) -> Self {
    self.rollover = rollover;
    self
  }

  /// Ids of every attraction in the store.
  pub fn possible_ids(manager: &SyncManager<S>) -> Result<Vec<String>> {
    manager.facility_ids(ATTRACTION_TYPE)
  }

  // ===== Facility record =====

  pub fn id(&self) -> &str {
    &self.record.id
  }

  pub fn name(&self) -> &str {
    &self.record.name
  }

  pub fn entity_type(&self) -> &str {
    &self.record.entity_type
  }

  pub fn sub_type(&self) -> Option<&str> {
    self.record.sub_type.as_deref()
  }

  pub fn doc_id(&self) -> &str {
    &self.record.doc_id
  }

  pub fn destination_code(&self) -> &str {
    &self.record.destination_code
  }

  pub fn ancestors(&self) -> &Ancestors {
    &self.record.ancestors
  }

  /// Theme or water park containing the attraction.
  pub fn ancestor_park_id(&self) -> Option<&str> {
    self.record.ancestors.park.as_deref()
  }

  pub fn ancestor_resort_id(&self) -> Option<&str> {
    self.record.ancestors.resort.as_deref()
  }

  pub fn ancestor_land_id(&self) -> Option<&str> {
    self.record.ancestors.land.as_deref()
  }

  pub fn ancestor_resort_area_id(&self) -> Option<&str> {
    self.record.ancestors.resort_area.as_deref()
  }

  pub fn ancestor_entertainment_venue_id(&self) -> Option<&str> {
    self.record.ancestors.entertainment_venue.as_deref()
  }

  // ===== Facility document =====

  /// The facility document as stored when the attraction was loaded.
  pub fn raw_facility_data(&self) -> &str {
    &self.facility_data
  }

  pub fn last_update(&self) -> Result<NaiveDateTime> {
    parse_timestamp(str_field(&self.facility, "lastUpdate")?)
  }

  /// Latitude and longitude.
  pub fn coordinates(&self) -> Result<(f64, f64)> {
    Ok((
      coordinate(&self.facility, "latitude")?,
      coordinate(&self.facility, "longitude")?,
    ))
  }

  pub fn description(&self) -> Result<&str> {
    str_field(&self.facility, "description")
  }

  pub fn list_image_url(&self) -> Result<&str> {
    str_field(&self.facility, "listImageUrl")
  }

  pub fn facets(&self) -> Result<Vec<Facet>> {
    let facets = field(&self.facility, "facets")?;
    Ok(serde_json::from_value(facets.clone())?)
  }

  // ===== Live status =====

  /// The live status document after a sync attempt, `None` if this
  /// attraction has no live status.
  pub async fn raw_status_data(&self) -> Result<Option<String>> {
    let channel = facility_status_channel(&self.record.destination_code);
    self.manager.refresh(&channel).await;

    Ok(
      self
        .manager
        .document(&channel, &self.record.doc_id)?
        .into_option()
        .map(|doc| doc.body),
    )
  }

  async fn live_status(&self) -> Result<Option<Value>> {
    match self.raw_status_data().await? {
      Some(body) => Ok(Some(serde_json::from_str(&body)?)),
      None => Ok(None),
    }
  }

  /// Current wait in minutes. `None` when there is no live status or no
  /// posted wait (e.g. closed).
  pub async fn wait_time(&self) -> Result<Option<u32>> {
    let Some(status) = self.live_status().await? else {
      return Ok(None);
    };

    match field(&status, "waitMinutes")? {
      Value::Null => Ok(None),
      value => value
        .as_u64()
        .and_then(|minutes| u32::try_from(minutes).ok())
        .map(Some)
        .ok_or_else(|| bad_field("waitMinutes", value)),
    }
  }

  /// Current operational status, e.g. "Operating" or "Closed".
  pub async fn status(&self) -> Result<Option<String>> {
    let Some(status) = self.live_status().await? else {
      return Ok(None);
    };
    Ok(Some(str_field(&status, "status")?.to_string()))
  }

  /// Whether FastPass is offered right now. `false` without live status.
  pub async fn fast_pass_available(&self) -> Result<bool> {
    match self.live_status().await? {
      Some(status) => fast_pass_flag(&status),
      None => Ok(false),
    }
  }

  /// Current FastPass return window, `None` when FastPass is unavailable.
  pub async fn fast_pass_window(&self) -> Result<Option<FastPassWindow>> {
    let Some(status) = self.live_status().await? else {
      return Ok(None);
    };
    if !fast_pass_flag(&status)? {
      return Ok(None);
    }

    Ok(Some(FastPassWindow {
      start: parse_timestamp(str_field(&status, "fastPassStartTime")?)?,
      end: parse_timestamp(str_field(&status, "fastPassEndTime")?)?,
    }))
  }

  // ===== Schedule =====

  /// Operating hours on the given date.
  pub async fn schedule_for_date(&self, year: i32, month: u32, day: u32) -> Result<OperatingHours> {
    let date = NaiveDate::from_ymd_opt(year, month, day)
      .ok_or_else(|| Error::DataFormat(format!("{}-{}-{} is not a valid date", year, month, day)))?;
    self.schedule_on(date).await
  }

  /// Operating hours for today's local date.
  pub async fn todays_schedule(&self) -> Result<OperatingHours> {
    self.schedule_on(Local::now().date_naive()).await
  }

  async fn schedule_on(&self, date: NaiveDate) -> Result<OperatingHours> {
    let raw = match self
      .manager
      .source()
      .fetch_schedule(&self.record.id, date)
      .await
    {
      Ok(raw) => raw,
      Err(Error::NotFound(what)) => {
        warn!(%date, what = %what, "no schedule published");
        return Ok(OperatingHours::default());
      }
      Err(e) => return Err(e),
    };

    Ok(parse_schedule(&raw, date, self.rollover))
  }
}

impl<S> PartialEq for Attraction<'_, S> {
  fn eq(&self, other: &Self) -> bool {
    self.record.id == other.record.id
  }
}

impl<S> fmt::Display for Attraction<'_, S> {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    write!(f, "Attraction object for {}", self.record.name)
  }
}

fn field<'v>(doc: &'v Value, name: &str) -> Result<&'v Value> {
  doc
    .get(name)
    .ok_or_else(|| Error::DataFormat(format!("missing field `{}`", name)))
}

fn str_field<'v>(doc: &'v Value, name: &str) -> Result<&'v str> {
  let value = field(doc, name)?;
  value.as_str().ok_or_else(|| bad_field(name, value))
}

/// Coordinates come as numbers or numeric strings depending on the feed.
fn coordinate(doc: &Value, name: &str) -> Result<f64> {
  let value = field(doc, name)?;
  value
    .as_f64()
    .or_else(|| value.as_str()?.trim().parse().ok())
    .ok_or_else(|| bad_field(name, value))
}

fn fast_pass_flag(status: &Value) -> Result<bool> {
  match field(status, "fastPassAvailable")? {
    Value::Bool(available) => Ok(*available),
    Value::String(s) if s == "true" => Ok(true),
    Value::String(s) if s == "false" => Ok(false),
    value => Err(bad_field("fastPassAvailable", value)),
  }
}

fn parse_timestamp(s: &str) -> Result<NaiveDateTime> {
  NaiveDateTime::parse_from_str(s, WIRE_TIMESTAMP_FORMAT)
    .map_err(|e| Error::DataFormat(format!("bad timestamp '{}': {}", s, e)))
}

fn bad_field(name: &str, value: &Value) -> Error {
  Error::DataFormat(format!("unexpected value for `{}`: {}", name, value))
}
