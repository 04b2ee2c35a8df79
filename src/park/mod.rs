//! Park domain: the attraction accessor, the HTTP client for the park API,
//! facility indexing and schedule parsing.

mod api_types;
mod attraction;
mod client;
mod facilities;
pub mod schedule;

use std::future::Future;

use chrono::NaiveDate;

use crate::Result;

pub use api_types::Facet;
pub use attraction::{Attraction, FastPassWindow};
pub use client::ParkClient;
pub use facilities::{facility_record, sync_facilities};
pub use schedule::{parse_schedule, OperatingHours, Rollover};

/// Remote source of daily schedules. Responses are never cached.
pub trait ScheduleSource: Send + Sync {
  /// Fetch the raw schedule response for `entity_id` on `date`.
  fn fetch_schedule(
    &self,
    entity_id: &str,
    date: NaiveDate,
  ) -> impl Future<Output = Result<String>> + Send;
}

/// Channel holding the static facility documents of a destination.
pub fn facilities_channel(destination_code: &str) -> String {
  format!("{}.facilities.1_0", destination_code)
}

/// Channel holding the live status documents of a destination.
pub fn facility_status_channel(destination_code: &str) -> String {
  format!("{}.facilitystatus.1_0", destination_code)
}
