//! Operating hours from the schedule endpoint.
//!
//! A schedule response lists typed windows with `"HH:MM"`-prefixed start
//! and end times for one calendar day. Closing times shortly after
//! midnight belong to the following day, so an end hour at or below
//! [`Rollover::last_hour`] is moved to the next date.

use chrono::{NaiveDate, NaiveDateTime, NaiveTime};
use tracing::debug;

use super::api_types::{ApiScheduleEntry, ApiScheduleResponse};

/// Latest end hour that still counts as "after midnight".
pub const DEFAULT_ROLLOVER_LAST_HOUR: u32 = 7;

const OPERATING: &str = "Operating";
const EXTRA_MAGIC_HOURS: &str = "Extra Magic Hours";

/// Rule for closing times that cross midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rollover {
  /// End hours in `0..=last_hour` roll to the next calendar day
  pub last_hour: u32,
}

impl Default for Rollover {
  fn default() -> Self {
    Self {
      last_hour: DEFAULT_ROLLOVER_LAST_HOUR,
    }
  }
}

impl Rollover {
  /// Calendar date a closing time at `hour` falls on.
  fn end_date(&self, date: NaiveDate, hour: u32) -> Option<NaiveDate> {
    if hour <= self.last_hour {
      date.succ_opt()
    } else {
      Some(date)
    }
  }
}

/// Opening and closing times for one day, in venue local time.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OperatingHours {
  pub operating_open: Option<NaiveDateTime>,
  pub operating_close: Option<NaiveDateTime>,
  pub extra_open: Option<NaiveDateTime>,
  pub extra_close: Option<NaiveDateTime>,
}

impl OperatingHours {
  /// No hours at all: the venue published nothing for the day.
  pub fn is_empty(&self) -> bool {
    *self == Self::default()
  }
}

/// Parse a raw schedule response for `date`.
///
/// `"Operating"` and `"Extra Magic Hours"` entries fill their slots, other
/// types are ignored and a later entry of a type replaces an earlier one.
/// Entries with unreadable times are skipped. A body that is not a
/// schedule response yields empty hours.
pub fn parse_schedule(raw: &str, date: NaiveDate, rollover: Rollover) -> OperatingHours {
  let response: ApiScheduleResponse = match serde_json::from_str(raw) {
    Ok(response) => response,
    Err(e) => {
      debug!(%date, error = %e, "unreadable schedule response");
      return OperatingHours::default();
    }
  };

  let mut hours = OperatingHours::default();
  for entry in &response.schedules {
    let (open, close) = match entry.schedule_type.as_deref() {
      Some(OPERATING) => (&mut hours.operating_open, &mut hours.operating_close),
      Some(EXTRA_MAGIC_HOURS) => (&mut hours.extra_open, &mut hours.extra_close),
      _ => continue,
    };

    match entry_window(entry, date, rollover) {
      Some((start, end)) => {
        *open = Some(start);
        *close = Some(end);
      }
      None => debug!(?entry, "skipping schedule entry with unreadable times"),
    }
  }

  hours
}

fn entry_window(
  entry: &ApiScheduleEntry,
  date: NaiveDate,
  rollover: Rollover,
) -> Option<(NaiveDateTime, NaiveDateTime)> {
  let start = parse_clock(entry.start_time.as_deref()?)?;
  let end = parse_clock(entry.end_time.as_deref()?)?;

  let end_date = rollover.end_date(date, end.hour)?;
  Some((date.and_time(start.time), end_date.and_time(end.time)))
}

struct Clock {
  hour: u32,
  time: NaiveTime,
}

/// Read the `HH:MM` prefix of a wire time such as `"09:00"` or `"22:30:00"`.
fn parse_clock(s: &str) -> Option<Clock> {
  let hour: u32 = s.get(0..2)?.parse().ok()?;
  if s.get(2..3)? != ":" {
    return None;
  }
  let minute: u32 = s.get(3..5)?.parse().ok()?;
  let time = NaiveTime::from_hms_opt(hour, minute, 0)?;
  Some(Clock { hour, time })
}
