//! Wall-clock helpers for synthetic timestamps.
//!
//! Every timestamp is UTC with second precision and is written as
//! `YYYY-MM-DDTHH:MM:SSZ`, which sorts lexically in time order.

use crate::types::Minutes;
use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serializer;

pub const ISO_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn iso_utc(at: &DateTime<Utc>) -> String {
    at.format(ISO_FORMAT).to_string()
}

/// serde `serialize_with` adapter for CSV timestamp columns.
pub fn serialize_iso<S: Serializer>(at: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&iso_utc(at))
}

/// `date` at `hour:minute:second` UTC. Out-of-range components clamp to midnight.
pub fn at_time(date: NaiveDate, hour: u32, minute: u32, second: u32) -> DateTime<Utc> {
    let time = NaiveTime::from_hms_opt(hour, minute, second).unwrap_or(NaiveTime::MIN);
    Utc.from_utc_datetime(&date.and_time(time))
}

pub fn plus_minutes(at: DateTime<Utc>, minutes: Minutes) -> DateTime<Utc> {
    at + Duration::minutes(minutes)
}

/// Start of week `week` counted from `anchor` (same weekday and time).
pub fn week_start(anchor: DateTime<Utc>, week: u32) -> DateTime<Utc> {
    anchor + Duration::weeks(i64::from(week))
}

/// True when `next` is no later than `timeout` minutes after `session_start`.
pub fn within_session(session_start: DateTime<Utc>, next: DateTime<Utc>, timeout: Minutes) -> bool {
    next - session_start <= Duration::minutes(timeout)
}
