//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as fixed-width RFC 3339 UTC strings with microsecond
//! precision, so text comparison orders them chronologically and
//! `substr(created_at, 1, 10)` is the calendar day. Tokens are stored as
//! hyphenated lowercase strings.

use chrono::{DateTime, NaiveDate, SecondsFormat, SubsecRound as _, Utc};
use sightline_core::{
  device::{Device, DeviceIp},
  link::{CanonicalUrl, Link},
  visit::Visit,
};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Uuid ─────────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

// ─── Time ─────────────────────────────────────────────────────────────────────

/// The current time at the precision the store keeps.
pub fn now() -> DateTime<Utc> { Utc::now().trunc_subsecs(6) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_date(d: NaiveDate) -> String { d.format("%Y-%m-%d").to_string() }

pub fn decode_date(s: &str) -> Result<NaiveDate> {
  NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Raw row types ────────────────────────────────────────────────────────────

/// A `devices` row before decoding.
pub struct RawDevice {
  pub token:      String,
  pub user_id:    Option<i64>,
  pub user_agent: Option<String>,
  pub created_at: String,
}

impl RawDevice {
  pub const COLUMNS: &'static str = "token, user_id, user_agent, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      token:      row.get(0)?,
      user_id:    row.get(1)?,
      user_agent: row.get(2)?,
      created_at: row.get(3)?,
    })
  }

  pub fn into_device(self) -> Result<Device> {
    Ok(Device {
      token:      decode_uuid(&self.token)?,
      user_id:    self.user_id,
      user_agent: self.user_agent,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

pub struct RawDeviceIp {
  pub id:           i64,
  pub device_token: String,
  pub ip:           String,
  pub created_at:   String,
}

impl RawDeviceIp {
  pub const COLUMNS: &'static str = "id, device_token, ip, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      device_token: row.get(1)?,
      ip:           row.get(2)?,
      created_at:   row.get(3)?,
    })
  }

  pub fn into_device_ip(self) -> Result<DeviceIp> {
    Ok(DeviceIp {
      id:           self.id,
      device_token: decode_uuid(&self.device_token)?,
      ip:           self.ip,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

/// Link rows need no decoding beyond column extraction.
pub fn link_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Link> {
  Ok(Link {
    id:   row.get(0)?,
    url:  CanonicalUrl {
      scheme:   row.get(1)?,
      host:     row.get(2)?,
      path:     row.get(3)?,
      query:    row.get(4)?,
      fragment: row.get(5)?,
    },
    name: row.get(6)?,
  })
}

pub const LINK_COLUMNS: &str = "id, scheme, hostname, path, query, fragment, name";

pub struct RawVisit {
  pub id:           i64,
  pub link_id:      i64,
  pub device_ip_id: i64,
  pub height:       u32,
  pub width:        u32,
  pub position:     String,
  pub created_at:   String,
}

impl RawVisit {
  pub const COLUMNS: &'static str =
    "id, link_id, device_ip_id, height, width, position_xy, created_at";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      id:           row.get(0)?,
      link_id:      row.get(1)?,
      device_ip_id: row.get(2)?,
      height:       row.get(3)?,
      width:        row.get(4)?,
      position:     row.get(5)?,
      created_at:   row.get(6)?,
    })
  }

  pub fn into_visit(self) -> Result<Visit> {
    Ok(Visit {
      id:           self.id,
      link_id:      self.link_id,
      device_ip_id: self.device_ip_id,
      height:       self.height,
      width:        self.width,
      position:     self.position,
      created_at:   decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone as _;

  use super::*;

  #[test]
  fn timestamps_are_fixed_width_and_round_trip() {
    let whole = Utc.with_ymd_and_hms(2024, 3, 9, 8, 7, 6).unwrap();
    let encoded = encode_dt(whole);
    assert_eq!(encoded, "2024-03-09T08:07:06.000000Z");
    assert_eq!(decode_dt(&encoded).unwrap(), whole);

    let t = now();
    assert_eq!(encode_dt(t).len(), encoded.len());
    assert_eq!(decode_dt(&encode_dt(t)).unwrap(), t);
  }

  #[test]
  fn day_prefix_is_the_calendar_date() {
    let t = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
    let day = &encode_dt(t)[..10];
    assert_eq!(decode_date(day).unwrap(), NaiveDate::from_ymd_opt(2024, 12, 31).unwrap());
  }
}
