//! Devices and their IP observations.
//!
//! A device is the durable anonymous identity of one browser instance. It is
//! created once and never mutated. Every request made by a device appends a
//! [`DeviceIp`] row; IP bindings are an observation log, not a mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Reference to an authenticated user of the host site.
pub type UserId = i64;

/// A stable anonymous device identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
  /// The opaque token handed to the client in the `X-Device` header.
  pub token:      Uuid,
  pub user_id:    Option<UserId>,
  pub user_agent: Option<String>,
  pub created_at: DateTime<Utc>,
}

/// Input for creating a [`Device`]. The token is always minted by the store.
#[derive(Debug, Clone, Default)]
pub struct NewDevice {
  pub user_id:    Option<UserId>,
  pub user_agent: Option<String>,
}

/// One observation of a device at an IP address.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIp {
  pub id:           i64,
  pub device_token: Uuid,
  pub ip:           String,
  pub created_at:   DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewDeviceIp {
  pub device_token: Uuid,
  pub ip:           String,
}

/// Outcome of resolving the device behind a request.
#[derive(Debug, Clone)]
pub struct DeviceResolution {
  pub device:    Device,
  /// The binding row created for this request.
  pub device_ip: DeviceIp,
  /// `true` when the device was minted while resolving.
  pub is_new:    bool,
}

// ─── Tokens ──────────────────────────────────────────────────────────────────

/// Mint a fresh device token: 122 random bits with the RFC 4122 version
/// nibble set to `0100` and the variant bits set to `10`.
pub fn mint_token() -> Uuid { Uuid::new_v4() }

/// Interpret a client-presented token.
///
/// Returns `None` for anything that is not a well-formed v4 token; callers
/// treat that the same as a token that is not stored.
pub fn parse_token(presented: &str) -> Option<Uuid> {
  let token = Uuid::try_parse(presented.trim()).ok()?;
  (token.get_version_num() == 4).then_some(token)
}
