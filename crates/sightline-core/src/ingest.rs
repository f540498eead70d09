//! Ingestion input, policy and outcome types.
//!
//! A batch is everything one page view reports: the links that became visible
//! plus the viewport they were seen in. Validation happens here, before any
//! storage work starts, so a malformed batch never opens a transaction.

use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
  Error, Result,
  device::{DeviceResolution, UserId},
  link::Link,
  visit::{Position, ScreenSize, Visit},
};

// ─── Input ───────────────────────────────────────────────────────────────────

/// One link reported visible by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkObservation {
  pub url:  String,
  pub name: String,
  pub x:    f64,
  pub y:    f64,
}

impl LinkObservation {
  pub fn position(&self) -> Position { Position { x: self.x, y: self.y } }
}

/// The body of an ingestion request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VisitBatch {
  pub links:  Vec<LinkObservation>,
  /// Signed so that negative input reaches validation instead of failing
  /// deserialisation with an opaque message.
  pub width:  i64,
  pub height: i64,
}

impl VisitBatch {
  /// Check every field and return the validated screen size.
  pub fn validate(&self) -> Result<ScreenSize> {
    let width = dimension("width", self.width)?;
    let height = dimension("height", self.height)?;

    for (i, link) in self.links.iter().enumerate() {
      if link.url.trim().is_empty() {
        return Err(Error::validation(format!("links[{i}].url"), "links item is missing url property"));
      }
      if link.name.trim().is_empty() {
        return Err(Error::validation(format!("links[{i}].name"), "links item is missing name property"));
      }
      match Url::parse(link.url.trim()) {
        Ok(url) if url.host_str().is_some_and(|h| !h.is_empty()) => {}
        _ => return Err(Error::validation(format!("links[{i}].url"), format!("invalid link {}", link.url))),
      }
      if !link.x.is_finite() || !link.y.is_finite() {
        return Err(Error::validation(format!("links[{i}]"), "x and y must be finite numbers"));
      }
    }

    Ok(ScreenSize { height, width })
  }
}

fn dimension(field: &str, value: i64) -> Result<u32> {
  u32::try_from(value)
    .map_err(|_| Error::validation(field, format!("{field} must be a non-negative integer")))
}

/// Request metadata that accompanies a batch.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
  /// Raw `X-Device` header value, if the client sent one.
  pub device_token: Option<String>,
  pub ip:           String,
  pub user_agent:   Option<String>,
  pub user_id:      Option<UserId>,
}

impl RequestContext {
  /// The presented token, with blank values treated as absent.
  pub fn presented_token(&self) -> Option<&str> {
    self.device_token.as_deref().map(str::trim).filter(|t| !t.is_empty())
  }
}

// ─── Policy ──────────────────────────────────────────────────────────────────

/// What to do when a request cannot be tied to a stored device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePolicy {
  /// Create a new device and hand its token back to the client.
  #[default]
  Mint,
  /// Refuse the request with [`Error::UnknownDevice`].
  Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IngestPolicy {
  /// Applied when no token is presented at all.
  #[serde(default)]
  pub first_contact: DevicePolicy,
  /// Applied when a token is presented but no device is stored under it.
  #[serde(default)]
  pub unknown_token: DevicePolicy,
}

// ─── Output ──────────────────────────────────────────────────────────────────

/// Everything a committed batch produced.
#[derive(Debug, Clone)]
pub struct IngestOutcome {
  pub resolution: DeviceResolution,
  /// Links in the order they were reported; duplicates in a batch repeat.
  pub links:      Vec<Link>,
  pub visits:     Vec<Visit>,
}

impl IngestOutcome {
  /// The token to return to the client.
  pub fn device_token(&self) -> uuid::Uuid { self.resolution.device.token }
}
