//! Visits: immutable facts recording that a device saw a link.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Viewport dimensions reported by the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ScreenSize {
  pub height: u32,
  pub width:  u32,
}

/// Pointer position at the time the link became visible.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Position {
  pub x: f64,
  pub y: f64,
}

impl Position {
  /// Pack into the `"x,y"` text stored with each visit.
  pub fn pack(&self) -> String { format!("{:.6},{:.6}", self.x, self.y) }
}

/// A recorded visit. Never updated after insertion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Visit {
  pub id:           i64,
  pub link_id:      i64,
  pub device_ip_id: i64,
  pub height:       u32,
  pub width:        u32,
  /// Packed `"x,y"` pointer position; see [`Position::pack`].
  pub position:     String,
  pub created_at:   DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct NewVisit {
  pub link_id:      i64,
  pub device_ip_id: i64,
  pub screen:       ScreenSize,
  pub position:     Position,
}
