//! Report query and row types.

use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{Error, Result, visit::ScreenSize};

/// Parameters for [`VisitStore::get_reports`](crate::store::VisitStore::get_reports).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportFilter {
  /// First calendar day (UTC) included in the report.
  pub start_date: NaiveDate,
  /// Last calendar day (UTC) included in the report.
  pub end_date:   NaiveDate,
  /// Restrict to links on this host. The site's own host selects
  /// same-site links.
  pub host:       Option<String>,
  /// Restrict to visits with exactly this viewport.
  pub screen:     Option<ScreenSize>,
}

impl ReportFilter {
  pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
    Self { start_date, end_date, host: None, screen: None }
  }

  /// Stable key for caching the result of this filter.
  pub fn cache_key(&self) -> Result<String> {
    let encoded = serde_json::to_vec(self)?;
    Ok(hex::encode(Sha256::digest(&encoded)))
  }
}

/// One aggregated report line: visits of a link in a given viewport on a day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportRow {
  pub link_url: String,
  pub name:     String,
  pub width:    u32,
  pub height:   u32,
  pub date:     NaiveDate,
  pub visits:   u64,
}

/// Choices for populating report filters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterData {
  pub screens: Vec<ScreenSize>,
  pub hosts:   Vec<String>,
}

/// Parses the `HEIGHTxWIDTH` form used by report filters.
impl FromStr for ScreenSize {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    let invalid = || Error::validation("screen", format!("{s:?} is not a valid screen size"));
    let (height, width) = s.split_once(['x', 'X']).ok_or_else(invalid)?;
    Ok(Self {
      height: height.trim().parse().map_err(|_| invalid())?,
      width:  width.trim().parse().map_err(|_| invalid())?,
    })
  }
}
