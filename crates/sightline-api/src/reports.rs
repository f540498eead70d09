//! Handlers for the reporting endpoints. Both require Basic auth.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/links` | `?start_date=YYYY-MM-DD&end_date=YYYY-MM-DD[&screen=HxW][&host=h]` |
//! | `GET`  | `/links/filter-data` | Distinct screens and hosts |

use axum::{
  Json,
  extract::{Query, State, rejection::QueryRejection},
};
use chrono::NaiveDate;
use serde::Deserialize;
use sightline_core::{
  report::{FilterData, ReportFilter, ReportRow},
  store::VisitStore,
  visit::ScreenSize,
};

use crate::{ApiState, auth::Authenticated, error::ApiError};

// ─── Reports ──────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ReportParams {
  pub start_date: Option<String>,
  pub end_date:   Option<String>,
  pub screen:     Option<String>,
  pub host:       Option<String>,
}

impl ReportParams {
  fn into_filter(self) -> Result<ReportFilter, ApiError> {
    let start_date = required_date("start_date", self.start_date.as_deref())?;
    let end_date = required_date("end_date", self.end_date.as_deref())?;

    let screen = match self.screen.as_deref().map(str::trim) {
      None | Some("") => None,
      Some(raw) => Some(raw.parse::<ScreenSize>().map_err(|e| match e {
        sightline_core::Error::Validation { field, message } => ApiError::Validation { field, message },
        other => ApiError::validation("screen", other.to_string()),
      })?),
    };
    let host = self.host.map(|h| h.trim().to_owned()).filter(|h| !h.is_empty());

    Ok(ReportFilter { start_date, end_date, host, screen })
  }
}

fn required_date(field: &str, raw: Option<&str>) -> Result<NaiveDate, ApiError> {
  let raw = raw
    .map(str::trim)
    .filter(|s| !s.is_empty())
    .ok_or_else(|| ApiError::validation(field, format!("{field} is required")))?;
  NaiveDate::parse_from_str(raw, "%Y-%m-%d")
    .map_err(|_| ApiError::validation(field, format!("{field} is not a valid YYYY-MM-DD date")))
}

/// `GET /links?start_date&end_date[&screen][&host]`
pub async fn list<S>(
  _: Authenticated,
  State(state): State<ApiState<S>>,
  params: Result<Query<ReportParams>, QueryRejection>,
) -> Result<Json<Vec<ReportRow>>, ApiError>
where
  S: VisitStore + 'static,
{
  let Query(params) = params.map_err(|e| ApiError::validation("query", e.body_text()))?;
  let filter = params.into_filter()?;
  let rows = state
    .store
    .get_reports(filter)
    .await
    .map_err(|e| ApiError::from_store(e, state.debug))?;
  Ok(Json(rows))
}

// ─── Filter data ──────────────────────────────────────────────────────────────

/// `GET /links/filter-data`
pub async fn filter_data<S>(
  _: Authenticated,
  State(state): State<ApiState<S>>,
) -> Result<Json<FilterData>, ApiError>
where
  S: VisitStore + 'static,
{
  let screens = state
    .store
    .available_screens()
    .await
    .map_err(|e| ApiError::from_store(e, state.debug))?;
  let hosts = state
    .store
    .available_hosts()
    .await
    .map_err(|e| ApiError::from_store(e, state.debug))?;
  Ok(Json(FilterData { screens, hosts }))
}

#[cfg(test)]
mod tests {
  use super::*;

  fn params(start: &str, end: &str) -> ReportParams {
    ReportParams { start_date: Some(start.into()), end_date: Some(end.into()), ..Default::default() }
  }

  #[test]
  fn dates_are_required_and_strict() {
    assert!(params("2024-01-01", "2024-01-31").into_filter().is_ok());
    assert!(matches!(
      ReportParams::default().into_filter(),
      Err(ApiError::Validation { ref field, .. }) if field == "start_date"
    ));
    assert!(matches!(
      params("2024-01-01", "01/31/2024").into_filter(),
      Err(ApiError::Validation { ref field, .. }) if field == "end_date"
    ));
  }

  #[test]
  fn screen_and_host_are_optional() {
    let mut p = params("2024-01-01", "2024-01-01");
    p.screen = Some("1080x1920".into());
    p.host = Some("  ".into());
    let filter = p.into_filter().unwrap();
    assert_eq!(filter.screen, Some(ScreenSize { height: 1080, width: 1920 }));
    assert_eq!(filter.host, None);

    let mut p = params("2024-01-01", "2024-01-01");
    p.screen = Some("wide".into());
    assert!(matches!(
      p.into_filter(),
      Err(ApiError::Validation { ref field, .. }) if field == "screen"
    ));
  }
}
