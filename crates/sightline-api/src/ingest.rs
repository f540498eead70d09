//! Handler for `POST /links`: record the links a page view reported.
//!
//! The device token travels in the `X-Device` header both ways. A request
//! without one is treated as a first contact.

use axum::{
  Json,
  extract::{State, rejection::JsonRejection},
  http::{HeaderMap, HeaderValue, StatusCode, header},
  response::IntoResponse,
};
use serde::Serialize;
use sightline_core::{
  ingest::{RequestContext, VisitBatch},
  store::VisitStore,
};
use uuid::Uuid;

use crate::{
  ApiState,
  client::{ClientIp, DEVICE_HEADER, DeviceToken},
  error::ApiError,
};

#[derive(Debug, Serialize)]
pub struct CreatedBody {
  pub device: Uuid,
  /// Number of visits recorded.
  pub visits: usize,
}

/// `POST /links`: body `{"links":[{"url","name","x","y"}],"width","height"}`
pub async fn create<S>(
  State(state): State<ApiState<S>>,
  ClientIp(ip): ClientIp,
  DeviceToken(device_token): DeviceToken,
  headers: HeaderMap,
  body: Result<Json<VisitBatch>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError>
where
  S: VisitStore + 'static,
{
  let Json(batch) = body.map_err(|rejection| ApiError::validation("body", rejection.body_text()))?;

  let ctx = RequestContext {
    device_token,
    ip,
    user_agent: headers
      .get(header::USER_AGENT)
      .and_then(|v| v.to_str().ok())
      .map(str::to_owned),
    user_id: None,
  };

  let outcome = state
    .store
    .record_batch(batch, ctx)
    .await
    .map_err(|e| ApiError::from_store(e, state.debug))?;

  let token = outcome.device_token();
  let mut response_headers = HeaderMap::new();
  if let Ok(value) = HeaderValue::from_str(&token.to_string()) {
    response_headers.insert(DEVICE_HEADER, value);
  }

  Ok((
    StatusCode::CREATED,
    response_headers,
    Json(CreatedBody { device: token, visits: outcome.visits.len() }),
  ))
}
