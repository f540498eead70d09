//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::{HeaderValue, StatusCode, header},
  response::{IntoResponse, Response},
};
use serde_json::json;
use sightline_core::error::{ErrorKind, StoreError};
use thiserror::Error;

/// An error returned by an API handler.
///
/// Only validation errors carry detail back to the client; storage failures
/// are reported generically and their detail goes to the log.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("unknown device")]
  Forbidden,

  #[error("invalid {field}: {message}")]
  Validation { field: String, message: String },

  #[error("unauthorized")]
  Unauthorized,

  #[error("could not create visit")]
  VisitCreation,

  #[error("internal error")]
  Internal,
}

impl ApiError {
  pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Validation { field: field.into(), message: message.into() }
  }

  /// Classify a store error, logging storage detail only when `debug` is set.
  pub fn from_store<E: StoreError>(err: E, debug: bool) -> Self {
    let mapped = match err.kind() {
      ErrorKind::Validation { field, message } => return Self::validation(field, message),
      ErrorKind::UnknownDevice => return Self::Forbidden,
      ErrorKind::VisitCreation => Self::VisitCreation,
      ErrorKind::Persistence => Self::Internal,
    };
    if debug {
      tracing::error!(error = %err, source = ?std::error::Error::source(&err), "store operation failed");
    } else {
      tracing::error!("store operation failed");
    }
    mapped
  }

  fn code(&self) -> &'static str {
    match self {
      Self::Forbidden => "forbidden",
      Self::Validation { .. } => "validation_error",
      Self::Unauthorized => "unauthorized",
      Self::VisitCreation | Self::Internal => "internal_error",
    }
  }

  fn status(&self) -> StatusCode {
    match self {
      Self::Forbidden => StatusCode::FORBIDDEN,
      Self::Validation { .. } => StatusCode::BAD_REQUEST,
      Self::Unauthorized => StatusCode::UNAUTHORIZED,
      Self::VisitCreation | Self::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let body = match &self {
      ApiError::Validation { field, message } => {
        json!({ "error": self.code(), "message": message, "field": field })
      }
      other => json!({ "error": other.code(), "message": other.to_string() }),
    };
    let mut res = (self.status(), Json(body)).into_response();
    if matches!(self, ApiError::Unauthorized) {
      res.headers_mut().insert(
        header::WWW_AUTHENTICATE,
        HeaderValue::from_static("Basic realm=\"sightline\""),
      );
    }
    res
  }
}
