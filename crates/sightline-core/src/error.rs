//! Error types for `sightline-core`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// Malformed input at the ingestion or reporting boundary.
  #[error("invalid {field}: {message}")]
  Validation { field: String, message: String },

  /// No usable device token was presented (or the presented one was refused
  /// by policy).
  #[error("unknown device")]
  UnknownDevice,

  /// A unit of work completed but had been marked for rollback by an inner
  /// step, so nothing it wrote survives.
  #[error("transaction was marked for rollback")]
  RolledBack,

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

impl Error {
  pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
    Self::Validation { field: field.into(), message: message.into() }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// Coarse error classes that transports map onto their own status codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind<'a> {
  Validation { field: &'a str, message: &'a str },
  UnknownDevice,
  /// A visit could not be recorded; detail is only fit for logs.
  VisitCreation,
  /// Any other storage failure; detail is only fit for logs.
  Persistence,
}

/// Implemented by backend error types so a transport can classify failures
/// without depending on the backend.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn kind(&self) -> ErrorKind<'_>;
}

impl StoreError for Error {
  fn kind(&self) -> ErrorKind<'_> {
    match self {
      Self::Validation { field, message } => ErrorKind::Validation { field, message },
      Self::UnknownDevice => ErrorKind::UnknownDevice,
      Self::RolledBack | Self::Serialization(_) => ErrorKind::Persistence,
    }
  }
}
