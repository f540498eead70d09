//! Error type for `sightline-store-sqlite`.

use rusqlite::ffi;
use sightline_core::error::{ErrorKind, StoreError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sightline_core::Error),

  #[error("connection error: {0}")]
  Connection(#[from] tokio_rusqlite::Error),

  #[error("database error: {0}")]
  Database(#[from] rusqlite::Error),

  /// An insert collided with an existing row's unique key.
  #[error("duplicate key: {0}")]
  DuplicateKey(String),

  /// Recording a visit failed; the source holds the storage detail.
  #[error("could not create visit")]
  VisitCreation(#[source] Box<Error>),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl Error {
  /// Classify an insert failure, separating unique-key collisions from every
  /// other database error.
  pub(crate) fn from_insert(err: rusqlite::Error) -> Self {
    match &err {
      rusqlite::Error::SqliteFailure(code, message)
        if matches!(
          code.extended_code,
          ffi::SQLITE_CONSTRAINT_UNIQUE | ffi::SQLITE_CONSTRAINT_PRIMARYKEY
        ) =>
      {
        Self::DuplicateKey(message.clone().unwrap_or_else(|| code.to_string()))
      }
      _ => Self::Database(err),
    }
  }
}

impl StoreError for Error {
  fn kind(&self) -> ErrorKind<'_> {
    match self {
      Self::Core(inner) => inner.kind(),
      Self::VisitCreation(_) => ErrorKind::VisitCreation,
      _ => ErrorKind::Persistence,
    }
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
