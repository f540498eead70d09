//! HTTP surface for Sightline.
//!
//! Exposes an axum [`Router`] backed by any [`VisitStore`]: the public
//! ingestion endpoint and the authenticated reporting endpoints. TLS and
//! process concerns are the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! let app = sightline_api::api_router(state)
//!   .into_make_service_with_connect_info::<std::net::SocketAddr>();
//! ```
//!
//! Serving with connect info lets the client-IP extractor fall back to the
//! socket peer when no proxy header is present.

pub mod auth;
pub mod client;
pub mod error;
pub mod ingest;
pub mod reports;

use std::sync::Arc;

use axum::{Router, routing::get};
use sightline_core::store::VisitStore;

pub use auth::AuthConfig;
pub use error::ApiError;

// ─── Application state ────────────────────────────────────────────────────────

/// Shared state threaded through all handlers.
pub struct ApiState<S> {
  pub store: Arc<S>,
  pub auth:  Arc<AuthConfig>,
  /// Log storage error detail.
  pub debug: bool,
}

impl<S> Clone for ApiState<S> {
  fn clone(&self) -> Self {
    Self { store: self.store.clone(), auth: self.auth.clone(), debug: self.debug }
  }
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build the API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S>(state: ApiState<S>) -> Router<()>
where
  S: VisitStore + 'static,
{
  Router::new()
    .route("/links", get(reports::list::<S>).post(ingest::create::<S>))
    .route("/links/filter-data", get(reports::filter_data::<S>))
    .with_state(state)
}

// ─── Integration tests ────────────────────────────────────────────────────────
