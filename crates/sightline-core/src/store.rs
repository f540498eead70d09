//! The `VisitStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `sightline-store-sqlite`).
//! Transports (`sightline-api`) and the server depend on this abstraction, not
//! on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  device::{Device, DeviceIp, DeviceResolution},
  error::StoreError,
  ingest::{IngestOutcome, RequestContext, VisitBatch},
  link::Link,
  report::{ReportFilter, ReportRow},
  visit::{Position, ScreenSize, Visit},
};

/// Abstraction over a Sightline storage backend.
///
/// Every mutating method runs as one unit of work: either everything it wrote
/// is committed, or nothing is.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait VisitStore: Send + Sync {
  type Error: StoreError;

  // ── Ingestion ─────────────────────────────────────────────────────────

  /// Validate and record one batch: resolve (or mint) the device, bind the
  /// request IP, then record a visit for every observed link, all in a single
  /// transaction.
  fn record_batch(
    &self,
    batch: VisitBatch,
    ctx: RequestContext,
  ) -> impl Future<Output = Result<IngestOutcome, Self::Error>> + Send + '_;

  // ── Devices ───────────────────────────────────────────────────────────

  /// Resolve the presented token to a device and bind the request IP.
  ///
  /// Fails with an unknown-device error when no token is presented. A token
  /// that is not stored follows the backend's unknown-token policy.
  fn resolve_or_create_device(
    &self,
    ctx: RequestContext,
  ) -> impl Future<Output = Result<DeviceResolution, Self::Error>> + Send + '_;

  /// Create a device with a fresh token plus its first IP binding.
  fn mint_device(
    &self,
    ctx: RequestContext,
  ) -> impl Future<Output = Result<DeviceResolution, Self::Error>> + Send + '_;

  /// Append an IP observation for an existing device.
  fn bind_device_ip(
    &self,
    token: Uuid,
    ip: String,
  ) -> impl Future<Output = Result<DeviceIp, Self::Error>> + Send + '_;

  fn find_device(
    &self,
    token: Uuid,
  ) -> impl Future<Output = Result<Option<Device>, Self::Error>> + Send + '_;

  fn find_device_ip(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<DeviceIp>, Self::Error>> + Send + '_;

  // ── Links ─────────────────────────────────────────────────────────────

  /// Return the link for `(url, name)`, creating it if needed. Concurrent
  /// callers with the same canonical key receive the same record.
  fn find_or_create_link(
    &self,
    url: String,
    name: String,
  ) -> impl Future<Output = Result<Link, Self::Error>> + Send + '_;

  /// Read-only lookup by raw URL and name; never creates.
  fn find_link_by_url(
    &self,
    url: String,
    name: String,
  ) -> impl Future<Output = Result<Option<Link>, Self::Error>> + Send + '_;

  fn find_link(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Link>, Self::Error>> + Send + '_;

  // ── Visits ────────────────────────────────────────────────────────────

  fn create_visit(
    &self,
    link_id: i64,
    device_ip_id: i64,
    screen: ScreenSize,
    position: Position,
  ) -> impl Future<Output = Result<Visit, Self::Error>> + Send + '_;

  fn find_visit(
    &self,
    id: i64,
  ) -> impl Future<Output = Result<Option<Visit>, Self::Error>> + Send + '_;

  /// Delete visits recorded more than `days` days ago. Returns the number of
  /// visits removed.
  fn purge_older_than(
    &self,
    days: u32,
  ) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  // ── Reports ───────────────────────────────────────────────────────────

  fn get_reports(
    &self,
    filter: ReportFilter,
  ) -> impl Future<Output = Result<Vec<ReportRow>, Self::Error>> + Send + '_;

  /// Distinct viewports that have at least one visit.
  fn available_screens(
    &self,
  ) -> impl Future<Output = Result<Vec<ScreenSize>, Self::Error>> + Send + '_;

  /// Distinct link hosts, with same-site links reported as the site host.
  fn available_hosts(
    &self,
  ) -> impl Future<Output = Result<Vec<String>, Self::Error>> + Send + '_;
}
