//! [`SqliteStore`]: the SQLite implementation of [`VisitStore`].

use std::{path::Path, sync::Arc, time::Duration};

use chrono::TimeDelta;
use sightline_core::{
  cache::Cache,
  device::{Device, DeviceIp, DeviceResolution},
  ingest::{IngestOutcome, IngestPolicy, RequestContext, VisitBatch},
  link::{CanonicalUrl, Link, NewLink, Site, link_cache_key},
  report::{ReportFilter, ReportRow},
  repository::Repository as _,
  store::VisitStore,
  transaction::TransactionContext,
  visit::{NewVisit, Position, ScreenSize, Visit},
};
use uuid::Uuid;

use crate::{
  Result, SqliteSession,
  encode::{decode_date, encode_date, now},
  pipeline::Pipeline,
  schema::SCHEMA,
};

// ─── Options ─────────────────────────────────────────────────────────────────

/// Everything a store needs besides the database location.
#[derive(Debug, Clone)]
pub struct StoreOptions {
  pub site:           Site,
  pub policy:         IngestPolicy,
  /// Maximum entries per cache.
  pub cache_capacity: usize,
  /// How long report and filter-data results stay cached.
  pub report_ttl:     Duration,
  /// How long a writer waits for SQLite's write lock before failing.
  pub busy_timeout:   Duration,
}

impl StoreOptions {
  pub fn new(site: Site) -> Self {
    Self {
      site,
      policy: IngestPolicy::default(),
      cache_capacity: 1024,
      report_ttl: Duration::from_secs(15 * 60),
      busy_timeout: Duration::from_secs(5),
    }
  }
}

// ─── Caches ──────────────────────────────────────────────────────────────────

/// Read-through caches shared by every clone of a store.
///
/// Device, device-IP and link records are immutable once written, so those
/// caches never expire. None of them is ever consulted to decide whether a
/// link exists before inserting it.
pub(crate) struct Caches {
  pub devices:    Cache<Uuid, Device>,
  pub device_ips: Cache<i64, DeviceIp>,
  /// Keyed by [`link_cache_key`] of the raw URL and name.
  pub links:      Cache<String, Link>,
  /// Keyed by [`ReportFilter::cache_key`].
  pub reports:    Cache<String, Vec<ReportRow>>,
  pub screens:    Cache<(), Vec<ScreenSize>>,
  pub hosts:      Cache<(), Vec<String>>,
}

impl Caches {
  pub(crate) fn new(capacity: usize, report_ttl: Duration) -> Self {
    Self {
      devices:    Cache::new(capacity, None),
      device_ips: Cache::new(capacity, None),
      links:      Cache::new(capacity, None),
      reports:    Cache::new(capacity, Some(report_ttl)),
      screens:    Cache::new(1, Some(report_ttl)),
      hosts:      Cache::new(1, Some(report_ttl)),
    }
  }

  fn remember_resolution(&self, resolution: &DeviceResolution) {
    self.devices.insert(resolution.device.token, resolution.device.clone());
    self.device_ips.insert(resolution.device_ip.id, resolution.device_ip.clone());
  }

  /// Drop every cached aggregate; called when visits are deleted.
  fn invalidate_reports(&self) {
    self.reports.clear();
    self.screens.clear();
    self.hosts.clear();
  }
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Sightline visit store backed by a single SQLite file.
///
/// Cloning is cheap: the connection handle and caches are reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  conn:     tokio_rusqlite::Connection,
  pipeline: Pipeline,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>, options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn, options).await
  }

  /// Open an in-memory store, useful for testing.
  pub async fn open_in_memory(options: StoreOptions) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn, options).await
  }

  async fn init(conn: tokio_rusqlite::Connection, options: StoreOptions) -> Result<Self> {
    let busy_timeout = options.busy_timeout;
    conn
      .call(move |conn| {
        conn.busy_timeout(busy_timeout)?;
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;

    let caches = Arc::new(Caches::new(options.cache_capacity, options.report_ttl));
    let pipeline = Pipeline::new(Arc::new(options.site), options.policy, caches);
    Ok(Self { conn, pipeline })
  }

  pub fn site(&self) -> &Site { &self.pipeline.site }

  fn caches(&self) -> &Caches { &self.pipeline.caches }

  /// Run `f` on the connection thread with a fresh transaction context.
  async fn with_tx<T, F>(&self, f: F) -> Result<T>
  where
    T: Send + 'static,
    F: FnOnce(&Pipeline, &mut TransactionContext<'_, SqliteSession<'_>>) -> Result<T>
      + Send
      + 'static,
  {
    let pipeline = self.pipeline.clone();
    self
      .conn
      .call(move |conn| {
        let session = SqliteSession::new(conn);
        let mut tx = TransactionContext::new(&session);
        Ok(f(&pipeline, &mut tx))
      })
      .await?
  }

  #[cfg(test)]
  pub(crate) async fn execute_raw(&self, sql: &'static str, params: Vec<String>) -> Result<usize> {
    self
      .conn
      .call(move |conn| Ok(conn.execute(sql, rusqlite::params_from_iter(params))?))
      .await
      .map_err(Into::into)
  }

  #[cfg(test)]
  pub(crate) async fn count_rows(&self, table: &'static str) -> Result<i64> {
    self
      .conn
      .call(move |conn| {
        Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0))?)
      })
      .await
      .map_err(Into::into)
  }
}

impl VisitStore for SqliteStore {
  type Error = crate::Error;

  // ── Ingestion ─────────────────────────────────────────────────────────────

  async fn record_batch(&self, batch: VisitBatch, ctx: RequestContext) -> Result<IngestOutcome> {
    let keys: Vec<String> =
      batch.links.iter().map(|l| link_cache_key(&l.url, &l.name)).collect();

    let outcome = self
      .with_tx(move |pipeline, tx| pipeline.record_batch(tx, &batch, &ctx))
      .await?;

    let caches = self.caches();
    caches.remember_resolution(&outcome.resolution);
    for (key, link) in keys.into_iter().zip(&outcome.links) {
      caches.links.insert(key, link.clone());
    }
    Ok(outcome)
  }

  // ── Devices ───────────────────────────────────────────────────────────────

  async fn resolve_or_create_device(&self, ctx: RequestContext) -> Result<DeviceResolution> {
    let resolution = self
      .with_tx(move |pipeline, tx| tx.scoped(|tx| pipeline.resolve_or_create(tx, &ctx)))
      .await?;
    self.caches().remember_resolution(&resolution);
    Ok(resolution)
  }

  async fn mint_device(&self, ctx: RequestContext) -> Result<DeviceResolution> {
    let resolution = self.with_tx(move |pipeline, tx| pipeline.mint(tx, &ctx)).await?;
    self.caches().remember_resolution(&resolution);
    Ok(resolution)
  }

  async fn bind_device_ip(&self, token: Uuid, ip: String) -> Result<DeviceIp> {
    let device_ip = self.with_tx(move |pipeline, tx| pipeline.bind(tx, token, ip)).await?;
    self.caches().device_ips.insert(device_ip.id, device_ip.clone());
    Ok(device_ip)
  }

  async fn find_device(&self, token: Uuid) -> Result<Option<Device>> {
    if let Some(device) = self.caches().devices.get(&token) {
      return Ok(Some(device));
    }
    let found = self
      .with_tx(move |pipeline, tx| pipeline.devices.find_by_id(tx, &token))
      .await?;
    if let Some(device) = &found {
      self.caches().devices.insert(token, device.clone());
    }
    Ok(found)
  }

  async fn find_device_ip(&self, id: i64) -> Result<Option<DeviceIp>> {
    if let Some(device_ip) = self.caches().device_ips.get(&id) {
      return Ok(Some(device_ip));
    }
    let found = self
      .with_tx(move |pipeline, tx| pipeline.device_ips.find_by_id(tx, &id))
      .await?;
    if let Some(device_ip) = &found {
      self.caches().device_ips.insert(id, device_ip.clone());
    }
    Ok(found)
  }

  // ── Links ─────────────────────────────────────────────────────────────────

  async fn find_or_create_link(&self, url: String, name: String) -> Result<Link> {
    let key = link_cache_key(&url, &name);
    let link = self
      .with_tx(move |pipeline, tx| {
        tx.scoped(|tx| pipeline.find_or_create_link(tx, &url, &name))
      })
      .await?;
    self.caches().links.insert(key, link.clone());
    Ok(link)
  }

  async fn find_link_by_url(&self, url: String, name: String) -> Result<Option<Link>> {
    let key = link_cache_key(&url, &name);
    if let Some(link) = self.caches().links.get(&key) {
      return Ok(Some(link));
    }
    let found = self
      .with_tx(move |pipeline, tx| {
        let natural = NewLink { url: pipeline.site.canonicalize(&url)?, name };
        pipeline.links.find_by_natural_key(tx, &natural)
      })
      .await?;
    if let Some(link) = &found {
      self.caches().links.insert(key, link.clone());
    }
    Ok(found)
  }

  async fn find_link(&self, id: i64) -> Result<Option<Link>> {
    self.with_tx(move |pipeline, tx| pipeline.links.find_by_id(tx, &id)).await
  }

  // ── Visits ────────────────────────────────────────────────────────────────

  async fn create_visit(
    &self,
    link_id: i64,
    device_ip_id: i64,
    screen: ScreenSize,
    position: Position,
  ) -> Result<Visit> {
    self
      .with_tx(move |pipeline, tx| {
        pipeline.create_visit(tx, NewVisit { link_id, device_ip_id, screen, position })
      })
      .await
  }

  async fn find_visit(&self, id: i64) -> Result<Option<Visit>> {
    self.with_tx(move |pipeline, tx| pipeline.visits.find_by_id(tx, &id)).await
  }

  async fn purge_older_than(&self, days: u32) -> Result<u64> {
    let Some(cutoff) =
      TimeDelta::try_days(i64::from(days)).and_then(|age| now().checked_sub_signed(age))
    else {
      tracing::debug!(days, "retention window reaches before the earliest timestamp");
      return Ok(0);
    };
    let purged = self.with_tx(move |pipeline, tx| pipeline.purge_before(tx, cutoff)).await?;
    if purged > 0 {
      self.caches().invalidate_reports();
    }
    tracing::debug!(purged, days, "purged expired visits");
    Ok(purged)
  }

  // ── Reports ───────────────────────────────────────────────────────────────

  async fn get_reports(&self, filter: ReportFilter) -> Result<Vec<ReportRow>> {
    let key = filter.cache_key()?;
    if let Some(rows) = self.caches().reports.get(&key) {
      return Ok(rows);
    }
    if filter.start_date > filter.end_date {
      return Ok(Vec::new());
    }

    let rows = self
      .with_tx(move |pipeline, tx| report_rows(&pipeline.site, tx.session(), &filter))
      .await?;
    self.caches().reports.insert(key, rows.clone());
    Ok(rows)
  }

  async fn available_screens(&self) -> Result<Vec<ScreenSize>> {
    if let Some(screens) = self.caches().screens.get(&()) {
      return Ok(screens);
    }
    let screens = self
      .with_tx(|_, tx| {
        let mut stmt = tx
          .session()
          .prepare_cached("SELECT DISTINCT height, width FROM visits ORDER BY height, width")?;
        let rows = stmt
          .query_map([], |r| Ok(ScreenSize { height: r.get(0)?, width: r.get(1)? }))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    self.caches().screens.insert((), screens.clone());
    Ok(screens)
  }

  async fn available_hosts(&self) -> Result<Vec<String>> {
    if let Some(hosts) = self.caches().hosts.get(&()) {
      return Ok(hosts);
    }
    let hosts = self
      .with_tx(|pipeline, tx| {
        let own = pipeline.site.host().to_owned();
        let mut stmt = tx
          .session()
          .prepare_cached("SELECT DISTINCT IFNULL(hostname, ?1) AS h FROM links ORDER BY h")?;
        let rows = stmt
          .query_map([own], |r| r.get::<_, String>(0))?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    self.caches().hosts.insert((), hosts.clone());
    Ok(hosts)
  }
}

// ─── Report query ────────────────────────────────────────────────────────────

fn report_rows(
  site: &Site,
  conn: &rusqlite::Connection,
  filter: &ReportFilter,
) -> Result<Vec<ReportRow>> {
  let mut sql = String::from(
    "SELECT l.scheme, l.hostname, l.path, l.query, l.fragment, l.name,
            v.width, v.height, substr(v.created_at, 1, 10) AS day, COUNT(*)
     FROM visits v
     JOIN links l ON l.id = v.link_id
     WHERE substr(v.created_at, 1, 10) BETWEEN ?1 AND ?2",
  );
  let mut params: Vec<Box<dyn rusqlite::ToSql>> =
    vec![Box::new(encode_date(filter.start_date)), Box::new(encode_date(filter.end_date))];

  match filter.host.as_deref().map(str::trim).filter(|h| !h.is_empty()) {
    Some(host) if site.is_own_host(host) => sql.push_str(" AND l.hostname IS NULL"),
    Some(host) => {
      params.push(Box::new(host.to_ascii_lowercase()));
      sql.push_str(&format!(" AND l.hostname = ?{}", params.len()));
    }
    None => {}
  }
  if let Some(screen) = filter.screen {
    params.push(Box::new(screen.height));
    params.push(Box::new(screen.width));
    sql.push_str(&format!(
      " AND v.height = ?{} AND v.width = ?{}",
      params.len() - 1,
      params.len()
    ));
  }
  sql.push_str(" GROUP BY l.id, v.width, v.height, day");

  let mut stmt = conn.prepare(&sql)?;
  let raw = stmt
    .query_map(rusqlite::params_from_iter(params.iter()), |r| {
      Ok((
        CanonicalUrl {
          scheme:   r.get(0)?,
          host:     r.get(1)?,
          path:     r.get(2)?,
          query:    r.get(3)?,
          fragment: r.get(4)?,
        },
        r.get::<_, String>(5)?,
        r.get::<_, u32>(6)?,
        r.get::<_, u32>(7)?,
        r.get::<_, String>(8)?,
        r.get::<_, i64>(9)?,
      ))
    })?
    .collect::<rusqlite::Result<Vec<_>>>()?;

  let mut rows = raw
    .into_iter()
    .map(|(url, name, width, height, day, visits)| {
      Ok(ReportRow {
        link_url: site.render(&url),
        name,
        width,
        height,
        date: decode_date(&day)?,
        visits: u64::try_from(visits).unwrap_or_default(),
      })
    })
    .collect::<Result<Vec<_>>>()?;

  rows.sort_by(|a, b| {
    a.date
      .cmp(&b.date)
      .then_with(|| a.link_url.cmp(&b.link_url))
      .then_with(|| a.name.cmp(&b.name))
      .then_with(|| (a.height, a.width).cmp(&(b.height, b.width)))
  });
  Ok(rows)
}
