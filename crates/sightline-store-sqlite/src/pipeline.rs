//! The synchronous unit-of-work logic behind every mutating store call.
//!
//! A [`Pipeline`] runs on the connection thread with a borrowed
//! [`TransactionContext`]. It composes the per-entity repositories and never
//! touches the caches except to read devices; cache writes happen in the async
//! layer once the outer transaction has committed.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use sightline_core::{
  device::{Device, DeviceIp, DeviceResolution, NewDevice, NewDeviceIp, parse_token},
  ingest::{DevicePolicy, IngestOutcome, IngestPolicy, RequestContext, VisitBatch},
  link::{Link, NewLink, Site},
  repository::Repository as _,
  visit::{NewVisit, Visit},
};
use uuid::Uuid;

use crate::{
  Error, Result,
  repo::{DeviceIpRepository, DeviceRepository, LinkRepository, Tx, VisitRepository},
  store::Caches,
};

#[derive(Clone)]
pub(crate) struct Pipeline {
  pub site:       Arc<Site>,
  pub policy:     IngestPolicy,
  pub caches:     Arc<Caches>,
  pub devices:    DeviceRepository,
  pub device_ips: DeviceIpRepository,
  pub links:      LinkRepository,
  pub visits:     VisitRepository,
}

impl Pipeline {
  pub fn new(site: Arc<Site>, policy: IngestPolicy, caches: Arc<Caches>) -> Self {
    Self {
      site,
      policy,
      caches,
      devices: DeviceRepository,
      device_ips: DeviceIpRepository,
      links: LinkRepository,
      visits: VisitRepository,
    }
  }

  // ── Devices ───────────────────────────────────────────────────────────────

  fn find_device(&self, tx: &mut Tx<'_, '_>, token: Uuid) -> Result<Option<Device>> {
    if let Some(device) = self.caches.devices.get(&token) {
      return Ok(Some(device));
    }
    self.devices.find_by_id(tx, &token)
  }

  /// Create a device and its first IP binding as one unit.
  pub fn mint(&self, tx: &mut Tx<'_, '_>, ctx: &RequestContext) -> Result<DeviceResolution> {
    tx.scoped(|tx| {
      let device = self.devices.create(tx, NewDevice {
        user_id:    ctx.user_id,
        user_agent: ctx.user_agent.clone(),
      })?;
      let device_ip = self.device_ips.create(tx, NewDeviceIp {
        device_token: device.token,
        ip:           ctx.ip.clone(),
      })?;
      tracing::debug!(token = %device.token, "minted device");
      Ok(DeviceResolution { device, device_ip, is_new: true })
    })
  }

  /// Resolve the presented token and bind the request IP.
  ///
  /// No token at all is an unknown-device error; whether to mint in that case
  /// is the caller's decision. A presented token with no stored device follows
  /// the `unknown_token` policy.
  pub fn resolve_or_create(
    &self,
    tx: &mut Tx<'_, '_>,
    ctx: &RequestContext,
  ) -> Result<DeviceResolution> {
    let Some(presented) = ctx.presented_token() else {
      return Err(sightline_core::Error::UnknownDevice.into());
    };

    let device = match parse_token(presented) {
      Some(token) => self.find_device(tx, token)?,
      None => None,
    };

    match device {
      Some(device) => {
        let device_ip = self.device_ips.create(tx, NewDeviceIp {
          device_token: device.token,
          ip:           ctx.ip.clone(),
        })?;
        Ok(DeviceResolution { device, device_ip, is_new: false })
      }
      None => match self.policy.unknown_token {
        DevicePolicy::Mint => {
          tracing::debug!("presented device token is not stored; minting a new one");
          self.mint(tx, ctx)
        }
        DevicePolicy::Reject => Err(sightline_core::Error::UnknownDevice.into()),
      },
    }
  }

  /// Append an IP observation for a stored device.
  pub fn bind(&self, tx: &mut Tx<'_, '_>, token: Uuid, ip: String) -> Result<DeviceIp> {
    tx.scoped(|tx| {
      if self.find_device(tx, token)?.is_none() {
        return Err(sightline_core::Error::UnknownDevice.into());
      }
      self.device_ips.create(tx, NewDeviceIp { device_token: token, ip })
    })
  }

  // ── Links ─────────────────────────────────────────────────────────────────

  /// Find the link for `(raw_url, name)` or create it.
  ///
  /// The lookup runs under the outer transaction's write lock. If the insert
  /// still collides (another writer on a connection that bypassed the lock),
  /// the savepoint is rolled back and the winner's row is read instead.
  pub fn find_or_create_link(&self, tx: &mut Tx<'_, '_>, raw_url: &str, name: &str) -> Result<Link> {
    let key = NewLink { url: self.site.canonicalize(raw_url)?, name: name.to_owned() };

    if let Some(link) = self.links.find_by_natural_key(tx, &key)? {
      return Ok(link);
    }
    self.create_link_or_reread(tx, key)
  }

  /// Insert `key` in its own savepoint. On a duplicate key the savepoint is
  /// rolled back and the existing row is returned instead.
  pub fn create_link_or_reread(&self, tx: &mut Tx<'_, '_>, key: NewLink) -> Result<Link> {
    match tx.scoped(|tx| self.links.create(tx, key.clone())) {
      Err(Error::DuplicateKey(detail)) => {
        tracing::warn!(%detail, "link inserted concurrently; re-reading");
        self.links.find_by_natural_key(tx, &key)?.ok_or(Error::DuplicateKey(detail))
      }
      other => other,
    }
  }

  // ── Visits ────────────────────────────────────────────────────────────────

  /// Record a visit after locking the link's existing visits.
  pub fn create_visit(&self, tx: &mut Tx<'_, '_>, new: NewVisit) -> Result<Visit> {
    let link_id = new.link_id;
    tx.scoped_with_lock(
      |session| self.visits.lock_link_visits(session, link_id),
      |tx| self.visits.create(tx, new),
    )
  }

  pub fn purge_before(&self, tx: &mut Tx<'_, '_>, cutoff: DateTime<Utc>) -> Result<u64> {
    tx.scoped(|tx| self.visits.purge_before(tx, cutoff))
  }

  // ── Ingestion ─────────────────────────────────────────────────────────────

  /// Record a validated batch in one outer transaction.
  pub fn record_batch(
    &self,
    tx: &mut Tx<'_, '_>,
    batch: &VisitBatch,
    ctx: &RequestContext,
  ) -> Result<IngestOutcome> {
    let screen = batch.validate()?;

    tx.scoped(|tx| {
      let resolution = match self.resolve_or_create(tx, ctx) {
        Err(Error::Core(sightline_core::Error::UnknownDevice))
          if ctx.presented_token().is_none()
            && self.policy.first_contact == DevicePolicy::Mint =>
        {
          self.mint(tx, ctx)?
        }
        other => other?,
      };

      let mut links = Vec::with_capacity(batch.links.len());
      let mut visits = Vec::with_capacity(batch.links.len());
      for observation in &batch.links {
        let link = self.find_or_create_link(tx, &observation.url, &observation.name)?;
        let visit = self
          .create_visit(tx, NewVisit {
            link_id:      link.id,
            device_ip_id: resolution.device_ip.id,
            screen,
            position:     observation.position(),
          })
          .map_err(|e| Error::VisitCreation(Box::new(e)))?;
        links.push(link);
        visits.push(visit);
      }

      tracing::debug!(
        token = %resolution.device.token,
        is_new = resolution.is_new,
        visits = visits.len(),
        "recorded batch"
      );
      Ok(IngestOutcome { resolution, links, visits })
    })
  }
}
