use rusqlite::OptionalExtension as _;
use sightline_core::{
  device::{Device, DeviceIp, NewDevice, NewDeviceIp, mint_token},
  repository::Repository,
};
use uuid::Uuid;

use super::Tx;
use crate::{
  Error, Result, SqliteSession,
  encode::{RawDevice, RawDeviceIp, encode_dt, encode_uuid, now},
};

// ─── Devices ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceRepository;

impl<'c> Repository<SqliteSession<'c>> for DeviceRepository {
  type Id = Uuid;
  type Record = Device;
  type New = NewDevice;
  type Error = Error;

  fn find_by_id(&self, tx: &mut Tx<'_, 'c>, token: &Uuid) -> Result<Option<Device>> {
    let raw = tx
      .session()
      .prepare_cached(&format!("SELECT {} FROM devices WHERE token = ?1", RawDevice::COLUMNS))?
      .query_row([encode_uuid(*token)], RawDevice::from_row)
      .optional()?;
    raw.map(RawDevice::into_device).transpose()
  }

  /// Insert a device under a freshly minted token.
  fn create(&self, tx: &mut Tx<'_, 'c>, new: NewDevice) -> Result<Device> {
    let device = Device {
      token:      mint_token(),
      user_id:    new.user_id,
      user_agent: new.user_agent,
      created_at: now(),
    };
    tx.session()
      .prepare_cached(
        "INSERT INTO devices (token, user_id, user_agent, created_at) VALUES (?1, ?2, ?3, ?4)",
      )?
      .execute(rusqlite::params![
        encode_uuid(device.token),
        device.user_id,
        device.user_agent,
        encode_dt(device.created_at),
      ])
      .map_err(Error::from_insert)?;
    Ok(device)
  }
}

// ─── Device IPs ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
pub struct DeviceIpRepository;

impl<'c> Repository<SqliteSession<'c>> for DeviceIpRepository {
  type Id = i64;
  type Record = DeviceIp;
  type New = NewDeviceIp;
  type Error = Error;

  fn find_by_id(&self, tx: &mut Tx<'_, 'c>, id: &i64) -> Result<Option<DeviceIp>> {
    let raw = tx
      .session()
      .prepare_cached(&format!("SELECT {} FROM device_ips WHERE id = ?1", RawDeviceIp::COLUMNS))?
      .query_row([id], RawDeviceIp::from_row)
      .optional()?;
    raw.map(RawDeviceIp::into_device_ip).transpose()
  }

  /// Always appends a new binding, even for an IP seen before.
  fn create(&self, tx: &mut Tx<'_, 'c>, new: NewDeviceIp) -> Result<DeviceIp> {
    let created_at = now();
    let session = tx.session();
    session
      .prepare_cached(
        "INSERT INTO device_ips (device_token, ip, created_at) VALUES (?1, ?2, ?3)",
      )?
      .execute(rusqlite::params![encode_uuid(new.device_token), new.ip, encode_dt(created_at)])?;
    Ok(DeviceIp {
      id: session.last_insert_rowid(),
      device_token: new.device_token,
      ip: new.ip,
      created_at,
    })
  }
}
