use chrono::{DateTime, Utc};
use rusqlite::OptionalExtension as _;
use sightline_core::{
  repository::Repository,
  visit::{NewVisit, Visit},
};

use super::Tx;
use crate::{
  Error, Result, SqliteSession,
  encode::{RawVisit, encode_dt, now},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct VisitRepository;

impl VisitRepository {
  /// Read every visit of `link_id` so the insert that follows happens after
  /// them under the same lock.
  ///
  /// The write lock itself is taken by `BEGIN IMMEDIATE` on the outer
  /// transaction; this read pins the link's visit set inside it.
  pub fn lock_link_visits(&self, session: &rusqlite::Connection, link_id: i64) -> Result<()> {
    let mut stmt = session.prepare_cached("SELECT id FROM visits WHERE link_id = ?1")?;
    let mut rows = stmt.query([link_id])?;
    while rows.next()?.is_some() {}
    Ok(())
  }

  /// Delete visits created strictly before `cutoff`. Returns the row count.
  pub fn purge_before(&self, tx: &mut Tx<'_, '_>, cutoff: DateTime<Utc>) -> Result<u64> {
    let deleted = tx
      .session()
      .prepare_cached("DELETE FROM visits WHERE created_at < ?1")?
      .execute([encode_dt(cutoff)])?;
    Ok(deleted as u64)
  }
}

impl<'c> Repository<SqliteSession<'c>> for VisitRepository {
  type Id = i64;
  type Record = Visit;
  type New = NewVisit;
  type Error = Error;

  fn find_by_id(&self, tx: &mut Tx<'_, 'c>, id: &i64) -> Result<Option<Visit>> {
    let raw = tx
      .session()
      .prepare_cached(&format!("SELECT {} FROM visits WHERE id = ?1", RawVisit::COLUMNS))?
      .query_row([id], RawVisit::from_row)
      .optional()?;
    raw.map(RawVisit::into_visit).transpose()
  }

  fn create(&self, tx: &mut Tx<'_, 'c>, new: NewVisit) -> Result<Visit> {
    let created_at = now();
    let position = new.position.pack();
    let session = tx.session();
    session
      .prepare_cached(
        "INSERT INTO visits (link_id, device_ip_id, height, width, position_xy, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      )?
      .execute(rusqlite::params![
        new.link_id,
        new.device_ip_id,
        new.screen.height,
        new.screen.width,
        position,
        encode_dt(created_at),
      ])?;
    Ok(Visit {
      id: session.last_insert_rowid(),
      link_id: new.link_id,
      device_ip_id: new.device_ip_id,
      height: new.screen.height,
      width: new.screen.width,
      position,
      created_at,
    })
  }
}
