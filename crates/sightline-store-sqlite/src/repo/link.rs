use rusqlite::OptionalExtension as _;
use sightline_core::{
  link::{Link, NewLink},
  repository::Repository,
};

use super::Tx;
use crate::{
  Error, Result, SqliteSession,
  encode::{LINK_COLUMNS, link_from_row},
};

#[derive(Debug, Clone, Copy, Default)]
pub struct LinkRepository;

impl LinkRepository {
  /// Look a link up by its full natural key. Nullable columns compare with
  /// `IS`, so a missing host only matches a missing host.
  ///
  /// Inside an outer transaction this read is made under the write lock.
  pub fn find_by_natural_key(&self, tx: &mut Tx<'_, '_>, key: &NewLink) -> Result<Option<Link>> {
    let url = &key.url;
    Ok(
      tx.session()
        .prepare_cached(&format!(
          "SELECT {LINK_COLUMNS} FROM links
           WHERE scheme = ?1 AND hostname IS ?2 AND path = ?3
             AND query IS ?4 AND fragment IS ?5 AND name = ?6"
        ))?
        .query_row(
          rusqlite::params![url.scheme, url.host, url.path, url.query, url.fragment, key.name],
          link_from_row,
        )
        .optional()?,
    )
  }
}

impl<'c> Repository<SqliteSession<'c>> for LinkRepository {
  type Id = i64;
  type Record = Link;
  type New = NewLink;
  type Error = Error;

  fn find_by_id(&self, tx: &mut Tx<'_, 'c>, id: &i64) -> Result<Option<Link>> {
    Ok(
      tx.session()
        .prepare_cached(&format!("SELECT {LINK_COLUMNS} FROM links WHERE id = ?1"))?
        .query_row([id], link_from_row)
        .optional()?,
    )
  }

  /// Insert a link. A row with the same natural key fails with
  /// [`Error::DuplicateKey`].
  fn create(&self, tx: &mut Tx<'_, 'c>, new: NewLink) -> Result<Link> {
    let session = tx.session();
    let url = &new.url;
    session
      .prepare_cached(
        "INSERT INTO links (scheme, hostname, path, query, fragment, name)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      )?
      .execute(rusqlite::params![url.scheme, url.host, url.path, url.query, url.fragment, new.name])
      .map_err(Error::from_insert)?;
    Ok(Link { id: session.last_insert_rowid(), url: new.url, name: new.name })
  }
}
