//! [`SqliteSession`]: transaction control over a borrowed connection.

use std::ops::Deref;

use sightline_core::transaction::{Session, TxStatement};

/// A borrowed [`rusqlite::Connection`] that speaks the transaction protocol
/// of [`TransactionContext`](sightline_core::transaction::TransactionContext).
///
/// SQLite has no `SELECT ... FOR UPDATE`, so the outer transaction is opened
/// with `BEGIN IMMEDIATE`. That takes the database write lock before the first
/// statement runs: every read inside the transaction is serialized against all
/// other writers until it commits or rolls back.
pub struct SqliteSession<'c>(&'c rusqlite::Connection);

impl<'c> SqliteSession<'c> {
  pub fn new(conn: &'c rusqlite::Connection) -> Self { Self(conn) }
}

impl Deref for SqliteSession<'_> {
  type Target = rusqlite::Connection;

  fn deref(&self) -> &rusqlite::Connection { self.0 }
}

impl Session for SqliteSession<'_> {
  type Error = rusqlite::Error;

  fn execute_control(&self, statement: TxStatement) -> Result<(), rusqlite::Error> {
    match statement {
      TxStatement::Begin => self.0.execute_batch("BEGIN IMMEDIATE"),
      other => self.0.execute_batch(&other.to_string()),
    }
  }
}

#[cfg(test)]
mod tests {
  use sightline_core::transaction::TransactionContext;

  use super::*;

  fn count(conn: &rusqlite::Connection) -> i64 {
    conn.query_row("SELECT COUNT(*) FROM t", [], |r| r.get(0)).unwrap()
  }

  #[test]
  fn savepoint_rollback_keeps_outer_work() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
    let session = SqliteSession::new(&conn);
    let mut tx = TransactionContext::new(&session);

    tx.begin().unwrap();
    conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
    tx.begin().unwrap();
    conn.execute("INSERT INTO t VALUES (2)", []).unwrap();
    tx.rollback().unwrap();
    tx.commit().unwrap();

    assert!(conn.is_autocommit());
    assert_eq!(count(&conn), 1);
  }

  #[test]
  fn inner_mark_discards_everything() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
    let session = SqliteSession::new(&conn);
    let mut tx = TransactionContext::new(&session);

    tx.begin().unwrap();
    conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
    tx.begin().unwrap();
    tx.mark_for_rollback();
    tx.commit_or_rollback().unwrap();
    tx.commit_or_rollback().unwrap();

    assert!(conn.is_autocommit());
    assert_eq!(count(&conn), 0);
  }

  #[test]
  fn dropped_context_leaves_no_open_transaction() {
    let conn = rusqlite::Connection::open_in_memory().unwrap();
    conn.execute_batch("CREATE TABLE t (v INTEGER)").unwrap();
    {
      let session = SqliteSession::new(&conn);
      let mut tx = TransactionContext::new(&session);
      tx.begin().unwrap();
      conn.execute("INSERT INTO t VALUES (1)", []).unwrap();
    }
    assert!(conn.is_autocommit());
    assert_eq!(count(&conn), 0);
  }
}
