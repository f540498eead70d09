//! Nested transactions over a single connection.
//!
//! A [`TransactionContext`] tracks whether a transaction is open on its
//! session and how many savepoints deep the current unit of work is. The
//! outermost `begin` starts a real transaction; every nested `begin` issues a
//! savepoint instead, so an inner operation can be undone on its own without
//! touching the work around it.
//!
//! The context is request-scoped: each unit of work creates one over its own
//! connection and threads it through every step by `&mut`.

use std::fmt;

// ─── Statements ──────────────────────────────────────────────────────────────

/// Transaction-control statements a [`Session`] must be able to execute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatement {
  Begin,
  Savepoint(u32),
  RollbackTo(u32),
  Commit,
  Rollback,
}

impl fmt::Display for TxStatement {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Begin => f.write_str("START TRANSACTION"),
      Self::Savepoint(n) => write!(f, "SAVEPOINT pt_{n}"),
      Self::RollbackTo(n) => write!(f, "ROLLBACK TO SAVEPOINT pt_{n}"),
      Self::Commit => f.write_str("COMMIT"),
      Self::Rollback => f.write_str("ROLLBACK"),
    }
  }
}

/// A connection that can execute transaction-control statements.
///
/// Backends translate [`TxStatement`] into their own dialect; the standard
/// SQL spelling is available through `Display`.
pub trait Session {
  type Error: std::error::Error;

  fn execute_control(&self, statement: TxStatement) -> Result<(), Self::Error>;
}

// ─── Context ─────────────────────────────────────────────────────────────────

pub struct TransactionContext<'c, S: Session> {
  session:         &'c S,
  open:            bool,
  depth:           u32,
  rollback_marked: bool,
}

impl<'c, S: Session> TransactionContext<'c, S> {
  pub fn new(session: &'c S) -> Self {
    Self { session, open: false, depth: 0, rollback_marked: false }
  }

  pub fn session(&self) -> &'c S { self.session }

  pub fn is_open(&self) -> bool { self.open }

  /// Number of savepoints above the outer transaction.
  pub fn depth(&self) -> u32 { self.depth }

  pub fn is_marked_for_rollback(&self) -> bool { self.rollback_marked }

  /// Start a transaction, or a savepoint if one is already open.
  pub fn begin(&mut self) -> Result<(), S::Error> {
    if self.open {
      self.session.execute_control(TxStatement::Savepoint(self.depth + 1))?;
      self.depth += 1;
    } else {
      self.session.execute_control(TxStatement::Begin)?;
      self.open = true;
      self.depth = 0;
      self.rollback_marked = false;
    }
    Ok(())
  }

  /// Commit the outer transaction, or leave the current savepoint in place
  /// for the outer commit to finalise.
  pub fn commit(&mut self) -> Result<(), S::Error> {
    if !self.open {
      return Ok(());
    }
    if self.depth == 0 {
      self.session.execute_control(TxStatement::Commit)?;
      self.open = false;
      self.rollback_marked = false;
    } else {
      self.depth -= 1;
    }
    Ok(())
  }

  /// Flag the open transaction so the outermost
  /// [`commit_or_rollback`](Self::commit_or_rollback) rolls it back.
  pub fn mark_for_rollback(&mut self) {
    if self.open {
      self.rollback_marked = true;
    }
  }

  /// Roll back if marked, otherwise commit.
  ///
  /// The mark survives nested levels; only the outermost rollback clears it,
  /// so one inner mark aborts the whole outer unit.
  pub fn commit_or_rollback(&mut self) -> Result<(), S::Error> {
    if self.rollback_marked { self.rollback() } else { self.commit() }
  }

  /// Undo the innermost unit of work: the savepoint if nested, otherwise the
  /// whole transaction.
  pub fn rollback(&mut self) -> Result<(), S::Error> {
    if !self.open {
      return Ok(());
    }
    if self.depth == 0 {
      self.open = false;
      self.rollback_marked = false;
      self.session.execute_control(TxStatement::Rollback)
    } else {
      let savepoint = self.depth;
      self.depth -= 1;
      self.session.execute_control(TxStatement::RollbackTo(savepoint))
    }
  }

  /// Run `f` as one unit of work.
  ///
  /// On `Ok` the unit is committed (or rolled back, if something marked it);
  /// on `Err` it is rolled back before the error is returned.
  pub fn scoped<T, E, F>(&mut self, f: F) -> Result<T, E>
  where
    E: From<S::Error> + From<crate::Error>,
    F: FnOnce(&mut Self) -> Result<T, E>,
  {
    self.scoped_with_lock(|_| Ok(()), f)
  }

  /// Like [`scoped`](Self::scoped), but run `lock` right after `begin` so the
  /// unit holds its locks before doing any work.
  pub fn scoped_with_lock<T, E, L, F>(&mut self, lock: L, f: F) -> Result<T, E>
  where
    E: From<S::Error> + From<crate::Error>,
    L: FnOnce(&S) -> Result<(), E>,
    F: FnOnce(&mut Self) -> Result<T, E>,
  {
    self.begin()?;

    let result = lock(self.session).and_then(|()| f(self));

    match result {
      Ok(value) => {
        let marked = self.rollback_marked;
        self.commit_or_rollback()?;
        if marked {
          return Err(crate::Error::RolledBack.into());
        }
        Ok(value)
      }
      Err(err) => {
        if let Err(rollback_err) = self.rollback() {
          tracing::warn!(error = %rollback_err, "rollback after failed unit of work also failed");
        }
        Err(err)
      }
    }
  }
}

impl<S: Session> Drop for TransactionContext<'_, S> {
  fn drop(&mut self) {
    if self.open {
      tracing::warn!(depth = self.depth, "transaction dropped while open; rolling back");
      self.depth = 0;
      if let Err(err) = self.rollback() {
        tracing::warn!(error = %err, "rollback on drop failed");
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use std::cell::RefCell;

  use super::*;

  #[derive(Debug, thiserror::Error)]
  #[error("refused {0}")]
  struct Refused(TxStatement);

  #[derive(Debug, thiserror::Error)]
  enum TestError {
    #[error(transparent)]
    Session(#[from] Refused),
    #[error(transparent)]
    Core(#[from] crate::Error),
    #[error("step failed")]
    Step,
  }

  #[derive(Default)]
  struct Recorder {
    log:     RefCell<Vec<TxStatement>>,
    refuse:  Option<TxStatement>,
  }

  impl Recorder {
    fn log(&self) -> Vec<TxStatement> { self.log.borrow().clone() }
  }

  impl Session for Recorder {
    type Error = Refused;

    fn execute_control(&self, statement: TxStatement) -> Result<(), Refused> {
      if self.refuse == Some(statement) {
        return Err(Refused(statement));
      }
      self.log.borrow_mut().push(statement);
      Ok(())
    }
  }

  use TxStatement::*;

  #[test]
  fn nested_commit_issues_one_savepoint_and_one_commit() {
    let rec = Recorder::default();
    let mut tx = TransactionContext::new(&rec);
    tx.begin().unwrap();
    tx.begin().unwrap();
    assert_eq!(tx.depth(), 1);
    tx.commit().unwrap();
    tx.commit().unwrap();
    assert!(!tx.is_open());
    assert_eq!(rec.log(), vec![Begin, Savepoint(1), Commit]);
  }

  #[test]
  fn inner_mark_rolls_back_the_whole_outer_unit() {
    let rec = Recorder::default();
    let mut tx = TransactionContext::new(&rec);
    tx.begin().unwrap();
    tx.begin().unwrap();
    tx.mark_for_rollback();
    tx.commit_or_rollback().unwrap();
    assert!(tx.is_marked_for_rollback(), "mark must survive the inner level");
    tx.commit_or_rollback().unwrap();

    let log = rec.log();
    assert_eq!(log.last(), Some(&Rollback));
    assert!(!log.contains(&Commit));
    assert!(!tx.is_open());
    assert!(!tx.is_marked_for_rollback());
  }

  #[test]
  fn nested_rollback_only_undoes_the_savepoint() {
    let rec = Recorder::default();
    let mut tx = TransactionContext::new(&rec);
    tx.begin().unwrap();
    tx.begin().unwrap();
    tx.begin().unwrap();
    tx.rollback().unwrap();
    assert_eq!(tx.depth(), 1);
    tx.commit().unwrap();
    tx.commit().unwrap();
    assert_eq!(rec.log(), vec![Begin, Savepoint(1), Savepoint(2), RollbackTo(2), Commit]);
  }

  #[test]
  fn mark_without_open_transaction_is_ignored() {
    let rec = Recorder::default();
    let mut tx = TransactionContext::new(&rec);
    tx.mark_for_rollback();
    assert!(!tx.is_marked_for_rollback());
    tx.commit_or_rollback().unwrap();
    assert!(rec.log().is_empty());
  }

  #[test]
  fn scoped_error_in_nested_unit_rolls_back_to_savepoint() {
    let rec = Recorder::default();
    let mut tx = TransactionContext::new(&rec);
    let outcome: Result<u8, TestError> = tx.scoped(|tx| {
      let inner: Result<(), TestError> = tx.scoped(|_| Err(TestError::Step));
      assert!(matches!(inner, Err(TestError::Step)));
      Ok(7)
    });
    assert_eq!(outcome.unwrap(), 7);
    assert_eq!(rec.log(), vec![Begin, Savepoint(1), RollbackTo(1), Commit]);
  }

  #[test]
  fn scoped_marked_unit_reports_rolled_back() {
    let rec = Recorder::default();
    let mut tx = TransactionContext::new(&rec);
    let outcome: Result<(), TestError> = tx.scoped(|tx| {
      tx.scoped(|tx| {
        tx.mark_for_rollback();
        Ok::<_, TestError>(())
      })
    });
    assert!(matches!(outcome, Err(TestError::Core(crate::Error::RolledBack))));
    assert_eq!(rec.log().last(), Some(&Rollback));
    assert!(!rec.log().contains(&Commit));
  }

  #[test]
  fn scoped_lock_failure_rolls_back_before_work_runs() {
    let rec = Recorder::default();
    let mut tx = TransactionContext::new(&rec);
    let mut ran = false;
    let outcome: Result<(), TestError> =
      tx.scoped_with_lock(|_| Err(TestError::Step), |_| {
        ran = true;
        Ok(())
      });
    assert!(outcome.is_err());
    assert!(!ran);
    assert_eq!(rec.log(), vec![Begin, Rollback]);
  }

  #[test]
  fn failed_begin_leaves_context_closed() {
    let rec = Recorder { refuse: Some(Begin), ..Default::default() };
    let mut tx = TransactionContext::new(&rec);
    assert!(tx.begin().is_err());
    assert!(!tx.is_open());
  }

  #[test]
  fn drop_rolls_back_open_transaction() {
    let rec = Recorder::default();
    {
      let mut tx = TransactionContext::new(&rec);
      tx.begin().unwrap();
      tx.begin().unwrap();
    }
    assert_eq!(rec.log(), vec![Begin, Savepoint(1), Rollback]);
  }

  #[test]
  fn statements_render_as_standard_sql() {
    assert_eq!(Begin.to_string(), "START TRANSACTION");
    assert_eq!(Savepoint(3).to_string(), "SAVEPOINT pt_3");
    assert_eq!(RollbackTo(3).to_string(), "ROLLBACK TO SAVEPOINT pt_3");
  }
}
