//! Per-entity persistence over a transaction context.

use crate::transaction::{Session, TransactionContext};

/// Uniform lookup and insertion for one entity type.
///
/// Every call takes the caller's [`TransactionContext`] so it runs inside the
/// caller's unit of work. Repositories never commit on their own.
pub trait Repository<S: Session> {
  type Id: ?Sized;
  type Record;
  type New;
  type Error: From<S::Error>;

  fn find_by_id(
    &self,
    tx: &mut TransactionContext<'_, S>,
    id: &Self::Id,
  ) -> Result<Option<Self::Record>, Self::Error>;

  fn create(
    &self,
    tx: &mut TransactionContext<'_, S>,
    new: Self::New,
  ) -> Result<Self::Record, Self::Error>;
}
