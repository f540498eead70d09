//! Per-entity [`Repository`](sightline_core::repository::Repository)
//! implementations over a [`SqliteSession`](crate::SqliteSession).

mod device;
mod link;
mod visit;

pub use device::{DeviceIpRepository, DeviceRepository};
pub use link::LinkRepository;
pub use visit::VisitRepository;

use sightline_core::transaction::TransactionContext;

use crate::SqliteSession;

/// Shorthand for the context every repository call receives.
pub type Tx<'t, 'c> = TransactionContext<'t, SqliteSession<'c>>;
