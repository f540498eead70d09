//! Periodic deletion of expired visits.

use std::{sync::Arc, time::Duration};

use sightline_core::store::VisitStore;
use tokio::{task::JoinHandle, time::interval};

use crate::RetentionConfig;

/// Delete visits older than `expiry_days` once, logging the outcome.
pub async fn sweep_once<S: VisitStore>(store: &S, expiry_days: u32) -> Result<u64, S::Error> {
  let purged = store.purge_older_than(expiry_days).await?;
  tracing::info!(purged, expiry_days, "retention sweep finished");
  Ok(purged)
}

/// Spawn the sweep loop. The first sweep runs immediately, then every
/// `interval_secs`. Failures are logged and retried on the next tick.
pub fn spawn<S>(store: Arc<S>, config: RetentionConfig) -> JoinHandle<()>
where
  S: VisitStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = interval(Duration::from_secs(config.interval_secs.max(1)));
    loop {
      ticker.tick().await;
      if let Err(e) = sweep_once(store.as_ref(), config.expiry_days).await {
        tracing::warn!(error = %e, "retention sweep failed");
      }
    }
  })
}

#[cfg(test)]
mod tests {
  use sightline_core::{
    ingest::{LinkObservation, RequestContext, VisitBatch},
    link::Site,
  };
  use sightline_store_sqlite::{SqliteStore, StoreOptions};

  use super::*;

  async fn store_with_visit() -> SqliteStore {
    let store = SqliteStore::open_in_memory(StoreOptions::new(Site::new("https://blog.test/").unwrap()))
      .await
      .unwrap();
    let batch = VisitBatch {
      links:  vec![LinkObservation { url: "https://example.com/".into(), name: "E".into(), x: 0.0, y: 0.0 }],
      width:  800,
      height: 600,
    };
    store.record_batch(batch, RequestContext::default()).await.unwrap();
    store
  }

  #[tokio::test]
  async fn sweep_keeps_fresh_visits() {
    let store = store_with_visit().await;
    assert_eq!(sweep_once(&store, 7).await.unwrap(), 0);
    assert_eq!(store.available_screens().await.unwrap().len(), 1);
  }

  #[tokio::test]
  async fn spawned_sweep_runs_immediately() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("visits.db");
    let site = Site::new("https://blog.test/").unwrap();
    let store = Arc::new(SqliteStore::open(&path, StoreOptions::new(site)).await.unwrap());
    let batch = VisitBatch {
      links:  vec![
        LinkObservation { url: "https://example.com/old".into(), name: "O".into(), x: 0.0, y: 0.0 },
        LinkObservation { url: "https://example.com/new".into(), name: "N".into(), x: 0.0, y: 0.0 },
      ],
      width:  800,
      height: 600,
    };
    let outcome = store.record_batch(batch, RequestContext::default()).await.unwrap();
    let (old, fresh) = (outcome.visits[0].id, outcome.visits[1].id);

    let raw = rusqlite::Connection::open(&path).unwrap();
    raw
      .execute("UPDATE visits SET created_at = '2000-01-01T00:00:00.000000Z' WHERE id = ?1", [old])
      .unwrap();
    drop(raw);

    let handle = spawn(store.clone(), RetentionConfig { interval_secs: 3600, expiry_days: 7 });
    let mut swept = false;
    for _ in 0..100 {
      if store.find_visit(old).await.unwrap().is_none() {
        swept = true;
        break;
      }
      tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(swept, "first tick did not purge the expired visit");
    assert!(store.find_visit(fresh).await.unwrap().is_some());
    assert!(!handle.is_finished());
    handle.abort();
  }
}
