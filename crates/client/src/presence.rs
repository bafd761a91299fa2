//! Presence tracking: a mirror of the backend's presence table.
//!
//! Deliberately non-incremental — any event on the presence table triggers
//! a full refetch. Presence cardinality is a friends list, not the global
//! user base, so the refetch is cheap and the logic stays trivially
//! correct.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use lifeflow_core::collection::SnapshotOrder;
use lifeflow_core::presence::PresenceMap;
use lifeflow_core::row::TableName;

use crate::retry::Backoff;
use crate::service::DataService;

/// Upper bound on one presence refetch. Well above any friends list.
const PRESENCE_FETCH_LIMIT: usize = 1000;

/// Handle to the presence mirror. Dropping stops the task; [`close`]
/// stops it and waits.
///
/// [`close`]: PresenceTracker::close
pub struct PresenceTracker {
    map: watch::Receiver<PresenceMap>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl PresenceTracker {
    pub fn spawn(service: Arc<dyn DataService>, table: impl Into<TableName>) -> Self {
        let (map_tx, map) = watch::channel(PresenceMap::default());
        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let table = table.into();

        let task = tokio::spawn(run(service, table, map_tx, shutdown_rx));

        Self {
            map,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    pub fn watch(&self) -> watch::Receiver<PresenceMap> {
        self.map.clone()
    }

    pub fn current(&self) -> PresenceMap {
        self.map.borrow().clone()
    }

    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for PresenceTracker {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run(
    service: Arc<dyn DataService>,
    table: TableName,
    map_tx: watch::Sender<PresenceMap>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let mut backoff = Backoff::default();

    loop {
        let feed = tokio::select! {
            _ = &mut shutdown => return,
            result = service.subscribe(&table, None) => result,
        };
        let mut feed = match feed {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!(table = %table, %err, "presence subscribe failed");
                match backoff.next_delay() {
                    Some(delay) => {
                        tokio::select! {
                            _ = &mut shutdown => return,
                            _ = tokio::time::sleep(delay) => continue,
                        }
                    }
                    None => {
                        // Degraded: keep the last map, wait for shutdown.
                        tracing::warn!(table = %table, "presence tracker degraded");
                        let _ = (&mut shutdown).await;
                        return;
                    }
                }
            }
        };

        refetch(service.as_ref(), &table, &map_tx).await;
        let connected_at = Instant::now();

        loop {
            let item = tokio::select! {
                _ = &mut shutdown => return,
                item = feed.next() => item,
            };
            match item {
                // Any change at all invalidates the whole map.
                Some(Ok(_)) => {
                    refetch(service.as_ref(), &table, &map_tx).await;
                }
                Some(Err(err)) => {
                    tracing::warn!(table = %table, %err, "presence feed error");
                    break;
                }
                None => {
                    tracing::warn!(table = %table, "presence feed ended");
                    break;
                }
            }
        }

        // A feed that held for the stability window refills the retry
        // budget; a flapping one keeps spending it.
        backoff.connection_ended(connected_at.elapsed());
        match backoff.next_delay() {
            Some(delay) => {
                tokio::select! {
                    _ = &mut shutdown => return,
                    _ = tokio::time::sleep(delay) => {}
                }
            }
            None => {
                tracing::warn!(table = %table, "presence tracker degraded");
                let _ = (&mut shutdown).await;
                return;
            }
        }
    }
}

/// Rebuild the map from a fresh snapshot. A failed fetch keeps the last
/// map; presence is advisory and must never error a view.
async fn refetch(
    service: &dyn DataService,
    table: &TableName,
    map_tx: &watch::Sender<PresenceMap>,
) {
    match service
        .snapshot(table, None, SnapshotOrder::CreatedAsc, PRESENCE_FETCH_LIMIT)
        .await
    {
        Ok(rows) => {
            let _ = map_tx.send(PresenceMap::from_rows(&rows));
        }
        Err(err) => {
            tracing::warn!(table = %table, %err, "presence refetch failed, keeping last map");
        }
    }
}
