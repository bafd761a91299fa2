//! The live query engine: one snapshot read reconciled with one change-feed
//! subscription per (table, filter) pair.
//!
//! Attach order is subscription first, snapshot second. Events delivered
//! while the snapshot is in flight queue in the feed and are replayed after
//! the snapshot lands; replayed inserts for rows the snapshot already
//! contains hit the idempotent-upsert path, so the merge is duplicate-free
//! regardless of how the race falls.
//!
//! A lost feed retries with bounded exponential backoff. Every reconnect
//! re-subscribes and then re-snapshots, so rows changed during the gap are
//! backfilled. The budget refills only after a feed stays up for
//! [`Backoff::STABLE_AFTER`]; a feed that flaps right after every
//! successful snapshot still exhausts it. When the budget is spent the
//! query degrades to the last rendered rows with no live updates; it
//! never crashes the view.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::{oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use uuid::Uuid;

use lifeflow_core::collection::{CollectionOrder, LiveCollection};
use lifeflow_core::row::{Row, TableName};
use lifeflow_filter::Filter;

use crate::retry::Backoff;
use crate::service::{row_matches, DataService};

/// Parameters of one live query. Snapshot order is derived from the
/// collection order and is always explicit at the call site.
#[derive(Debug, Clone)]
pub struct LiveQueryParams {
    pub table: TableName,
    pub filter: Option<Filter>,
    pub order: CollectionOrder,
    pub limit: usize,
}

impl LiveQueryParams {
    pub fn new(table: impl Into<TableName>) -> Self {
        Self {
            table: table.into(),
            filter: None,
            order: CollectionOrder::Arrival,
            limit: 100,
        }
    }

    pub fn with_filter(mut self, filter: Filter) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn with_order(mut self, order: CollectionOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }
}

/// Consumer-visible state of a live query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveStatus {
    /// Initial snapshot in flight.
    Loading,
    /// Snapshot rendered, feed attached.
    Live,
    /// Feed lost, retrying with backoff.
    Reconnecting,
    /// Retry budget spent; snapshot data stays rendered without updates.
    Degraded,
}

/// Handle to a running live query. Dropping it stops the background task;
/// [`LiveQuery::close`] stops it and waits, which is required before
/// opening a replacement subscription for the same logical stream.
pub struct LiveQuery {
    rows: watch::Receiver<Vec<Row>>,
    status: watch::Receiver<LiveStatus>,
    error: watch::Receiver<Option<String>>,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl LiveQuery {
    /// Start a live query against `service`.
    pub fn spawn(service: Arc<dyn DataService>, params: LiveQueryParams) -> Self {
        let (rows_tx, rows) = watch::channel(Vec::new());
        let (status_tx, status) = watch::channel(LiveStatus::Loading);
        let (error_tx, error) = watch::channel(None);
        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let task = tokio::spawn(run(
            service,
            params,
            rows_tx,
            status_tx,
            error_tx,
            shutdown_rx,
        ));

        Self {
            rows,
            status,
            error,
            shutdown: Some(shutdown_tx),
            task: Some(task),
        }
    }

    /// Watch channel carrying the ordered rows.
    pub fn rows(&self) -> watch::Receiver<Vec<Row>> {
        self.rows.clone()
    }

    /// Current rows, cloned out of the watch slot.
    pub fn current_rows(&self) -> Vec<Row> {
        self.rows.borrow().clone()
    }

    pub fn status(&self) -> LiveStatus {
        *self.status.borrow()
    }

    pub fn status_watch(&self) -> watch::Receiver<LiveStatus> {
        self.status.clone()
    }

    /// The `(data, loading)` shape the view layer consumes.
    pub fn loading(&self) -> bool {
        self.status() == LiveStatus::Loading
    }

    /// Most recent recoverable error, if any. Never thrown into the render
    /// path.
    pub fn last_error(&self) -> Option<String> {
        self.error.borrow().clone()
    }

    /// Stop the query and wait for the background task to finish. After
    /// this returns, no listener for this subscription is alive, so a
    /// replacement for the same (table, filter) can be opened without
    /// double-mutation.
    pub async fn close(mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }
}

impl Drop for LiveQuery {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

enum Exit {
    Shutdown,
}

async fn run(
    service: Arc<dyn DataService>,
    params: LiveQueryParams,
    rows_tx: watch::Sender<Vec<Row>>,
    status_tx: watch::Sender<LiveStatus>,
    error_tx: watch::Sender<Option<String>>,
    mut shutdown: oneshot::Receiver<()>,
) {
    let sub_id = Uuid::new_v4();
    let mut backoff = Backoff::default();
    let mut attached_before = false;

    tracing::debug!(sub = %sub_id, table = %params.table, "live query starting");

    loop {
        // Feed first, snapshot second: see module docs.
        let feed = tokio::select! {
            _ = &mut shutdown => return,
            result = service.subscribe(&params.table, params.filter.as_ref()) => result,
        };
        let mut feed = match feed {
            Ok(feed) => feed,
            Err(err) => {
                tracing::warn!(sub = %sub_id, table = %params.table, %err, "subscribe failed");
                let _ = error_tx.send(Some(err.to_string()));
                match wait_before_retry(&mut backoff, &status_tx, &mut shutdown).await {
                    Ok(()) => continue,
                    Err(Exit::Shutdown) => return,
                }
            }
        };

        if !attached_before {
            let _ = status_tx.send(LiveStatus::Loading);
        }

        let snapshot = tokio::select! {
            _ = &mut shutdown => return,
            result = service.snapshot(
                &params.table,
                params.filter.as_ref(),
                params.order.snapshot_order(),
                params.limit,
            ) => result,
        };

        let mut collection = match snapshot {
            Ok(rows) => {
                let _ = error_tx.send(None);
                LiveCollection::from_snapshot(rows, params.order)
            }
            Err(err) if attached_before && err.is_retryable() => {
                // Reconnect backfill failed; keep the stale rows on screen
                // and try the whole attach again.
                tracing::warn!(sub = %sub_id, table = %params.table, %err, "re-snapshot failed");
                let _ = error_tx.send(Some(err.to_string()));
                match wait_before_retry(&mut backoff, &status_tx, &mut shutdown).await {
                    Ok(()) => continue,
                    Err(Exit::Shutdown) => return,
                }
            }
            Err(err) => {
                tracing::warn!(sub = %sub_id, table = %params.table, %err, "snapshot failed");
                let _ = error_tx.send(Some(err.to_string()));
                if attached_before {
                    // Re-snapshot rejected outright: keep whatever is on
                    // screen and go live off the feed alone.
                    LiveCollection::from_snapshot(rows_tx.borrow().clone(), params.order)
                } else {
                    // First attach: surface an empty collection plus the
                    // error and stay live off the feed alone.
                    LiveCollection::new(params.order)
                }
            }
        };

        let _ = rows_tx.send(collection.to_vec());
        let _ = status_tx.send(LiveStatus::Live);
        if attached_before {
            tracing::info!(sub = %sub_id, table = %params.table, "live query reconnected");
        }
        attached_before = true;
        let connected_at = Instant::now();

        // Drains anything queued during the snapshot, then follows the
        // live feed.
        loop {
            let item = tokio::select! {
                _ = &mut shutdown => return,
                item = feed.next() => item,
            };
            match item {
                Some(Ok(event)) => {
                    tracing::trace!(sub = %sub_id, table = %params.table, kind = event.kind(), id = %event.row_id(), "feed event");
                    let accept = |row: &Row| row_matches(params.filter.as_ref(), row);
                    if collection.apply(event, accept) {
                        let _ = rows_tx.send(collection.to_vec());
                    }
                }
                Some(Err(err)) => {
                    tracing::warn!(sub = %sub_id, table = %params.table, %err, "feed error");
                    let _ = error_tx.send(Some(err.to_string()));
                    break;
                }
                None => {
                    tracing::warn!(sub = %sub_id, table = %params.table, "feed ended");
                    break;
                }
            }
        }

        // Only a feed that held for the stability window refills the
        // retry budget; see module docs.
        backoff.connection_ended(connected_at.elapsed());
        match wait_before_retry(&mut backoff, &status_tx, &mut shutdown).await {
            Ok(()) => continue,
            Err(Exit::Shutdown) => return,
        }
    }
}

/// Sleep out the next backoff delay, or park in `Degraded` until shutdown
/// once the budget is spent.
async fn wait_before_retry(
    backoff: &mut Backoff,
    status_tx: &watch::Sender<LiveStatus>,
    shutdown: &mut oneshot::Receiver<()>,
) -> Result<(), Exit> {
    match backoff.next_delay() {
        Some(delay) => {
            let _ = status_tx.send(LiveStatus::Reconnecting);
            tokio::select! {
                _ = &mut *shutdown => Err(Exit::Shutdown),
                _ = tokio::time::sleep(delay) => Ok(()),
            }
        }
        None => {
            let _ = status_tx.send(LiveStatus::Degraded);
            tracing::warn!("live query degraded: retry budget spent, no live updates");
            let _ = (&mut *shutdown).await;
            Err(Exit::Shutdown)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryService;
    use chrono::{TimeZone, Utc};
    use lifeflow_core::events::ChangeEvent;
    use lifeflow_core::row::RowId;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    fn row_at(id: &str, secs: i64, fields: serde_json::Value) -> Row {
        Row::with_id(
            id,
            Utc.timestamp_opt(secs, 0).unwrap(),
            fields.as_object().cloned().unwrap(),
        )
    }

    async fn wait_for_status(query: &LiveQuery, want: LiveStatus) {
        let mut rx = query.status_watch();
        loop {
            if *rx.borrow_and_update() == want {
                return;
            }
            rx.changed().await.expect("status channel closed");
        }
    }

    async fn wait_for_len(query: &LiveQuery, want: usize) -> Vec<Row> {
        let mut rx = query.rows();
        loop {
            {
                let rows = rx.borrow_and_update();
                if rows.len() == want {
                    return rows.clone();
                }
            }
            rx.changed().await.expect("rows channel closed");
        }
    }

    #[tokio::test]
    async fn snapshot_then_live_inserts() {
        let service = Arc::new(MemoryService::default());
        let table = TableName::from("posts");
        service.seed(&table, vec![row_at("1", 10, json!({})), row_at("2", 20, json!({}))]);

        let query = LiveQuery::spawn(service.clone(), LiveQueryParams::new("posts"));
        wait_for_status(&query, LiveStatus::Live).await;
        assert!(!query.loading());

        service.publish(&table, ChangeEvent::Insert(row_at("3", 30, json!({}))));
        let rows = wait_for_len(&query, 3).await;
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["1", "2", "3"]);

        query.close().await;
    }

    #[tokio::test]
    async fn filtered_inserts_are_ignored() {
        let service = Arc::new(MemoryService::default());
        let table = TableName::from("messages");

        let params = LiveQueryParams::new("messages").with_filter(Filter::eq("room_id", "a"));
        let query = LiveQuery::spawn(service.clone(), params);
        wait_for_status(&query, LiveStatus::Live).await;

        service.publish(&table, ChangeEvent::Insert(row_at("1", 10, json!({"room_id": "b"}))));
        service.publish(&table, ChangeEvent::Insert(row_at("2", 20, json!({"room_id": "a"}))));

        let rows = wait_for_len(&query, 1).await;
        assert_eq!(rows[0].id.as_str(), "2");

        query.close().await;
    }

    #[tokio::test]
    async fn snapshot_failure_surfaces_error_and_empty_rows() {
        // An unseeded table snapshots empty rather than erroring, so force
        // the error with a service whose snapshot always fails.
        struct FailingSnapshot(MemoryService);

        #[async_trait::async_trait]
        impl DataService for FailingSnapshot {
            async fn snapshot(
                &self,
                _table: &TableName,
                _filter: Option<&Filter>,
                _order: lifeflow_core::collection::SnapshotOrder,
                _limit: usize,
            ) -> crate::error::ClientResult<Vec<Row>> {
                Err(crate::error::ClientError::Unauthorized)
            }

            async fn subscribe(
                &self,
                table: &TableName,
                filter: Option<&Filter>,
            ) -> crate::error::ClientResult<crate::service::EventStream> {
                self.0.subscribe(table, filter).await
            }

            async fn insert(&self, table: &TableName, row: Row) -> crate::error::ClientResult<Row> {
                self.0.insert(table, row).await
            }

            async fn update(
                &self,
                table: &TableName,
                id: &RowId,
                fields: serde_json::Map<String, serde_json::Value>,
            ) -> crate::error::ClientResult<Row> {
                self.0.update(table, id, fields).await
            }

            async fn delete(&self, table: &TableName, id: &RowId) -> crate::error::ClientResult<()> {
                self.0.delete(table, id).await
            }

            async fn count(
                &self,
                table: &TableName,
                filter: Option<&Filter>,
            ) -> crate::error::ClientResult<u64> {
                self.0.count(table, filter).await
            }

            fn public_url(&self, bucket: &str, path: &str) -> String {
                self.0.public_url(bucket, path)
            }
        }

        let service = Arc::new(FailingSnapshot(MemoryService::default()));
        let query = LiveQuery::spawn(service, LiveQueryParams::new("posts"));
        wait_for_status(&query, LiveStatus::Live).await;

        assert!(query.current_rows().is_empty());
        assert!(query.last_error().is_some());

        query.close().await;
    }

    /// Feed dies instantly for the first `dead_feeds` subscribes; once
    /// `snapshots_allowed` is spent every snapshot is rejected outright.
    struct FlakyService {
        inner: MemoryService,
        dead_feeds: AtomicU32,
        snapshots_allowed: AtomicU32,
    }

    impl FlakyService {
        fn new(dead_feeds: u32, snapshots_allowed: u32) -> Self {
            Self {
                inner: MemoryService::default(),
                dead_feeds: AtomicU32::new(dead_feeds),
                snapshots_allowed: AtomicU32::new(snapshots_allowed),
            }
        }
    }

    #[async_trait::async_trait]
    impl DataService for FlakyService {
        async fn snapshot(
            &self,
            table: &TableName,
            filter: Option<&Filter>,
            order: lifeflow_core::collection::SnapshotOrder,
            limit: usize,
        ) -> crate::error::ClientResult<Vec<Row>> {
            let left = self.snapshots_allowed.load(Ordering::SeqCst);
            if left == 0 {
                return Err(crate::error::ClientError::Unauthorized);
            }
            if left != u32::MAX {
                self.snapshots_allowed.store(left - 1, Ordering::SeqCst);
            }
            self.inner.snapshot(table, filter, order, limit).await
        }

        async fn subscribe(
            &self,
            table: &TableName,
            filter: Option<&Filter>,
        ) -> crate::error::ClientResult<crate::service::EventStream> {
            let left = self.dead_feeds.load(Ordering::SeqCst);
            if left > 0 {
                if left != u32::MAX {
                    self.dead_feeds.store(left - 1, Ordering::SeqCst);
                }
                return Ok(futures::stream::empty().boxed());
            }
            self.inner.subscribe(table, filter).await
        }

        async fn insert(&self, table: &TableName, row: Row) -> crate::error::ClientResult<Row> {
            self.inner.insert(table, row).await
        }

        async fn update(
            &self,
            table: &TableName,
            id: &RowId,
            fields: serde_json::Map<String, serde_json::Value>,
        ) -> crate::error::ClientResult<Row> {
            self.inner.update(table, id, fields).await
        }

        async fn delete(&self, table: &TableName, id: &RowId) -> crate::error::ClientResult<()> {
            self.inner.delete(table, id).await
        }

        async fn count(
            &self,
            table: &TableName,
            filter: Option<&Filter>,
        ) -> crate::error::ClientResult<u64> {
            self.inner.count(table, filter).await
        }

        fn public_url(&self, bucket: &str, path: &str) -> String {
            self.inner.public_url(bucket, path)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_feed_exhausts_retry_budget() {
        let service = Arc::new(FlakyService::new(u32::MAX, u32::MAX));
        let table = TableName::from("posts");
        service.inner.seed(&table, vec![row_at("1", 10, json!({}))]);

        let query = LiveQuery::spawn(service.clone(), LiveQueryParams::new("posts"));
        wait_for_status(&query, LiveStatus::Degraded).await;

        // The last good snapshot stays rendered.
        assert_eq!(query.current_rows().len(), 1);

        query.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_resnapshots_rows_missed_during_outage() {
        let service = Arc::new(FlakyService::new(2, u32::MAX));
        let table = TableName::from("posts");
        service.inner.seed(&table, vec![row_at("1", 10, json!({}))]);

        let query = LiveQuery::spawn(service.clone(), LiveQueryParams::new("posts"));
        wait_for_len(&query, 1).await;

        // Server-side change while the feed is down; only the re-snapshot
        // can surface it.
        service.inner.seed(&table, vec![row_at("2", 20, json!({}))]);

        let rows = wait_for_len(&query, 2).await;
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);

        // The replacement feed carries live events again.
        while service.inner.bus().subscriber_count(&table) == 0 {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        service
            .inner
            .publish(&table, ChangeEvent::Insert(row_at("3", 30, json!({}))));
        wait_for_len(&query, 3).await;

        query.close().await;
    }

    #[tokio::test(start_paused = true)]
    async fn rejected_resnapshot_keeps_rendered_rows() {
        let service = Arc::new(FlakyService::new(1, 1));
        let table = TableName::from("posts");
        service.inner.seed(&table, vec![row_at("1", 10, json!({}))]);

        let query = LiveQuery::spawn(service.clone(), LiveQueryParams::new("posts"));
        wait_for_status(&query, LiveStatus::Reconnecting).await;
        wait_for_status(&query, LiveStatus::Live).await;

        // The re-snapshot was rejected; the first snapshot's rows survive
        // and the error is surfaced on the handle.
        assert_eq!(query.current_rows().len(), 1);
        assert!(query.last_error().is_some());

        // The replacement feed is attached and still applies events.
        service
            .inner
            .publish(&table, ChangeEvent::Insert(row_at("2", 20, json!({}))));
        wait_for_len(&query, 2).await;

        query.close().await;
    }

    #[tokio::test]
    async fn events_buffered_during_snapshot_are_replayed() {
        // A service that parks the snapshot until released, so events can
        // arrive on the already-open feed first.
        struct SlowSnapshot {
            inner: MemoryService,
            release: tokio::sync::Semaphore,
        }

        #[async_trait::async_trait]
        impl DataService for SlowSnapshot {
            async fn snapshot(
                &self,
                table: &TableName,
                filter: Option<&Filter>,
                order: lifeflow_core::collection::SnapshotOrder,
                limit: usize,
            ) -> crate::error::ClientResult<Vec<Row>> {
                let _permit = self.release.acquire().await.map_err(|_| {
                    crate::error::ClientError::Internal("fixture closed".into())
                })?;
                self.inner.snapshot(table, filter, order, limit).await
            }

            async fn subscribe(
                &self,
                table: &TableName,
                filter: Option<&Filter>,
            ) -> crate::error::ClientResult<crate::service::EventStream> {
                self.inner.subscribe(table, filter).await
            }

            async fn insert(&self, table: &TableName, row: Row) -> crate::error::ClientResult<Row> {
                self.inner.insert(table, row).await
            }

            async fn update(
                &self,
                table: &TableName,
                id: &RowId,
                fields: serde_json::Map<String, serde_json::Value>,
            ) -> crate::error::ClientResult<Row> {
                self.inner.update(table, id, fields).await
            }

            async fn delete(&self, table: &TableName, id: &RowId) -> crate::error::ClientResult<()> {
                self.inner.delete(table, id).await
            }

            async fn count(
                &self,
                table: &TableName,
                filter: Option<&Filter>,
            ) -> crate::error::ClientResult<u64> {
                self.inner.count(table, filter).await
            }

            fn public_url(&self, bucket: &str, path: &str) -> String {
                self.inner.public_url(bucket, path)
            }
        }

        let service = Arc::new(SlowSnapshot {
            inner: MemoryService::default(),
            release: tokio::sync::Semaphore::new(0),
        });
        let table = TableName::from("posts");
        service.inner.seed(&table, vec![row_at("1", 10, json!({}))]);

        let query = LiveQuery::spawn(service.clone(), LiveQueryParams::new("posts"));

        // Wait until the feed is attached (a subscriber appears), then
        // deliver events while the snapshot is still parked.
        while service.inner.bus().subscriber_count(&table) == 0 {
            tokio::task::yield_now().await;
        }
        // One event duplicating a snapshot row, one new.
        service
            .inner
            .publish(&table, ChangeEvent::Insert(row_at("1", 10, json!({"body": "dup"}))));
        service
            .inner
            .publish(&table, ChangeEvent::Insert(row_at("2", 20, json!({}))));

        service.release.add_permits(1);
        let rows = wait_for_len(&query, 2).await;
        let ids: Vec<_> = rows.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, ["1", "2"]);

        query.close().await;
    }
}
