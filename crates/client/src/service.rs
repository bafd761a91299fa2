use async_trait::async_trait;
use futures::stream::BoxStream;
use serde_json::Map;
use serde_json::Value;

use lifeflow_core::collection::SnapshotOrder;
use lifeflow_core::events::ChangeEvent;
use lifeflow_core::row::{Row, RowId, TableName};
use lifeflow_filter::Filter;

use crate::error::ClientResult;

/// Change events for one (table, filter) subscription, delivered in
/// transport order. The stream ends (or yields an error) when the feed is
/// lost; reconnection is the caller's concern.
pub type EventStream = BoxStream<'static, ClientResult<ChangeEvent>>;

/// Boundary to the hosted data service: table-scoped reads and writes, the
/// change feed, and blob storage URLs. The application owns no persistence
/// of its own; everything goes through this trait.
#[async_trait]
pub trait DataService: Send + Sync + 'static {
    /// Snapshot read: up to `limit` rows, optionally filtered, in the
    /// given creation-time order.
    async fn snapshot(
        &self,
        table: &TableName,
        filter: Option<&Filter>,
        order: SnapshotOrder,
        limit: usize,
    ) -> ClientResult<Vec<Row>>;

    /// Open a change-feed subscription for one table. The service may
    /// narrow by `filter`; subscribers must still filter client-side, so a
    /// service that ignores the hint stays correct.
    async fn subscribe(
        &self,
        table: &TableName,
        filter: Option<&Filter>,
    ) -> ClientResult<EventStream>;

    async fn insert(&self, table: &TableName, row: Row) -> ClientResult<Row>;

    /// Merge `fields` into the row, bump nothing else. Returns the updated
    /// row.
    async fn update(
        &self,
        table: &TableName,
        id: &RowId,
        fields: Map<String, Value>,
    ) -> ClientResult<Row>;

    async fn delete(&self, table: &TableName, id: &RowId) -> ClientResult<()>;

    /// Real row count for listing views (member counts and the like).
    async fn count(&self, table: &TableName, filter: Option<&Filter>) -> ClientResult<u64>;

    /// Public URL for a blob in storage. Pure formatting; no I/O.
    fn public_url(&self, bucket: &str, path: &str) -> String;
}

/// Evaluate a subscription filter against a row. `None` matches everything.
pub fn row_matches(filter: Option<&Filter>, row: &Row) -> bool {
    let filter = match filter {
        Some(f) => f,
        None => return true,
    };
    match serde_json::to_value(row) {
        Ok(value) => filter.matches(&value),
        Err(err) => {
            tracing::debug!("row {} failed to serialize for filter check: {err}", row.id);
            false
        }
    }
}
