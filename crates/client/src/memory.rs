//! In-process implementation of the service boundary: a table map plus the
//! broadcast change bus. Backs every test in this crate and doubles as a
//! local fixture backend during development.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::{Map, Value};
use tokio_stream::wrappers::BroadcastStream;

use lifeflow_core::collection::SnapshotOrder;
use lifeflow_core::events::{ChangeBus, ChangeEvent};
use lifeflow_core::row::{Row, RowId, TableName};
use lifeflow_filter::Filter;

use crate::error::{ClientError, ClientResult};
use crate::service::{row_matches, DataService, EventStream};

pub struct MemoryService {
    tables: Mutex<HashMap<TableName, Vec<Row>>>,
    bus: ChangeBus,
}

impl MemoryService {
    pub fn new(feed_capacity: usize) -> Self {
        Self {
            tables: Mutex::new(HashMap::new()),
            bus: ChangeBus::new(feed_capacity),
        }
    }

    /// Load fixture rows without emitting change events, as if they existed
    /// before the client connected.
    pub fn seed(&self, table: &TableName, rows: Vec<Row>) {
        let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        tables.entry(table.clone()).or_default().extend(rows);
    }

    /// Publish a raw feed event without touching stored rows. Lets tests
    /// simulate feed/table divergence and filtered traffic.
    pub fn publish(&self, table: &TableName, event: ChangeEvent) -> usize {
        self.bus.publish(table, event)
    }

    pub fn bus(&self) -> &ChangeBus {
        &self.bus
    }
}

impl Default for MemoryService {
    fn default() -> Self {
        Self::new(1024)
    }
}

#[async_trait]
impl DataService for MemoryService {
    async fn snapshot(
        &self,
        table: &TableName,
        filter: Option<&Filter>,
        order: SnapshotOrder,
        limit: usize,
    ) -> ClientResult<Vec<Row>> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let mut rows: Vec<Row> = tables
            .get(table)
            .map(|rows| {
                rows.iter()
                    .filter(|row| row_matches(filter, row))
                    .cloned()
                    .collect()
            })
            // Unknown table reads as empty, not as an error.
            .unwrap_or_default();

        rows.sort_by(|a, b| {
            let key = (a.created_at, &a.id).cmp(&(b.created_at, &b.id));
            match order {
                SnapshotOrder::CreatedAsc => key,
                SnapshotOrder::CreatedDesc => key.reverse(),
            }
        });
        rows.truncate(limit);
        Ok(rows)
    }

    async fn subscribe(
        &self,
        table: &TableName,
        _filter: Option<&Filter>,
    ) -> ClientResult<EventStream> {
        // The bus has no server-side narrowing; subscribers filter
        // client-side, which the trait contract allows.
        let rx = self.bus.subscribe(table);
        let stream = BroadcastStream::new(rx).map(|item| {
            item.map_err(|err| ClientError::Transport(format!("feed lagged: {err}")))
        });
        Ok(stream.boxed())
    }

    async fn insert(&self, table: &TableName, row: Row) -> ClientResult<Row> {
        if row.id.is_empty() {
            return Err(ClientError::Validation("row id cannot be empty".into()));
        }
        {
            let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
            let rows = tables.entry(table.clone()).or_default();
            match rows.iter_mut().find(|r| r.id == row.id) {
                Some(existing) => *existing = row.clone(),
                None => rows.push(row.clone()),
            }
        }
        self.bus.publish(table, ChangeEvent::Insert(row.clone()));
        Ok(row)
    }

    async fn update(
        &self,
        table: &TableName,
        id: &RowId,
        fields: Map<String, Value>,
    ) -> ClientResult<Row> {
        let updated = {
            let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
            let rows = tables
                .get_mut(table)
                .ok_or_else(|| ClientError::NotFound(format!("table {table}")))?;
            let row = rows
                .iter_mut()
                .find(|r| &r.id == id)
                .ok_or_else(|| ClientError::NotFound(format!("row {id} in {table}")))?;
            for (key, value) in fields {
                row.fields.insert(key, value);
            }
            row.clone()
        };
        self.bus.publish(table, ChangeEvent::Update(updated.clone()));
        Ok(updated)
    }

    async fn delete(&self, table: &TableName, id: &RowId) -> ClientResult<()> {
        let removed = {
            let mut tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
            match tables.get_mut(table) {
                Some(rows) => {
                    let before = rows.len();
                    rows.retain(|r| &r.id != id);
                    rows.len() != before
                }
                None => false,
            }
        };
        // Deleting an absent id is a no-op, not an error.
        if removed {
            self.bus.publish(table, ChangeEvent::Delete(id.clone()));
        }
        Ok(())
    }

    async fn count(&self, table: &TableName, filter: Option<&Filter>) -> ClientResult<u64> {
        let tables = self.tables.lock().unwrap_or_else(|e| e.into_inner());
        let count = tables
            .get(table)
            .map(|rows| rows.iter().filter(|row| row_matches(filter, row)).count())
            .unwrap_or(0);
        Ok(count as u64)
    }

    fn public_url(&self, bucket: &str, path: &str) -> String {
        format!("memory://{bucket}/{path}")
    }
}
