use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;

use super::types::ChangeEvent;
use crate::row::TableName;

/// In-process change feed backed by `tokio::broadcast`, one channel per
/// table. Stands in for the hosted service's change-feed in tests and
/// local fixtures.
#[derive(Debug)]
pub struct ChangeBus {
    capacity: usize,
    channels: RwLock<HashMap<TableName, broadcast::Sender<ChangeEvent>>>,
}

impl ChangeBus {
    /// Create a new bus; `capacity` bounds each table channel. A receiver
    /// that falls further behind than this observes a lag error and must
    /// re-snapshot.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            channels: RwLock::new(HashMap::new()),
        }
    }

    /// Publish an event to all subscribers of `table`. Returns the number
    /// of receivers it reached; publishing to a table nobody watches is
    /// fine and reaches zero.
    pub fn publish(&self, table: &TableName, event: ChangeEvent) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        match channels.get(table) {
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        }
    }

    /// Subscribe to the change feed for one table.
    pub fn subscribe(&self, table: &TableName) -> broadcast::Receiver<ChangeEvent> {
        let mut channels = self.channels.write().unwrap_or_else(|e| e.into_inner());
        channels
            .entry(table.clone())
            .or_insert_with(|| broadcast::channel(self.capacity).0)
            .subscribe()
    }

    /// Number of active subscribers on one table.
    pub fn subscriber_count(&self, table: &TableName) -> usize {
        let channels = self.channels.read().unwrap_or_else(|e| e.into_inner());
        channels
            .get(table)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

impl Default for ChangeBus {
    fn default() -> Self {
        Self::new(1024)
    }
}
