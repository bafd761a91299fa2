//! Append-only log views: chat rooms and discussion threads.
//!
//! Messages are immutable once created, so inserts only ever add (a
//! re-delivered insert replaces in place and changes nothing visible) and
//! deletes remove messages the viewer may no longer see, e.g. moderation.
//! Update events take the same replace-in-place path, which covers
//! server-side edits without reordering the log.
//! Display order is ascending `created_at` with lexical id as the
//! deterministic tiebreak.

use std::sync::Arc;

use chrono::Utc;
use serde_json::{json, Map, Value};
use tokio::sync::watch;

use lifeflow_core::collection::CollectionOrder;
use lifeflow_core::row::{Row, TableName};
use lifeflow_filter::Filter;

use crate::error::ClientResult;
use crate::live::{LiveQuery, LiveQueryParams, LiveStatus};
use crate::service::DataService;

/// A live, ordered view of one room's messages.
pub struct ChatLog {
    service: Arc<dyn DataService>,
    table: TableName,
    room_column: String,
    room_id: String,
    query: LiveQuery,
}

impl ChatLog {
    /// Open the log for one room: messages where `room_column` equals
    /// `room_id`, ordered for display.
    pub fn spawn(
        service: Arc<dyn DataService>,
        table: impl Into<TableName>,
        room_column: impl Into<String>,
        room_id: impl Into<String>,
        limit: usize,
    ) -> Self {
        let table = table.into();
        let room_column = room_column.into();
        let room_id = room_id.into();

        let params = LiveQueryParams::new(table.clone())
            .with_filter(Filter::eq(room_column.as_str(), room_id.as_str()))
            .with_order(CollectionOrder::ChatAscending)
            .with_limit(limit);
        let query = LiveQuery::spawn(service.clone(), params);

        Self {
            service,
            table,
            room_column,
            room_id,
            query,
        }
    }

    pub fn messages(&self) -> watch::Receiver<Vec<Row>> {
        self.query.rows()
    }

    pub fn status(&self) -> LiveStatus {
        self.query.status()
    }

    pub fn loading(&self) -> bool {
        self.query.loading()
    }

    /// Send a message into this room. The row comes back to us through the
    /// change feed like anyone else's; we do not append locally.
    pub async fn send(&self, sender_id: &str, body: &str) -> ClientResult<Row> {
        let mut fields = Map::new();
        fields.insert(self.room_column.clone(), json!(self.room_id));
        fields.insert("sender_id".to_string(), json!(sender_id));
        fields.insert("body".to_string(), json!(body));
        let row = Row {
            id: lifeflow_core::row::RowId::generate(),
            created_at: Utc::now(),
            fields,
        };
        self.service.insert(&self.table, row).await
    }

    /// Close the log, waiting for its subscription to detach.
    pub async fn close(self) {
        self.query.close().await;
    }
}

/// Convenience for rendering: body text of a message row, if present.
pub fn message_body(row: &Row) -> Option<String> {
    match row.get("body") {
        Value::String(s) => Some(s),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryService;

    async fn wait_for_len(log: &ChatLog, want: usize) -> Vec<Row> {
        let mut rx = log.messages();
        loop {
            {
                let rows = rx.borrow_and_update();
                if rows.len() == want {
                    return rows.clone();
                }
            }
            rx.changed().await.expect("messages channel closed");
        }
    }

    #[tokio::test]
    async fn messages_stay_in_display_order() {
        let service = Arc::new(MemoryService::default());
        let log = ChatLog::spawn(service.clone(), "messages", "room_id", "a", 100);

        log.send("u1", "first").await.unwrap();
        log.send("u2", "second").await.unwrap();

        let rows = wait_for_len(&log, 2).await;
        let bodies: Vec<_> = rows.iter().filter_map(message_body).collect();
        assert_eq!(bodies, ["first", "second"]);

        log.close().await;
    }

    #[tokio::test]
    async fn other_rooms_never_leak_in() {
        let service = Arc::new(MemoryService::default());
        let log_a = ChatLog::spawn(service.clone(), "messages", "room_id", "a", 100);
        let log_b = ChatLog::spawn(service.clone(), "messages", "room_id", "b", 100);

        log_a.send("u1", "for room a").await.unwrap();
        log_b.send("u2", "for room b").await.unwrap();

        let rows_a = wait_for_len(&log_a, 1).await;
        let rows_b = wait_for_len(&log_b, 1).await;
        assert_eq!(message_body(&rows_a[0]).unwrap(), "for room a");
        assert_eq!(message_body(&rows_b[0]).unwrap(), "for room b");

        log_a.close().await;
        log_b.close().await;
    }

    #[tokio::test]
    async fn server_side_edit_replaces_content_in_place() {
        let service = Arc::new(MemoryService::default());
        let log = ChatLog::spawn(service.clone(), "messages", "room_id", "a", 100);

        let first = log.send("u1", "first").await.unwrap();
        log.send("u2", "second").await.unwrap();
        wait_for_len(&log, 2).await;

        service
            .update(
                &TableName::from("messages"),
                &first.id,
                json!({"body": "first (edited)"}).as_object().cloned().unwrap(),
            )
            .await
            .unwrap();

        let mut rx = log.messages();
        let rows = loop {
            {
                let rows = rx.borrow_and_update();
                if rows.iter().any(|r| r.get("body") == json!("first (edited)")) {
                    break rows.clone();
                }
            }
            rx.changed().await.expect("messages channel closed");
        };
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].id, first.id);
        let bodies: Vec<_> = rows.iter().filter_map(message_body).collect();
        assert_eq!(bodies, ["first (edited)", "second"]);

        log.close().await;
    }

    #[tokio::test]
    async fn moderation_delete_removes_message() {
        let service = Arc::new(MemoryService::default());
        let log = ChatLog::spawn(service.clone(), "messages", "room_id", "a", 100);

        let kept = log.send("u1", "stays").await.unwrap();
        let removed = log.send("u2", "goes").await.unwrap();
        wait_for_len(&log, 2).await;

        service
            .delete(&TableName::from("messages"), &removed.id)
            .await
            .unwrap();

        let rows = wait_for_len(&log, 1).await;
        assert_eq!(rows[0].id, kept.id);

        log.close().await;
    }
}
