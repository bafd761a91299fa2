//! Frame types of the hosted service's realtime protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use lifeflow_core::events::ChangeEvent;
use lifeflow_core::row::{validate::row_from_value, RowId};

use crate::error::{ClientError, ClientResult};

/// First frame the client sends after the socket opens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubscribeFrame {
    pub action: String,
    /// `realtime:{table}`.
    pub topic: String,
    /// Optional server-side narrowing, in filter wire syntax.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
}

impl SubscribeFrame {
    pub fn new(table: &str, filter: Option<String>) -> Self {
        Self {
            action: "subscribe".to_string(),
            topic: format!("realtime:{table}"),
            filter,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FrameKind {
    Insert,
    Update,
    Delete,
}

/// One change notification from the server.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedFrame {
    pub table: String,
    #[serde(rename = "type")]
    pub kind: FrameKind,
    /// New row state; present for inserts and updates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub record: Option<Value>,
    /// Prior row state; deletes carry at least the id here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub old_record: Option<Value>,
}

impl FeedFrame {
    /// Convert into the typed change event, validating row shape.
    pub fn into_event(self) -> ClientResult<ChangeEvent> {
        match self.kind {
            FrameKind::Insert => {
                let record = self
                    .record
                    .ok_or_else(|| ClientError::Validation("INSERT frame without record".into()))?;
                Ok(ChangeEvent::Insert(row_from_value(record)?))
            }
            FrameKind::Update => {
                let record = self
                    .record
                    .ok_or_else(|| ClientError::Validation("UPDATE frame without record".into()))?;
                Ok(ChangeEvent::Update(row_from_value(record)?))
            }
            FrameKind::Delete => {
                let old = self.old_record.ok_or_else(|| {
                    ClientError::Validation("DELETE frame without old_record".into())
                })?;
                match old.get("id") {
                    Some(Value::String(id)) if !id.is_empty() => {
                        Ok(ChangeEvent::Delete(RowId::new(id.clone())))
                    }
                    Some(Value::Number(n)) => Ok(ChangeEvent::Delete(RowId::new(n.to_string()))),
                    _ => Err(ClientError::Validation(
                        "DELETE frame old_record has no id".into(),
                    )),
                }
            }
        }
    }
}
