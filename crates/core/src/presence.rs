//! Presence model: per-user online status mirrored from the backend's
//! presence table. The tracker is a passive mirror of upstream writes and
//! never owns state transitions itself.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::row::Row;

/// User status as written by the backend. Anything we do not recognize
/// decodes as `Offline` rather than failing the whole map.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum PresenceStatus {
    Online,
    Away,
    Busy,
    Offline,
}

impl PresenceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            PresenceStatus::Online => "online",
            PresenceStatus::Away => "away",
            PresenceStatus::Busy => "busy",
            PresenceStatus::Offline => "offline",
        }
    }

    /// A user counts as online for list partitioning unless fully offline.
    pub fn is_online(&self) -> bool {
        !matches!(self, PresenceStatus::Offline)
    }
}

impl From<String> for PresenceStatus {
    fn from(s: String) -> Self {
        match s.as_str() {
            "online" => PresenceStatus::Online,
            "away" => PresenceStatus::Away,
            "busy" => PresenceStatus::Busy,
            _ => PresenceStatus::Offline,
        }
    }
}

impl From<PresenceStatus> for String {
    fn from(status: PresenceStatus) -> Self {
        status.as_str().to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresenceRecord {
    pub user_id: String,
    pub status: PresenceStatus,
    pub last_seen: DateTime<Utc>,
}

impl PresenceRecord {
    /// Read a presence row (`user_id`, `status`, `last_seen`). Rows missing
    /// `user_id` yield `None`; a missing `last_seen` falls back to the
    /// row's `created_at`.
    pub fn from_row(row: &Row) -> Option<Self> {
        let user_id = match row.get("user_id") {
            serde_json::Value::String(s) if !s.is_empty() => s,
            _ => return None,
        };
        let status = match row.get("status") {
            serde_json::Value::String(s) => PresenceStatus::from(s),
            _ => PresenceStatus::Offline,
        };
        let last_seen = match row.get("last_seen") {
            serde_json::Value::String(raw) => DateTime::parse_from_rfc3339(&raw)
                .map(|dt| dt.with_timezone(&Utc))
                .unwrap_or(row.created_at),
            _ => row.created_at,
        };
        Some(Self {
            user_id,
            status,
            last_seen,
        })
    }
}

/// Presence map keyed by user id, rebuilt wholesale on every change.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PresenceMap {
    records: HashMap<String, PresenceRecord>,
}

impl PresenceMap {
    /// Rebuild the full map from a fresh presence-table snapshot.
    pub fn from_rows(rows: &[Row]) -> Self {
        let mut records = HashMap::new();
        for row in rows {
            if let Some(record) = PresenceRecord::from_row(row) {
                records.insert(record.user_id.clone(), record);
            }
        }
        Self { records }
    }

    pub fn get(&self, user_id: &str) -> Option<&PresenceRecord> {
        self.records.get(user_id)
    }

    /// Status for a user; no record means offline.
    pub fn status_of(&self, user_id: &str) -> PresenceStatus {
        self.records
            .get(user_id)
            .map(|r| r.status)
            .unwrap_or(PresenceStatus::Offline)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Split a friend list into (online, offline) partitions, preserving
    /// the input order within each partition.
    pub fn partition<'a>(&self, friend_ids: &'a [String]) -> (Vec<&'a str>, Vec<&'a str>) {
        let mut online = Vec::new();
        let mut offline = Vec::new();
        for id in friend_ids {
            if self.status_of(id).is_online() {
                online.push(id.as_str());
            } else {
                offline.push(id.as_str());
            }
        }
        (online, offline)
    }
}
