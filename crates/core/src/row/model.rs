use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Name of a backend table (`messages`, `profiles`, `presence`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TableName(String);

impl TableName {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TableName {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for TableName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for TableName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Stable unique row identifier. Ordered lexically; that ordering is the
/// display tiebreak for rows sharing a `created_at`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RowId(String);

impl RowId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a fresh random id for locally created rows.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for RowId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for RowId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl std::fmt::Display for RowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A subscribable backend record: stable `id`, `created_at` timestamp, and
/// arbitrary JSON fields passed through unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub id: RowId,
    pub created_at: DateTime<Utc>,
    /// Remaining columns, kept opaque.
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Row {
    /// Build a row with a generated id and the current time.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self {
            id: RowId::generate(),
            created_at: Utc::now(),
            fields,
        }
    }

    pub fn with_id(id: impl Into<RowId>, created_at: DateTime<Utc>, fields: Map<String, Value>) -> Self {
        Self {
            id: id.into(),
            created_at,
            fields,
        }
    }

    /// Look up a field by dotted path (`author.id`). The reserved `id` and
    /// `created_at` columns resolve to their typed values. Missing paths
    /// resolve to `Null`.
    pub fn get_path(&self, path: &[String]) -> Value {
        let (head, rest) = match path.split_first() {
            Some(split) => split,
            None => return Value::Null,
        };
        let mut current = match head.as_str() {
            "id" => return Value::String(self.id.as_str().to_string()),
            "created_at" => return Value::String(self.created_at.to_rfc3339()),
            name => match self.fields.get(name) {
                Some(v) => v,
                None => return Value::Null,
            },
        };
        for segment in rest {
            current = match current.get(segment.as_str()) {
                Some(v) => v,
                None => return Value::Null,
            };
        }
        current.clone()
    }

    /// Convenience accessor for a single (undotted) column.
    pub fn get(&self, column: &str) -> Value {
        self.get_path(&[column.to_string()])
    }
}
