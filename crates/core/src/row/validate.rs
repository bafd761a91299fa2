//! Row shape validation for records arriving from the wire.

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;

use super::model::{Row, RowId};

#[derive(Debug, Error)]
pub enum RowError {
    #[error("row must be a JSON object")]
    NotAnObject,
    #[error("row id is required")]
    MissingId,
    #[error("row id cannot be empty")]
    EmptyId,
    #[error("row created_at is required")]
    MissingCreatedAt,
    #[error("row created_at is not a valid timestamp: {0}")]
    InvalidCreatedAt(String),
}

/// Parse an untyped JSON value into a [`Row`], enforcing the subscribable-row
/// contract: non-empty `id` and a parseable `created_at`.
pub fn row_from_value(value: Value) -> Result<Row, RowError> {
    let mut fields = match value {
        Value::Object(map) => map,
        _ => return Err(RowError::NotAnObject),
    };

    let id = match fields.remove("id") {
        Some(Value::String(s)) if s.is_empty() => return Err(RowError::EmptyId),
        Some(Value::String(s)) => RowId::new(s),
        // Numeric ids are stringified so lexical ordering stays well-defined.
        Some(Value::Number(n)) => RowId::new(n.to_string()),
        Some(_) | None => return Err(RowError::MissingId),
    };

    let created_at = match fields.remove("created_at") {
        Some(Value::String(raw)) => parse_timestamp(&raw)?,
        Some(other) => return Err(RowError::InvalidCreatedAt(other.to_string())),
        None => return Err(RowError::MissingCreatedAt),
    };

    Ok(Row {
        id,
        created_at,
        fields,
    })
}

fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>, RowError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| RowError::InvalidCreatedAt(raw.to_string()))
}
