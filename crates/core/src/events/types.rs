use crate::row::{Row, RowId};

/// A single change delivered on a table's feed.
///
/// Events are already table-scoped by the subscription that carries them;
/// ordering across tables is never guaranteed.
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    Insert(Row),
    Update(Row),
    Delete(RowId),
}

impl ChangeEvent {
    /// The id of the row the event concerns.
    pub fn row_id(&self) -> &RowId {
        match self {
            ChangeEvent::Insert(row) | ChangeEvent::Update(row) => &row.id,
            ChangeEvent::Delete(id) => id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ChangeEvent::Insert(_) => "insert",
            ChangeEvent::Update(_) => "update",
            ChangeEvent::Delete(_) => "delete",
        }
    }
}
