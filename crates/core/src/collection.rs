//! Ordered in-memory view of one (table, filter) subscription.
//!
//! A collection is created empty on mount, populated by a snapshot, mutated
//! by change events, and discarded with its owning view. Row ids are unique
//! within a collection; an insert for a present id replaces in place.

use serde::{Deserialize, Serialize};

use crate::events::ChangeEvent;
use crate::row::{Row, RowId};

/// Snapshot read order, as sent to the backend. Always an explicit
/// parameter of the subscription, never a hidden default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SnapshotOrder {
    CreatedAsc,
    CreatedDesc,
}

/// How the local collection keeps its rows ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CollectionOrder {
    /// Snapshot ascending by creation time; live inserts append.
    Arrival,
    /// "Most recent first" views: snapshot descending; live inserts prepend.
    Newest,
    /// Chat display order: ascending `created_at`, ties broken by lexical
    /// id so two clients always render the same sequence.
    ChatAscending,
}

impl CollectionOrder {
    /// The snapshot order this collection expects from the service.
    pub fn snapshot_order(&self) -> SnapshotOrder {
        match self {
            CollectionOrder::Arrival | CollectionOrder::ChatAscending => SnapshotOrder::CreatedAsc,
            CollectionOrder::Newest => SnapshotOrder::CreatedDesc,
        }
    }
}

/// The ordered row sequence one subscription owns.
#[derive(Debug, Clone)]
pub struct LiveCollection {
    order: CollectionOrder,
    rows: Vec<Row>,
}

impl LiveCollection {
    pub fn new(order: CollectionOrder) -> Self {
        Self {
            order,
            rows: Vec::new(),
        }
    }

    /// Build from a snapshot. Duplicate ids are collapsed keeping the first
    /// occurrence; chat collections re-sort by `(created_at, id)` in case
    /// the service tiebreaks differently than we do.
    pub fn from_snapshot(snapshot: Vec<Row>, order: CollectionOrder) -> Self {
        let mut collection = Self::new(order);
        for row in snapshot {
            if !collection.contains(&row.id) {
                collection.rows.push(row);
            }
        }
        if order == CollectionOrder::ChatAscending {
            collection
                .rows
                .sort_by(|a, b| chat_key(a).cmp(&chat_key(b)));
        }
        collection
    }

    pub fn order(&self) -> CollectionOrder {
        self.order
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn to_vec(&self) -> Vec<Row> {
        self.rows.clone()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn contains(&self, id: &RowId) -> bool {
        self.position(id).is_some()
    }

    pub fn get(&self, id: &RowId) -> Option<&Row> {
        self.position(id).map(|i| &self.rows[i])
    }

    /// Apply one change event. `accept` is the subscription filter: inserts
    /// for rows it rejects are ignored. Deletes never consult it — a
    /// non-matching id cannot be present. Returns whether the collection
    /// changed.
    pub fn apply<F>(&mut self, event: ChangeEvent, accept: F) -> bool
    where
        F: Fn(&Row) -> bool,
    {
        match event {
            ChangeEvent::Insert(row) => {
                if !accept(&row) {
                    return false;
                }
                match self.position(&row.id) {
                    // Re-delivered insert: replace in place, length and
                    // order unchanged.
                    Some(i) => {
                        self.rows[i] = row;
                        true
                    }
                    None => {
                        self.insert_new(row);
                        true
                    }
                }
            }
            ChangeEvent::Update(row) => match self.position(&row.id) {
                Some(i) => {
                    self.rows[i] = row;
                    true
                }
                None => false,
            },
            ChangeEvent::Delete(id) => match self.position(&id) {
                Some(i) => {
                    self.rows.remove(i);
                    true
                }
                None => false,
            },
        }
    }

    fn position(&self, id: &RowId) -> Option<usize> {
        self.rows.iter().position(|r| &r.id == id)
    }

    fn insert_new(&mut self, row: Row) {
        match self.order {
            CollectionOrder::Arrival => self.rows.push(row),
            CollectionOrder::Newest => self.rows.insert(0, row),
            CollectionOrder::ChatAscending => {
                let key = chat_key(&row);
                let at = self
                    .rows
                    .partition_point(|existing| chat_key(existing) <= key);
                self.rows.insert(at, row);
            }
        }
    }
}

fn chat_key(row: &Row) -> (chrono::DateTime<chrono::Utc>, &RowId) {
    (row.created_at, &row.id)
}
