//! Storage collaborator: where records live and how a query gets a stable view of them.

pub mod index;
pub mod memory;

use crate::document::Document;
use crate::query::path::FieldPath;
use crate::types::DocumentId;
use bson::Bson;
use std::sync::Arc;
use thiserror::Error;

pub use index::{HashIndex, IndexKey, IndexStats};
pub use memory::MemoryStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("document {0} already exists")]
    Duplicate(DocumentId),
    #[error("document {0} not found")]
    Missing(DocumentId),
    #[error("index on `{0}` already exists")]
    IndexExists(String),
    #[error("no index on `{0}`")]
    NoSuchIndex(String),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("unsupported operation: {0}")]
    Unsupported(String),
}

/// One record as seen by a snapshot.
#[derive(Debug, Clone)]
pub enum SnapshotEntry {
    /// The record as it was when the snapshot was taken.
    Loaded(Arc<Document>),
    /// Only the id was captured; the record is fetched when the cursor reaches it and
    /// skipped if it has vanished by then.
    Deferred(DocumentId),
}

/// The ordered record set one `find` observes for the lifetime of its cursor.
#[derive(Debug, Clone)]
pub struct Snapshot {
    entries: Arc<[SnapshotEntry]>,
    used_index: bool,
}

impl Snapshot {
    #[must_use]
    pub fn new(entries: Vec<SnapshotEntry>, used_index: bool) -> Self {
        Self { entries: entries.into(), used_index }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn get(&self, i: usize) -> Option<&SnapshotEntry> {
        self.entries.get(i)
    }

    /// True when an index narrowed the entries to candidates.
    #[must_use]
    pub const fn used_index(&self) -> bool {
        self.used_index
    }
}

/// Equality candidates the executor would like storage to narrow a snapshot to.
/// Any record whose value at `path` equals one of `keys` must be included.
#[derive(Debug, Clone)]
pub struct IndexProbe {
    pub path: FieldPath,
    pub keys: Vec<Bson>,
}

/// Record storage consumed by collections and the query executor.
///
/// Methods take `&self`; implementations guard their own state so a snapshot can be taken
/// while other threads write.
pub trait StorageEngine: Send + Sync {
    /// Appends a record; insertion order is the default iteration order.
    fn insert(&self, doc: Document) -> Result<DocumentId, StorageError>;

    /// Replaces the record with the same id in place, keeping its position. Returns the old record.
    fn replace(&self, doc: Document) -> Result<Arc<Document>, StorageError>;

    fn remove(&self, id: &DocumentId) -> Result<Arc<Document>, StorageError>;

    fn get(&self, id: &DocumentId) -> Option<Arc<Document>>;

    /// Ids in insertion order.
    fn ids(&self) -> Vec<DocumentId>;

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Captures the current record set. With a probe, storage may return only the candidates
    /// its indexes know about; without a usable index it returns everything.
    fn snapshot(&self, probe: Option<&IndexProbe>) -> Result<Snapshot, StorageError>;

    /// Loads a record named by a deferred snapshot entry. `Ok(None)` means it vanished.
    fn fetch(&self, id: &DocumentId) -> Result<Option<Arc<Document>>, StorageError> {
        Ok(self.get(id))
    }

    fn create_index(&self, path: &FieldPath) -> Result<(), StorageError> {
        Err(StorageError::Unsupported(format!("index on `{path}`")))
    }

    fn drop_index(&self, path: &str) -> Result<(), StorageError> {
        Err(StorageError::NoSuchIndex(path.to_string()))
    }

    fn has_index(&self, _path: &str) -> bool {
        false
    }

    fn index_stats(&self, _path: &str) -> Option<IndexStats> {
        None
    }
}
