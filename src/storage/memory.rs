use super::index::{HashIndex, IndexStats};
use super::{IndexProbe, Snapshot, SnapshotEntry, StorageEngine, StorageError};
use crate::document::Document;
use crate::query::path::FieldPath;
use crate::types::DocumentId;
use parking_lot::RwLock;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

#[derive(Default)]
struct Inner {
    // insertion sequence -> record; iteration order is insertion order
    docs: BTreeMap<u64, Arc<Document>>,
    positions: HashMap<DocumentId, u64>,
    next_seq: u64,
    indexes: HashMap<String, HashIndex>,
}

impl Inner {
    fn index_insert(&mut self, doc: &Document) {
        for idx in self.indexes.values_mut() {
            idx.insert(&doc.data, &doc.id);
        }
    }

    fn index_remove(&mut self, doc: &Document) {
        for idx in self.indexes.values_mut() {
            idx.remove(&doc.data, &doc.id);
        }
    }

    /// Index candidates for `probe`, in insertion order. `None` when no index covers it.
    fn candidates(&self, probe: &IndexProbe) -> Option<Vec<SnapshotEntry>> {
        let idx = self.indexes.get(probe.path.as_str())?;
        let mut seqs = BTreeSet::new();
        for key in &probe.keys {
            for id in idx.lookup_eq(key)? {
                if let Some(seq) = self.positions.get(&id) {
                    seqs.insert(*seq);
                }
            }
        }
        Some(
            seqs.into_iter()
                .filter_map(|seq| self.docs.get(&seq))
                .map(|d| SnapshotEntry::Loaded(Arc::clone(d)))
                .collect(),
        )
    }
}

/// Default in-memory engine. Snapshots are stable: they hold the records themselves, so
/// writes after `find` never show through an open cursor.
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

impl StorageEngine for MemoryStore {
    fn insert(&self, doc: Document) -> Result<DocumentId, StorageError> {
        let mut inner = self.inner.write();
        if inner.positions.contains_key(&doc.id) {
            return Err(StorageError::Duplicate(doc.id));
        }
        let seq = inner.next_seq;
        inner.next_seq += 1;
        let id = doc.id.clone();
        inner.index_insert(&doc);
        inner.positions.insert(id.clone(), seq);
        inner.docs.insert(seq, Arc::new(doc));
        Ok(id)
    }

    fn replace(&self, doc: Document) -> Result<Arc<Document>, StorageError> {
        let mut inner = self.inner.write();
        let Some(seq) = inner.positions.get(&doc.id).copied() else {
            return Err(StorageError::Missing(doc.id));
        };
        let new = Arc::new(doc);
        let old = inner.docs.insert(seq, Arc::clone(&new)).ok_or_else(|| StorageError::Missing(new.id.clone()))?;
        inner.index_remove(&old);
        inner.index_insert(&new);
        Ok(old)
    }

    fn remove(&self, id: &DocumentId) -> Result<Arc<Document>, StorageError> {
        let mut inner = self.inner.write();
        let seq = inner.positions.remove(id).ok_or_else(|| StorageError::Missing(id.clone()))?;
        let old = inner.docs.remove(&seq).ok_or_else(|| StorageError::Missing(id.clone()))?;
        inner.index_remove(&old);
        Ok(old)
    }

    fn get(&self, id: &DocumentId) -> Option<Arc<Document>> {
        let inner = self.inner.read();
        inner.positions.get(id).and_then(|seq| inner.docs.get(seq)).cloned()
    }

    fn ids(&self) -> Vec<DocumentId> {
        self.inner.read().docs.values().map(|d| d.id.clone()).collect()
    }

    fn len(&self) -> usize {
        self.inner.read().docs.len()
    }

    fn snapshot(&self, probe: Option<&IndexProbe>) -> Result<Snapshot, StorageError> {
        let inner = self.inner.read();
        if let Some(entries) = probe.and_then(|p| inner.candidates(p)) {
            return Ok(Snapshot::new(entries, true));
        }
        let entries = inner.docs.values().map(|d| SnapshotEntry::Loaded(Arc::clone(d))).collect();
        Ok(Snapshot::new(entries, false))
    }

    fn create_index(&self, path: &FieldPath) -> Result<(), StorageError> {
        let mut inner = self.inner.write();
        if inner.indexes.contains_key(path.as_str()) {
            return Err(StorageError::IndexExists(path.to_string()));
        }
        let idx = HashIndex::build(path.clone(), inner.docs.values().map(|d| (&d.data, &d.id)));
        log::info!("built index on `{path}` over {} records in {} ms", inner.docs.len(), idx.stats().build_time_ms);
        inner.indexes.insert(path.to_string(), idx);
        Ok(())
    }

    fn drop_index(&self, path: &str) -> Result<(), StorageError> {
        self.inner
            .write()
            .indexes
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::NoSuchIndex(path.to_string()))
    }

    fn has_index(&self, path: &str) -> bool {
        self.inner.read().indexes.contains_key(path)
    }

    fn index_stats(&self, path: &str) -> Option<IndexStats> {
        self.inner.read().indexes.get(path).map(HashIndex::stats)
    }
}
