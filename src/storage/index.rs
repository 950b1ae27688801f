use crate::query::path::{self, FieldPath};
use crate::types::DocumentId;
use bson::{Bson, Document as BsonDocument};
use ordered_float::OrderedFloat;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IndexStats {
    pub keys: usize,
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub build_time_ms: u64,
}

/// Hashable form of the values an equality lookup can use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexKey {
    Str(String),
    I64(i64),
    F64(OrderedFloat<f64>),
    Bool(bool),
    DateTime(i64),
}

/// Maps a value to its key. Integral reals in `i64` range share the integer key so that
/// `3` and `3.0`, which compare equal, land in the same bucket.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::float_cmp)]
pub fn key_from_bson(v: &Bson) -> Option<IndexKey> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    match v {
        Bson::String(s) => Some(IndexKey::Str(s.clone())),
        Bson::Int32(i) => Some(IndexKey::I64(i64::from(*i))),
        Bson::Int64(i) => Some(IndexKey::I64(*i)),
        Bson::Double(f) if f.fract() == 0.0 && *f >= -LIMIT && *f < LIMIT => {
            Some(IndexKey::I64(*f as i64))
        }
        Bson::Double(f) => Some(IndexKey::F64(OrderedFloat(*f))),
        Bson::Boolean(b) => Some(IndexKey::Bool(*b)),
        Bson::DateTime(d) => Some(IndexKey::DateTime(d.timestamp_millis())),
        _ => None,
    }
}

#[derive(Debug)]
pub struct HashIndex {
    path: FieldPath,
    map: HashMap<IndexKey, HashSet<DocumentId>>,
    entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    build_time_ms: u64,
}

impl HashIndex {
    #[must_use]
    pub fn new(path: FieldPath) -> Self {
        Self {
            path,
            map: HashMap::new(),
            entries: 0,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            build_time_ms: 0,
        }
    }

    /// Builds an index over existing records.
    pub fn build<'a, I>(path: FieldPath, docs: I) -> Self
    where
        I: IntoIterator<Item = (&'a BsonDocument, &'a DocumentId)>,
    {
        let start = std::time::Instant::now();
        let mut idx = Self::new(path);
        for (doc, id) in docs {
            idx.insert(doc, id);
        }
        idx.build_time_ms = crate::utils::num::u128_to_u64_saturating(start.elapsed().as_millis());
        idx
    }

    #[must_use]
    pub const fn path(&self) -> &FieldPath {
        &self.path
    }

    fn keys_of(&self, doc: &BsonDocument) -> HashSet<IndexKey> {
        path::resolve_document(doc, &self.path).leaves().into_iter().filter_map(key_from_bson).collect()
    }

    pub fn insert(&mut self, doc: &BsonDocument, id: &DocumentId) {
        for k in self.keys_of(doc) {
            if self.map.entry(k).or_default().insert(id.clone()) {
                self.entries += 1;
            }
        }
    }

    pub fn remove(&mut self, doc: &BsonDocument, id: &DocumentId) {
        for k in self.keys_of(doc) {
            if let Some(set) = self.map.get_mut(&k) {
                if set.remove(id) {
                    self.entries = self.entries.saturating_sub(1);
                }
                if set.is_empty() {
                    self.map.remove(&k);
                }
            }
        }
    }

    /// Ids whose value at the indexed path may equal `value`. `None` when `value` has no key
    /// form, in which case the caller must scan.
    pub fn lookup_eq(&self, value: &Bson) -> Option<Vec<DocumentId>> {
        let key = key_from_bson(value)?;
        match self.map.get(&key) {
            Some(set) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(set.iter().cloned().collect())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Some(Vec::new())
            }
        }
    }

    #[must_use]
    pub fn stats(&self) -> IndexStats {
        IndexStats {
            keys: self.map.len(),
            entries: self.entries,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            build_time_ms: self.build_time_ms,
        }
    }
}
