//! Lazy, restartable result handles.
//!
//! A cursor owns a [`Snapshot`] taken by `find`, so it never holds storage locks. Without a
//! sort it streams: each `next` scans forward until the next match. A sort, or a call to
//! [`Cursor::size`], materializes the full result once; later iteration reads the buffer.

use crate::document::{Document, FieldResolver, Shape};
use crate::errors::DbError;
use crate::storage::{Snapshot, SnapshotEntry, StorageEngine};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering as AtomicOrdering};
use std::sync::{Arc, OnceLock};
use std::time::Instant;

use super::compile::CompiledFilter;
use super::eval::{compare_for_sort, matches};
use super::path::FieldPath;
use super::telemetry;
use super::types::{CancellationToken, Order};

/// Everything a cursor needs to (re)produce its results; shared by clones.
pub(crate) struct CursorSource {
    pub(crate) storage: Arc<dyn StorageEngine>,
    pub(crate) resolver: Arc<dyn FieldResolver>,
    pub(crate) collection: String,
    pub(crate) snapshot: Snapshot,
    pub(crate) filter: CompiledFilter,
    pub(crate) sort: Vec<(FieldPath, Order)>,
    pub(crate) projection: Option<Shape>,
    pub(crate) skip: usize,
    pub(crate) limit: Option<usize>,
    pub(crate) timeout_ms: Option<u64>,
    pub(crate) deadline: Option<Instant>,
    pub(crate) cancel: Option<CancellationToken>,
    pub(crate) started: Instant,
    // set by the first completed pass; clones and resets share it
    pub(crate) reported: AtomicBool,
}

impl CursorSource {
    fn check_cancelled(&self) -> Result<(), DbError> {
        if self.cancel.as_ref().is_some_and(CancellationToken::is_cancelled) {
            telemetry::record_cancelled(&self.collection);
            return Err(DbError::Cancelled);
        }
        Ok(())
    }

    fn check_deadline(&self) -> Result<(), DbError> {
        match (self.deadline, self.timeout_ms) {
            (Some(dl), Some(ms)) if Instant::now() > dl => Err(DbError::Timeout(ms)),
            _ => Ok(()),
        }
    }

    /// Loads entry `i` if it matches. `Ok(None)` for non-matches and vanished records.
    fn matching(&self, i: usize) -> Result<Option<Arc<Document>>, DbError> {
        self.check_cancelled()?;
        self.check_deadline()?;
        let doc = match self.snapshot.get(i) {
            None => return Ok(None),
            Some(SnapshotEntry::Loaded(d)) => Arc::clone(d),
            Some(SnapshotEntry::Deferred(id)) => {
                match self.storage.fetch(id).map_err(|e| DbError::storage(self.filter.to_string(), e))? {
                    Some(d) => d,
                    None => return Ok(None),
                }
            }
        };
        Ok(matches(self.resolver.as_ref(), &doc.data, &self.filter).then_some(doc))
    }

    fn shaped(&self, doc: &Document) -> Document {
        match &self.projection {
            Some(shape) => Document {
                id: doc.id.clone(),
                data: self.resolver.project_into(&doc.data, shape),
                metadata: doc.metadata.clone(),
            },
            None => doc.clone(),
        }
    }

    fn sort_cmp(&self, a: &Document, b: &Document) -> std::cmp::Ordering {
        for (path, order) in &self.sort {
            let ka = self.resolver.resolve(&a.data, path);
            let kb = self.resolver.resolve(&b.data, path);
            let ord = compare_for_sort(ka.first(), kb.first());
            if ord.is_ne() {
                return match order {
                    Order::Asc => ord,
                    Order::Desc => ord.reverse(),
                };
            }
        }
        std::cmp::Ordering::Equal
    }

    /// Runs the whole query: filter, sort, skip, limit, projection.
    fn collect(&self) -> Result<Vec<Document>, DbError> {
        let mut hits = Vec::new();
        let cap = if self.sort.is_empty() { self.limit.map(|l| l.saturating_add(self.skip)) } else { None };
        for i in 0..self.snapshot.len() {
            if cap.is_some_and(|c| hits.len() >= c) {
                break;
            }
            if let Some(doc) = self.matching(i)? {
                hits.push(doc);
            }
        }
        if !self.sort.is_empty() {
            self.check_cancelled()?;
            // stable, so ties keep insertion order
            hits.sort_by(|a, b| self.sort_cmp(a, b));
        }
        let out: Vec<Document> = hits
            .iter()
            .skip(self.skip)
            .take(self.limit.unwrap_or(usize::MAX))
            .map(|d| self.shaped(d))
            .collect();
        self.report(out.len());
        Ok(out)
    }

    /// Counts the query once per `find`, however many passes its cursors make.
    fn report(&self, count: usize) {
        if self.reported.swap(true, AtomicOrdering::Relaxed) {
            return;
        }
        let ms = crate::utils::num::u128_to_u64_saturating(self.started.elapsed().as_millis());
        telemetry::log_query(&self.collection, &self.filter.to_string(), ms, count);
    }
}

#[derive(Debug, Clone, Copy, Default)]
struct ScanState {
    entry: usize,
    matched: usize,
    emitted: usize,
    // a side scan that must not count as the query's pass
    quiet: bool,
}

/// Result handle over untyped [`Document`]s.
#[derive(Clone)]
pub struct Cursor {
    source: Arc<CursorSource>,
    buffer: OnceLock<Arc<Vec<Document>>>,
    scan: ScanState,
    // items already yielded since the last reset
    pos: usize,
    failed: bool,
}

impl Cursor {
    pub(crate) fn new(source: CursorSource) -> Self {
        Self {
            source: Arc::new(source),
            buffer: OnceLock::new(),
            scan: ScanState::default(),
            pos: 0,
            failed: false,
        }
    }

    fn materialize(&self) -> Result<Arc<Vec<Document>>, DbError> {
        if let Some(buf) = self.buffer.get() {
            return Ok(Arc::clone(buf));
        }
        let built = Arc::new(self.source.collect()?);
        Ok(Arc::clone(self.buffer.get_or_init(|| built)))
    }

    /// Number of records the cursor produces, after filter, skip and limit.
    ///
    /// # Errors
    /// `Cancelled`, `Timeout` or `Storage` if the scan is interrupted.
    pub fn size(&self) -> Result<usize, DbError> {
        self.source.check_cancelled()?;
        Ok(self.materialize()?.len())
    }

    /// The first record, or `None` for an empty result. Iteration position is untouched.
    ///
    /// # Errors
    /// As [`Cursor::size`].
    pub fn first_or_default(&self) -> Result<Option<Document>, DbError> {
        self.source.check_cancelled()?;
        if self.buffer.get().is_some() || !self.source.sort.is_empty() {
            return Ok(self.materialize()?.first().cloned());
        }
        let mut peek = Self::new_shared(Arc::clone(&self.source));
        peek.scan.quiet = true;
        peek.next().transpose()
    }

    /// Every record from the beginning; repeated calls return equal lists.
    ///
    /// # Errors
    /// As [`Cursor::size`].
    pub fn to_list(&self) -> Result<Vec<Document>, DbError> {
        self.source.check_cancelled()?;
        Ok(self.materialize()?.as_ref().clone())
    }

    /// Rewinds iteration and clears an iteration error. A buffered result is kept.
    pub fn reset(&mut self) {
        self.scan = ScanState::default();
        self.pos = 0;
        self.failed = false;
    }

    /// A typed view of the same results reshaped to `S`.
    #[must_use]
    pub fn project<S: DeserializeOwned>(&self) -> ObjectCursor<S> {
        let mut inner = self.clone();
        inner.reset();
        ObjectCursor { inner, shape: Shape::of::<S>(), _marker: PhantomData }
    }

    /// True when an index narrowed the snapshot this cursor reads.
    #[must_use]
    pub fn used_index(&self) -> bool {
        self.source.snapshot.used_index()
    }

    fn new_shared(source: Arc<CursorSource>) -> Self {
        Self { source, buffer: OnceLock::new(), scan: ScanState::default(), pos: 0, failed: false }
    }

    fn stream_next(&mut self) -> Result<Option<Document>, DbError> {
        let src = Arc::clone(&self.source);
        if src.limit.is_some_and(|l| self.scan.emitted >= l) {
            return Ok(None);
        }
        while self.scan.entry < src.snapshot.len() {
            let i = self.scan.entry;
            let hit = src.matching(i)?;
            self.scan.entry += 1;
            let Some(doc) = hit else { continue };
            self.scan.matched += 1;
            if self.scan.matched <= src.skip {
                continue;
            }
            self.scan.emitted += 1;
            return Ok(Some(src.shaped(&doc)));
        }
        Ok(None)
    }

    fn advance(&mut self) -> Result<Option<Document>, DbError> {
        self.source.check_cancelled()?;
        let buffered = self.buffer.get().cloned();
        let buffered = match buffered {
            Some(b) => Some(b),
            None if !self.source.sort.is_empty() => Some(self.materialize()?),
            None => None,
        };
        let item = match buffered {
            Some(buf) => buf.get(self.pos).cloned(),
            None => {
                let item = self.stream_next()?;
                if item.is_none() && !self.scan.quiet {
                    self.source.report(self.pos);
                }
                item
            }
        };
        if item.is_some() {
            self.pos += 1;
        }
        Ok(item)
    }
}

impl Iterator for Cursor {
    type Item = Result<Document, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        match self.advance() {
            Ok(item) => item.map(Ok),
            Err(e) => {
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cursor {{ collection: {:?}, filter: {}, size: ", self.source.collection, self.source.filter)?;
        match self.materialize() {
            Ok(buf) => write!(f, "{} }}", buf.len()),
            Err(_) => f.write_str("? }"),
        }
    }
}

impl fmt::Debug for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cursor")
            .field("collection", &self.source.collection)
            .field("filter", &self.source.filter.to_string())
            .field("pos", &self.pos)
            .finish_non_exhaustive()
    }
}

/// Result handle that decodes each record into `T`.
///
/// Like [`Cursor`], iteration stops after the first error, including a record that does not
/// decode into `T`, until [`ObjectCursor::reset`].
pub struct ObjectCursor<T> {
    inner: Cursor,
    shape: Option<Shape>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectCursor<T> {
    fn clone(&self) -> Self {
        Self { inner: self.inner.clone(), shape: self.shape.clone(), _marker: PhantomData }
    }
}

impl<T: DeserializeOwned> ObjectCursor<T> {
    pub(crate) const fn new(inner: Cursor) -> Self {
        Self { inner, shape: None, _marker: PhantomData }
    }

    fn decode(&self, doc: &Document) -> Result<T, DbError> {
        let data = match &self.shape {
            Some(shape) => self.inner.source.resolver.project_into(&doc.data, shape),
            None => doc.data.clone(),
        };
        Ok(bson::deserialize_from_document(data)?)
    }

    /// # Errors
    /// As [`Cursor::size`].
    pub fn size(&self) -> Result<usize, DbError> {
        self.inner.size()
    }

    /// # Errors
    /// As [`Cursor::size`], plus `Bson` when the record does not decode into `T`.
    pub fn first_or_default(&self) -> Result<Option<T>, DbError> {
        self.inner.first_or_default()?.map(|d| self.decode(&d)).transpose()
    }

    /// # Errors
    /// As [`ObjectCursor::first_or_default`].
    pub fn to_list(&self) -> Result<Vec<T>, DbError> {
        self.inner.to_list()?.iter().map(|d| self.decode(d)).collect()
    }

    pub fn reset(&mut self) {
        self.inner.reset();
    }

    /// Reshapes to `S`: fields `S` declares are copied by path, everything else is dropped.
    #[must_use]
    pub fn project<S: DeserializeOwned>(&self) -> ObjectCursor<S> {
        self.inner.project::<S>()
    }

    /// The untyped cursor underneath.
    #[must_use]
    pub const fn documents(&self) -> &Cursor {
        &self.inner
    }
}

impl<T: DeserializeOwned> Iterator for ObjectCursor<T> {
    type Item = Result<T, DbError>;

    fn next(&mut self) -> Option<Self::Item> {
        let item = self.inner.next()?.and_then(|d| self.decode(&d));
        if item.is_err() {
            self.inner.failed = true;
        }
        Some(item)
    }
}

impl<T> fmt::Display for ObjectCursor<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.inner, f)
    }
}
