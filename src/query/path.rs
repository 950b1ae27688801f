//! Dotted field paths and their resolution against BSON records.

use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument};
use std::fmt;

/// The token that stands for "the array element under evaluation" inside element-match.
pub const ELEMENT_TOKEN: &str = "$";

pub(crate) const MAX_PATH_DEPTH: usize = 32;
const MAX_PATH_LEN: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    /// Parses and validates a dotted path such as `employeeNote.text` or `$`.
    ///
    /// # Errors
    /// `DbError::InvalidFieldPath` for an empty or oversized path, an empty segment,
    /// or a `$` that is not the whole path.
    pub fn parse(raw: &str) -> Result<Self, DbError> {
        if raw.is_empty() {
            return Err(DbError::invalid_path(raw, "path is empty"));
        }
        if raw.len() > MAX_PATH_LEN {
            return Err(DbError::invalid_path(raw, format!("longer than {MAX_PATH_LEN} bytes")));
        }
        let segments: Vec<String> = raw.split('.').map(str::to_string).collect();
        if segments.len() > MAX_PATH_DEPTH {
            return Err(DbError::invalid_path(raw, format!("deeper than {MAX_PATH_DEPTH} segments")));
        }
        if segments.iter().any(String::is_empty) {
            return Err(DbError::invalid_path(raw, "empty segment"));
        }
        if segments.len() > 1 && segments.iter().any(|s| s == ELEMENT_TOKEN) {
            return Err(DbError::invalid_path(raw, "`$` must be the whole path"));
        }
        Ok(Self { raw: raw.to_string(), segments })
    }

    #[must_use]
    pub fn is_element(&self) -> bool {
        self.raw == ELEMENT_TOKEN
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    #[must_use]
    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    /// First segment; for `a.b.c` this is `a`.
    #[must_use]
    pub fn head(&self) -> &str {
        self.segments.first().map_or("", String::as_str)
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Outcome of resolving a path against one record.
#[derive(Debug, Clone, PartialEq)]
pub enum Resolved<'a> {
    Absent,
    Single(&'a Bson),
    /// The path crossed at least one array, so resolution fanned out over its elements.
    Multi(Vec<&'a Bson>),
}

impl<'a> Resolved<'a> {
    #[must_use]
    pub const fn is_absent(&self) -> bool {
        matches!(self, Self::Absent)
    }

    /// First resolved value; the sort key of a record.
    #[must_use]
    pub fn first(&self) -> Option<&'a Bson> {
        match self {
            Self::Absent => None,
            Self::Single(v) => Some(*v),
            Self::Multi(vs) => vs.first().copied(),
        }
    }

    /// Every value a predicate gets to test: each resolved value, and for array values
    /// also each element. A predicate over a path is satisfied when any leaf satisfies it.
    #[must_use]
    pub fn leaves(&self) -> Vec<&'a Bson> {
        let roots: &[&'a Bson] = match self {
            Self::Absent => &[],
            Self::Single(v) => std::slice::from_ref(v),
            Self::Multi(vs) => vs,
        };
        let mut out = Vec::with_capacity(roots.len());
        for &v in roots {
            out.push(v);
            if let Bson::Array(items) = v {
                out.extend(items.iter());
            }
        }
        out
    }

    /// The arrays reached by the path, for element-match.
    #[must_use]
    pub fn arrays(&self) -> Vec<&'a [Bson]> {
        let roots: &[&'a Bson] = match self {
            Self::Absent => &[],
            Self::Single(v) => std::slice::from_ref(v),
            Self::Multi(vs) => vs,
        };
        roots
            .iter()
            .copied()
            .filter_map(|v| match v {
                Bson::Array(items) => Some(items.as_slice()),
                _ => None,
            })
            .collect()
    }
}

/// Resolves `path` against a top-level record. `$` has no meaning here and resolves to nothing.
#[must_use]
pub fn resolve_document<'a>(doc: &'a BsonDocument, path: &FieldPath) -> Resolved<'a> {
    if path.is_element() {
        return Resolved::Absent;
    }
    let Some((head, rest)) = path.segments.split_first() else {
        return Resolved::Absent;
    };
    let mut out = Vec::new();
    let mut fanned_out = false;
    if let Some(v) = doc.get(head) {
        descend(v, rest, &mut out, &mut fanned_out);
    }
    finish(out, fanned_out)
}

/// Resolves `path` against any value; `$` is the value itself.
#[must_use]
pub fn resolve_value<'a>(value: &'a Bson, path: &FieldPath) -> Resolved<'a> {
    if path.is_element() {
        return Resolved::Single(value);
    }
    let mut out = Vec::new();
    let mut fanned_out = false;
    descend(value, &path.segments, &mut out, &mut fanned_out);
    finish(out, fanned_out)
}

fn descend<'a>(value: &'a Bson, segments: &[String], out: &mut Vec<&'a Bson>, fanned_out: &mut bool) {
    let Some((head, rest)) = segments.split_first() else {
        out.push(value);
        return;
    };
    match value {
        Bson::Document(d) => {
            if let Some(next) = d.get(head) {
                descend(next, rest, out, fanned_out);
            }
        }
        Bson::Array(items) => {
            *fanned_out = true;
            for item in items.iter().filter(|i| matches!(i, Bson::Document(_))) {
                descend(item, segments, out, fanned_out);
            }
        }
        // a name segment against a scalar resolves to nothing
        _ => {}
    }
}

fn finish(mut out: Vec<&Bson>, fanned_out: bool) -> Resolved<'_> {
    if out.is_empty() {
        Resolved::Absent
    } else if fanned_out {
        Resolved::Multi(out)
    } else {
        out.pop().map_or(Resolved::Absent, Resolved::Single)
    }
}
