use crate::errors::DbError;
use bson::{Bson, Document as BsonDocument};

use super::path::FieldPath;
use super::types::UpdateDoc;

fn ensure_subdoc<'a>(root: &'a mut BsonDocument, key: &str) -> Option<&'a mut BsonDocument> {
    if !matches!(root.get(key), Some(Bson::Document(_))) {
        root.insert(key.to_string(), Bson::Document(BsonDocument::new()));
    }
    match root.get_mut(key) {
        Some(Bson::Document(d)) => Some(d),
        _ => None,
    }
}

/// Writes `value` at `segments`, creating (or overwriting non-document) intermediates.
/// Returns true when the stored value changed.
pub(crate) fn set_path(root: &mut BsonDocument, segments: &[String], value: Bson) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let mut cur = root;
    for seg in parents {
        match ensure_subdoc(cur, seg) {
            Some(next) => cur = next,
            None => return false,
        }
    }
    let old = cur.insert(last.clone(), value.clone());
    old.as_ref() != Some(&value)
}

pub(crate) fn unset_path(root: &mut BsonDocument, segments: &[String]) -> bool {
    let Some((last, parents)) = segments.split_last() else {
        return false;
    };
    let mut cur = root;
    for seg in parents {
        match cur.get_mut(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return false,
        }
    }
    cur.remove(last).is_some()
}

fn get_path<'a>(root: &'a BsonDocument, segments: &[String]) -> Option<&'a Bson> {
    let (last, parents) = segments.split_last()?;
    let mut cur = root;
    for seg in parents {
        match cur.get(seg) {
            Some(Bson::Document(d)) => cur = d,
            _ => return None,
        }
    }
    cur.get(last)
}

#[allow(clippy::cast_precision_loss)]
fn as_f64(v: &Bson) -> f64 {
    match v {
        Bson::Double(f) => *f,
        Bson::Int32(i) => f64::from(*i),
        Bson::Int64(i) => *i as f64,
        _ => 0.0,
    }
}

fn update_path(raw: &str) -> Result<FieldPath, DbError> {
    let path = FieldPath::parse(raw)?;
    if path.is_element() {
        return Err(DbError::invalid_path(raw, "`$` cannot be an update target"));
    }
    Ok(path)
}

/// Applies `set`, then `inc`, then `unset` to `data`. Returns whether anything changed.
///
/// # Errors
/// `DbError::InvalidFieldPath` when any target path is malformed; `data` is untouched then.
pub fn apply_update(data: &mut BsonDocument, upd: &UpdateDoc) -> Result<bool, DbError> {
    let set = upd.set.iter().map(|(k, v)| Ok((update_path(k)?, v))).collect::<Result<Vec<_>, DbError>>()?;
    let inc = upd.inc.iter().map(|(k, by)| Ok((update_path(k)?, *by))).collect::<Result<Vec<_>, DbError>>()?;
    let unset = upd.unset.iter().map(|k| update_path(k)).collect::<Result<Vec<_>, DbError>>()?;

    let mut changed = false;
    for (path, value) in set {
        changed |= set_path(data, path.segments(), value.clone());
    }
    for (path, by) in inc {
        let current = get_path(data, path.segments()).map_or(0.0, as_f64);
        changed |= set_path(data, path.segments(), Bson::Double(current + by));
    }
    for path in unset {
        changed |= unset_path(data, path.segments());
    }
    Ok(changed)
}
