use crate::collection::Collection;
use crate::document::{Document, Shape};
use crate::errors::DbError;
use crate::storage::index::key_from_bson;
use crate::storage::{IndexProbe, StorageEngine, StorageError};
use bson::{Bson, Document as BsonDocument};
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use super::compile::{CompiledFilter, compile};
use super::cursor::{Cursor, CursorSource};
use super::path::FieldPath;
use super::telemetry;
use super::types::{
    CmpOp, DeleteReport, Filter, FindOptions, MAX_PROJECTION_FIELDS, MAX_SORT_FIELDS, Order, UpdateDoc,
    UpdateReport,
};
use super::update::apply_update;

fn non_element_path(raw: &str) -> Result<FieldPath, DbError> {
    let path = FieldPath::parse(raw)?;
    if path.is_element() {
        return Err(DbError::invalid_path(raw, "`$` is only valid inside elemMatch"));
    }
    Ok(path)
}

fn sort_keys(opts: &FindOptions) -> Result<Vec<(FieldPath, Order)>, DbError> {
    let Some(sort) = &opts.sort else {
        return Ok(Vec::new());
    };
    if sort.len() > MAX_SORT_FIELDS {
        return Err(DbError::InvalidQuery(format!(
            "{} sort keys given, at most {MAX_SORT_FIELDS} allowed",
            sort.len()
        )));
    }
    sort.iter().map(|s| Ok((non_element_path(&s.field)?, s.order))).collect()
}

fn projection_shape(opts: &FindOptions) -> Result<Option<Shape>, DbError> {
    let Some(fields) = &opts.projection else {
        return Ok(None);
    };
    if fields.len() > MAX_PROJECTION_FIELDS {
        return Err(DbError::InvalidQuery(format!(
            "{} projection fields given, at most {MAX_PROJECTION_FIELDS} allowed",
            fields.len()
        )));
    }
    let paths = fields.iter().map(|f| non_element_path(f)).collect::<Result<Vec<_>, _>>()?;
    Ok(Some(Shape::from_paths(paths)))
}

fn probe_for(storage: &dyn StorageEngine, path: &FieldPath, values: &[Bson]) -> Option<IndexProbe> {
    if !storage.has_index(path.as_str()) || values.iter().any(|v| key_from_bson(v).is_none()) {
        return None;
    }
    Some(IndexProbe { path: path.clone(), keys: values.to_vec() })
}

fn leaf_probe(storage: &dyn StorageEngine, filter: &CompiledFilter) -> Option<IndexProbe> {
    match filter {
        CompiledFilter::Cmp { path, op: CmpOp::Eq, value } => probe_for(storage, path, std::slice::from_ref(value)),
        CompiledFilter::In { path, values } => probe_for(storage, path, values),
        _ => None,
    }
}

/// Picks an equality the storage can answer from an index: a top-level `eq`/`in`, or one
/// directly under a top-level `and`. Every candidate is still checked against the full filter.
fn plan_index_probe(storage: &dyn StorageEngine, filter: &CompiledFilter) -> Option<IndexProbe> {
    match filter {
        CompiledFilter::And(fs) => fs.iter().find_map(|f| leaf_probe(storage, f)),
        other => leaf_probe(storage, other),
    }
}

/// Validates `filter` and `opts`, snapshots the collection and returns a cursor over the matches.
///
/// # Errors
/// Caller-input errors (`InvalidFieldPath`, `InvalidRegex`, `InvalidQuery`) for a bad filter,
/// sort or projection; `Storage` when the snapshot cannot be taken.
pub fn find_docs(col: &Collection, filter: &Filter, opts: &FindOptions) -> Result<Cursor, DbError> {
    let started = Instant::now();
    let compiled = compile(filter)?;
    let sort = sort_keys(opts)?;
    let projection = projection_shape(opts)?;
    let deadline = opts.timeout_ms.map(|ms| started + Duration::from_millis(ms));

    let storage = col.storage();
    let probe = if col.uses_default_resolver() { plan_index_probe(storage.as_ref(), &compiled) } else { None };
    let snapshot = storage.snapshot(probe.as_ref()).map_err(|e| DbError::storage(compiled.to_string(), e))?;

    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"find\",\"collection\":\"{}\",\"duration_ms\":{},\"used_index\":{},\"snapshot\":{},\"limit\":{},\"skip\":{}}}",
        col.name_str(),
        crate::utils::num::u128_to_u64_saturating(started.elapsed().as_millis()),
        snapshot.used_index(),
        snapshot.len(),
        opts.limit.map_or(0, crate::utils::num::usize_to_u64),
        opts.skip.map_or(0, crate::utils::num::usize_to_u64)
    );

    Ok(Cursor::new(CursorSource {
        storage,
        resolver: col.resolver(),
        collection: col.name_str(),
        snapshot,
        filter: compiled,
        sort,
        projection,
        skip: opts.skip.unwrap_or(0),
        limit: opts.limit,
        timeout_ms: opts.timeout_ms,
        deadline,
        cancel: opts.cancel.clone(),
        started,
        reported: AtomicBool::new(false),
    }))
}

/// # Errors
/// As [`find_docs`].
pub fn count_docs(col: &Collection, filter: &Filter) -> Result<usize, DbError> {
    let start = Instant::now();
    let n = find_docs(col, filter, &FindOptions::default())?.size()?;
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"count\",\"collection\":\"{}\",\"duration_ms\":{},\"result_count\":{}}}",
        col.name_str(),
        crate::utils::num::u128_to_u64_saturating(start.elapsed().as_millis()),
        crate::utils::num::usize_to_u64(n)
    );
    Ok(n)
}

fn matching(col: &Collection, filter: &Filter, first_only: bool) -> Result<Vec<Document>, DbError> {
    let opts = if first_only { FindOptions::limit(0, 1) } else { FindOptions::default() };
    find_docs(col, filter, &opts)?.to_list()
}

/// Writes `doc` back; a record deleted since the snapshot counts as unmodified.
fn write_back(col: &Collection, filter: &Filter, doc: Document) -> Result<bool, DbError> {
    let id = doc.id.to_string();
    match col.storage().replace(doc) {
        Ok(_) => {
            telemetry::record_write("update", &col.name_str(), &id);
            Ok(true)
        }
        Err(StorageError::Missing(_)) => Ok(false),
        Err(e) => Err(DbError::storage(filter.to_string(), e)),
    }
}

fn update_matching(col: &Collection, filter: &Filter, update: &UpdateDoc, first_only: bool) -> Result<UpdateReport, DbError> {
    let bench_start = Instant::now();
    let mut report = UpdateReport::default();
    for mut doc in matching(col, filter, first_only)? {
        report.matched += 1;
        let mut data = doc.data.clone();
        if apply_update(&mut data, update)? {
            doc.update(data);
            if write_back(col, filter, doc)? {
                report.modified += 1;
            }
        }
    }
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"update\",\"collection\":\"{}\",\"duration_ms\":{},\"matched\":{},\"modified\":{}}}",
        col.name_str(),
        crate::utils::num::u128_to_u64_saturating(bench_start.elapsed().as_millis()),
        report.matched,
        report.modified
    );
    Ok(report)
}

/// # Errors
/// As [`find_docs`], plus `InvalidFieldPath` for a malformed update path.
pub fn update_many(col: &Collection, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError> {
    update_matching(col, filter, update, false)
}

/// # Errors
/// As [`update_many`].
pub fn update_one(col: &Collection, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError> {
    update_matching(col, filter, update, true)
}

/// Replaces the fields of every matching record with `data`, keeping ids and positions.
///
/// # Errors
/// As [`find_docs`].
pub fn replace_many(col: &Collection, filter: &Filter, data: &BsonDocument) -> Result<UpdateReport, DbError> {
    let mut report = UpdateReport::default();
    for mut doc in matching(col, filter, false)? {
        report.matched += 1;
        if doc.data == *data {
            continue;
        }
        doc.update(data.clone());
        if write_back(col, filter, doc)? {
            report.modified += 1;
        }
    }
    Ok(report)
}

fn delete_matching(col: &Collection, filter: &Filter, first_only: bool) -> Result<DeleteReport, DbError> {
    let bench_start = Instant::now();
    let mut deleted = 0u64;
    for doc in matching(col, filter, first_only)? {
        match col.storage().remove(&doc.id) {
            Ok(_) => {
                deleted += 1;
                telemetry::record_write("delete", &col.name_str(), &doc.id.to_string());
            }
            Err(StorageError::Missing(_)) => {}
            Err(e) => return Err(DbError::storage(filter.to_string(), e)),
        }
    }
    crate::dev6!(
        "{{\"bench\":\"query\",\"op\":\"delete\",\"collection\":\"{}\",\"duration_ms\":{},\"deleted\":{}}}",
        col.name_str(),
        crate::utils::num::u128_to_u64_saturating(bench_start.elapsed().as_millis()),
        deleted
    );
    Ok(DeleteReport { deleted })
}

/// Removes every record matching `filter`. Matching runs on a snapshot; the removal itself
/// is delegated to storage record by record.
///
/// # Errors
/// As [`find_docs`].
pub fn delete_many(col: &Collection, filter: &Filter) -> Result<DeleteReport, DbError> {
    delete_matching(col, filter, false)
}

/// # Errors
/// As [`find_docs`].
pub fn delete_one(col: &Collection, filter: &Filter) -> Result<DeleteReport, DbError> {
    delete_matching(col, filter, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filters::{ALL, eq, gt, in_};
    use crate::query::types::SortSpec;
    use crate::utils::devlog;
    use bson::doc;

    fn seeded() -> Collection {
        let col = Collection::new("unit_exec");
        for (k, v) in [(1, 3), (2, 1), (3, 2)] {
            col.insert_document(Document::new(doc! {"k": k, "v": v, "x": 0})).unwrap();
        }
        col
    }

    #[test]
    fn find_docs_projection_sort_and_pagination() {
        let col = seeded();
        let opts = FindOptions::sort("v", Order::Asc).with_limit(0, 2).with_projection(["k"]);
        let docs = find_docs(&col, &eq("x", 0), &opts).unwrap().to_list().unwrap();
        assert_eq!(docs.len(), 2);
        assert!(docs[0].data.get("v").is_none());
        assert_eq!(docs[0].data.get_i32("k").unwrap(), 2);
        assert_eq!(docs[1].data.get_i32("k").unwrap(), 3);
    }

    #[test]
    fn option_limits_are_enforced() {
        let col = seeded();
        let sort = (0..=MAX_SORT_FIELDS).map(|n| SortSpec { field: format!("z{n}"), order: Order::Asc }).collect();
        let opts = FindOptions { sort: Some(sort), ..FindOptions::default() };
        assert!(matches!(find_docs(&col, &ALL, &opts), Err(DbError::InvalidQuery(_))));
        let proj = FindOptions::default().with_projection((0..=MAX_PROJECTION_FIELDS).map(|n| format!("p{n}")));
        assert!(matches!(find_docs(&col, &ALL, &proj), Err(DbError::InvalidQuery(_))));
        let elem = FindOptions::sort("$", Order::Asc);
        assert!(matches!(find_docs(&col, &ALL, &elem), Err(DbError::InvalidFieldPath { .. })));
        let bad = FindOptions::sort("a..b", Order::Asc);
        assert!(matches!(find_docs(&col, &ALL, &bad), Err(DbError::InvalidFieldPath { .. })));
    }

    #[test]
    fn index_probe_is_planned_for_top_level_equalities() {
        let col = seeded();
        col.create_index("k").unwrap();
        let _g = devlog::enable_thread_sink();
        assert!(find_docs(&col, &in_("k", [1, 3]), &FindOptions::default()).unwrap().used_index());
        assert!(find_docs(&col, &crate::query::filters::and([gt("v", 0), eq("k", 2)]), &FindOptions::default())
            .unwrap()
            .used_index());
        assert!(!find_docs(&col, &gt("k", 1), &FindOptions::default()).unwrap().used_index());
        assert!(!find_docs(&col, &eq("k", Bson::Null), &FindOptions::default()).unwrap().used_index());
        let lines = devlog::drain();
        assert!(lines.iter().any(|l| l.contains("\"used_index\":true")));
        assert!(lines.iter().any(|l| l.contains("\"used_index\":false")));
    }

    #[test]
    fn update_and_delete_reports() {
        let col = seeded();
        let ud = UpdateDoc { set: vec![("x".into(), Bson::Int32(1))], ..UpdateDoc::default() };
        assert_eq!(update_one(&col, &ALL, &ud).unwrap(), UpdateReport { matched: 1, modified: 1 });
        assert_eq!(update_many(&col, &ALL, &ud).unwrap(), UpdateReport { matched: 3, modified: 2 });
        assert_eq!(count_docs(&col, &eq("x", 1)).unwrap(), 3);
        let r = replace_many(&col, &eq("k", 1), &doc! {"k": 1, "replaced": true}).unwrap();
        assert_eq!(r.modified, 1);
        assert_eq!(delete_one(&col, &gt("k", 1)).unwrap().deleted, 1);
        assert_eq!(delete_many(&col, &ALL).unwrap().deleted, 2);
        assert_eq!(col.len(), 0);
    }
}
