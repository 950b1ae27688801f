use crate::document::shape::Shape;
use crate::query::path::{self, FieldPath, Resolved};
use crate::query::update::set_path;
use bson::{Bson, Document as BsonDocument};

/// Turns a record into values addressable by field path.
///
/// The query engine only ever reads records through this trait, so record kinds with their
/// own introspection (generated accessors, foreign layouts) can plug in beside the default
/// BSON walker.
pub trait FieldResolver: Send + Sync {
    /// Resolves `path` against a top-level record.
    fn resolve<'a>(&self, record: &'a BsonDocument, path: &FieldPath) -> Resolved<'a>;

    /// Resolves `path` against an arbitrary value, such as an array element under
    /// element-match. `$` yields the value itself.
    fn resolve_value<'a>(&self, value: &'a Bson, path: &FieldPath) -> Resolved<'a>;

    /// Copies the fields `shape` declares out of `record`; everything else is dropped and
    /// declared fields missing from `record` stay missing.
    fn project_into(&self, record: &BsonDocument, shape: &Shape) -> BsonDocument {
        let mut out = BsonDocument::new();
        for field in shape.fields() {
            let value = match self.resolve(record, field) {
                Resolved::Absent => continue,
                Resolved::Single(v) => v.clone(),
                Resolved::Multi(vs) => Bson::Array(vs.into_iter().cloned().collect()),
            };
            set_path(&mut out, field.segments(), value);
        }
        out
    }
}

/// Default resolver over plain BSON trees.
#[derive(Debug, Clone, Copy, Default)]
pub struct BsonFieldResolver;

impl FieldResolver for BsonFieldResolver {
    fn resolve<'a>(&self, record: &'a BsonDocument, path: &FieldPath) -> Resolved<'a> {
        path::resolve_document(record, path)
    }

    fn resolve_value<'a>(&self, value: &'a Bson, path: &FieldPath) -> Resolved<'a> {
        path::resolve_value(value, path)
    }
}
