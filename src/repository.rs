//! Typed repositories: a collection whose records are one Rust type.

use crate::collection::Collection;
use crate::document::{Document, Shape};
use crate::errors::DbError;
use crate::query::filters::ALL;
use crate::query::{DeleteReport, FieldPath, Filter, FindOptions, ObjectCursor, UpdateReport};
use crate::types::DocumentId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::marker::PhantomData;
use std::sync::Arc;

pub struct ObjectRepository<T> {
    collection: Arc<Collection>,
    // None when T is not a plain struct; sort fields then go unchecked
    shape: Option<Shape>,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for ObjectRepository<T> {
    fn clone(&self) -> Self {
        Self { collection: Arc::clone(&self.collection), shape: self.shape.clone(), _marker: PhantomData }
    }
}

impl<T: Serialize + DeserializeOwned> ObjectRepository<T> {
    #[must_use]
    pub fn new(collection: Arc<Collection>) -> Self {
        Self { collection, shape: Shape::of::<T>(), _marker: PhantomData }
    }

    #[must_use]
    pub const fn collection(&self) -> &Arc<Collection> {
        &self.collection
    }

    /// # Errors
    /// `Bson` when `record` does not serialize to a document.
    pub fn insert(&self, record: &T) -> Result<DocumentId, DbError> {
        self.collection.insert_document(Document::from_record(record)?)
    }

    /// Inserts in order, stopping at the first failure.
    ///
    /// # Errors
    /// As [`ObjectRepository::insert`].
    pub fn insert_many<'a, I>(&self, records: I) -> Result<Vec<DocumentId>, DbError>
    where
        I: IntoIterator<Item = &'a T>,
        T: 'a,
    {
        records.into_iter().map(|r| self.insert(r)).collect()
    }

    /// # Errors
    /// `NoSuchDocument` for an unknown id; `Bson` when the record does not decode into `T`.
    pub fn get(&self, id: &DocumentId) -> Result<T, DbError> {
        self.collection.find_document(id).ok_or_else(|| DbError::NoSuchDocument(id.to_string()))?.to_record()
    }

    /// # Errors
    /// Caller-input errors for a bad filter; see [`crate::query::find_docs`].
    pub fn find(&self, filter: &Filter) -> Result<ObjectCursor<T>, DbError> {
        self.find_with(filter, &FindOptions::default())
    }

    /// # Errors
    /// As [`ObjectRepository::find`].
    pub fn find_all(&self) -> Result<ObjectCursor<T>, DbError> {
        self.find_with(&ALL, &FindOptions::default())
    }

    /// # Errors
    /// As [`ObjectRepository::find_with`].
    pub fn find_with_options(&self, opts: &FindOptions) -> Result<ObjectCursor<T>, DbError> {
        self.find_with(&ALL, opts)
    }

    /// # Errors
    /// `UnknownSortField` when a sort key names a field `T` does not have; `InvalidQuery` for a
    /// projection option (typed cursors reshape through [`ObjectCursor::project`]); otherwise
    /// as [`crate::query::find_docs`].
    pub fn find_with(&self, filter: &Filter, opts: &FindOptions) -> Result<ObjectCursor<T>, DbError> {
        if opts.projection.is_some() {
            return Err(DbError::InvalidQuery("typed finds reshape with `project`, not a projection option".into()));
        }
        if let (Some(shape), Some(sort)) = (&self.shape, &opts.sort) {
            for spec in sort {
                let path = FieldPath::parse(&spec.field)?;
                if !shape.declares(path.head()) {
                    return Err(DbError::UnknownSortField(spec.field.clone()));
                }
            }
        }
        Ok(ObjectCursor::new(self.collection.find_with(filter, opts)?))
    }

    /// # Errors
    /// As [`ObjectRepository::find`].
    pub fn count(&self, filter: &Filter) -> Result<usize, DbError> {
        self.collection.count(filter)
    }

    /// Replaces every record matching `filter` with `record`.
    ///
    /// # Errors
    /// `Bson` when `record` does not serialize; otherwise as [`ObjectRepository::find`].
    pub fn update(&self, filter: &Filter, record: &T) -> Result<UpdateReport, DbError> {
        let data = bson::serialize_to_document(record)?;
        self.collection.replace_many(filter, &data)
    }

    /// # Errors
    /// As [`ObjectRepository::find`].
    pub fn remove(&self, filter: &Filter) -> Result<DeleteReport, DbError> {
        self.collection.delete_many(filter)
    }

    /// # Errors
    /// See [`Collection::create_index`].
    pub fn create_index(&self, path: &str) -> Result<(), DbError> {
        self.collection.create_index(path)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.collection.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.collection.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Order;
    use crate::query::filters::eq;
    use serde::Deserialize;
    use std::collections::HashMap;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Item {
        name: String,
        qty: i64,
    }

    fn repo() -> ObjectRepository<Item> {
        ObjectRepository::new(Arc::new(Collection::new("items")))
    }

    #[test]
    fn sort_fields_are_checked_against_the_type() {
        let r = repo();
        r.insert(&Item { name: "a".into(), qty: 1 }).unwrap();
        assert!(r.find_with_options(&FindOptions::sort("qty", Order::Desc)).is_ok());
        match r.find_with_options(&FindOptions::sort("price", Order::Asc)) {
            Err(DbError::UnknownSortField(f)) => assert_eq!(f, "price"),
            other => panic!("unexpected {:?}", other.map(|c| c.to_string())),
        }
        let projected = FindOptions::default().with_projection(["name"]);
        assert!(matches!(r.find_with_options(&projected), Err(DbError::InvalidQuery(_))));
    }

    #[test]
    fn map_records_accept_any_sort_path() {
        let r: ObjectRepository<HashMap<String, i64>> = ObjectRepository::new(Arc::new(Collection::new("maps")));
        r.insert(&HashMap::from([("k".to_string(), 1)])).unwrap();
        assert_eq!(r.find_with_options(&FindOptions::sort("anything", Order::Asc)).unwrap().size().unwrap(), 1);
    }

    #[test]
    fn update_replaces_matching_records() {
        let r = repo();
        r.insert_many(&[Item { name: "a".into(), qty: 1 }, Item { name: "b".into(), qty: 2 }]).unwrap();
        let report = r.update(&eq("name", "a"), &Item { name: "a".into(), qty: 9 }).unwrap();
        assert_eq!(report, UpdateReport { matched: 1, modified: 1 });
        let got = r.find(&eq("name", "a")).unwrap().first_or_default().unwrap().unwrap();
        assert_eq!(got.qty, 9);
        assert_eq!(r.remove(&eq("qty", 2)).unwrap().deleted, 1);
        assert_eq!(r.len(), 1);
        let id = r.collection().list_ids()[0].clone();
        assert_eq!(r.get(&id).unwrap().qty, 9);
        r.remove(&ALL).unwrap();
        assert!(matches!(r.get(&id), Err(DbError::NoSuchDocument(_))));
    }
}
