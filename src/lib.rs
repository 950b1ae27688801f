pub mod collection;
pub mod config;
pub mod document;
pub mod errors;
pub mod query;
pub mod repository;
pub mod storage;
pub mod types;
pub mod utils;

use crate::collection::Collection;
use crate::config::EngineConfig;
use crate::document::Document;
use crate::errors::DbError;
use crate::query::{Cursor, DeleteReport, Filter, FindOptions, UpdateDoc, UpdateReport};
use crate::repository::ObjectRepository;
use crate::types::DocumentId;
use parking_lot::RwLock;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::sync::Arc;

/// An in-memory registry of named collections.
pub struct Database {
    collections: RwLock<HashMap<String, Arc<Collection>>>,
    config: EngineConfig,
}

impl Default for Database {
    fn default() -> Self {
        Self::new()
    }
}

impl Database {
    #[must_use]
    pub fn new() -> Self {
        Self::with_config(EngineConfig::default())
    }

    /// Applies `config` to process-wide telemetry. Logging is installed separately through
    /// [`EngineConfig::init_logging`].
    #[must_use]
    pub fn with_config(config: EngineConfig) -> Self {
        query::telemetry::configure(&config);
        Self { collections: RwLock::new(HashMap::new()), config }
    }

    #[must_use]
    pub const fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// # Errors
    /// `CollectionAlreadyExists` if `name` is taken.
    pub fn create_collection(&self, name: &str) -> Result<Arc<Collection>, DbError> {
        let mut cols = self.collections.write();
        if cols.contains_key(name) {
            return Err(DbError::CollectionAlreadyExists(name.to_string()));
        }
        let col = Arc::new(Collection::new(name));
        cols.insert(name.to_string(), Arc::clone(&col));
        log::info!("collection `{name}` created");
        Ok(col)
    }

    /// Registers a collection built elsewhere, e.g. over a custom storage engine or resolver.
    ///
    /// # Errors
    /// `CollectionAlreadyExists` if a collection with the same name is registered.
    pub fn attach_collection(&self, collection: Collection) -> Result<Arc<Collection>, DbError> {
        let name = collection.name_str();
        let mut cols = self.collections.write();
        if cols.contains_key(&name) {
            return Err(DbError::CollectionAlreadyExists(name));
        }
        let col = Arc::new(collection);
        cols.insert(name, Arc::clone(&col));
        Ok(col)
    }

    pub fn get_collection(&self, name: &str) -> Option<Arc<Collection>> {
        self.collections.read().get(name).cloned()
    }

    /// Returns the collection `name`, creating it when missing.
    pub fn collection(&self, name: &str) -> Arc<Collection> {
        if let Some(col) = self.get_collection(name) {
            return col;
        }
        let mut cols = self.collections.write();
        Arc::clone(cols.entry(name.to_string()).or_insert_with(|| Arc::new(Collection::new(name))))
    }

    /// Unregisters `name`. Cursors already open on it keep their snapshot.
    ///
    /// # Errors
    /// `NoSuchCollection` if there is nothing to drop.
    pub fn drop_collection(&self, name: &str) -> Result<(), DbError> {
        match self.collections.write().remove(name) {
            Some(_) => {
                log::info!("collection `{name}` dropped");
                Ok(())
            }
            None => Err(DbError::NoSuchCollection(name.to_string())),
        }
    }

    /// Renaming a collection to its own name is a no-op.
    ///
    /// # Errors
    /// `NoSuchCollection` for an unknown `old`; `CollectionAlreadyExists` when `new` is taken.
    pub fn rename_collection(&self, old: &str, new: &str) -> Result<(), DbError> {
        let mut cols = self.collections.write();
        if old == new {
            return if cols.contains_key(old) { Ok(()) } else { Err(DbError::NoSuchCollection(old.to_string())) };
        }
        if cols.contains_key(new) {
            return Err(DbError::CollectionAlreadyExists(new.to_string()));
        }
        let col = cols.remove(old).ok_or_else(|| DbError::NoSuchCollection(old.to_string()))?;
        col.set_name(new.to_string());
        cols.insert(new.to_string(), col);
        Ok(())
    }

    /// Sorted names of all registered collections.
    pub fn list_collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// A typed view over collection `name`, created on demand.
    pub fn repository<T: Serialize + DeserializeOwned>(&self, name: &str) -> ObjectRepository<T> {
        ObjectRepository::new(self.collection(name))
    }

    fn existing(&self, name: &str) -> Result<Arc<Collection>, DbError> {
        self.get_collection(name).ok_or_else(|| DbError::NoSuchCollection(name.to_string()))
    }

    /// # Errors
    /// `NoSuchCollection`, or as [`Collection::insert_document`].
    pub fn insert_document(&self, collection_name: &str, document: Document) -> Result<DocumentId, DbError> {
        self.existing(collection_name)?.insert_document(document)
    }

    /// # Errors
    /// `NoSuchCollection`, or as [`Collection::update_document`].
    pub fn update_document(
        &self,
        collection_name: &str,
        document_id: &DocumentId,
        new_document: Document,
    ) -> Result<bool, DbError> {
        self.existing(collection_name)?.update_document(document_id, new_document)
    }

    /// # Errors
    /// `NoSuchCollection`, or as [`Collection::delete_document`].
    pub fn delete_document(&self, collection_name: &str, document_id: &DocumentId) -> Result<bool, DbError> {
        self.existing(collection_name)?.delete_document(document_id)
    }

    // --- Query API (façade over query module) ---

    /// # Errors
    /// `NoSuchCollection`, or as [`query::find_docs`].
    pub fn find(&self, collection_name: &str, filter: &Filter, opts: &FindOptions) -> Result<Cursor, DbError> {
        query::find_docs(&*self.existing(collection_name)?, filter, opts)
    }

    /// # Errors
    /// `NoSuchCollection`, or as [`query::count_docs`].
    pub fn count(&self, collection_name: &str, filter: &Filter) -> Result<usize, DbError> {
        query::count_docs(&*self.existing(collection_name)?, filter)
    }

    /// # Errors
    /// `NoSuchCollection`, or as [`query::update_many`].
    pub fn update_many(&self, collection_name: &str, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError> {
        query::update_many(&*self.existing(collection_name)?, filter, update)
    }

    /// # Errors
    /// `NoSuchCollection`, or as [`query::delete_many`].
    pub fn delete_many(&self, collection_name: &str, filter: &Filter) -> Result<DeleteReport, DbError> {
        query::delete_many(&*self.existing(collection_name)?, filter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::filters::{ALL, gt};
    use bson::doc;

    #[test]
    fn registry_lifecycle() {
        let db = Database::new();
        db.create_collection("b").unwrap();
        db.create_collection("a").unwrap();
        assert!(matches!(db.create_collection("a"), Err(DbError::CollectionAlreadyExists(_))));
        assert_eq!(db.list_collection_names(), vec!["a", "b"]);
        db.rename_collection("b", "c").unwrap();
        assert_eq!(db.get_collection("c").unwrap().name_str(), "c");
        db.rename_collection("c", "c").unwrap();
        assert!(matches!(db.rename_collection("zz", "zz"), Err(DbError::NoSuchCollection(_))));
        assert!(matches!(db.rename_collection("c", "a"), Err(DbError::CollectionAlreadyExists(_))));
        db.drop_collection("a").unwrap();
        assert!(matches!(db.drop_collection("a"), Err(DbError::NoSuchCollection(_))));
        assert_eq!(db.list_collection_names(), vec!["c"]);
    }

    #[test]
    fn facade_requires_existing_collection() {
        let db = Database::new();
        assert!(matches!(db.count("nope", &ALL), Err(DbError::NoSuchCollection(_))));
        db.create_collection("nums").unwrap();
        for n in 0..5 {
            db.insert_document("nums", Document::new(doc! {"n": n})).unwrap();
        }
        assert_eq!(db.count("nums", &gt("n", 2)).unwrap(), 2);
        assert_eq!(db.find("nums", &ALL, &FindOptions::limit(1, 2)).unwrap().size().unwrap(), 2);
        assert_eq!(db.delete_many("nums", &gt("n", 3)).unwrap().deleted, 1);
        let update = UpdateDoc { set: vec![("tag".to_string(), bson::Bson::from("low"))], ..UpdateDoc::default() };
        assert_eq!(db.update_many("nums", &crate::query::filters::lt("n", 2), &update).unwrap().modified, 2);
        assert_eq!(db.count("nums", &crate::query::filters::eq("tag", "low")).unwrap(), 2);
        assert!(matches!(db.update_many("nope", &ALL, &update), Err(DbError::NoSuchCollection(_))));
        assert!(matches!(db.delete_many("nope", &ALL), Err(DbError::NoSuchCollection(_))));
    }

    #[test]
    fn attached_collections_keep_their_collaborators() {
        use crate::document::BsonFieldResolver;
        let db = Database::new();
        let col = Collection::new("custom").with_resolver(Arc::new(BsonFieldResolver));
        let attached = db.attach_collection(col).unwrap();
        assert!(!attached.uses_default_resolver());
        assert!(matches!(db.attach_collection(Collection::new("custom")), Err(DbError::CollectionAlreadyExists(_))));
        attached.create_index("n").unwrap();
        attached.insert_document(Document::new(doc! {"n": 1})).unwrap();
        let cur = db.find("custom", &crate::query::filters::eq("n", 1), &FindOptions::default()).unwrap();
        // indexes are skipped for custom resolvers
        assert!(!cur.used_index());
        assert_eq!(cur.size().unwrap(), 1);
    }

    #[test]
    fn repository_shares_the_named_collection() {
        let db = Database::new();
        let r = db.repository::<HashMap<String, i32>>("maps");
        r.insert(&HashMap::from([("x".to_string(), 1)])).unwrap();
        assert_eq!(db.get_collection("maps").unwrap().len(), 1);
        assert!(Arc::ptr_eq(r.collection(), &db.collection("maps")));
    }
}
