use super::core::Collection;
use crate::document::Document;
use crate::errors::DbError;
use crate::query::{self, Cursor, DeleteReport, FieldPath, Filter, FindOptions, UpdateDoc, UpdateReport};
use crate::storage::{IndexStats, StorageError};
use crate::query::telemetry;
use crate::types::DocumentId;
use bson::Document as BsonDocument;

impl Collection {
    /// # Errors
    /// `Storage` when a record with the same id already exists.
    pub fn insert_document(&self, document: Document) -> Result<DocumentId, DbError> {
        let doc_id = self.storage.insert(document).map_err(|e| DbError::storage("insert", e))?;
        telemetry::record_write("insert", &self.name_str(), &doc_id.to_string());
        Ok(doc_id)
    }

    pub fn find_document(&self, id: &DocumentId) -> Option<Document> {
        self.storage.get(id).map(|d| d.as_ref().clone())
    }

    /// Replaces the record `id` with `new_document`, keeping the id, position and creation time.
    /// Returns false when no such record exists.
    ///
    /// # Errors
    /// `Storage` for storage failures other than a missing record.
    pub fn update_document(&self, id: &DocumentId, new_document: Document) -> Result<bool, DbError> {
        let Some(old) = self.storage.get(id) else {
            return Ok(false);
        };
        let mut doc = new_document;
        doc.id = id.clone();
        doc.metadata.created_at = old.metadata.created_at;
        doc.metadata.touch();
        match self.storage.replace(doc) {
            Ok(_) => {
                telemetry::record_write("update", &self.name_str(), &id.to_string());
                Ok(true)
            }
            Err(StorageError::Missing(_)) => Ok(false),
            Err(e) => Err(DbError::storage("update", e)),
        }
    }

    /// # Errors
    /// `Storage` for storage failures other than a missing record.
    pub fn delete_document(&self, id: &DocumentId) -> Result<bool, DbError> {
        match self.storage.remove(id) {
            Ok(_) => {
                telemetry::record_write("delete", &self.name_str(), &id.to_string());
                Ok(true)
            }
            Err(StorageError::Missing(_)) => Ok(false),
            Err(e) => Err(DbError::storage("delete", e)),
        }
    }

    /// Return only the IDs of all documents, in insertion order.
    pub fn list_ids(&self) -> Vec<DocumentId> {
        self.storage.ids()
    }

    pub fn len(&self) -> usize {
        self.storage.len()
    }

    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// Builds a hash index so `eq`/`in` filters on `path` read candidates instead of scanning.
    ///
    /// # Errors
    /// `InvalidFieldPath` for a malformed path; `Storage` if the index exists or the engine
    /// has no index support.
    pub fn create_index(&self, path: &str) -> Result<(), DbError> {
        let path = FieldPath::parse(path)?;
        if path.is_element() {
            return Err(DbError::invalid_path(path.as_str(), "`$` cannot be indexed"));
        }
        self.storage.create_index(&path).map_err(|e| DbError::storage("create_index", e))?;
        log::info!("collection `{}`: index on `{path}` created", self.name_str());
        Ok(())
    }

    /// # Errors
    /// `Storage` when there is no index on `path`.
    pub fn drop_index(&self, path: &str) -> Result<(), DbError> {
        self.storage.drop_index(path).map_err(|e| DbError::storage("drop_index", e))
    }

    pub fn index_stats(&self, path: &str) -> Option<IndexStats> {
        self.storage.index_stats(path)
    }

    // --- Query API (façade over query module) ---

    /// # Errors
    /// See [`query::find_docs`].
    pub fn find(&self, filter: &Filter) -> Result<Cursor, DbError> {
        query::find_docs(self, filter, &FindOptions::default())
    }

    /// # Errors
    /// See [`query::find_docs`].
    pub fn find_with(&self, filter: &Filter, opts: &FindOptions) -> Result<Cursor, DbError> {
        query::find_docs(self, filter, opts)
    }

    /// # Errors
    /// See [`query::find_docs`].
    pub fn count(&self, filter: &Filter) -> Result<usize, DbError> {
        query::count_docs(self, filter)
    }

    /// # Errors
    /// See [`query::update_many`].
    pub fn update_many(&self, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError> {
        query::update_many(self, filter, update)
    }

    /// # Errors
    /// See [`query::update_many`].
    pub fn update_one(&self, filter: &Filter, update: &UpdateDoc) -> Result<UpdateReport, DbError> {
        query::update_one(self, filter, update)
    }

    /// # Errors
    /// See [`query::replace_many`].
    pub fn replace_many(&self, filter: &Filter, data: &BsonDocument) -> Result<UpdateReport, DbError> {
        query::replace_many(self, filter, data)
    }

    /// # Errors
    /// See [`query::delete_many`].
    pub fn delete_many(&self, filter: &Filter) -> Result<DeleteReport, DbError> {
        query::delete_many(self, filter)
    }

    /// # Errors
    /// See [`query::delete_many`].
    pub fn delete_one(&self, filter: &Filter) -> Result<DeleteReport, DbError> {
        query::delete_one(self, filter)
    }
}
