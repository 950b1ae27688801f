use crate::document::types::Metadata;
use crate::errors::DbError;
use crate::types::DocumentId;
use bson::Document as BsonDocument;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A stored record: its identity, its generic field tree, and bookkeeping metadata.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Document {
    pub id: DocumentId,
    pub data: BsonDocument,
    pub metadata: Metadata,
}

impl Document {
    #[must_use]
    pub fn new(data: BsonDocument) -> Self {
        Self { id: DocumentId::new(), data, metadata: Metadata::new() }
    }

    /// Serializes a typed record into a fresh document.
    ///
    /// # Errors
    /// Returns `DbError::Bson` when the record does not serialize to a BSON document
    /// (for example a bare scalar or an unsigned integer above `i64::MAX`).
    pub fn from_record<T: Serialize>(record: &T) -> Result<Self, DbError> {
        Ok(Self::new(bson::serialize_to_document(record)?))
    }

    /// Decodes the document back into a typed record.
    ///
    /// # Errors
    /// Returns `DbError::Bson` when the fields do not fit `T`.
    pub fn to_record<T: DeserializeOwned>(&self) -> Result<T, DbError> {
        Ok(bson::deserialize_from_document(self.data.clone())?)
    }

    pub fn update(&mut self, new_data: BsonDocument) {
        self.data = new_data;
        self.metadata.touch();
    }
}
