use crate::document::{BsonFieldResolver, FieldResolver};
use crate::storage::{MemoryStore, StorageEngine};
use parking_lot::RwLock;
use std::sync::Arc;

/// A named set of records plus the collaborators queries run through.
pub struct Collection {
    pub name: Arc<RwLock<String>>,
    pub(crate) storage: Arc<dyn StorageEngine>,
    pub(crate) resolver: Arc<dyn FieldResolver>,
    default_resolver: bool,
}

impl Collection {
    /// An in-memory collection using the BSON field resolver.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_storage(name, Arc::new(MemoryStore::new()))
    }

    pub fn with_storage(name: impl Into<String>, storage: Arc<dyn StorageEngine>) -> Self {
        Self {
            name: Arc::new(RwLock::new(name.into())),
            storage,
            resolver: Arc::new(BsonFieldResolver),
            default_resolver: true,
        }
    }

    /// Swaps in a custom resolver. Storage indexes walk plain BSON, so queries on such a
    /// collection always scan.
    #[must_use]
    pub fn with_resolver(mut self, resolver: Arc<dyn FieldResolver>) -> Self {
        self.resolver = resolver;
        self.default_resolver = false;
        self
    }

    pub fn set_name(&self, new_name: String) {
        *self.name.write() = new_name;
    }

    /// Returns the collection's name as a String (cloned), hiding the `RwLock`.
    pub fn name_str(&self) -> String {
        self.name.read().clone()
    }

    pub fn storage(&self) -> Arc<dyn StorageEngine> {
        Arc::clone(&self.storage)
    }

    pub fn resolver(&self) -> Arc<dyn FieldResolver> {
        Arc::clone(&self.resolver)
    }

    #[must_use]
    pub const fn uses_default_resolver(&self) -> bool {
        self.default_resolver
    }
}
