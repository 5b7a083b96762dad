//! In-memory storage implementation.

use super::{SceneDocument, Storage, StorageError, StorageResult};
use std::collections::HashMap;
use std::sync::RwLock;

/// Documents kept in a map, for tests and hosts without a filesystem.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    documents: RwLock<HashMap<String, SceneDocument>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    fn save(&self, id: &str, document: &SceneDocument) -> StorageResult<()> {
        let mut docs = self.documents.write().map_err(|_| StorageError::Poisoned)?;
        docs.insert(id.to_string(), document.clone());
        Ok(())
    }

    fn load(&self, id: &str) -> StorageResult<SceneDocument> {
        let docs = self.documents.read().map_err(|_| StorageError::Poisoned)?;
        docs.get(id)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(id.to_string()))
    }

    fn delete(&self, id: &str) -> StorageResult<()> {
        let mut docs = self.documents.write().map_err(|_| StorageError::Poisoned)?;
        docs.remove(id);
        Ok(())
    }

    fn list(&self) -> StorageResult<Vec<String>> {
        let docs = self.documents.read().map_err(|_| StorageError::Poisoned)?;
        let mut ids: Vec<String> = docs.keys().cloned().collect();
        ids.sort();
        Ok(ids)
    }

    fn exists(&self, id: &str) -> StorageResult<bool> {
        let docs = self.documents.read().map_err(|_| StorageError::Poisoned)?;
        Ok(docs.contains_key(id))
    }
}
