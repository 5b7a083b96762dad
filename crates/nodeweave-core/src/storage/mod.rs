//! Storage abstraction for persistence.
//!
//! Loading and saving are synchronous bulk transforms that run outside the
//! per-tick loop, so backends are plain blocking calls.

mod document;
mod file;
mod memory;

pub use document::{DOCUMENT_VERSION, EdgeRecord, NodeRecord, SceneDocument};
pub use file::FileStorage;
pub use memory::MemoryStorage;

use crate::error::SceneError;
use crate::scene::Scene;
use std::path::PathBuf;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Document not found: {0}")]
    NotFound(String),
    #[error("Failed to parse document {id}: {source}")]
    Parse {
        id: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to encode document: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("IO error on {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Storage lock poisoned")]
    Poisoned,
    #[error("Document rejected: {0}")]
    Rejected(#[from] SceneError),
}

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for document storage backends.
pub trait Storage: Send + Sync {
    /// Save a document.
    fn save(&self, id: &str, document: &SceneDocument) -> StorageResult<()>;

    /// Load a document.
    fn load(&self, id: &str) -> StorageResult<SceneDocument>;

    /// Delete a document. Deleting a missing document is not an error.
    fn delete(&self, id: &str) -> StorageResult<()>;

    /// List all document IDs.
    fn list(&self) -> StorageResult<Vec<String>>;

    /// Check if a document exists.
    fn exists(&self, id: &str) -> StorageResult<bool>;

    /// Load a document and rebuild its scene, rejecting invalid content.
    fn load_scene(&self, id: &str) -> StorageResult<Scene> {
        Ok(self.load(id)?.to_scene()?)
    }

    /// Save a snapshot of `scene`.
    fn save_scene(&self, id: &str, scene: &Scene) -> StorageResult<()> {
        self.save(id, &scene.to_document())
    }
}
