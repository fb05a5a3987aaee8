//! Object-store clients, one per reachable node.

mod memory;
mod s3;
mod weed;

pub use memory::MemoryStorageClient;
pub use s3::S3StorageClient;
pub use weed::WeedMasterClient;

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

/// Errors returned by a single node's storage client
#[derive(Debug, Error)]
pub enum StorageError {
    /// The namespace (bucket) is already there.
    #[error("Namespace {0} already exists")]
    AlreadyExists(String),

    /// The requested object does not exist.
    #[error("Object {key} not found in {namespace}")]
    NotFound { namespace: String, key: String },

    /// The key cannot be mapped to a local path safely.
    #[error("Object key {0} escapes the target directory")]
    InvalidKey(String),

    /// The backend has no such operation.
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),

    /// The node could not be reached.
    #[error("Node {0} is unavailable")]
    Unavailable(String),

    /// Any other failure reported by the node.
    #[error("Storage backend error: {0}")]
    Backend(String),

    /// Local file could not be read or written.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Client for one storage node
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// `host:port` the client talks to
    fn endpoint(&self) -> &str;

    /// Cheap liveness probe
    async fn health_check(&self) -> Result<(), StorageError> {
        self.list_namespaces().await.map(|_| ())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, StorageError>;

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, StorageError>;

    /// Create a namespace; fails with [`StorageError::AlreadyExists`] if present
    async fn create_namespace(&self, namespace: &str) -> Result<(), StorageError>;

    async fn put_object(
        &self,
        namespace: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError>;

    /// Keys under `prefix`; a missing namespace lists as empty
    async fn list_objects(
        &self,
        namespace: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<String>, StorageError>;

    async fn get_object(
        &self,
        namespace: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError>;

    async fn remove_object(&self, namespace: &str, key: &str) -> Result<(), StorageError>;
}
