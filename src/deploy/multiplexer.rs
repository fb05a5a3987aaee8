//! Object operations that fail over across cluster nodes.
//!
//! Nodes are tried in topology order and the first one that answers wins.
//! Nothing is fanned out or merged, so nodes holding different data will
//! give different answers depending on which one is up.

use super::paths::{absolute, is_contained, normalize_directory, normalize_file};
use crate::error::{DeployError, Result};
use crate::storage::{StorageClient, StorageError};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Namespace every object lives in
pub const NAMESPACE: &str = "dfs";

type ClientSet = Arc<[Arc<dyn StorageClient>]>;
type Connector = Box<dyn Fn() -> Vec<Arc<dyn StorageClient>> + Send + Sync>;

/// One client per node, built lazily and rebuilt after invalidation
pub struct FailoverClient {
    connector: Connector,
    clients: Mutex<Option<ClientSet>>,
    namespace: String,
}

impl FailoverClient {
    /// Build clients on first use with `connector`
    pub fn new<F>(connector: F) -> Self
    where
        F: Fn() -> Vec<Arc<dyn StorageClient>> + Send + Sync + 'static,
    {
        Self {
            connector: Box::new(connector),
            clients: Mutex::new(None),
            namespace: NAMESPACE.to_string(),
        }
    }

    /// Fixed set of clients, mostly for tests
    pub fn from_clients(clients: Vec<Arc<dyn StorageClient>>) -> Self {
        Self::new(move || clients.clone())
    }

    /// Current client set, building it if missing or empty.
    ///
    /// The lock is held while building so concurrent first callers share one
    /// construction.
    pub async fn clients(&self) -> ClientSet {
        let mut guard = self.clients.lock().await;
        if let Some(clients) = guard.as_ref().filter(|c| !c.is_empty()) {
            return Arc::clone(clients);
        }
        let clients: ClientSet = (self.connector)().into();
        debug!("Built {} storage clients", clients.len());
        *guard = Some(Arc::clone(&clients));
        clients
    }

    /// Drop the client set; the next operation rebuilds it
    pub async fn invalidate(&self) {
        *self.clients.lock().await = None;
    }

    /// Run `op` against each node in order until one succeeds
    async fn failover<T, F, Fut>(&self, operation: &'static str, mut op: F) -> Result<T>
    where
        F: FnMut(Arc<dyn StorageClient>) -> Fut,
        Fut: Future<Output = std::result::Result<T, StorageError>>,
    {
        let clients = self.clients().await;
        for client in clients.iter() {
            match op(Arc::clone(client)).await {
                Ok(value) => return Ok(value),
                Err(e) => warn!("{} failed on {}: {}", operation, client.endpoint(), e),
            }
        }
        Err(DeployError::NoReachableNode { operation })
    }

    /// Whether at least one node passes its health check
    pub async fn is_running(&self) -> bool {
        self.failover("health check", |client| async move { client.health_check().await })
            .await
            .is_ok()
    }

    /// Upload one file under its absolute path
    pub async fn upload_file(&self, file: &Path) -> Result<()> {
        let key = normalize_file(&absolute(file)?);
        let namespace = self.namespace.as_str();
        let key = key.as_str();
        self.failover("upload file", |client| async move {
            ensure_namespace(client.as_ref(), namespace).await?;
            client.put_object(namespace, key, file).await
        })
        .await?;
        info!("Uploaded {}", key);
        Ok(())
    }

    /// Upload every file below `dir`, returning how many were sent.
    ///
    /// The whole directory goes to one node. If any put fails, the upload
    /// restarts from the first file on the next node.
    pub async fn upload_dir(&self, dir: &Path) -> Result<usize> {
        let root = PathBuf::from(absolute(dir)?);
        let files: Vec<(String, PathBuf)> = collect_files(root.clone())
            .await?
            .into_iter()
            .map(|path| (normalize_file(&path.to_string_lossy()), path))
            .collect();
        let namespace = self.namespace.as_str();
        let files = files.as_slice();

        self.failover("upload directory", |client| async move {
            ensure_namespace(client.as_ref(), namespace).await?;
            for (key, path) in files {
                client.put_object(namespace, key, path).await?;
                debug!("Uploaded {} to {}", key, client.endpoint());
            }
            Ok::<_, StorageError>(())
        })
        .await?;

        info!("Uploaded {} files from {}", files.len(), root.display());
        Ok(files.len())
    }

    /// Keys stored below `dir`
    pub async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        let prefix = normalize_directory(&absolute(dir)?);
        let namespace = self.namespace.as_str();
        let prefix = prefix.as_str();
        self.failover("list", |client| async move {
            client.list_objects(namespace, prefix, true).await
        })
        .await
    }

    /// Download every object under `prefix` into `out/<key>`.
    ///
    /// Only the listing fails over. Once a node has listed the keys, a failed
    /// object read stops the download with [`DeployError::Partial`].
    pub async fn download(&self, prefix: &Path, out: &Path) -> Result<usize> {
        let prefix = normalize_directory(&absolute(prefix)?);
        let (client, keys) = self.list_on_first_reachable("download", &prefix).await?;

        let mut completed = 0;
        for key in &keys {
            let fetched = if is_contained(key) {
                client.get_object(&self.namespace, key, &out.join(key)).await
            } else {
                Err(StorageError::InvalidKey(key.clone()))
            };
            fetched.map_err(|source| DeployError::Partial {
                operation: "download",
                completed,
                source,
            })?;
            completed += 1;
        }

        info!("Downloaded {} objects from {}", completed, client.endpoint());
        Ok(completed)
    }

    pub async fn remove_file(&self, file: &Path) -> Result<()> {
        let key = normalize_file(&absolute(file)?);
        let namespace = self.namespace.as_str();
        let key = key.as_str();
        self.failover("remove file", |client| async move {
            client.remove_object(namespace, key).await
        })
        .await?;
        info!("Removed {}", key);
        Ok(())
    }

    /// Remove every object under `dir`, returning how many were deleted
    pub async fn remove_dir(&self, dir: &Path) -> Result<usize> {
        let prefix = normalize_directory(&absolute(dir)?);
        let (client, keys) = self
            .list_on_first_reachable("remove directory", &prefix)
            .await?;

        let mut completed = 0;
        for key in &keys {
            client
                .remove_object(&self.namespace, key)
                .await
                .map_err(|source| DeployError::Partial {
                    operation: "remove directory",
                    completed,
                    source,
                })?;
            completed += 1;
        }

        info!("Removed {} objects under {}", completed, prefix);
        Ok(completed)
    }

    async fn list_on_first_reachable(
        &self,
        operation: &'static str,
        prefix: &str,
    ) -> Result<(Arc<dyn StorageClient>, Vec<String>)> {
        let namespace = self.namespace.as_str();
        self.failover(operation, |client| async move {
            let keys = client.list_objects(namespace, prefix, true).await?;
            Ok::<_, StorageError>((client, keys))
        })
        .await
    }
}

/// Create the namespace unless present; losing a creation race is fine
async fn ensure_namespace(
    client: &dyn StorageClient,
    namespace: &str,
) -> std::result::Result<(), StorageError> {
    if client.namespace_exists(namespace).await? {
        return Ok(());
    }
    match client.create_namespace(namespace).await {
        Ok(()) | Err(StorageError::AlreadyExists(_)) => Ok(()),
        Err(e) => Err(e),
    }
}

/// Every non-directory entry below `root`, symlinks followed, sorted
async fn collect_files(root: PathBuf) -> Result<Vec<PathBuf>> {
    let walk = tokio::task::spawn_blocking(move || {
        let mut files = Vec::new();
        for entry in WalkDir::new(&root).follow_links(true).sort_by_file_name() {
            let entry = entry.map_err(std::io::Error::from)?;
            if !entry.file_type().is_dir() {
                files.push(entry.into_path());
            }
        }
        Ok::<_, std::io::Error>(files)
    });
    Ok(walk.await??)
}
