//! In-process storage client for tests and dry runs.
//!
//! Clones share one store, so several "nodes" built from the same
//! instance behave like one consistent cluster.

use super::{StorageClient, StorageError};
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Default)]
struct Store {
    namespaces: BTreeMap<String, BTreeMap<String, Vec<u8>>>,
}

#[derive(Clone)]
pub struct MemoryStorageClient {
    endpoint: String,
    store: Arc<Mutex<Store>>,
    available: Arc<AtomicBool>,
    calls: Arc<AtomicUsize>,
    exists_delay: Duration,
    failing_keys: Arc<Mutex<BTreeSet<String>>>,
}

impl MemoryStorageClient {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            store: Arc::new(Mutex::new(Store::default())),
            available: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
            exists_delay: Duration::ZERO,
            failing_keys: Arc::new(Mutex::new(BTreeSet::new())),
        }
    }

    /// Another node backed by the same store, with its own availability
    pub fn peer(&self, endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            store: Arc::clone(&self.store),
            available: Arc::new(AtomicBool::new(true)),
            calls: Arc::new(AtomicUsize::new(0)),
            exists_delay: self.exists_delay,
            failing_keys: Arc::clone(&self.failing_keys),
        }
    }

    /// Delay existence checks after the state has been read
    pub fn with_exists_delay(mut self, delay: Duration) -> Self {
        self.exists_delay = delay;
        self
    }

    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    /// Number of calls this node has received
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Make puts, reads and removals of `key` fail on every node sharing
    /// this store
    pub fn fail_key(&self, key: &str) {
        if let Ok(mut keys) = self.failing_keys.lock() {
            keys.insert(key.to_string());
        }
    }

    fn check_key(&self, key: &str) -> Result<(), StorageError> {
        let failing = self
            .failing_keys
            .lock()
            .map(|keys| keys.contains(key))
            .unwrap_or(false);
        if failing {
            return Err(StorageError::Backend(format!("injected failure for {}", key)));
        }
        Ok(())
    }

    fn enter(&self) -> Result<(), StorageError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(StorageError::Unavailable(self.endpoint.clone()))
        }
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Store>, StorageError> {
        self.store
            .lock()
            .map_err(|_| StorageError::Backend("store lock poisoned".to_string()))
    }
}

#[async_trait]
impl StorageClient for MemoryStorageClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, StorageError> {
        self.enter()?;
        Ok(self.lock()?.namespaces.keys().cloned().collect())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, StorageError> {
        self.enter()?;
        let exists = self.lock()?.namespaces.contains_key(namespace);
        if !self.exists_delay.is_zero() {
            tokio::time::sleep(self.exists_delay).await;
        }
        Ok(exists)
    }

    async fn create_namespace(&self, namespace: &str) -> Result<(), StorageError> {
        self.enter()?;
        let mut store = self.lock()?;
        if store.namespaces.contains_key(namespace) {
            return Err(StorageError::AlreadyExists(namespace.to_string()));
        }
        store.namespaces.insert(namespace.to_string(), BTreeMap::new());
        Ok(())
    }

    async fn put_object(
        &self,
        namespace: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        self.enter()?;
        self.check_key(key)?;
        let data = tokio::fs::read(local_path).await?;
        let mut store = self.lock()?;
        let objects = store
            .namespaces
            .get_mut(namespace)
            .ok_or_else(|| StorageError::Backend(format!("no such namespace {}", namespace)))?;
        objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn list_objects(
        &self,
        namespace: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<String>, StorageError> {
        self.enter()?;
        let store = self.lock()?;
        let Some(objects) = store.namespaces.get(namespace) else {
            return Ok(Vec::new());
        };
        Ok(objects
            .keys()
            .filter(|k| k.starts_with(prefix))
            .filter(|k| recursive || !k[prefix.len()..].contains('/'))
            .cloned()
            .collect())
    }

    async fn get_object(
        &self,
        namespace: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        self.enter()?;
        self.check_key(key)?;

        let data = self
            .lock()?
            .namespaces
            .get(namespace)
            .and_then(|objects| objects.get(key))
            .cloned()
            .ok_or_else(|| StorageError::NotFound {
                namespace: namespace.to_string(),
                key: key.to_string(),
            })?;

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn remove_object(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.enter()?;
        self.check_key(key)?;
        if let Some(objects) = self.lock()?.namespaces.get_mut(namespace) {
            objects.remove(key);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_peers_share_objects() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"hello").unwrap();

        let a = MemoryStorageClient::new("a:9000");
        let b = a.peer("b:9000");
        a.create_namespace("dfs").await.unwrap();
        a.put_object("dfs", "x/a.txt", &src).await.unwrap();

        let out = dir.path().join("out/a.txt");
        b.get_object("dfs", "x/a.txt", &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"hello");
    }

    #[tokio::test]
    async fn test_create_twice_reports_already_exists() {
        let client = MemoryStorageClient::new("a:9000");
        client.create_namespace("dfs").await.unwrap();
        assert!(matches!(
            client.create_namespace("dfs").await,
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[tokio::test]
    async fn test_listing_respects_delimiter() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("f");
        std::fs::write(&src, b"1").unwrap();

        let client = MemoryStorageClient::new("a:9000");
        assert!(client.list_objects("dfs", "", true).await.unwrap().is_empty());

        client.create_namespace("dfs").await.unwrap();
        client.put_object("dfs", "d/one", &src).await.unwrap();
        client.put_object("dfs", "d/sub/two", &src).await.unwrap();

        assert_eq!(client.list_objects("dfs", "d/", false).await.unwrap(), vec!["d/one"]);
        assert_eq!(
            client.list_objects("dfs", "d/", true).await.unwrap(),
            vec!["d/one", "d/sub/two"]
        );
    }

    #[tokio::test]
    async fn test_unavailable_node_errors() {
        let client = MemoryStorageClient::new("a:9000");
        client.set_available(false);
        assert!(matches!(
            client.health_check().await,
            Err(StorageError::Unavailable(_))
        ));
        assert_eq!(client.calls(), 1);
    }

    #[tokio::test]
    async fn test_failing_key_blocks_put_and_remove() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.txt");
        std::fs::write(&src, b"hello").unwrap();

        let node = MemoryStorageClient::new("a:9000");
        node.create_namespace("dfs").await.unwrap();
        node.put_object("dfs", "kept", &src).await.unwrap();
        node.fail_key("kept");
        node.fail_key("new");

        assert!(matches!(
            node.put_object("dfs", "new", &src).await,
            Err(StorageError::Backend(_))
        ));
        assert!(matches!(
            node.remove_object("dfs", "kept").await,
            Err(StorageError::Backend(_))
        ));
        assert_eq!(node.list_objects("dfs", "", true).await.unwrap(), vec!["kept"]);
    }
}
