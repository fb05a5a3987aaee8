use super::{StorageClient, StorageError};
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// Client for a SeaweedFS master.
///
/// Only cluster health is exposed; object operations report
/// [`StorageError::Unsupported`].
pub struct WeedMasterClient {
    http: reqwest::Client,
    endpoint: String,
}

#[derive(Debug, Deserialize)]
struct ClusterStatus {
    #[serde(rename = "IsLeader", default)]
    is_leader: bool,
    #[serde(rename = "Leader", default)]
    leader: String,
}

impl WeedMasterClient {
    pub fn new(endpoint: &str) -> Result<Self, StorageError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(3))
            .build()
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.to_string(),
        })
    }
}

#[async_trait]
impl StorageClient for WeedMasterClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn health_check(&self) -> Result<(), StorageError> {
        let url = format!("http://{}/cluster/status", self.endpoint);
        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| StorageError::Unavailable(format!("{}: {}", self.endpoint, e)))?;

        if !response.status().is_success() {
            return Err(StorageError::Backend(format!(
                "{} returned {}",
                url,
                response.status()
            )));
        }

        let status: ClusterStatus = response
            .json()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        debug!(
            "Master {} leader={} is_leader={}",
            self.endpoint, status.leader, status.is_leader
        );

        // A master without an elected leader cannot serve writes yet
        if status.leader.is_empty() && !status.is_leader {
            return Err(StorageError::Unavailable(format!(
                "{}: no leader elected",
                self.endpoint
            )));
        }
        Ok(())
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, StorageError> {
        Err(StorageError::Unsupported("list namespaces"))
    }

    async fn namespace_exists(&self, _namespace: &str) -> Result<bool, StorageError> {
        Err(StorageError::Unsupported("namespace lookup"))
    }

    async fn create_namespace(&self, _namespace: &str) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("create namespace"))
    }

    async fn put_object(&self, _: &str, _: &str, _: &Path) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("upload"))
    }

    async fn list_objects(&self, _: &str, _: &str, _: bool) -> Result<Vec<String>, StorageError> {
        Err(StorageError::Unsupported("list"))
    }

    async fn get_object(&self, _: &str, _: &str, _: &Path) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("download"))
    }

    async fn remove_object(&self, _: &str, _: &str) -> Result<(), StorageError> {
        Err(StorageError::Unsupported("remove"))
    }
}
