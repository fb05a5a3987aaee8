use super::{StorageClient, StorageError};
use crate::cli::StorageCredentials;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_credential_types::Credentials;
use aws_sdk_s3::config::retry::RetryConfig;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::{config::Region, Client, Config};
use std::path::Path;
use std::time::Duration;

/// S3 API client for one MinIO node
pub struct S3StorageClient {
    client: Client,
    endpoint: String,
}

impl S3StorageClient {
    pub fn new(endpoint: &str, credentials: &StorageCredentials) -> Self {
        let creds = Credentials::new(
            credentials.user.clone(),
            credentials.password.clone(),
            None,
            None,
            "dfs-deploy",
        );

        // Failover is handled by the caller, so fail fast instead of retrying
        let config = Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new("us-east-1"))
            .endpoint_url(format!("http://{}", endpoint))
            .credentials_provider(creds)
            .force_path_style(true)
            .retry_config(RetryConfig::disabled())
            .timeout_config(
                TimeoutConfig::builder()
                    .connect_timeout(Duration::from_secs(3))
                    .build(),
            )
            .build();

        Self {
            client: Client::from_conf(config),
            endpoint: endpoint.to_string(),
        }
    }
}

fn backend_err<E: std::error::Error>(err: E) -> StorageError {
    StorageError::Backend(DisplayErrorContext(err).to_string())
}

#[async_trait]
impl StorageClient for S3StorageClient {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn list_namespaces(&self) -> Result<Vec<String>, StorageError> {
        let output = self.client.list_buckets().send().await.map_err(backend_err)?;
        Ok(output
            .buckets()
            .iter()
            .filter_map(|b| b.name().map(str::to_string))
            .collect())
    }

    async fn namespace_exists(&self, namespace: &str) -> Result<bool, StorageError> {
        match self.client.head_bucket().bucket(namespace).send().await {
            Ok(_) => Ok(true),
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false);
                if missing {
                    Ok(false)
                } else {
                    Err(backend_err(err))
                }
            }
        }
    }

    async fn create_namespace(&self, namespace: &str) -> Result<(), StorageError> {
        match self.client.create_bucket().bucket(namespace).send().await {
            Ok(_) => Ok(()),
            Err(err) => {
                let exists = err
                    .as_service_error()
                    .map(|e| e.is_bucket_already_owned_by_you() || e.is_bucket_already_exists())
                    .unwrap_or(false);
                if exists {
                    Err(StorageError::AlreadyExists(namespace.to_string()))
                } else {
                    Err(backend_err(err))
                }
            }
        }
    }

    async fn put_object(
        &self,
        namespace: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        let body = ByteStream::from_path(local_path)
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?;
        self.client
            .put_object()
            .bucket(namespace)
            .key(key)
            .body(body)
            .send()
            .await
            .map_err(backend_err)?;
        Ok(())
    }

    async fn list_objects(
        &self,
        namespace: &str,
        prefix: &str,
        recursive: bool,
    ) -> Result<Vec<String>, StorageError> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(namespace)
                .prefix(prefix)
                .set_continuation_token(token.take());
            if !recursive {
                request = request.delimiter("/");
            }

            let output = match request.send().await {
                Ok(output) => output,
                Err(err) => {
                    let missing = err
                        .as_service_error()
                        .map(|e| e.is_no_such_bucket())
                        .unwrap_or(false);
                    if missing {
                        return Ok(keys);
                    }
                    return Err(backend_err(err));
                }
            };

            keys.extend(
                output
                    .contents()
                    .iter()
                    .filter_map(|o| o.key().map(str::to_string)),
            );

            match output.next_continuation_token() {
                Some(next) if output.is_truncated() == Some(true) => token = Some(next.to_string()),
                _ => break,
            }
        }

        Ok(keys)
    }

    async fn get_object(
        &self,
        namespace: &str,
        key: &str,
        local_path: &Path,
    ) -> Result<(), StorageError> {
        let output = match self.client.get_object().bucket(namespace).key(key).send().await {
            Ok(output) => output,
            Err(err) => {
                let missing = err
                    .as_service_error()
                    .map(|e| e.is_no_such_key())
                    .unwrap_or(false);
                if missing {
                    return Err(StorageError::NotFound {
                        namespace: namespace.to_string(),
                        key: key.to_string(),
                    });
                }
                return Err(backend_err(err));
            }
        };

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Backend(e.to_string()))?
            .into_bytes();

        if let Some(parent) = local_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(local_path, data).await?;
        Ok(())
    }

    async fn remove_object(&self, namespace: &str, key: &str) -> Result<(), StorageError> {
        self.client
            .delete_object()
            .bucket(namespace)
            .key(key)
            .send()
            .await
            .map_err(backend_err)?;
        Ok(())
    }
}
