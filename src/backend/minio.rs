use super::{Artifact, ArtifactKind, Backend, BackendKind, Layout, Platform};
use crate::cli::{ClusterConfig, StorageCredentials};
use crate::error::Result;
use crate::storage::{S3StorageClient, StorageClient, StorageError};
use crate::topology::{DeploymentMode, NodeDescriptor, Role, Topology};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Well-known MinIO API port
pub const MINIO_PORT: u16 = 9000;

/// MinIO: every host runs one storage server on the same port
#[derive(Debug, Clone, Copy, Default)]
pub struct MinioBackend;

impl Backend for MinioBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Minio
    }

    fn binary_name(&self) -> &'static str {
        "minio"
    }

    fn layout(&self) -> Layout {
        Layout::Collapsed {
            role: Role::Storage,
            port: MINIO_PORT,
        }
    }

    fn artifact(&self, platform: &Platform) -> Result<Artifact> {
        let arch = platform.release_arch()?;
        Ok(Artifact {
            url: format!(
                "https://dl.min.io/server/minio/release/linux-{}/minio",
                arch
            ),
            kind: ArtifactKind::Binary,
        })
    }

    fn start_command(
        &self,
        node: &NodeDescriptor,
        topology: &Topology,
        config: &ClusterConfig,
    ) -> String {
        let bin = config.binary_path(self.binary_name());
        match topology.mode(Role::Storage) {
            DeploymentMode::Single => format!(
                "{} server --address {} {}",
                bin,
                node.address(),
                node.data_dir
            ),
            DeploymentMode::Cluster => {
                let endpoints: Vec<String> = topology
                    .with_role(Role::Storage)
                    .map(|n| format!("http://{}{}", n.host, n.data_dir))
                    .collect();
                format!(
                    "{} server --address :{} {}",
                    bin,
                    node.port,
                    endpoints.join(" ")
                )
            }
        }
    }

    fn start_env(&self, credentials: &StorageCredentials) -> BTreeMap<String, String> {
        BTreeMap::from([
            ("MINIO_ROOT_USER".to_string(), credentials.user.clone()),
            ("MINIO_ROOT_PASSWORD".to_string(), credentials.password.clone()),
        ])
    }

    fn client_role(&self) -> Role {
        Role::Storage
    }

    fn connect(
        &self,
        node: &NodeDescriptor,
        credentials: &StorageCredentials,
    ) -> std::result::Result<Arc<dyn StorageClient>, StorageError> {
        Ok(Arc::new(S3StorageClient::new(&node.address(), credentials)))
    }
}
