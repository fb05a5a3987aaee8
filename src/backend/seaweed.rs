use super::{
    Artifact, ArtifactKind, Backend, BackendKind, HostSource, Layout, Platform, RolePlacement,
};
use crate::cli::{ClusterConfig, StorageCredentials};
use crate::error::Result;
use crate::storage::{StorageClient, StorageError, WeedMasterClient};
use crate::topology::{NodeDescriptor, Role, Topology};
use std::collections::BTreeMap;
use std::sync::Arc;

pub const SEAWEED_VERSION: &str = "3.54";
pub const MASTER_BASE_PORT: u16 = 9333;
pub const VOLUME_BASE_PORT: u16 = 8080;

/// SeaweedFS: masters on the master hosts, volume servers on the node hosts
#[derive(Debug, Clone, Copy, Default)]
pub struct SeaweedBackend;

impl Backend for SeaweedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Seaweed
    }

    fn binary_name(&self) -> &'static str {
        "weed"
    }

    fn layout(&self) -> Layout {
        Layout::PerRole(vec![
            RolePlacement {
                role: Role::Master,
                source: HostSource::Masters,
                base_port: MASTER_BASE_PORT,
                data_subdir: "master",
            },
            RolePlacement {
                role: Role::Volume,
                source: HostSource::Nodes,
                base_port: VOLUME_BASE_PORT,
                data_subdir: "volume",
            },
        ])
    }

    fn artifact(&self, platform: &Platform) -> Result<Artifact> {
        let arch = platform.release_arch()?;
        Ok(Artifact {
            url: format!(
                "https://github.com/seaweedfs/seaweedfs/releases/download/{}/linux_{}.tar.gz",
                SEAWEED_VERSION, arch
            ),
            kind: ArtifactKind::Tarball,
        })
    }

    fn start_command(
        &self,
        node: &NodeDescriptor,
        topology: &Topology,
        config: &ClusterConfig,
    ) -> String {
        let bin = config.binary_path(self.binary_name());
        let masters = topology.addresses(Role::Master).join(",");
        match node.role {
            Role::Volume => format!(
                "{} volume -port={} -ip={} -dir={} -mserver={}",
                bin, node.port, node.host, node.data_dir, masters
            ),
            _ => {
                let mut cmd = format!(
                    "{} master -mdir={} -ip={} -port={} -defaultReplication={}",
                    bin, node.data_dir, node.host, node.port, config.replication
                );
                if topology.with_role(Role::Master).count() > 1 {
                    cmd.push_str(" -peers=");
                    cmd.push_str(&masters);
                }
                cmd
            }
        }
    }

    fn start_env(&self, _credentials: &StorageCredentials) -> BTreeMap<String, String> {
        BTreeMap::new()
    }

    fn client_role(&self) -> Role {
        Role::Master
    }

    fn connect(
        &self,
        node: &NodeDescriptor,
        _credentials: &StorageCredentials,
    ) -> std::result::Result<Arc<dyn StorageClient>, StorageError> {
        Ok(Arc::new(WeedMasterClient::new(&node.address())?))
    }
}
