//! Storage technologies the deployer knows how to install and drive.
//!
//! Each backend answers the same small set of questions: where its release
//! artifact lives, how its instances are laid out over the configured hosts,
//! what command starts an instance, and how to talk to a running instance.
//! Everything else (topology resolution, dispatch, readiness, failover) is
//! shared.

mod minio;
pub mod script;
mod seaweed;

pub use minio::MinioBackend;
pub use seaweed::SeaweedBackend;

use crate::cli::{ClusterConfig, StorageCredentials};
use crate::error::{DeployError, Result};
use crate::storage::{StorageClient, StorageError};
use crate::topology::{NodeDescriptor, Role, Topology};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// Supported storage backends
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, clap::ValueEnum,
)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// MinIO object storage server
    #[default]
    Minio,
    /// SeaweedFS master + volume servers
    Seaweed,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Minio => write!(f, "minio"),
            BackendKind::Seaweed => write!(f, "seaweed"),
        }
    }
}

impl BackendKind {
    /// Get the implementation for this backend
    pub fn backend(self) -> Arc<dyn Backend> {
        match self {
            BackendKind::Minio => Arc::new(MinioBackend),
            BackendKind::Seaweed => Arc::new(SeaweedBackend),
        }
    }
}

/// How a backend spreads its instances over the configured hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Layout {
    /// One instance per unique host, all on a fixed port
    Collapsed { role: Role, port: u16 },
    /// Each role placed independently, ports probed upward from a base
    PerRole(Vec<RolePlacement>),
}

/// Placement rule for one role of a per-role layout
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RolePlacement {
    pub role: Role,
    pub source: HostSource,
    pub base_port: u16,
    /// Directory under the configured data dir
    pub data_subdir: &'static str,
}

/// Which configured host list a role is placed on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostSource {
    Masters,
    Nodes,
}

/// Release artifact format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    /// The executable itself
    Binary,
    /// A gzipped tarball containing the executable at its root
    Tarball,
}

/// Where to download a backend's executable from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Artifact {
    pub url: String,
    pub kind: ArtifactKind,
}

/// Target platform for release downloads
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    pub os: String,
    pub arch: String,
}

impl Platform {
    pub fn new(os: &str, arch: &str) -> Self {
        Self {
            os: os.to_string(),
            arch: arch.to_string(),
        }
    }

    /// Platform of the machine running the deployer
    pub fn current() -> Self {
        Self::new(std::env::consts::OS, std::env::consts::ARCH)
    }

    /// Release naming of the architecture (`amd64`, `arm64`)
    pub fn release_arch(&self) -> Result<&'static str> {
        if self.os != "linux" {
            return Err(self.unsupported());
        }
        match self.arch.as_str() {
            "x86_64" | "amd64" => Ok("amd64"),
            "aarch64" | "arm64" => Ok("arm64"),
            _ => Err(self.unsupported()),
        }
    }

    fn unsupported(&self) -> DeployError {
        DeployError::UnsupportedPlatform {
            os: self.os.clone(),
            arch: self.arch.clone(),
        }
    }
}

/// Backend-specific capabilities used by the generic deployer
pub trait Backend: Send + Sync + fmt::Debug {
    fn kind(&self) -> BackendKind;

    /// File name of the executable inside the bin dir
    fn binary_name(&self) -> &'static str;

    fn layout(&self) -> Layout;

    fn artifact(&self, platform: &Platform) -> Result<Artifact>;

    /// Foreground command that runs one instance
    fn start_command(&self, node: &NodeDescriptor, topology: &Topology, config: &ClusterConfig)
        -> String;

    /// Environment the started service needs
    fn start_env(&self, credentials: &StorageCredentials) -> BTreeMap<String, String>;

    /// Role whose instances answer client requests
    fn client_role(&self) -> Role;

    /// Build a client handle for one instance
    fn connect(
        &self,
        node: &NodeDescriptor,
        credentials: &StorageCredentials,
    ) -> std::result::Result<Arc<dyn StorageClient>, StorageError>;
}
