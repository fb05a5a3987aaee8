//! Error types for cluster deployment and object operations.

use std::time::Duration;

use thiserror::Error;

use crate::remote::RemoteError;
use crate::storage::StorageError;

/// Result type for deployer operations.
pub type Result<T> = std::result::Result<T, DeployError>;

/// Errors that can occur while resolving, bootstrapping or using a cluster.
#[derive(Debug, Error)]
pub enum DeployError {
    /// The cluster configuration is missing required values or is too weak.
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// The target port on a node is already owned by another process.
    #[error("Port {port} of {host} is in use")]
    PortInUse {
        /// Host that was probed.
        host: String,
        /// Port that was found occupied.
        port: u16,
    },

    /// Fetching the service binary failed on a host. Aborts the whole start.
    #[error("Failed to fetch binary on {host}: {source}")]
    Fetch {
        /// Host the fetch script ran on.
        host: String,
        /// Underlying remote failure.
        #[source]
        source: RemoteError,
    },

    /// Starting the service on one node failed.
    #[error("Failed to start {host}:{port}: {source}")]
    Start {
        /// Host the start script ran on.
        host: String,
        /// Service port of the node.
        port: u16,
        /// Underlying remote failure.
        #[source]
        source: RemoteError,
    },

    /// Every node failed to start, so readiness can never succeed.
    #[error("No node could be started ({failed} failures)")]
    NoNodeStarted {
        /// Number of nodes that failed.
        failed: usize,
    },

    /// The cluster did not reach the expected state before the deadline.
    #[error("Cluster did not become {phase} within {waited:?}")]
    ReadinessTimeout {
        /// Either "ready" or "stopped".
        phase: &'static str,
        /// How long we waited.
        waited: Duration,
    },

    /// Every node failed the requested object operation.
    #[error("There is no reachable node for {operation}")]
    NoReachableNode {
        /// Name of the failed operation.
        operation: &'static str,
    },

    /// A prefix-scoped operation failed after some objects were processed.
    #[error("{operation} stopped after {completed} objects: {source}")]
    Partial {
        /// Name of the interrupted operation.
        operation: &'static str,
        /// Objects processed before the failure.
        completed: usize,
        /// Failure that stopped the operation.
        #[source]
        source: StorageError,
    },

    /// No release artifact exists for this platform.
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform {
        /// Operating system name.
        os: String,
        /// CPU architecture name.
        arch: String,
    },

    /// A per-node worker task panicked or was aborted.
    #[error("Worker task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// Local filesystem failure.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
