//! Resolved cluster topology: which service instance runs where.

mod resolver;

pub use resolver::{resolve, PortProbe, TcpPortProbe};

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Role a service instance plays in the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Combined object-storage server (minio)
    Storage,
    /// Metadata master (seaweed)
    Master,
    /// Volume server (seaweed)
    Volume,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Storage => write!(f, "storage"),
            Role::Master => write!(f, "master"),
            Role::Volume => write!(f, "volume"),
        }
    }
}

/// Deployment shape of a role group
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeploymentMode {
    /// One physical host carries every instance of the role
    Single,
    /// One instance per host
    Cluster,
}

/// A single service instance
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeDescriptor {
    pub host: String,
    pub port: u16,
    pub data_dir: String,
    pub role: Role,
}

impl NodeDescriptor {
    /// `host:port` form used by clients and peer lists
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Ordered, port-disjoint set of node descriptors.
///
/// Built once by [`resolve`] and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    nodes: Vec<NodeDescriptor>,
}

impl Topology {
    /// Build a topology from descriptors, rejecting duplicate `(host, port)` pairs
    pub fn new(nodes: Vec<NodeDescriptor>) -> Result<Self, crate::DeployError> {
        let mut seen = BTreeSet::new();
        for node in &nodes {
            if !seen.insert((node.host.as_str(), node.port)) {
                return Err(crate::DeployError::Config(format!(
                    "{} is assigned twice",
                    node.address()
                )));
            }
        }
        Ok(Self { nodes })
    }

    pub fn nodes(&self) -> &[NodeDescriptor] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Descriptors with the given role, in topology order
    pub fn with_role(&self, role: Role) -> impl Iterator<Item = &NodeDescriptor> {
        self.nodes.iter().filter(move |n| n.role == role)
    }

    /// Addresses of every descriptor with the given role
    pub fn addresses(&self, role: Role) -> Vec<String> {
        self.with_role(role).map(NodeDescriptor::address).collect()
    }

    /// Unique hosts in first-seen order
    pub fn hosts(&self) -> Vec<&str> {
        let mut seen = BTreeSet::new();
        self.nodes
            .iter()
            .map(|n| n.host.as_str())
            .filter(|h| seen.insert(*h))
            .collect()
    }

    /// Data directories hosted on `host`
    pub fn data_dirs_on(&self, host: &str) -> Vec<&str> {
        self.nodes
            .iter()
            .filter(|n| n.host == host)
            .map(|n| n.data_dir.as_str())
            .collect()
    }

    /// Single when every instance of the role lives on one host
    pub fn mode(&self, role: Role) -> DeploymentMode {
        let hosts: BTreeSet<&str> = self.with_role(role).map(|n| n.host.as_str()).collect();
        if hosts.len() <= 1 {
            DeploymentMode::Single
        } else {
            DeploymentMode::Cluster
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(host: &str, port: u16, role: Role) -> NodeDescriptor {
        NodeDescriptor {
            host: host.to_string(),
            port,
            data_dir: "/data".to_string(),
            role,
        }
    }

    #[test]
    fn test_rejects_duplicate_host_port() {
        let result = Topology::new(vec![
            node("10.0.0.1", 9000, Role::Storage),
            node("10.0.0.1", 9000, Role::Storage),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_hosts_first_seen_order() {
        let topology = Topology::new(vec![
            node("b", 9333, Role::Master),
            node("a", 9333, Role::Master),
            node("b", 8080, Role::Volume),
        ])
        .unwrap();
        assert_eq!(topology.hosts(), vec!["b", "a"]);
        assert_eq!(topology.mode(Role::Master), DeploymentMode::Cluster);
        assert_eq!(topology.mode(Role::Volume), DeploymentMode::Single);
    }
}
