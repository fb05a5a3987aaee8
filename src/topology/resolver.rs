use crate::backend::{Backend, HostSource, Layout, RolePlacement};
use crate::cli::ClusterConfig;
use crate::error::{DeployError, Result};
use crate::topology::{NodeDescriptor, Topology};
use async_trait::async_trait;
use std::collections::BTreeSet;
use std::time::Duration;
use tokio::net::TcpStream;
use tracing::debug;

/// Instances synthesized when a role has exactly one host
pub const SINGLE_HOST_INSTANCES: usize = 3;

/// Answers whether something is already listening on `host:port`
#[async_trait]
pub trait PortProbe: Send + Sync {
    async fn is_in_use(&self, host: &str, port: u16) -> bool;
}

/// Probe that dials the port over TCP
#[derive(Debug, Clone)]
pub struct TcpPortProbe {
    timeout: Duration,
}

impl TcpPortProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl Default for TcpPortProbe {
    fn default() -> Self {
        Self::new(Duration::from_secs(1))
    }
}

#[async_trait]
impl PortProbe for TcpPortProbe {
    async fn is_in_use(&self, host: &str, port: u16) -> bool {
        matches!(
            tokio::time::timeout(self.timeout, TcpStream::connect((host, port))).await,
            Ok(Ok(_))
        )
    }
}

/// Resolve a validated config into a topology for the given backend.
///
/// Hosts are deduplicated in masters-then-nodes order. Ports are only probed
/// for per-role layouts; collapsed layouts use the backend's fixed port.
pub async fn resolve(
    config: &ClusterConfig,
    backend: &dyn Backend,
    probe: &dyn PortProbe,
) -> Result<Topology> {
    config.validate()?;

    let nodes = match backend.layout() {
        Layout::Collapsed { role, port } => {
            let hosts = dedup(config.master.iter().chain(config.node.iter()));
            hosts
                .into_iter()
                .map(|host| NodeDescriptor {
                    host,
                    port,
                    data_dir: config.data_dir.clone(),
                    role,
                })
                .collect()
        }
        Layout::PerRole(placements) => {
            let mut nodes = Vec::new();
            let mut taken = BTreeSet::new();
            for placement in &placements {
                let hosts = match placement.source {
                    HostSource::Masters => dedup(config.master.iter()),
                    HostSource::Nodes => dedup(config.node.iter()),
                };
                place_role(config, placement, hosts, probe, &mut taken, &mut nodes).await?;
            }
            nodes
        }
    };

    Topology::new(nodes)
}

async fn place_role(
    config: &ClusterConfig,
    placement: &RolePlacement,
    hosts: Vec<String>,
    probe: &dyn PortProbe,
    taken: &mut BTreeSet<(String, u16)>,
    nodes: &mut Vec<NodeDescriptor>,
) -> Result<()> {
    let base_dir = format!(
        "{}/{}",
        config.data_dir.trim_end_matches('/'),
        placement.data_subdir
    );

    if let [host] = hosts.as_slice() {
        let mut port = placement.base_port;
        for i in 0..SINGLE_HOST_INSTANCES {
            port = next_free_port(host, port, probe, taken).await?;
            taken.insert((host.clone(), port));
            nodes.push(NodeDescriptor {
                host: host.clone(),
                port,
                data_dir: format!("{}-{}", base_dir, i),
                role: placement.role,
            });
        }
        return Ok(());
    }

    for host in hosts {
        let port = next_free_port(&host, placement.base_port, probe, taken).await?;
        taken.insert((host.clone(), port));
        nodes.push(NodeDescriptor {
            host,
            port,
            data_dir: base_dir.clone(),
            role: placement.role,
        });
    }
    Ok(())
}

/// First port at or above `start` that is neither taken nor reported in use
async fn next_free_port(
    host: &str,
    start: u16,
    probe: &dyn PortProbe,
    taken: &BTreeSet<(String, u16)>,
) -> Result<u16> {
    for port in start..=u16::MAX {
        if taken.contains(&(host.to_string(), port)) {
            continue;
        }
        if probe.is_in_use(host, port).await {
            debug!("Port {} of {} is in use, trying next", port, host);
            continue;
        }
        return Ok(port);
    }
    Err(DeployError::Config(format!(
        "no free port at or above {} on {}",
        start, host
    )))
}

fn dedup<'a>(hosts: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen = BTreeSet::new();
    hosts
        .filter(|h| seen.insert(h.as_str()))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{MinioBackend, SeaweedBackend};
    use crate::topology::{DeploymentMode, Role};
    use std::collections::HashSet;

    /// Probe reporting a fixed set of occupied ports
    struct FixedProbe(HashSet<(String, u16)>);

    impl FixedProbe {
        fn empty() -> Self {
            Self(HashSet::new())
        }

        fn occupied(entries: &[(&str, u16)]) -> Self {
            Self(entries.iter().map(|(h, p)| (h.to_string(), *p)).collect())
        }
    }

    #[async_trait]
    impl PortProbe for FixedProbe {
        async fn is_in_use(&self, host: &str, port: u16) -> bool {
            self.0.contains(&(host.to_string(), port))
        }
    }

    fn config(master: &[&str], node: &[&str]) -> ClusterConfig {
        ClusterConfig {
            master: master.iter().map(|s| s.to_string()).collect(),
            node: node.iter().map(|s| s.to_string()).collect(),
            ..ClusterConfig::default()
        }
    }

    #[tokio::test]
    async fn test_collapsed_layout_dedups_hosts() {
        let cfg = config(&["a", "a", "b"], &["b", "c"]);
        let topology = resolve(&cfg, &MinioBackend, &FixedProbe::empty())
            .await
            .unwrap();

        let hosts: Vec<&str> = topology.nodes().iter().map(|n| n.host.as_str()).collect();
        assert_eq!(hosts, vec!["a", "b", "c"]);
        assert!(topology.nodes().iter().all(|n| n.port == 9000));
        assert!(topology.nodes().iter().all(|n| n.data_dir == cfg.data_dir));
        assert_eq!(topology.mode(Role::Storage), DeploymentMode::Cluster);
    }

    #[tokio::test]
    async fn test_single_host_synthesizes_three_instances() {
        let cfg = config(&["10.0.0.1"], &["10.0.0.1"]);
        let probe = FixedProbe::occupied(&[("10.0.0.1", 9334), ("10.0.0.1", 8080)]);
        let topology = resolve(&cfg, &SeaweedBackend, &probe).await.unwrap();

        let masters: Vec<_> = topology.with_role(Role::Master).collect();
        assert_eq!(masters.len(), SINGLE_HOST_INSTANCES);
        let ports: HashSet<u16> = masters.iter().map(|n| n.port).collect();
        assert_eq!(ports.len(), 3);
        assert!(!ports.contains(&9334));
        assert_eq!(
            masters.iter().map(|n| n.port).collect::<Vec<_>>(),
            vec![9333, 9335, 9336]
        );

        let dirs: HashSet<&str> = masters.iter().map(|n| n.data_dir.as_str()).collect();
        assert_eq!(dirs.len(), 3);
        assert!(masters[0].data_dir.ends_with("/master-0"));

        let volumes: Vec<_> = topology.with_role(Role::Volume).collect();
        assert_eq!(volumes.len(), 3);
        assert!(volumes.iter().all(|n| n.port != 8080));
    }

    #[tokio::test]
    async fn test_per_role_layout_never_collides_on_shared_host() {
        let cfg = config(&["a", "b"], &["a", "c"]);
        let topology = resolve(&cfg, &SeaweedBackend, &FixedProbe::empty())
            .await
            .unwrap();

        assert_eq!(topology.mode(Role::Master), DeploymentMode::Cluster);
        assert_eq!(topology.len(), 4);
        let pairs: HashSet<(String, u16)> = topology
            .nodes()
            .iter()
            .map(|n| (n.host.clone(), n.port))
            .collect();
        assert_eq!(pairs.len(), 4);
    }

    #[tokio::test]
    async fn test_rejects_empty_host_lists() {
        let cfg = config(&[], &["b"]);
        let err = resolve(&cfg, &MinioBackend, &FixedProbe::empty())
            .await
            .unwrap_err();
        assert!(matches!(err, DeployError::Config(_)));

        let cfg = config(&["a"], &[]);
        assert!(resolve(&cfg, &MinioBackend, &FixedProbe::empty())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_tcp_probe_detects_listener() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let probe = TcpPortProbe::default();
        assert!(probe.is_in_use("127.0.0.1", port).await);
        drop(listener);
    }
}
