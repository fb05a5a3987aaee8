//! Concurrent dispatch of fetch, start and stop scripts.
//!
//! One task per host (fetch) or per node (start, stop). Every task is joined
//! and its outcome recorded before the next phase begins.

use super::report::{BootstrapPhase, BootstrapReport, NodeOutcome, NodeStatus};
use crate::backend::script::{fetch_script, start_script, stop_script};
use crate::backend::{Backend, Platform};
use crate::cli::ClusterConfig;
use crate::error::{DeployError, Result};
use crate::remote::{RemoteError, RemoteExecutor};
use crate::topology::{NodeDescriptor, PortProbe, Topology};
use futures::future::join_all;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A script together with where it would run
#[derive(Debug, Clone)]
pub struct PlannedScript {
    pub host: String,
    pub label: String,
    pub script: String,
}

pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    topology: Arc<Topology>,
    config: Arc<ClusterConfig>,
    executor: Arc<dyn RemoteExecutor>,
    probe: Arc<dyn PortProbe>,
    platform: Platform,
    cancel: CancellationToken,
}

impl Orchestrator {
    pub fn new(
        backend: Arc<dyn Backend>,
        topology: Arc<Topology>,
        config: Arc<ClusterConfig>,
        executor: Arc<dyn RemoteExecutor>,
        probe: Arc<dyn PortProbe>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            backend,
            topology,
            config,
            executor,
            probe,
            platform: Platform::current(),
            cancel,
        }
    }

    /// Target a different platform than the one running the deployer
    pub fn set_platform(&mut self, platform: Platform) {
        self.platform = platform;
    }

    /// Every script a start would dispatch, in dispatch order
    pub fn plan(&self) -> Result<Vec<PlannedScript>> {
        let artifact = self.backend.artifact(&self.platform)?;
        let mut plan: Vec<PlannedScript> = self
            .topology
            .hosts()
            .into_iter()
            .map(|host| PlannedScript {
                host: host.to_string(),
                label: "fetch".to_string(),
                script: fetch_script(
                    self.backend.as_ref(),
                    &artifact,
                    &self.topology,
                    &self.config,
                    host,
                ),
            })
            .collect();

        plan.extend(self.topology.nodes().iter().map(|node| PlannedScript {
            host: node.host.clone(),
            label: format!("start {} :{}", node.role, node.port),
            script: start_script(self.backend.as_ref(), node, &self.topology, &self.config),
        }));
        Ok(plan)
    }

    /// Fetch the binary on every host. Any failure aborts the start.
    pub async fn fetch(&self, report: &mut BootstrapReport) -> Result<()> {
        report.phase = BootstrapPhase::Fetching;
        let artifact = self.backend.artifact(&self.platform)?;
        let hosts = self.topology.hosts();
        info!("Fetching {} on {} hosts", self.backend.binary_name(), hosts.len());

        let mut handles: Vec<JoinHandle<std::result::Result<String, (String, RemoteError)>>> =
            Vec::new();
        for host in hosts {
            let script = fetch_script(
                self.backend.as_ref(),
                &artifact,
                &self.topology,
                &self.config,
                host,
            );
            let executor = Arc::clone(&self.executor);
            let host = host.to_string();

            handles.push(tokio::spawn(async move {
                match executor.run_async(&host, &BTreeMap::new(), &script).await {
                    Ok(()) => Ok(host),
                    Err(e) => Err((host, e)),
                }
            }));
        }

        let mut first_error = None;
        for result in self.join(handles).await? {
            match result? {
                Ok(host) => {
                    info!("Binary ready on {}", host);
                    report.fetched_hosts.push(host);
                }
                Err((host, source)) => {
                    error!("Fetch failed on {}: {}", host, source);
                    if first_error.is_none() {
                        first_error = Some(DeployError::Fetch { host, source });
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Start every node concurrently.
    ///
    /// A node failure is recorded and does not stop the others; the call only
    /// fails when no node started at all.
    pub async fn start_nodes(&self, report: &mut BootstrapReport) -> Result<usize> {
        report.phase = BootstrapPhase::Starting;
        let env = self.backend.start_env(&self.config.credentials);
        info!("Starting {} nodes", self.topology.len());

        let mut handles = Vec::new();
        for node in self.topology.nodes() {
            let script = start_script(self.backend.as_ref(), node, &self.topology, &self.config);
            let executor = Arc::clone(&self.executor);
            let probe = Arc::clone(&self.probe);
            let env = env.clone();
            let node = node.clone();

            handles.push(tokio::spawn(async move {
                let result =
                    start_node(executor.as_ref(), probe.as_ref(), &node, &env, &script).await;
                (node, result)
            }));
        }

        let mut started = 0;
        for joined in self.join(handles).await? {
            let (node, result) = joined?;
            match result {
                Ok(()) => {
                    info!("Started {} on {}", node.role, node.address());
                    report.record(NodeOutcome::ok(&node, NodeStatus::Started));
                    started += 1;
                }
                Err(e) => {
                    error!("Failed to start {} on {}: {}", node.role, node.address(), e);
                    report.record(NodeOutcome::failed(&node, &e.to_string()));
                }
            }
        }

        if started == 0 {
            return Err(DeployError::NoNodeStarted {
                failed: self.topology.len(),
            });
        }
        Ok(started)
    }

    /// Signal every node's port owner to terminate
    pub async fn stop_nodes(&self, report: &mut BootstrapReport) -> Result<usize> {
        report.phase = BootstrapPhase::Stopping;
        info!("Stopping {} nodes", self.topology.len());

        let mut handles = Vec::new();
        for node in self.topology.nodes() {
            let executor = Arc::clone(&self.executor);
            let node = node.clone();

            handles.push(tokio::spawn(async move {
                let result = executor
                    .run_async(&node.host, &BTreeMap::new(), &stop_script(&node))
                    .await;
                (node, result)
            }));
        }

        let mut stopped = 0;
        for joined in self.join(handles).await? {
            let (node, result) = joined?;
            match result {
                Ok(()) => {
                    report.record(NodeOutcome::ok(&node, NodeStatus::Stopped));
                    stopped += 1;
                }
                Err(e) => {
                    warn!("Failed to stop {} on {}: {}", node.role, node.address(), e);
                    report.record(NodeOutcome::failed(&node, &e.to_string()));
                }
            }
        }
        Ok(stopped)
    }

    /// Wait for every task, aborting all of them on cancellation
    async fn join<T>(
        &self,
        mut handles: Vec<JoinHandle<T>>,
    ) -> Result<Vec<std::result::Result<T, tokio::task::JoinError>>> {
        tokio::select! {
            results = join_all(handles.iter_mut()) => Ok(results),
            _ = self.cancel.cancelled() => {
                warn!("Cancelled, aborting {} tasks", handles.len());
                for handle in &handles {
                    handle.abort();
                }
                Err(DeployError::Cancelled)
            }
        }
    }
}

async fn start_node(
    executor: &dyn RemoteExecutor,
    probe: &dyn PortProbe,
    node: &NodeDescriptor,
    env: &BTreeMap<String, String>,
    script: &str,
) -> Result<()> {
    if probe.is_in_use(&node.host, node.port).await {
        return Err(DeployError::PortInUse {
            host: node.host.clone(),
            port: node.port,
        });
    }
    executor
        .run_async(&node.host, env, script)
        .await
        .map_err(|source| DeployError::Start {
            host: node.host.clone(),
            port: node.port,
            source,
        })
}
