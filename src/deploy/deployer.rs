use super::orchestrator::{Orchestrator, PlannedScript};
use super::readiness::ReadinessProber;
use super::report::{BootstrapPhase, BootstrapReport};
use super::FailoverClient;
use crate::backend::{Backend, Platform};
use crate::cli::ClusterConfig;
use crate::error::{DeployError, Result};
use crate::remote::RemoteExecutor;
use crate::storage::StorageClient;
use crate::topology::{resolve, PortProbe, Topology};
use std::path::Path;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Installs, starts, stops and talks to one storage cluster
pub struct Deployer {
    config: Arc<ClusterConfig>,
    backend: Arc<dyn Backend>,
    topology: Arc<Topology>,
    orchestrator: Orchestrator,
    client: FailoverClient,
    prober: ReadinessProber,
    cancel: CancellationToken,
}

impl Deployer {
    /// Validate the config and resolve its topology.
    ///
    /// Fails with [`DeployError::Config`] before any remote command runs.
    pub async fn new(
        config: ClusterConfig,
        executor: Arc<dyn RemoteExecutor>,
        probe: Arc<dyn PortProbe>,
    ) -> Result<Self> {
        let config = Arc::new(config.resolved()?);
        let backend = config.backend.backend();
        let topology = Arc::new(resolve(&config, backend.as_ref(), probe.as_ref()).await?);
        info!(
            "Resolved {} topology with {} nodes",
            backend.kind(),
            topology.len()
        );

        let cancel = CancellationToken::new();
        let orchestrator = Orchestrator::new(
            Arc::clone(&backend),
            Arc::clone(&topology),
            Arc::clone(&config),
            executor,
            probe,
            cancel.clone(),
        );
        let client = FailoverClient::new(connector(
            Arc::clone(&backend),
            Arc::clone(&topology),
            Arc::clone(&config),
        ));
        let prober = ReadinessProber::new(
            config.timeouts.poll_interval(),
            config.timeouts.probe_timeout(),
        );

        Ok(Self {
            config,
            backend,
            topology,
            orchestrator,
            client,
            prober,
            cancel,
        })
    }

    /// Use `client` for object operations and health checks
    pub fn with_client(mut self, client: FailoverClient) -> Self {
        self.client = client;
        self
    }

    /// Generate scripts for `platform` instead of this machine
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.orchestrator.set_platform(platform);
        self
    }

    pub fn config(&self) -> &ClusterConfig {
        &self.config
    }

    pub fn topology(&self) -> &Topology {
        &self.topology
    }

    /// Token that cancels in-flight dispatch and polling
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Empty report for a run against this cluster
    pub fn new_report(&self) -> BootstrapReport {
        BootstrapReport::new(self.backend.kind())
    }

    pub fn plan(&self) -> Result<Vec<PlannedScript>> {
        self.orchestrator.plan()
    }

    /// Fetch, start, then wait for readiness
    pub async fn start(&self, report: &mut BootstrapReport) -> Result<()> {
        let result = self.run_start(report).await;
        match &result {
            Ok(()) => report.finish(BootstrapPhase::Ready),
            Err(e) => report.fail_with_error(&e.to_string()),
        }
        result
    }

    async fn run_start(&self, report: &mut BootstrapReport) -> Result<()> {
        self.orchestrator.fetch(report).await?;
        let started = self.orchestrator.start_nodes(report).await?;
        info!("{} of {} nodes started", started, self.topology.len());

        let deadline = self.config.timeouts.ready();
        if self.prober.await_ready(&self.client, deadline, &self.cancel).await {
            info!("Cluster is ready");
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        Err(DeployError::ReadinessTimeout {
            phase: "ready",
            waited: deadline,
        })
    }

    /// Stop every node and wait until none answers
    pub async fn stop(&self, report: &mut BootstrapReport) -> Result<()> {
        let result = self.run_stop(report).await;
        match &result {
            Ok(()) => report.finish(BootstrapPhase::Stopped),
            Err(e) => report.fail_with_error(&e.to_string()),
        }
        result
    }

    async fn run_stop(&self, report: &mut BootstrapReport) -> Result<()> {
        let stopped = self.orchestrator.stop_nodes(report).await?;
        info!("Stop signalled on {} of {} nodes", stopped, self.topology.len());

        let deadline = self.config.timeouts.stop();
        let down = self
            .prober
            .await_stopped(&self.client, deadline, &self.cancel)
            .await;
        self.client.invalidate().await;

        if down {
            info!("Cluster is stopped");
            return Ok(());
        }
        if self.cancel.is_cancelled() {
            return Err(DeployError::Cancelled);
        }
        Err(DeployError::ReadinessTimeout {
            phase: "stopped",
            waited: deadline,
        })
    }

    /// Whether at least one node answers its health check
    pub async fn is_running(&self) -> bool {
        self.client.is_running().await
    }

    pub async fn upload_file(&self, file: &Path) -> Result<()> {
        self.client.upload_file(file).await
    }

    pub async fn upload_dir(&self, dir: &Path) -> Result<usize> {
        self.client.upload_dir(dir).await
    }

    pub async fn list_dir(&self, dir: &Path) -> Result<Vec<String>> {
        self.client.list_dir(dir).await
    }

    pub async fn download(&self, prefix: &Path, out: &Path) -> Result<usize> {
        self.client.download(prefix, out).await
    }

    pub async fn remove_file(&self, file: &Path) -> Result<()> {
        self.client.remove_file(file).await
    }

    pub async fn remove_dir(&self, dir: &Path) -> Result<usize> {
        self.client.remove_dir(dir).await
    }
}

/// Client builder for every node of the backend's client-facing role
fn connector(
    backend: Arc<dyn Backend>,
    topology: Arc<Topology>,
    config: Arc<ClusterConfig>,
) -> impl Fn() -> Vec<Arc<dyn StorageClient>> + Send + Sync + 'static {
    move || {
        topology
            .with_role(backend.client_role())
            .filter_map(|node| match backend.connect(node, &config.credentials) {
                Ok(client) => Some(client),
                Err(e) => {
                    warn!("Skipping {}: {}", node.address(), e);
                    None
                }
            })
            .collect()
    }
}
