//! Start/stop orchestration against a scripted executor.

use async_trait::async_trait;
use dfs_deploy::backend::{BackendKind, Platform};
use dfs_deploy::cli::ClusterConfig;
use dfs_deploy::deploy::{BootstrapPhase, NodeStatus};
use dfs_deploy::remote::{RemoteError, RemoteExecutor};
use dfs_deploy::storage::{MemoryStorageClient, StorageClient};
use dfs_deploy::topology::PortProbe;
use dfs_deploy::{DeployError, Deployer, FailoverClient};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Step {
    Fetch,
    Start,
    Stop,
}

/// Records every dispatched script and fails the ones it is told to
#[derive(Default)]
struct ScriptedExecutor {
    log: Mutex<Vec<(Step, String)>>,
    failing: BTreeSet<(String, &'static str)>,
    start_delay: Duration,
}

impl ScriptedExecutor {
    fn failing(host: &str, step: &'static str) -> Self {
        Self {
            failing: BTreeSet::from([(host.to_string(), step)]),
            ..Default::default()
        }
    }

    fn slow_start(delay: Duration) -> Self {
        Self {
            start_delay: delay,
            ..Default::default()
        }
    }

    fn steps(&self) -> Vec<(Step, String)> {
        self.log.lock().unwrap().clone()
    }

    fn count(&self, step: Step) -> usize {
        self.steps().iter().filter(|(s, _)| *s == step).count()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(
        &self,
        host: &str,
        _env: &BTreeMap<String, String>,
        script: &str,
    ) -> Result<String, RemoteError> {
        let (step, name) = if script.contains("nohup setsid") {
            (Step::Start, "start")
        } else if script.contains("kill -15") {
            (Step::Stop, "stop")
        } else {
            (Step::Fetch, "fetch")
        };
        self.log.lock().unwrap().push((step, host.to_string()));
        if step == Step::Start {
            tokio::time::sleep(self.start_delay).await;
        }

        if self.failing.contains(&(host.to_string(), name)) {
            return Err(RemoteError::Exit {
                host: host.to_string(),
                code: Some(1),
                stderr: format!("{} failed", name),
            });
        }
        Ok(String::new())
    }
}

struct BusyPorts(BTreeSet<(String, u16)>);

#[async_trait]
impl PortProbe for BusyPorts {
    async fn is_in_use(&self, host: &str, port: u16) -> bool {
        self.0.contains(&(host.to_string(), port))
    }
}

fn config(backend: BackendKind) -> ClusterConfig {
    let mut config = ClusterConfig {
        backend,
        master: vec!["a".to_string()],
        node: vec!["b".to_string(), "c".to_string()],
        ..Default::default()
    };
    config.timeouts.ready_secs = 1;
    config.timeouts.stop_secs = 1;
    config.timeouts.poll_interval_ms = 20;
    config.timeouts.probe_timeout_ms = 100;
    config
}

async fn deployer(
    config: ClusterConfig,
    executor: Arc<ScriptedExecutor>,
    busy: &[(&str, u16)],
    node: &MemoryStorageClient,
) -> Deployer {
    let probe = BusyPorts(busy.iter().map(|(h, p)| (h.to_string(), *p)).collect());
    Deployer::new(config, executor, Arc::new(probe))
        .await
        .unwrap()
        .with_platform(Platform::new("linux", "x86_64"))
        .with_client(FailoverClient::from_clients(vec![
            Arc::new(node.clone()) as Arc<dyn StorageClient>
        ]))
}

#[tokio::test]
async fn test_every_fetch_finishes_before_any_start() {
    let executor = Arc::new(ScriptedExecutor::default());
    let node = MemoryStorageClient::new("a:9000");
    let deployer = deployer(config(BackendKind::Minio), executor.clone(), &[], &node).await;

    let mut report = deployer.new_report();
    deployer.start(&mut report).await.unwrap();

    let steps = executor.steps();
    let last_fetch = steps.iter().rposition(|(s, _)| *s == Step::Fetch).unwrap();
    let first_start = steps.iter().position(|(s, _)| *s == Step::Start).unwrap();
    assert!(last_fetch < first_start);
    assert_eq!(executor.count(Step::Fetch), 3);
    assert_eq!(executor.count(Step::Start), 3);

    assert_eq!(report.phase, BootstrapPhase::Ready);
    assert!(report.ready);
    assert_eq!(report.fetched_hosts.len(), 3);
    assert_eq!(report.count(NodeStatus::Started), 3);
}

#[tokio::test]
async fn test_fetch_failure_aborts_before_starting() {
    let executor = Arc::new(ScriptedExecutor::failing("b", "fetch"));
    let node = MemoryStorageClient::new("a:9000");
    let deployer = deployer(config(BackendKind::Minio), executor.clone(), &[], &node).await;

    let mut report = deployer.new_report();
    let err = deployer.start(&mut report).await.unwrap_err();

    assert!(matches!(err, DeployError::Fetch { ref host, .. } if host == "b"));
    assert_eq!(executor.count(Step::Start), 0);
    assert_eq!(report.phase, BootstrapPhase::Failed);
    assert!(report.error.is_some());
}

#[tokio::test]
async fn test_busy_port_fails_only_that_node() {
    let executor = Arc::new(ScriptedExecutor::default());
    let node = MemoryStorageClient::new("a:9000");
    let deployer = deployer(
        config(BackendKind::Minio),
        executor.clone(),
        &[("b", 9000)],
        &node,
    )
    .await;

    let mut report = deployer.new_report();
    deployer.start(&mut report).await.unwrap();

    assert_eq!(executor.count(Step::Start), 2);
    assert_eq!(report.count(NodeStatus::Started), 2);
    let failed: Vec<_> = report
        .nodes
        .iter()
        .filter(|n| n.status == NodeStatus::Failed)
        .collect();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].host, "b");
    assert!(failed[0].error.as_deref().unwrap().contains("in use"));
}

#[tokio::test]
async fn test_start_failure_on_one_node_is_recorded() {
    let executor = Arc::new(ScriptedExecutor::failing("c", "start"));
    let node = MemoryStorageClient::new("a:9000");
    let deployer = deployer(config(BackendKind::Minio), executor.clone(), &[], &node).await;

    let mut report = deployer.new_report();
    deployer.start(&mut report).await.unwrap();

    assert_eq!(executor.count(Step::Start), 3);
    assert_eq!(report.count(NodeStatus::Failed), 1);
    assert!(report.ready);
}

#[tokio::test]
async fn test_no_node_started() {
    let executor = Arc::new(ScriptedExecutor::default());
    let node = MemoryStorageClient::new("a:9000");
    let deployer = deployer(
        config(BackendKind::Minio),
        executor.clone(),
        &[("a", 9000), ("b", 9000), ("c", 9000)],
        &node,
    )
    .await;

    let mut report = deployer.new_report();
    let err = deployer.start(&mut report).await.unwrap_err();
    assert!(matches!(err, DeployError::NoNodeStarted { failed: 3 }));
    assert_eq!(executor.count(Step::Start), 0);
}

#[tokio::test]
async fn test_cancel_while_starting_returns_promptly() {
    let executor = Arc::new(ScriptedExecutor::slow_start(Duration::from_secs(30)));
    let node = MemoryStorageClient::new("a:9000");
    let deployer = deployer(config(BackendKind::Minio), executor.clone(), &[], &node).await;

    let token = deployer.cancellation_token();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        token.cancel();
    });

    let began = Instant::now();
    let mut report = deployer.new_report();
    let err = deployer.start(&mut report).await.unwrap_err();

    assert!(matches!(err, DeployError::Cancelled));
    assert!(began.elapsed() < Duration::from_secs(5));
    assert_eq!(executor.count(Step::Start), 3);
    assert_eq!(report.phase, BootstrapPhase::Failed);
}

#[tokio::test]
async fn test_unreachable_cluster_times_out() {
    let executor = Arc::new(ScriptedExecutor::default());
    let node = MemoryStorageClient::new("a:9000");
    node.set_available(false);
    let deployer = deployer(config(BackendKind::Minio), executor, &[], &node).await;

    let mut report = deployer.new_report();
    let err = deployer.start(&mut report).await.unwrap_err();
    assert!(matches!(
        err,
        DeployError::ReadinessTimeout { phase: "ready", .. }
    ));
    assert!(!report.ready);
}

#[tokio::test]
async fn test_seaweed_starts_masters_and_volumes() {
    let executor = Arc::new(ScriptedExecutor::default());
    let node = MemoryStorageClient::new("a:9333");
    let deployer = deployer(config(BackendKind::Seaweed), executor.clone(), &[], &node).await;

    // one master host gets three instances, plus one volume per node host
    assert_eq!(deployer.topology().len(), 5);

    let mut report = deployer.new_report();
    deployer.start(&mut report).await.unwrap();
    assert_eq!(executor.count(Step::Fetch), 3);
    assert_eq!(executor.count(Step::Start), 5);
}

#[tokio::test]
async fn test_stop_signals_every_node_then_waits() {
    let executor = Arc::new(ScriptedExecutor::default());
    let node = MemoryStorageClient::new("a:9000");
    node.set_available(false);
    let deployer = deployer(config(BackendKind::Minio), executor.clone(), &[], &node).await;

    let mut report = deployer.new_report();
    deployer.stop(&mut report).await.unwrap();

    assert_eq!(executor.count(Step::Stop), 3);
    assert_eq!(report.phase, BootstrapPhase::Stopped);
    assert_eq!(report.count(NodeStatus::Stopped), 3);
}

#[tokio::test]
async fn test_invalid_config_fails_before_any_dispatch() {
    let executor = Arc::new(ScriptedExecutor::default());
    let mut config = config(BackendKind::Minio);
    config.credentials.password = "short".to_string();

    let probe = Arc::new(BusyPorts(BTreeSet::new()));
    let result = Deployer::new(config, executor.clone(), probe).await;
    assert!(matches!(result, Err(DeployError::Config(_))));
    assert!(executor.steps().is_empty());
}
