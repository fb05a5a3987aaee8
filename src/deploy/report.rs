use crate::backend::BackendKind;
use crate::topology::{NodeDescriptor, Role};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Phase a start or stop run has reached
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum BootstrapPhase {
    Init,
    Fetching,
    Starting,
    Ready,
    Stopping,
    Stopped,
    Failed,
}

/// What happened to one node
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NodeStatus {
    Started,
    Stopped,
    Failed,
}

/// Outcome for a single node
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeOutcome {
    pub host: String,
    pub port: u16,
    pub role: Role,
    pub status: NodeStatus,
    /// Error message if failed
    pub error: Option<String>,
}

impl NodeOutcome {
    pub fn ok(node: &NodeDescriptor, status: NodeStatus) -> Self {
        Self {
            host: node.host.clone(),
            port: node.port,
            role: node.role,
            status,
            error: None,
        }
    }

    pub fn failed(node: &NodeDescriptor, error: &str) -> Self {
        Self {
            host: node.host.clone(),
            port: node.port,
            role: node.role,
            status: NodeStatus::Failed,
            error: Some(error.to_string()),
        }
    }
}

/// Aggregate result of a start or stop run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootstrapReport {
    /// Unique identifier for this run
    pub deployment_id: String,
    pub backend: BackendKind,
    pub phase: BootstrapPhase,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub duration_seconds: Option<u64>,
    /// Hosts the binary was fetched on
    pub fetched_hosts: Vec<String>,
    pub nodes: Vec<NodeOutcome>,
    /// Whether the readiness check passed
    pub ready: bool,
    /// Error that ended the run, if any
    pub error: Option<String>,
}

impl BootstrapReport {
    pub fn new(backend: BackendKind) -> Self {
        Self {
            deployment_id: Uuid::new_v4().to_string(),
            backend,
            phase: BootstrapPhase::Init,
            started_at: Utc::now(),
            completed_at: None,
            duration_seconds: None,
            fetched_hosts: Vec::new(),
            nodes: Vec::new(),
            ready: false,
            error: None,
        }
    }

    pub fn record(&mut self, outcome: NodeOutcome) {
        self.nodes.push(outcome);
    }

    pub fn count(&self, status: NodeStatus) -> usize {
        self.nodes.iter().filter(|n| n.status == status).count()
    }

    /// Close the report in its final phase
    pub fn finish(&mut self, phase: BootstrapPhase) {
        let completed_at = Utc::now();
        self.duration_seconds = Some((completed_at - self.started_at).num_seconds().max(0) as u64);
        self.completed_at = Some(completed_at);
        self.ready = phase == BootstrapPhase::Ready;
        self.phase = phase;
    }

    pub fn fail_with_error(&mut self, error: &str) {
        self.error = Some(error.to_string());
        self.finish(BootstrapPhase::Failed);
    }

    /// Save the report as pretty JSON
    pub fn save_json(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
