//! Cluster lifecycle: bootstrap, readiness and failover object access.

mod deployer;
mod multiplexer;
mod orchestrator;
pub mod paths;
mod readiness;
mod report;

pub use deployer::Deployer;
pub use multiplexer::{FailoverClient, NAMESPACE};
pub use orchestrator::{Orchestrator, PlannedScript};
pub use readiness::ReadinessProber;
pub use report::{BootstrapPhase, BootstrapReport, NodeOutcome, NodeStatus};
