//! Executor for running everything on this machine, no SSH required.
//!
//! Every "host" maps to the local shell, so a whole cluster can be rehearsed
//! on one box (pair it with 127.0.0.1 as the only master and node).

use super::{run_piped, RemoteError, RemoteExecutor};
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::process::Command;
use tracing::debug;

#[derive(Debug, Clone, Default)]
pub struct LocalExecutor;

impl LocalExecutor {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    async fn run(
        &self,
        host: &str,
        env: &BTreeMap<String, String>,
        script: &str,
    ) -> Result<String, RemoteError> {
        debug!("Running script locally on behalf of {}", host);
        let mut cmd = Command::new("sh");
        cmd.arg("-s").envs(env);
        run_piped(cmd, "sh", host, script).await
    }
}
