//! Running scripts on cluster hosts.

mod local;
mod ssh;

pub use local::LocalExecutor;
pub use ssh::SshExecutor;

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::process::Stdio;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Errors from the remote command channel
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The transport program could not be launched.
    #[error("Failed to run {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The script ran but exited unsuccessfully.
    #[error("Command on {host} exited with {code:?}: {stderr}")]
    Exit {
        host: String,
        code: Option<i32>,
        stderr: String,
    },
}

/// Runs shell scripts on a named host
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a script and return its stdout
    async fn run(
        &self,
        host: &str,
        env: &BTreeMap<String, String>,
        script: &str,
    ) -> Result<String, RemoteError>;

    /// Run a script for its side effects, logging what it printed
    async fn run_async(
        &self,
        host: &str,
        env: &BTreeMap<String, String>,
        script: &str,
    ) -> Result<(), RemoteError> {
        let output = self.run(host, env, script).await?;
        for line in output.lines() {
            debug!("[{}] {}", host, line);
        }
        Ok(())
    }
}

/// Feed `script` to `cmd` on stdin and collect stdout.
///
/// The child is killed if the returned future is dropped, so callers can
/// cancel by abandoning it.
pub(crate) async fn run_piped(
    mut cmd: Command,
    program: &str,
    host: &str,
    script: &str,
) -> Result<String, RemoteError> {
    let spawn_err = |source: std::io::Error| RemoteError::Spawn {
        program: program.to_string(),
        source,
    };

    let mut child = cmd
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(spawn_err)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(script.as_bytes()).await.map_err(spawn_err)?;
    }

    let output = child.wait_with_output().await.map_err(spawn_err)?;
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    if output.status.success() {
        Ok(stdout.to_string())
    } else {
        Err(RemoteError::Exit {
            host: host.to_string(),
            code: output.status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}
