use super::{run_piped, RemoteError, RemoteExecutor};
use crate::backend::script::quote;
use crate::cli::SshConfig;
use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::process::Command;

/// Executes scripts through the system `ssh` client.
///
/// Password and key-passphrase auth go through `sshpass`, which must be
/// installed on the deploying machine.
#[derive(Debug, Clone)]
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    /// Build the transport command for `host` without running it
    pub fn command(&self, host: &str) -> (Command, &'static str) {
        let secret = self
            .config
            .private_key_password
            .as_ref()
            .or(self.config.password.as_ref());

        let (mut cmd, program) = match secret {
            Some(secret) => {
                let mut cmd = Command::new("sshpass");
                if self.config.private_key_password.is_some() {
                    cmd.args(["-P", "passphrase"]);
                }
                cmd.arg("-e").arg("ssh").env("SSHPASS", secret);
                (cmd, "sshpass")
            }
            None => (Command::new("ssh"), "ssh"),
        };

        cmd.args(["-p", &self.config.port.to_string()])
            .args(["-o", "StrictHostKeyChecking=no"])
            .args(["-o", "UserKnownHostsFile=/dev/null"])
            .args(["-o", "LogLevel=ERROR"]);
        if secret.is_none() {
            cmd.args(["-o", "BatchMode=yes"]);
        }
        if let Some(key) = &self.config.private_key {
            cmd.arg("-i").arg(key);
        }
        cmd.arg(format!("{}@{}", self.config.user, host))
            .arg("bash -s");

        (cmd, program)
    }
}

/// Prefix a script with `export` lines for its environment
pub(crate) fn with_env(env: &BTreeMap<String, String>, script: &str) -> String {
    let mut full = String::new();
    for (key, value) in env {
        full.push_str(&format!("export {}={}\n", key, quote(value)));
    }
    full.push_str(script);
    full
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(
        &self,
        host: &str,
        env: &BTreeMap<String, String>,
        script: &str,
    ) -> Result<String, RemoteError> {
        let (cmd, program) = self.command(host);
        run_piped(cmd, program, host, &with_env(env, script)).await
    }
}
