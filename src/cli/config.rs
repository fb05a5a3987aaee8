use crate::backend::BackendKind;
use crate::error::{DeployError, Result};
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Minimum length of the storage user and password
pub const MIN_CREDENTIAL_LEN: usize = 8;

/// Configuration for a storage cluster deployment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Storage technology to deploy
    #[serde(default)]
    pub backend: BackendKind,

    /// Master host list
    #[serde(default)]
    pub master: Vec<String>,

    /// Node host list
    #[serde(default)]
    pub node: Vec<String>,

    /// Directory the service binary is installed into
    #[serde(default = "default_bin_dir")]
    pub bin_dir: String,

    /// Root data directory on every host
    #[serde(default = "default_data_dir")]
    pub data_dir: String,

    /// Replication hint passed to backends that take one
    #[serde(default = "default_replication")]
    pub replication: String,

    /// How to reach the hosts
    #[serde(default)]
    pub ssh: SshConfig,

    /// Root credentials of the storage service
    #[serde(default)]
    pub credentials: StorageCredentials,

    /// Deadlines and polling intervals
    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

impl Default for ClusterConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::default(),
            master: Vec::new(),
            node: Vec::new(),
            bin_dir: default_bin_dir(),
            data_dir: default_data_dir(),
            replication: default_replication(),
            ssh: SshConfig::default(),
            credentials: StorageCredentials::default(),
            timeouts: TimeoutSettings::default(),
        }
    }
}

fn default_bin_dir() -> String {
    "/var/lib/dfs/bin".to_string()
}

fn default_data_dir() -> String {
    "/var/lib/dfs/data".to_string()
}

fn default_replication() -> String {
    "000".to_string()
}

/// Remote login settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SshConfig {
    #[serde(default = "default_ssh_user")]
    pub user: String,

    #[serde(default)]
    pub password: Option<String>,

    /// Path to a private key file
    #[serde(default)]
    pub private_key: Option<PathBuf>,

    /// Passphrase of the private key
    #[serde(default)]
    pub private_key_password: Option<String>,

    #[serde(default = "default_ssh_port")]
    pub port: u16,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            user: default_ssh_user(),
            password: None,
            private_key: None,
            private_key_password: None,
            port: default_ssh_port(),
        }
    }
}

fn default_ssh_user() -> String {
    "root".to_string()
}

fn default_ssh_port() -> u16 {
    22
}

/// Root user of the storage service
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageCredentials {
    #[serde(default = "default_storage_user")]
    pub user: String,

    #[serde(default = "default_storage_password")]
    pub password: String,
}

impl Default for StorageCredentials {
    fn default() -> Self {
        Self {
            user: default_storage_user(),
            password: default_storage_password(),
        }
    }
}

impl fmt::Debug for StorageCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageCredentials")
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

fn default_storage_user() -> String {
    "dfs-admin".to_string()
}

fn default_storage_password() -> String {
    "dfs-secret".to_string()
}

/// Deadlines for start/stop and the polling cadence used while waiting
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeoutSettings {
    /// How long `start` waits for the cluster to answer
    #[serde(default = "default_ready_secs")]
    pub ready_secs: u64,

    /// How long `stop` waits for every node to go quiet
    #[serde(default = "default_stop_secs")]
    pub stop_secs: u64,

    /// Pause between polling rounds
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    /// Timeout of a single health probe
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            ready_secs: default_ready_secs(),
            stop_secs: default_stop_secs(),
            poll_interval_ms: default_poll_interval_ms(),
            probe_timeout_ms: default_probe_timeout_ms(),
        }
    }
}

impl TimeoutSettings {
    pub fn ready(&self) -> Duration {
        Duration::from_secs(self.ready_secs)
    }

    pub fn stop(&self) -> Duration {
        Duration::from_secs(self.stop_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }
}

fn default_ready_secs() -> u64 {
    120
}

fn default_stop_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_probe_timeout_ms() -> u64 {
    1000
}

impl ClusterConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .context(format!("Failed to read config file: {:?}", path.as_ref()))?;

        let config: ClusterConfig =
            serde_yaml::from_str(&content).context("Failed to parse config file")?;

        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> anyhow::Result<()> {
        let content = serde_yaml::to_string(self).context("Failed to serialize config")?;
        std::fs::write(path.as_ref(), content)
            .context(format!("Failed to write config file: {:?}", path.as_ref()))?;
        Ok(())
    }

    /// Fill every unset value with its default
    pub fn with_defaults(mut self) -> Self {
        if self.bin_dir.is_empty() {
            self.bin_dir = default_bin_dir();
        }
        if self.data_dir.is_empty() {
            self.data_dir = default_data_dir();
        }
        if self.replication.is_empty() {
            self.replication = default_replication();
        }
        if self.ssh.user.is_empty() {
            self.ssh.user = default_ssh_user();
        }
        if self.ssh.port == 0 {
            self.ssh.port = default_ssh_port();
        }
        if self.credentials.user.is_empty() {
            self.credentials.user = default_storage_user();
        }
        if self.credentials.password.is_empty() {
            self.credentials.password = default_storage_password();
        }
        self
    }

    /// Check that the required values are present and strong enough
    pub fn validate(&self) -> Result<()> {
        if self.master.is_empty() {
            return Err(DeployError::Config("master list is empty".to_string()));
        }
        if self.node.is_empty() {
            return Err(DeployError::Config("node list is empty".to_string()));
        }
        if self.credentials.user.len() < MIN_CREDENTIAL_LEN {
            return Err(DeployError::Config(format!(
                "storage user must be at least {} characters",
                MIN_CREDENTIAL_LEN
            )));
        }
        if self.credentials.password.len() < MIN_CREDENTIAL_LEN {
            return Err(DeployError::Config(format!(
                "storage password must be at least {} characters",
                MIN_CREDENTIAL_LEN
            )));
        }
        Ok(())
    }

    /// Apply defaults then validate
    pub fn resolved(self) -> Result<Self> {
        let config = self.with_defaults();
        config.validate()?;
        Ok(config)
    }

    /// Absolute path of an executable in the bin dir
    pub fn binary_path(&self, binary: &str) -> String {
        format!("{}/{}", self.bin_dir.trim_end_matches('/'), binary)
    }

    /// Generate a sample configuration
    pub fn sample() -> Self {
        Self {
            master: vec!["192.168.0.2".to_string(), "192.168.0.3".to_string()],
            node: vec!["192.168.0.4".to_string(), "192.168.0.5".to_string()],
            ssh: SshConfig {
                password: Some("change-me".to_string()),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_config() {
        let config = ClusterConfig::sample();
        assert_eq!(config.master.len(), 2);
        assert_eq!(config.node.len(), 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_with_defaults_fills_blanks() {
        let config = ClusterConfig {
            master: vec!["a".to_string()],
            node: vec!["b".to_string()],
            bin_dir: String::new(),
            data_dir: String::new(),
            ssh: SshConfig {
                user: String::new(),
                port: 0,
                ..Default::default()
            },
            credentials: StorageCredentials {
                user: String::new(),
                password: String::new(),
            },
            ..Default::default()
        }
        .resolved()
        .unwrap();

        assert_eq!(config.bin_dir, "/var/lib/dfs/bin");
        assert_eq!(config.data_dir, "/var/lib/dfs/data");
        assert_eq!(config.ssh.user, "root");
        assert_eq!(config.ssh.port, 22);
        assert_eq!(config.credentials, StorageCredentials::default());
    }

    #[test]
    fn test_rejects_short_credentials() {
        let mut config = ClusterConfig::sample();
        config.credentials.password = "short".to_string();
        assert!(matches!(config.validate(), Err(DeployError::Config(_))));

        let mut config = ClusterConfig::sample();
        config.credentials.user = "1234567".to_string();
        assert!(config.validate().is_err());

        config.credentials.user = "12345678".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_empty_host_lists() {
        let mut config = ClusterConfig::sample();
        config.node.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_serialize_deserialize() {
        let config = ClusterConfig::sample();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: ClusterConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_partial_yaml_uses_defaults() {
        let parsed: ClusterConfig =
            serde_yaml::from_str("backend: seaweed\nmaster: [a]\nnode: [b]\n").unwrap();
        assert_eq!(parsed.backend, BackendKind::Seaweed);
        assert_eq!(parsed.timeouts, TimeoutSettings::default());
        assert_eq!(parsed.ssh.port, 22);
    }

    #[test]
    fn test_credentials_debug_is_redacted() {
        let debug = format!("{:?}", StorageCredentials::default());
        assert!(!debug.contains("dfs-secret"));
    }
}
