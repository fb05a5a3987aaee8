mod args;
mod config;

pub use args::*;
pub use config::*;

impl ClusterArgs {
    /// Build the cluster config: file values first, then flag overrides
    pub fn to_config(&self) -> anyhow::Result<ClusterConfig> {
        let mut config = match &self.config {
            Some(path) => ClusterConfig::load(path)?,
            None => ClusterConfig::default(),
        };

        if let Some(backend) = self.backend {
            config.backend = backend;
        }
        if !self.master.is_empty() {
            config.master = self.master.clone();
        }
        if !self.node.is_empty() {
            config.node = self.node.clone();
        }
        if let Some(user) = &self.user {
            config.ssh.user = user.clone();
        }
        if self.passwd.is_some() {
            config.ssh.password = self.passwd.clone();
        }
        if self.pk.is_some() {
            config.ssh.private_key = self.pk.clone();
        }
        if self.pk_passwd.is_some() {
            config.ssh.private_key_password = self.pk_passwd.clone();
        }
        if let Some(port) = self.ssh_port {
            config.ssh.port = port;
        }
        if let Some(user) = &self.storage_user {
            config.credentials.user = user.clone();
        }
        if let Some(password) = &self.storage_passwd {
            config.credentials.password = password.clone();
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cluster.yaml");
        ClusterConfig::sample().save(&path).unwrap();

        let args = ClusterArgs {
            config: Some(path),
            node: vec!["10.1.1.1".to_string()],
            ssh_port: Some(2222),
            ..Default::default()
        };
        let config = args.to_config().unwrap();

        assert_eq!(config.master, ClusterConfig::sample().master);
        assert_eq!(config.node, vec!["10.1.1.1"]);
        assert_eq!(config.ssh.port, 2222);
        assert_eq!(config.ssh.password.as_deref(), Some("change-me"));
    }
}
