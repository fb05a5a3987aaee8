use crate::backend::BackendKind;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

/// DFS-DEPLOY: provision a small object-storage cluster over SSH
///
/// Installs and starts the storage service on every host, then talks to
/// whichever node answers first for uploads, listings and downloads.
#[derive(Parser, Debug)]
#[command(name = "dfs-deploy")]
#[command(version = "0.1.0")]
#[command(about = "Deploy and use a distributed object-storage cluster")]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub cluster: ClusterArgs,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Flags that assemble the cluster configuration
#[derive(ClapArgs, Debug, Default)]
pub struct ClusterArgs {
    /// Cluster config file (YAML); flags override its values
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Storage backend to deploy
    #[arg(long, value_enum, global = true)]
    pub backend: Option<BackendKind>,

    /// Master host list
    #[arg(long, value_delimiter = ',', global = true)]
    pub master: Vec<String>,

    /// Node host list
    #[arg(long, value_delimiter = ',', global = true)]
    pub node: Vec<String>,

    /// SSH user
    #[arg(long, global = true)]
    pub user: Option<String>,

    /// SSH password
    #[arg(long, global = true)]
    pub passwd: Option<String>,

    /// SSH private key file
    #[arg(long, global = true)]
    pub pk: Option<PathBuf>,

    /// Passphrase of the SSH private key
    #[arg(long, global = true)]
    pub pk_passwd: Option<String>,

    /// SSH port
    #[arg(long, global = true)]
    pub ssh_port: Option<u16>,

    /// Storage root user
    #[arg(long, global = true)]
    pub storage_user: Option<String>,

    /// Storage root password
    #[arg(long, global = true)]
    pub storage_passwd: Option<String>,

    /// Run remote scripts on this machine instead of over SSH
    #[arg(long, global = true)]
    pub local: bool,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Install and start the cluster
    Start(StartArgs),

    /// Stop every node of the cluster
    Stop(StopArgs),

    /// Report whether any node answers
    IsRunning,

    /// Upload a file or a directory
    Upload(UploadArgs),

    /// Download every object under a prefix
    Download(DownloadArgs),

    /// List objects under a directory
    List(ListArgs),

    /// Remove a file or a directory
    Remove(RemoveArgs),

    /// Generate a sample cluster config file
    Init(InitArgs),
}

#[derive(Parser, Debug)]
pub struct StartArgs {
    /// Write the bootstrap report (JSON) to this path
    #[arg(long)]
    pub report: Option<PathBuf>,

    /// Print the resolved topology and scripts without running anything
    #[arg(long)]
    pub dry_run: bool,
}

#[derive(Parser, Debug)]
pub struct StopArgs {
    /// Write the stop report (JSON) to this path
    #[arg(long)]
    pub report: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct UploadArgs {
    /// File to upload
    #[arg(long, conflicts_with = "dir")]
    pub filename: Option<PathBuf>,

    /// Directory to upload recursively
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct DownloadArgs {
    /// Prefix to download
    #[arg(long)]
    pub prefix: PathBuf,

    /// Output directory
    #[arg(long)]
    pub out: PathBuf,
}

#[derive(Parser, Debug)]
pub struct ListArgs {
    /// Directory to list
    #[arg(long)]
    pub dir: PathBuf,
}

#[derive(Parser, Debug)]
pub struct RemoveArgs {
    /// File to remove
    #[arg(long, conflicts_with = "dir")]
    pub filename: Option<PathBuf>,

    /// Directory to remove recursively
    #[arg(long)]
    pub dir: Option<PathBuf>,
}

#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Output path for the config file
    #[arg(short, long, default_value = "dfs-cluster.yaml")]
    pub output: PathBuf,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_start_with_host_lists() {
        let args = Args::try_parse_from([
            "dfs-deploy",
            "start",
            "--master",
            "10.0.0.1,10.0.0.2",
            "--node",
            "10.0.0.3",
            "--passwd",
            "secret",
        ])
        .unwrap();

        assert!(matches!(args.command, Command::Start(_)));
        assert_eq!(args.cluster.master, vec!["10.0.0.1", "10.0.0.2"]);
        assert_eq!(args.cluster.node, vec!["10.0.0.3"]);
        assert_eq!(args.cluster.passwd.as_deref(), Some("secret"));
    }

    #[test]
    fn test_upload_rejects_file_and_dir_together() {
        let result = Args::try_parse_from([
            "dfs-deploy",
            "upload",
            "--filename",
            "a",
            "--dir",
            "b",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_backend() {
        let args =
            Args::try_parse_from(["dfs-deploy", "is-running", "--backend", "seaweed"]).unwrap();
        assert_eq!(args.cluster.backend, Some(BackendKind::Seaweed));
    }
}
