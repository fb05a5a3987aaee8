use anyhow::{bail, Context, Result};
use clap::Parser;
use dfs_deploy::cli::{self, Args, ClusterConfig, Command};
use dfs_deploy::remote::{LocalExecutor, RemoteExecutor, SshExecutor};
use dfs_deploy::topology::TcpPortProbe;
use dfs_deploy::{BootstrapReport, Deployer};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Setup logging
    let log_level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .init();

    if let Command::Init(init_args) = &args.command {
        return generate_sample_config(init_args);
    }

    let config = load_config(&args.cluster)?;
    let deployer = build_deployer(config, args.cluster.local).await?;

    let cancel = deployer.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, cancelling");
            cancel.cancel();
        }
    });

    match args.command {
        Command::Start(start_args) => {
            if start_args.dry_run {
                print_plan(&deployer)?;
                return Ok(());
            }
            let mut report = deployer.new_report();
            let result = deployer.start(&mut report).await;
            finish_report(&report, start_args.report.as_deref())?;
            result.context("Failed to start the cluster")?;
        }
        Command::Stop(stop_args) => {
            let mut report = deployer.new_report();
            let result = deployer.stop(&mut report).await;
            finish_report(&report, stop_args.report.as_deref())?;
            result.context("Failed to stop the cluster")?;
        }
        Command::IsRunning => {
            let running = deployer.is_running().await;
            println!("{}", running);
        }
        Command::Upload(upload_args) => match (upload_args.filename, upload_args.dir) {
            (Some(file), _) => {
                deployer
                    .upload_file(&file)
                    .await
                    .with_context(|| format!("Failed to upload {:?}", file))?;
                println!("Uploaded {:?}", file);
            }
            (None, Some(dir)) => {
                let count = deployer
                    .upload_dir(&dir)
                    .await
                    .with_context(|| format!("Failed to upload {:?}", dir))?;
                println!("Uploaded {} files from {:?}", count, dir);
            }
            (None, None) => bail!("Either --filename or --dir is required"),
        },
        Command::Download(download_args) => {
            let count = deployer
                .download(&download_args.prefix, &download_args.out)
                .await
                .with_context(|| format!("Failed to download {:?}", download_args.prefix))?;
            println!("Downloaded {} objects to {:?}", count, download_args.out);
        }
        Command::List(list_args) => {
            let keys = deployer
                .list_dir(&list_args.dir)
                .await
                .with_context(|| format!("Failed to list {:?}", list_args.dir))?;
            for key in keys {
                println!("{}", key);
            }
        }
        Command::Remove(remove_args) => match (remove_args.filename, remove_args.dir) {
            (Some(file), _) => {
                deployer
                    .remove_file(&file)
                    .await
                    .with_context(|| format!("Failed to remove {:?}", file))?;
                println!("Removed {:?}", file);
            }
            (None, Some(dir)) => {
                let count = deployer
                    .remove_dir(&dir)
                    .await
                    .with_context(|| format!("Failed to remove {:?}", dir))?;
                println!("Removed {} objects under {:?}", count, dir);
            }
            (None, None) => bail!("Either --filename or --dir is required"),
        },
        Command::Init(_) => {}
    }

    Ok(())
}

fn load_config(args: &cli::ClusterArgs) -> Result<ClusterConfig> {
    if let Some(path) = &args.config {
        info!("Loading cluster config from {:?}", path);
    }
    let mut config = args.to_config()?;

    // Local mode rehearses the whole cluster on this machine
    if args.local {
        if config.master.is_empty() {
            config.master = vec!["127.0.0.1".to_string()];
        }
        if config.node.is_empty() {
            config.node = vec!["127.0.0.1".to_string()];
        }
    }
    Ok(config)
}

async fn build_deployer(config: ClusterConfig, local: bool) -> Result<Deployer> {
    let executor: Arc<dyn RemoteExecutor> = if local {
        println!("\n*** LOCAL MODE - Running scripts on this machine ***\n");
        Arc::new(LocalExecutor::new())
    } else {
        Arc::new(SshExecutor::new(config.ssh.clone()))
    };
    let probe = Arc::new(TcpPortProbe::new(config.timeouts.probe_timeout()));

    let deployer = Deployer::new(config, executor, probe)
        .await
        .context("Invalid cluster configuration")?;
    Ok(deployer)
}

fn print_plan(deployer: &Deployer) -> Result<()> {
    println!("Dry run mode - nothing will be executed");
    println!("\nConfiguration:");
    println!("  Backend: {}", deployer.config().backend);
    println!("  Bin dir: {}", deployer.config().bin_dir);
    println!("  Data dir: {}", deployer.config().data_dir);
    println!("\nTopology:");
    for node in deployer.topology().nodes() {
        println!("  - {} {} ({})", node.role, node.address(), node.data_dir);
    }

    for planned in deployer.plan()? {
        println!("\n# {} on {}", planned.label, planned.host);
        print!("{}", planned.script);
    }
    Ok(())
}

fn finish_report(report: &BootstrapReport, path: Option<&Path>) -> Result<()> {
    println!("\n{}", "=".repeat(60));
    println!("{} ({:?})", report.deployment_id, report.phase);
    println!("{}", "=".repeat(60));
    if !report.fetched_hosts.is_empty() {
        println!("  Fetched on: {}", report.fetched_hosts.join(", "));
    }
    for node in &report.nodes {
        match &node.error {
            Some(error) => println!("  {} {}:{} - {}", node.role, node.host, node.port, error),
            None => println!("  {} {}:{} - {:?}", node.role, node.host, node.port, node.status),
        }
    }
    println!("  Ready: {}", report.ready);

    if let Some(path) = path {
        report.save_json(path)?;
        println!("\nReport saved to: {:?}", path);
    }
    Ok(())
}

fn generate_sample_config(args: &cli::InitArgs) -> Result<()> {
    let config = ClusterConfig::sample();

    config.save(&args.output)?;
    println!("Generated sample config at: {:?}", args.output);

    Ok(())
}
