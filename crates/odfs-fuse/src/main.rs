#![deny(unsafe_code)]

use std::io;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use odfs_core::{HttpRemoteStore, OdfsConfig, OdfsOperations, RetryingStore};
use odfs_fuse::{MountConfig, OdfsFs, mount_until_signal};

/// Mount OpenDistributedFileStorage containers as a read-only filesystem
#[derive(Parser)]
#[command(name = "odfs-mount")]
#[command(author, version)]
#[command(after_help = "EXAMPLES:
    # Mount with credentials from config.yaml
    odfs-mount config.yaml /mnt/odfs

    # Share the mount with other users and log remote calls
    odfs-mount -vv --allow-other config.yaml /mnt/odfs
")]
struct Cli {
    /// YAML file with endpoints and client credentials
    #[arg(value_name = "CONFIG")]
    config: PathBuf,

    /// Existing directory to mount on
    #[arg(value_name = "MOUNTPOINT")]
    mountpoint: PathBuf,

    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Allow other users to access the mount
    #[arg(long)]
    allow_other: bool,

    /// Unmount automatically when the process exits
    #[arg(long)]
    auto_unmount: bool,

    /// Kernel attribute cache lifetime in seconds
    #[arg(long, value_name = "SECONDS", default_value_t = 60)]
    attr_ttl: u64,
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    setup_tracing(cli.verbose);

    let config = OdfsConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let store = HttpRemoteStore::connect(&config).context("Failed to authenticate with ODFS")?;
    let request_stats = store.stats();
    let remote = RetryingStore::new(store, config.max_retries, config.retry_backoff);
    let ops = OdfsOperations::new(Arc::new(remote));

    let mount_config = MountConfig::default()
        .attr_ttl(Duration::from_secs(cli.attr_ttl))
        .allow_other(cli.allow_other)
        .auto_unmount(cli.auto_unmount);
    let fs = OdfsFs::new(ops, mount_config);

    mount_until_signal(fs, &cli.mountpoint)
        .with_context(|| format!("Failed to mount at {}", cli.mountpoint.display()))?;

    let summary = request_stats.summary();
    info!(
        started = summary.started,
        completed = summary.completed,
        timed_out = summary.timed_out,
        abandoned = summary.abandoned(),
        "Remote requests during mount"
    );
    Ok(())
}

/// Set up tracing/logging based on verbosity level
fn setup_tracing(verbose: u8) {
    let filter = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()))
        .with_writer(io::stderr)
        .init();
}
