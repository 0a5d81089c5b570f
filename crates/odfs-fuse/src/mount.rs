//! Mounting and lifecycle of the FUSE session.

use crate::config::MountConfig;
use crate::filesystem::OdfsFs;
use fuser::{BackgroundSession, MountOption};
use std::path::{Path, PathBuf};
use std::sync::mpsc;
use thiserror::Error;
use tracing::info;

/// Errors from mounting the filesystem.
#[derive(Debug, Error)]
pub enum MountError {
    #[error("mountpoint {} does not exist", .0.display())]
    MissingMountpoint(PathBuf),

    #[error("mountpoint {} is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("FUSE mount failed: {0}")]
    Mount(#[from] std::io::Error),

    #[error("failed to install signal handler: {0}")]
    Signal(#[from] ctrlc::Error),
}

/// Mount options for a read-only ODFS mount.
pub fn mount_options(config: &MountConfig) -> Vec<MountOption> {
    let mut options = vec![
        MountOption::RO,
        MountOption::FSName("odfs".to_string()),
        MountOption::Subtype("odfs".to_string()),
        // Let the kernel check the synthetic permission bits
        MountOption::DefaultPermissions,
    ];
    if config.allow_other {
        options.push(MountOption::AllowOther);
    }
    if config.auto_unmount {
        options.push(MountOption::AutoUnmount);
    }
    options
}

/// Checks that `mountpoint` is an existing directory.
pub fn check_mountpoint(mountpoint: &Path) -> Result<(), MountError> {
    if !mountpoint.exists() {
        return Err(MountError::MissingMountpoint(mountpoint.to_path_buf()));
    }
    if !mountpoint.is_dir() {
        return Err(MountError::NotADirectory(mountpoint.to_path_buf()));
    }
    Ok(())
}

/// Mounts `fs` in a background session. Dropping the session unmounts.
pub fn mount(fs: OdfsFs, mountpoint: &Path) -> Result<BackgroundSession, MountError> {
    check_mountpoint(mountpoint)?;
    let options = mount_options(fs.config());
    info!(mountpoint = %mountpoint.display(), "Starting FUSE mount");
    let session = fuser::spawn_mount2(fs, mountpoint, &options)?;
    info!(mountpoint = %mountpoint.display(), "FUSE mount successful");
    Ok(session)
}

/// Mounts `fs` and blocks until SIGINT or SIGTERM, then unmounts.
pub fn mount_until_signal(fs: OdfsFs, mountpoint: &Path) -> Result<(), MountError> {
    let (tx, rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        // Receiver is gone once shutdown has started
        let _ = tx.send(());
    })?;

    let session = mount(fs, mountpoint)?;
    eprintln!("Mounted at {}. Press Ctrl+C to unmount.", mountpoint.display());

    // A closed channel also means shutdown
    let _ = rx.recv();

    info!(mountpoint = %mountpoint.display(), "Unmounting FUSE filesystem");
    session.join();
    info!("FUSE unmount successful");
    Ok(())
}
