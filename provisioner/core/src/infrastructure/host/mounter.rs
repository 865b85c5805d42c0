// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Mount helper backed by the host's `mount`/`umount` binaries.
//!
//! The `efs` filesystem type is served by the mount helper installed on the
//! node; this adapter only builds the command line and reports failures.

use async_trait::async_trait;
use std::os::unix::fs::MetadataExt;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info};

use crate::domain::host::{MountError, Mounter};

const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(120);

pub struct SystemMounter {
    timeout: Duration,
}

impl SystemMounter {
    pub fn new() -> Self {
        Self {
            timeout: DEFAULT_COMMAND_TIMEOUT,
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn run(&self, program: &str, args: &[String]) -> Result<(), MountError> {
        debug!("Running {} {}", program, args.join(" "));
        let mut cmd = Command::new(program);
        cmd.args(args);

        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Ok(Ok(output)) if output.status.success() => Ok(()),
            Ok(Ok(output)) => Err(MountError::CommandFailed(format!(
                "{} exited with {}: {}",
                program,
                output.status.code().unwrap_or(-1),
                String::from_utf8_lossy(&output.stderr).trim()
            ))),
            Ok(Err(e)) => Err(MountError::Io(e)),
            Err(_) => Err(MountError::CommandFailed(format!(
                "{} timed out after {:?}",
                program, self.timeout
            ))),
        }
    }
}

impl Default for SystemMounter {
    fn default() -> Self {
        Self::new()
    }
}

/// Arguments for `mount`: `-t <fs_type> [-o <options>] <source> <target>`.
pub fn mount_args(source: &str, target: &Path, fs_type: &str, options: &[String]) -> Vec<String> {
    let mut args = vec!["-t".to_string(), fs_type.to_string()];
    if !options.is_empty() {
        args.push("-o".to_string());
        args.push(options.join(","));
    }
    args.push(source.to_string());
    args.push(target.display().to_string());
    args
}

#[async_trait]
impl Mounter for SystemMounter {
    async fn make_dir(&self, target: &Path) -> Result<(), MountError> {
        tokio::fs::create_dir_all(target).await?;
        Ok(())
    }

    async fn mount(
        &self,
        source: &str,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), MountError> {
        info!("Mounting {} at {:?} with options {:?}", source, target, options);
        self.run("mount", &mount_args(source, target, fs_type, options))
            .await
    }

    async fn unmount(&self, target: &Path) -> Result<(), MountError> {
        match tokio::fs::metadata(target).await {
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            _ => {}
        }
        if self.is_likely_not_mount_point(target).await? {
            debug!("{:?} is not mounted, skipping unmount", target);
            return Ok(());
        }
        info!("Unmounting {:?}", target);
        self.run("umount", &[target.display().to_string()]).await
    }

    /// A directory on a different device than its parent is a mount point.
    /// Bind mounts of the same device are not detected.
    async fn is_likely_not_mount_point(&self, target: &Path) -> Result<bool, MountError> {
        let Some(parent) = target.parent() else {
            return Ok(false);
        };
        let target_meta = tokio::fs::metadata(target).await?;
        let parent_meta = tokio::fs::metadata(parent).await?;
        Ok(target_meta.dev() == parent_meta.dev())
    }
}
