// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Host collaborator traits
//!
//! The provisioners mount filesystem roots at scratch paths to create or purge
//! directories. The syscalls themselves live behind these traits; every
//! operation must be safe to repeat against a half-cleaned state so that a
//! retried Delete can finish what a failed one started.

use async_trait::async_trait;
use std::path::Path;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MountError {
    #[error("mount helper failed: {0}")]
    CommandFailed(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mount helper abstraction.
#[async_trait]
pub trait Mounter: Send + Sync {
    /// Create `target` (and parents). Succeeds if it already exists.
    async fn make_dir(&self, target: &Path) -> Result<(), MountError>;

    async fn mount(
        &self,
        source: &str,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), MountError>;

    async fn unmount(&self, target: &Path) -> Result<(), MountError>;

    /// Best-effort check; `true` means `target` is probably not a mount point.
    async fn is_likely_not_mount_point(&self, target: &Path) -> Result<bool, MountError>;
}

/// Local filesystem operations used beneath a mounted root.
#[async_trait]
pub trait OsClient: Send + Sync {
    /// Create `path` and parents with `perms`, without changing ownership.
    async fn mkdir_all_with_perms(&self, path: &Path, perms: u32) -> std::io::Result<()>;

    /// Recursively remove `path`. A missing path is success.
    async fn remove_all(&self, path: &Path) -> std::io::Result<()>;

    /// Remove an empty directory. A missing path is success.
    async fn remove(&self, path: &Path) -> std::io::Result<()>;

    async fn is_dir(&self, path: &Path) -> std::io::Result<bool>;

    async fn get_perms(&self, path: &Path) -> std::io::Result<u32>;
}
