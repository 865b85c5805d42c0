// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use std::io::ErrorKind;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

use crate::domain::host::OsClient;

/// [`OsClient`] over the local filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostOsClient;

impl HostOsClient {
    pub fn new() -> Self {
        Self
    }
}

fn ignore_not_found(result: std::io::Result<()>) -> std::io::Result<()> {
    match result {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

#[async_trait]
impl OsClient for HostOsClient {
    async fn mkdir_all_with_perms(&self, path: &Path, perms: u32) -> std::io::Result<()> {
        tokio::fs::create_dir_all(path).await?;
        // create_dir_all is subject to the umask; set the leaf explicitly.
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(perms)).await
    }

    async fn remove_all(&self, path: &Path) -> std::io::Result<()> {
        ignore_not_found(tokio::fs::remove_dir_all(path).await)
    }

    async fn remove(&self, path: &Path) -> std::io::Result<()> {
        ignore_not_found(tokio::fs::remove_dir(path).await)
    }

    async fn is_dir(&self, path: &Path) -> std::io::Result<bool> {
        match tokio::fs::metadata(path).await {
            Ok(meta) => Ok(meta.is_dir()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn get_perms(&self, path: &Path) -> std::io::Result<u32> {
        let meta = tokio::fs::metadata(path).await?;
        Ok(meta.permissions().mode() & 0o7777)
    }
}
