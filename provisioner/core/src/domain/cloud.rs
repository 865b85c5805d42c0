// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Storage Control Plane Trait - Anti-Corruption Layer for the remote API
//!
//! Abstracts the remote storage-control plane that owns filesystems,
//! access points and mount targets. The provisioners only ever talk to
//! this trait, so tests and local development can swap in the in-memory
//! implementation from `crate::infrastructure::cloud`.
//!
//! Every operation fails with one of the [`CloudError`] sentinels; callers
//! pattern-match them into the provisioning taxonomy.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// A shared filesystem known to the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSystem {
    pub file_system_id: String,
}

/// POSIX identity enforced by an access point.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PosixUser {
    pub uid: i64,
    pub gid: i64,
}

/// Remote access point: an identity- and path-scoped entry into a filesystem.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPoint {
    pub access_point_id: String,
    pub file_system_id: String,
    pub root_directory: String,
    /// Absent when the remote side reports no identity (e.g. created out of band)
    pub posix_user: Option<PosixUser>,
    /// Pass-through capacity. The remote system does not enforce it.
    pub capacity_bytes: i64,
}

/// Fully resolved options for a create call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessPointOptions {
    pub capacity_bytes: i64,
    pub file_system_id: String,
    pub uid: i64,
    pub gid: i64,
    pub directory_perms: Option<String>,
    pub directory_path: String,
    pub tags: HashMap<String, String>,
}

/// Network endpoint of a filesystem in one availability zone.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MountTarget {
    pub az_name: String,
    pub az_id: String,
    pub mount_target_id: String,
    pub ip_address: String,
}

/// Sentinel errors returned by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CloudError {
    #[error("Resource was not found")]
    NotFound,

    #[error("Resource already exists")]
    AlreadyExists,

    #[error("Access denied")]
    AccessDenied,

    #[error("{0}")]
    Other(String),
}

/// Remote resource client consumed by the provisioners.
#[async_trait]
pub trait StorageControlPlane: Send + Sync {
    /// Create an access point. `client_token` makes the call idempotent:
    /// repeating it with identical options returns the same access point.
    async fn create_access_point(
        &self,
        client_token: &str,
        options: &AccessPointOptions,
    ) -> Result<AccessPoint, CloudError>;

    async fn delete_access_point(&self, access_point_id: &str) -> Result<(), CloudError>;

    async fn describe_access_point(&self, access_point_id: &str) -> Result<AccessPoint, CloudError>;

    /// Look up an access point by the client token it was created with.
    /// `Ok(None)` means no such access point exists on the filesystem.
    async fn find_access_point_by_client_token(
        &self,
        client_token: &str,
        file_system_id: &str,
    ) -> Result<Option<AccessPoint>, CloudError>;

    /// List every access point on a filesystem. Fails with
    /// [`CloudError::NotFound`] when the filesystem does not exist.
    async fn list_access_points(&self, file_system_id: &str) -> Result<Vec<AccessPoint>, CloudError>;

    async fn describe_file_system(&self, file_system_id: &str) -> Result<FileSystem, CloudError>;

    /// Pick an available mount target, preferring `az_name` when non-empty.
    async fn describe_mount_targets(
        &self,
        file_system_id: &str,
        az_name: &str,
    ) -> Result<MountTarget, CloudError>;
}

/// Builds control plane clients scoped to an assumed role (cross-account).
#[async_trait]
pub trait ControlPlaneFactory: Send + Sync {
    async fn with_role(&self, role_arn: &str) -> Result<Arc<dyn StorageControlPlane>, CloudError>;
}
