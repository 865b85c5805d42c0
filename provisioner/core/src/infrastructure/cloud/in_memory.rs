// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! In-Memory Storage Control Plane
//!
//! Process-local implementation of [`StorageControlPlane`] for development,
//! offline planning and tests. Mirrors the remote system's observable
//! contract: client-token idempotence, not-found sentinels for unknown
//! filesystems and access points, and per-zone mount targets.
//!
//! Faults can be injected per operation, and every call is counted so tests
//! can assert that a rejected request never reached the control plane.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::domain::cloud::{
    AccessPoint, AccessPointOptions, CloudError, ControlPlaneFactory, FileSystem, MountTarget,
    PosixUser, StorageControlPlane,
};

/// Control plane operations, used to target injected faults and read call counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    CreateAccessPoint,
    DeleteAccessPoint,
    DescribeAccessPoint,
    FindAccessPointByClientToken,
    ListAccessPoints,
    DescribeFileSystem,
    DescribeMountTargets,
}

#[derive(Debug, Default)]
struct FileSystemState {
    mount_targets: Vec<MountTarget>,
    access_points: HashMap<String, AccessPoint>,
    /// client token -> (access point id, options it was created with)
    client_tokens: HashMap<String, (String, AccessPointOptions)>,
}

#[derive(Debug, Default)]
pub struct InMemoryControlPlane {
    file_systems: RwLock<HashMap<String, FileSystemState>>,
    faults: RwLock<HashMap<Operation, CloudError>>,
    calls: RwLock<HashMap<Operation, usize>>,
    total_calls: AtomicUsize,
}

impl InMemoryControlPlane {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a filesystem with no mount targets.
    pub fn add_file_system(&self, file_system_id: &str) {
        self.file_systems
            .write()
            .entry(file_system_id.to_string())
            .or_default();
    }

    pub fn add_mount_target(&self, file_system_id: &str, mount_target: MountTarget) {
        self.file_systems
            .write()
            .entry(file_system_id.to_string())
            .or_default()
            .mount_targets
            .push(mount_target);
    }

    /// Insert an access point directly, bypassing create (out-of-band state).
    pub fn insert_access_point(&self, access_point: AccessPoint) {
        self.file_systems
            .write()
            .entry(access_point.file_system_id.clone())
            .or_default()
            .access_points
            .insert(access_point.access_point_id.clone(), access_point);
    }

    /// Make every call to `operation` fail with `error` until cleared.
    pub fn inject_fault(&self, operation: Operation, error: CloudError) {
        self.faults.write().insert(operation, error);
    }

    pub fn clear_fault(&self, operation: Operation) {
        self.faults.write().remove(&operation);
    }

    pub fn access_points(&self, file_system_id: &str) -> Vec<AccessPoint> {
        self.file_systems
            .read()
            .get(file_system_id)
            .map(|fs| fs.access_points.values().cloned().collect())
            .unwrap_or_default()
    }

    pub fn call_count(&self, operation: Operation) -> usize {
        self.calls.read().get(&operation).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.total_calls.load(Ordering::SeqCst)
    }

    fn record(&self, operation: Operation) -> Result<(), CloudError> {
        self.total_calls.fetch_add(1, Ordering::SeqCst);
        *self.calls.write().entry(operation).or_insert(0) += 1;
        match self.faults.read().get(&operation) {
            Some(err) => {
                debug!("Injected fault for {:?}: {}", operation, err);
                Err(err.clone())
            }
            None => Ok(()),
        }
    }
}

#[async_trait]
impl StorageControlPlane for InMemoryControlPlane {
    async fn create_access_point(
        &self,
        client_token: &str,
        options: &AccessPointOptions,
    ) -> Result<AccessPoint, CloudError> {
        self.record(Operation::CreateAccessPoint)?;

        let mut file_systems = self.file_systems.write();
        let fs = file_systems
            .get_mut(&options.file_system_id)
            .ok_or(CloudError::NotFound)?;

        if let Some((existing_id, existing_options)) = fs.client_tokens.get(client_token) {
            if existing_options != options {
                return Err(CloudError::AlreadyExists);
            }
            if let Some(existing) = fs.access_points.get(existing_id) {
                return Ok(existing.clone());
            }
        }

        let access_point = AccessPoint {
            access_point_id: format!("fsap-{}", Uuid::new_v4().simple()),
            file_system_id: options.file_system_id.clone(),
            root_directory: options.directory_path.clone(),
            posix_user: Some(PosixUser {
                uid: options.uid,
                gid: options.gid,
            }),
            capacity_bytes: options.capacity_bytes,
        };
        fs.client_tokens.insert(
            client_token.to_string(),
            (access_point.access_point_id.clone(), options.clone()),
        );
        fs.access_points
            .insert(access_point.access_point_id.clone(), access_point.clone());

        debug!(
            "Created access point {} on {}",
            access_point.access_point_id, access_point.file_system_id
        );
        Ok(access_point)
    }

    async fn delete_access_point(&self, access_point_id: &str) -> Result<(), CloudError> {
        self.record(Operation::DeleteAccessPoint)?;

        let mut file_systems = self.file_systems.write();
        for fs in file_systems.values_mut() {
            if fs.access_points.remove(access_point_id).is_some() {
                fs.client_tokens.retain(|_, (id, _)| id != access_point_id);
                return Ok(());
            }
        }
        Err(CloudError::NotFound)
    }

    async fn describe_access_point(&self, access_point_id: &str) -> Result<AccessPoint, CloudError> {
        self.record(Operation::DescribeAccessPoint)?;

        self.file_systems
            .read()
            .values()
            .find_map(|fs| fs.access_points.get(access_point_id).cloned())
            .ok_or(CloudError::NotFound)
    }

    async fn find_access_point_by_client_token(
        &self,
        client_token: &str,
        file_system_id: &str,
    ) -> Result<Option<AccessPoint>, CloudError> {
        self.record(Operation::FindAccessPointByClientToken)?;

        let file_systems = self.file_systems.read();
        let fs = file_systems.get(file_system_id).ok_or(CloudError::NotFound)?;
        Ok(fs
            .client_tokens
            .get(client_token)
            .and_then(|(id, _)| fs.access_points.get(id).cloned()))
    }

    async fn list_access_points(&self, file_system_id: &str) -> Result<Vec<AccessPoint>, CloudError> {
        self.record(Operation::ListAccessPoints)?;

        self.file_systems
            .read()
            .get(file_system_id)
            .map(|fs| fs.access_points.values().cloned().collect())
            .ok_or(CloudError::NotFound)
    }

    async fn describe_file_system(&self, file_system_id: &str) -> Result<FileSystem, CloudError> {
        self.record(Operation::DescribeFileSystem)?;

        if self.file_systems.read().contains_key(file_system_id) {
            Ok(FileSystem {
                file_system_id: file_system_id.to_string(),
            })
        } else {
            Err(CloudError::NotFound)
        }
    }

    async fn describe_mount_targets(
        &self,
        file_system_id: &str,
        az_name: &str,
    ) -> Result<MountTarget, CloudError> {
        self.record(Operation::DescribeMountTargets)?;

        let file_systems = self.file_systems.read();
        let fs = file_systems.get(file_system_id).ok_or(CloudError::NotFound)?;
        let preferred = (!az_name.is_empty())
            .then(|| fs.mount_targets.iter().find(|mt| mt.az_name == az_name))
            .flatten();
        preferred
            .or_else(|| fs.mount_targets.first())
            .cloned()
            .ok_or_else(|| {
                CloudError::Other(format!("Cannot find mount targets for file system {}", file_system_id))
            })
    }
}

/// Role-scoped clients registered up front. Unknown roles are denied.
#[derive(Default)]
pub struct StaticControlPlaneFactory {
    roles: RwLock<HashMap<String, Arc<dyn StorageControlPlane>>>,
}

impl StaticControlPlaneFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_role(&self, role_arn: &str, client: Arc<dyn StorageControlPlane>) {
        self.roles.write().insert(role_arn.to_string(), client);
    }
}

#[async_trait]
impl ControlPlaneFactory for StaticControlPlaneFactory {
    async fn with_role(&self, role_arn: &str) -> Result<Arc<dyn StorageControlPlane>, CloudError> {
        self.roles
            .read()
            .get(role_arn)
            .cloned()
            .ok_or(CloudError::AccessDenied)
    }
}
