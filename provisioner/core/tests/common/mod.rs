// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use efs_provisioner_core::domain::cloud::MountTarget;
use efs_provisioner_core::domain::host::{MountError, Mounter, OsClient};
use efs_provisioner_core::domain::provisioner_config::ProvisionerSpec;
use efs_provisioner_core::infrastructure::cloud::{InMemoryControlPlane, StaticControlPlaneFactory};
use efs_provisioner_core::infrastructure::event_bus::EventBus;
use efs_provisioner_core::ProvisionerContext;

pub const FS_ID: &str = "fs-abcd1234";
pub const ROLE_ARN: &str = "arn:aws:iam::123456789012:role/EFSCrossAccountAccessRole";

// ============================================================================
// Fake host: mount table and directory tree kept in memory
// ============================================================================

#[derive(Default)]
pub struct HostState {
    pub mounted: HashSet<PathBuf>,
    pub dirs: HashMap<PathBuf, u32>,
    pub calls: Vec<String>,
    pub failing: HashSet<&'static str>,
}

#[derive(Default, Clone)]
pub struct FakeHost {
    pub state: Arc<Mutex<HostState>>,
}

impl FakeHost {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail(&self, operation: &'static str) {
        self.state.lock().failing.insert(operation);
    }

    pub fn recover(&self, operation: &'static str) {
        self.state.lock().failing.remove(operation);
    }

    pub fn add_dir(&self, path: impl Into<PathBuf>) {
        self.state.lock().dirs.insert(path.into(), 0o777);
    }

    pub fn has_dir(&self, path: impl AsRef<Path>) -> bool {
        self.state.lock().dirs.contains_key(path.as_ref())
    }

    pub fn perms(&self, path: impl AsRef<Path>) -> Option<u32> {
        self.state.lock().dirs.get(path.as_ref()).copied()
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    pub fn mounted(&self) -> HashSet<PathBuf> {
        self.state.lock().mounted.clone()
    }

    fn enter(&self, operation: &'static str, path: &Path) -> std::io::Result<()> {
        let mut state = self.state.lock();
        state.calls.push(format!("{} {}", operation, path.display()));
        if state.failing.contains(operation) {
            return Err(std::io::Error::other(format!("{} failed", operation)));
        }
        Ok(())
    }
}

#[async_trait]
impl Mounter for FakeHost {
    async fn make_dir(&self, target: &Path) -> Result<(), MountError> {
        self.enter("make_dir", target)?;
        self.state.lock().dirs.insert(target.to_path_buf(), 0o755);
        Ok(())
    }

    async fn mount(
        &self,
        source: &str,
        target: &Path,
        fs_type: &str,
        options: &[String],
    ) -> Result<(), MountError> {
        self.enter("mount", target)?;
        let mut state = self.state.lock();
        state
            .calls
            .push(format!("mount-args {} {} {}", source, fs_type, options.join(",")));
        state.mounted.insert(target.to_path_buf());
        Ok(())
    }

    async fn unmount(&self, target: &Path) -> Result<(), MountError> {
        self.enter("unmount", target)?;
        self.state.lock().mounted.remove(target);
        Ok(())
    }

    async fn is_likely_not_mount_point(&self, target: &Path) -> Result<bool, MountError> {
        Ok(!self.state.lock().mounted.contains(target))
    }
}

#[async_trait]
impl OsClient for FakeHost {
    async fn mkdir_all_with_perms(&self, path: &Path, perms: u32) -> std::io::Result<()> {
        self.enter("mkdir_all", path)?;
        self.state.lock().dirs.insert(path.to_path_buf(), perms);
        Ok(())
    }

    async fn remove_all(&self, path: &Path) -> std::io::Result<()> {
        self.enter("remove_all", path)?;
        self.state.lock().dirs.retain(|dir, _| !dir.starts_with(path));
        Ok(())
    }

    async fn remove(&self, path: &Path) -> std::io::Result<()> {
        self.enter("remove", path)?;
        self.state.lock().dirs.remove(path);
        Ok(())
    }

    async fn is_dir(&self, path: &Path) -> std::io::Result<bool> {
        Ok(self.state.lock().dirs.contains_key(path))
    }

    async fn get_perms(&self, path: &Path) -> std::io::Result<u32> {
        self.state
            .lock()
            .dirs
            .get(path)
            .copied()
            .ok_or_else(|| std::io::Error::from(std::io::ErrorKind::NotFound))
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub struct Fixture {
    pub cloud: Arc<InMemoryControlPlane>,
    pub role_cloud: Arc<InMemoryControlPlane>,
    pub factory: Arc<StaticControlPlaneFactory>,
    pub host: FakeHost,
    pub event_bus: EventBus,
    pub ctx: ProvisionerContext,
}

pub fn settings() -> ProvisionerSpec {
    ProvisionerSpec {
        temp_mount_path_prefix: PathBuf::from("/var/lib/csi/pv"),
        ..Default::default()
    }
}

pub fn fixture() -> Fixture {
    fixture_with(settings())
}

pub fn fixture_with(settings: ProvisionerSpec) -> Fixture {
    let cloud = Arc::new(InMemoryControlPlane::new());
    cloud.add_file_system(FS_ID);

    let role_cloud = Arc::new(InMemoryControlPlane::new());
    role_cloud.add_file_system(FS_ID);

    let factory = Arc::new(StaticControlPlaneFactory::new());
    factory.register_role(ROLE_ARN, role_cloud.clone());

    let host = FakeHost::new();
    let event_bus = EventBus::new(64);
    let ctx = ProvisionerContext::new(
        cloud.clone(),
        factory.clone(),
        Arc::new(host.clone()),
        Arc::new(host.clone()),
        settings,
    )
    .with_event_bus(event_bus.clone());

    Fixture {
        cloud,
        role_cloud,
        factory,
        host,
        event_bus,
        ctx,
    }
}

pub fn mount_target(az_name: &str, ip_address: &str) -> MountTarget {
    MountTarget {
        az_name: az_name.to_string(),
        az_id: format!("{}-id", az_name),
        mount_target_id: format!("fsmt-{}", az_name),
        ip_address: ip_address.to_string(),
    }
}
