// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Directory Provisioner (legacy `efs-dir` mode)
//!
//! Creates a plain directory per volume by mounting the filesystem root at a
//! scratch path. No access point is involved, so there is no identity
//! isolation; the volume id carries the directory instead.

use async_trait::async_trait;
use chrono::Utc;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::provisioner::{
    required_file_system_id, validate_parameter_keys, Provisioner, ProvisionerContext,
    EFS_FS_TYPE,
};
use crate::domain::error::{ProvisionError, ProvisionResult};
use crate::domain::events::ProvisioningEvent;
use crate::domain::path_builder::clean_path;
use crate::domain::volume::{
    keys, DeleteRequest, ProvisionRequest, ProvisioningMode, Volume, VolumeId,
};

pub const DEFAULT_DIRECTORY_PERMS: u32 = 0o777;

/// Parse an octal permission string, falling back to 0777.
pub fn parse_directory_perms(value: Option<&str>) -> u32 {
    match value {
        None => DEFAULT_DIRECTORY_PERMS,
        Some(raw) => u32::from_str_radix(raw, 8).unwrap_or_else(|_| {
            warn!("Invalid {} '{}', using {:o}", keys::DIRECTORY_PERMS, raw, DEFAULT_DIRECTORY_PERMS);
            DEFAULT_DIRECTORY_PERMS
        }),
    }
}

pub struct DirectoryProvisioner {
    ctx: ProvisionerContext,
}

impl DirectoryProvisioner {
    pub fn new(ctx: ProvisionerContext) -> Self {
        Self { ctx }
    }

    fn scratch_target(&self) -> PathBuf {
        self.ctx
            .settings
            .temp_mount_path_prefix
            .join(Uuid::new_v4().to_string())
    }

    async fn mount_root(
        &self,
        file_system_id: &str,
        target: &Path,
        mount_options: &[String],
    ) -> ProvisionResult<()> {
        self.ctx.mounter.make_dir(target).await.map_err(|e| {
            ProvisionError::internal(format!("Could not create dir {:?}: {}", target, e))
        })?;
        if let Err(e) = self
            .ctx
            .mounter
            .mount(file_system_id, target, EFS_FS_TYPE, mount_options)
            .await
        {
            if let Err(remove_err) = self.ctx.os_client.remove(target).await {
                warn!("Could not delete {:?} after failed mount: {}", target, remove_err);
            }
            return Err(ProvisionError::internal(format!(
                "Could not mount {} at {:?}: {}",
                file_system_id, target, e
            )));
        }
        Ok(())
    }

    async fn cleanup_mount(&self, target: &Path) -> ProvisionResult<()> {
        self.ctx.mounter.unmount(target).await.map_err(|e| {
            ProvisionError::internal(format!("Could not unmount {:?}: {}", target, e))
        })?;
        self.ctx.os_client.remove(target).await.map_err(|e| {
            ProvisionError::internal(format!("Could not delete {:?}: {}", target, e))
        })
    }
}

#[async_trait]
impl Provisioner for DirectoryProvisioner {
    fn mode(&self) -> ProvisioningMode {
        ProvisioningMode::Directory
    }

    async fn provision(&self, request: &ProvisionRequest) -> ProvisionResult<Volume> {
        if request.name.is_empty() {
            return Err(ProvisionError::invalid_argument("Volume name not provided"));
        }
        validate_parameter_keys(&request.parameters)?;
        let file_system_id = required_file_system_id(&request.parameters)?;

        let base_path = request
            .parameters
            .get(keys::BASE_PATH)
            .map(String::as_str)
            .unwrap_or("");
        let provisioned_path = clean_path(&format!("/{}/{}", base_path, request.name));
        let perms = parse_directory_perms(
            request.parameters.get(keys::DIRECTORY_PERMS).map(String::as_str),
        );
        let az_name = request
            .parameters
            .get(keys::AZ_NAME)
            .map(String::as_str)
            .unwrap_or("");

        let cloud = self.ctx.resolve_cloud(&request.secrets).await?;
        let hints = cloud.connectivity_hints(&file_system_id, az_name).await;

        let target = self.scratch_target();
        self.mount_root(&file_system_id, &target, &hints.scratch_mount_options())
            .await?;

        let directory = target.join(provisioned_path.trim_start_matches('/'));
        debug!("Creating directory {:?} with perms {:o}", directory, perms);
        let created = self
            .ctx
            .os_client
            .mkdir_all_with_perms(&directory, perms)
            .await
            .map_err(|e| {
                ProvisionError::internal(format!(
                    "Could not provision directory {}: {}",
                    provisioned_path, e
                ))
            });

        let cleaned = self.cleanup_mount(&target).await;
        created?;
        cleaned?;

        let volume_id = VolumeId::directory(&file_system_id, &provisioned_path).to_string();
        info!(volume_id = %volume_id, "Provisioned directory volume");
        self.ctx.event_bus.publish(ProvisioningEvent::VolumeProvisioned {
            volume_id: volume_id.clone(),
            mode: ProvisioningMode::Directory,
            file_system_id,
            root_directory: provisioned_path,
            uid: None,
            gid: None,
            provisioned_at: Utc::now(),
        });

        Ok(Volume {
            volume_id,
            capacity_bytes: request.capacity_bytes,
            volume_context: hints.volume_context,
        })
    }

    async fn delete(&self, request: &DeleteRequest) -> ProvisionResult<()> {
        let volume_id = match VolumeId::parse(&request.volume_id) {
            Ok(id) => id,
            Err(e) => {
                warn!("DeleteVolume: {}, returning success", e);
                return Ok(());
            }
        };

        if !self.ctx.settings.delete_provisioned_dir {
            info!(
                "Retaining directory of volume {}, deletion is disabled",
                request.volume_id
            );
            return Ok(());
        }

        let Some(subpath) = volume_id.subpath.as_deref() else {
            return Err(ProvisionError::not_found(format!(
                "Volume {} has no directory to delete",
                request.volume_id
            )));
        };

        let relative = clean_path(subpath);
        if relative == "/" {
            return Err(ProvisionError::invalid_argument(format!(
                "Refusing to delete the root of file system {}",
                volume_id.file_system_id
            )));
        }

        let cloud = self.ctx.resolve_cloud(&request.secrets).await?;
        let hints = cloud
            .connectivity_hints(&volume_id.file_system_id, "")
            .await;

        let target = self.scratch_target();
        self.mount_root(&volume_id.file_system_id, &target, &hints.scratch_mount_options())
            .await?;

        let directory = target.join(relative.trim_start_matches('/'));
        let removed = self.ctx.os_client.remove_all(&directory).await.map_err(|e| {
            ProvisionError::internal(format!("Could not delete directory {}: {}", subpath, e))
        });

        let cleaned = self.cleanup_mount(&target).await;
        removed?;
        cleaned?;

        info!("Deleted directory volume {}", request.volume_id);
        self.ctx.event_bus.publish(ProvisioningEvent::VolumeDeleted {
            volume_id: request.volume_id.clone(),
            mode: ProvisioningMode::Directory,
            deleted_at: Utc::now(),
        });
        Ok(())
    }
}
