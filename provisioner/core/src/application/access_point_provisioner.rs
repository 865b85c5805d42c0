// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Access Point Provisioner Application Service
//!
//! Provisions one access point per volume. Coordinates:
//! - Domain layer: GidAllocator, PathBuilder, StorageControlPlane trait
//! - Lock manager: per-filesystem serialization of allocate-then-create,
//!   per-access-point serialization of create/reuse against delete
//! - Host layer: optional root directory purge on delete
//! - Event bus: publishing ProvisioningEvents for observability
//!
//! Every validation runs before the first remote call, so a rejected request
//! never leaves anything behind.

use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

use crate::application::lock_manager::LockGuard;
use crate::application::provisioner::{
    parse_bool, required_file_system_id, validate_parameter_keys, Provisioner,
    ProvisionerContext, ResolvedCloud, EFS_FS_TYPE,
};
use crate::domain::cloud::{AccessPoint, AccessPointOptions, CloudError};
use crate::domain::error::{ProvisionError, ProvisionResult};
use crate::domain::events::ProvisioningEvent;
use crate::domain::gid_allocator::IdentityRange;
use crate::domain::path_builder::{PathRequest, TemplateValues};
use crate::domain::volume::{
    keys, DeleteRequest, ProvisionRequest, ProvisioningMode, Volume, VolumeId, VolumeIdError,
};

// ============================================================================
// Request Parameters
// ============================================================================

/// Validated parameters of an access point provision request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessPointParameters {
    pub file_system_id: String,
    pub uid: Option<i64>,
    pub gid: Option<i64>,
    pub gid_range: IdentityRange,
    pub directory_perms: Option<String>,
    pub base_path: Option<String>,
    pub sub_path_pattern: Option<String>,
    pub ensure_unique_directory: bool,
    pub az_name: String,
    pub reuse_access_point: bool,
    pub template_values: TemplateValues,
}

impl AccessPointParameters {
    pub fn parse(parameters: &HashMap<String, String>) -> ProvisionResult<Self> {
        validate_parameter_keys(parameters)?;
        let file_system_id = required_file_system_id(parameters)?;

        let uid = parse_identity(parameters, keys::UID)?;
        let gid = parse_identity(parameters, keys::GID)?;

        let gid_min = parse_int(parameters, keys::GID_MIN)?;
        let gid_max = parse_int(parameters, keys::GID_MAX)?;
        let gid_range = match (gid_min, gid_max) {
            (None, None) => IdentityRange::default(),
            (Some(min), Some(max)) => IdentityRange::new(min, max)?,
            (Some(_), None) => {
                return Err(ProvisionError::invalid_argument(format!(
                    "Missing {} parameter",
                    keys::GID_MAX
                )))
            }
            (None, Some(_)) => {
                return Err(ProvisionError::invalid_argument(format!(
                    "Missing {} parameter",
                    keys::GID_MIN
                )))
            }
        };

        let ensure_unique_directory = match parameters.get(keys::ENSURE_UNIQUE_DIRECTORY) {
            Some(value) => parse_bool(value).unwrap_or_else(|| {
                warn!(
                    "Invalid {} value '{}', defaulting to true",
                    keys::ENSURE_UNIQUE_DIRECTORY,
                    value
                );
                true
            }),
            None => true,
        };

        let reuse_access_point = match parameters.get(keys::REUSE_ACCESS_POINT) {
            Some(value) => parse_bool(value).ok_or_else(|| {
                ProvisionError::invalid_argument(format!(
                    "Failed to parse invalid {}: {}",
                    keys::REUSE_ACCESS_POINT,
                    value
                ))
            })?,
            None => false,
        };

        Ok(Self {
            file_system_id,
            uid,
            gid,
            gid_range,
            directory_perms: parameters.get(keys::DIRECTORY_PERMS).cloned(),
            base_path: parameters.get(keys::BASE_PATH).cloned(),
            sub_path_pattern: parameters.get(keys::SUB_PATH_PATTERN).cloned(),
            ensure_unique_directory,
            az_name: parameters.get(keys::AZ_NAME).cloned().unwrap_or_default(),
            reuse_access_point,
            template_values: TemplateValues {
                pvc_name: parameters.get(keys::PVC_NAME).cloned(),
                pvc_namespace: parameters.get(keys::PVC_NAMESPACE).cloned(),
                pv_name: parameters.get(keys::PV_NAME).cloned(),
            },
        })
    }

    /// Whether a gid has to come from the allocator.
    pub fn needs_allocation(&self) -> bool {
        self.uid.is_none() || self.gid.is_none()
    }

    /// Idempotency token for the create call.
    ///
    /// Reuse mode groups requests by claim name, so the token is derived from
    /// it; otherwise every volume name gets its own access point.
    pub fn client_token(&self, volume_name: &str) -> ProvisionResult<String> {
        if !self.reuse_access_point {
            return Ok(volume_name.to_string());
        }
        let pvc_name = self.template_values.pvc_name.as_deref().ok_or_else(|| {
            ProvisionError::invalid_argument(format!(
                "{} requires the {} parameter",
                keys::REUSE_ACCESS_POINT,
                keys::PVC_NAME
            ))
        })?;
        Ok(hex::encode(Sha256::digest(pvc_name.as_bytes())))
    }

    pub fn path_request<'a>(&'a self, volume_name: &'a str) -> PathRequest<'a> {
        PathRequest {
            name: volume_name,
            base_path: self.base_path.as_deref(),
            sub_path_pattern: self.sub_path_pattern.as_deref(),
            ensure_unique_directory: self.ensure_unique_directory,
            values: self.template_values.clone(),
        }
    }
}

fn parse_int(parameters: &HashMap<String, String>, key: &str) -> ProvisionResult<Option<i64>> {
    parameters
        .get(key)
        .map(|value| {
            value.parse::<i64>().map_err(|e| {
                ProvisionError::invalid_argument(format!("Failed to parse invalid {}: {}", key, e))
            })
        })
        .transpose()
}

fn parse_identity(parameters: &HashMap<String, String>, key: &str) -> ProvisionResult<Option<i64>> {
    match parse_int(parameters, key)? {
        Some(value) if value < 0 => Err(ProvisionError::invalid_argument(format!(
            "{} must be greater or equal than 0",
            key
        ))),
        other => Ok(other),
    }
}

// ============================================================================
// Provisioner
// ============================================================================

pub struct AccessPointProvisioner {
    ctx: ProvisionerContext,
}

impl AccessPointProvisioner {
    pub fn new(ctx: ProvisionerContext) -> Self {
        Self { ctx }
    }

    pub fn context(&self) -> &ProvisionerContext {
        &self.ctx
    }

    async fn lock_access_point(&self, access_point_id: &str, reason: &str) -> ProvisionResult<LockGuard> {
        self.ctx
            .lock_manager
            .acquire(access_point_id, Some(self.ctx.settings.lock_timeout()))
            .await
            .map_err(|e| {
                ProvisionError::internal(format!(
                    "Could not take the lock {}: {}",
                    reason, e
                ))
            })
    }

    /// Allocate (if needed) and create under the filesystem lock.
    async fn create_access_point(
        &self,
        cloud: &ResolvedCloud,
        params: &AccessPointParameters,
        client_token: &str,
        capacity_bytes: i64,
        root_directory: String,
    ) -> ProvisionResult<AccessPoint> {
        let file_system_id = &params.file_system_id;

        let allocated_gid = if params.needs_allocation() {
            let gid = self
                .ctx
                .gid_allocator
                .allocate(cloud.client.as_ref(), file_system_id, params.gid_range)
                .await?;
            Some(gid)
        } else {
            // The list call would have caught a missing filesystem; this path has to ask.
            cloud
                .client
                .describe_file_system(file_system_id)
                .await
                .map_err(|e| match e {
                    CloudError::AccessDenied => ProvisionError::access_denied(&e),
                    CloudError::NotFound => ProvisionError::not_found(format!(
                        "File System does not exist: {}",
                        file_system_id
                    )),
                    other => ProvisionError::internal(format!(
                        "Failed to fetch File System info: {}",
                        other
                    )),
                })?;
            None
        };

        let uid = params.uid.or(allocated_gid).unwrap_or_default();
        let gid = params.gid.or(allocated_gid).unwrap_or_default();

        let options = AccessPointOptions {
            capacity_bytes,
            file_system_id: file_system_id.clone(),
            uid,
            gid,
            directory_perms: params.directory_perms.clone(),
            directory_path: root_directory,
            tags: self.ctx.access_point_tags(),
        };

        debug!(
            file_system_id = %file_system_id,
            uid,
            gid,
            directory_path = %options.directory_path,
            "Creating access point"
        );

        cloud
            .client
            .create_access_point(client_token, &options)
            .await
            .map_err(|e| {
                if let Some(gid) = allocated_gid {
                    self.ctx.gid_allocator.release(file_system_id, gid);
                }
                match e {
                    CloudError::AccessDenied => ProvisionError::access_denied(&e),
                    CloudError::AlreadyExists => {
                        ProvisionError::already_exists(format!("Access Point already exists: {}", e))
                    }
                    other => ProvisionError::internal(format!(
                        "Failed to create Access point in File System {} : {}",
                        file_system_id, other
                    )),
                }
            })
    }

    /// Mount the filesystem root and remove the access point's root directory.
    ///
    /// Returns `Ok(false)` when the access point is already gone.
    async fn purge_root_directory(
        &self,
        cloud: &ResolvedCloud,
        file_system_id: &str,
        access_point_id: &str,
    ) -> ProvisionResult<bool> {
        let access_point = match cloud.client.describe_access_point(access_point_id).await {
            Ok(ap) => ap,
            Err(CloudError::NotFound) => {
                info!("DeleteVolume: Access Point {} not found, returning success", access_point_id);
                return Ok(false);
            }
            Err(e @ CloudError::AccessDenied) => return Err(ProvisionError::access_denied(&e)),
            Err(e) => {
                return Err(ProvisionError::internal(format!(
                    "Could not get describe Access Point: {} , error: {}",
                    access_point_id, e
                )))
            }
        };

        let mount_options = cloud
            .connectivity_hints(file_system_id, "")
            .await
            .scratch_mount_options();

        let target = self.ctx.settings.temp_mount_path_prefix.join(access_point_id);
        let mounter = &self.ctx.mounter;

        mounter.make_dir(&target).await.map_err(|e| {
            ProvisionError::internal(format!("Could not create dir {:?}: {}", target, e))
        })?;

        let not_mounted = mounter.is_likely_not_mount_point(&target).await.map_err(|e| {
            ProvisionError::internal(format!("Could not check mount point {:?}: {}", target, e))
        })?;
        if not_mounted {
            mounter
                .mount(file_system_id, &target, EFS_FS_TYPE, &mount_options)
                .await
                .map_err(|e| {
                    ProvisionError::internal(format!(
                        "Could not mount {} at {:?}: {}",
                        file_system_id, target, e
                    ))
                })?;
        }

        let root = root_dir_under(&target, &access_point.root_directory);
        let is_dir = self.ctx.os_client.is_dir(&root).await.map_err(|e| {
            ProvisionError::internal(format!("Could not stat {:?}: {}", root, e))
        })?;
        if is_dir {
            self.ctx.os_client.remove_all(&root).await.map_err(|e| {
                ProvisionError::internal(format!(
                    "Could not delete access point root directory {:?}: {}",
                    access_point.root_directory, e
                ))
            })?;
        }

        mounter.unmount(&target).await.map_err(|e| {
            ProvisionError::internal(format!("Could not unmount {:?}: {}", target, e))
        })?;
        self.ctx.os_client.remove(&target).await.map_err(|e| {
            ProvisionError::internal(format!("Could not delete {:?}: {}", target, e))
        })?;

        info!(
            access_point_id = %access_point_id,
            root_directory = %access_point.root_directory,
            "Purged access point root directory"
        );
        self.ctx.event_bus.publish(ProvisioningEvent::AccessPointRootDirPurged {
            access_point_id: access_point_id.to_string(),
            root_directory: access_point.root_directory,
            purged_at: Utc::now(),
        });
        Ok(true)
    }
}

fn root_dir_under(mount_root: &Path, root_directory: &str) -> PathBuf {
    mount_root.join(root_directory.trim_start_matches('/'))
}

#[async_trait]
impl Provisioner for AccessPointProvisioner {
    fn mode(&self) -> ProvisioningMode {
        ProvisioningMode::AccessPoint
    }

    async fn provision(&self, request: &ProvisionRequest) -> ProvisionResult<Volume> {
        if request.name.is_empty() {
            return Err(ProvisionError::invalid_argument("Volume name not provided"));
        }

        let params = AccessPointParameters::parse(&request.parameters)?;
        let client_token = params.client_token(&request.name)?;
        let root_directory = self
            .ctx
            .path_builder
            .resolve(&params.path_request(&request.name))?;

        let cloud = self.ctx.resolve_cloud(&request.secrets).await?;
        let file_system_id = params.file_system_id.clone();

        // Released on every exit path, including cancellation.
        let _fs_guard = self
            .ctx
            .lock_manager
            .acquire(&file_system_id, None)
            .await
            .map_err(|e| ProvisionError::internal(e.to_string()))?;

        if params.reuse_access_point {
            let existing = cloud
                .client
                .find_access_point_by_client_token(&client_token, &file_system_id)
                .await
                .map_err(|e| match e {
                    CloudError::AccessDenied => ProvisionError::access_denied(&e),
                    other => ProvisionError::internal(format!("Failed to find access point: {}", other)),
                })?;

            if let Some(access_point) = existing {
                let _ap_guard = self
                    .lock_access_point(&access_point.access_point_id, "on existing access point")
                    .await?;
                let volume_id =
                    VolumeId::access_point(&file_system_id, &access_point.access_point_id).to_string();
                info!(
                    "Existing AccessPoint found : {} with client token {}",
                    access_point.access_point_id, client_token
                );

                let hints = cloud.connectivity_hints(&file_system_id, &params.az_name).await;
                self.ctx.event_bus.publish(ProvisioningEvent::AccessPointReused {
                    volume_id: volume_id.clone(),
                    access_point_id: access_point.access_point_id,
                    client_token,
                    reused_at: Utc::now(),
                });
                return Ok(Volume {
                    volume_id,
                    capacity_bytes: request.capacity_bytes,
                    volume_context: hints.volume_context,
                });
            }
        }

        let access_point = self
            .create_access_point(
                &cloud,
                &params,
                &client_token,
                request.capacity_bytes,
                root_directory,
            )
            .await?;

        let _ap_guard = self
            .lock_access_point(&access_point.access_point_id, "after creating access point")
            .await?;

        let hints = cloud.connectivity_hints(&file_system_id, &params.az_name).await;
        let volume_id =
            VolumeId::access_point(&file_system_id, &access_point.access_point_id).to_string();

        info!(
            volume_id = %volume_id,
            root_directory = %access_point.root_directory,
            "Provisioned access point volume"
        );
        let posix_user = access_point.posix_user;
        self.ctx.event_bus.publish(ProvisioningEvent::VolumeProvisioned {
            volume_id: volume_id.clone(),
            mode: ProvisioningMode::AccessPoint,
            file_system_id,
            root_directory: access_point.root_directory,
            uid: posix_user.map(|u| u.uid),
            gid: posix_user.map(|u| u.gid),
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
            Err(VolumeIdError::Empty) => {
                return Err(ProvisionError::invalid_argument("Volume ID not provided"))
            }
            Err(e) if e.is_prefix_violation() => {
                return Err(ProvisionError::invalid_argument(e.to_string()))
            }
            Err(e) => {
                // The orchestrator may retry deletes for ids it can no longer reconstruct.
                warn!("DeleteVolume: {}, returning success", e);
                return Ok(());
            }
        };

        let Some(access_point_id) = volume_id.access_point_id.clone() else {
            return Err(ProvisionError::not_found(format!(
                "Volume {} has no access point to delete",
                request.volume_id
            )));
        };
        let file_system_id = volume_id.file_system_id.clone();

        let cloud = self.ctx.resolve_cloud(&request.secrets).await?;
        let _ap_guard = self
            .lock_access_point(&access_point_id, "on access point for delete")
            .await?;

        if self.ctx.settings.delete_access_point_root_dir {
            let present = self
                .purge_root_directory(&cloud, &file_system_id, &access_point_id)
                .await?;
            if !present {
                return Ok(());
            }
        }

        match cloud.client.delete_access_point(&access_point_id).await {
            Ok(()) => {}
            Err(CloudError::NotFound) => {
                info!("DeleteVolume: Access Point {} not found, returning success", access_point_id);
                return Ok(());
            }
            Err(e @ CloudError::AccessDenied) => return Err(ProvisionError::access_denied(&e)),
            Err(e) => {
                error!("Failed to delete access point {}: {}", access_point_id, e);
                return Err(ProvisionError::internal(format!(
                    "Failed to Delete volume {}: {}",
                    request.volume_id, e
                )));
            }
        }

        info!("Deleted access point volume {}", request.volume_id);
        self.ctx.event_bus.publish(ProvisioningEvent::VolumeDeleted {
            volume_id: request.volume_id.clone(),
            mode: ProvisioningMode::AccessPoint,
            deleted_at: Utc::now(),
        });
        Ok(())
    }
}
