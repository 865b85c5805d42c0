// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume Controller
//!
//! Entry point for the orchestrator-facing transport: routes create requests
//! by `provisioningMode` and delete requests by the shape of the volume id.

use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

use crate::application::access_point_provisioner::AccessPointProvisioner;
use crate::application::directory_provisioner::DirectoryProvisioner;
use crate::application::provisioner::{Provisioner, ProvisionerContext};
use crate::domain::error::{ProvisionError, ProvisionResult};
use crate::domain::volume::{
    keys, DeleteRequest, ProvisionRequest, ProvisioningMode, Volume, VolumeId,
};

pub struct VolumeController {
    provisioners: HashMap<ProvisioningMode, Arc<dyn Provisioner>>,
}

impl VolumeController {
    /// Controller with both built-in provisioners sharing `ctx`.
    pub fn new(ctx: ProvisionerContext) -> Self {
        Self::with_provisioners(vec![
            Arc::new(AccessPointProvisioner::new(ctx.clone())) as Arc<dyn Provisioner>,
            Arc::new(DirectoryProvisioner::new(ctx)) as Arc<dyn Provisioner>,
        ])
    }

    pub fn with_provisioners(provisioners: Vec<Arc<dyn Provisioner>>) -> Self {
        Self {
            provisioners: provisioners.into_iter().map(|p| (p.mode(), p)).collect(),
        }
    }

    fn provisioner(&self, mode: ProvisioningMode) -> ProvisionResult<&Arc<dyn Provisioner>> {
        self.provisioners.get(&mode).ok_or_else(|| {
            ProvisionError::invalid_argument(format!("Provisioning mode {} is not supported.", mode))
        })
    }

    pub async fn create_volume(&self, request: &ProvisionRequest) -> ProvisionResult<Volume> {
        info!("CreateVolume: called with name {}", request.name);

        let raw_mode = request
            .parameters
            .get(keys::PROVISIONING_MODE)
            .filter(|m| !m.is_empty())
            .ok_or_else(|| {
                ProvisionError::invalid_argument(format!(
                    "Missing {} parameter",
                    keys::PROVISIONING_MODE
                ))
            })?;
        let mode = ProvisioningMode::parse(raw_mode).ok_or_else(|| {
            ProvisionError::invalid_argument(format!(
                "Provisioning mode {} is not supported.",
                raw_mode
            ))
        })?;

        self.provisioner(mode)?.provision(request).await
    }

    pub async fn delete_volume(&self, request: &DeleteRequest) -> ProvisionResult<()> {
        info!("DeleteVolume: called with volume id {}", request.volume_id);
        if request.volume_id.is_empty() {
            return Err(ProvisionError::invalid_argument("Volume ID not provided"));
        }

        let mode = match VolumeId::parse(&request.volume_id) {
            Ok(id) if id.subpath.is_some() && id.access_point_id.is_none() => {
                ProvisioningMode::Directory
            }
            _ => ProvisioningMode::AccessPoint,
        };
        debug!("Routing delete of {} to {} provisioner", request.volume_id, mode);

        self.provisioner(mode)?.delete(request).await
    }

    /// Parse a volume id, reporting structural problems as NotFound.
    pub fn validate_volume_id(&self, volume_id: &str) -> ProvisionResult<VolumeId> {
        VolumeId::parse(volume_id)
            .map_err(|e| ProvisionError::not_found(format!("Volume {} not found: {}", volume_id, e)))
    }
}
