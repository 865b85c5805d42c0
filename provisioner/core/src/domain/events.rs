// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::volume::ProvisioningMode;

/// Volume lifecycle events emitted by the provisioners.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProvisioningEvent {
    VolumeProvisioned {
        volume_id: String,
        mode: ProvisioningMode,
        file_system_id: String,
        root_directory: String,
        uid: Option<i64>,
        gid: Option<i64>,
        provisioned_at: DateTime<Utc>,
    },
    AccessPointReused {
        volume_id: String,
        access_point_id: String,
        client_token: String,
        reused_at: DateTime<Utc>,
    },
    AccessPointRootDirPurged {
        access_point_id: String,
        root_directory: String,
        purged_at: DateTime<Utc>,
    },
    VolumeDeleted {
        volume_id: String,
        mode: ProvisioningMode,
        deleted_at: DateTime<Utc>,
    },
}

impl ProvisioningEvent {
    pub fn volume_id(&self) -> Option<&str> {
        match self {
            Self::VolumeProvisioned { volume_id, .. }
            | Self::AccessPointReused { volume_id, .. }
            | Self::VolumeDeleted { volume_id, .. } => Some(volume_id),
            Self::AccessPointRootDirPurged { .. } => None,
        }
    }
}
