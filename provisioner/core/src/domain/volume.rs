// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Volume value objects
//!
//! Request/response shapes exchanged with the orchestrator and the composite
//! volume id, which is the only durable handle a provisioned volume has.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;
use thiserror::Error;

// ============================================================================
// Request Vocabulary
// ============================================================================

/// Parameter and secret keys understood by the provisioners.
pub mod keys {
    pub const PROVISIONING_MODE: &str = "provisioningMode";
    pub const FILE_SYSTEM_ID: &str = "fileSystemId";
    pub const UID: &str = "uid";
    pub const GID: &str = "gid";
    pub const GID_MIN: &str = "gidRangeStart";
    pub const GID_MAX: &str = "gidRangeEnd";
    pub const DIRECTORY_PERMS: &str = "directoryPerms";
    pub const BASE_PATH: &str = "basePath";
    pub const SUB_PATH_PATTERN: &str = "subPathPattern";
    pub const ENSURE_UNIQUE_DIRECTORY: &str = "ensureUniqueDirectory";
    pub const AZ_NAME: &str = "az";
    pub const REUSE_ACCESS_POINT: &str = "reuseAccessPoint";

    /// Prefix of keys injected by the orchestrator rather than the caller
    pub const ORCHESTRATOR_PREFIX: &str = "csi.storage.k8s.io/";
    pub const PVC_NAME: &str = "csi.storage.k8s.io/pvc/name";
    pub const PVC_NAMESPACE: &str = "csi.storage.k8s.io/pvc/namespace";
    pub const PV_NAME: &str = "csi.storage.k8s.io/pv/name";

    pub const ROLE_ARN: &str = "awsRoleArn";
    pub const CROSS_ACCOUNT: &str = "crossaccount";
    pub const MOUNT_TARGET_IP: &str = "mounttargetip";

    pub const KNOWN_PARAMETERS: &[&str] = &[
        PROVISIONING_MODE,
        FILE_SYSTEM_ID,
        UID,
        GID,
        GID_MIN,
        GID_MAX,
        DIRECTORY_PERMS,
        BASE_PATH,
        SUB_PATH_PATTERN,
        ENSURE_UNIQUE_DIRECTORY,
        AZ_NAME,
        REUSE_ACCESS_POINT,
    ];

    pub fn is_known_parameter(key: &str) -> bool {
        KNOWN_PARAMETERS.contains(&key) || key.starts_with(ORCHESTRATOR_PREFIX)
    }
}

/// Supported provisioning modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProvisioningMode {
    /// One access point per volume
    #[serde(rename = "efs-ap")]
    AccessPoint,
    /// One plain directory per volume (legacy)
    #[serde(rename = "efs-dir")]
    Directory,
}

impl ProvisioningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AccessPoint => "efs-ap",
            Self::Directory => "efs-dir",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "efs-ap" => Some(Self::AccessPoint),
            "efs-dir" => Some(Self::Directory),
            _ => None,
        }
    }
}

impl fmt::Display for ProvisioningMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inbound create request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionRequest {
    pub name: String,
    /// Required bytes declared by the caller. Propagated, never enforced.
    pub capacity_bytes: i64,
    pub parameters: HashMap<String, String>,
    pub secrets: HashMap<String, String>,
}

impl ProvisionRequest {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Default::default()
        }
    }

    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }

    pub fn with_capacity(mut self, capacity_bytes: i64) -> Self {
        self.capacity_bytes = capacity_bytes;
        self
    }
}

/// Inbound delete request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    pub volume_id: String,
    pub secrets: HashMap<String, String>,
}

impl DeleteRequest {
    pub fn new(volume_id: impl Into<String>) -> Self {
        Self {
            volume_id: volume_id.into(),
            secrets: HashMap::new(),
        }
    }

    pub fn with_secret(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }
}

/// Provisioned volume returned to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Volume {
    pub volume_id: String,
    pub capacity_bytes: i64,
    /// Connectivity hints (`crossaccount`, `mounttargetip`)
    pub volume_context: HashMap<String, String>,
}

// ============================================================================
// Composite Volume Id
// ============================================================================

static FILE_SYSTEM_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^fs-[0-9a-f]+$").expect("file system id pattern is valid"));
static ACCESS_POINT_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^fsap-[0-9a-f]+$").expect("access point id pattern is valid"));

pub fn is_valid_file_system_id(id: &str) -> bool {
    FILE_SYSTEM_ID_RE.is_match(id)
}

pub fn is_valid_access_point_id(id: &str) -> bool {
    ACCESS_POINT_ID_RE.is_match(id)
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum VolumeIdError {
    #[error("volume ID is empty")]
    Empty,

    #[error("volume ID '{0}' is invalid: Expected at most three fields separated by ':'")]
    TooManyFields(String),

    #[error("volume ID '{0}' is invalid: Expected a file system ID of the form 'fs-...'")]
    InvalidFileSystemId(String),

    #[error("volume ID '{0}' is invalid: Expected an access point ID of the form 'fsap-...'")]
    InvalidAccessPointId(String),
}

impl VolumeIdError {
    /// Failures of the fixed prefix conventions, as opposed to shape failures.
    pub fn is_prefix_violation(&self) -> bool {
        matches!(
            self,
            Self::InvalidFileSystemId(_) | Self::InvalidAccessPointId(_)
        )
    }
}

/// `<fsId>::<apId>`, `<fsId>:<subpath>`, `<fsId>:<subpath>:<apId>` or `<fsId>`.
///
/// Empty fields parse as absent, so `fs-1:` and `fs-1::` format back as `fs-1`.
/// Ids produced by the provisioners never carry empty fields and format unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VolumeId {
    pub file_system_id: String,
    pub subpath: Option<String>,
    pub access_point_id: Option<String>,
}

impl VolumeId {
    pub fn access_point(file_system_id: impl Into<String>, access_point_id: impl Into<String>) -> Self {
        Self {
            file_system_id: file_system_id.into(),
            subpath: None,
            access_point_id: Some(access_point_id.into()),
        }
    }

    pub fn directory(file_system_id: impl Into<String>, subpath: impl Into<String>) -> Self {
        Self {
            file_system_id: file_system_id.into(),
            subpath: Some(subpath.into()),
            access_point_id: None,
        }
    }

    pub fn parse(raw: &str) -> Result<Self, VolumeIdError> {
        if raw.is_empty() {
            return Err(VolumeIdError::Empty);
        }

        let tokens: Vec<&str> = raw.split(':').collect();
        if tokens.len() > 3 {
            return Err(VolumeIdError::TooManyFields(raw.to_string()));
        }

        let file_system_id = tokens[0];
        if !is_valid_file_system_id(file_system_id) {
            return Err(VolumeIdError::InvalidFileSystemId(raw.to_string()));
        }

        let subpath = tokens
            .get(1)
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string());

        let access_point_id = match tokens.get(2).filter(|s| !s.is_empty()) {
            Some(id) if !is_valid_access_point_id(id) => {
                return Err(VolumeIdError::InvalidAccessPointId(raw.to_string()));
            }
            Some(id) => Some(id.to_string()),
            None => None,
        };

        Ok(Self {
            file_system_id: file_system_id.to_string(),
            subpath,
            access_point_id,
        })
    }
}

impl fmt::Display for VolumeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.subpath, &self.access_point_id) {
            (None, None) => write!(f, "{}", self.file_system_id),
            (Some(sub), None) => write!(f, "{}:{}", self.file_system_id, sub),
            (None, Some(ap)) => write!(f, "{}::{}", self.file_system_id, ap),
            (Some(sub), Some(ap)) => write!(f, "{}:{}:{}", self.file_system_id, sub, ap),
        }
    }
}

impl std::str::FromStr for VolumeId {
    type Err = VolumeIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}
