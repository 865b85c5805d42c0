// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Provisioner Service Trait and shared plumbing
//!
//! Both provisioning modes share the same collaborators, the same
//! cross-account client resolution and the same connectivity-hint logic.
//! Those live here; the mode-specific flows live in
//! `access_point_provisioner` and `directory_provisioner`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, warn};

use crate::application::lock_manager::LockManager;
use crate::domain::cloud::{ControlPlaneFactory, StorageControlPlane};
use crate::domain::error::{ProvisionError, ProvisionResult};
use crate::domain::gid_allocator::GidAllocator;
use crate::domain::host::{Mounter, OsClient};
use crate::domain::path_builder::PathBuilder;
use crate::domain::provisioner_config::ProvisionerSpec;
use crate::domain::tag_parser::parse_tags;
use crate::domain::volume::{keys, DeleteRequest, ProvisionRequest, ProvisioningMode, Volume};
use crate::infrastructure::event_bus::EventBus;

/// Tag applied to every access point, whatever the operator configures.
pub const DEFAULT_TAG_KEY: &str = "efs.csi.aws.com/cluster";
pub const DEFAULT_TAG_VALUE: &str = "true";

/// Filesystem type handed to the mount helper.
pub const EFS_FS_TYPE: &str = "efs";

/// Options every scratch mount of a filesystem root starts from.
pub const BASE_MOUNT_OPTIONS: [&str; 2] = ["tls", "iam"];

// ============================================================================
// Service Trait
// ============================================================================

#[async_trait]
pub trait Provisioner: Send + Sync {
    fn mode(&self) -> ProvisioningMode;

    async fn provision(&self, request: &ProvisionRequest) -> ProvisionResult<Volume>;

    async fn delete(&self, request: &DeleteRequest) -> ProvisionResult<()>;
}

// ============================================================================
// Shared Collaborators
// ============================================================================

/// Everything a provisioner needs, shared between modes.
#[derive(Clone)]
pub struct ProvisionerContext {
    pub cloud: Arc<dyn StorageControlPlane>,
    pub cloud_factory: Arc<dyn ControlPlaneFactory>,
    pub mounter: Arc<dyn Mounter>,
    pub os_client: Arc<dyn OsClient>,
    pub lock_manager: LockManager,
    pub event_bus: EventBus,
    pub gid_allocator: GidAllocator,
    pub path_builder: PathBuilder,
    pub settings: ProvisionerSpec,
    /// Operator tags parsed once from `settings.tags`
    pub tags: HashMap<String, String>,
}

impl ProvisionerContext {
    pub fn new(
        cloud: Arc<dyn StorageControlPlane>,
        cloud_factory: Arc<dyn ControlPlaneFactory>,
        mounter: Arc<dyn Mounter>,
        os_client: Arc<dyn OsClient>,
        settings: ProvisionerSpec,
    ) -> Self {
        let tags = parse_tags(&settings.tags);
        Self {
            cloud,
            cloud_factory,
            mounter,
            os_client,
            lock_manager: LockManager::new(),
            event_bus: EventBus::with_default_capacity(),
            gid_allocator: GidAllocator::with_pool_cap(settings.gid_pool_cap),
            path_builder: PathBuilder::new(),
            settings,
            tags,
        }
    }

    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = event_bus;
        self
    }

    pub fn with_lock_manager(mut self, lock_manager: LockManager) -> Self {
        self.lock_manager = lock_manager;
        self
    }

    /// Default tag plus operator tags. Operator tags may not override the default.
    pub fn access_point_tags(&self) -> HashMap<String, String> {
        let mut tags = self.tags.clone();
        tags.insert(DEFAULT_TAG_KEY.to_string(), DEFAULT_TAG_VALUE.to_string());
        tags
    }

    /// Pick the control plane client for a request.
    ///
    /// A role reference in the secrets selects a role-scoped client; failing
    /// to build it is a credential problem, not a service fault.
    pub async fn resolve_cloud(
        &self,
        secrets: &HashMap<String, String>,
    ) -> ProvisionResult<ResolvedCloud> {
        let Some(role_arn) = secrets.get(keys::ROLE_ARN) else {
            return Ok(ResolvedCloud {
                client: Arc::clone(&self.cloud),
                role_arn: None,
                cross_account_dns: false,
            });
        };

        let cross_account_dns = match secrets.get(keys::CROSS_ACCOUNT) {
            Some(value) => parse_bool(value).ok_or_else(|| {
                ProvisionError::invalid_argument(format!(
                    "Failed to parse invalid {}: {}",
                    keys::CROSS_ACCOUNT,
                    value
                ))
            })?,
            None => false,
        };

        let client = self.cloud_factory.with_role(role_arn).await.map_err(|e| {
            ProvisionError::unauthenticated(format!(
                "Unable to initialize aws cloud with role {}: {}",
                role_arn, e
            ))
        })?;
        debug!("Using cross-account client for role {}", role_arn);

        Ok(ResolvedCloud {
            client,
            role_arn: Some(role_arn.clone()),
            cross_account_dns,
        })
    }
}

// ============================================================================
// Cross-Account Connectivity
// ============================================================================

/// Control plane client chosen for one request.
#[derive(Clone)]
pub struct ResolvedCloud {
    pub client: Arc<dyn StorageControlPlane>,
    pub role_arn: Option<String>,
    pub cross_account_dns: bool,
}

/// Mount options and volume context derived from cross-account settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConnectivityHints {
    pub mount_options: Vec<String>,
    pub volume_context: HashMap<String, String>,
}

impl ConnectivityHints {
    /// Options for mounting the filesystem root: the base set followed by the hints.
    pub fn scratch_mount_options(&self) -> Vec<String> {
        BASE_MOUNT_OPTIONS
            .iter()
            .map(|option| option.to_string())
            .chain(self.mount_options.iter().cloned())
            .collect()
    }
}

impl ResolvedCloud {
    pub fn is_cross_account(&self) -> bool {
        self.role_arn.is_some()
    }

    /// Hints for reaching `file_system_id` from another account.
    ///
    /// Same-account requests get no hints. A failed mount target lookup only
    /// costs the hint, never the request.
    pub async fn connectivity_hints(&self, file_system_id: &str, az_name: &str) -> ConnectivityHints {
        let mut hints = ConnectivityHints::default();
        if !self.is_cross_account() {
            return hints;
        }

        if self.cross_account_dns {
            hints
                .volume_context
                .insert(keys::CROSS_ACCOUNT.to_string(), "true".to_string());
            hints.mount_options.push(keys::CROSS_ACCOUNT.to_string());
            return hints;
        }

        match self.client.describe_mount_targets(file_system_id, az_name).await {
            Ok(mount_target) => {
                hints
                    .volume_context
                    .insert(keys::MOUNT_TARGET_IP.to_string(), mount_target.ip_address.clone());
                hints
                    .mount_options
                    .push(format!("{}={}", keys::MOUNT_TARGET_IP, mount_target.ip_address));
            }
            Err(e) => {
                warn!(
                    "Failed to describe mount targets for file system {}. Skip using `{}` mount option: {}",
                    file_system_id,
                    keys::MOUNT_TARGET_IP,
                    e
                );
            }
        }
        hints
    }
}

// ============================================================================
// Parameter Helpers
// ============================================================================

/// Boolean parsing with the accepted spellings `1 t T TRUE true True` and their negatives.
pub fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}

/// Reject any parameter key outside the provisioning vocabulary.
pub fn validate_parameter_keys(parameters: &HashMap<String, String>) -> ProvisionResult<()> {
    let mut unknown: Vec<&String> = parameters
        .keys()
        .filter(|key| !keys::is_known_parameter(key))
        .collect();
    unknown.sort();

    match unknown.first() {
        Some(key) => Err(ProvisionError::invalid_argument(format!(
            "Invalid parameter key {} for CreateVolume",
            key
        ))),
        None => Ok(()),
    }
}

/// Required, non-blank `fileSystemId` parameter.
pub fn required_file_system_id(parameters: &HashMap<String, String>) -> ProvisionResult<String> {
    parameters
        .get(keys::FILE_SYSTEM_ID)
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .ok_or_else(|| {
            ProvisionError::invalid_argument(format!("Missing {} parameter", keys::FILE_SYSTEM_ID))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::error::ErrorKind;

    #[test]
    fn test_parse_bool_spellings() {
        for v in ["1", "t", "T", "TRUE", "true", "True"] {
            assert_eq!(parse_bool(v), Some(true), "{}", v);
        }
        for v in ["0", "f", "F", "FALSE", "false", "False"] {
            assert_eq!(parse_bool(v), Some(false), "{}", v);
        }
        assert_eq!(parse_bool("yes"), None);
        assert_eq!(parse_bool(""), None);
    }

    #[test]
    fn test_validate_parameter_keys() {
        let ok = HashMap::from([
            ("fileSystemId".to_string(), "fs-1".to_string()),
            ("csi.storage.k8s.io/pvc/name".to_string(), "claim".to_string()),
        ]);
        assert!(validate_parameter_keys(&ok).is_ok());

        let bad = HashMap::from([("foo".to_string(), "bar".to_string())]);
        let err = validate_parameter_keys(&bad).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        assert!(err.message.contains("foo"));
    }

    #[test]
    fn test_required_file_system_id() {
        let blank = HashMap::from([("fileSystemId".to_string(), "   ".to_string())]);
        assert_eq!(
            required_file_system_id(&blank).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
        assert!(required_file_system_id(&HashMap::new()).is_err());

        let padded = HashMap::from([("fileSystemId".to_string(), " fs-1 ".to_string())]);
        assert_eq!(required_file_system_id(&padded).unwrap(), "fs-1");
    }

    #[test]
    fn test_scratch_mount_options() {
        assert_eq!(ConnectivityHints::default().scratch_mount_options(), vec!["tls", "iam"]);

        let hints = ConnectivityHints {
            mount_options: vec!["mounttargetip=10.0.0.1".to_string()],
            volume_context: HashMap::new(),
        };
        assert_eq!(
            hints.scratch_mount_options(),
            vec!["tls", "iam", "mounttargetip=10.0.0.1"]
        );
    }
}
