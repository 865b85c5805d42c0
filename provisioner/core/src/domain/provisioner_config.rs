// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Provisioner Configuration Types
//
// Defines the configuration schema for the provisioner process, including:
// - Kubernetes-style manifest format (apiVersion/kind/metadata/spec)
// - Operator tags applied to every access point
// - Root directory purge and directory-mode delete switches
// - Lock timeouts, gid pool cap and scratch mount location
// - Logging settings

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::gid_allocator::DEFAULT_GID_POOL_CAP;

pub const API_VERSION: &str = "efs-provisioner/v1";
pub const KIND: &str = "ProvisionerConfig";

pub const ENV_CONFIG_PATH: &str = "EFS_PROVISIONER_CONFIG_PATH";
pub const ENV_DELETE_ACCESS_POINT_ROOT_DIR: &str = "EFS_PROVISIONER_DELETE_ACCESS_POINT_ROOT_DIR";
pub const ENV_DELETE_PROVISIONED_DIR: &str = "EFS_PROVISIONER_DELETE_PROVISIONED_DIR";
pub const ENV_TAGS: &str = "EFS_PROVISIONER_TAGS";

/// Top-level Kubernetes-style provisioner configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerConfig {
    /// API version (must be "efs-provisioner/v1")
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    /// Resource kind (must be "ProvisionerConfig")
    pub kind: String,

    pub metadata: ConfigMetadata,

    #[serde(default)]
    pub spec: ProvisionerSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfigMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProvisionerSpec {
    /// Extra tags for every access point, in `key:value key2:'v 2'` form
    #[serde(default)]
    pub tags: String,

    /// Purge the access point's root directory before deleting the access point
    #[serde(default)]
    pub delete_access_point_root_dir: bool,

    /// Remove the directory on Delete in efs-dir mode
    #[serde(default)]
    pub delete_provisioned_dir: bool,

    /// Bound on waiting for a per-access-point lock
    #[serde(default = "default_lock_timeout_seconds")]
    pub lock_timeout_seconds: u64,

    /// Maximum number of gids scanned per allocation
    #[serde(default = "default_gid_pool_cap")]
    pub gid_pool_cap: i64,

    /// Parent directory for scratch mounts
    #[serde(default = "default_temp_mount_path_prefix")]
    pub temp_mount_path_prefix: PathBuf,

    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,

    #[serde(default)]
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

fn default_lock_timeout_seconds() -> u64 {
    3
}

fn default_gid_pool_cap() -> i64 {
    DEFAULT_GID_POOL_CAP
}

fn default_temp_mount_path_prefix() -> PathBuf {
    PathBuf::from("/var/lib/csi/pv")
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: LogFormat::default(),
        }
    }
}

impl Default for ProvisionerSpec {
    fn default() -> Self {
        Self {
            tags: String::new(),
            delete_access_point_root_dir: false,
            delete_provisioned_dir: false,
            lock_timeout_seconds: default_lock_timeout_seconds(),
            gid_pool_cap: default_gid_pool_cap(),
            temp_mount_path_prefix: default_temp_mount_path_prefix(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for ProvisionerConfig {
    fn default() -> Self {
        let hostname = hostname::get()
            .ok()
            .and_then(|h| h.into_string().ok())
            .unwrap_or_else(|| "efs-provisioner".to_string());

        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ConfigMetadata {
                name: hostname,
                labels: None,
            },
            spec: ProvisionerSpec::default(),
        }
    }
}

impl ProvisionerSpec {
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_secs(self.lock_timeout_seconds)
    }
}

impl ProvisionerConfig {
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_yaml_file(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    /// Discover configuration file using precedence order
    /// 1. EFS_PROVISIONER_CONFIG_PATH environment variable
    /// 2. ./efs-provisioner.yaml (working directory)
    /// 3. ~/.efs-provisioner/config.yaml (user home)
    /// 4. /etc/efs-provisioner/config.yaml (system)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var(ENV_CONFIG_PATH) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./efs-provisioner.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        if let Some(home) = dirs::home_dir() {
            let user_config = home.join(".efs-provisioner").join("config.yaml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        let system_config = PathBuf::from("/etc/efs-provisioner/config.yaml");
        if system_config.exists() {
            return Some(system_config);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit CLI path fails if missing/invalid
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path).map_err(|e| {
                anyhow::anyhow!("Failed to load config at {:?}: {}", path, e)
            })?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found in standard locations. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides_from(|key| std::env::var(key).ok());
    }

    /// Apply overrides from an arbitrary key lookup.
    pub fn apply_overrides_from<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(val) = lookup(ENV_DELETE_ACCESS_POINT_ROOT_DIR) {
            if let Some(flag) = parse_bool_override(ENV_DELETE_ACCESS_POINT_ROOT_DIR, &val) {
                self.spec.delete_access_point_root_dir = flag;
            }
        }

        if let Some(val) = lookup(ENV_DELETE_PROVISIONED_DIR) {
            if let Some(flag) = parse_bool_override(ENV_DELETE_PROVISIONED_DIR, &val) {
                self.spec.delete_provisioned_dir = flag;
            }
        }

        if let Some(val) = lookup(ENV_TAGS) {
            tracing::info!("Environment override: {}={}", ENV_TAGS, val);
            self.spec.tags = val;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.gid_pool_cap <= 0 {
            anyhow::bail!("spec.gid_pool_cap must be greater than 0");
        }

        if self.spec.lock_timeout_seconds == 0 {
            anyhow::bail!("spec.lock_timeout_seconds must be greater than 0");
        }

        if !self.spec.temp_mount_path_prefix.is_absolute() {
            anyhow::bail!(
                "spec.temp_mount_path_prefix must be absolute, got {:?}",
                self.spec.temp_mount_path_prefix
            );
        }

        Ok(())
    }
}

fn parse_bool_override(key: &str, val: &str) -> Option<bool> {
    match val.to_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => {
            tracing::info!("Environment override: {}=true", key);
            Some(true)
        }
        "false" | "0" | "no" | "off" => {
            tracing::info!("Environment override: {}=false", key);
            Some(false)
        }
        _ => {
            tracing::warn!(
                "Invalid value for {}: '{}'. Expected true/false. Ignoring.",
                key,
                val
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_manifest() {
        let config = ProvisionerConfig::default();
        assert_eq!(config.api_version, "efs-provisioner/v1");
        assert_eq!(config.kind, "ProvisionerConfig");
        assert!(!config.metadata.name.is_empty());
        assert!(!config.spec.delete_access_point_root_dir);
        assert_eq!(config.spec.lock_timeout(), Duration::from_secs(3));
        assert_eq!(config.spec.gid_pool_cap, 1000);
        assert_eq!(config.spec.temp_mount_path_prefix, PathBuf::from("/var/lib/csi/pv"));
    }

    #[test]
    fn test_minimal_yaml_fills_defaults() {
        let yaml = r#"
apiVersion: efs-provisioner/v1
kind: ProvisionerConfig
metadata:
  name: controller-0
spec:
  delete_access_point_root_dir: true
  tags: "team:storage env:'blue green'"
  logging:
    format: json
"#;
        let config = ProvisionerConfig::from_yaml_str(yaml).unwrap();
        assert_eq!(config.metadata.name, "controller-0");
        assert!(config.spec.delete_access_point_root_dir);
        assert!(!config.spec.delete_provisioned_dir);
        assert_eq!(config.spec.lock_timeout_seconds, 3);
        assert_eq!(config.spec.logging.level, "info");
        assert_eq!(config.spec.logging.format, LogFormat::Json);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_yaml_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");

        let mut config = ProvisionerConfig::default();
        config.metadata.name = "roundtrip".to_string();
        config.spec.gid_pool_cap = 250;
        config.to_yaml_file(&path).unwrap();

        let loaded = ProvisionerConfig::load_or_default(Some(path)).unwrap();
        assert_eq!(loaded.metadata.name, "roundtrip");
        assert_eq!(loaded.spec.gid_pool_cap, 250);
    }

    #[test]
    fn test_explicit_missing_path_fails() {
        let result = ProvisionerConfig::load_or_default(Some(PathBuf::from(
            "/nonexistent/efs-provisioner.yaml",
        )));
        assert!(result.is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = ProvisionerConfig::default();
        let env: HashMap<&str, &str> = HashMap::from([
            (ENV_DELETE_ACCESS_POINT_ROOT_DIR, "yes"),
            (ENV_DELETE_PROVISIONED_DIR, "maybe"),
            (ENV_TAGS, "owner:ops"),
        ]);
        config.apply_overrides_from(|key| env.get(key).map(|v| v.to_string()));

        assert!(config.spec.delete_access_point_root_dir);
        assert!(!config.spec.delete_provisioned_dir);
        assert_eq!(config.spec.tags, "owner:ops");
    }

    #[test]
    fn test_validation() {
        let mut config = ProvisionerConfig::default();
        assert!(config.validate().is_ok());

        config.api_version = "wrong/v1".to_string();
        assert!(config.validate().is_err());
        config.api_version = API_VERSION.to_string();

        config.kind = "WrongKind".to_string();
        assert!(config.validate().is_err());
        config.kind = KIND.to_string();

        config.metadata.name = "".to_string();
        assert!(config.validate().is_err());
        config.metadata.name = "node".to_string();

        config.spec.gid_pool_cap = 0;
        assert!(config.validate().is_err());
        config.spec.gid_pool_cap = 10;

        config.spec.lock_timeout_seconds = 0;
        assert!(config.validate().is_err());
        config.spec.lock_timeout_seconds = 1;

        config.spec.temp_mount_path_prefix = PathBuf::from("relative/dir");
        assert!(config.validate().is_err());
    }
}
