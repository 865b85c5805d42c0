// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `plan` command: validate a provision request offline
//!
//! Runs the same parameter validation and path resolution as a real
//! provision, then reports what would be created. Nothing remote is called,
//! so gid allocation is reported as the range that would be scanned.

use anyhow::{anyhow, bail, Context, Result};
use clap::Args;
use colored::Colorize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

use efs_provisioner_core::application::access_point_provisioner::AccessPointParameters;
use efs_provisioner_core::application::directory_provisioner::parse_directory_perms;
use efs_provisioner_core::application::provisioner::{
    required_file_system_id, validate_parameter_keys,
};
use efs_provisioner_core::domain::path_builder::{clean_path, PathBuilder};
use efs_provisioner_core::domain::provisioner_config::ProvisionerConfig;
use efs_provisioner_core::domain::volume::keys;
use efs_provisioner_core::ProvisioningMode;

#[derive(Args, Debug)]
pub struct PlanArgs {
    /// Volume name of the request
    #[arg(long)]
    pub name: String,

    /// Request parameter as KEY=VALUE (repeatable)
    #[arg(short, long = "param", value_name = "KEY=VALUE", value_parser = parse_key_val)]
    pub params: Vec<(String, String)>,
}

fn parse_key_val(raw: &str) -> Result<(String, String), String> {
    raw.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", raw))
}

/// Identity an access point would be created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityPlan {
    Pinned { uid: i64, gid: i64 },
    Allocated { uid: Option<i64>, gid: Option<i64>, scan_from: i64, scan_to: i64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plan {
    AccessPoint {
        file_system_id: String,
        root_directory: String,
        identity: IdentityPlan,
        client_token: String,
    },
    Directory {
        file_system_id: String,
        directory: String,
        perms: u32,
    },
}

/// Resolve a request into a [`Plan`] without side effects.
pub fn plan_request(
    name: &str,
    parameters: &HashMap<String, String>,
    config: &ProvisionerConfig,
) -> Result<Plan> {
    if name.is_empty() {
        bail!("Volume name not provided");
    }

    let mode = parameters
        .get(keys::PROVISIONING_MODE)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| anyhow!("Missing {} parameter", keys::PROVISIONING_MODE))?;
    let mode = ProvisioningMode::parse(mode)
        .ok_or_else(|| anyhow!("Provisioning mode {} is not supported", mode))?;

    match mode {
        ProvisioningMode::AccessPoint => {
            let params = AccessPointParameters::parse(parameters)?;
            let client_token = params.client_token(name)?;
            let root_directory = PathBuilder::new().resolve(&params.path_request(name))?;

            let identity = if params.needs_allocation() {
                let range = params.gid_range;
                IdentityPlan::Allocated {
                    uid: params.uid,
                    gid: params.gid,
                    scan_from: range.max(),
                    scan_to: range.effective_min(config.spec.gid_pool_cap) + 1,
                }
            } else {
                IdentityPlan::Pinned {
                    uid: params.uid.unwrap_or_default(),
                    gid: params.gid.unwrap_or_default(),
                }
            };

            Ok(Plan::AccessPoint {
                file_system_id: params.file_system_id,
                root_directory,
                identity,
                client_token,
            })
        }
        ProvisioningMode::Directory => {
            validate_parameter_keys(parameters)?;
            let file_system_id = required_file_system_id(parameters)?;
            let base_path = parameters.get(keys::BASE_PATH).map(String::as_str).unwrap_or("");
            Ok(Plan::Directory {
                file_system_id,
                directory: clean_path(&format!("/{}/{}", base_path, name)),
                perms: parse_directory_perms(
                    parameters.get(keys::DIRECTORY_PERMS).map(String::as_str),
                ),
            })
        }
    }
}

pub fn execute(args: PlanArgs, config_override: Option<PathBuf>) -> Result<()> {
    let config = ProvisionerConfig::load_or_default(config_override)
        .context("Failed to load configuration")?;
    let parameters: HashMap<String, String> = args.params.into_iter().collect();

    debug!(name = %args.name, parameters = parameters.len(), "Planning provision request");
    let plan = plan_request(&args.name, &parameters, &config).context("Request rejected")?;
    debug!(?plan, "Request resolved");

    println!("{}", "✓ Request is valid".green());
    println!();
    match plan {
        Plan::AccessPoint {
            file_system_id,
            root_directory,
            identity,
            client_token,
        } => {
            println!("{}", "Access point:".bold());
            println!("  File system: {}", file_system_id);
            println!("  Root directory: {}", root_directory);
            match identity {
                IdentityPlan::Pinned { uid, gid } => {
                    println!("  Identity: uid {} gid {} (pinned)", uid, gid);
                }
                IdentityPlan::Allocated { uid, gid, scan_from, scan_to } => {
                    println!(
                        "  Identity: first free gid scanning {} down to {}",
                        scan_from, scan_to
                    );
                    if let Some(uid) = uid {
                        println!("  Uid: {} (pinned)", uid);
                    }
                    if let Some(gid) = gid {
                        println!("  Gid: {} (pinned)", gid);
                    }
                }
            }
            println!("  Client token: {}", client_token);
        }
        Plan::Directory {
            file_system_id,
            directory,
            perms,
        } => {
            println!("{}", "Directory:".bold());
            println!("  File system: {}", file_system_id);
            println!("  Path: {}", directory);
            println!("  Permissions: {:o}", perms);
        }
    }
    Ok(())
}
