// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! `volume-id` command: decode a composite volume id

use anyhow::Result;
use colored::Colorize;
use tracing::debug;

use efs_provisioner_core::{ProvisioningMode, VolumeController, VolumeId};

/// Decode `raw` with the same rules the controller applies on delete.
pub fn inspect(raw: &str) -> Result<(VolumeId, ProvisioningMode)> {
    let controller = VolumeController::with_provisioners(Vec::new());
    let volume_id = controller.validate_volume_id(raw)?;
    let mode = match (&volume_id.subpath, &volume_id.access_point_id) {
        (Some(_), None) => ProvisioningMode::Directory,
        _ => ProvisioningMode::AccessPoint,
    };
    Ok((volume_id, mode))
}

pub fn execute(raw: &str) -> Result<()> {
    let (volume_id, mode) = inspect(raw)?;
    debug!(volume_id = %raw, %mode, "Decoded volume id");

    println!("{}", "Volume ID:".bold());
    println!("  File system: {}", volume_id.file_system_id);
    println!(
        "  Subpath: {}",
        volume_id.subpath.as_deref().unwrap_or("(none)")
    );
    println!(
        "  Access point: {}",
        volume_id.access_point_id.as_deref().unwrap_or("(none)")
    );
    println!("  Delete handled by: {}", mode);

    if volume_id.to_string() != raw {
        println!("  Canonical form: {}", volume_id.to_string().cyan());
    }
    Ok(())
}
