// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # EFS Provisioner CLI
//!
//! The `efs-provisioner` binary manages the provisioner configuration and
//! inspects provisioning requests offline, without contacting the storage
//! control plane.
//!
//! ## Commands
//!
//! - `efs-provisioner config show|validate|generate` - Configuration management
//! - `efs-provisioner volume-id <ID>` - Decode a composite volume id
//! - `efs-provisioner plan --name <N> --param k=v` - Dry-run a provision request

use anyhow::Result;
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::path::PathBuf;

use efs_provisioner::commands::{self, ConfigCommand, PlanArgs};
use efs_provisioner::logging::init_logging;
use efs_provisioner_core::domain::provisioner_config::ProvisionerConfig;

/// EFS Provisioner - identity-isolated volumes on shared filesystems
#[derive(Parser)]
#[command(name = "efs-provisioner")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(short, long, global = true, env = "EFS_PROVISIONER_CONFIG_PATH", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error); defaults to the configured level
    #[arg(long, global = true, env = "EFS_PROVISIONER_LOG_LEVEL")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },

    /// Decode a composite volume id
    #[command(name = "volume-id")]
    VolumeId {
        #[arg(value_name = "ID")]
        volume_id: String,
    },

    /// Validate a provision request and show what it would create
    #[command(name = "plan")]
    Plan {
        #[command(flatten)]
        args: PlanArgs,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // The logging section of the config only applies when it loads cleanly;
    // load errors are reported by the command itself.
    let logging = ProvisionerConfig::load_or_default(cli.config.clone())
        .map(|config| config.spec.logging)
        .unwrap_or_default();
    let level = cli.log_level.as_deref().unwrap_or(&logging.level);
    init_logging(level, logging.format)?;

    match cli.command {
        Some(Commands::Config { command }) => {
            commands::config::handle_command(command, cli.config).await
        }
        Some(Commands::VolumeId { volume_id }) => commands::volume_id::execute(&volume_id),
        Some(Commands::Plan { args }) => commands::plan::execute(args, cli.config),
        None => {
            eprintln!("{}", "No command specified. Use --help for usage.".yellow());
            std::process::exit(1);
        }
    }
}
