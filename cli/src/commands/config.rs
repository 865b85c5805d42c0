// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;
use tracing::{debug, info};

use efs_provisioner_core::domain::provisioner_config::{ProvisionerConfig, ENV_CONFIG_PATH};
use efs_provisioner_core::domain::tag_parser::{parse_tag_pairs, parse_tags};

pub const MINIMAL_TEMPLATE: &str = include_str!("../../templates/config-minimal.yaml");
pub const EXAMPLES_TEMPLATE: &str = include_str!("../../templates/config-with-examples.yaml");

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path (default: ./efs-provisioner.yaml)
        #[arg(short, long, default_value = "./efs-provisioner.yaml")]
        output: PathBuf,

        /// Include examples and comments
        #[arg(long)]
        examples: bool,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths).await,
        ConfigCommand::Validate { file } => validate(file.or(config_override)).await,
        ConfigCommand::Generate { output, examples } => generate(output, examples).await,
    }
}

async fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ProvisionerConfig::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        if let Some(path) = &config_override {
            println!("  1. --config flag: {}", path.display());
        } else {
            println!("  1. --config flag: {}", "(not set)".dimmed());
        }
        println!(
            "  2. {}: {}",
            ENV_CONFIG_PATH,
            std::env::var(ENV_CONFIG_PATH)
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./efs-provisioner.yaml");
        println!("  4. ~/.efs-provisioner/config.yaml");
        println!("  5. /etc/efs-provisioner/config.yaml");
        println!();
    }

    println!("{}", "Current configuration:".bold());
    println!();
    println!("  Name: {}", config.metadata.name);
    println!();

    let spec = &config.spec;
    println!("{}", "Delete behavior:".bold());
    println!("  Purge access point root dir: {}", spec.delete_access_point_root_dir);
    println!("  Delete provisioned dir: {}", spec.delete_provisioned_dir);
    println!();

    println!("{}", "Provisioning:".bold());
    println!("  Lock timeout: {}s", spec.lock_timeout_seconds);
    println!("  Gid pool cap: {}", spec.gid_pool_cap);
    println!("  Scratch mounts: {}", spec.temp_mount_path_prefix.display());
    println!();

    println!("{}", "Tags:".bold());
    let tags = parse_tags(&spec.tags);
    if tags.is_empty() {
        println!("  {}", "(none)".dimmed());
    }
    let mut tags: Vec<_> = tags.into_iter().collect();
    tags.sort();
    for (key, value) in tags {
        println!("  {} = {}", key, value);
    }
    println!();

    println!("{}", "Logging:".bold());
    println!("  Level: {}", spec.logging.level);
    println!("  Format: {:?}", spec.logging.format);
    println!();

    Ok(())
}

async fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ProvisionerConfig::load_or_default(config_path)
        .context("Failed to load configuration")?;
    debug!(name = %config.metadata.name, "Loaded configuration");

    config
        .validate()
        .context("Configuration validation failed")?;

    // Malformed tags are skipped at runtime, so they only warn here.
    for result in parse_tag_pairs(&config.spec.tags) {
        if let Err(e) = result {
            println!("{}", format!("! {}", e).yellow());
        }
    }

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

async fn generate(output: PathBuf, with_examples: bool) -> Result<()> {
    let sample = if with_examples {
        EXAMPLES_TEMPLATE
    } else {
        MINIMAL_TEMPLATE
    };

    std::fs::write(&output, sample)
        .with_context(|| format!("Failed to write config to {:?}", output))?;
    info!(path = %output.display(), examples = with_examples, "Wrote sample configuration");

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_templates_are_valid() {
        for template in [MINIMAL_TEMPLATE, EXAMPLES_TEMPLATE] {
            let config = ProvisionerConfig::from_yaml_str(template).unwrap();
            config.validate().unwrap();
            assert!(parse_tag_pairs(&config.spec.tags).iter().all(|r| r.is_ok()));
        }
    }

    #[test]
    fn test_examples_template_tags() {
        let config = ProvisionerConfig::from_yaml_str(EXAMPLES_TEMPLATE).unwrap();
        let tags = parse_tags(&config.spec.tags);
        assert_eq!(tags["team"], "storage");
        assert_eq!(tags["cost center"], "cc 42");
        assert!(config.spec.delete_access_point_root_dir);
    }

    #[tokio::test]
    async fn test_generate_then_validate() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("efs-provisioner.yaml");

        generate(output.clone(), true).await.unwrap();
        validate(Some(output.clone())).await.unwrap();

        let loaded = ProvisionerConfig::from_yaml_file(&output).unwrap();
        assert_eq!(loaded.metadata.name, "efs-provisioner");
    }

    #[tokio::test]
    async fn test_validate_rejects_wrong_kind() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.yaml");
        std::fs::write(
            &path,
            MINIMAL_TEMPLATE.replace("kind: ProvisionerConfig", "kind: NodeConfig"),
        )
        .unwrap();

        assert!(validate(Some(path)).await.is_err());
    }
}
