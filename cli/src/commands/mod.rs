// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the provisioner CLI

pub mod config;
pub mod plan;
pub mod volume_id;

pub use self::config::ConfigCommand;
pub use self::plan::PlanArgs;
