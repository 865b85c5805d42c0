// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Volume provisioning engine for shared network filesystems.
//!
//! Turns provision requests into identity-isolated access points (or plain
//! directories in legacy mode) and reverses them on delete.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Domain services, provisioning coordinators and their adapters

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::controller::VolumeController;
pub use application::lock_manager::{LockError, LockGuard, LockManager};
pub use application::provisioner::{Provisioner, ProvisionerContext};
pub use domain::error::{ErrorKind, ProvisionError, ProvisionResult};
pub use domain::volume::{DeleteRequest, ProvisionRequest, ProvisioningMode, Volume, VolumeId};
