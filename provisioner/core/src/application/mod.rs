// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod access_point_provisioner;
pub mod controller;
pub mod directory_provisioner;
pub mod lock_manager;
pub mod provisioner;
