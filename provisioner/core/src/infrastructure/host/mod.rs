// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod mounter;
pub mod os_client;

pub use mounter::SystemMounter;
pub use os_client::HostOsClient;
