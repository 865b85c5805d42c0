// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod cloud;
pub mod error;
pub mod events;
pub mod gid_allocator;
pub mod host;
pub mod path_builder;
pub mod provisioner_config;
pub mod tag_parser;
pub mod volume;
