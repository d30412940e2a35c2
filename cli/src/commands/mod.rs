// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Command implementations for the Warrant CLI

pub mod config;
pub mod tool;

pub use self::config::ConfigCommand;
pub use self::tool::ToolCommand;
