// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Warrant Rust SDK
//!
//! Load tool manifests and wire a policy-gated tool client from configuration.

pub mod client;
pub mod manifest;

pub use client::{WarrantClient, WarrantClientBuilder};
pub use manifest::{ManifestError, ToolManifest};
pub use warrant_core::application::tool_client::{ExecuteOptions, PrecheckOptions, ToolClient};
pub use warrant_core::domain::client_config::ClientConfigManifest;
