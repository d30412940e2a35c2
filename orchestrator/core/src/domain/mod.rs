// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: contracts, result algebra, and the boundaries of the
//! external collaborators (delegation registry, remote executor).
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Pure types and traits; no I/O

pub mod schema;
pub mod outcome;
pub mod context;
pub mod policy;
pub mod tool;
pub mod validation;
pub mod delegation;
pub mod executor;
pub mod session;
pub mod events;
pub mod client_config;
