// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Warrant core
//!
//! Policy evaluation and tool execution orchestration for delegated tool
//! invocation.
//!
//! # Architecture
//!
//! - **Layer:** Core System
//! - **Purpose:** Schema contracts, policy/tool runtimes, orchestration client

pub mod domain;
pub mod application;
pub mod infrastructure;

pub use domain::*;
