// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Delegation registry adapters.
//!
//! - [`http::HttpDelegationRegistry`] talks to the registry REST service.
//! - [`in_memory::InMemoryDelegationRegistry`] backs tests and local runs.

pub mod http;
pub mod in_memory;

pub use http::HttpDelegationRegistry;
pub use in_memory::InMemoryDelegationRegistry;
