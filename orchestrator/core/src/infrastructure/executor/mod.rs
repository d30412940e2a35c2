// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote executor adapters.
//!
//! - [`http`] dispatches to an executor node over HTTP and authenticates
//!   executor sessions.
//! - [`loopback`] hosts tool runtimes in-process and answers dispatches the
//!   way a remote node would.

pub mod http;
pub mod loopback;

pub use http::{HttpRemoteExecutor, HttpSessionAuthenticator};
pub use loopback::{LoopbackAuthenticator, LoopbackExecutor};
