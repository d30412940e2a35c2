// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod event_bus;
pub mod registry;
pub mod executor;
pub mod session_manager;

pub use event_bus::{DomainEvent, EventBus, EventBusError, EventReceiver};
pub use session_manager::ExecutorSessionManager;
