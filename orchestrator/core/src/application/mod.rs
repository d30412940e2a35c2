// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod policy_runtime;
pub mod tool_runtime;
pub mod policy_evaluation;
pub mod tool_client;

// Re-export use cases for convenience
pub use policy_runtime::PolicyRuntime;
pub use tool_runtime::{AllowedPolicyCommitter, ToolRuntime};
pub use policy_evaluation::{PolicyEvaluation, PolicyEvaluator};
pub use tool_client::{ExecuteOptions, InvocationStage, PrecheckOptions, ToolClient};
