// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Runtime
//!
//! Per-phase wrapping of a tool's own `precheck`/`execute` bodies. The tool
//! runtime holds no policy logic: evaluating attached policies is the
//! orchestration pipeline's job. The one policy-related duty here is
//! [`AllowedPolicyCommitter`], which lets an execute body commit policies
//! that already allowed the invocation.

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use async_trait::async_trait;
use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::application::policy_runtime::{panic_message, PolicyRuntime};
use crate::domain::context::EvaluationContext;
use crate::domain::outcome::{Outcome, PolicyVerdict};
use crate::domain::policy::PolicyId;
use crate::domain::tool::{PolicyCommitter, ToolDefinition, ToolPhase, ToolPhaseArgs, ToolPhaseContext};
use crate::domain::validation::{validate_or_fail, validate_outcome};

#[derive(Debug, Clone)]
pub struct ToolRuntime {
    definition: Arc<ToolDefinition>,
}

impl ToolRuntime {
    pub fn new(definition: Arc<ToolDefinition>) -> Self {
        Self { definition }
    }

    pub fn definition(&self) -> &Arc<ToolDefinition> {
        &self.definition
    }

    pub fn tool_ipfs_cid(&self) -> &str {
        self.definition.tool_ipfs_cid()
    }

    pub fn validate_params(&self, params: Value) -> Result<Value, Outcome> {
        validate_or_fail(params, self.definition.params_schema())
    }

    /// Run the tool's own precheck body, if it declares one locally.
    pub async fn precheck(
        &self,
        params: Value,
        context: EvaluationContext,
        rpc_endpoint: Option<String>,
    ) -> Option<Outcome> {
        let phase = self.definition.precheck_phase()?;
        if phase.is_remote_only() {
            debug!(tool = %self.tool_ipfs_cid(), "Tool precheck is remote-only, skipping");
            return None;
        }
        let ctx = ToolPhaseContext::new(context, rpc_endpoint);
        Some(self.run_phase("precheck", phase, params, ctx).await)
    }

    /// Run the execute body locally. Only executors hosting the tool call this.
    pub async fn execute(
        &self,
        params: Value,
        context: EvaluationContext,
        committer: Option<Arc<dyn PolicyCommitter>>,
    ) -> Outcome {
        let phase = self.definition.execute_phase();
        let mut ctx = ToolPhaseContext::new(context, None);
        if let Some(committer) = committer {
            ctx = ctx.with_committer(committer);
        }
        self.run_phase("execute", phase, params, ctx).await
    }

    /// Validate an execute result that came back from the executor.
    pub fn decode_execute_result(&self, outcome: Outcome) -> Outcome {
        validate_outcome(outcome, &self.definition.execute_phase().schemas)
    }

    /// Committer bound to this tool's supported policies.
    pub fn committer(&self) -> Arc<dyn PolicyCommitter> {
        Arc::new(AllowedPolicyCommitter::new(self.definition.clone()))
    }

    async fn run_phase(
        &self,
        name: &'static str,
        phase: &ToolPhase,
        params: Value,
        ctx: ToolPhaseContext,
    ) -> Outcome {
        let tool = self.tool_ipfs_cid();
        let Some(handler) = phase.handler() else {
            return Outcome::failure_message(format!(
                "{name} phase of tool {tool} has no local implementation"
            ));
        };

        let args = ToolPhaseArgs {
            tool_params: params,
        };
        match AssertUnwindSafe(handler.run(args, ctx)).catch_unwind().await {
            Ok(Ok(outcome)) => validate_outcome(outcome, &phase.schemas),
            Ok(Err(e)) => {
                warn!(tool = %tool, phase = name, error = %e, "Tool phase failed");
                Outcome::failure_message(format!("{name} phase of tool {tool} failed: {e:#}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(tool = %tool, phase = name, panic = %message, "Tool phase panicked");
                Outcome::failure_message(format!("{name} phase of tool {tool} panicked: {message}"))
            }
        }
    }
}

/// Commits policies listed as allowed in the invocation's `PoliciesContext`.
pub struct AllowedPolicyCommitter {
    definition: Arc<ToolDefinition>,
}

impl AllowedPolicyCommitter {
    pub fn new(definition: Arc<ToolDefinition>) -> Self {
        Self { definition }
    }
}

#[async_trait]
impl PolicyCommitter for AllowedPolicyCommitter {
    async fn commit(
        &self,
        policy_id: &PolicyId,
        params: Value,
        context: &EvaluationContext,
    ) -> PolicyVerdict {
        let allowed = context
            .policies_context
            .as_ref()
            .is_some_and(|policies| policies.is_allowed() && policies.is_policy_allowed(policy_id));
        if !allowed {
            return PolicyVerdict::deny_with_error(format!(
                "policy {policy_id} did not allow this invocation and cannot be committed"
            ));
        }

        let Some(supported) = self.definition.supported_policy(policy_id) else {
            return PolicyVerdict::deny_with_error(format!(
                "policy {policy_id} is not supported by tool {}",
                self.definition.package_name()
            ));
        };

        PolicyRuntime::new(supported.definition.clone())
            .commit(params, context)
            .await
    }
}
