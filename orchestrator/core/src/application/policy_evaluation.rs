// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Evaluation
//!
//! Resolves the delegation for an invocation and runs the delegator's
//! configured policies against it.
//!
//! ## Ordering
//!
//! Policies run sequentially in configured order. The first deny stops the
//! loop: the denier becomes `deniedPolicy`, later policies are never invoked,
//! and `evaluatedPolicies` is exactly the prefix that ran. Evaluation is
//! never cached; every call resolves the registry again.
//!
//! A configured policy that cannot be run (not supported by the tool, or its
//! stored parameters do not decode) denies.

use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use crate::application::policy_runtime::PolicyRuntime;
use crate::domain::context::{EvaluationContext, PoliciesContext, PolicyEvaluationTrace};
use crate::domain::delegation::{
    ConfiguredPolicy, DelegationRegistry, DelegatorIdentity, RegistryError, ToolPolicyResolution,
};
use crate::domain::events::PolicyEvent;
use crate::domain::outcome::PolicyVerdict;
use crate::domain::policy::{PolicyId, PolicyPhaseKind};
use crate::domain::tool::ToolDefinition;
use crate::infrastructure::event_bus::EventBus;

/// Result of running the configured policies for one invocation.
#[derive(Debug, Clone)]
pub struct PolicyEvaluation {
    /// Context extended with the delegation, app and policies context.
    pub context: EvaluationContext,
    pub policies: PoliciesContext,
}

impl PolicyEvaluation {
    pub fn is_allowed(&self) -> bool {
        self.policies.is_allowed()
    }

    /// Human-readable summary of the denial, if any.
    pub fn denial_message(&self) -> Option<String> {
        self.policies.denied_policy().map(|denied| match &denied.error {
            Some(error) => format!("policy {} denied the invocation: {}", denied.package_name, error),
            None => format!("policy {} denied the invocation", denied.package_name),
        })
    }
}

pub struct PolicyEvaluator {
    registry: Arc<dyn DelegationRegistry>,
    event_bus: Option<Arc<EventBus>>,
}

impl PolicyEvaluator {
    pub fn new(registry: Arc<dyn DelegationRegistry>) -> Self {
        Self {
            registry,
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Resolve the delegator record and the policies configured for the tool,
    /// and extend `base` with the delegation and app.
    pub async fn resolve(
        &self,
        delegator: &DelegatorIdentity,
        base: EvaluationContext,
    ) -> Result<(EvaluationContext, ToolPolicyResolution), RegistryError> {
        let tool = base.tool_ipfs_cid.clone();

        let pkp = self
            .registry
            .resolve_delegator(delegator)
            .await
            .inspect_err(|e| {
                error!(tool = %tool, delegator = %delegator, error = %e, "Failed to resolve delegator")
            })?;
        let resolution = self
            .registry
            .resolve_tool_policies(delegator, &tool)
            .await
            .inspect_err(|e| {
                error!(tool = %tool, delegator = %delegator, error = %e, "Failed to resolve tool policies")
            })?;

        let context = base.with_delegator(pkp).with_app(resolution.app());
        Ok((context, resolution))
    }

    /// Run `kind` for each configured policy, first deny wins.
    pub async fn run_policies(
        &self,
        tool: &ToolDefinition,
        kind: PolicyPhaseKind,
        tool_params: &Value,
        context: EvaluationContext,
        configured: &[ConfiguredPolicy],
        rpc_endpoint: Option<String>,
    ) -> PolicyEvaluation {
        let mut trace = PolicyEvaluationTrace::new();

        for policy in configured {
            let id = &policy.policy_id;
            let verdict = self
                .run_one(tool, kind, tool_params, &context, policy, rpc_endpoint.clone())
                .await;
            self.record(&context.tool_ipfs_cid, id, kind, &verdict);

            match verdict {
                PolicyVerdict::Allow { result } => trace.record_allow(id.clone(), result),
                PolicyVerdict::Deny { result, error } => {
                    let policies = trace.deny(id.clone(), result, error);
                    return PolicyEvaluation {
                        context: context.with_policies(policies.clone()),
                        policies,
                    };
                }
            }
        }

        let policies = trace.finish();
        PolicyEvaluation {
            context: context.with_policies(policies.clone()),
            policies,
        }
    }

    async fn run_one(
        &self,
        tool: &ToolDefinition,
        kind: PolicyPhaseKind,
        tool_params: &Value,
        context: &EvaluationContext,
        policy: &ConfiguredPolicy,
        rpc_endpoint: Option<String>,
    ) -> PolicyVerdict {
        let id = &policy.policy_id;
        let Some(supported) = tool.supported_policy(id) else {
            return PolicyVerdict::deny_with_error(format!(
                "policy {id} is configured but not supported by tool {}",
                tool.package_name()
            ));
        };

        let user_params = match policy.configured_parameters.as_ref().map(|p| p.decode()).transpose() {
            Ok(value) => value,
            Err(e) => {
                return PolicyVerdict::deny_with_error(format!(
                    "stored parameters for policy {id} could not be decoded: {e}"
                ))
            }
        };

        let projected = supported.mapping.project(tool_params);
        PolicyRuntime::new(supported.definition.clone())
            .run_phase(kind, projected, user_params, context, rpc_endpoint)
            .await
    }

    fn record(&self, tool: &str, id: &PolicyId, kind: PolicyPhaseKind, verdict: &PolicyVerdict) {
        let outcome = if verdict.is_allow() { "allow" } else { "deny" };
        metrics::counter!(
            "warrant_policy_evaluations_total",
            "phase" => kind.as_str(),
            "outcome" => outcome
        )
        .increment(1);

        let event = match verdict {
            PolicyVerdict::Allow { .. } => {
                info!(tool = %tool, policy = %id, phase = %kind, "Policy allowed");
                PolicyEvent::allowed(tool, id, kind)
            }
            PolicyVerdict::Deny { error, .. } => {
                warn!(tool = %tool, policy = %id, phase = %kind, reason = ?error, "Policy denied");
                PolicyEvent::denied(tool, id, kind, error.clone())
            }
        };
        if let Some(bus) = &self.event_bus {
            bus.publish_policy_event(event);
        }
    }
}
