// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

// Loopback Executor - in-process stand-in for an executor node
//
// Hosts tool runtimes keyed by code reference and answers dispatches the way
// a remote node does:
// - re-validates tool parameters
// - re-resolves the caller's delegator identity and runs the authoritative
//   evaluate phase against its own registry handle
// - runs the execute body with a commit-capable context
// - replies with a JSON-string envelope { toolExecutionResult, toolContext }

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::application::policy_evaluation::PolicyEvaluator;
use crate::application::tool_runtime::ToolRuntime;
use crate::domain::context::EvaluationContext;
use crate::domain::delegation::{DelegationRegistry, DelegatorIdentity};
use crate::domain::executor::{
    DispatchParams, DispatchReply, DispatchRequest, ExecutorError, RemoteExecutor, ToolEnvelope,
};
use crate::domain::outcome::Outcome;
use crate::domain::policy::PolicyPhaseKind;
use crate::domain::session::{ExecutorSession, SessionAuthenticator, SessionError, SessionGrant};
use crate::domain::tool::ToolDefinition;

pub struct LoopbackExecutor {
    tools: DashMap<String, ToolRuntime>,
    evaluator: PolicyEvaluator,
    dispatches: AtomicUsize,
}

impl LoopbackExecutor {
    pub fn new(registry: Arc<dyn DelegationRegistry>) -> Self {
        Self {
            tools: DashMap::new(),
            evaluator: PolicyEvaluator::new(registry),
            dispatches: AtomicUsize::new(0),
        }
    }

    /// Host a tool under its content identifier.
    pub fn host(&self, tool: Arc<ToolDefinition>) {
        let code_reference = tool.tool_ipfs_cid().to_string();
        info!(code_reference = %code_reference, package = %tool.package_name(), "Hosting tool in loopback executor");
        self.tools.insert(code_reference, ToolRuntime::new(tool));
    }

    pub fn dispatch_count(&self) -> usize {
        self.dispatches.load(Ordering::SeqCst)
    }

    async fn run(&self, tool: &ToolRuntime, request: DispatchRequest) -> ToolEnvelope {
        let DispatchParams {
            tool_params,
            context,
            delegator,
        } = request.js_params;
        let params = match tool.validate_params(tool_params) {
            Ok(params) => params,
            Err(failure) => return envelope(failure, context),
        };

        // Callers that predate the explicit identity are resolved by eth address.
        let Some(delegator) = delegator.or_else(|| {
            context
                .delegation
                .delegator_pkp_info
                .as_ref()
                .map(|pkp| DelegatorIdentity::new(pkp.eth_address.clone()))
        }) else {
            return envelope(
                Outcome::failure_message("dispatch context carries no delegator identity"),
                context,
            );
        };

        let base = EvaluationContext::new(context.tool_ipfs_cid.clone(), context.delegation.delegatee_address.clone());
        let (resolved, resolution) = match self.evaluator.resolve(&delegator, base).await {
            Ok(resolved) => resolved,
            Err(e) => return envelope(Outcome::failure_message(e.to_string()), context),
        };

        let evaluation = self
            .evaluator
            .run_policies(
                tool.definition(),
                PolicyPhaseKind::Evaluate,
                &params,
                resolved,
                &resolution.policies,
                None,
            )
            .await;
        if let Some(message) = evaluation.denial_message() {
            return envelope(Outcome::failure_message(message), evaluation.context);
        }

        let outcome = tool
            .execute(params, evaluation.context.clone(), Some(tool.committer()))
            .await;
        envelope(outcome, evaluation.context)
    }
}

fn envelope(outcome: Outcome, context: EvaluationContext) -> ToolEnvelope {
    ToolEnvelope {
        tool_execution_result: outcome,
        tool_context: context,
    }
}

#[async_trait]
impl RemoteExecutor for LoopbackExecutor {
    async fn dispatch(
        &self,
        session: &ExecutorSession,
        request: DispatchRequest,
    ) -> Result<DispatchReply, ExecutorError> {
        self.dispatches.fetch_add(1, Ordering::SeqCst);
        if session.is_expired_at(Utc::now()) {
            return Err(ExecutorError::Session(format!("session {} has expired", session.id)));
        }

        let Some(tool) = self
            .tools
            .get(&request.code_reference)
            .map(|entry| entry.value().clone())
        else {
            return Ok(DispatchReply {
                success: false,
                response: format!("no tool hosted for code reference {}", request.code_reference).into(),
            });
        };

        debug!(code_reference = %request.code_reference, "Loopback dispatch");
        let envelope = self.run(&tool, request).await;
        Ok(DispatchReply {
            success: envelope.tool_execution_result.is_success(),
            response: envelope.to_value().to_string().into(),
        })
    }
}

/// Issues local session credentials without a network round trip.
pub struct LoopbackAuthenticator {
    ttl_seconds: u64,
    issued: AtomicUsize,
}

impl LoopbackAuthenticator {
    pub fn new(ttl_seconds: u64) -> Self {
        Self {
            ttl_seconds,
            issued: AtomicUsize::new(0),
        }
    }

    pub fn issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionAuthenticator for LoopbackAuthenticator {
    async fn authenticate(&self, delegatee_address: &str) -> Result<SessionGrant, SessionError> {
        if delegatee_address.trim().is_empty() {
            return Err(SessionError::AuthenticationFailed("empty delegatee address".to_string()));
        }
        self.issued.fetch_add(1, Ordering::SeqCst);
        Ok(SessionGrant {
            credential: format!("loopback-{}", Uuid::new_v4()),
            expires_in_seconds: self.ttl_seconds,
        })
    }
}
