// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Client
//!
//! Consumer-facing entry point for one tool: `precheck` and `execute`.
//!
//! ## Invocation state machine
//!
//! ```text
//! Start ─▶ ResolvingDelegation ─▶ EvaluatingPolicies ─┬─▶ Denied (terminal)
//!                                                      └─▶ Allowed
//!   precheck:  Allowed ─▶ (tool precheck) ─▶ Done
//!   execute:   Allowed ─▶ Dispatching ─▶ ValidatingRemoteResult ─▶ Done
//! ```
//!
//! Both operations return a [`Response`], never a `Result`: every failure
//! (invalid parameters, registry error, denial, transport or protocol error,
//! tool failure) is a failure response carrying the context accumulated up
//! to that point. Nothing is retried here.

use std::sync::Arc;

use chrono::Utc;
use serde_json::Value;
use tracing::{debug, error, warn};

use crate::application::policy_evaluation::PolicyEvaluator;
use crate::application::tool_runtime::ToolRuntime;
use crate::domain::context::EvaluationContext;
use crate::domain::delegation::{DelegationRegistry, DelegatorIdentity};
use crate::domain::events::ToolEvent;
use crate::domain::executor::{DispatchRequest, RemoteExecutor, ToolEnvelope};
use crate::domain::outcome::{Outcome, Response};
use crate::domain::policy::PolicyPhaseKind;
use crate::domain::session::SessionProvider;
use crate::domain::tool::ToolDefinition;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvocationStage {
    Start,
    ResolvingDelegation,
    EvaluatingPolicies,
    Denied,
    Allowed,
    Dispatching,
    ValidatingRemoteResult,
    Done,
}

#[derive(Debug, Clone)]
pub struct PrecheckOptions {
    pub delegator: DelegatorIdentity,
    pub rpc_endpoint: Option<String>,
}

impl PrecheckOptions {
    pub fn new(delegator: impl Into<String>) -> Self {
        Self {
            delegator: DelegatorIdentity::new(delegator),
            rpc_endpoint: None,
        }
    }

    pub fn with_rpc_endpoint(mut self, rpc_endpoint: impl Into<String>) -> Self {
        self.rpc_endpoint = Some(rpc_endpoint.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct ExecuteOptions {
    pub delegator: DelegatorIdentity,
}

impl ExecuteOptions {
    pub fn new(delegator: impl Into<String>) -> Self {
        Self {
            delegator: DelegatorIdentity::new(delegator),
        }
    }
}

pub struct ToolClient {
    tool: ToolRuntime,
    evaluator: PolicyEvaluator,
    executor: Arc<dyn RemoteExecutor>,
    sessions: Arc<dyn SessionProvider>,
    delegatee_address: String,
    event_bus: Option<Arc<EventBus>>,
}

impl ToolClient {
    pub fn new(
        tool: Arc<ToolDefinition>,
        registry: Arc<dyn DelegationRegistry>,
        executor: Arc<dyn RemoteExecutor>,
        sessions: Arc<dyn SessionProvider>,
        delegatee_address: impl Into<String>,
    ) -> Self {
        Self {
            tool: ToolRuntime::new(tool),
            evaluator: PolicyEvaluator::new(registry),
            executor,
            sessions,
            delegatee_address: delegatee_address.into(),
            event_bus: None,
        }
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.evaluator = self.evaluator.with_event_bus(event_bus.clone());
        self.event_bus = Some(event_bus);
        self
    }

    pub fn tool(&self) -> &ToolRuntime {
        &self.tool
    }

    /// Dry run: validate, resolve, run every policy's precheck, then the
    /// tool's own precheck. Never dispatches.
    pub async fn precheck(&self, tool_params: Value, options: PrecheckOptions) -> Response {
        let base = self.base_context();
        self.enter(InvocationStage::Start);

        let params = match self.tool.validate_params(tool_params) {
            Ok(params) => params,
            Err(failure) => return Response::new(failure, base),
        };

        self.enter(InvocationStage::ResolvingDelegation);
        let (context, resolution) = match self.evaluator.resolve(&options.delegator, base.clone()).await {
            Ok(resolved) => resolved,
            Err(e) => return Response::failure_message(e.to_string(), base),
        };

        self.enter(InvocationStage::EvaluatingPolicies);
        let evaluation = self
            .evaluator
            .run_policies(
                self.tool.definition(),
                PolicyPhaseKind::Precheck,
                &params,
                context,
                &resolution.policies,
                options.rpc_endpoint.clone(),
            )
            .await;
        if let Some(message) = evaluation.denial_message() {
            self.enter(InvocationStage::Denied);
            return Response::failure_message(message, evaluation.context);
        }

        self.enter(InvocationStage::Allowed);
        let outcome = self
            .tool
            .precheck(params, evaluation.context.clone(), options.rpc_endpoint)
            .await
            .unwrap_or_else(Outcome::success_empty);

        self.enter(InvocationStage::Done);
        Response::new(outcome, evaluation.context)
    }

    /// Authoritative run: re-evaluates every policy, then dispatches the tool
    /// body to the remote executor and validates what comes back.
    pub async fn execute(&self, tool_params: Value, options: ExecuteOptions) -> Response {
        let base = self.base_context();
        self.enter(InvocationStage::Start);

        let params = match self.tool.validate_params(tool_params) {
            Ok(params) => params,
            Err(failure) => return Response::new(failure, base),
        };

        self.enter(InvocationStage::ResolvingDelegation);
        let (context, resolution) = match self.evaluator.resolve(&options.delegator, base.clone()).await {
            Ok(resolved) => resolved,
            Err(e) => return Response::failure_message(e.to_string(), base),
        };

        self.enter(InvocationStage::EvaluatingPolicies);
        let evaluation = self
            .evaluator
            .run_policies(
                self.tool.definition(),
                PolicyPhaseKind::Evaluate,
                &params,
                context,
                &resolution.policies,
                None,
            )
            .await;
        if let Some(message) = evaluation.denial_message() {
            self.enter(InvocationStage::Denied);
            return Response::failure_message(message, evaluation.context);
        }
        self.enter(InvocationStage::Allowed);

        self.enter(InvocationStage::Dispatching);
        let context = evaluation.context;
        let session = match self.sessions.current_session().await {
            Ok(session) => session,
            Err(e) => {
                error!(tool = %self.tool.tool_ipfs_cid(), error = %e, "No executor session");
                self.count_dispatch("session_error");
                return Response::failure_message(e.to_string(), context);
            }
        };

        let request = DispatchRequest::new(self.tool.tool_ipfs_cid(), params, context.clone())
            .with_delegator(options.delegator.clone());
        self.publish(ToolEvent::ToolDispatched {
            tool_ipfs_cid: self.tool.tool_ipfs_cid().to_string(),
            dispatched_at: Utc::now(),
        });
        let reply = match self.executor.dispatch(&session, request).await {
            Ok(reply) => reply,
            Err(e) => {
                error!(tool = %self.tool.tool_ipfs_cid(), error = %e, "Dispatch failed");
                self.count_dispatch("transport_error");
                return Response::failure_message(e.to_string(), context);
            }
        };

        self.enter(InvocationStage::ValidatingRemoteResult);
        let envelope = match ToolEnvelope::from_reply(&reply) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(tool = %self.tool.tool_ipfs_cid(), error = %e, "Protocol error from executor");
                self.count_dispatch("protocol_error");
                self.publish(ToolEvent::ProtocolViolation {
                    tool_ipfs_cid: self.tool.tool_ipfs_cid().to_string(),
                    details: e.to_string(),
                    detected_at: Utc::now(),
                });
                return Response::failure_message(format!("protocol error: {e}"), context);
            }
        };

        let outcome = self.tool.decode_execute_result(envelope.tool_execution_result);
        let mut remote_context = envelope.tool_context;
        if remote_context.policies_context.is_none() {
            remote_context.policies_context = context.policies_context;
        }

        self.count_dispatch(if outcome.is_success() { "success" } else { "failure" });
        self.publish(ToolEvent::ToolCompleted {
            tool_ipfs_cid: self.tool.tool_ipfs_cid().to_string(),
            success: outcome.is_success(),
            completed_at: Utc::now(),
        });
        self.enter(InvocationStage::Done);
        Response::new(outcome, remote_context)
    }

    fn base_context(&self) -> EvaluationContext {
        EvaluationContext::new(self.tool.tool_ipfs_cid(), self.delegatee_address.clone())
    }

    fn enter(&self, stage: InvocationStage) {
        debug!(tool = %self.tool.tool_ipfs_cid(), stage = ?stage, "Invocation stage");
    }

    fn count_dispatch(&self, outcome: &'static str) {
        metrics::counter!("warrant_tool_dispatch_total", "outcome" => outcome).increment(1);
    }

    fn publish(&self, event: ToolEvent) {
        if let Some(bus) = &self.event_bus {
            bus.publish_tool_event(event);
        }
    }
}
