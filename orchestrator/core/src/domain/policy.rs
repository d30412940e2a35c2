// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Definitions
//!
//! A policy is an authorization check attached to a tool. Its contract is
//! fixed at construction time:
//!
//! - tool-supplied parameter schema (required)
//! - optional user-configured parameter schema
//! - up to three phases (`precheck`, `evaluate`, `commit`), each with its own
//!   allow/deny result declarations
//!
//! Phase bodies receive a [`PolicyPhaseContext`] exposing the `allow`/`deny`
//! builders. Handlers return `anyhow::Result<PolicyVerdict>`; an `Err` is an
//! unexpected fault and is converted into a deny by the runtime.
//!
//! Definitions are immutable once built and are shared as `Arc<PolicyDefinition>`.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::context::{DelegationContext, EvaluationContext};
use crate::domain::delegation::AppRef;
use crate::domain::outcome::PolicyVerdict;
use crate::domain::schema::{SchemaContract, SchemaError, VerdictSchemas};

/// Policy identity (package name). Also the key used in `PoliciesContext`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PolicyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PolicyId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PolicyId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PolicyPhaseKind {
    Precheck,
    Evaluate,
    Commit,
}

impl PolicyPhaseKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Precheck => "precheck",
            Self::Evaluate => "evaluate",
            Self::Commit => "commit",
        }
    }
}

impl fmt::Display for PolicyPhaseKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inputs of a precheck/evaluate phase. Both values have already been
/// validated against the policy's declared schemas.
#[derive(Debug, Clone)]
pub struct PolicyPhaseArgs {
    pub tool_params: Value,
    pub user_params: Option<Value>,
}

impl PolicyPhaseArgs {
    pub fn tool_params_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.tool_params.clone())
    }

    /// `Ok(None)` when the delegator configured no parameters for this policy.
    pub fn user_params_as<T: DeserializeOwned>(&self) -> Result<Option<T>, serde_json::Error> {
        self.user_params
            .as_ref()
            .map(|value| serde_json::from_value(value.clone()))
            .transpose()
    }
}

/// What a policy phase body sees of the invocation, plus the result builders.
#[derive(Debug, Clone)]
pub struct PolicyPhaseContext {
    pub policy_id: PolicyId,
    pub phase: PolicyPhaseKind,
    pub tool_ipfs_cid: String,
    pub app: Option<AppRef>,
    pub delegation: DelegationContext,
    pub rpc_endpoint: Option<String>,
}

impl PolicyPhaseContext {
    pub fn new(
        policy_id: PolicyId,
        phase: PolicyPhaseKind,
        evaluation: &EvaluationContext,
        rpc_endpoint: Option<String>,
    ) -> Self {
        Self {
            policy_id,
            phase,
            tool_ipfs_cid: evaluation.tool_ipfs_cid.clone(),
            app: evaluation.app,
            delegation: evaluation.delegation.clone(),
            rpc_endpoint,
        }
    }

    pub fn allow<T: Serialize>(&self, result: T) -> PolicyVerdict {
        match serde_json::to_value(result) {
            Ok(value) => PolicyVerdict::allow(value),
            Err(e) => self.unserializable(e),
        }
    }

    pub fn allow_empty(&self) -> PolicyVerdict {
        PolicyVerdict::allow_empty()
    }

    pub fn deny<T: Serialize>(&self, result: T) -> PolicyVerdict {
        match serde_json::to_value(result) {
            Ok(value) => PolicyVerdict::deny(value),
            Err(e) => self.unserializable(e),
        }
    }

    pub fn deny_with_error(&self, error: impl Into<String>) -> PolicyVerdict {
        PolicyVerdict::deny_with_error(error)
    }

    fn unserializable(&self, e: serde_json::Error) -> PolicyVerdict {
        PolicyVerdict::deny_with_error(format!(
            "{} phase of policy {} produced an unserializable result: {}",
            self.phase, self.policy_id, e
        ))
    }
}

/// Body of a precheck or evaluate phase.
#[async_trait]
pub trait PolicyPhaseHandler: Send + Sync {
    async fn run(
        &self,
        args: PolicyPhaseArgs,
        ctx: PolicyPhaseContext,
    ) -> anyhow::Result<PolicyVerdict>;
}

#[async_trait]
impl<F, Fut> PolicyPhaseHandler for F
where
    F: Fn(PolicyPhaseArgs, PolicyPhaseContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<PolicyVerdict>> + Send + 'static,
{
    async fn run(
        &self,
        args: PolicyPhaseArgs,
        ctx: PolicyPhaseContext,
    ) -> anyhow::Result<PolicyVerdict> {
        (self)(args, ctx).await
    }
}

/// Body of a commit phase. Receives the commit parameters supplied by the
/// tool's execute body.
#[async_trait]
pub trait PolicyCommitHandler: Send + Sync {
    async fn commit(&self, params: Value, ctx: PolicyPhaseContext)
        -> anyhow::Result<PolicyVerdict>;
}

#[async_trait]
impl<F, Fut> PolicyCommitHandler for F
where
    F: Fn(Value, PolicyPhaseContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<PolicyVerdict>> + Send + 'static,
{
    async fn commit(
        &self,
        params: Value,
        ctx: PolicyPhaseContext,
    ) -> anyhow::Result<PolicyVerdict> {
        (self)(params, ctx).await
    }
}

#[derive(Clone)]
pub struct PolicyPhase {
    pub schemas: VerdictSchemas,
    handler: Arc<dyn PolicyPhaseHandler>,
}

impl PolicyPhase {
    pub fn new(schemas: VerdictSchemas, handler: Arc<dyn PolicyPhaseHandler>) -> Self {
        Self { schemas, handler }
    }

    pub fn handler(&self) -> &Arc<dyn PolicyPhaseHandler> {
        &self.handler
    }
}

#[derive(Clone)]
pub struct CommitPhase {
    pub params_schema: SchemaContract,
    pub schemas: VerdictSchemas,
    handler: Arc<dyn PolicyCommitHandler>,
}

impl CommitPhase {
    pub fn handler(&self) -> &Arc<dyn PolicyCommitHandler> {
        &self.handler
    }
}

pub struct PolicyDefinition {
    id: PolicyId,
    params_schema: SchemaContract,
    user_params_schema: Option<SchemaContract>,
    precheck: Option<PolicyPhase>,
    evaluate: Option<PolicyPhase>,
    commit: Option<CommitPhase>,
}

impl PolicyDefinition {
    pub fn builder(id: impl Into<PolicyId>) -> PolicyDefinitionBuilder {
        PolicyDefinitionBuilder {
            id: id.into(),
            params_schema: None,
            user_params_schema: None,
            precheck: None,
            evaluate: None,
            commit: None,
        }
    }

    pub fn id(&self) -> &PolicyId {
        &self.id
    }

    pub fn params_schema(&self) -> &SchemaContract {
        &self.params_schema
    }

    pub fn user_params_schema(&self) -> Option<&SchemaContract> {
        self.user_params_schema.as_ref()
    }

    /// Precheck or evaluate phase. Commit has its own accessor.
    pub fn phase(&self, kind: PolicyPhaseKind) -> Option<&PolicyPhase> {
        match kind {
            PolicyPhaseKind::Precheck => self.precheck.as_ref(),
            PolicyPhaseKind::Evaluate => self.evaluate.as_ref(),
            PolicyPhaseKind::Commit => None,
        }
    }

    pub fn commit_phase(&self) -> Option<&CommitPhase> {
        self.commit.as_ref()
    }
}

impl fmt::Debug for PolicyDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PolicyDefinition")
            .field("id", &self.id)
            .field("params_schema", &self.params_schema.label())
            .field("has_user_params", &self.user_params_schema.is_some())
            .field("precheck", &self.precheck.is_some())
            .field("evaluate", &self.evaluate.is_some())
            .field("commit", &self.commit.is_some())
            .finish()
    }
}

pub struct PolicyDefinitionBuilder {
    id: PolicyId,
    params_schema: Option<SchemaContract>,
    user_params_schema: Option<SchemaContract>,
    precheck: Option<PolicyPhase>,
    evaluate: Option<PolicyPhase>,
    commit: Option<CommitPhase>,
}

impl PolicyDefinitionBuilder {
    pub fn params_schema(mut self, schema: SchemaContract) -> Self {
        self.params_schema = Some(schema);
        self
    }

    pub fn user_params_schema(mut self, schema: SchemaContract) -> Self {
        self.user_params_schema = Some(schema);
        self
    }

    pub fn precheck<F, Fut>(self, schemas: VerdictSchemas, handler: F) -> Self
    where
        F: Fn(PolicyPhaseArgs, PolicyPhaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<PolicyVerdict>> + Send + 'static,
    {
        self.precheck_handler(schemas, Arc::new(handler))
    }

    pub fn precheck_handler(
        mut self,
        schemas: VerdictSchemas,
        handler: Arc<dyn PolicyPhaseHandler>,
    ) -> Self {
        self.precheck = Some(PolicyPhase::new(schemas, handler));
        self
    }

    pub fn evaluate<F, Fut>(self, schemas: VerdictSchemas, handler: F) -> Self
    where
        F: Fn(PolicyPhaseArgs, PolicyPhaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<PolicyVerdict>> + Send + 'static,
    {
        self.evaluate_handler(schemas, Arc::new(handler))
    }

    pub fn evaluate_handler(
        mut self,
        schemas: VerdictSchemas,
        handler: Arc<dyn PolicyPhaseHandler>,
    ) -> Self {
        self.evaluate = Some(PolicyPhase::new(schemas, handler));
        self
    }

    pub fn commit<F, Fut>(
        self,
        params_schema: SchemaContract,
        schemas: VerdictSchemas,
        handler: F,
    ) -> Self
    where
        F: Fn(Value, PolicyPhaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<PolicyVerdict>> + Send + 'static,
    {
        self.commit_handler(params_schema, schemas, Arc::new(handler))
    }

    pub fn commit_handler(
        mut self,
        params_schema: SchemaContract,
        schemas: VerdictSchemas,
        handler: Arc<dyn PolicyCommitHandler>,
    ) -> Self {
        self.commit = Some(CommitPhase {
            params_schema,
            schemas,
            handler,
        });
        self
    }

    pub fn build(self) -> Result<PolicyDefinition, SchemaError> {
        if self.id.as_str().trim().is_empty() {
            return Err(SchemaError::EmptyIdentity);
        }
        let params_schema = self
            .params_schema
            .ok_or_else(|| SchemaError::MissingParameterSchema(self.id.to_string()))?;

        Ok(PolicyDefinition {
            id: self.id,
            params_schema,
            user_params_schema: self.user_params_schema,
            precheck: self.precheck,
            evaluate: self.evaluate,
            commit: self.commit,
        })
    }
}
