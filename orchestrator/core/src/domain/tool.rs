// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Tool Definitions
//!
//! A tool is caller-invokable logic executed remotely. Its contract:
//!
//! - package name and content identifier (the code reference the executor runs)
//! - caller parameter schema
//! - supported policies, each with a [`ParameterMapping`] renaming tool
//!   parameters onto the policy's parameter names
//! - optional `precheck` and required `execute` phases with success/failure
//!   result declarations
//!
//! A phase may be declared without a local body. Its schemas are still used
//! to validate what the executor returns.

use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::domain::context::{EvaluationContext, PoliciesContext};
use crate::domain::outcome::{Outcome, PolicyVerdict};
use crate::domain::policy::{PolicyDefinition, PolicyId};
use crate::domain::schema::{OutcomeSchemas, SchemaContract, SchemaError};

/// Tool parameter name → policy parameter name.
///
/// Projection is a pure rename: values are copied untouched and tool
/// parameters without a mapping entry are dropped.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterMapping(BTreeMap<String, String>);

impl ParameterMapping {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, tool_param: impl Into<String>, policy_param: impl Into<String>) -> Self {
        self.0.insert(tool_param.into(), policy_param.into());
        self
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn project(&self, tool_params: &Value) -> Value {
        let mut projected = Map::new();
        if let Some(source) = tool_params.as_object() {
            for (tool_param, policy_param) in &self.0 {
                if let Some(value) = source.get(tool_param) {
                    projected.insert(policy_param.clone(), value.clone());
                }
            }
        }
        Value::Object(projected)
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for ParameterMapping {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

#[derive(Debug, Clone)]
pub struct SupportedPolicy {
    pub definition: Arc<PolicyDefinition>,
    pub mapping: ParameterMapping,
}

impl SupportedPolicy {
    pub fn id(&self) -> &PolicyId {
        self.definition.id()
    }
}

#[derive(Debug, Clone)]
pub struct ToolPhaseArgs {
    pub tool_params: Value,
}

impl ToolPhaseArgs {
    pub fn params_as<T: DeserializeOwned>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.tool_params.clone())
    }
}

/// Runs a policy's commit phase on behalf of an execute body.
#[async_trait]
pub trait PolicyCommitter: Send + Sync {
    async fn commit(
        &self,
        policy_id: &PolicyId,
        params: Value,
        context: &EvaluationContext,
    ) -> PolicyVerdict;
}

/// What a tool phase body sees, plus the result builders.
#[derive(Clone)]
pub struct ToolPhaseContext {
    pub evaluation: EvaluationContext,
    pub rpc_endpoint: Option<String>,
    committer: Option<Arc<dyn PolicyCommitter>>,
}

impl ToolPhaseContext {
    pub fn new(evaluation: EvaluationContext, rpc_endpoint: Option<String>) -> Self {
        Self {
            evaluation,
            rpc_endpoint,
            committer: None,
        }
    }

    pub fn with_committer(mut self, committer: Arc<dyn PolicyCommitter>) -> Self {
        self.committer = Some(committer);
        self
    }

    pub fn policies_context(&self) -> Option<&PoliciesContext> {
        self.evaluation.policies_context.as_ref()
    }

    pub fn succeed<T: Serialize>(&self, result: T) -> Outcome {
        match serde_json::to_value(result) {
            Ok(value) => Outcome::success(value),
            Err(e) => Outcome::failure_message(format!("unserializable tool result: {e}")),
        }
    }

    pub fn succeed_empty(&self) -> Outcome {
        Outcome::success_empty()
    }

    pub fn fail<T: Serialize>(&self, result: T) -> Outcome {
        match serde_json::to_value(result) {
            Ok(value) => Outcome::failure(value, None),
            Err(e) => Outcome::failure_message(format!("unserializable tool result: {e}")),
        }
    }

    pub fn fail_with_error(&self, error: impl Into<String>) -> Outcome {
        Outcome::failure_message(error)
    }

    /// Run the commit phase of a policy that allowed this invocation.
    pub async fn commit_policy(&self, policy_id: &PolicyId, params: Value) -> PolicyVerdict {
        match &self.committer {
            Some(committer) => committer.commit(policy_id, params, &self.evaluation).await,
            None => PolicyVerdict::deny_with_error(format!(
                "policy {policy_id} cannot be committed outside of execute"
            )),
        }
    }
}

impl fmt::Debug for ToolPhaseContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ToolPhaseContext")
            .field("evaluation", &self.evaluation)
            .field("rpc_endpoint", &self.rpc_endpoint)
            .field("can_commit", &self.committer.is_some())
            .finish()
    }
}

#[async_trait]
pub trait ToolPhaseHandler: Send + Sync {
    async fn run(&self, args: ToolPhaseArgs, ctx: ToolPhaseContext) -> anyhow::Result<Outcome>;
}

#[async_trait]
impl<F, Fut> ToolPhaseHandler for F
where
    F: Fn(ToolPhaseArgs, ToolPhaseContext) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Outcome>> + Send + 'static,
{
    async fn run(&self, args: ToolPhaseArgs, ctx: ToolPhaseContext) -> anyhow::Result<Outcome> {
        (self)(args, ctx).await
    }
}

#[derive(Clone)]
pub struct ToolPhase {
    pub schemas: OutcomeSchemas,
    handler: Option<Arc<dyn ToolPhaseHandler>>,
}

impl ToolPhase {
    pub fn local(schemas: OutcomeSchemas, handler: Arc<dyn ToolPhaseHandler>) -> Self {
        Self {
            schemas,
            handler: Some(handler),
        }
    }

    /// Declared phase whose body only exists on the executor.
    pub fn remote(schemas: OutcomeSchemas) -> Self {
        Self {
            schemas,
            handler: None,
        }
    }

    pub fn handler(&self) -> Option<&Arc<dyn ToolPhaseHandler>> {
        self.handler.as_ref()
    }

    pub fn is_remote_only(&self) -> bool {
        self.handler.is_none()
    }
}

pub struct ToolDefinition {
    package_name: String,
    tool_ipfs_cid: String,
    params_schema: SchemaContract,
    supported_policies: Vec<SupportedPolicy>,
    precheck: Option<ToolPhase>,
    execute: ToolPhase,
}

impl ToolDefinition {
    pub fn builder(
        package_name: impl Into<String>,
        tool_ipfs_cid: impl Into<String>,
    ) -> ToolDefinitionBuilder {
        ToolDefinitionBuilder {
            package_name: package_name.into(),
            tool_ipfs_cid: tool_ipfs_cid.into(),
            params_schema: None,
            supported_policies: Vec::new(),
            precheck: None,
            execute: None,
        }
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    /// Code reference submitted to the remote executor.
    pub fn tool_ipfs_cid(&self) -> &str {
        &self.tool_ipfs_cid
    }

    pub fn params_schema(&self) -> &SchemaContract {
        &self.params_schema
    }

    pub fn supported_policies(&self) -> &[SupportedPolicy] {
        &self.supported_policies
    }

    pub fn supported_policy(&self, id: &PolicyId) -> Option<&SupportedPolicy> {
        self.supported_policies.iter().find(|p| p.id() == id)
    }

    pub fn precheck_phase(&self) -> Option<&ToolPhase> {
        self.precheck.as_ref()
    }

    pub fn execute_phase(&self) -> &ToolPhase {
        &self.execute
    }
}

impl fmt::Debug for ToolDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let policies: Vec<&PolicyId> = self.supported_policies.iter().map(|p| p.id()).collect();
        f.debug_struct("ToolDefinition")
            .field("package_name", &self.package_name)
            .field("tool_ipfs_cid", &self.tool_ipfs_cid)
            .field("supported_policies", &policies)
            .field("precheck", &self.precheck.is_some())
            .field("execute_remote_only", &self.execute.is_remote_only())
            .finish()
    }
}

pub struct ToolDefinitionBuilder {
    package_name: String,
    tool_ipfs_cid: String,
    params_schema: Option<SchemaContract>,
    supported_policies: Vec<SupportedPolicy>,
    precheck: Option<ToolPhase>,
    execute: Option<ToolPhase>,
}

impl ToolDefinitionBuilder {
    pub fn params_schema(mut self, schema: SchemaContract) -> Self {
        self.params_schema = Some(schema);
        self
    }

    pub fn supported_policy(
        mut self,
        definition: Arc<PolicyDefinition>,
        mapping: ParameterMapping,
    ) -> Self {
        self.supported_policies.push(SupportedPolicy {
            definition,
            mapping,
        });
        self
    }

    pub fn precheck<F, Fut>(self, schemas: OutcomeSchemas, handler: F) -> Self
    where
        F: Fn(ToolPhaseArgs, ToolPhaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Outcome>> + Send + 'static,
    {
        self.precheck_handler(schemas, Arc::new(handler))
    }

    pub fn precheck_handler(
        mut self,
        schemas: OutcomeSchemas,
        handler: Arc<dyn ToolPhaseHandler>,
    ) -> Self {
        self.precheck = Some(ToolPhase::local(schemas, handler));
        self
    }

    pub fn precheck_remote(mut self, schemas: OutcomeSchemas) -> Self {
        self.precheck = Some(ToolPhase::remote(schemas));
        self
    }

    pub fn execute<F, Fut>(self, schemas: OutcomeSchemas, handler: F) -> Self
    where
        F: Fn(ToolPhaseArgs, ToolPhaseContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Outcome>> + Send + 'static,
    {
        self.execute_handler(schemas, Arc::new(handler))
    }

    pub fn execute_handler(
        mut self,
        schemas: OutcomeSchemas,
        handler: Arc<dyn ToolPhaseHandler>,
    ) -> Self {
        self.execute = Some(ToolPhase::local(schemas, handler));
        self
    }

    pub fn execute_remote(mut self, schemas: OutcomeSchemas) -> Self {
        self.execute = Some(ToolPhase::remote(schemas));
        self
    }

    pub fn build(self) -> Result<ToolDefinition, SchemaError> {
        if self.package_name.trim().is_empty() || self.tool_ipfs_cid.trim().is_empty() {
            return Err(SchemaError::EmptyIdentity);
        }
        let params_schema = self
            .params_schema
            .ok_or_else(|| SchemaError::MissingParameterSchema(self.package_name.clone()))?;
        let execute = self
            .execute
            .ok_or_else(|| SchemaError::MissingExecutePhase(self.package_name.clone()))?;

        let tool_params = params_schema.property_names();
        let mut seen: Vec<&PolicyId> = Vec::new();
        for supported in &self.supported_policies {
            let id = supported.id();
            if seen.contains(&id) {
                return Err(SchemaError::DuplicatePolicy(id.to_string()));
            }
            seen.push(id);

            let policy_params = supported.definition.params_schema().property_names();
            for (tool_param, policy_param) in supported.mapping.entries() {
                if let Some(names) = &tool_params {
                    if !names.contains(&tool_param) {
                        return Err(SchemaError::UnknownToolParameter {
                            policy: id.to_string(),
                            parameter: tool_param.to_string(),
                        });
                    }
                }
                if let Some(names) = &policy_params {
                    if !names.contains(&policy_param) {
                        return Err(SchemaError::UnknownPolicyParameter {
                            policy: id.to_string(),
                            parameter: policy_param.to_string(),
                        });
                    }
                }
            }
        }

        Ok(ToolDefinition {
            package_name: self.package_name,
            tool_ipfs_cid: self.tool_ipfs_cid,
            params_schema,
            supported_policies: self.supported_policies,
            precheck: self.precheck,
            execute,
        })
    }
}
