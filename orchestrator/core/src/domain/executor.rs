// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Remote Executor - consumed boundary
//!
//! Single operation: dispatch(codeReference, { toolParams, context, delegator? }).
//! The reply is { success, response } where `response` should carry the
//! dispatch envelope { toolExecutionResult, toolContext }, possibly as a
//! JSON-encoded string. Anything else is a protocol error, distinct from a
//! tool-level failure.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::domain::context::EvaluationContext;
use crate::domain::delegation::DelegatorIdentity;
use crate::domain::outcome::Outcome;
use crate::domain::session::ExecutorSession;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchRequest {
    pub code_reference: String,
    pub js_params: DispatchParams,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchParams {
    pub tool_params: Value,
    pub context: EvaluationContext,
    /// Identity the caller resolved policies under; the executor re-resolves with it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegator: Option<DelegatorIdentity>,
}

impl DispatchRequest {
    pub fn new(code_reference: impl Into<String>, tool_params: Value, context: EvaluationContext) -> Self {
        Self {
            code_reference: code_reference.into(),
            js_params: DispatchParams {
                tool_params,
                context,
                delegator: None,
            },
        }
    }

    pub fn with_delegator(mut self, delegator: DelegatorIdentity) -> Self {
        self.js_params.delegator = Some(delegator);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispatchReply {
    pub success: bool,
    #[serde(default)]
    pub response: Value,
}

#[derive(Debug, Error)]
pub enum ExecutorError {
    #[error("executor transport error: {0}")]
    Transport(String),

    #[error("executor did not answer within {0}s")]
    Timeout(u64),

    #[error("executor session unavailable: {0}")]
    Session(String),

    #[error("executor rejected dispatch with status {status}: {body}")]
    Rejected { status: u16, body: String },

    #[error("executor reply could not be decoded: {0}")]
    InvalidReply(String),
}

/// Ways a dispatch reply can fail to be a well-formed envelope.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    #[error("remote dispatch failed: {0}")]
    DispatchFailed(String),

    #[error("remote response is a bare string, not a dispatch envelope: {0}")]
    BareString(String),

    #[error("remote response is a generic failure marker without a tool result")]
    GenericFailure,

    #[error("remote response envelope is missing '{0}'")]
    MissingField(&'static str),

    #[error("remote response envelope is malformed: {0}")]
    Malformed(String),
}

/// A well-formed dispatch envelope.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolEnvelope {
    pub tool_execution_result: Outcome,
    pub tool_context: EvaluationContext,
}

impl ToolEnvelope {
    pub fn from_reply(reply: &DispatchReply) -> Result<Self, ProtocolError> {
        let response = match &reply.response {
            Value::String(raw) => match serde_json::from_str::<Value>(raw) {
                Ok(parsed @ Value::Object(_)) => parsed,
                _ if !reply.success => return Err(ProtocolError::DispatchFailed(raw.clone())),
                _ => return Err(ProtocolError::BareString(truncate(raw))),
            },
            other => other.clone(),
        };

        let Value::Object(mut fields) = response else {
            return Err(ProtocolError::Malformed(format!(
                "expected an object, got {}",
                kind_of(&reply.response)
            )));
        };

        let result = match fields.remove("toolExecutionResult") {
            Some(result) => result,
            None if !reply.success => return Err(ProtocolError::GenericFailure),
            None => return Err(ProtocolError::MissingField("toolExecutionResult")),
        };
        let context = fields
            .remove("toolContext")
            .ok_or(ProtocolError::MissingField("toolContext"))?;

        let tool_execution_result: Outcome = serde_json::from_value(result)
            .map_err(|e| ProtocolError::Malformed(format!("toolExecutionResult: {e}")))?;
        let tool_context: EvaluationContext = serde_json::from_value(context)
            .map_err(|e| ProtocolError::Malformed(format!("toolContext: {e}")))?;

        Ok(Self {
            tool_execution_result,
            tool_context,
        })
    }

    /// Wire form used by executors answering a dispatch.
    pub fn to_value(&self) -> Value {
        serde_json::json!({
            "toolExecutionResult": self.tool_execution_result,
            "toolContext": self.tool_context,
        })
    }
}

fn truncate(raw: &str) -> String {
    const MAX: usize = 200;
    match raw.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &raw[..idx]),
        None => raw.to_string(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    async fn dispatch(
        &self,
        session: &ExecutorSession,
        request: DispatchRequest,
    ) -> Result<DispatchReply, ExecutorError>;
}
