// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Delegation Registry - consumed boundary
//!
//! Who may act for whom, and which policies a delegator configured for a tool:
//! - Delegator identity record (PKP token, wallet address, public key)
//! - Per-tool policy resolution (app id/version, ordered configured policies)
//! - Stored user parameters as they arrive from the registry
//!
//! Always re-resolved per invocation. Nothing here is cached.

use async_trait::async_trait;
use base64::Engine;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use thiserror::Error;

use crate::domain::policy::PolicyId;

/// Opaque delegator identity as supplied by the caller (usually a PKP eth address).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DelegatorIdentity(String);

impl DelegatorIdentity {
    pub fn new(identity: impl Into<String>) -> Self {
        Self(identity.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DelegatorIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DelegatorIdentity {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Delegator's wallet identity record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PkpInfo {
    pub token_id: String,
    pub eth_address: String,
    pub public_key: String,
}

/// Application and version the delegator permitted the delegatee under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppRef {
    pub app_id: u64,
    pub app_version: u32,
}

/// Policies configured for one tool + delegator + app version, in evaluation order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolPolicyResolution {
    pub app_id: u64,
    pub app_version: u32,
    #[serde(default)]
    pub policies: Vec<ConfiguredPolicy>,
}

impl ToolPolicyResolution {
    pub fn app(&self) -> AppRef {
        AppRef {
            app_id: self.app_id,
            app_version: self.app_version,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfiguredPolicy {
    pub policy_id: PolicyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub configured_parameters: Option<StoredParameters>,
}

/// User-configured policy parameters as stored by the registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "encoding", content = "data", rename_all = "kebab-case")]
pub enum StoredParameters {
    /// Plain JSON document.
    Json(Value),
    /// Standard base64 of a UTF-8 JSON document.
    Base64Json(String),
}

#[derive(Debug, Error)]
pub enum ParameterDecodeError {
    #[error("stored parameters are not valid base64: {0}")]
    Base64(#[from] base64::DecodeError),

    #[error("stored parameters are not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl StoredParameters {
    pub fn decode(&self) -> Result<Value, ParameterDecodeError> {
        match self {
            Self::Json(value) => Ok(value.clone()),
            Self::Base64Json(encoded) => {
                let bytes = base64::engine::general_purpose::STANDARD.decode(encoded.trim())?;
                Ok(serde_json::from_slice(&bytes)?)
            }
        }
    }
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("{0} not found in delegation registry")]
    NotFound(String),

    #[error("not permitted: {0}")]
    NotPermitted(String),

    #[error("registry transport error: {0}")]
    Transport(String),

    #[error("registry returned unexpected status {status}: {body}")]
    Unexpected { status: u16, body: String },

    #[error("registry returned a malformed body: {0}")]
    Malformed(String),
}

/// Read-only view of the on-chain delegation registry.
#[async_trait]
pub trait DelegationRegistry: Send + Sync {
    async fn resolve_delegator(&self, delegator: &DelegatorIdentity)
        -> Result<PkpInfo, RegistryError>;

    async fn resolve_tool_policies(
        &self,
        delegator: &DelegatorIdentity,
        tool_ipfs_cid: &str,
    ) -> Result<ToolPolicyResolution, RegistryError>;
}
