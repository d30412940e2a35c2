// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP Delegation Registry Client
//!
//! Reads delegation records from the registry REST service.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** `DelegationRegistry` over HTTP
//! - **Integration:** Registry service → `PolicyEvaluator`
//!
//! | Route | Body |
//! |-------|------|
//! | `GET /delegators/{identity}` | `PkpInfo` |
//! | `GET /delegators/{identity}/tools/{cid}/policies` | `ToolPolicyResolution` |

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::debug;

use crate::domain::delegation::{
    DelegationRegistry, DelegatorIdentity, PkpInfo, RegistryError, ToolPolicyResolution,
};

pub struct HttpDelegationRegistry {
    base_url: Url,
    client: Client,
}

impl HttpDelegationRegistry {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = Url::parse(endpoint)?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("registry endpoint '{}' cannot be used as a base URL", endpoint);
        }
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self { base_url, client })
    }

    fn url(&self, segments: &[&str]) -> Result<Url, RegistryError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| RegistryError::Transport(format!("invalid registry endpoint {}", self.base_url)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url, subject: &str) -> Result<T, RegistryError> {
        debug!(url = %url, "Registry lookup");
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(match status {
                StatusCode::NOT_FOUND => RegistryError::NotFound(subject.to_string()),
                StatusCode::FORBIDDEN => RegistryError::NotPermitted(if body.is_empty() {
                    subject.to_string()
                } else {
                    body
                }),
                other => RegistryError::Unexpected {
                    status: other.as_u16(),
                    body,
                },
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| RegistryError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| RegistryError::Malformed(e.to_string()))
    }
}

#[async_trait]
impl DelegationRegistry for HttpDelegationRegistry {
    async fn resolve_delegator(
        &self,
        delegator: &DelegatorIdentity,
    ) -> Result<PkpInfo, RegistryError> {
        let url = self.url(&["delegators", delegator.as_str()])?;
        self.get_json(url, &format!("delegator {delegator}")).await
    }

    async fn resolve_tool_policies(
        &self,
        delegator: &DelegatorIdentity,
        tool_ipfs_cid: &str,
    ) -> Result<ToolPolicyResolution, RegistryError> {
        let url = self.url(&["delegators", delegator.as_str(), "tools", tool_ipfs_cid, "policies"])?;
        self.get_json(url, &format!("tool {tool_ipfs_cid} for delegator {delegator}"))
            .await
    }
}
