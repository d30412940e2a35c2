// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! HTTP executor client
//!
//! | Route | Request | Reply |
//! |-------|---------|-------|
//! | `POST /dispatch` | `DispatchRequest`, `Authorization: Bearer <credential>` | `DispatchReply` |
//! | `POST /session` | `{"delegatee": ..}` | `SessionGrant` |
//!
//! No retries: a failed dispatch is surfaced to the caller as-is.

use async_trait::async_trait;
use reqwest::{Client, Url};
use serde_json::json;
use std::time::Duration;
use tracing::debug;

use crate::domain::executor::{DispatchReply, DispatchRequest, ExecutorError, RemoteExecutor};
use crate::domain::session::{ExecutorSession, SessionAuthenticator, SessionError, SessionGrant};

fn endpoint_url(endpoint: &str, route: &str) -> anyhow::Result<Url> {
    let mut url = Url::parse(endpoint)?;
    url.path_segments_mut()
        .map_err(|_| anyhow::anyhow!("executor endpoint '{}' cannot be used as a base URL", endpoint))?
        .pop_if_empty()
        .push(route);
    Ok(url)
}

pub struct HttpRemoteExecutor {
    dispatch_url: Url,
    client: Client,
    timeout: Duration,
}

impl HttpRemoteExecutor {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            dispatch_url: endpoint_url(endpoint, "dispatch")?,
            client: Client::builder().timeout(timeout).build()?,
            timeout,
        })
    }
}

#[async_trait]
impl RemoteExecutor for HttpRemoteExecutor {
    async fn dispatch(
        &self,
        session: &ExecutorSession,
        request: DispatchRequest,
    ) -> Result<DispatchReply, ExecutorError> {
        debug!(code_reference = %request.code_reference, session = %session.id, "Dispatching to executor");
        let response = self
            .client
            .post(self.dispatch_url.clone())
            .bearer_auth(&session.credential)
            .json(&request)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ExecutorError::Timeout(self.timeout.as_secs())
                } else {
                    ExecutorError::Transport(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ExecutorError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExecutorError::Transport(e.to_string()))?;
        serde_json::from_slice(&bytes).map_err(|e| ExecutorError::InvalidReply(e.to_string()))
    }
}

/// Obtains session credentials from the executor network.
pub struct HttpSessionAuthenticator {
    session_url: Url,
    client: Client,
}

impl HttpSessionAuthenticator {
    pub fn new(endpoint: &str, timeout: Duration) -> anyhow::Result<Self> {
        Ok(Self {
            session_url: endpoint_url(endpoint, "session")?,
            client: Client::builder().timeout(timeout).build()?,
        })
    }
}

#[async_trait]
impl SessionAuthenticator for HttpSessionAuthenticator {
    async fn authenticate(&self, delegatee_address: &str) -> Result<SessionGrant, SessionError> {
        let response = self
            .client
            .post(self.session_url.clone())
            .json(&json!({ "delegatee": delegatee_address }))
            .send()
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::AuthenticationFailed(format!(
                "executor answered {status}: {body}"
            )));
        }

        response
            .json::<SessionGrant>()
            .await
            .map_err(|e| SessionError::AuthenticationFailed(e.to_string()))
    }
}
