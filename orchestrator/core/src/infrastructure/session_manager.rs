// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Executor Session Manager
//!
//! Process-wide cache of the delegatee's executor session.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** `SessionProvider` with an explicit `start()`/`stop()` lifecycle
//! - **Integration:** `SessionAuthenticator` → `ExecutorSessionManager` → `ToolClient`
//!
//! Reads take a shared lock and clone the `Arc`. Establishment is single-flight
//! and replaces the cached session wholesale, so an in-flight dispatch keeps
//! the session it started with. A background sweep drops expired sessions.

use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use async_trait::async_trait;

use crate::domain::client_config::SessionConfig;
use crate::domain::session::{
    bounded_seconds, ExecutorSession, SessionAuthenticator, SessionError, SessionGrant,
    SessionProvider,
};

pub struct ExecutorSessionManager {
    authenticator: Arc<dyn SessionAuthenticator>,
    delegatee_address: String,
    config: SessionConfig,
    current: RwLock<Option<Arc<ExecutorSession>>>,
    establishing: Mutex<()>,
    shutdown_token: CancellationToken,
}

impl ExecutorSessionManager {
    pub fn new(
        authenticator: Arc<dyn SessionAuthenticator>,
        delegatee_address: impl Into<String>,
        config: SessionConfig,
    ) -> Self {
        Self {
            authenticator,
            delegatee_address: delegatee_address.into(),
            config,
            current: RwLock::new(None),
            establishing: Mutex::new(()),
            shutdown_token: CancellationToken::new(),
        }
    }

    /// Spawn the background sweep. Runs until `stop()` is called.
    pub fn start(self: Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(async move {
            self.run_sweep().await;
        })
    }

    /// Stop the sweep and drop the cached session. Later requests fail with
    /// `SessionError::Stopped`.
    pub fn stop(&self) {
        self.shutdown_token.cancel();
        self.current.write().take();
        info!(delegatee = %self.delegatee_address, "Executor session manager stopped");
    }

    pub fn is_stopped(&self) -> bool {
        self.shutdown_token.is_cancelled()
    }

    /// Forget the cached session; the next request re-authenticates.
    pub fn invalidate(&self) {
        if self.current.write().take().is_some() {
            debug!(delegatee = %self.delegatee_address, "Executor session invalidated");
        }
    }

    pub fn snapshot(&self) -> Option<Arc<ExecutorSession>> {
        self.current.read().clone()
    }

    /// Drop the cached session if it has expired. Returns true when dropped.
    pub fn sweep_expired(&self) -> bool {
        let now = Utc::now();
        let mut current = self.current.write();
        if current.as_ref().is_some_and(|session| session.is_expired_at(now)) {
            current.take();
            return true;
        }
        false
    }

    async fn run_sweep(&self) {
        info!(
            delegatee = %self.delegatee_address,
            interval_seconds = self.config.sweep_interval_seconds,
            "Starting executor session sweep"
        );

        let mut tick = interval(std::time::Duration::from_secs(
            self.config.sweep_interval_seconds.max(1),
        ));

        loop {
            tokio::select! {
                _ = tick.tick() => {
                    if self.sweep_expired() {
                        debug!(delegatee = %self.delegatee_address, "Swept expired executor session");
                    }
                }
                _ = self.shutdown_token.cancelled() => {
                    break;
                }
            }
        }

        debug!("Executor session sweep stopped");
    }

    fn usable(&self, session: &ExecutorSession) -> bool {
        let lifetime = session.expires_at - session.created_at;
        // Short grants refresh at half-life instead of immediately.
        let margin = bounded_seconds(self.config.refresh_margin_seconds).min(lifetime / 2);
        !session.needs_refresh_at(Utc::now(), margin)
    }

    fn cached(&self) -> Option<Arc<ExecutorSession>> {
        self.current
            .read()
            .as_ref()
            .filter(|session| self.usable(session))
            .cloned()
    }

    async fn establish(&self) -> Result<Arc<ExecutorSession>, SessionError> {
        let grant = self
            .authenticator
            .authenticate(&self.delegatee_address)
            .await
            .inspect_err(|e| warn!(delegatee = %self.delegatee_address, error = %e, "Executor authentication failed"))?;

        let grant = SessionGrant {
            expires_in_seconds: grant.expires_in_seconds.min(self.config.ttl_seconds),
            ..grant
        };
        let session = Arc::new(ExecutorSession::new(self.delegatee_address.clone(), grant));
        *self.current.write() = Some(session.clone());

        metrics::counter!("warrant_executor_sessions_established_total").increment(1);
        info!(
            delegatee = %self.delegatee_address,
            session = %session.id,
            expires_at = %session.expires_at,
            "Executor session established"
        );
        Ok(session)
    }
}

#[async_trait]
impl SessionProvider for ExecutorSessionManager {
    async fn current_session(&self) -> Result<Arc<ExecutorSession>, SessionError> {
        if self.is_stopped() {
            return Err(SessionError::Stopped);
        }
        if let Some(session) = self.cached() {
            return Ok(session);
        }

        let _guard = self.establishing.lock().await;
        // Another caller may have refreshed while we waited.
        if let Some(session) = self.cached() {
            return Ok(session);
        }
        if self.is_stopped() {
            return Err(SessionError::Stopped);
        }
        self.establish().await
    }
}
