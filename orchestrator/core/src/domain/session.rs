// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Executor Session
//!
//! Authenticated session of the delegatee against the remote executor
//! network. One session is shared, read-mostly, by every invocation in the
//! process.
//!
//! ## Lifecycle
//!
//! ```text
//! SessionAuthenticator::authenticate(delegatee)
//!   └─ ExecutorSession::new(delegatee, credential, ttl)
//!         └─ needs_refresh_at(now, margin) ← checked on every access and by the sweep
//!         └─ replaced wholesale once it nears expiry
//! ```
//!
//! ## Invariants
//!
//! - A session is never mutated after creation. Renewal builds a new one and
//!   swaps the shared pointer, so in-flight dispatches keep the session they
//!   started with.
//! - `expires_at` is always after `created_at`.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Opaque identifier for one established executor session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Upper bound on any session lifetime, whatever the executor grants.
pub const MAX_SESSION_TTL_SECONDS: u64 = 30 * 24 * 60 * 60;

/// Convert a second count into a `Duration`, saturating at
/// [`MAX_SESSION_TTL_SECONDS`].
pub fn bounded_seconds(seconds: u64) -> Duration {
    let seconds = seconds.min(MAX_SESSION_TTL_SECONDS);
    i64::try_from(seconds)
        .ok()
        .and_then(Duration::try_seconds)
        .unwrap_or(Duration::zero())
}

/// Credential material returned by the executor network.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionGrant {
    pub credential: String,
    pub expires_in_seconds: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutorSession {
    pub id: SessionId,
    pub delegatee_address: String,
    pub credential: String,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ExecutorSession {
    pub fn new(delegatee_address: impl Into<String>, grant: SessionGrant) -> Self {
        Self::issued_at(delegatee_address, grant, Utc::now())
    }

    pub fn issued_at(
        delegatee_address: impl Into<String>,
        grant: SessionGrant,
        now: DateTime<Utc>,
    ) -> Self {
        // Zero-length grants still get a one second window.
        let ttl = bounded_seconds(grant.expires_in_seconds.max(1));
        Self {
            id: SessionId::new(),
            delegatee_address: delegatee_address.into(),
            credential: grant.credential,
            created_at: now,
            expires_at: now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC),
        }
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }

    /// True once `now` is within `margin` of expiry.
    pub fn needs_refresh_at(&self, now: DateTime<Utc>, margin: Duration) -> bool {
        now.checked_add_signed(margin)
            .is_none_or(|deadline| deadline >= self.expires_at)
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("executor authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("session manager is stopped")]
    Stopped,
}

/// Authenticates the delegatee against the executor network.
#[async_trait]
pub trait SessionAuthenticator: Send + Sync {
    async fn authenticate(&self, delegatee_address: &str) -> Result<SessionGrant, SessionError>;
}

/// Source of the current shared session.
#[async_trait]
pub trait SessionProvider: Send + Sync {
    async fn current_session(&self) -> Result<Arc<ExecutorSession>, SessionError>;
}
