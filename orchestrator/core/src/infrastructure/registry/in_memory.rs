// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::domain::delegation::{
    DelegationRegistry, DelegatorIdentity, PkpInfo, RegistryError, ToolPolicyResolution,
};

/// In-memory delegation registry. Counts every lookup so callers can assert
/// on network-equivalent traffic.
#[derive(Default)]
pub struct InMemoryDelegationRegistry {
    delegators: DashMap<DelegatorIdentity, PkpInfo>,
    tool_policies: DashMap<(DelegatorIdentity, String), ToolPolicyResolution>,
    revoked: DashSet<DelegatorIdentity>,
    calls: AtomicUsize,
}

impl InMemoryDelegationRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert_delegator(&self, delegator: DelegatorIdentity, pkp: PkpInfo) {
        self.delegators.insert(delegator, pkp);
    }

    /// Insert or replace the policies configured for a tool.
    pub fn insert_tool_policies(
        &self,
        delegator: DelegatorIdentity,
        tool_ipfs_cid: impl Into<String>,
        resolution: ToolPolicyResolution,
    ) {
        self.tool_policies
            .insert((delegator, tool_ipfs_cid.into()), resolution);
    }

    /// Subsequent lookups for this delegator fail with `NotPermitted`.
    pub fn revoke(&self, delegator: DelegatorIdentity) {
        self.revoked.insert(delegator);
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn check_permitted(&self, delegator: &DelegatorIdentity) -> Result<(), RegistryError> {
        if self.revoked.contains(delegator) {
            return Err(RegistryError::NotPermitted(format!(
                "delegator {delegator} revoked this delegatee"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl DelegationRegistry for InMemoryDelegationRegistry {
    async fn resolve_delegator(
        &self,
        delegator: &DelegatorIdentity,
    ) -> Result<PkpInfo, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_permitted(delegator)?;
        self.delegators
            .get(delegator)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| RegistryError::NotFound(format!("delegator {delegator}")))
    }

    async fn resolve_tool_policies(
        &self,
        delegator: &DelegatorIdentity,
        tool_ipfs_cid: &str,
    ) -> Result<ToolPolicyResolution, RegistryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.check_permitted(delegator)?;
        self.tool_policies
            .get(&(delegator.clone(), tool_ipfs_cid.to_string()))
            .map(|entry| entry.value().clone())
            .ok_or_else(|| {
                RegistryError::NotFound(format!(
                    "tool {tool_ipfs_cid} is not permitted for delegator {delegator}"
                ))
            })
    }
}
