// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Evaluation Context
//!
//! Per-invocation, immutable context threaded through every phase and handed
//! to the remote executor. Each `with_*` method consumes the context and
//! returns an extended copy; nothing mutates a context in place.
//!
//! ## PoliciesContext invariants
//!
//! - `evaluated_policies` is exactly the prefix of the configured policy list
//!   that was run.
//! - A denial halts evaluation: the denier is the last evaluated entry and
//!   every earlier entry is in `allowed_policies`.
//! - `allow == true` iff there is no `denied_policy`.
//!
//! [`PolicyEvaluationTrace`] is the only way to build one outside of
//! deserialization, which enforces the same invariants.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::delegation::{AppRef, PkpInfo};
use crate::domain::policy::PolicyId;

/// Who is acting for whom.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DelegationContext {
    pub delegatee_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delegator_pkp_info: Option<PkpInfo>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluationContext {
    pub tool_ipfs_cid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app: Option<AppRef>,
    pub delegation: DelegationContext,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub policies_context: Option<PoliciesContext>,
}

impl EvaluationContext {
    pub fn new(tool_ipfs_cid: impl Into<String>, delegatee_address: impl Into<String>) -> Self {
        Self {
            tool_ipfs_cid: tool_ipfs_cid.into(),
            app: None,
            delegation: DelegationContext {
                delegatee_address: delegatee_address.into(),
                delegator_pkp_info: None,
            },
            policies_context: None,
        }
    }

    pub fn with_delegator(mut self, pkp: PkpInfo) -> Self {
        self.delegation.delegator_pkp_info = Some(pkp);
        self
    }

    pub fn with_app(mut self, app: AppRef) -> Self {
        self.app = Some(app);
        self
    }

    pub fn with_policies(mut self, policies: PoliciesContext) -> Self {
        self.policies_context = Some(policies);
        self
    }
}

/// Allow result recorded for a policy that did not deny.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AllowedPolicy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeniedPolicy {
    pub package_name: PolicyId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Aggregated outcome of running a tool's configured policies in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PoliciesContextWire", into = "PoliciesContextWire")]
pub enum PoliciesContext {
    Allowed {
        evaluated_policies: Vec<PolicyId>,
        allowed_policies: BTreeMap<PolicyId, AllowedPolicy>,
    },
    Denied {
        evaluated_policies: Vec<PolicyId>,
        allowed_policies: BTreeMap<PolicyId, AllowedPolicy>,
        denied_policy: DeniedPolicy,
    },
}

impl PoliciesContext {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }

    pub fn evaluated_policies(&self) -> &[PolicyId] {
        match self {
            Self::Allowed {
                evaluated_policies, ..
            }
            | Self::Denied {
                evaluated_policies, ..
            } => evaluated_policies,
        }
    }

    pub fn allowed_policies(&self) -> &BTreeMap<PolicyId, AllowedPolicy> {
        match self {
            Self::Allowed {
                allowed_policies, ..
            }
            | Self::Denied {
                allowed_policies, ..
            } => allowed_policies,
        }
    }

    pub fn denied_policy(&self) -> Option<&DeniedPolicy> {
        match self {
            Self::Allowed { .. } => None,
            Self::Denied { denied_policy, .. } => Some(denied_policy),
        }
    }

    pub fn is_policy_allowed(&self, id: &PolicyId) -> bool {
        self.allowed_policies().contains_key(id)
    }

    /// Allow result recorded for `id`, if that policy allowed with a payload.
    pub fn allow_result(&self, id: &PolicyId) -> Option<&Value> {
        self.allowed_policies()
            .get(id)
            .and_then(|allowed| allowed.result.as_ref())
    }

    /// Runtime lookup of a policy's allow result decoded into a known shape.
    pub fn allow_result_as<T: DeserializeOwned>(
        &self,
        id: &PolicyId,
    ) -> Option<Result<T, serde_json::Error>> {
        self.allow_result(id)
            .map(|value| serde_json::from_value(value.clone()))
    }
}

#[derive(Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PoliciesContextWire {
    allow: bool,
    evaluated_policies: Vec<PolicyId>,
    #[serde(default)]
    allowed_policies: BTreeMap<PolicyId, AllowedPolicy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    denied_policy: Option<DeniedPolicy>,
}

impl TryFrom<PoliciesContextWire> for PoliciesContext {
    type Error = String;

    fn try_from(wire: PoliciesContextWire) -> Result<Self, Self::Error> {
        match (wire.allow, wire.denied_policy) {
            (true, None) => Ok(PoliciesContext::Allowed {
                evaluated_policies: wire.evaluated_policies,
                allowed_policies: wire.allowed_policies,
            }),
            (false, Some(denied_policy)) => {
                if wire.evaluated_policies.last() != Some(&denied_policy.package_name) {
                    return Err(format!(
                        "denied policy {} must be the last evaluated policy",
                        denied_policy.package_name
                    ));
                }
                Ok(PoliciesContext::Denied {
                    evaluated_policies: wire.evaluated_policies,
                    allowed_policies: wire.allowed_policies,
                    denied_policy,
                })
            }
            (true, Some(_)) => Err("allowed policies context cannot carry a denied policy".into()),
            (false, None) => Err("denied policies context is missing deniedPolicy".into()),
        }
    }
}

impl From<PoliciesContext> for PoliciesContextWire {
    fn from(context: PoliciesContext) -> Self {
        match context {
            PoliciesContext::Allowed {
                evaluated_policies,
                allowed_policies,
            } => PoliciesContextWire {
                allow: true,
                evaluated_policies,
                allowed_policies,
                denied_policy: None,
            },
            PoliciesContext::Denied {
                evaluated_policies,
                allowed_policies,
                denied_policy,
            } => PoliciesContextWire {
                allow: false,
                evaluated_policies,
                allowed_policies,
                denied_policy: Some(denied_policy),
            },
        }
    }
}

/// Accumulates policy verdicts in evaluation order.
#[derive(Debug, Default)]
pub struct PolicyEvaluationTrace {
    evaluated: Vec<PolicyId>,
    allowed: BTreeMap<PolicyId, AllowedPolicy>,
}

impl PolicyEvaluationTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_allow(&mut self, id: PolicyId, result: Option<Value>) {
        self.evaluated.push(id.clone());
        self.allowed.insert(id, AllowedPolicy { result });
    }

    /// Record the denier and close the trace.
    pub fn deny(
        mut self,
        id: PolicyId,
        result: Option<Value>,
        error: Option<String>,
    ) -> PoliciesContext {
        self.evaluated.push(id.clone());
        PoliciesContext::Denied {
            evaluated_policies: self.evaluated,
            allowed_policies: self.allowed,
            denied_policy: DeniedPolicy {
                package_name: id,
                result,
                error,
            },
        }
    }

    pub fn finish(self) -> PoliciesContext {
        PoliciesContext::Allowed {
            evaluated_policies: self.evaluated,
            allowed_policies: self.allowed,
        }
    }
}
