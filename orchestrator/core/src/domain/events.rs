// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::policy::{PolicyId, PolicyPhaseKind};

/// Policy verdicts reached during an invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PolicyEvent {
    PolicyAllowed {
        tool_ipfs_cid: String,
        policy_id: PolicyId,
        phase: String,
        allowed_at: DateTime<Utc>,
    },
    PolicyDenied {
        tool_ipfs_cid: String,
        policy_id: PolicyId,
        phase: String,
        reason: Option<String>,
        denied_at: DateTime<Utc>,
    },
}

impl PolicyEvent {
    pub fn allowed(tool_ipfs_cid: &str, policy_id: &PolicyId, phase: PolicyPhaseKind) -> Self {
        Self::PolicyAllowed {
            tool_ipfs_cid: tool_ipfs_cid.to_string(),
            policy_id: policy_id.clone(),
            phase: phase.as_str().to_string(),
            allowed_at: Utc::now(),
        }
    }

    pub fn denied(
        tool_ipfs_cid: &str,
        policy_id: &PolicyId,
        phase: PolicyPhaseKind,
        reason: Option<String>,
    ) -> Self {
        Self::PolicyDenied {
            tool_ipfs_cid: tool_ipfs_cid.to_string(),
            policy_id: policy_id.clone(),
            phase: phase.as_str().to_string(),
            reason,
            denied_at: Utc::now(),
        }
    }
}

/// Remote dispatch lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ToolEvent {
    ToolDispatched {
        tool_ipfs_cid: String,
        dispatched_at: DateTime<Utc>,
    },
    ToolCompleted {
        tool_ipfs_cid: String,
        success: bool,
        completed_at: DateTime<Utc>,
    },
    ProtocolViolation {
        tool_ipfs_cid: String,
        details: String,
        detected_at: DateTime<Utc>,
    },
}
