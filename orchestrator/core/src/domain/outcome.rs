// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Result Algebra
//!
//! A small closed set of tagged outcomes shared by every phase and component.
//!
//! | Tag | Payload present | Payload absent |
//! |-----|-----------------|----------------|
//! | success / allow | `Success { result: Some(_) }` | `Success { result: None }` |
//! | failure / deny | `Failure { result: Some(_), .. }` | `Failure { result: None, error }` |
//!
//! The tag is the single source of truth for branching. Type guards
//! (`is_success`, `is_allow`, ...) look at the tag only; whether a payload may
//! be present is a schema-level declaration checked by
//! [`crate::domain::validation`].
//!
//! On the wire both algebras serialize as flat objects:
//! `{"success": bool, "result"?: .., "error"?: ".."}` and
//! `{"allow": bool, "result"?: .., "error"?: ".."}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::context::EvaluationContext;

/// Tagged result of a tool phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "OutcomeWire", into = "OutcomeWire")]
pub enum Outcome {
    Success {
        result: Option<Value>,
    },
    Failure {
        result: Option<Value>,
        error: Option<String>,
    },
}

impl Outcome {
    pub fn success(result: Value) -> Self {
        Self::Success {
            result: Some(result),
        }
    }

    pub fn success_empty() -> Self {
        Self::Success { result: None }
    }

    pub fn failure(result: Value, error: Option<String>) -> Self {
        Self::Failure {
            result: Some(result),
            error,
        }
    }

    /// Failure with no payload, carrying only a diagnostic message.
    pub fn failure_message(error: impl Into<String>) -> Self {
        Self::Failure {
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failure { .. })
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Success { result } | Self::Failure { result, .. } => result.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success { .. } => None,
            Self::Failure { error, .. } => error.as_deref(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct OutcomeWire {
    success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<OutcomeWire> for Outcome {
    fn from(wire: OutcomeWire) -> Self {
        if wire.success {
            Outcome::Success {
                result: wire.result,
            }
        } else {
            Outcome::Failure {
                result: wire.result,
                error: wire.error,
            }
        }
    }
}

impl From<Outcome> for OutcomeWire {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success { result } => OutcomeWire {
                success: true,
                result,
                error: None,
            },
            Outcome::Failure { result, error } => OutcomeWire {
                success: false,
                result,
                error,
            },
        }
    }
}

/// Tagged result of a policy phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "VerdictWire", into = "VerdictWire")]
pub enum PolicyVerdict {
    Allow {
        result: Option<Value>,
    },
    Deny {
        result: Option<Value>,
        error: Option<String>,
    },
}

impl PolicyVerdict {
    pub fn allow(result: Value) -> Self {
        Self::Allow {
            result: Some(result),
        }
    }

    pub fn allow_empty() -> Self {
        Self::Allow { result: None }
    }

    pub fn deny(result: Value) -> Self {
        Self::Deny {
            result: Some(result),
            error: None,
        }
    }

    /// Schema-less deny carrying only a diagnostic.
    pub fn deny_with_error(error: impl Into<String>) -> Self {
        Self::Deny {
            result: None,
            error: Some(error.into()),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow { .. })
    }

    pub fn is_deny(&self) -> bool {
        matches!(self, Self::Deny { .. })
    }

    pub fn result(&self) -> Option<&Value> {
        match self {
            Self::Allow { result } | Self::Deny { result, .. } => result.as_ref(),
        }
    }

    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Allow { .. } => None,
            Self::Deny { error, .. } => error.as_deref(),
        }
    }
}

#[derive(Serialize, Deserialize)]
struct VerdictWire {
    allow: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl From<VerdictWire> for PolicyVerdict {
    fn from(wire: VerdictWire) -> Self {
        if wire.allow {
            PolicyVerdict::Allow {
                result: wire.result,
            }
        } else {
            PolicyVerdict::Deny {
                result: wire.result,
                error: wire.error,
            }
        }
    }
}

impl From<PolicyVerdict> for VerdictWire {
    fn from(verdict: PolicyVerdict) -> Self {
        match verdict {
            PolicyVerdict::Allow { result } => VerdictWire {
                allow: true,
                result,
                error: None,
            },
            PolicyVerdict::Deny { result, error } => VerdictWire {
                allow: false,
                result,
                error,
            },
        }
    }
}

/// What `precheck`/`execute` hand back to the caller: an [`Outcome`] plus the
/// [`EvaluationContext`] accumulated up to the point the invocation stopped.
///
/// Never mutated after construction. Re-wrapping with a richer context keeps
/// the outcome untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    #[serde(flatten)]
    pub outcome: Outcome,
    pub context: EvaluationContext,
}

impl Response {
    pub fn new(outcome: Outcome, context: EvaluationContext) -> Self {
        Self { outcome, context }
    }

    pub fn failure_message(error: impl Into<String>, context: EvaluationContext) -> Self {
        Self::new(Outcome::failure_message(error), context)
    }

    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn is_failure(&self) -> bool {
        self.outcome.is_failure()
    }

    pub fn result(&self) -> Option<&Value> {
        self.outcome.result()
    }

    /// Human-readable message; present on failures that carry one.
    pub fn message(&self) -> Option<&str> {
        self.outcome.error()
    }

    /// Attach a different context while keeping the outcome verbatim.
    pub fn with_context(self, context: EvaluationContext) -> Self {
        Self {
            outcome: self.outcome,
            context,
        }
    }
}
