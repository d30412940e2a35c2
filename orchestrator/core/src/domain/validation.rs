// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Decoding and validation helpers.
//!
//! These are the only places a schema violation is turned into a value of the
//! result algebra. Everything downstream assumes validation already happened.

use serde_json::Value;

use crate::domain::outcome::{Outcome, PolicyVerdict};
use crate::domain::schema::{OutcomeSchemas, SchemaContract, VerdictSchemas};

/// `Ok(value)` if it validates, otherwise the failure branch carrying the
/// violation message.
pub fn validate_or_fail(value: Value, schema: &SchemaContract) -> Result<Value, Outcome> {
    match schema.validate(&value) {
        Ok(()) => Ok(value),
        Err(violation) => Err(Outcome::failure_message(violation.to_string())),
    }
}

/// Same as [`validate_or_fail`], for policy phases.
pub fn validate_or_deny(value: Value, schema: &SchemaContract) -> Result<Value, PolicyVerdict> {
    match schema.validate(&value) {
        Ok(()) => Ok(value),
        Err(violation) => Err(PolicyVerdict::deny_with_error(violation.to_string())),
    }
}

/// Check an outcome against the schema its own tag selects. A success that
/// does not match becomes a failure; the payload is never kept on a
/// mismatched branch.
pub fn validate_outcome(outcome: Outcome, schemas: &OutcomeSchemas) -> Outcome {
    match &outcome {
        Outcome::Success { result } => match schemas.success.check("success", result.as_ref()) {
            Ok(()) => outcome,
            Err(violation) => Outcome::failure_message(format!("invalid success result: {violation}")),
        },
        Outcome::Failure { result, error } => match schemas.failure.check("failure", result.as_ref()) {
            Ok(()) => outcome,
            Err(violation) => Outcome::failure_message(with_original(error.as_deref(), &violation.to_string())),
        },
    }
}

/// Policy counterpart of [`validate_outcome`]. An invalid allow becomes a deny.
pub fn validate_verdict(verdict: PolicyVerdict, schemas: &VerdictSchemas) -> PolicyVerdict {
    match &verdict {
        PolicyVerdict::Allow { result } => match schemas.allow.check("allow", result.as_ref()) {
            Ok(()) => verdict,
            Err(violation) => PolicyVerdict::deny_with_error(format!("invalid allow result: {violation}")),
        },
        PolicyVerdict::Deny { result, error } => match schemas.deny.check("deny", result.as_ref()) {
            Ok(()) => verdict,
            Err(violation) => PolicyVerdict::deny_with_error(with_original(error.as_deref(), &violation.to_string())),
        },
    }
}

fn with_original(original: Option<&str>, violation: &str) -> String {
    match original {
        Some(error) => format!("{error} (result did not match declared schema: {violation})"),
        None => format!("result did not match declared schema: {violation}"),
    }
}
