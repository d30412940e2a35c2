// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Schema Contracts
//!
//! Vocabulary every other component validates against. A [`SchemaContract`]
//! is a compiled JSON Schema paired with a human-readable label used in
//! diagnostics. Phase results are described by [`ResultSchema`], which makes
//! "this branch returns nothing" an explicit, declared fact rather than a
//! convention inferred from a missing field.
//!
//! | Type | Describes |
//! |------|-----------|
//! | `SchemaContract` | One compiled schema (parameters, result payloads) |
//! | `ResultSchema` | `NoValue` or a payload contract for one branch of a phase |
//! | `VerdictSchemas` | Allow/deny branches of a policy phase |
//! | `OutcomeSchemas` | Success/failure branches of a tool phase |
//!
//! Contracts are built once, when a definition is constructed. Compilation
//! failures are programmer errors and surface as [`SchemaError`] from the
//! definition builders, never at call time.

use std::fmt;
use std::sync::Arc;

use jsonschema::Validator;
use schemars::JsonSchema;
use serde_json::Value;
use thiserror::Error;

/// Errors raised while composing policy or tool contracts.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid schema for {label}: {reason}")]
    InvalidSchema { label: String, reason: String },

    #[error("definition identity must not be empty")]
    EmptyIdentity,

    #[error("{0} is missing its parameter schema")]
    MissingParameterSchema(String),

    #[error("tool {0} does not declare an execute phase")]
    MissingExecutePhase(String),

    #[error("policy {0} is declared more than once on the same tool")]
    DuplicatePolicy(String),

    #[error("mapping for policy {policy} reads unknown tool parameter '{parameter}'")]
    UnknownToolParameter { policy: String, parameter: String },

    #[error("mapping for policy {policy} writes unknown policy parameter '{parameter}'")]
    UnknownPolicyParameter { policy: String, parameter: String },
}

/// A value failed validation against a [`SchemaContract`] or [`ResultSchema`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{label} failed validation: {}", .messages.join("; "))]
pub struct SchemaViolation {
    pub label: String,
    pub messages: Vec<String>,
}

impl SchemaViolation {
    pub fn new(label: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            messages: vec![message.into()],
        }
    }
}

/// A compiled JSON Schema. Cheap to clone; the compiled validator is shared.
#[derive(Clone)]
pub struct SchemaContract {
    label: String,
    raw: Arc<Value>,
    validator: Arc<Validator>,
}

impl SchemaContract {
    /// Compile a contract from a raw JSON Schema document.
    pub fn from_value(label: impl Into<String>, raw: Value) -> Result<Self, SchemaError> {
        let label = label.into();
        let validator = jsonschema::validator_for(&raw).map_err(|e| SchemaError::InvalidSchema {
            label: label.clone(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            label,
            raw: Arc::new(raw),
            validator: Arc::new(validator),
        })
    }

    /// Derive a contract from a Rust type.
    pub fn of<T: JsonSchema>(label: impl Into<String>) -> Result<Self, SchemaError> {
        let label = label.into();
        let root = schemars::schema_for!(T);
        let raw = serde_json::to_value(&root).map_err(|e| SchemaError::InvalidSchema {
            label: label.clone(),
            reason: e.to_string(),
        })?;
        Self::from_value(label, raw)
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn raw(&self) -> &Value {
        &self.raw
    }

    /// Names under the top-level `properties` keyword, if the schema declares any.
    pub fn property_names(&self) -> Option<Vec<&str>> {
        self.raw
            .get("properties")
            .and_then(Value::as_object)
            .map(|props| props.keys().map(String::as_str).collect())
    }

    pub fn validate(&self, value: &Value) -> Result<(), SchemaViolation> {
        let messages: Vec<String> = self
            .validator
            .iter_errors(value)
            .map(|err| err.to_string())
            .collect();

        if messages.is_empty() {
            Ok(())
        } else {
            Err(SchemaViolation {
                label: self.label.clone(),
                messages,
            })
        }
    }
}

impl fmt::Debug for SchemaContract {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchemaContract")
            .field("label", &self.label)
            .field("raw", &self.raw)
            .finish()
    }
}

/// Declared shape of one branch of a phase result.
#[derive(Debug, Clone, Default)]
pub enum ResultSchema {
    /// The branch returns no payload.
    #[default]
    NoValue,
    /// The branch returns a payload matching this contract.
    Value(SchemaContract),
}

impl ResultSchema {
    pub fn value(contract: SchemaContract) -> Self {
        Self::Value(contract)
    }

    pub fn declares_value(&self) -> bool {
        matches!(self, Self::Value(_))
    }

    /// Check a branch payload against the declaration.
    ///
    /// A payload on a `NoValue` branch is a violation, as is a missing payload
    /// on a branch that declares one.
    pub fn check(&self, branch: &str, result: Option<&Value>) -> Result<(), SchemaViolation> {
        match (self, result) {
            (Self::NoValue, None) => Ok(()),
            (Self::NoValue, Some(_)) => Err(SchemaViolation::new(
                branch,
                "branch declares no result value but one was returned",
            )),
            (Self::Value(contract), Some(value)) => contract.validate(value),
            (Self::Value(contract), None) => Err(SchemaViolation::new(
                contract.label(),
                "branch requires a result value but none was returned",
            )),
        }
    }
}

/// Allow/deny result declarations for one policy phase.
#[derive(Debug, Clone, Default)]
pub struct VerdictSchemas {
    pub allow: ResultSchema,
    pub deny: ResultSchema,
}

impl VerdictSchemas {
    pub fn new(allow: ResultSchema, deny: ResultSchema) -> Self {
        Self { allow, deny }
    }

    /// Both branches return nothing.
    pub fn none() -> Self {
        Self::default()
    }
}

/// Success/failure result declarations for one tool phase.
#[derive(Debug, Clone, Default)]
pub struct OutcomeSchemas {
    pub success: ResultSchema,
    pub failure: ResultSchema,
}

impl OutcomeSchemas {
    pub fn new(success: ResultSchema, failure: ResultSchema) -> Self {
        Self { success, failure }
    }

    pub fn none() -> Self {
        Self::default()
    }
}
