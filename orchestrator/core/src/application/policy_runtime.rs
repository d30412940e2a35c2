// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Policy Runtime
//!
//! Runs one phase of one [`PolicyDefinition`] and returns a validated
//! [`PolicyVerdict`]. Failure is conservative: a handler error, a panic, or a
//! result that matches neither declared branch all become a deny carrying a
//! diagnostic. A missing phase is a vacuous allow.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::context::EvaluationContext;
use crate::domain::outcome::PolicyVerdict;
use crate::domain::policy::{
    PolicyDefinition, PolicyId, PolicyPhaseArgs, PolicyPhaseContext, PolicyPhaseKind,
};
use crate::domain::validation::{validate_or_deny, validate_verdict};

#[derive(Debug, Clone)]
pub struct PolicyRuntime {
    definition: Arc<PolicyDefinition>,
}

impl PolicyRuntime {
    pub fn new(definition: Arc<PolicyDefinition>) -> Self {
        Self { definition }
    }

    pub fn id(&self) -> &PolicyId {
        self.definition.id()
    }

    pub async fn precheck(
        &self,
        tool_params: Value,
        user_params: Option<Value>,
        context: &EvaluationContext,
        rpc_endpoint: Option<String>,
    ) -> PolicyVerdict {
        self.run_phase(PolicyPhaseKind::Precheck, tool_params, user_params, context, rpc_endpoint)
            .await
    }

    pub async fn evaluate(
        &self,
        tool_params: Value,
        user_params: Option<Value>,
        context: &EvaluationContext,
        rpc_endpoint: Option<String>,
    ) -> PolicyVerdict {
        self.run_phase(PolicyPhaseKind::Evaluate, tool_params, user_params, context, rpc_endpoint)
            .await
    }

    /// Run a precheck or evaluate phase.
    pub async fn run_phase(
        &self,
        kind: PolicyPhaseKind,
        tool_params: Value,
        user_params: Option<Value>,
        context: &EvaluationContext,
        rpc_endpoint: Option<String>,
    ) -> PolicyVerdict {
        let id = self.definition.id();
        let Some(phase) = self.definition.phase(kind) else {
            debug!(policy = %id, phase = %kind, "Phase not declared, allowing vacuously");
            return PolicyVerdict::allow_empty();
        };

        let tool_params = match validate_or_deny(tool_params, self.definition.params_schema()) {
            Ok(value) => value,
            Err(deny) => return deny,
        };
        let user_params = match self.check_user_params(user_params) {
            Ok(value) => value,
            Err(deny) => return deny,
        };

        let args = PolicyPhaseArgs {
            tool_params,
            user_params,
        };
        let ctx = PolicyPhaseContext::new(id.clone(), kind, context, rpc_endpoint);

        let outcome = AssertUnwindSafe(phase.handler().run(args, ctx))
            .catch_unwind()
            .await;
        match outcome {
            Ok(Ok(verdict)) => validate_verdict(verdict, &phase.schemas),
            Ok(Err(e)) => {
                warn!(policy = %id, phase = %kind, error = %e, "Policy phase failed");
                PolicyVerdict::deny_with_error(format!("{kind} phase of policy {id} failed: {e:#}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(policy = %id, phase = %kind, panic = %message, "Policy phase panicked");
                PolicyVerdict::deny_with_error(format!("{kind} phase of policy {id} panicked: {message}"))
            }
        }
    }

    /// Run the commit phase with parameters supplied by a tool body.
    pub async fn commit(&self, params: Value, context: &EvaluationContext) -> PolicyVerdict {
        let id = self.definition.id();
        let Some(commit) = self.definition.commit_phase() else {
            return PolicyVerdict::deny_with_error(format!("policy {id} does not declare a commit phase"));
        };

        let params = match validate_or_deny(params, &commit.params_schema) {
            Ok(value) => value,
            Err(deny) => return deny,
        };
        let ctx = PolicyPhaseContext::new(id.clone(), PolicyPhaseKind::Commit, context, None);

        match AssertUnwindSafe(commit.handler().commit(params, ctx))
            .catch_unwind()
            .await
        {
            Ok(Ok(verdict)) => validate_verdict(verdict, &commit.schemas),
            Ok(Err(e)) => {
                warn!(policy = %id, error = %e, "Policy commit failed");
                PolicyVerdict::deny_with_error(format!("commit phase of policy {id} failed: {e:#}"))
            }
            Err(panic) => {
                let message = panic_message(panic.as_ref());
                warn!(policy = %id, panic = %message, "Policy commit panicked");
                PolicyVerdict::deny_with_error(format!("commit phase of policy {id} panicked: {message}"))
            }
        }
    }

    fn check_user_params(&self, user_params: Option<Value>) -> Result<Option<Value>, PolicyVerdict> {
        match (self.definition.user_params_schema(), user_params) {
            (Some(schema), Some(value)) => validate_or_deny(value, schema).map(Some),
            (Some(_), None) => Err(PolicyVerdict::deny_with_error(format!(
                "policy {} requires user parameters but none are configured",
                self.definition.id()
            ))),
            (None, value) => Ok(value),
        }
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::schema::{ResultSchema, SchemaContract, VerdictSchemas};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn amount_schema() -> SchemaContract {
        SchemaContract::from_value(
            "spend params",
            json!({
                "type": "object",
                "properties": {"amount": {"type": "number"}},
                "required": ["amount"]
            }),
        )
        .unwrap()
    }

    fn reason_schemas() -> VerdictSchemas {
        VerdictSchemas::new(
            ResultSchema::NoValue,
            ResultSchema::value(
                SchemaContract::from_value(
                    "spend deny",
                    json!({"type": "object", "required": ["reason"]}),
                )
                .unwrap(),
            ),
        )
    }

    fn context() -> EvaluationContext {
        EvaluationContext::new("QmTool", "0xdelegatee")
    }

    fn limit_policy(calls: Arc<AtomicUsize>) -> PolicyRuntime {
        let definition = PolicyDefinition::builder("@p/spend")
            .params_schema(amount_schema())
            .user_params_schema(
                SchemaContract::from_value(
                    "spend user params",
                    json!({"type": "object", "required": ["max"]}),
                )
                .unwrap(),
            )
            .evaluate(reason_schemas(), move |args: PolicyPhaseArgs, ctx: PolicyPhaseContext| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    let amount = args.tool_params["amount"].as_f64().unwrap_or_default();
                    let max = args
                        .user_params
                        .as_ref()
                        .and_then(|p| p["max"].as_f64())
                        .unwrap_or_default();
                    if amount > max {
                        anyhow::Ok(ctx.deny(json!({"reason": "exceeds limit"})))
                    } else {
                        anyhow::Ok(ctx.allow_empty())
                    }
                }
            })
            .build()
            .unwrap();
        PolicyRuntime::new(Arc::new(definition))
    }

    #[tokio::test]
    async fn test_allow_and_deny() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runtime = limit_policy(calls.clone());

        let allow = runtime
            .evaluate(json!({"amount": 5}), Some(json!({"max": 10})), &context(), None)
            .await;
        assert!(allow.is_allow());

        let deny = runtime
            .evaluate(json!({"amount": 50}), Some(json!({"max": 10})), &context(), None)
            .await;
        assert!(deny.is_deny());
        assert_eq!(deny.result(), Some(&json!({"reason": "exceeds limit"})));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_invalid_params_deny_without_running() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runtime = limit_policy(calls.clone());

        let verdict = runtime
            .evaluate(json!({"amount": "lots"}), Some(json!({"max": 10})), &context(), None)
            .await;
        assert!(verdict.is_deny());
        assert!(verdict.error().unwrap().contains("spend params"));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_user_params_deny() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runtime = limit_policy(calls.clone());

        let verdict = runtime.evaluate(json!({"amount": 1}), None, &context(), None).await;
        assert!(verdict.is_deny());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_missing_phase_allows_vacuously() {
        let calls = Arc::new(AtomicUsize::new(0));
        let runtime = limit_policy(calls);
        let verdict = runtime
            .precheck(json!({"amount": 1_000}), None, &context(), None)
            .await;
        assert_eq!(verdict, PolicyVerdict::allow_empty());
    }

    #[tokio::test]
    async fn test_handler_error_and_panic_deny() {
        let definition = PolicyDefinition::builder("@p/flaky")
            .params_schema(amount_schema())
            .precheck(VerdictSchemas::none(), |_args: PolicyPhaseArgs, _ctx: PolicyPhaseContext| async move {
                Err::<PolicyVerdict, _>(anyhow::anyhow!("rpc unavailable"))
            })
            .evaluate(VerdictSchemas::none(), |args: PolicyPhaseArgs, ctx: PolicyPhaseContext| async move {
                if args.tool_params["amount"].as_f64() == Some(13.0) {
                    panic!("unlucky");
                }
                anyhow::Ok(ctx.allow_empty())
            })
            .build()
            .unwrap();
        let runtime = PolicyRuntime::new(Arc::new(definition));

        let errored = runtime.precheck(json!({"amount": 1}), None, &context(), None).await;
        assert!(errored.is_deny());
        assert!(errored.error().unwrap().contains("rpc unavailable"));

        let panicked = runtime.evaluate(json!({"amount": 13}), None, &context(), None).await;
        assert!(panicked.is_deny());
        assert!(panicked.error().unwrap().contains("unlucky"));
    }

    #[tokio::test]
    async fn test_deny_not_matching_schema_still_denies() {
        let definition = PolicyDefinition::builder("@p/sloppy")
            .params_schema(amount_schema())
            .evaluate(reason_schemas(), |_args: PolicyPhaseArgs, ctx: PolicyPhaseContext| async move {
                anyhow::Ok(ctx.deny(json!({"why": "no reason field"})))
            })
            .build()
            .unwrap();
        let verdict = PolicyRuntime::new(Arc::new(definition))
            .evaluate(json!({"amount": 1}), None, &context(), None)
            .await;
        assert!(verdict.is_deny());
        assert!(verdict.result().is_none());
    }

    #[tokio::test]
    async fn test_commit_validates_params() {
        let definition = PolicyDefinition::builder("@p/spend")
            .params_schema(amount_schema())
            .commit(
                amount_schema(),
                VerdictSchemas::none(),
                |_params: Value, ctx: PolicyPhaseContext| async move { anyhow::Ok(ctx.allow_empty()) },
            )
            .build()
            .unwrap();
        let runtime = PolicyRuntime::new(Arc::new(definition));

        assert!(runtime.commit(json!({"amount": 2}), &context()).await.is_allow());
        assert!(runtime.commit(json!({}), &context()).await.is_deny());
    }
}
