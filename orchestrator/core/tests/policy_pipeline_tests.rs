// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use warrant_core::application::tool_client::{ExecuteOptions, PrecheckOptions, ToolClient};
use warrant_core::domain::delegation::{
    ConfiguredPolicy, DelegatorIdentity, PkpInfo, StoredParameters, ToolPolicyResolution,
};
use warrant_core::domain::outcome::Response;
use warrant_core::domain::executor::{DispatchReply, DispatchRequest, ExecutorError, RemoteExecutor};
use warrant_core::domain::policy::{PolicyDefinition, PolicyId, PolicyPhaseArgs, PolicyPhaseContext};
use warrant_core::domain::schema::{OutcomeSchemas, ResultSchema, SchemaContract, VerdictSchemas};
use warrant_core::domain::session::{ExecutorSession, SessionError, SessionGrant, SessionProvider};
use warrant_core::domain::tool::{ParameterMapping, ToolDefinition};
use warrant_core::infrastructure::registry::InMemoryDelegationRegistry;

const DELEGATOR: &str = "0xdelegator";
const TOOL_CID: &str = "QmTransfer";

// ── Mocks ────────────────────────────────────────────────────────────────────

struct MockSessions;

#[async_trait]
impl SessionProvider for MockSessions {
    async fn current_session(&self) -> Result<Arc<ExecutorSession>, SessionError> {
        Ok(Arc::new(ExecutorSession::new(
            "0xdelegatee",
            SessionGrant {
                credential: "cred".to_string(),
                expires_in_seconds: 600,
            },
        )))
    }
}

struct MockExecutor {
    reply: DispatchReply,
    requests: Mutex<Vec<DispatchRequest>>,
}

impl MockExecutor {
    fn replying(success: bool, response: Value) -> Arc<Self> {
        Arc::new(Self {
            reply: DispatchReply { success, response },
            requests: Mutex::new(Vec::new()),
        })
    }

    fn dispatched(&self) -> usize {
        self.requests.lock().unwrap().len()
    }
}

#[async_trait]
impl RemoteExecutor for MockExecutor {
    async fn dispatch(
        &self,
        _session: &ExecutorSession,
        request: DispatchRequest,
    ) -> Result<DispatchReply, ExecutorError> {
        self.requests.lock().unwrap().push(request);
        Ok(self.reply.clone())
    }
}

// ── Fixtures ─────────────────────────────────────────────────────────────────

fn schema(label: &str, raw: Value) -> SchemaContract {
    SchemaContract::from_value(label, raw).unwrap()
}

fn policy_params() -> SchemaContract {
    schema(
        "policy params",
        json!({"type": "object", "properties": {"amountUsd": {"type": "number"}}}),
    )
}

/// Allows on both phases and counts how often it was invoked.
fn counting_allow(id: &str, calls: Arc<AtomicUsize>) -> Arc<PolicyDefinition> {
    let precheck_calls = calls.clone();
    Arc::new(
        PolicyDefinition::builder(id)
            .params_schema(policy_params())
            .precheck(VerdictSchemas::none(), move |_a: PolicyPhaseArgs, ctx: PolicyPhaseContext| {
                precheck_calls.fetch_add(1, Ordering::SeqCst);
                async move { anyhow::Ok(ctx.allow_empty()) }
            })
            .evaluate(VerdictSchemas::none(), move |_a: PolicyPhaseArgs, ctx: PolicyPhaseContext| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { anyhow::Ok(ctx.allow_empty()) }
            })
            .build()
            .unwrap(),
    )
}

/// Denies with a structured reason on both phases.
fn limit_deny(id: &str, calls: Arc<AtomicUsize>) -> Arc<PolicyDefinition> {
    let deny_schema = schema(
        "limit deny",
        json!({"type": "object", "properties": {"reason": {"type": "string"}}, "required": ["reason"]}),
    );
    let schemas = VerdictSchemas::new(ResultSchema::NoValue, ResultSchema::value(deny_schema));
    let precheck_calls = calls.clone();
    Arc::new(
        PolicyDefinition::builder(id)
            .params_schema(policy_params())
            .precheck(schemas.clone(), move |_a: PolicyPhaseArgs, ctx: PolicyPhaseContext| {
                precheck_calls.fetch_add(1, Ordering::SeqCst);
                async move { anyhow::Ok(ctx.deny(json!({"reason": "exceeds limit"}))) }
            })
            .evaluate(schemas, move |_a: PolicyPhaseArgs, ctx: PolicyPhaseContext| {
                calls.fetch_add(1, Ordering::SeqCst);
                async move { anyhow::Ok(ctx.deny(json!({"reason": "exceeds limit"}))) }
            })
            .build()
            .unwrap(),
    )
}

fn tool(policies: Vec<Arc<PolicyDefinition>>) -> Arc<ToolDefinition> {
    let mut builder = ToolDefinition::builder("@t/transfer", TOOL_CID).params_schema(schema(
        "transfer params",
        json!({
            "type": "object",
            "properties": {"amount": {"type": "number"}, "to": {"type": "string"}},
            "required": ["amount", "to"]
        }),
    ));
    for policy in policies {
        builder = builder.supported_policy(policy, ParameterMapping::new().with("amount", "amountUsd"));
    }
    Arc::new(
        builder
            .execute_remote(OutcomeSchemas::new(
                ResultSchema::value(schema(
                    "transfer result",
                    json!({"type": "object", "properties": {"txHash": {"type": "string"}}, "required": ["txHash"]}),
                )),
                ResultSchema::NoValue,
            ))
            .build()
            .unwrap(),
    )
}

fn registry(policy_ids: &[&str]) -> Arc<InMemoryDelegationRegistry> {
    let registry = InMemoryDelegationRegistry::new();
    registry.insert_delegator(
        DelegatorIdentity::from(DELEGATOR),
        PkpInfo {
            token_id: "1".into(),
            eth_address: DELEGATOR.into(),
            public_key: "0x04".into(),
        },
    );
    registry.insert_tool_policies(
        DelegatorIdentity::from(DELEGATOR),
        TOOL_CID,
        ToolPolicyResolution {
            app_id: 7,
            app_version: 3,
            policies: policy_ids
                .iter()
                .map(|id| ConfiguredPolicy {
                    policy_id: PolicyId::from(*id),
                    configured_parameters: Some(StoredParameters::Json(json!({}))),
                })
                .collect(),
        },
    );
    Arc::new(registry)
}

fn envelope(result: Value) -> Value {
    json!({
        "toolExecutionResult": result,
        "toolContext": {"toolIpfsCid": TOOL_CID, "delegation": {"delegateeAddress": "0xdelegatee"}}
    })
}

fn valid_params() -> Value {
    json!({"amount": 5, "to": "0xrecipient"})
}

// ── Order sensitivity ────────────────────────────────────────────────────────

#[tokio::test]
async fn test_first_deny_stops_evaluation() {
    let calls: Vec<Arc<AtomicUsize>> = (0..4).map(|_| Arc::new(AtomicUsize::new(0))).collect();
    let policies = vec![
        counting_allow("@p/one", calls[0].clone()),
        counting_allow("@p/two", calls[1].clone()),
        limit_deny("@p/three", calls[2].clone()),
        counting_allow("@p/four", calls[3].clone()),
    ];
    let executor = MockExecutor::replying(true, json!(null));
    let client = ToolClient::new(
        tool(policies),
        registry(&["@p/one", "@p/two", "@p/three", "@p/four"]),
        executor.clone(),
        Arc::new(MockSessions),
        "0xdelegatee",
    );

    let response = client.execute(valid_params(), ExecuteOptions::new(DELEGATOR)).await;
    assert!(response.is_failure());

    let policies = response.context.policies_context.unwrap();
    let evaluated: Vec<&str> = policies.evaluated_policies().iter().map(|id| id.as_str()).collect();
    assert_eq!(evaluated, vec!["@p/one", "@p/two", "@p/three"]);
    assert_eq!(
        calls.iter().map(|c| c.load(Ordering::SeqCst)).collect::<Vec<_>>(),
        vec![1, 1, 1, 0]
    );
    assert_eq!(executor.dispatched(), 0);
}

#[tokio::test]
async fn test_configured_order_not_declared_order() {
    let deny_calls = Arc::new(AtomicUsize::new(0));
    let allow_calls = Arc::new(AtomicUsize::new(0));
    // Declared allow-then-deny, configured deny-then-allow.
    let policies = vec![
        counting_allow("@p/allow", allow_calls.clone()),
        limit_deny("@p/deny", deny_calls.clone()),
    ];
    let client = ToolClient::new(
        tool(policies),
        registry(&["@p/deny", "@p/allow"]),
        MockExecutor::replying(true, json!(null)),
        Arc::new(MockSessions),
        "0xdelegatee",
    );

    let response = client.precheck(valid_params(), PrecheckOptions::new(DELEGATOR)).await;
    assert!(response.is_failure());
    assert_eq!(deny_calls.load(Ordering::SeqCst), 1);
    assert_eq!(allow_calls.load(Ordering::SeqCst), 0);
}

// ── Scenarios ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_single_allowing_policy_execute_succeeds() {
    let calls = Arc::new(AtomicUsize::new(0));
    let executor = MockExecutor::replying(
        true,
        envelope(json!({"success": true, "result": {"txHash": "0xabc"}})),
    );
    let client = ToolClient::new(
        tool(vec![counting_allow("@p/allow", calls.clone())]),
        registry(&["@p/allow"]),
        executor.clone(),
        Arc::new(MockSessions),
        "0xdelegatee",
    );

    let response = client.execute(valid_params(), ExecuteOptions::new(DELEGATOR)).await;
    assert!(response.is_success());
    assert_eq!(response.result(), Some(&json!({"txHash": "0xabc"})));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(executor.dispatched(), 1);

    let sent = executor.requests.lock().unwrap();
    let sent_context = &sent[0].js_params.context;
    assert_eq!(sent_context.app.map(|app| app.app_version), Some(3));
    assert!(sent_context.policies_context.as_ref().unwrap().is_allowed());
}

#[tokio::test]
async fn test_second_policy_denial_reports_reason() {
    let policies = vec![
        counting_allow("@p/p1", Arc::new(AtomicUsize::new(0))),
        limit_deny("@p/p2", Arc::new(AtomicUsize::new(0))),
    ];
    let executor = MockExecutor::replying(true, json!(null));
    let client = ToolClient::new(
        tool(policies),
        registry(&["@p/p1", "@p/p2"]),
        executor.clone(),
        Arc::new(MockSessions),
        "0xdelegatee",
    );

    let response = client.execute(valid_params(), ExecuteOptions::new(DELEGATOR)).await;
    assert!(response.is_failure());
    assert!(response.result().is_none());
    assert!(response.message().unwrap().contains("@p/p2"));

    let policies = response.context.policies_context.unwrap();
    let denied = policies.denied_policy().unwrap();
    assert_eq!(denied.package_name, PolicyId::from("@p/p2"));
    assert_eq!(denied.result.as_ref().unwrap()["reason"], "exceeds limit");
    assert_eq!(
        policies.evaluated_policies(),
        &[PolicyId::from("@p/p1"), PolicyId::from("@p/p2")]
    );
    assert!(policies.is_policy_allowed(&PolicyId::from("@p/p1")));
    assert_eq!(executor.dispatched(), 0);
}

#[tokio::test]
async fn test_invalid_params_touch_nothing() {
    let calls = Arc::new(AtomicUsize::new(0));
    let registry = registry(&["@p/allow"]);
    let executor = MockExecutor::replying(true, json!(null));
    let client = ToolClient::new(
        tool(vec![counting_allow("@p/allow", calls.clone())]),
        registry.clone(),
        executor.clone(),
        Arc::new(MockSessions),
        "0xdelegatee",
    );

    let bad = json!({"amount": "five"});
    let precheck = client.precheck(bad.clone(), PrecheckOptions::new(DELEGATOR)).await;
    let execute = client.execute(bad, ExecuteOptions::new(DELEGATOR)).await;

    assert!(precheck.is_failure());
    assert!(execute.is_failure());
    assert!(execute.context.policies_context.is_none());
    assert_eq!(registry.call_count(), 0);
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert_eq!(executor.dispatched(), 0);
}

// ── Malformed envelopes ──────────────────────────────────────────────────────

async fn execute_with_reply(success: bool, response: Value) -> Response {
    let client = ToolClient::new(
        tool(vec![counting_allow("@p/allow", Arc::new(AtomicUsize::new(0)))]),
        registry(&["@p/allow"]),
        MockExecutor::replying(success, response),
        Arc::new(MockSessions),
        "0xdelegatee",
    );
    client.execute(valid_params(), ExecuteOptions::new(DELEGATOR)).await
}

#[tokio::test]
async fn test_bare_string_reply_is_protocol_failure() {
    let response = execute_with_reply(true, json!("execution finished")).await;
    assert!(response.is_failure());
    assert!(response.result().is_none());
    assert!(response.message().unwrap().starts_with("protocol error"));
    // Locally accumulated context survives the failure.
    assert!(response.context.policies_context.unwrap().is_allowed());
}

#[tokio::test]
async fn test_missing_tool_execution_result_is_protocol_failure() {
    let response = execute_with_reply(
        true,
        json!({"toolContext": {"toolIpfsCid": TOOL_CID, "delegation": {"delegateeAddress": "0xd"}}}),
    )
    .await;
    assert!(response.is_failure());
    assert!(response.message().unwrap().contains("toolExecutionResult"));
}

#[tokio::test]
async fn test_generic_failure_marker_is_protocol_failure() {
    let response = execute_with_reply(false, json!({"error": "node crashed"})).await;
    assert!(response.is_failure());
    assert!(response.message().unwrap().starts_with("protocol error"));
}

#[tokio::test]
async fn test_stringified_envelope_is_accepted() {
    let encoded = envelope(json!({"success": true, "result": {"txHash": "0x1"}})).to_string();
    let response = execute_with_reply(true, Value::String(encoded)).await;
    assert!(response.is_success());
    assert_eq!(response.result(), Some(&json!({"txHash": "0x1"})));
}

#[tokio::test]
async fn test_tool_failure_passes_through() {
    let response = execute_with_reply(
        true,
        envelope(json!({"success": false, "error": "insufficient balance"})),
    )
    .await;
    assert!(response.is_failure());
    assert_eq!(response.message(), Some("insufficient balance"));
}

// ── Tag/payload consistency ──────────────────────────────────────────────────

#[tokio::test]
async fn test_allow_with_wrong_shape_becomes_deny() {
    let allow_schema = schema(
        "quota allow",
        json!({"type": "object", "properties": {"remaining": {"type": "integer"}}, "required": ["remaining"]}),
    );
    let sloppy = Arc::new(
        PolicyDefinition::builder("@p/sloppy")
            .params_schema(policy_params())
            .precheck(
                VerdictSchemas::new(ResultSchema::value(allow_schema), ResultSchema::NoValue),
                |_a: PolicyPhaseArgs, ctx: PolicyPhaseContext| async move {
                    anyhow::Ok(ctx.allow(json!({"remaining": "lots"})))
                },
            )
            .build()
            .unwrap(),
    );
    let client = ToolClient::new(
        tool(vec![sloppy]),
        registry(&["@p/sloppy"]),
        MockExecutor::replying(true, json!(null)),
        Arc::new(MockSessions),
        "0xdelegatee",
    );

    let response = client.precheck(valid_params(), PrecheckOptions::new(DELEGATOR)).await;
    assert!(response.is_failure());
    let policies = response.context.policies_context.unwrap();
    let denied = policies.denied_policy().unwrap();
    assert_eq!(denied.package_name, PolicyId::from("@p/sloppy"));
    assert!(denied.result.is_none());
    assert!(denied.error.is_some());
}

// ── Projection ───────────────────────────────────────────────────────────────

#[test]
fn test_parameter_projection_is_pure() {
    let mapping = ParameterMapping::new().with("amount", "amountUsd").with("to", "recipient");
    let params = json!({"amount": 5, "to": "0xr", "memo": "unmapped"});

    let first = mapping.project(&params);
    let second = mapping.project(&params);
    assert_eq!(first, second);
    assert_eq!(first, json!({"amountUsd": 5, "recipient": "0xr"}));
    assert_eq!(params["memo"], "unmapped");
}
