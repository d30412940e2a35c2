// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use warrant_core::application::tool_client::{ExecuteOptions, PrecheckOptions, ToolClient};
use warrant_core::domain::client_config::SessionConfig;
use warrant_core::domain::delegation::{
    ConfiguredPolicy, DelegatorIdentity, PkpInfo, StoredParameters, ToolPolicyResolution,
};
use warrant_core::domain::outcome::PolicyVerdict;
use warrant_core::domain::policy::{PolicyDefinition, PolicyId, PolicyPhaseArgs, PolicyPhaseContext};
use warrant_core::domain::schema::{OutcomeSchemas, ResultSchema, SchemaContract, VerdictSchemas};
use warrant_core::domain::tool::{ParameterMapping, ToolDefinition, ToolPhaseArgs, ToolPhaseContext};
use warrant_core::infrastructure::event_bus::{DomainEvent, EventBus};
use warrant_core::infrastructure::executor::{LoopbackAuthenticator, LoopbackExecutor};
use warrant_core::infrastructure::registry::InMemoryDelegationRegistry;
use warrant_core::infrastructure::ExecutorSessionManager;
use warrant_core::domain::events::ToolEvent;

const DELEGATOR: &str = "0xdelegator";
const DELEGATEE: &str = "0xdelegatee";
const TOOL_CID: &str = "QmSpendTool";
const SPEND_LIMIT: &str = "@p/spend-limit";

fn schema(label: &str, raw: Value) -> SchemaContract {
    SchemaContract::from_value(label, raw).unwrap()
}

async fn check_spend(
    spent: Arc<AtomicU64>,
    args: PolicyPhaseArgs,
    ctx: PolicyPhaseContext,
) -> anyhow::Result<PolicyVerdict> {
    let amount = args.tool_params["amountUsd"].as_u64().unwrap_or(0);
    let max = args
        .user_params
        .as_ref()
        .and_then(|p| p["maxUsd"].as_u64())
        .unwrap_or(0);
    let already = spent.load(Ordering::SeqCst);

    if already + amount > max {
        return Ok(ctx.deny(json!({
            "reason": "exceeds limit",
            "remaining": max.saturating_sub(already)
        })));
    }
    Ok(ctx.allow(json!({"remaining": max - already - amount})))
}

fn spend_limit(spent: Arc<AtomicU64>) -> Arc<PolicyDefinition> {
    let schemas = VerdictSchemas::new(
        ResultSchema::value(schema(
            "spend allow",
            json!({"type": "object", "properties": {"remaining": {"type": "integer"}}, "required": ["remaining"]}),
        )),
        ResultSchema::value(schema(
            "spend deny",
            json!({
                "type": "object",
                "properties": {"reason": {"type": "string"}, "remaining": {"type": "integer"}},
                "required": ["reason"]
            }),
        )),
    );
    let precheck_spent = spent.clone();
    let evaluate_spent = spent.clone();

    Arc::new(
        PolicyDefinition::builder(SPEND_LIMIT)
            .params_schema(schema(
                "spend params",
                json!({"type": "object", "properties": {"amountUsd": {"type": "integer"}}, "required": ["amountUsd"]}),
            ))
            .user_params_schema(schema(
                "spend user params",
                json!({"type": "object", "properties": {"maxUsd": {"type": "integer"}}, "required": ["maxUsd"]}),
            ))
            .precheck(schemas.clone(), move |args: PolicyPhaseArgs, ctx: PolicyPhaseContext| {
                check_spend(precheck_spent.clone(), args, ctx)
            })
            .evaluate(schemas, move |args: PolicyPhaseArgs, ctx: PolicyPhaseContext| {
                check_spend(evaluate_spent.clone(), args, ctx)
            })
            .commit(
                schema(
                    "spend commit",
                    json!({"type": "object", "properties": {"amountUsd": {"type": "integer"}}, "required": ["amountUsd"]}),
                ),
                VerdictSchemas::none(),
                move |params: Value, ctx: PolicyPhaseContext| {
                    let spent = spent.clone();
                    async move {
                        let amount = params["amountUsd"].as_u64().unwrap_or(0);
                        spent.fetch_add(amount, Ordering::SeqCst);
                        anyhow::Ok(ctx.allow_empty())
                    }
                },
            )
            .build()
            .unwrap(),
    )
}

fn spend_tool(spent: Arc<AtomicU64>) -> Arc<ToolDefinition> {
    Arc::new(
        ToolDefinition::builder("@t/native-send", TOOL_CID)
            .params_schema(schema(
                "send params",
                json!({
                    "type": "object",
                    "properties": {"amount": {"type": "integer"}, "to": {"type": "string"}},
                    "required": ["amount", "to"]
                }),
            ))
            .supported_policy(spend_limit(spent), ParameterMapping::new().with("amount", "amountUsd"))
            .execute(
                OutcomeSchemas::new(
                    ResultSchema::value(schema(
                        "send result",
                        json!({"type": "object", "properties": {"txHash": {"type": "string"}}, "required": ["txHash"]}),
                    )),
                    ResultSchema::NoValue,
                ),
                |args: ToolPhaseArgs, ctx: ToolPhaseContext| async move {
                    let amount = args.tool_params["amount"].as_u64().unwrap_or(0);
                    let committed = ctx
                        .commit_policy(&PolicyId::from(SPEND_LIMIT), json!({"amountUsd": amount}))
                        .await;
                    if committed.is_deny() {
                        return anyhow::Ok(ctx.fail_with_error("spend could not be recorded"));
                    }
                    anyhow::Ok(ctx.succeed(json!({"txHash": format!("0x{amount:08x}")})))
                },
            )
            .build()
            .unwrap(),
    )
}

fn registry(max_usd: u64) -> Arc<InMemoryDelegationRegistry> {
    let registry = InMemoryDelegationRegistry::new();
    registry.insert_delegator(
        DelegatorIdentity::from(DELEGATOR),
        PkpInfo {
            token_id: "11".into(),
            eth_address: DELEGATOR.into(),
            public_key: "0x04ab".into(),
        },
    );
    registry.insert_tool_policies(
        DelegatorIdentity::from(DELEGATOR),
        TOOL_CID,
        ToolPolicyResolution {
            app_id: 2,
            app_version: 1,
            policies: vec![ConfiguredPolicy {
                policy_id: PolicyId::from(SPEND_LIMIT),
                configured_parameters: Some(StoredParameters::Json(json!({"maxUsd": max_usd}))),
            }],
        },
    );
    Arc::new(registry)
}

struct Harness {
    client: ToolClient,
    executor: Arc<LoopbackExecutor>,
    sessions: Arc<ExecutorSessionManager>,
    spent: Arc<AtomicU64>,
}

fn harness(max_usd: u64) -> Harness {
    let spent = Arc::new(AtomicU64::new(0));
    let tool = spend_tool(spent.clone());
    let registry = registry(max_usd);

    let executor = Arc::new(LoopbackExecutor::new(registry.clone()));
    executor.host(tool.clone());
    let sessions = Arc::new(ExecutorSessionManager::new(
        Arc::new(LoopbackAuthenticator::new(300)),
        DELEGATEE,
        SessionConfig::default(),
    ));

    let client = ToolClient::new(tool, registry, executor.clone(), sessions.clone(), DELEGATEE);
    Harness {
        client,
        executor,
        sessions,
        spent,
    }
}

fn send(amount: u64) -> Value {
    json!({"amount": amount, "to": "0xrecipient"})
}

#[tokio::test]
async fn test_execute_commits_spend() {
    let h = harness(100);

    let response = h.client.execute(send(40), ExecuteOptions::new(DELEGATOR)).await;
    assert!(response.is_success(), "unexpected failure: {:?}", response.message());
    assert_eq!(response.result(), Some(&json!({"txHash": "0x00000028"})));
    assert_eq!(h.spent.load(Ordering::SeqCst), 40);
    assert_eq!(h.executor.dispatch_count(), 1);

    // The remote context carries the executor's own evaluation.
    let policies = response.context.policies_context.unwrap();
    assert_eq!(
        policies.allow_result(&PolicyId::from(SPEND_LIMIT)),
        Some(&json!({"remaining": 60}))
    );
}

#[tokio::test]
async fn test_execute_reevaluates_after_precheck() {
    let h = harness(100);

    let precheck = h.client.precheck(send(70), PrecheckOptions::new(DELEGATOR)).await;
    assert!(precheck.is_success());

    // Spend recorded elsewhere between the two calls.
    h.spent.store(50, Ordering::SeqCst);

    let execute = h.client.execute(send(70), ExecuteOptions::new(DELEGATOR)).await;
    assert!(execute.is_failure());
    let denied = execute.context.policies_context.unwrap();
    let denied = denied.denied_policy().unwrap();
    assert_eq!(denied.package_name, PolicyId::from(SPEND_LIMIT));
    assert_eq!(denied.result, Some(json!({"reason": "exceeds limit", "remaining": 50})));
    assert_eq!(h.executor.dispatch_count(), 0);
    assert_eq!(h.spent.load(Ordering::SeqCst), 50);
}

#[tokio::test]
async fn test_consecutive_executes_share_one_session() {
    let h = harness(100);

    let first = h.client.execute(send(60), ExecuteOptions::new(DELEGATOR)).await;
    let second = h.client.execute(send(60), ExecuteOptions::new(DELEGATOR)).await;

    assert!(first.is_success());
    // The first commit used up the limit.
    assert!(second.is_failure());
    assert_eq!(h.spent.load(Ordering::SeqCst), 60);
    assert!(h.sessions.snapshot().is_some());
}

#[tokio::test]
async fn test_precheck_never_reaches_executor() {
    let h = harness(10);

    let response = h.client.precheck(send(5), PrecheckOptions::new(DELEGATOR)).await;
    assert!(response.is_success());
    assert_eq!(h.executor.dispatch_count(), 0);
    assert!(h.sessions.snapshot().is_none());
    assert_eq!(h.spent.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stopped_sessions_fail_execute() {
    let h = harness(100);
    h.sessions.stop();

    let response = h.client.execute(send(1), ExecuteOptions::new(DELEGATOR)).await;
    assert!(response.is_failure());
    assert!(response.context.policies_context.unwrap().is_allowed());
    assert_eq!(h.executor.dispatch_count(), 0);
}

#[tokio::test]
async fn test_dispatch_lifecycle_events() {
    let spent = Arc::new(AtomicU64::new(0));
    let tool = spend_tool(spent);
    let registry = registry(100);
    let executor = Arc::new(LoopbackExecutor::new(registry.clone()));
    executor.host(tool.clone());
    let sessions = Arc::new(ExecutorSessionManager::new(
        Arc::new(LoopbackAuthenticator::new(300)),
        DELEGATEE,
        SessionConfig::default(),
    ));
    let bus = Arc::new(EventBus::new(16));
    let mut receiver = bus.subscribe();
    let client = ToolClient::new(tool, registry, executor, sessions, DELEGATEE).with_event_bus(bus);

    let response = client.execute(send(1), ExecuteOptions::new(DELEGATOR)).await;
    assert!(response.is_success());

    let mut kinds = Vec::new();
    while let Ok(event) = receiver.try_recv() {
        kinds.push(match event {
            DomainEvent::Policy(_) => "policy",
            DomainEvent::Tool(ToolEvent::ToolDispatched { .. }) => "dispatched",
            DomainEvent::Tool(ToolEvent::ToolCompleted { success, .. }) => {
                assert!(success);
                "completed"
            }
            DomainEvent::Tool(ToolEvent::ProtocolViolation { .. }) => "violation",
        });
    }
    assert_eq!(kinds, vec!["policy", "dispatched", "completed"]);
}
