// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Tool commands
//!
//! Commands: validate, precheck, execute

use anyhow::{Context, Result};
use clap::{Args, Subcommand};
use colored::Colorize;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

use warrant_core::domain::outcome::Response;
use warrant_core::infrastructure::{DomainEvent, EventBus, EventReceiver};
use warrant_sdk::{
    ClientConfigManifest, ExecuteOptions, PrecheckOptions, ToolManifest, WarrantClientBuilder,
};

#[derive(Subcommand)]
pub enum ToolCommand {
    /// Validate a tool manifest
    Validate {
        /// Path to tool manifest
        #[arg(value_name = "MANIFEST")]
        manifest: PathBuf,
    },

    /// Dry-run the configured policies without dispatching
    Precheck {
        #[command(flatten)]
        invocation: InvocationArgs,

        /// RPC endpoint handed to precheck phases
        #[arg(long)]
        rpc_endpoint: Option<String>,
    },

    /// Evaluate policies and dispatch the tool to the executor
    Execute {
        #[command(flatten)]
        invocation: InvocationArgs,
    },
}

#[derive(Args)]
pub struct InvocationArgs {
    /// Path to tool manifest
    #[arg(value_name = "MANIFEST")]
    manifest: PathBuf,

    /// Tool parameters as a JSON object
    #[arg(short, long, default_value = "{}")]
    params: String,

    /// Delegator identity (address)
    #[arg(short, long)]
    delegator: String,

    /// Print policy and dispatch events after the response
    #[arg(long)]
    events: bool,
}

pub async fn handle_command(command: ToolCommand, config_override: Option<PathBuf>) -> Result<()> {
    match command {
        ToolCommand::Validate { manifest } => validate(manifest),
        ToolCommand::Precheck {
            invocation,
            rpc_endpoint,
        } => {
            let mut options = PrecheckOptions::new(invocation.delegator.clone());
            if let Some(rpc) = rpc_endpoint {
                options = options.with_rpc_endpoint(rpc);
            }
            invoke(invocation, config_override, |client, params| async move {
                client.precheck(params, options).await
            })
            .await
        }
        ToolCommand::Execute { invocation } => {
            let options = ExecuteOptions::new(invocation.delegator.clone());
            invoke(invocation, config_override, |client, params| async move {
                client.execute(params, options).await
            })
            .await
        }
    }
}

fn validate(path: PathBuf) -> Result<()> {
    println!("Validating tool manifest...");

    let manifest = ToolManifest::from_yaml_file(&path)
        .with_context(|| format!("Failed to load manifest {:?}", path))?;
    let name = manifest.metadata.name.clone();
    let tool = manifest
        .into_definition()
        .context("Manifest does not describe a valid tool")?;

    println!("{}", format!("✓ Tool manifest '{}' is valid", name).green());
    println!("  Package: {}", tool.package_name());
    println!("  Code reference: {}", tool.tool_ipfs_cid());
    println!("  Supported policies: {}", tool.supported_policies().len());
    for policy in tool.supported_policies() {
        println!("    - {}", policy.id());
    }

    Ok(())
}

async fn invoke<F, Fut>(
    invocation: InvocationArgs,
    config_override: Option<PathBuf>,
    run: F,
) -> Result<()>
where
    F: FnOnce(warrant_sdk::ToolClient, Value) -> Fut,
    Fut: std::future::Future<Output = Response>,
{
    let params: Value =
        serde_json::from_str(&invocation.params).context("--params must be valid JSON")?;
    let tool = ToolManifest::from_yaml_file(&invocation.manifest)
        .with_context(|| format!("Failed to load manifest {:?}", invocation.manifest))?
        .into_definition()
        .context("Manifest does not describe a valid tool")?;
    let config = ClientConfigManifest::load_or_default(config_override)
        .context("Failed to load configuration")?;

    let bus = Arc::new(EventBus::with_default_capacity());
    let mut receiver = bus.subscribe();
    let client = WarrantClientBuilder::new(config)
        .with_event_bus(bus)
        .build()?;

    let response = run(client.tool_client(Arc::new(tool)), params).await;
    client.shutdown().await?;

    println!("{}", serde_json::to_string_pretty(&response)?);
    if invocation.events {
        print_events(&mut receiver);
    }

    if response.is_failure() {
        eprintln!(
            "{}",
            format!(
                "✗ {}",
                response.message().unwrap_or("invocation failed")
            )
            .red()
        );
        std::process::exit(1);
    }
    Ok(())
}

fn print_events(receiver: &mut EventReceiver) {
    println!("{}", "Events:".bold());
    while let Ok(event) = receiver.try_recv() {
        let line = match &event {
            DomainEvent::Policy(_) => "policy".cyan(),
            DomainEvent::Tool(_) => "tool".magenta(),
        };
        match serde_json::to_string(&event) {
            Ok(json) => println!("  [{}] {}", line, json),
            Err(e) => println!("  [{}] (unprintable event: {})", line, e),
        }
    }
}
