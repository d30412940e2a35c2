// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Configuration management commands
//!
//! Commands: show, validate, generate

use anyhow::{Context, Result};
use clap::Subcommand;
use colored::Colorize;
use std::path::PathBuf;

use warrant_core::domain::client_config::ClientConfigManifest;

#[derive(Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Show config file paths checked
        #[arg(long)]
        paths: bool,
    },

    /// Validate configuration file
    Validate {
        /// Path to config file (default: discover)
        #[arg(value_name = "FILE")]
        file: Option<PathBuf>,
    },

    /// Generate sample configuration
    Generate {
        /// Output path
        #[arg(short, long, default_value = "./warrant-config.yaml")]
        output: PathBuf,

        /// Delegatee address to fill in
        #[arg(long)]
        delegatee: Option<String>,
    },
}

pub async fn handle_command(
    command: ConfigCommand,
    config_override: Option<PathBuf>,
) -> Result<()> {
    match command {
        ConfigCommand::Show { paths } => show(config_override, paths),
        ConfigCommand::Validate { file } => validate(file.or(config_override)),
        ConfigCommand::Generate { output, delegatee } => generate(output, delegatee),
    }
}

fn show(config_override: Option<PathBuf>, show_paths: bool) -> Result<()> {
    let config = ClientConfigManifest::load_or_default(config_override.clone())
        .context("Failed to load configuration")?;

    if show_paths {
        println!("{}", "Configuration discovery paths:".bold());
        match &config_override {
            Some(path) => println!("  1. --config flag: {}", path.display()),
            None => println!("  1. --config flag: {}", "(not set)".dimmed()),
        }
        println!(
            "  2. WARRANT_CONFIG_PATH: {}",
            std::env::var("WARRANT_CONFIG_PATH")
                .unwrap_or_else(|_| "(not set)".to_string())
                .dimmed()
        );
        println!("  3. ./warrant-config.yaml");
        println!();
    }

    let spec = &config.spec;
    println!("{}", "Current configuration:".bold());
    println!("  Name: {}", config.metadata.name);
    println!(
        "  Delegatee: {}",
        if spec.delegatee_address.is_empty() {
            "(not set)".dimmed().to_string()
        } else {
            spec.delegatee_address.clone()
        }
    );
    println!();

    println!("{}", "Registry:".bold());
    println!("  Endpoint: {}", spec.registry.endpoint);
    println!("  Timeout: {}s", spec.registry.timeout_seconds);
    println!();

    println!("{}", "Executor:".bold());
    println!("  Endpoint: {}", spec.executor.endpoint);
    println!("  Timeout: {}s", spec.executor.timeout_seconds);
    println!();

    println!("{}", "Session:".bold());
    println!("  TTL: {}s", spec.session.ttl_seconds);
    println!("  Refresh margin: {}s", spec.session.refresh_margin_seconds);
    println!("  Sweep interval: {}s", spec.session.sweep_interval_seconds);

    Ok(())
}

fn validate(config_path: Option<PathBuf>) -> Result<()> {
    println!("Validating configuration...");

    let config = ClientConfigManifest::load_or_default(config_path)
        .context("Failed to load configuration")?;

    config
        .validate()
        .context("Configuration validation failed")?;

    println!("{}", "✓ Configuration is valid".green());

    Ok(())
}

fn generate(output: PathBuf, delegatee: Option<String>) -> Result<()> {
    let mut config = ClientConfigManifest::default();
    if let Some(delegatee) = delegatee {
        config.spec.delegatee_address = delegatee;
    }

    let yaml = config.to_yaml_string()?;
    std::fs::write(&output, yaml)
        .with_context(|| format!("Failed to write config to {:?}", output))?;

    println!(
        "{}",
        format!("✓ Configuration generated: {}", output.display()).green()
    );

    Ok(())
}
