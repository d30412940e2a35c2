// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Client Configuration Types
//!
//! Kubernetes-style manifest (apiVersion/kind/metadata/spec) describing how a
//! delegatee process reaches its collaborators:
//! - Delegatee identity used for executor sessions
//! - Delegation registry endpoint
//! - Remote executor endpoint
//! - Session cache lifetime and background sweep cadence

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::domain::session::MAX_SESSION_TTL_SECONDS;

pub const API_VERSION: &str = "warrant/v1";
pub const KIND: &str = "ClientConfig";

/// Top-level client configuration manifest
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfigManifest {
    #[serde(rename = "apiVersion")]
    pub api_version: String,

    pub kind: String,

    pub metadata: ManifestMetadata,

    pub spec: ClientConfigSpec,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestMetadata {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub labels: Option<HashMap<String, String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfigSpec {
    /// Address the executor session is established for
    pub delegatee_address: String,

    #[serde(default)]
    pub registry: EndpointConfig,

    #[serde(default = "default_executor")]
    pub executor: EndpointConfig,

    #[serde(default)]
    pub session: SessionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    pub endpoint: String,

    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,
}

impl EndpointConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_session_ttl")]
    pub ttl_seconds: u64,

    /// Sessions closer than this to expiry are renewed
    #[serde(default = "default_refresh_margin")]
    pub refresh_margin_seconds: u64,

    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_seconds: u64,
}

fn default_timeout() -> u64 {
    10
}

fn default_executor_timeout() -> u64 {
    60
}

fn default_session_ttl() -> u64 {
    600
}

fn default_refresh_margin() -> u64 {
    60
}

fn default_sweep_interval() -> u64 {
    30
}

fn default_executor() -> EndpointConfig {
    EndpointConfig {
        endpoint: "http://127.0.0.1:7470".to_string(),
        timeout_seconds: default_executor_timeout(),
    }
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:3000".to_string(),
            timeout_seconds: default_timeout(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_session_ttl(),
            refresh_margin_seconds: default_refresh_margin(),
            sweep_interval_seconds: default_sweep_interval(),
        }
    }
}

impl Default for ClientConfigSpec {
    fn default() -> Self {
        Self {
            delegatee_address: String::new(),
            registry: EndpointConfig::default(),
            executor: default_executor(),
            session: SessionConfig::default(),
        }
    }
}

impl Default for ClientConfigManifest {
    fn default() -> Self {
        Self {
            api_version: API_VERSION.to_string(),
            kind: KIND.to_string(),
            metadata: ManifestMetadata {
                name: "warrant-client".to_string(),
                labels: None,
            },
            spec: ClientConfigSpec::default(),
        }
    }
}

impl ClientConfigManifest {
    /// Load configuration from YAML file
    pub fn from_yaml_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&content)
    }

    pub fn from_yaml_str(yaml: &str) -> anyhow::Result<Self> {
        let config = serde_yaml::from_str(yaml)?;
        Ok(config)
    }

    pub fn to_yaml_string(&self) -> anyhow::Result<String> {
        Ok(serde_yaml::to_string(self)?)
    }

    /// Discover configuration file using precedence order
    /// 1. WARRANT_CONFIG_PATH environment variable
    /// 2. ./warrant-config.yaml (working directory)
    pub fn discover_config() -> Option<PathBuf> {
        if let Ok(path) = std::env::var("WARRANT_CONFIG_PATH") {
            let path = PathBuf::from(path);
            if path.exists() {
                return Some(path);
            }
        }

        let cwd = PathBuf::from("./warrant-config.yaml");
        if cwd.exists() {
            return Some(cwd);
        }

        None
    }

    /// Load configuration with discovery, fallback to default
    pub fn load_or_default(cli_path: Option<PathBuf>) -> anyhow::Result<Self> {
        // Explicit path must exist
        if let Some(path) = cli_path {
            tracing::info!("Loading configuration from explicit path: {:?}", path);
            let mut config = Self::from_yaml_file(&path)
                .map_err(|e| anyhow::anyhow!("Failed to load config at {:?}: {}", path, e))?;
            config.apply_env_overrides();
            return Ok(config);
        }

        let mut config = match Self::discover_config() {
            Some(config_path) => {
                tracing::info!("Loading configuration from discovered path: {:?}", config_path);
                Self::from_yaml_file(config_path)?
            }
            None => {
                tracing::warn!("No configuration file found. Using defaults.");
                Self::default()
            }
        };
        config.apply_env_overrides();
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    pub fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("WARRANT_REGISTRY_URL") {
            tracing::info!("Environment override: WARRANT_REGISTRY_URL={}", val);
            self.spec.registry.endpoint = val;
        }
        if let Ok(val) = std::env::var("WARRANT_EXECUTOR_URL") {
            tracing::info!("Environment override: WARRANT_EXECUTOR_URL={}", val);
            self.spec.executor.endpoint = val;
        }
        if let Ok(val) = std::env::var("WARRANT_DELEGATEE_ADDRESS") {
            tracing::info!("Environment override: WARRANT_DELEGATEE_ADDRESS={}", val);
            self.spec.delegatee_address = val;
        }
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.api_version != API_VERSION {
            anyhow::bail!(
                "Invalid apiVersion: '{}'. Must be '{}'",
                self.api_version,
                API_VERSION
            );
        }

        if self.kind != KIND {
            anyhow::bail!("Invalid kind: '{}'. Must be '{}'", self.kind, KIND);
        }

        if self.metadata.name.trim().is_empty() {
            anyhow::bail!("metadata.name cannot be empty");
        }

        if self.spec.delegatee_address.trim().is_empty() {
            anyhow::bail!("spec.delegatee_address cannot be empty");
        }

        for (field, endpoint) in [
            ("spec.registry.endpoint", &self.spec.registry),
            ("spec.executor.endpoint", &self.spec.executor),
        ] {
            let url = endpoint.endpoint.as_str();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                anyhow::bail!("{} must be an http(s) URL, got '{}'", field, url);
            }
            if endpoint.timeout_seconds == 0 {
                anyhow::bail!("{} timeout_seconds must be greater than zero", field);
            }
        }

        let session = &self.spec.session;
        if session.ttl_seconds > MAX_SESSION_TTL_SECONDS {
            anyhow::bail!(
                "spec.session.ttl_seconds ({}) exceeds the maximum of {} seconds",
                session.ttl_seconds,
                MAX_SESSION_TTL_SECONDS
            );
        }
        if session.refresh_margin_seconds >= session.ttl_seconds {
            anyhow::bail!(
                "spec.session.refresh_margin_seconds ({}) must be less than ttl_seconds ({})",
                session.refresh_margin_seconds,
                session.ttl_seconds
            );
        }
        if session.sweep_interval_seconds == 0 {
            anyhow::bail!("spec.session.sweep_interval_seconds must be greater than zero");
        }
        if session.sweep_interval_seconds > MAX_SESSION_TTL_SECONDS {
            anyhow::bail!(
                "spec.session.sweep_interval_seconds ({}) exceeds the maximum of {} seconds",
                session.sweep_interval_seconds,
                MAX_SESSION_TTL_SECONDS
            );
        }

        Ok(())
    }
}
