// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::info;

use warrant_core::application::tool_client::ToolClient;
use warrant_core::domain::client_config::ClientConfigManifest;
use warrant_core::domain::delegation::DelegationRegistry;
use warrant_core::domain::executor::RemoteExecutor;
use warrant_core::domain::session::SessionAuthenticator;
use warrant_core::domain::tool::ToolDefinition;
use warrant_core::infrastructure::executor::{HttpRemoteExecutor, HttpSessionAuthenticator};
use warrant_core::infrastructure::registry::HttpDelegationRegistry;
use warrant_core::infrastructure::{EventBus, ExecutorSessionManager};

/// Builds a [`WarrantClient`] from a client configuration manifest.
///
/// Collaborators default to the HTTP adapters at the configured endpoints;
/// any of them can be replaced (e.g. with the loopback executor).
pub struct WarrantClientBuilder {
    config: ClientConfigManifest,
    registry: Option<Arc<dyn DelegationRegistry>>,
    executor: Option<Arc<dyn RemoteExecutor>>,
    authenticator: Option<Arc<dyn SessionAuthenticator>>,
    event_bus: Option<Arc<EventBus>>,
}

impl WarrantClientBuilder {
    pub fn new(config: ClientConfigManifest) -> Self {
        Self {
            config,
            registry: None,
            executor: None,
            authenticator: None,
            event_bus: None,
        }
    }

    pub fn with_registry(mut self, registry: Arc<dyn DelegationRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn with_executor(mut self, executor: Arc<dyn RemoteExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn with_authenticator(mut self, authenticator: Arc<dyn SessionAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn with_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = Some(event_bus);
        self
    }

    /// Validate the configuration and start the session manager.
    /// Must be called inside a Tokio runtime.
    pub fn build(self) -> Result<WarrantClient> {
        self.config.validate().context("Invalid client configuration")?;
        let spec = &self.config.spec;

        let registry: Arc<dyn DelegationRegistry> = match self.registry {
            Some(registry) => registry,
            None => Arc::new(
                HttpDelegationRegistry::new(&spec.registry.endpoint, spec.registry.timeout())
                    .context("Failed to create registry client")?,
            ),
        };
        let executor: Arc<dyn RemoteExecutor> = match self.executor {
            Some(executor) => executor,
            None => Arc::new(
                HttpRemoteExecutor::new(&spec.executor.endpoint, spec.executor.timeout())
                    .context("Failed to create executor client")?,
            ),
        };
        let authenticator: Arc<dyn SessionAuthenticator> = match self.authenticator {
            Some(authenticator) => authenticator,
            None => Arc::new(
                HttpSessionAuthenticator::new(&spec.executor.endpoint, spec.executor.timeout())
                    .context("Failed to create session authenticator")?,
            ),
        };

        let sessions = Arc::new(ExecutorSessionManager::new(
            authenticator,
            spec.delegatee_address.clone(),
            spec.session.clone(),
        ));
        let sweep = sessions.clone().start();

        info!(
            config = %self.config.metadata.name,
            registry = %spec.registry.endpoint,
            executor = %spec.executor.endpoint,
            "Warrant client ready"
        );

        Ok(WarrantClient {
            config: self.config,
            registry,
            executor,
            sessions,
            sweep,
            event_bus: self.event_bus,
        })
    }
}

/// Shared collaborators for every tool a consumer invokes.
pub struct WarrantClient {
    config: ClientConfigManifest,
    registry: Arc<dyn DelegationRegistry>,
    executor: Arc<dyn RemoteExecutor>,
    sessions: Arc<ExecutorSessionManager>,
    sweep: JoinHandle<()>,
    event_bus: Option<Arc<EventBus>>,
}

impl WarrantClient {
    pub fn config(&self) -> &ClientConfigManifest {
        &self.config
    }

    pub fn sessions(&self) -> &Arc<ExecutorSessionManager> {
        &self.sessions
    }

    pub fn tool_client(&self, tool: Arc<ToolDefinition>) -> ToolClient {
        let client = ToolClient::new(
            tool,
            self.registry.clone(),
            self.executor.clone(),
            self.sessions.clone(),
            self.config.spec.delegatee_address.clone(),
        );
        match &self.event_bus {
            Some(bus) => client.with_event_bus(bus.clone()),
            None => client,
        }
    }

    /// Stop the session manager and wait for its sweep to exit.
    pub async fn shutdown(self) -> Result<()> {
        self.sessions.stop();
        self.sweep.await.context("Session sweep task failed")?;
        Ok(())
    }
}
