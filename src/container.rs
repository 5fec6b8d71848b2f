/*
Copyright 2024 San Francisco Compute Company

Licensed under the Apache License, Version 2.0 (the "License");
you may not use this file except in compliance with the License.
You may obtain a copy of the License at

    http://www.apache.org/licenses/LICENSE-2.0

Unless required by applicable law or agreed to in writing, software
distributed under the License is distributed on an "AS IS" BASIS,
WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
See the License for the specific language governing permissions and
limitations under the License.
*/

//! Dependency injection container for cluster harness services

use crate::adapters::{SshCommandExecutor, TokioClock};
use crate::domain::{
    Cellcfg, ClusterConvergenceService, ConfigError, HarnessConfig, Hiveadm,
};
use crate::ports::{Clock, ClusterStateService, CommandExecutor, ConfigurationProvider};
use std::sync::Arc;
use std::time::Duration;

/// Transport settings for the dependency injection container
#[derive(Debug, Clone)]
pub struct ContainerConfig {
    /// Command execution timeout
    pub command_timeout: Duration,
    /// ssh connect timeout
    pub connect_timeout: Duration,
    /// Command retry count
    pub retry_count: u32,
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(30),
            connect_timeout: Duration::from_secs(10),
            retry_count: 2,
        }
    }
}

/// Simple configuration provider implementation
pub struct SimpleConfigurationProvider {
    config: HarnessConfig,
}

impl SimpleConfigurationProvider {
    pub fn new(config: HarnessConfig) -> Self {
        Self { config }
    }
}

#[async_trait::async_trait]
impl ConfigurationProvider for SimpleConfigurationProvider {
    async fn get_harness_config(&self) -> Result<HarnessConfig, ConfigError> {
        Ok(self.config.clone())
    }

    async fn get_property(&self, key: &str) -> Result<Option<String>, ConfigError> {
        Ok(self.config.property(key).map(str::to_string))
    }
}

/// Dependency injection container
pub struct ServiceContainer {
    config: ContainerConfig,
    harness: HarnessConfig,
}

impl ServiceContainer {
    /// Create a new service container
    pub fn new(config: ContainerConfig, harness: HarnessConfig) -> Self {
        Self { config, harness }
    }

    /// Build a container from whatever the configuration provider supplies
    pub async fn from_provider(
        config: ContainerConfig,
        provider: &dyn ConfigurationProvider,
    ) -> Result<Self, ConfigError> {
        Ok(Self::new(config, provider.get_harness_config().await?))
    }

    pub fn harness_config(&self) -> &HarnessConfig {
        &self.harness
    }

    /// Create the command executor
    pub fn create_command_executor(&self) -> Arc<dyn CommandExecutor> {
        Arc::new(
            SshCommandExecutor::new(
                &self.harness.admin_user,
                &self.harness.privileged_user,
                self.harness.ssh_port,
            )
            .limits(
                self.config.command_timeout,
                self.config.connect_timeout,
                self.config.retry_count,
            ),
        )
    }

    /// Create the clock
    pub fn create_clock(&self) -> Arc<dyn Clock> {
        Arc::new(TokioClock)
    }

    /// Create the configuration provider
    pub fn create_configuration_provider(&self) -> Arc<dyn ConfigurationProvider> {
        Arc::new(SimpleConfigurationProvider::new(self.harness.clone()))
    }

    /// Create the cluster state service over the given executor
    pub fn create_cluster_state_service_with(
        &self,
        executor: Arc<dyn CommandExecutor>,
        clock: Arc<dyn Clock>,
    ) -> Arc<dyn ClusterStateService> {
        Arc::new(ClusterConvergenceService::new(
            executor,
            clock,
            self.harness.clone(),
        ))
    }

    /// Create the complete cluster state service
    pub fn create_cluster_state_service(&self) -> Arc<dyn ClusterStateService> {
        self.create_cluster_state_service_with(self.create_command_executor(), self.create_clock())
    }

    /// Create the cell list reader
    pub fn create_hiveadm(&self) -> Hiveadm {
        Hiveadm::new(self.create_command_executor(), &self.harness.commands)
    }

    /// Create the per-cell topology reader against the configured admin host
    pub fn create_cellcfg(&self) -> Cellcfg {
        let executor = self.create_command_executor();
        Cellcfg::new(
            Hiveadm::new(executor.clone(), &self.harness.commands),
            executor,
            &self.harness.commands,
            &self.harness.admin_host,
        )
    }
}

/// Builder pattern for container configuration
pub struct ContainerConfigBuilder {
    config: ContainerConfig,
}

impl ContainerConfigBuilder {
    /// Create a new configuration builder
    pub fn new() -> Self {
        Self {
            config: ContainerConfig::default(),
        }
    }

    /// Set command timeout
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.config.command_timeout = timeout;
        self
    }

    /// Set ssh connect timeout
    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.config.connect_timeout = timeout;
        self
    }

    /// Set retry count
    pub fn retry_count(mut self, count: u32) -> Self {
        self.config.retry_count = count;
        self
    }

    /// Build the configuration
    pub fn build(self) -> ContainerConfig {
        self.config
    }
}

impl Default for ContainerConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
