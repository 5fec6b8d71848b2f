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

//! Harness configuration
//!
//! Loaded once from TOML and handed to every component at construction.

use super::entities::{ClusterLayout, DiskId};
use super::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Everything the harness needs to know about the cluster under test
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    /// Admin VIP the CLI commands are sent to
    pub admin_host: String,
    /// Login for regular CLI commands
    pub admin_user: String,
    /// Login for commands that need the privileged identity
    pub privileged_user: String,
    pub ssh_port: u16,
    pub cluster: ClusterLayout,
    pub polling: PollingConfig,
    pub commands: CommandTemplates,
    /// Free-form key/value lookups used to seed expected values
    pub properties: HashMap<String, String>,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            admin_host: "localhost".to_string(),
            admin_user: "admin".to_string(),
            privileged_user: "root".to_string(),
            ssh_port: 22,
            cluster: ClusterLayout::default(),
            polling: PollingConfig::default(),
            commands: CommandTemplates::default(),
            properties: HashMap::new(),
        }
    }
}

impl HarnessConfig {
    /// Parse a TOML document; absent fields keep their defaults
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        if !config.cluster.is_addressable() {
            return Err(ConfigError::InvalidConfiguration(format!(
                "cluster of {} nodes starting at {} runs past the largest node id",
                config.cluster.node_count, config.cluster.first_node_id
            )));
        }
        Ok(config)
    }

    /// Read and parse a TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }
}

/// Timing of convergence polls, in seconds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    pub poll_interval_secs: u64,
    /// Extra wait after a node wait converged, for downstream propagation
    pub settle_delay_secs: u64,
    pub default_timeout_secs: u64,
}

impl PollingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_secs(self.settle_delay_secs)
    }

    pub fn default_timeout(&self) -> Duration {
        Duration::from_secs(self.default_timeout_secs)
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            settle_delay_secs: 30,
            default_timeout_secs: 600,
        }
    }
}

/// CLI command lines issued against the admin host
///
/// `node_up` and `enable_disk` take `{node}` and `{slot}` placeholders.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommandTemplates {
    pub hwstat: String,
    pub version: String,
    pub sensors: String,
    pub hiveadm: String,
    pub cellcfg: String,
    pub node_up: String,
    pub enable_disk: String,
}

impl CommandTemplates {
    pub fn node_up_for(&self, node_id: u32) -> String {
        self.node_up.replace("{node}", &node_id.to_string())
    }

    pub fn enable_disk_for(&self, disk: DiskId) -> String {
        self.enable_disk
            .replace("{node}", &disk.node_id.to_string())
            .replace("{slot}", &disk.slot.to_string())
    }

    pub fn cellcfg_for(&self, cell_id: u32) -> String {
        format!("{} -c {}", self.cellcfg, cell_id)
    }
}

impl Default for CommandTemplates {
    fn default() -> Self {
        Self {
            hwstat: "hwstat".to_string(),
            version: "version -v".to_string(),
            sensors: "sensors".to_string(),
            hiveadm: "hiveadm -s".to_string(),
            cellcfg: "cellcfg".to_string(),
            node_up: "hwcfg -F -E NODE-{node}".to_string(),
            enable_disk: "hwcfg -F -E DISK-{node}:{slot}".to_string(),
        }
    }
}
