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

use crate::domain::{ConfigError, HarnessConfig};
use async_trait::async_trait;

/// Secondary port - Configuration provider abstraction
///
/// This interface abstracts where harness settings and expected-value
/// properties come from (a TOML file, CLI args, a test fixture, etc.)
#[async_trait]
pub trait ConfigurationProvider: Send + Sync {
    /// Get the harness configuration
    ///
    /// # Returns
    /// * `Ok(HarnessConfig)` - Harness configuration
    /// * `Err(ConfigError)` - Error loading configuration
    async fn get_harness_config(&self) -> Result<HarnessConfig, ConfigError>;

    /// Look up a single property
    ///
    /// # Returns
    /// * `Ok(Some(String))` - Property value
    /// * `Ok(None)` - Property not defined
    /// * `Err(ConfigError)` - Error loading configuration
    async fn get_property(&self, key: &str) -> Result<Option<String>, ConfigError>;

    /// Look up a property that has to be defined
    async fn require_property(&self, key: &str) -> Result<String, ConfigError> {
        self.get_property(key)
            .await?
            .ok_or_else(|| ConfigError::MissingProperty(key.to_string()))
    }
}
