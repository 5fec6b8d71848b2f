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

use crate::domain::{
    ClusterError, ConvergenceTarget, HwStat, IpmiAvailability, NodeState, SensorReport,
};
use async_trait::async_trait;
use std::time::Duration;

/// Primary port - Cluster state interface offered to test cases
///
/// Every call fetches a fresh snapshot from the appliance; nothing is cached
/// between calls.
#[async_trait]
pub trait ClusterStateService: Send + Sync {
    /// Run `hwstat` on the admin host and parse it
    async fn fetch_hwstat(&self) -> Result<HwStat, ClusterError>;

    /// Run `version -v` on the admin host and extract controller availability
    async fn fetch_ipmi_availability(&self) -> Result<IpmiAvailability, ClusterError>;

    /// Run `sensors` on the admin host and parse the readings
    async fn fetch_sensors(&self) -> Result<SensorReport, ClusterError>;

    /// Poll until every disk slot of `node_id` matches `desired`
    ///
    /// # Returns
    /// * `Ok(true)` - Converged (after the settle delay)
    /// * `Ok(false)` - Time budget exhausted
    /// * `Err(ClusterError)` - Transport or parse failure aborted the wait
    async fn wait_for_node_state(
        &self,
        node_id: u32,
        desired: NodeState,
        timeout: Duration,
    ) -> Result<bool, ClusterError>;

    /// Poll until every disk expected online is online, nudging stragglers
    ///
    /// # Returns
    /// * `Ok(true)` - A pass needed no corrective action
    /// * `Ok(false)` - Time budget exhausted
    /// * `Err(ClusterError)` - Transport or parse failure aborted the reset
    async fn reset_cluster_state(
        &self,
        target: &ConvergenceTarget,
        timeout: Duration,
    ) -> Result<bool, ClusterError>;

    async fn wait_for_node_online(
        &self,
        node_id: u32,
        timeout: Duration,
    ) -> Result<bool, ClusterError> {
        self.wait_for_node_state(node_id, NodeState::Online, timeout)
            .await
    }

    async fn wait_for_node_offline(
        &self,
        node_id: u32,
        timeout: Duration,
    ) -> Result<bool, ClusterError> {
        self.wait_for_node_state(node_id, NodeState::Offline, timeout)
            .await
    }
}
