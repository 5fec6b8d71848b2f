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

//! Storage Cluster Probe Library
//!
//! This library turns the text output of a storage-cluster appliance's admin
//! CLI (`hwstat`, `version -v`, `sensors`, `hiveadm`, `cellcfg`) into typed
//! models, and polls the cluster until its state converges on a target.
//! It follows a Ports and Adapters (Hexagonal) architecture.
//!
//! # Architecture
//!
//! - **Domain**: Models, pure parsers and the convergence/topology services
//! - **Ports**: Interfaces for remote execution, time and configuration
//! - **Adapters**: ssh transport and the tokio clock
//!
//! # Usage
//!
//! ```rust,no_run
//! use hive_probe::{ClusterStateService, ContainerConfig, HarnessConfig, ServiceContainer};
//! use std::time::Duration;
//!
//! async fn example() -> Result<(), Box<dyn std::error::Error>> {
//!     let harness = HarnessConfig::load("harness.toml".as_ref())?;
//!     let container = ServiceContainer::new(ContainerConfig::default(), harness);
//!     let service = container.create_cluster_state_service();
//!
//!     let hwstat = service.fetch_hwstat().await?;
//!     print!("{}", hwstat.disk_mask());
//!
//!     let online = service.wait_for_node_online(101, Duration::from_secs(600)).await?;
//!     println!("NODE-101 online: {online}");
//!     Ok(())
//! }
//! ```
//!
//! Parsers can be used on captured output directly:
//!
//! ```rust
//! let hwstat = hive_probe::parse_hwstat("NODE-101 NODE - ONLINE\nDISK-101:0 DISK desc ENABLED\n").unwrap();
//! assert!(hwstat.disk_mask().is_online(101, 0));
//! ```

pub mod adapters;
pub mod container;
pub mod domain;
pub mod ports;

pub use adapters::{SshCommandExecutor, TokioClock};
pub use container::{
    ContainerConfig, ContainerConfigBuilder, ServiceContainer, SimpleConfigurationProvider,
};
pub use domain::*;
pub use ports::{
    Clock, ClusterStateService, CommandExecutor, CommandOutput, ConfigurationProvider,
    RemoteCommand,
};
