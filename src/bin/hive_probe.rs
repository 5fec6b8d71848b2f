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

use clap::{Parser, Subcommand};
use hive_probe::{
    ClusterStateService, ContainerConfigBuilder, ConvergenceTarget, DiskId, HarnessConfig,
    ServiceContainer,
};
use log::LevelFilter;
use serde::Serialize;
use std::error::Error;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "hive_probe", about = "Query and converge storage cluster state")]
struct Opt {
    /// Harness configuration file (TOML)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Admin host, overrides the configuration file
    #[arg(long)]
    host: Option<String>,

    /// Print models as JSON
    #[arg(long)]
    json: bool,

    /// Per-command timeout in seconds
    #[arg(long, default_value_t = 30)]
    command_timeout: u64,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Show nodes, disks and the disk mask
    Hwstat,
    /// Show management controller availability per node
    Ipmi,
    /// Show sensor readings per node
    Sensors,
    /// List the cells of the hive
    Cells {
        /// Read the full topology of every cell through cellcfg
        #[arg(long)]
        detail: bool,
    },
    /// Wait until every disk of a node is online
    WaitOnline {
        node: u32,
        /// Time budget in seconds (defaults to the configured timeout)
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Wait until every disk of a node is offline
    WaitOffline {
        node: u32,
        #[arg(long)]
        timeout: Option<u64>,
    },
    /// Bring every disk back online except the declared exceptions
    Reset {
        /// Node allowed to stay offline (repeatable)
        #[arg(long = "offline-node")]
        offline_nodes: Vec<u32>,
        /// Disk allowed to stay offline, as <node>:<slot> (repeatable)
        #[arg(long = "offline-disk")]
        offline_disks: Vec<DiskId>,
        #[arg(long)]
        timeout: Option<u64>,
    },
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        _ => LevelFilter::Debug,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn report(converged: bool, what: &str) -> Result<(), Box<dyn Error>> {
    if converged {
        println!("{what}: converged");
        Ok(())
    } else {
        Err(format!("{what}: timed out").into())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let opt = Opt::parse();
    init_logging(opt.verbose);

    let mut harness = match &opt.config {
        Some(path) => HarnessConfig::load(path)?,
        None => HarnessConfig::default(),
    };
    if let Some(host) = opt.host {
        harness.admin_host = host;
    }
    let default_timeout = harness.polling.default_timeout();
    let timeout_or_default =
        |secs: Option<u64>| secs.map(Duration::from_secs).unwrap_or(default_timeout);

    let container_config = ContainerConfigBuilder::new()
        .command_timeout(Duration::from_secs(opt.command_timeout))
        .build();
    let container = ServiceContainer::new(container_config, harness);
    let service = container.create_cluster_state_service();

    match opt.command {
        Cmd::Hwstat => {
            let hwstat = service.fetch_hwstat().await?;
            if opt.json {
                print_json(&hwstat)?;
            } else {
                print!("{}", hwstat.render());
                println!("\nDisk mask:");
                print!("{}", hwstat.disk_mask());
            }
        }
        Cmd::Ipmi => {
            let availability = service.fetch_ipmi_availability().await?;
            if opt.json {
                print_json(&availability)?;
            } else {
                for (node_id, available) in availability.nodes() {
                    let state = if available { "available" } else { "unavailable" };
                    println!("NODE-{node_id}: {state}");
                }
            }
        }
        Cmd::Sensors => {
            let sensors = service.fetch_sensors().await?;
            if opt.json {
                print_json(&sensors)?;
            } else {
                for node_id in sensors.node_ids() {
                    println!("NODE-{node_id}:");
                    for reading in sensors.readings(node_id) {
                        println!("  {:<32} {} {}", reading.name, reading.value, reading.unit);
                    }
                }
            }
        }
        Cmd::Cells { detail } => {
            let cells = if detail {
                container.create_cellcfg().list_cells().await?
            } else {
                let admin_host = &container.harness_config().admin_host;
                container.create_hiveadm().list_cells(admin_host).await?
            };
            if opt.json {
                print_json(&cells)?;
            } else {
                for cell in &cells {
                    println!(
                        "Cell {}: admin {} data {} sp {} subnet {} gateway {}",
                        cell.cell_id,
                        cell.admin_vip,
                        cell.data_vip,
                        cell.sp_ip.as_deref().unwrap_or("-"),
                        cell.subnet.as_deref().unwrap_or("-"),
                        cell.gateway.as_deref().unwrap_or("-"),
                    );
                }
            }
        }
        Cmd::WaitOnline { node, timeout } => {
            let converged = service
                .wait_for_node_online(node, timeout_or_default(timeout))
                .await?;
            report(converged, &format!("NODE-{node} online"))?;
        }
        Cmd::WaitOffline { node, timeout } => {
            let converged = service
                .wait_for_node_offline(node, timeout_or_default(timeout))
                .await?;
            report(converged, &format!("NODE-{node} offline"))?;
        }
        Cmd::Reset {
            offline_nodes,
            offline_disks,
            timeout,
        } => {
            let target = ConvergenceTarget::new(offline_nodes, offline_disks);
            let converged = service
                .reset_cluster_state(&target, timeout_or_default(timeout))
                .await?;
            report(converged, "cluster reset")?;
        }
    }

    Ok(())
}
