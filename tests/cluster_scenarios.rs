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

//! End-to-end scenarios through the public crate API

use async_trait::async_trait;
use hive_probe::{
    parse_hiveadm_cells, parse_hwstat, parse_ipmi_availability, Clock, ClusterStateService,
    CommandError, CommandExecutor, CommandOutput, ConfigError, ContainerConfig,
    ConvergenceTarget, DiskState, HarnessConfig, Hiveadm, ParseError, RemoteCommand,
    ServiceContainer, DISKS_PER_NODE,
};
use predicates::prelude::*;
use std::collections::VecDeque;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tempfile::NamedTempFile;

/// Answers `hwstat` from a queue of captures (the last one repeats) and
/// everything else from a fixed table, logging each command line
struct StaticExecutor {
    hwstat: Mutex<VecDeque<String>>,
    fixed: Vec<(String, String)>,
    log: Mutex<Vec<String>>,
}

impl StaticExecutor {
    fn new(hwstat: &[&str]) -> Self {
        Self {
            hwstat: Mutex::new(hwstat.iter().map(|s| s.to_string()).collect()),
            fixed: Vec::new(),
            log: Mutex::new(Vec::new()),
        }
    }

    fn answering(mut self, command: &str, stdout: &str) -> Self {
        self.fixed.push((command.to_string(), stdout.to_string()));
        self
    }

    fn count(&self, prefix: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }
}

#[async_trait]
impl CommandExecutor for StaticExecutor {
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, CommandError> {
        self.log.lock().unwrap().push(command.command.clone());
        if command.command == "hwstat" {
            let mut queue = self.hwstat.lock().unwrap();
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            return next
                .map(|stdout| CommandOutput::ok(&stdout))
                .ok_or_else(|| CommandError::ExecutionFailed("no capture".into()));
        }
        Ok(self
            .fixed
            .iter()
            .find(|(c, _)| *c == command.command)
            .map(|(_, stdout)| CommandOutput::ok(stdout))
            .unwrap_or_default())
    }

    async fn execute_with_privileges(
        &self,
        command: &RemoteCommand,
    ) -> Result<CommandOutput, CommandError> {
        self.execute(command).await
    }
}

/// Clock that advances only by what it is asked to sleep
struct CountingClock {
    now: Mutex<Instant>,
    sleeps: Mutex<Vec<Duration>>,
}

impl CountingClock {
    fn new() -> Self {
        Self {
            now: Mutex::new(Instant::now()),
            sleeps: Mutex::new(Vec::new()),
        }
    }

    fn sleeps(&self) -> Vec<Duration> {
        self.sleeps.lock().unwrap().clone()
    }
}

#[async_trait]
impl Clock for CountingClock {
    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        *self.now.lock().unwrap() += duration;
        self.sleeps.lock().unwrap().push(duration);
    }
}

fn node_capture(node_id: u32, disks: [bool; DISKS_PER_NODE]) -> String {
    let mut out = format!("NODE-{node_id} NODE - [ONLINE]\n");
    for (slot, enabled) in disks.iter().enumerate() {
        let status = if *enabled { "ENABLED" } else { "DISABLED" };
        out.push_str(&format!("DISK-{node_id}:{slot} DISK desc [{status}]\n"));
    }
    out
}

fn config_file(content: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

const SINGLE_NODE: &str =
    "NODE-101 NODE - ONLINE\nDISK-101:0 DISK desc ENABLED\nDISK-101:1 DISK desc DISABLED\n";

#[test]
fn single_node_capture_builds_mask() {
    let hwstat = parse_hwstat(SINGLE_NODE).unwrap();

    assert_eq!(hwstat.nodes().len(), 1);
    let node = hwstat.node(101).unwrap();
    assert!(node.in_cluster());
    assert!(node.disk(0).unwrap().is_enabled());
    assert!(!node.disk(1).unwrap().is_enabled());

    let mask = hwstat.disk_mask();
    assert_eq!(mask.get(101, 0), Some(DiskState::Online));
    assert_eq!(mask.get(101, 1), Some(DiskState::Offline));
    assert_eq!(mask.len(), 2);
}

#[test]
fn rendered_table_parses_back_to_the_same_model() {
    let hwstat = parse_hwstat(SINGLE_NODE).unwrap();
    let rendered = hwstat.render();

    assert!(predicate::str::contains("[ENABLED]").eval(rendered.as_str()));
    assert!(predicate::str::is_match(r"(?m)^DISK-101:1\s+DISK\s+desc\s+\[DISABLED\]$")
        .unwrap()
        .eval(rendered.as_str()));
    assert_eq!(parse_hwstat(&rendered).unwrap(), hwstat);
}

#[test]
fn disk_before_any_node_is_rejected() {
    assert!(matches!(
        parse_hwstat("DISK-101:0 DISK desc ENABLED\nNODE-101 NODE - ONLINE\n"),
        Err(ParseError::OrphanDiskRecord { .. })
    ));
}

#[test]
fn ipmi_lookup_of_unreported_node_fails() {
    let availability =
        parse_ipmi_availability("NODE-101:\nSMDC version: 3.6\nNODE-102:\nBIOS: 1.0\n");

    assert_eq!(availability.is_available(101), Ok(true));
    assert_eq!(
        availability.is_available(102),
        Err(ParseError::UnknownNode(102))
    );
}

#[test]
fn harness_config_loads_from_file() {
    let file = config_file(
        r#"
admin_host = "10.7.224.21"

[cluster]
first_node_id = 101
node_count = 4

[polling]
settle_delay_secs = 45
"#,
    );

    let config = HarnessConfig::load(file.path()).unwrap();
    assert_eq!(config.admin_host, "10.7.224.21");
    assert_eq!(config.cluster.node_ids().collect::<Vec<_>>(), vec![101, 102, 103, 104]);
    assert_eq!(config.polling.settle_delay(), Duration::from_secs(45));
    assert_eq!(config.polling.poll_interval(), Duration::from_secs(10));
}

#[test]
fn harness_config_file_errors() {
    let file = config_file("[cluster]\nfirst_node_id = 4294967295\nnode_count = 2\n");
    assert!(matches!(
        HarnessConfig::load(file.path()),
        Err(ConfigError::InvalidConfiguration(_))
    ));

    let dir = tempfile::tempdir().unwrap();
    assert!(matches!(
        HarnessConfig::load(&dir.path().join("missing.toml")),
        Err(ConfigError::Io { .. })
    ));
}

#[tokio::test]
async fn wait_online_settles_when_node_already_online() {
    let file = config_file("admin_host = \"hq-admin\"\n[polling]\nsettle_delay_secs = 45\n");
    let container =
        ServiceContainer::new(ContainerConfig::default(), HarnessConfig::load(file.path()).unwrap());
    let executor = Arc::new(StaticExecutor::new(&[node_capture(101, [true; 4]).as_str()]));
    let clock = Arc::new(CountingClock::new());
    let service = container.create_cluster_state_service_with(executor.clone(), clock.clone());

    assert!(service
        .wait_for_node_online(101, Duration::from_secs(60))
        .await
        .unwrap());
    assert_eq!(executor.count("hwstat"), 1);
    assert_eq!(clock.sleeps(), vec![Duration::from_secs(45)]);
}

#[tokio::test]
async fn reset_times_out_on_stuck_disk() {
    let file = config_file("admin_host = \"hq-admin\"\n[cluster]\nnode_count = 5\n");
    let container =
        ServiceContainer::new(ContainerConfig::default(), HarnessConfig::load(file.path()).unwrap());

    let mut capture: String = (101..=104).map(|n| node_capture(n, [true; 4])).collect();
    capture.push_str(&node_capture(105, [true, true, false, true]));
    let executor = Arc::new(StaticExecutor::new(&[capture.as_str()]));
    let clock = Arc::new(CountingClock::new());
    let service = container.create_cluster_state_service_with(executor.clone(), clock.clone());

    let converged = service
        .reset_cluster_state(&ConvergenceTarget::default(), Duration::from_secs(15))
        .await
        .unwrap();

    assert!(!converged);
    assert_eq!(executor.count("hwstat"), 2);
    assert_eq!(executor.count("hwcfg -F -E NODE-105"), 2);
    assert_eq!(executor.count("hwcfg -F -E DISK-105:2"), 2);
    assert_eq!(executor.count("hwcfg"), 4);
}

#[tokio::test]
async fn degraded_node_wait_times_out() {
    let container = ServiceContainer::new(ContainerConfig::default(), HarnessConfig::default());
    let capture = node_capture(101, [true, false, true, true]);
    let executor = Arc::new(StaticExecutor::new(&[capture.as_str()]));
    let clock = Arc::new(CountingClock::new());
    let service = container.create_cluster_state_service_with(executor.clone(), clock.clone());

    assert!(!service
        .wait_for_node_online(101, Duration::from_secs(30))
        .await
        .unwrap());
    assert!(clock.sleeps().iter().all(|d| *d == Duration::from_secs(10)));
}

const HIVEADM: &str = "There are 2 cells in the hive:\n\
- Cell 0: adminVIP = 10.7.224.21, dataVIP = 10.7.224.22\n\
- Cell 1: adminVIP = 10.7.225.21, dataVIP = 10.7.225.22\n";

#[tokio::test]
async fn hiveadm_lists_every_cell() {
    let executor = Arc::new(StaticExecutor::new(&[]).answering("hiveadm -s", HIVEADM));
    let hiveadm = Hiveadm::new(executor.clone(), &HarnessConfig::default().commands);

    let cells = hiveadm.list_cells("hq-admin").await.unwrap();
    assert_eq!(cells.len(), 2);
    assert_eq!(cells[0].cell_id, 0);
    assert_eq!(cells[0].admin_vip, "10.7.224.21");
    assert_eq!(cells[0].data_vip, "10.7.224.22");
    assert_eq!(cells[1].admin_vip, "10.7.225.21");
    assert_eq!(cells[1].data_vip, "10.7.225.22");
    assert!(!cells[1].has_full_topology());
}

#[test]
fn hiveadm_shifted_tokens_are_rejected() {
    let shifted = "There are 1 cells in the hive:\n\
- Cell 0: extra adminVIP = 10.7.224.21, dataVIP = 10.7.224.22\n";

    assert!(matches!(
        parse_hiveadm_cells(shifted),
        Err(ParseError::MalformedRecord { .. })
    ));
}
