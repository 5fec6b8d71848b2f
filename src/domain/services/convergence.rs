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
    parse_hwstat, parse_ipmi_availability, parse_sensors, ClusterError, ConvergenceTarget,
    DiskId, DiskMask, HarnessConfig, HwStat, IpmiAvailability, NodeState, SensorReport,
    DISKS_PER_NODE,
};
use crate::ports::{ClusterStateService, Clock, CommandExecutor, RemoteCommand};
use async_trait::async_trait;
use log::{debug, info, warn};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Domain service that reads cluster state and drives it toward a target
///
/// Polls are best-effort: corrective commands are fired once per offending
/// disk per pass and only verified by the next pass.
pub struct ClusterConvergenceService {
    /// Remote command transport
    executor: Arc<dyn CommandExecutor>,
    /// Deadline and sleep source
    clock: Arc<dyn Clock>,
    config: HarnessConfig,
}

impl ClusterConvergenceService {
    /// Create a new cluster convergence service
    ///
    /// # Arguments
    /// * `executor` - Transport used to reach the admin host
    /// * `clock` - Time source for deadlines and poll pauses
    /// * `config` - Harness configuration
    pub fn new(
        executor: Arc<dyn CommandExecutor>,
        clock: Arc<dyn Clock>,
        config: HarnessConfig,
    ) -> Self {
        Self {
            executor,
            clock,
            config,
        }
    }

    pub fn config(&self) -> &HarnessConfig {
        &self.config
    }

    /// Run a CLI command on the admin host and return its stdout
    async fn run_admin(&self, command_line: &str) -> Result<String, ClusterError> {
        let command = RemoteCommand::new(&self.config.admin_host, command_line);
        debug!("{}: {}", command.host, command.command);
        let output = self
            .executor
            .execute(&command)
            .await?
            .into_checked(&command)?;
        Ok(output.stdout)
    }

    async fn fetch_disk_mask(&self) -> Result<DiskMask, ClusterError> {
        Ok(self.fetch_hwstat().await?.disk_mask())
    }

    /// Deadline `timeout` from now, `None` when it lies beyond what `Instant` can hold
    fn deadline_after(&self, timeout: Duration) -> Option<Instant> {
        self.clock.now().checked_add(timeout)
    }

    /// Whether there is no room left for another poll interval before `deadline`
    fn budget_exhausted(&self, deadline: Option<Instant>) -> bool {
        match deadline {
            Some(deadline) => {
                deadline.saturating_duration_since(self.clock.now())
                    < self.config.polling.poll_interval()
            }
            None => false,
        }
    }

    /// Ask the owning node to come up, then enable the disk
    ///
    /// A non-zero exit is logged; the next poll decides whether it worked.
    async fn correct_disk(&self, disk: DiskId) -> Result<(), ClusterError> {
        let node_up = RemoteCommand::new(
            &self.config.admin_host,
            &self.config.commands.node_up_for(disk.node_id),
        );
        let output = self.executor.execute_with_privileges(&node_up).await?;
        if !output.success {
            warn!(
                "'{}' failed with exit code {:?}: {}",
                node_up.command,
                output.exit_code,
                output.stderr.trim()
            );
        }

        let enable = RemoteCommand::new(
            &self.config.admin_host,
            &self.config.commands.enable_disk_for(disk),
        );
        let output = self.executor.execute(&enable).await?;
        if !output.success {
            warn!(
                "'{}' failed with exit code {:?}: {}",
                enable.command,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(())
    }
}

#[async_trait]
impl ClusterStateService for ClusterConvergenceService {
    async fn fetch_hwstat(&self) -> Result<HwStat, ClusterError> {
        let stdout = self.run_admin(&self.config.commands.hwstat).await?;
        Ok(parse_hwstat(&stdout)?)
    }

    async fn fetch_ipmi_availability(&self) -> Result<IpmiAvailability, ClusterError> {
        let stdout = self.run_admin(&self.config.commands.version).await?;
        Ok(parse_ipmi_availability(&stdout))
    }

    async fn fetch_sensors(&self) -> Result<SensorReport, ClusterError> {
        let stdout = self.run_admin(&self.config.commands.sensors).await?;
        Ok(parse_sensors(&stdout)?)
    }

    async fn wait_for_node_state(
        &self,
        node_id: u32,
        desired: NodeState,
        timeout: Duration,
    ) -> Result<bool, ClusterError> {
        let deadline = self.deadline_after(timeout);

        loop {
            let mask = self.fetch_disk_mask().await?;
            let matching = mask.count_matching(node_id, desired);

            if matching == DISKS_PER_NODE {
                info!("NODE-{node_id} is {desired}, settling");
                self.clock.sleep(self.config.polling.settle_delay()).await;
                return Ok(true);
            }

            debug!("NODE-{node_id}: {matching}/{DISKS_PER_NODE} disks {desired}");
            if self.budget_exhausted(deadline) {
                warn!("NODE-{node_id} did not reach {desired} within {timeout:?}");
                return Ok(false);
            }
            self.clock.sleep(self.config.polling.poll_interval()).await;
        }
    }

    async fn reset_cluster_state(
        &self,
        target: &ConvergenceTarget,
        timeout: Duration,
    ) -> Result<bool, ClusterError> {
        let deadline = self.deadline_after(timeout);

        loop {
            let mask = self.fetch_disk_mask().await?;
            let mut converged = true;

            for node_id in self.config.cluster.node_ids() {
                for slot in 0..DISKS_PER_NODE as u32 {
                    if !target.expects_online(node_id, slot) || mask.is_online(node_id, slot) {
                        continue;
                    }
                    converged = false;
                    let disk = DiskId::new(node_id, slot);
                    debug!("DISK-{disk} is offline, re-enabling");
                    self.correct_disk(disk).await?;
                }
            }

            if converged {
                info!("cluster state reset");
                return Ok(true);
            }
            if self.budget_exhausted(deadline) {
                warn!("cluster state did not converge within {timeout:?}");
                return Ok(false);
            }
            self.clock.sleep(self.config.polling.poll_interval()).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{ClusterLayout, CommandError, ParseError};
    use crate::ports::CommandOutput;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Serves queued `hwstat` captures, repeating the last one, and logs every command
    struct ScriptedExecutor {
        hwstat: Mutex<VecDeque<Result<String, CommandError>>>,
        log: Mutex<Vec<String>>,
    }

    impl ScriptedExecutor {
        fn new(captures: Vec<Result<String, CommandError>>) -> Self {
            Self {
                hwstat: Mutex::new(captures.into()),
                log: Mutex::new(Vec::new()),
            }
        }

        fn commands(&self) -> Vec<String> {
            self.log.lock().unwrap().clone()
        }

        fn count(&self, prefix: &str) -> usize {
            self.commands()
                .iter()
                .filter(|c| c.starts_with(prefix))
                .count()
        }
    }

    #[async_trait]
    impl CommandExecutor for ScriptedExecutor {
        async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, CommandError> {
            self.log.lock().unwrap().push(command.command.clone());
            if command.command != "hwstat" {
                return Ok(CommandOutput::ok(""));
            }
            let mut queue = self.hwstat.lock().unwrap();
            let next = if queue.len() > 1 {
                queue.pop_front()
            } else {
                queue.front().cloned()
            };
            next.expect("no hwstat capture scripted")
                .map(|stdout| CommandOutput::ok(&stdout))
        }

        async fn execute_with_privileges(
            &self,
            command: &RemoteCommand,
        ) -> Result<CommandOutput, CommandError> {
            self.execute(command).await
        }
    }

    /// Clock that only moves when slept on
    struct ManualClock {
        now: Mutex<Instant>,
        sleeps: Mutex<Vec<Duration>>,
    }

    impl ManualClock {
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
    impl Clock for ManualClock {
        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        async fn sleep(&self, duration: Duration) {
            *self.now.lock().unwrap() += duration;
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn capture(nodes: &[(u32, bool, [bool; DISKS_PER_NODE])]) -> String {
        let mut out = String::new();
        for (node_id, online, disks) in nodes {
            let status = if *online { "ONLINE" } else { "OFFLINE" };
            out.push_str(&format!("NODE-{node_id} NODE - [{status}]\n"));
            for (slot, enabled) in disks.iter().enumerate() {
                let status = if *enabled { "ENABLED" } else { "DISABLED" };
                out.push_str(&format!("DISK-{node_id}:{slot} DISK desc [{status}]\n"));
            }
        }
        out
    }

    fn config(node_count: u32) -> HarnessConfig {
        let mut config = HarnessConfig::default();
        config.admin_host = "hq-admin".to_string();
        config.cluster = ClusterLayout {
            first_node_id: 101,
            node_count,
        };
        config.polling.poll_interval_secs = 10;
        config.polling.settle_delay_secs = 30;
        config
    }

    fn service(
        executor: &Arc<ScriptedExecutor>,
        clock: &Arc<ManualClock>,
        node_count: u32,
    ) -> ClusterConvergenceService {
        ClusterConvergenceService::new(executor.clone(), clock.clone(), config(node_count))
    }

    const ALL: [bool; DISKS_PER_NODE] = [true; DISKS_PER_NODE];

    #[tokio::test]
    async fn test_wait_online_converges_on_first_poll() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(capture(&[(101, true, ALL)]))]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 1);

        let converged = service
            .wait_for_node_online(101, Duration::from_secs(60))
            .await
            .unwrap();

        assert!(converged);
        assert_eq!(executor.count("hwstat"), 1);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(30)]);
    }

    #[tokio::test]
    async fn test_wait_online_retries_until_converged() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok(capture(&[(101, true, [true, true, false, false])])),
            Ok(capture(&[(101, true, [true, true, true, false])])),
            Ok(capture(&[(101, true, ALL)])),
        ]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 1);

        assert!(service
            .wait_for_node_online(101, Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(executor.count("hwstat"), 3);
        assert_eq!(
            clock.sleeps(),
            vec![
                Duration::from_secs(10),
                Duration::from_secs(10),
                Duration::from_secs(30)
            ]
        );
    }

    #[tokio::test]
    async fn test_wait_offline_accepts_node_outside_cluster() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok(capture(&[(101, true, ALL)])),
            Ok(capture(&[(101, false, ALL)])),
        ]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 1);

        assert!(service
            .wait_for_node_offline(101, Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(executor.count("hwstat"), 2);
    }

    #[tokio::test]
    async fn test_wait_times_out() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(capture(&[(
            101,
            true,
            [true, false, true, true],
        )]))]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 1);

        let converged = service
            .wait_for_node_online(101, Duration::from_secs(25))
            .await
            .unwrap();

        // polls at t=0, 10, 20; at t=20 only 5s remain
        assert!(!converged);
        assert_eq!(executor.count("hwstat"), 3);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10); 2]);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_keeps_polling() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok(capture(&[(101, true, [false, true, true, true])])),
            Ok(capture(&[(101, true, ALL)])),
        ]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 1);

        assert!(service
            .wait_for_node_online(101, Duration::from_secs(u64::MAX))
            .await
            .unwrap());
        assert_eq!(executor.count("hwstat"), 2);
    }

    #[tokio::test]
    async fn test_unbounded_timeout_reset() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok(capture(&[(101, true, [true, true, false, true])])),
            Ok(capture(&[(101, true, ALL)])),
        ]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 1);

        assert!(service
            .reset_cluster_state(&ConvergenceTarget::default(), Duration::MAX)
            .await
            .unwrap());
        assert_eq!(executor.count("hwcfg -F -E DISK-101:2"), 1);
    }

    #[tokio::test]
    async fn test_reset_layout_at_node_id_ceiling() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(capture(&[(101, true, ALL)]))]));
        let clock = Arc::new(ManualClock::new());
        let mut config = config(1);
        config.cluster = ClusterLayout {
            first_node_id: u32::MAX - 1,
            node_count: 4,
        };
        let service = ClusterConvergenceService::new(executor.clone(), clock.clone(), config);

        let converged = service
            .reset_cluster_state(&ConvergenceTarget::default(), Duration::from_secs(5))
            .await
            .unwrap();

        assert!(!converged);
        assert_eq!(
            executor.count(&format!("hwcfg -F -E DISK-{}:", u32::MAX - 1)),
            DISKS_PER_NODE
        );
    }

    #[tokio::test]
    async fn test_transport_failure_aborts_wait() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok(capture(&[(101, true, [false; DISKS_PER_NODE])])),
            Err(CommandError::ExecutionFailed("connection reset".into())),
        ]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 1);

        let result = service
            .wait_for_node_online(101, Duration::from_secs(600))
            .await;
        assert!(matches!(result, Err(ClusterError::Command(_))));
        assert_eq!(executor.count("hwstat"), 2);
    }

    #[tokio::test]
    async fn test_parse_failure_aborts_wait() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(
            "DISK-101:0 DISK desc ENABLED\n".to_string()
        )]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 1);

        let result = service
            .wait_for_node_online(101, Duration::from_secs(600))
            .await;
        assert!(matches!(
            result,
            Err(ClusterError::Parse(ParseError::OrphanDiskRecord { .. }))
        ));
    }

    #[tokio::test]
    async fn test_reset_times_out_with_one_action_per_disk_per_poll() {
        let mut nodes: Vec<(u32, bool, [bool; DISKS_PER_NODE])> =
            (101..=104).map(|n| (n, true, ALL)).collect();
        nodes.push((105, true, [true, true, false, true]));
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(capture(&nodes))]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 5);

        let converged = service
            .reset_cluster_state(&ConvergenceTarget::default(), Duration::from_secs(15))
            .await
            .unwrap();

        assert!(!converged);
        assert_eq!(executor.count("hwstat"), 2);
        assert_eq!(executor.count("hwcfg -F -E NODE-105"), 2);
        assert_eq!(executor.count("hwcfg -F -E DISK-105:2"), 2);
        assert_eq!(executor.commands().len(), 6);
        assert_eq!(clock.sleeps(), vec![Duration::from_secs(10)]);
    }

    #[tokio::test]
    async fn test_reset_converges_after_correction() {
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Ok(capture(&[(101, true, ALL), (102, false, ALL)])),
            Ok(capture(&[(101, true, ALL), (102, true, ALL)])),
        ]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 2);

        assert!(service
            .reset_cluster_state(&ConvergenceTarget::default(), Duration::from_secs(60))
            .await
            .unwrap());
        // every slot of the node outside the cluster was nudged once
        assert_eq!(executor.count("hwcfg -F -E NODE-102"), DISKS_PER_NODE);
        assert_eq!(executor.count("hwcfg -F -E DISK-102:"), DISKS_PER_NODE);
        assert_eq!(executor.count("hwstat"), 2);
    }

    #[tokio::test]
    async fn test_reset_respects_declared_offline() {
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(capture(&[
            (101, true, [true, false, true, true]),
            (102, false, ALL),
        ]))]));
        let clock = Arc::new(ManualClock::new());
        let service = service(&executor, &clock, 2);
        let target = ConvergenceTarget::new([102], [DiskId::new(101, 1)]);

        assert!(service
            .reset_cluster_state(&target, Duration::from_secs(60))
            .await
            .unwrap());
        assert_eq!(executor.commands(), vec!["hwstat".to_string()]);
        assert!(clock.sleeps().is_empty());
    }

    #[tokio::test]
    async fn test_fetch_ipmi_and_sensors() {
        struct Fixed;

        #[async_trait]
        impl CommandExecutor for Fixed {
            async fn execute(
                &self,
                command: &RemoteCommand,
            ) -> Result<CommandOutput, CommandError> {
                Ok(match command.command.as_str() {
                    "version -v" => CommandOutput::ok("NODE-101:\nSMDC version: Unavailable\n"),
                    "sensors" => CommandOutput::ok("NODE-101:\nCPU Temperature 40 C\n"),
                    _ => CommandOutput {
                        stderr: "unknown command".into(),
                        exit_code: Some(127),
                        ..Default::default()
                    },
                })
            }

            async fn execute_with_privileges(
                &self,
                command: &RemoteCommand,
            ) -> Result<CommandOutput, CommandError> {
                self.execute(command).await
            }
        }

        let service = ClusterConvergenceService::new(
            Arc::new(Fixed),
            Arc::new(ManualClock::new()),
            config(1),
        );

        let ipmi = service.fetch_ipmi_availability().await.unwrap();
        assert_eq!(ipmi.is_available(101), Ok(false));

        let sensors = service.fetch_sensors().await.unwrap();
        assert_eq!(sensors.reading(101, "CPU Temperature").unwrap().value, 40.0);

        assert!(matches!(
            service.fetch_hwstat().await,
            Err(ClusterError::Command(CommandError::NonZeroExit {
                exit_code: Some(127),
                ..
            }))
        ));
    }
}
