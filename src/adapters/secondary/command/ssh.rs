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

//! Remote command execution over ssh

use crate::domain::CommandError;
use crate::ports::{CommandExecutor, CommandOutput, RemoteCommand};
use async_trait::async_trait;
use log::{debug, warn};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tokio::time::timeout;

/// Exit status ssh itself uses for connection-level failures
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Executor that runs appliance CLI commands through the `ssh` client
///
/// Regular commands log in as the admin user, privileged ones as the
/// privileged user. Only failures that kept the command from starting are
/// retried; timeouts and commands that ran and failed are returned as-is.
pub struct SshCommandExecutor {
    /// ssh client binary
    program: String,
    admin_user: String,
    privileged_user: String,
    port: u16,
    /// ssh ConnectTimeout
    connect_timeout: Duration,
    /// Default timeout for commands
    default_timeout: Duration,
    /// Number of retry attempts for connection failures
    retry_count: u32,
}

impl SshCommandExecutor {
    /// Create a new ssh command executor
    ///
    /// # Arguments
    /// * `admin_user` - Login for regular commands
    /// * `privileged_user` - Login for privileged commands
    /// * `port` - ssh port on the appliance
    pub fn new(admin_user: &str, privileged_user: &str, port: u16) -> Self {
        Self {
            program: "ssh".to_string(),
            admin_user: admin_user.to_string(),
            privileged_user: privileged_user.to_string(),
            port,
            connect_timeout: Duration::from_secs(10),
            default_timeout: Duration::from_secs(30),
            retry_count: 2,
        }
    }

    /// Create an ssh command executor with default settings
    pub fn with_defaults() -> Self {
        Self::new("admin", "root", 22)
    }

    /// Use a different ssh client binary
    pub fn program(mut self, program: &str) -> Self {
        self.program = program.to_string();
        self
    }

    /// Set the default timeout and retry policy
    pub fn limits(
        mut self,
        default_timeout: Duration,
        connect_timeout: Duration,
        retry_count: u32,
    ) -> Self {
        self.default_timeout = default_timeout;
        self.connect_timeout = connect_timeout;
        self.retry_count = retry_count;
        self
    }

    /// ssh argument vector for `command`
    fn ssh_args(&self, command: &RemoteCommand, privileged: bool) -> Vec<String> {
        let user = if privileged {
            &self.privileged_user
        } else {
            &self.admin_user
        };
        vec![
            "-o".to_string(),
            "BatchMode=yes".to_string(),
            "-o".to_string(),
            "StrictHostKeyChecking=no".to_string(),
            "-o".to_string(),
            format!("ConnectTimeout={}", self.connect_timeout.as_secs().max(1)),
            "-p".to_string(),
            self.port.to_string(),
            "-l".to_string(),
            user.clone(),
            command.host.clone(),
            "--".to_string(),
            command.command.clone(),
        ]
    }

    /// Execute a command, retrying when ssh could not reach the host
    async fn execute_with_retry(
        &self,
        command: &RemoteCommand,
        privileged: bool,
    ) -> Result<CommandOutput, CommandError> {
        if command.host.is_empty() {
            return Err(CommandError::InvalidArguments(format!(
                "no host given for '{}'",
                command.command
            )));
        }

        let mut attempt = 0;
        loop {
            match self.execute_once(command, privileged).await {
                Ok(output) => return Ok(output),
                Err(e @ CommandError::ExecutionFailed(_)) if attempt < self.retry_count => {
                    attempt += 1;
                    warn!("{} on {} failed ({e}), retry {attempt}", command.command, command.host);
                    tokio::time::sleep(Duration::from_millis(100 * attempt as u64)).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Execute a command once
    async fn execute_once(
        &self,
        command: &RemoteCommand,
        privileged: bool,
    ) -> Result<CommandOutput, CommandError> {
        let command_timeout = command.timeout.unwrap_or(self.default_timeout);

        let mut cmd = Command::new(&self.program);
        cmd.args(self.ssh_args(command, privileged))
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .stdin(Stdio::null())
            .kill_on_drop(true);

        debug!("Executing on {}: {}", command.host, command.command);

        match timeout(command_timeout, cmd.output()).await {
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let exit_code = output.status.code();

                if exit_code == Some(SSH_TRANSPORT_FAILURE) {
                    return Err(CommandError::ExecutionFailed(format!(
                        "ssh to {} failed: {}",
                        command.host,
                        stderr.trim()
                    )));
                }

                let success = output.status.success();
                if !success {
                    debug!("'{}' exited with {exit_code:?}", command.command);
                }

                Ok(CommandOutput {
                    stdout,
                    stderr,
                    exit_code,
                    success,
                })
            }
            Ok(Err(e)) => Err(CommandError::ExecutionFailed(format!(
                "Failed to execute '{}' on {}: {}",
                command.command, command.host, e
            ))),
            Err(_) => Err(CommandError::Timeout {
                command: command.command.clone(),
                after: command_timeout,
            }),
        }
    }
}

#[async_trait]
impl CommandExecutor for SshCommandExecutor {
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, CommandError> {
        self.execute_with_retry(command, false).await
    }

    async fn execute_with_privileges(
        &self,
        command: &RemoteCommand,
    ) -> Result<CommandOutput, CommandError> {
        self.execute_with_retry(command, true).await
    }
}
