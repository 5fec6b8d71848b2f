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

use crate::domain::CommandError;
use async_trait::async_trait;
use std::time::Duration;

/// A command line to run on a remote appliance host
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteCommand {
    /// Host (admin VIP or node address) to run on
    pub host: String,
    /// Full command line as the appliance shell expects it
    pub command: String,
    /// Execution timeout
    pub timeout: Option<Duration>,
}

impl RemoteCommand {
    /// Create a new remote command
    pub fn new(host: &str, command: &str) -> Self {
        Self {
            host: host.to_string(),
            command: command.to_string(),
            timeout: None,
        }
    }

    /// Set execution timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Command execution result
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,
    /// Standard error
    pub stderr: String,
    /// Exit status code
    pub exit_code: Option<i32>,
    /// Whether command was successful
    pub success: bool,
}

impl CommandOutput {
    /// Successful output carrying `stdout`
    pub fn ok(stdout: &str) -> Self {
        Self {
            stdout: stdout.to_string(),
            stderr: String::new(),
            exit_code: Some(0),
            success: true,
        }
    }

    /// Turn a failed run into an error, keep a successful one
    pub fn into_checked(self, command: &RemoteCommand) -> Result<Self, CommandError> {
        if self.success {
            Ok(self)
        } else {
            Err(CommandError::NonZeroExit {
                host: command.host.clone(),
                command: command.command.clone(),
                exit_code: self.exit_code,
                stderr: self.stderr.trim().to_string(),
            })
        }
    }
}

/// Secondary port - Remote command execution abstraction
///
/// This interface abstracts how commands reach the appliance, allowing for
/// different implementations (ssh, a recorded transcript, mocked for testing, etc.)
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    /// Execute a command as the regular admin identity
    ///
    /// # Arguments
    /// * `command` - The command to execute
    ///
    /// # Returns
    /// * `Ok(CommandOutput)` - Command output and status
    /// * `Err(CommandError)` - Transport failure
    async fn execute(&self, command: &RemoteCommand) -> Result<CommandOutput, CommandError>;

    /// Execute a command as the privileged identity
    ///
    /// # Arguments
    /// * `command` - The command to execute
    ///
    /// # Returns
    /// * `Ok(CommandOutput)` - Command output and status
    /// * `Err(CommandError)` - Transport failure
    async fn execute_with_privileges(
        &self,
        command: &RemoteCommand,
    ) -> Result<CommandOutput, CommandError>;
}
