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

use std::time::Duration;
use thiserror::Error;

use super::entities::FruType;

/// Structural failures while turning CLI output into domain models
///
/// Every variant is fatal for the enclosing parse: no partial model is ever
/// returned. Lines that are merely unrecognized are logged, not reported here.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ParseError {
    /// A line does not have the shape its grammar requires
    #[error("malformed record '{line}': {reason}")]
    MalformedRecord { line: String, reason: String },

    /// Shape is correct but the category or status is outside the allowed vocabulary
    #[error("invalid {fru_type} state for '{name}': {status}")]
    InvalidFruState {
        fru_type: FruType,
        name: String,
        status: String,
    },

    /// A DISK line was seen before any NODE line
    #[error("disk record without an owning node: '{line}'")]
    OrphanDiskRecord { line: String },

    /// More DISK lines followed a NODE line than the node has slots
    #[error("node {node_id} has more than {max} disks")]
    DiskSlotOverflow { node_id: u32, max: usize },

    /// A fixed line-count expectation was violated
    #[error("unexpected output shape from '{command}': expected {expected} lines, found {found}")]
    UnexpectedOutputShape {
        command: String,
        expected: usize,
        found: usize,
    },

    /// Lookup of a node that never appeared in the parsed output
    #[error("no entry recorded for node {0}")]
    UnknownNode(u32),
}

impl ParseError {
    pub(crate) fn malformed(line: &str, reason: impl Into<String>) -> Self {
        ParseError::MalformedRecord {
            line: line.to_string(),
            reason: reason.into(),
        }
    }
}

/// Remote command execution errors
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CommandError {
    /// The transport could not run the command at all
    #[error("Command execution failed: {0}")]
    ExecutionFailed(String),

    /// The command did not finish within its timeout
    #[error("Command '{command}' timed out after {after:?}")]
    Timeout { command: String, after: Duration },

    /// The command ran but reported failure
    #[error("Command '{command}' on {host} failed with exit code {exit_code:?}: {stderr}")]
    NonZeroExit {
        host: String,
        command: String,
        exit_code: Option<i32>,
        stderr: String,
    },

    /// The command could not be built from the given arguments
    #[error("Invalid arguments: {0}")]
    InvalidArguments(String),
}

/// Errors surfaced by the cluster services
///
/// Convergence timeouts are not errors; they are reported as `Ok(false)`.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ClusterError {
    /// Transport failure while talking to the appliance
    #[error(transparent)]
    Command(#[from] CommandError),

    /// The appliance answered with output we could not parse
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("missing property: {0}")]
    MissingProperty(String),

    /// Parsed fine but describes something that cannot exist
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}
