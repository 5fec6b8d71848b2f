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

//! `hwstat` output parsing

use super::common::{is_separator_line, significant_lines};
use super::fru::{
    attach_disk, parse_disk_record, parse_node_record, parse_service_processor_record,
    parse_switch_record,
};
use crate::domain::{FruRecord, HwStat, ParseError};
use log::{debug, warn};

/// How a `hwstat` row is handled, decided by its leading token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineKind {
    Node,
    Disk,
    Switch,
    ServiceProcessor,
    Decoration,
    Unrecognized,
}

fn classify(line: &str) -> LineKind {
    if line.starts_with("NODE") {
        LineKind::Node
    } else if line.starts_with("DISK") {
        LineKind::Disk
    } else if line.starts_with("SWITCH") {
        LineKind::Switch
    } else if line.starts_with("SP") || line.starts_with("SN") {
        LineKind::ServiceProcessor
    } else if line.starts_with("Component") || is_separator_line(line) {
        LineKind::Decoration
    } else {
        LineKind::Unrecognized
    }
}

/// Parse a complete `hwstat` capture
///
/// Rows are consumed in order. A NODE row becomes the current node and every
/// following DISK row is attached to it at the next free position. SWITCH and
/// service-processor rows are recognized but not modeled; unknown rows are
/// logged and skipped.
///
/// # Returns
/// * `Ok(HwStat)` - Every node with its disks
/// * `Err(ParseError)` - First structural problem; no partial model is returned
pub fn parse_hwstat(output: &str) -> Result<HwStat, ParseError> {
    let mut hwstat = HwStat::default();
    // Index of the node DISK rows attach to, and its next free disk position
    let mut current: Option<usize> = None;
    let mut next_slot = 0usize;

    for line in significant_lines(output) {
        match classify(line) {
            LineKind::Node => {
                let node = parse_node_record(line)?;
                hwstat.nodes.push(node);
                current = Some(hwstat.nodes.len() - 1);
                next_slot = 0;
            }
            LineKind::Disk => {
                let index = current.ok_or_else(|| ParseError::OrphanDiskRecord {
                    line: line.to_string(),
                })?;
                let disk = parse_disk_record(line)?;
                attach_disk(&mut hwstat.nodes[index], next_slot, disk)?;
                next_slot += 1;
            }
            LineKind::Switch | LineKind::ServiceProcessor => {
                debug!("hwstat: skipping {line}");
            }
            LineKind::Decoration => {}
            LineKind::Unrecognized => {
                warn!("hwstat: unrecognized line '{line}'");
            }
        }
    }

    Ok(hwstat)
}

fn collect_rows(
    output: &str,
    kind: LineKind,
    parse: fn(&str) -> Result<FruRecord, ParseError>,
) -> Result<Vec<FruRecord>, ParseError> {
    significant_lines(output)
        .filter(|line| classify(line) == kind)
        .map(parse)
        .collect()
}

/// Validated SWITCH rows of a `hwstat` capture
pub fn parse_switches(output: &str) -> Result<Vec<FruRecord>, ParseError> {
    collect_rows(output, LineKind::Switch, parse_switch_record)
}

/// Validated service-processor (SP/SN) rows of a `hwstat` capture
pub fn parse_service_processors(output: &str) -> Result<Vec<FruRecord>, ParseError> {
    collect_rows(output, LineKind::ServiceProcessor, parse_service_processor_record)
}
