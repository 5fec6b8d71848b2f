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

//! Field-replaceable unit row parsing
//!
//! One `hwstat` row becomes one record. Syntax problems are reported as
//! `MalformedRecord`; rows with the right shape but the wrong category or
//! status vocabulary are reported as `InvalidFruState`.

use super::common::{fru_status, parse_compound_id, parse_prefixed_id, FRU_LINE_RE};
use crate::domain::{
    DiskRecord, FruRecord, FruType, NodeRecord, ParseError, DISKS_PER_NODE,
};

const SP_STATES: &[&str] = &["ONLINE", "OFFLINE", "UNKNOWN"];
const SWITCH_STATES: &[&str] = &["ACTIVE", "STANDBY", "OFFLINE", "UNKNOWN"];

/// Parse one `<name> <type> <fruId> <STATUS>` row
///
/// # Arguments
/// * `line` - A single `hwstat` row
///
/// # Returns
/// * `Ok(FruRecord)` - Parsed record
/// * `Err(ParseError::MalformedRecord)` - Not four tokens, lowercase status, or unknown type
pub fn parse_fru_record(line: &str) -> Result<FruRecord, ParseError> {
    let line = line.trim();
    let caps = FRU_LINE_RE
        .captures(line)
        .ok_or_else(|| ParseError::malformed(line, "expected '<name> <type> <fruId> <STATUS>'"))?;

    let fru_type = FruType::from_token(&caps["type"]).ok_or_else(|| {
        ParseError::malformed(line, format!("unknown FRU type '{}'", &caps["type"]))
    })?;

    Ok(FruRecord {
        name: caps["name"].to_string(),
        fru_type,
        fru_id: caps["fru_id"].to_string(),
        status: fru_status(&caps).to_string(),
    })
}

fn parse_validated(
    line: &str,
    expected: FruType,
    name_prefixes: &[&str],
    allowed: &[&str],
) -> Result<FruRecord, ParseError> {
    let record = parse_fru_record(line)?;

    let name_ok = name_prefixes.iter().any(|p| record.name.starts_with(p));
    if record.fru_type != expected || !name_ok || !allowed.contains(&record.status.as_str()) {
        return Err(ParseError::InvalidFruState {
            fru_type: expected,
            name: record.name,
            status: record.status,
        });
    }

    Ok(record)
}

/// Parse a service-processor row (`SN-101 SN <id> [ONLINE]`)
///
/// Status must be ONLINE, OFFLINE or UNKNOWN.
pub fn parse_service_processor_record(line: &str) -> Result<FruRecord, ParseError> {
    parse_validated(line, FruType::Sp, &["SN-", "SP-"], SP_STATES)
}

/// Parse a switch row (`SWITCH-1 SWITCH <id> [ACTIVE]`)
///
/// Status must be ACTIVE, STANDBY, OFFLINE or UNKNOWN.
pub fn parse_switch_record(line: &str) -> Result<FruRecord, ParseError> {
    parse_validated(line, FruType::Switch, &["SWITCH-"], SWITCH_STATES)
}

/// Parse a `DISK-<id> DISK <descriptor> <STATUS>` row
///
/// An id that is not `<node>:<slot>` leaves both coordinates unset instead of
/// failing; placeholder rows for absent hardware look like that.
pub fn parse_disk_record(line: &str) -> Result<DiskRecord, ParseError> {
    let fru = parse_fru_record(line)?;
    if fru.fru_type != FruType::Disk {
        return Err(ParseError::malformed(line.trim(), "expected a DISK row"));
    }
    let id = fru
        .name
        .strip_prefix("DISK-")
        .ok_or_else(|| ParseError::malformed(line.trim(), "disk name must start with 'DISK-'"))?;

    let (node_id, disk_slot) = match parse_compound_id(id) {
        Some((node, slot)) => (Some(node), Some(slot)),
        None => (None, None),
    };
    let enabled = fru.status == "ENABLED";

    Ok(DiskRecord {
        fru,
        node_id,
        disk_slot,
        enabled,
    })
}

/// Parse a `NODE-<id> NODE <fruId> <ONLINE|OFFLINE>` row
///
/// The returned record has no disks attached yet.
pub fn parse_node_record(line: &str) -> Result<NodeRecord, ParseError> {
    let fru = parse_fru_record(line)?;
    if fru.fru_type != FruType::Node {
        return Err(ParseError::malformed(line.trim(), "expected a NODE row"));
    }
    let node_id = parse_prefixed_id(&fru.name, "NODE-")
        .ok_or_else(|| ParseError::malformed(line.trim(), "node name must be 'NODE-<id>'"))?;

    let in_cluster = match fru.status.as_str() {
        "ONLINE" => true,
        "OFFLINE" => false,
        _ => {
            return Err(ParseError::InvalidFruState {
                fru_type: FruType::Node,
                name: fru.name,
                status: fru.status,
            })
        }
    };

    Ok(NodeRecord {
        fru,
        node_id,
        in_cluster,
        disks: Default::default(),
    })
}

/// Attach a disk at a sequential position of a node
pub(crate) fn attach_disk(
    node: &mut NodeRecord,
    index: usize,
    disk: DiskRecord,
) -> Result<(), ParseError> {
    let slot = node
        .disks
        .get_mut(index)
        .ok_or(ParseError::DiskSlotOverflow {
            node_id: node.node_id,
            max: DISKS_PER_NODE,
        })?;
    *slot = Some(disk);
    Ok(())
}
