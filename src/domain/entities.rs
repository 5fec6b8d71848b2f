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

use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::errors::ParseError;

/// Number of disk slots in every node
pub const DISKS_PER_NODE: usize = 4;

/// Category of a field-replaceable unit as reported by `hwstat`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FruType {
    Node,
    Disk,
    /// Service processor, reported as `SP` or `SN`
    Sp,
    Switch,
}

impl FruType {
    /// Map a `hwstat` type column to a category
    pub fn from_token(token: &str) -> Option<Self> {
        match token {
            "NODE" => Some(FruType::Node),
            "DISK" => Some(FruType::Disk),
            "SP" | "SN" => Some(FruType::Sp),
            "SWITCH" => Some(FruType::Switch),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FruType::Node => "NODE",
            FruType::Disk => "DISK",
            FruType::Sp => "SP",
            FruType::Switch => "SWITCH",
        }
    }
}

impl fmt::Display for FruType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One parsed `hwstat` row
///
/// Built once per line by the parsers and never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FruRecord {
    pub(crate) name: String,
    pub(crate) fru_type: FruType,
    pub(crate) fru_id: String,
    pub(crate) status: String,
}

impl FruRecord {
    /// Component name, e.g. `NODE-101` or `DISK-101:2`
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fru_type(&self) -> FruType {
        self.fru_type
    }

    /// FRU identifier column (serial number, descriptor, or `-`)
    pub fn fru_id(&self) -> &str {
        &self.fru_id
    }

    /// Status token without brackets
    pub fn status(&self) -> &str {
        &self.status
    }

    fn render_row(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{:<14} {:<7} {:<32} [{}]",
            self.name,
            self.fru_type.as_str(),
            self.fru_id,
            self.status
        )
    }
}

/// A disk row together with the coordinates decoded from its name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiskRecord {
    pub(crate) fru: FruRecord,
    pub(crate) node_id: Option<u32>,
    pub(crate) disk_slot: Option<u32>,
    pub(crate) enabled: bool,
}

impl DiskRecord {
    pub fn fru(&self) -> &FruRecord {
        &self.fru
    }

    /// Owning node decoded from `DISK-<node>:<slot>`, `None` for opaque ids
    pub fn node_id(&self) -> Option<u32> {
        self.node_id
    }

    /// Slot decoded from `DISK-<node>:<slot>`, `None` for opaque ids
    pub fn disk_slot(&self) -> Option<u32> {
        self.disk_slot
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

/// A node row and the disks listed beneath it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NodeRecord {
    pub(crate) fru: FruRecord,
    pub(crate) node_id: u32,
    pub(crate) in_cluster: bool,
    pub(crate) disks: [Option<DiskRecord>; DISKS_PER_NODE],
}

impl NodeRecord {
    pub fn fru(&self) -> &FruRecord {
        &self.fru
    }

    pub fn node_id(&self) -> u32 {
        self.node_id
    }

    /// `true` when the node reported ONLINE
    pub fn in_cluster(&self) -> bool {
        self.in_cluster
    }

    /// Disk attached at a sequential slot position, if any
    pub fn disk(&self, index: usize) -> Option<&DiskRecord> {
        self.disks.get(index).and_then(Option::as_ref)
    }

    /// Attached disks in slot order, skipping empty positions
    pub fn disks(&self) -> impl Iterator<Item = &DiskRecord> {
        self.disks.iter().flatten()
    }
}

/// Parsed `hwstat` capture
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct HwStat {
    pub(crate) nodes: Vec<NodeRecord>,
}

impl HwStat {
    /// Nodes in the order they appeared in the output
    pub fn nodes(&self) -> &[NodeRecord] {
        &self.nodes
    }

    pub fn node(&self, node_id: u32) -> Option<&NodeRecord> {
        self.nodes.iter().find(|n| n.node_id == node_id)
    }

    /// Project the model onto (node, slot) online/offline coordinates
    ///
    /// Nodes outside the cluster and disks without a decodable slot contribute
    /// nothing.
    pub fn disk_mask(&self) -> DiskMask {
        let mut mask = DiskMask::default();
        for node in self.nodes.iter().filter(|n| n.in_cluster) {
            for disk in node.disks() {
                if let Some(slot) = disk.disk_slot {
                    let state = if disk.enabled {
                        DiskState::Online
                    } else {
                        DiskState::Offline
                    };
                    mask.states.insert((node.node_id, slot), state);
                }
            }
        }
        mask
    }

    /// Canonical `hwstat` table for this model
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for HwStat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{:<14} {:<7} {:<32} {}", "Component", "Type", "FRU ID", "Status")?;
        writeln!(f, "{:-<14} {:-<7} {:-<32} {:-<8}", "", "", "", "")?;
        for node in &self.nodes {
            node.fru.render_row(f)?;
            for disk in node.disks() {
                disk.fru.render_row(f)?;
            }
        }
        Ok(())
    }
}

/// Online/offline state of one disk coordinate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DiskState {
    Online,
    Offline,
}

/// Desired state for a node-level convergence wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NodeState {
    Online,
    Offline,
}

impl fmt::Display for NodeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeState::Online => f.write_str("ONLINE"),
            NodeState::Offline => f.write_str("OFFLINE"),
        }
    }
}

/// Cluster-wide map of (node, disk slot) to disk state
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DiskMask {
    states: BTreeMap<(u32, u32), DiskState>,
}

impl DiskMask {
    pub fn get(&self, node_id: u32, slot: u32) -> Option<DiskState> {
        self.states.get(&(node_id, slot)).copied()
    }

    pub fn is_online(&self, node_id: u32, slot: u32) -> bool {
        self.get(node_id, slot) == Some(DiskState::Online)
    }

    /// Whether a slot satisfies the desired node state
    ///
    /// Coordinates missing from the mask count as offline.
    pub fn matches(&self, node_id: u32, slot: u32, desired: NodeState) -> bool {
        match desired {
            NodeState::Online => self.is_online(node_id, slot),
            NodeState::Offline => !self.is_online(node_id, slot),
        }
    }

    /// Number of the node's slots that satisfy `desired`
    pub fn count_matching(&self, node_id: u32, desired: NodeState) -> usize {
        (0..DISKS_PER_NODE as u32)
            .filter(|&slot| self.matches(node_id, slot, desired))
            .count()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, u32, DiskState)> + '_ {
        self.states.iter().map(|(&(n, s), &state)| (n, s, state))
    }

    /// Node ids that have at least one coordinate
    pub fn node_ids(&self) -> BTreeSet<u32> {
        self.states.keys().map(|&(n, _)| n).collect()
    }
}

impl fmt::Display for DiskMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for node_id in self.node_ids() {
            write!(f, "NODE-{node_id}:")?;
            for slot in 0..DISKS_PER_NODE as u32 {
                let cell = match self.get(node_id, slot) {
                    Some(DiskState::Online) => '1',
                    Some(DiskState::Offline) => '0',
                    None => '-',
                };
                write!(f, " {cell}")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

impl Serialize for DiskMask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        struct Entry(u32, u32, DiskState);

        impl Serialize for Entry {
            fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
                let mut s = serializer.serialize_struct("DiskMaskEntry", 3)?;
                s.serialize_field("node_id", &self.0)?;
                s.serialize_field("slot", &self.1)?;
                s.serialize_field("state", &self.2)?;
                s.end()
            }
        }

        serializer.collect_seq(self.iter().map(|(n, s, state)| Entry(n, s, state)))
    }
}

/// Disk coordinate written as `<node>:<slot>`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DiskId {
    pub node_id: u32,
    pub slot: u32,
}

impl DiskId {
    pub fn new(node_id: u32, slot: u32) -> Self {
        Self { node_id, slot }
    }
}

impl FromStr for DiskId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (node, slot) = s
            .split_once(':')
            .ok_or_else(|| format!("disk id must be <node>:<slot>, got '{s}'"))?;
        let node_id = node
            .trim()
            .parse()
            .map_err(|e| format!("invalid node in '{s}': {e}"))?;
        let slot = slot
            .trim()
            .parse()
            .map_err(|e| format!("invalid slot in '{s}': {e}"))?;
        Ok(Self { node_id, slot })
    }
}

impl fmt::Display for DiskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node_id, self.slot)
    }
}

/// Nodes and disks a reset is allowed to leave offline
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConvergenceTarget {
    pub offline_nodes: BTreeSet<u32>,
    pub offline_disks: BTreeSet<DiskId>,
}

impl ConvergenceTarget {
    pub fn new(
        offline_nodes: impl IntoIterator<Item = u32>,
        offline_disks: impl IntoIterator<Item = DiskId>,
    ) -> Self {
        Self {
            offline_nodes: offline_nodes.into_iter().collect(),
            offline_disks: offline_disks.into_iter().collect(),
        }
    }

    /// Whether the coordinate has to be online for the cluster to count as reset
    pub fn expects_online(&self, node_id: u32, slot: u32) -> bool {
        !self.offline_nodes.contains(&node_id)
            && !self.offline_disks.contains(&DiskId::new(node_id, slot))
    }
}

/// Node ids making up the cluster
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClusterLayout {
    pub first_node_id: u32,
    pub node_count: u32,
}

impl ClusterLayout {
    /// Node ids in order, cut short at `u32::MAX`
    pub fn node_ids(&self) -> impl Iterator<Item = u32> {
        self.first_node_id..self.first_node_id.saturating_add(self.node_count)
    }

    /// `true` when every node id of the layout fits in a `u32`
    pub fn is_addressable(&self) -> bool {
        self.first_node_id.checked_add(self.node_count).is_some()
    }
}

impl Default for ClusterLayout {
    fn default() -> Self {
        Self {
            first_node_id: 101,
            node_count: 16,
        }
    }
}

/// Per-node management controller availability from `version -v`
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct IpmiAvailability {
    pub(crate) nodes: BTreeMap<u32, bool>,
}

impl IpmiAvailability {
    /// Whether the node's controller answered
    ///
    /// # Errors
    /// `ParseError::UnknownNode` when the output carried no resolved entry for `node_id`
    pub fn is_available(&self, node_id: u32) -> Result<bool, ParseError> {
        self.nodes
            .get(&node_id)
            .copied()
            .ok_or(ParseError::UnknownNode(node_id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = (u32, bool)> + '_ {
        self.nodes.iter().map(|(&n, &a)| (n, a))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// One cell of a multi-cell hive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cell {
    pub cell_id: u32,
    pub admin_vip: String,
    pub data_vip: String,
    /// Only known once the cell was read through `cellcfg`
    pub sp_ip: Option<String>,
    pub subnet: Option<String>,
    pub gateway: Option<String>,
}

impl Cell {
    pub fn new(cell_id: u32, admin_vip: &str, data_vip: &str) -> Self {
        Self {
            cell_id,
            admin_vip: admin_vip.to_string(),
            data_vip: data_vip.to_string(),
            sp_ip: None,
            subnet: None,
            gateway: None,
        }
    }

    /// `true` when the extended `cellcfg` fields are populated
    pub fn has_full_topology(&self) -> bool {
        self.sp_ip.is_some() && self.subnet.is_some() && self.gateway.is_some()
    }
}

/// Single `sensors` value
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SensorReading {
    pub node_id: u32,
    pub name: String,
    pub value: f64,
    pub unit: String,
}

/// `sensors` output grouped by node
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SensorReport {
    pub(crate) readings: BTreeMap<u32, Vec<SensorReading>>,
}

impl SensorReport {
    pub fn readings(&self, node_id: u32) -> &[SensorReading] {
        self.readings
            .get(&node_id)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn reading(&self, node_id: u32, name: &str) -> Option<&SensorReading> {
        self.readings(node_id).iter().find(|r| r.name == name)
    }

    pub fn node_ids(&self) -> impl Iterator<Item = u32> + '_ {
        self.readings.keys().copied()
    }
}
