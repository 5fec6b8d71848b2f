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

//! Management controller availability from `version -v`

use super::common::{parse_node_marker, significant_lines};
use crate::domain::IpmiAvailability;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref SMDC_VERSION_RE: Regex = Regex::new(r"^SMDC version:\s*(?P<value>.+)$").unwrap();
}

const UNAVAILABLE: &str = "Unavailable";

/// Parse `version -v` output into per-node controller availability
///
/// A `NODE-<id>:` marker makes that node pending; the next `SMDC version:`
/// line resolves it. A node whose block never reports an SMDC version is left
/// out and later lookups for it fail.
pub fn parse_ipmi_availability(output: &str) -> IpmiAvailability {
    let mut availability = IpmiAvailability::default();
    let mut pending: Option<u32> = None;

    for line in significant_lines(output) {
        if let Some(node_id) = parse_node_marker(line) {
            pending = Some(node_id);
            continue;
        }

        if let Some(caps) = SMDC_VERSION_RE.captures(line) {
            if let Some(node_id) = pending.take() {
                let value = caps["value"].trim();
                availability.nodes.insert(node_id, value != UNAVAILABLE);
            }
        }
    }

    availability
}
