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

//! `sensors` output parsing

use super::common::{parse_node_marker, significant_lines};
use crate::domain::{ParseError, SensorReading, SensorReport};
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;

lazy_static! {
    static ref SENSOR_LINE_RE: Regex =
        Regex::new(r"^(?P<name>.+?)\s+(?P<value>-?\d+(?:\.\d+)?)\s+(?P<unit>\S+)$").unwrap();
}

/// Parse `sensors` output into readings grouped by node
///
/// Expected format:
/// ```text
/// NODE-101:
///   DDR Voltage        2.61 Volts
///   CPU Temperature    33 C
/// ```
pub fn parse_sensors(output: &str) -> Result<SensorReport, ParseError> {
    let mut report = SensorReport::default();
    let mut current: Option<u32> = None;

    for line in significant_lines(output) {
        if let Some(node_id) = parse_node_marker(line) {
            current = Some(node_id);
            report.readings.entry(node_id).or_default();
            continue;
        }

        let Some(caps) = SENSOR_LINE_RE.captures(line) else {
            warn!("sensors: unrecognized line '{line}'");
            continue;
        };

        let node_id =
            current.ok_or_else(|| ParseError::malformed(line, "sensor reading before any node"))?;
        let value = caps["value"]
            .parse()
            .map_err(|e| ParseError::malformed(line, format!("invalid value: {e}")))?;

        report.readings.entry(node_id).or_default().push(SensorReading {
            node_id,
            name: caps["name"].to_string(),
            value,
            unit: caps["unit"].to_string(),
        });
    }

    Ok(report)
}
