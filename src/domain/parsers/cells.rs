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

//! Cell topology parsing for `hiveadm` and `cellcfg`

use super::common::significant_lines;
use crate::domain::{Cell, ParseError};
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HIVEADM_CELL_RE: Regex = Regex::new(
        r"^-\s+Cell\s+(?P<id>\d+):\s+adminVIP\s+=\s+(?P<admin>[^\s,]+),\s+dataVIP\s+=\s+(?P<data>\S+)$"
    )
    .unwrap();
    static ref CELLCFG_LINE_RE: Regex =
        Regex::new(r"^(?P<label>[^=]+?)\s*=\s*(?P<value>\S+)$").unwrap();
}

/// Number of lines `cellcfg -c <id>` prints
pub const CELLCFG_LINES: usize = 5;

/// Parse `hiveadm` cell listing
///
/// Expected format:
/// ```text
/// There are 2 cells in the hive:
/// - Cell 0: adminVIP = 10.7.224.21, dataVIP = 10.7.224.22
/// - Cell 1: adminVIP = 10.7.225.21, dataVIP = 10.7.225.22
/// ```
///
/// The first line is a header and is discarded. Every remaining line must
/// match the cell grammar exactly.
pub fn parse_hiveadm_cells(output: &str) -> Result<Vec<Cell>, ParseError> {
    significant_lines(output)
        .skip(1)
        .map(|line| {
            let caps = HIVEADM_CELL_RE.captures(line).ok_or_else(|| {
                ParseError::malformed(
                    line,
                    "expected '- Cell <id>: adminVIP = <ip>, dataVIP = <ip>'",
                )
            })?;
            let cell_id = caps["id"]
                .parse()
                .map_err(|e| ParseError::malformed(line, format!("invalid cell id: {e}")))?;
            Ok(Cell::new(cell_id, &caps["admin"], &caps["data"]))
        })
        .collect()
}

/// Parse `cellcfg -c <id>` output into a fully populated cell
///
/// The five lines are positional: admin ip, data ip, service-processor ip,
/// subnet, gateway. Each is `<label> = <value>`.
pub fn parse_cellcfg_output(cell_id: u32, output: &str) -> Result<Cell, ParseError> {
    let lines: Vec<&str> = significant_lines(output).collect();
    if lines.len() != CELLCFG_LINES {
        return Err(ParseError::UnexpectedOutputShape {
            command: format!("cellcfg -c {cell_id}"),
            expected: CELLCFG_LINES,
            found: lines.len(),
        });
    }

    let values = lines
        .iter()
        .map(|line| {
            CELLCFG_LINE_RE
                .captures(line)
                .map(|caps| caps["value"].to_string())
                .ok_or_else(|| ParseError::malformed(line, "expected '<label> = <value>'"))
        })
        .collect::<Result<Vec<_>, _>>()?;

    let [admin, data, sp, subnet, gateway]: [String; CELLCFG_LINES] = values
        .try_into()
        .map_err(|_| ParseError::malformed(output.trim(), "cellcfg value count changed"))?;

    Ok(Cell {
        cell_id,
        admin_vip: admin,
        data_vip: data,
        sp_ip: Some(sp),
        subnet: Some(subnet),
        gateway: Some(gateway),
    })
}
