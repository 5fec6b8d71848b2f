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

//! Common parsing utilities and helper functions

use lazy_static::lazy_static;
use regex::{Captures, Regex};

lazy_static! {
    /// `<name> <type> <fruId> <STATUS>`, the status either bare or fully bracketed
    pub static ref FRU_LINE_RE: Regex = Regex::new(
        r"^(?P<name>\S+)\s+(?P<type>\S+)\s+(?P<fru_id>\S+)\s+(?:\[(?P<status>[A-Z]+)\]|(?P<bare>[A-Z]+))$"
    )
    .unwrap();
    /// Node block marker used by `version -v` and `sensors`
    pub static ref NODE_MARKER_RE: Regex = Regex::new(r"^NODE-(?P<id>\d{3}):$").unwrap();
}

/// Status token of a [`FRU_LINE_RE`] match, without brackets
pub fn fru_status<'t>(caps: &Captures<'t>) -> &'t str {
    caps.name("status")
        .or_else(|| caps.name("bare"))
        .map_or("", |m| m.as_str())
}

/// Iterate over trimmed, non-blank lines of a capture
pub fn significant_lines(output: &str) -> impl Iterator<Item = &str> {
    output.lines().map(str::trim).filter(|l| !l.is_empty())
}

/// `true` for table rules such as `-------  ----`
pub fn is_separator_line(line: &str) -> bool {
    !line.is_empty() && line.chars().all(|c| c == '-' || c.is_whitespace())
}

/// Extract the numeric id from a component name like `NODE-101`
///
/// # Arguments
/// * `name` - Component name
/// * `prefix` - Expected prefix including the dash (e.g. `"NODE-"`)
///
/// # Returns
/// * `Some(u32)` - Parsed id
/// * `None` - Prefix missing or id not numeric
pub fn parse_prefixed_id(name: &str, prefix: &str) -> Option<u32> {
    name.strip_prefix(prefix)?.parse().ok()
}

/// Decode a `<node>:<slot>` compound id
///
/// Both parts must be numeric; otherwise neither is returned.
pub fn parse_compound_id(id: &str) -> Option<(u32, u32)> {
    let (node, slot) = id.split_once(':')?;
    Some((node.parse().ok()?, slot.parse().ok()?))
}

/// Read the node id off a `NODE-<3 digits>:` marker line
pub fn parse_node_marker(line: &str) -> Option<u32> {
    NODE_MARKER_RE
        .captures(line)
        .and_then(|caps| caps["id"].parse().ok())
}
