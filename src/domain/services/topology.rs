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

//! Multi-cell topology readers

use crate::domain::{
    parse_cellcfg_output, parse_hiveadm_cells, Cell, ClusterError, CommandTemplates,
};
use crate::ports::{CommandExecutor, RemoteCommand};
use log::debug;
use std::collections::HashMap;
use std::sync::Arc;

async fn run(
    executor: &dyn CommandExecutor,
    host: &str,
    command_line: &str,
) -> Result<String, ClusterError> {
    let command = RemoteCommand::new(host, command_line);
    debug!("{}: {}", command.host, command.command);
    let output = executor.execute(&command).await?.into_checked(&command)?;
    Ok(output.stdout)
}

/// Reads the cell list of a hive through `hiveadm`
pub struct Hiveadm {
    executor: Arc<dyn CommandExecutor>,
    command: String,
}

impl Hiveadm {
    pub fn new(executor: Arc<dyn CommandExecutor>, commands: &CommandTemplates) -> Self {
        Self {
            executor,
            command: commands.hiveadm.clone(),
        }
    }

    /// List the cells known to the hive behind `admin_endpoint`
    ///
    /// Only `cell_id`, `admin_vip` and `data_vip` are populated.
    pub async fn list_cells(&self, admin_endpoint: &str) -> Result<Vec<Cell>, ClusterError> {
        let stdout = run(self.executor.as_ref(), admin_endpoint, &self.command).await?;
        Ok(parse_hiveadm_cells(&stdout)?)
    }
}

/// Full per-cell topology through `cellcfg`, on top of [`Hiveadm`]
///
/// Cells read once are cached by id and served without another command.
pub struct Cellcfg {
    hiveadm: Hiveadm,
    executor: Arc<dyn CommandExecutor>,
    commands: CommandTemplates,
    admin_endpoint: String,
    cache: HashMap<u32, Cell>,
}

impl Cellcfg {
    pub fn new(
        hiveadm: Hiveadm,
        executor: Arc<dyn CommandExecutor>,
        commands: &CommandTemplates,
        admin_endpoint: &str,
    ) -> Self {
        Self {
            hiveadm,
            executor,
            commands: commands.clone(),
            admin_endpoint: admin_endpoint.to_string(),
            cache: HashMap::new(),
        }
    }

    /// Seed the cache with topologies that are already known
    ///
    /// Cells lacking the extended fields are ignored.
    pub fn with_cached(mut self, cells: impl IntoIterator<Item = Cell>) -> Self {
        for cell in cells.into_iter().filter(Cell::has_full_topology) {
            self.cache.insert(cell.cell_id, cell);
        }
        self
    }

    /// Full topology of one cell
    pub async fn get_cell(&mut self, cell_id: u32) -> Result<Cell, ClusterError> {
        if let Some(cell) = self.cache.get(&cell_id) {
            return Ok(cell.clone());
        }

        let stdout = run(
            self.executor.as_ref(),
            &self.admin_endpoint,
            &self.commands.cellcfg_for(cell_id),
        )
        .await?;
        let cell = parse_cellcfg_output(cell_id, &stdout)?;
        self.cache.insert(cell_id, cell.clone());
        Ok(cell)
    }

    /// Full topology of every cell `hiveadm` reports, in listing order
    pub async fn list_cells(&mut self) -> Result<Vec<Cell>, ClusterError> {
        let listed = self.hiveadm.list_cells(&self.admin_endpoint).await?;
        let mut cells = Vec::with_capacity(listed.len());
        for cell in listed {
            cells.push(self.get_cell(cell.cell_id).await?);
        }
        Ok(cells)
    }
}
