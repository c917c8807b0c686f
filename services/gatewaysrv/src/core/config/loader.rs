//! Data point configuration loader
//!
//! Reads `PORTConfig.json`, `DEVConfig.json` and every `VARConfig*.json` from
//! one directory into a [`DataPointConfig`] snapshot. Variable ids are
//! reassigned from 1 across all variable files in filename order.

use serde::de::DeserializeOwned;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use super::types::{
    DeviceConfig, DeviceConfigFile, PortConfig, PortConfigFile, PortDevices, VariableConfig,
    VariableConfigFile, VariableGroup,
};
use crate::error::{ErrorExt, Result};

pub const PORT_CONFIG_FILE: &str = "PORTConfig.json";
pub const DEVICE_CONFIG_FILE: &str = "DEVConfig.json";
pub const VARIABLE_CONFIG_PREFIX: &str = "VARConfig";

/// Static configuration of every port, device and variable
#[derive(Debug, Clone, Default)]
pub struct DataPointConfig {
    pub ports: Vec<PortConfig>,
    pub devices: Vec<PortDevices>,
    pub variables: Vec<VariableGroup>,
}

impl DataPointConfig {
    /// Devices of a port; only the first entry for a port counts
    pub fn devices_for(&self, port_name: &str) -> &[DeviceConfig] {
        self.devices
            .iter()
            .find(|entry| entry.port_name == port_name)
            .map(|entry| entry.dev_list.as_slice())
            .unwrap_or_default()
    }

    /// Variables bound to one (port, device) pair
    pub fn variables_for<'a>(
        &'a self,
        port_name: &'a str,
        dev_name: &'a str,
    ) -> impl Iterator<Item = &'a VariableConfig> + 'a {
        self.variables
            .iter()
            .filter(move |group| group.port_name == port_name && group.dev_name == dev_name)
            .flat_map(|group| group.var_list.iter())
    }

    pub fn variable_count(&self) -> usize {
        self.variables.iter().map(|group| group.var_list.len()).sum()
    }

    /// Load the three kinds of file from `dir`
    pub fn load(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();

        let ports = read_optional::<PortConfigFile>(&dir.join(PORT_CONFIG_FILE))?
            .unwrap_or_default()
            .port_configs;
        let devices = read_optional::<DeviceConfigFile>(&dir.join(DEVICE_CONFIG_FILE))?
            .unwrap_or_default()
            .device_configs;

        let mut groups = Vec::new();
        for path in variable_files(dir)? {
            let file: VariableConfigFile = read_json(&path)?;
            groups.extend(file.variable_configs);
        }

        let mut config = Self {
            ports,
            devices,
            variables: Vec::new(),
        };
        config.variables = config.bind_variables(groups);

        info!(
            dir = %dir.display(),
            ports = config.ports.len(),
            variables = config.variable_count(),
            "Data point config loaded"
        );
        Ok(config)
    }

    /// Drop orphaned groups, number ids from 1 in file order, merge duplicates
    fn bind_variables(&self, groups: Vec<VariableGroup>) -> Vec<VariableGroup> {
        let mut bound: Vec<VariableGroup> = Vec::new();
        let mut next_id = 1i64;

        for mut group in groups {
            let port_known = self.ports.iter().any(|p| p.port_name == group.port_name);
            let device_known = self
                .devices_for(&group.port_name)
                .iter()
                .any(|d| d.dev_name == group.dev_name);
            if !port_known || !device_known {
                warn!(
                    port = %group.port_name,
                    device = %group.dev_name,
                    count = group.var_list.len(),
                    "Variables reference an unknown port or device, dropped"
                );
                continue;
            }

            for variable in group.var_list.iter_mut() {
                variable.id = next_id;
                next_id += 1;
            }

            match bound
                .iter_mut()
                .find(|b| b.port_name == group.port_name && b.dev_name == group.dev_name)
            {
                Some(existing) => existing.var_list.extend(group.var_list),
                None => bound.push(group),
            }
        }
        bound
    }
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let source = path.display().to_string();
    let content = fs::read_to_string(path).config_error(&source)?;
    serde_json::from_str(&content).config_error(&source)
}

/// A missing file is not an error; an unreadable one is
fn read_optional<T: DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    if !path.exists() {
        warn!(path = %path.display(), "Config file not found, treated as empty");
        return Ok(None);
    }
    read_json(path).map(Some)
}

/// `VARConfig*` files in sorted filename order
fn variable_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        warn!(dir = %dir.display(), "Config directory not found");
        return Ok(Vec::new());
    }

    let mut files: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_file()
                && path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(VARIABLE_CONFIG_PREFIX))
        })
        .collect();
    files.sort();
    Ok(files)
}
