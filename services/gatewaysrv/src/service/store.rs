//! Data point store
//!
//! The in-memory port → device → variable hierarchy. Each enabled port owns
//! one driver; each variable owns the last sampled value and its timestamp.
//! The hierarchy itself is fixed after construction, only the samples change.

use chrono::{DateTime, Local};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::sampler;
use crate::core::config::loader::DataPointConfig;
use crate::core::config::types::{DeviceConfig, PortConfig, VariableConfig};
use crate::drivers::{create_driver, Driver, LinkStatus};
use crate::error::{GatewayError, Result};

/// Last sampled value of a variable
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Sample {
    /// `None` when the last read failed or nothing was sampled yet
    pub value: Option<f64>,
    pub timestamp: Option<DateTime<Local>>,
}

/// A variable and its sample slot
#[derive(Debug)]
pub struct VariableSlot {
    pub config: VariableConfig,
    sample: RwLock<Sample>,
}

impl VariableSlot {
    pub fn new(config: VariableConfig) -> Self {
        Self {
            config,
            sample: RwLock::new(Sample::default()),
        }
    }

    pub fn sample(&self) -> Sample {
        *self.sample.read()
    }

    /// Store a read result stamped with the current time
    pub fn record(&self, value: Option<f64>) {
        *self.sample.write() = Sample {
            value,
            timestamp: Some(Local::now()),
        };
    }
}

#[derive(Debug)]
pub struct DeviceNode {
    pub config: DeviceConfig,
    pub variables: Vec<VariableSlot>,
}

/// One enabled port with its devices and driver
#[derive(Debug)]
pub struct DataPoint {
    pub port: PortConfig,
    pub devices: Vec<DeviceNode>,
    pub driver: Arc<dyn Driver>,
}

impl DataPoint {
    /// Bind a port's devices and variables to a driver
    pub fn new(port: PortConfig, config: &DataPointConfig, driver: Arc<dyn Driver>) -> Self {
        let devices = config
            .devices_for(&port.port_name)
            .iter()
            .map(|device| DeviceNode {
                config: device.clone(),
                variables: config
                    .variables_for(&port.port_name, &device.dev_name)
                    .cloned()
                    .map(VariableSlot::new)
                    .collect(),
            })
            .collect();
        Self {
            port,
            devices,
            driver,
        }
    }

    pub fn variable_count(&self) -> usize {
        self.devices.iter().map(|d| d.variables.len()).sum()
    }
}

/// A resolved variable together with the context needed to talk to it
#[derive(Debug, Clone, Copy)]
pub struct VariableRef<'a> {
    pub point: &'a DataPoint,
    pub device: &'a DeviceNode,
    pub variable: &'a VariableSlot,
}

impl VariableRef<'_> {
    /// Cached sample, or a live read that leaves the cache untouched
    async fn read(&self, real_time: bool) -> Option<f64> {
        if real_time {
            self.point
                .driver
                .read(&self.device.config, &self.variable.config)
                .await
        } else {
            self.variable.sample().value
        }
    }

    /// Write, then read the value back from the device
    async fn write(&self, value: f64) -> Result<Option<f64>> {
        self.point
            .driver
            .write(&self.device.config, &self.variable.config, value)
            .await?;
        Ok(self.read(true).await)
    }
}

/// Flattened view of one variable
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreEntry {
    pub port_name: String,
    pub device_name: String,
    pub variable_name: String,
    pub value: Option<f64>,
    pub timestamp: Option<DateTime<Local>>,
}

/// All data points of the gateway
///
/// @lifecycle from_config → start (samplers) → read/write → shutdown
#[derive(Debug)]
pub struct DataPointStore {
    points: Vec<Arc<DataPoint>>,
    token: Mutex<CancellationToken>,
}

impl DataPointStore {
    pub fn new(points: Vec<DataPoint>) -> Self {
        Self {
            points: points.into_iter().map(Arc::new).collect(),
            token: Mutex::new(CancellationToken::new()),
        }
    }

    /// Build one data point per enabled port with a known device type
    pub fn from_config(config: &DataPointConfig) -> Result<Self> {
        let mut points = Vec::new();
        for port in &config.ports {
            if !port.valid {
                info!(port = %port.port_name, "the port is disabled,skipping");
                continue;
            }
            let Some(driver) = create_driver(port)? else {
                continue;
            };
            let point = DataPoint::new(port.clone(), config, driver);
            debug!(
                port = %port.port_name,
                driver = point.driver.name(),
                devices = point.devices.len(),
                variables = point.variable_count(),
                "Data point created"
            );
            points.push(point);
        }
        info!(ports = points.len(), "Data point store built");
        Ok(Self::new(points))
    }

    pub fn points(&self) -> &[Arc<DataPoint>] {
        &self.points
    }

    /// Spawn one sampler per data point
    ///
    /// The samplers, and the reconnect loops they start, stop when `token`
    /// or [`DataPointStore::shutdown`] cancels.
    pub fn start(&self, token: CancellationToken) -> Vec<JoinHandle<()>> {
        *self.token.lock() = token.clone();
        self.points
            .iter()
            .map(|point| tokio::spawn(sampler::run(point.clone(), token.clone())))
            .collect()
    }

    pub fn shutdown(&self) {
        self.token.lock().cancel();
    }

    /// First variable carrying `id`, in port, device, variable order
    pub fn find_variable_by_id(&self, id: i64) -> Option<VariableRef<'_>> {
        self.points.iter().map(Arc::as_ref).find_map(|point| {
            point.devices.iter().find_map(|device| {
                device
                    .variables
                    .iter()
                    .find(|v| v.config.id == id)
                    .map(|variable| VariableRef {
                        point,
                        device,
                        variable,
                    })
            })
        })
    }

    /// First variable matching the (port, device, variable) names
    pub fn find_variable(
        &self,
        port_name: &str,
        device_name: &str,
        variable_name: &str,
    ) -> Option<VariableRef<'_>> {
        self.points
            .iter()
            .map(Arc::as_ref)
            .filter(|point| point.port.port_name == port_name)
            .find_map(|point| {
                point
                    .devices
                    .iter()
                    .filter(|device| device.config.dev_name == device_name)
                    .find_map(|device| {
                        device
                            .variables
                            .iter()
                            .find(|v| v.config.name == variable_name)
                            .map(|variable| VariableRef {
                                point,
                                device,
                                variable,
                            })
                    })
            })
    }

    /// Cached value of a variable, or a live read when `real_time`
    pub async fn read_by_id(&self, id: i64, real_time: bool) -> Result<Option<f64>> {
        let target = self
            .find_variable_by_id(id)
            .ok_or_else(GatewayError::variable_not_found)?;
        Ok(target.read(real_time).await)
    }

    /// Write a variable and return the value read back from the device
    pub async fn write_by_id(&self, id: i64, value: f64) -> Result<Option<f64>> {
        let target = self
            .find_variable_by_id(id)
            .ok_or_else(GatewayError::variable_not_found)?;
        target.write(value).await
    }

    pub async fn read(
        &self,
        port_name: &str,
        device_name: &str,
        variable_name: &str,
        real_time: bool,
    ) -> Result<Option<f64>> {
        let target = self
            .find_variable(port_name, device_name, variable_name)
            .ok_or_else(GatewayError::variable_not_found)?;
        Ok(target.read(real_time).await)
    }

    pub async fn write(
        &self,
        port_name: &str,
        device_name: &str,
        variable_name: &str,
        value: f64,
    ) -> Result<Option<f64>> {
        let target = self
            .find_variable(port_name, device_name, variable_name)
            .ok_or_else(GatewayError::variable_not_found)?;
        target.write(value).await
    }

    /// Every variable with its last sample
    pub fn get_store(&self) -> Vec<StoreEntry> {
        let mut entries = Vec::new();
        for point in &self.points {
            for device in &point.devices {
                for variable in &device.variables {
                    let sample = variable.sample();
                    entries.push(StoreEntry {
                        port_name: point.port.port_name.clone(),
                        device_name: device.config.dev_name.clone(),
                        variable_name: variable.config.name.clone(),
                        value: sample.value,
                        timestamp: sample.timestamp,
                    });
                }
            }
        }
        entries
    }

    /// Link state of every port
    pub async fn port_status(&self) -> Vec<LinkStatus> {
        let mut status = Vec::with_capacity(self.points.len());
        for point in &self.points {
            status.push(point.driver.status().await);
        }
        status
    }
}
