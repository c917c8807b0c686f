//! Modbus driver (RTU, ASCII and TCP)

use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::Duration;

use super::link::{Link, Session};
use super::{
    finish_write, log_read_failure, response_timeout, Driver, TCP_DEFAULT_TIMEOUT_MS,
};
use crate::core::codec;
use crate::core::config::types::{DataType, DeviceConfig, DeviceType, PortConfig, RegType, VariableConfig};
use crate::error::{GatewayError, Result};
use crate::protocols::modbus::{build_write_pdu, ModbusMode, ModbusStack, ReadPlan};

/// Pause between network connect attempts
const RECONNECT_DELAY: Duration = Duration::from_secs(2);

#[derive(Debug)]
pub struct ModbusDriver {
    link: Link,
    /// Frames are built inside a session so TCP transaction ids stay in step
    stack: Mutex<ModbusStack>,
    timeout: Duration,
    reconnect_delay: Duration,
}

impl ModbusDriver {
    pub fn new(port: &PortConfig, link: Link) -> Result<Self> {
        let mode = match port.device_type {
            DeviceType::ModbusRtu => ModbusMode::Rtu,
            DeviceType::ModbusAscii => ModbusMode::Ascii,
            DeviceType::ModbusTcp => ModbusMode::Tcp,
            other => {
                return Err(GatewayError::config(format!(
                    "device type {} is not Modbus",
                    u32::from(other)
                )))
            },
        };
        Ok(Self::with_link(mode, link).with_timeout(response_timeout(port)))
    }

    pub fn with_link(mode: ModbusMode, link: Link) -> Self {
        Self {
            link,
            stack: Mutex::new(ModbusStack::new(mode)),
            timeout: Duration::from_millis(TCP_DEFAULT_TIMEOUT_MS),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_reconnect_delay(mut self, delay: Duration) -> Self {
        self.reconnect_delay = delay;
        self
    }

    async fn read_raw(
        &self,
        session: &mut Session<'_>,
        unit_id: u8,
        plan: &ReadPlan,
    ) -> Result<Vec<u8>> {
        let request = self.stack.lock().read_request(unit_id, plan)?;
        let response = session.transact(&request, self.timeout).await?;
        let data = self.stack.lock().parse(unit_id, plan.function_code, &response)?;
        Ok(data)
    }

    async fn try_read(&self, device: &DeviceConfig, variable: &VariableConfig) -> Result<f64> {
        let plan = ReadPlan::for_variable(variable)?;
        let mut session = self.link.session().await?;
        let raw = self.read_raw(&mut session, device.dev_addr, &plan).await?;
        drop(session);
        codec::decode(device, variable, &raw)
    }

    /// Bit variables outside FC05 patch one bit into the word just read
    fn needs_read_modify_write(variable: &VariableConfig) -> bool {
        variable.data_type == DataType::Bit && variable.param.reg_type != RegType::CoilWriteSingle
    }

    async fn try_write(
        &self,
        device: &DeviceConfig,
        variable: &VariableConfig,
        value: f64,
    ) -> Result<()> {
        let unit_id = device.dev_addr;
        let mut session = self.link.session().await?;

        let mut encoded = if Self::needs_read_modify_write(variable) {
            let plan = ReadPlan::for_variable(variable)?;
            let current = codec::raw_word(&self.read_raw(&mut session, unit_id, &plan).await?);
            let mask = 1u16
                .checked_shl(u32::from(variable.param.bit_addr))
                .unwrap_or(0);
            let word = if value != 0.0 {
                current | mask
            } else {
                current & !mask
            };
            codec::encode(device, variable, f64::from(word))?
        } else {
            codec::encode(device, variable, value)?
        };
        // Registers are 16 bits wide
        if encoded.len() == 1 {
            encoded.insert(0, 0);
        }

        let pdu = build_write_pdu(variable, &encoded, value)?;
        let function_code = pdu.function_code().unwrap_or_default();
        let request = self.stack.lock().write_request(unit_id, &pdu);
        let response = session.transact(&request, self.timeout).await?;
        self.stack.lock().parse(unit_id, function_code, &response)?;
        Ok(())
    }
}

#[async_trait]
impl Driver for ModbusDriver {
    fn name(&self) -> &'static str {
        match self.stack.lock().mode() {
            ModbusMode::Tcp => "Modbus TCP",
            ModbusMode::Rtu => "Modbus RTU",
            ModbusMode::Ascii => "Modbus ASCII",
        }
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    async fn read(&self, device: &DeviceConfig, variable: &VariableConfig) -> Option<f64> {
        match self.try_read(device, variable).await {
            Ok(value) => Some(value),
            Err(e) => {
                log_read_failure(self.link.port_name(), device, variable, &e);
                None
            },
        }
    }

    async fn write(
        &self,
        device: &DeviceConfig,
        variable: &VariableConfig,
        value: f64,
    ) -> Result<()> {
        let result = self.try_write(device, variable, value).await;
        finish_write(self.link.port_name(), device, variable, value, result)
    }
}
