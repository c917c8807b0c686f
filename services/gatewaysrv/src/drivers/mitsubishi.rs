//! Mitsubishi MELSEC driver (Qna3E ASCII/Binary over TCP, FX programming port)

use async_trait::async_trait;
use std::time::Duration;

use super::link::{Link, Session};
use super::{
    finish_write, log_read_failure, response_timeout, Driver, TCP_DEFAULT_TIMEOUT_MS,
};
use crate::core::codec;
use crate::core::config::types::{DataType, DeviceConfig, DeviceType, PortConfig, VariableConfig};
use crate::error::{GatewayError, Result};
use crate::protocols::mitsubishi::program_port::packed_bit;
use crate::protocols::mitsubishi::{create_protocol, McDevice, McProtocol, SerialArea};

const RECONNECT_DELAY: Duration = Duration::from_secs(1);

/// Word points spanned by a value
fn points(data_type: DataType) -> Result<u16> {
    match data_type {
        DataType::Bool
        | DataType::Bit
        | DataType::Byte
        | DataType::Uint16
        | DataType::Int16 => Ok(1),
        DataType::Uint32 | DataType::Int32 | DataType::Float => Ok(2),
        DataType::Uint64 | DataType::Int64 | DataType::Double => Ok(4),
        DataType::String => Err(GatewayError::data("string variables are not supported")),
    }
}

/// Where a variable lives and how it is accessed
struct Target {
    device: McDevice,
    address: u32,
    points: u16,
    /// Bool variables use bit units (Qna3E) or force on/off (FX)
    is_bit: bool,
    /// Bit index inside the word read back, for packed FX relay areas
    packed_bit: Option<u8>,
}

#[derive(Debug)]
pub struct MitsubishiDriver {
    link: Link,
    protocol: Box<dyn McProtocol>,
    program_port: bool,
    timeout: Duration,
    reconnect_delay: Duration,
}

impl MitsubishiDriver {
    pub fn new(port: &PortConfig, link: Link) -> Result<Self> {
        Ok(Self::with_link(port.device_type, link)?.with_timeout(response_timeout(port)))
    }

    pub fn with_link(device_type: DeviceType, link: Link) -> Result<Self> {
        let protocol = create_protocol(device_type).ok_or_else(|| {
            GatewayError::config(format!(
                "device type {} is not a Mitsubishi frame format",
                u32::from(device_type)
            ))
        })?;
        Ok(Self {
            link,
            protocol,
            program_port: device_type == DeviceType::MitsubishiProgramPort,
            timeout: Duration::from_millis(TCP_DEFAULT_TIMEOUT_MS),
            reconnect_delay: RECONNECT_DELAY,
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn target(&self, variable: &VariableConfig) -> Result<Target> {
        let device = McDevice::try_from(variable.param.reg_type)?;
        let address = variable.param.reg_addr;
        let packed_bit = if self.program_port {
            packed_bit(SerialArea::select(device, address), address).map(|(_, bit)| bit)
        } else {
            None
        };
        Ok(Target {
            device,
            address,
            points: points(variable.data_type)?,
            is_bit: variable.data_type == DataType::Bool,
            packed_bit,
        })
    }

    /// Payload of a read, a single byte padded to a word
    async fn read_raw(&self, session: &mut Session<'_>, target: &Target) -> Result<Vec<u8>> {
        let request = self.protocol.read_request(
            target.device,
            target.is_bit,
            target.address,
            target.points,
        )?;
        let response = session.transact(&request, self.timeout).await?;
        let mut payload = self.protocol.parse(&response)?;
        if payload.len() == 1 {
            payload.insert(0, 0);
        }
        Ok(payload)
    }

    async fn try_read(&self, device: &DeviceConfig, variable: &VariableConfig) -> Result<f64> {
        let target = self.target(variable)?;
        let mut session = self.link.session().await?;
        let raw = self.read_raw(&mut session, &target).await?;
        drop(session);

        match target.packed_bit {
            // A packed relay byte decodes as one bit of it
            Some(bit) => {
                let mut view = variable.clone();
                view.data_type = DataType::Bit;
                view.param.bit_addr = bit;
                codec::decode(device, &view, &raw)
            },
            None => codec::decode(device, variable, &raw),
        }
    }

    async fn try_write(
        &self,
        device: &DeviceConfig,
        variable: &VariableConfig,
        value: f64,
    ) -> Result<()> {
        let target = self.target(variable)?;
        let mut session = self.link.session().await?;

        let encoded = if variable.data_type == DataType::Bit {
            let current = codec::raw_word(&self.read_raw(&mut session, &target).await?);
            let bit = target.packed_bit.unwrap_or(variable.param.bit_addr);
            let mask = 1u16.checked_shl(u32::from(bit)).unwrap_or(0);
            let word = if value != 0.0 {
                current | mask
            } else {
                current & !mask
            };
            codec::encode(device, variable, f64::from(word))?
        } else {
            codec::encode(device, variable, value)?
        };

        let request = self.protocol.write_request(
            target.device,
            target.is_bit,
            target.address,
            target.points,
            &encoded,
        )?;
        let response = session.transact(&request, self.timeout).await?;
        self.protocol.parse(&response)?;
        Ok(())
    }
}

#[async_trait]
impl Driver for MitsubishiDriver {
    fn name(&self) -> &'static str {
        self.protocol.name()
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
