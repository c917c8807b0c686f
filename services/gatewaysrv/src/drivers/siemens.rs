//! Siemens S7 driver over ISO-on-TCP

use async_trait::async_trait;
use std::time::Duration;
use tracing::debug;

use super::link::Link;
use super::{
    finish_write, log_read_failure, response_timeout, Driver, TCP_DEFAULT_TIMEOUT_MS,
};
use crate::core::codec;
use crate::core::config::types::{DataType, DeviceConfig, PortConfig, VariableConfig};
use crate::core::transport::Transport;
use crate::error::{GatewayError, Result};
use crate::protocols::siemens::{S7Address, S7Comm, SiemensFamily};
use crate::utils::hex::format_hex_pretty;

const RECONNECT_DELAY: Duration = Duration::from_secs(1);
/// Deadline of each handshake exchange
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(1);

#[derive(Debug)]
pub struct SiemensDriver {
    link: Link,
    s7: S7Comm,
    timeout: Duration,
    reconnect_delay: Duration,
}

impl SiemensDriver {
    pub fn new(port: &PortConfig, link: Link) -> Result<Self> {
        let family = SiemensFamily::from_device_type(port.device_type).ok_or_else(|| {
            GatewayError::config(format!(
                "device type {} is not a Siemens PLC",
                u32::from(port.device_type)
            ))
        })?;
        let rack = port.param.rack.unwrap_or(0);
        let slot = port.param.slot.unwrap_or_else(|| family.default_slot());

        let mut driver = Self::with_link(family, link).with_timeout(response_timeout(port));
        driver.s7 = S7Comm::new(family, rack, slot);
        Ok(driver)
    }

    /// Driver with the family's default rack 0 and slot
    pub fn with_link(family: SiemensFamily, link: Link) -> Self {
        Self {
            link,
            s7: S7Comm::new(family, 0, family.default_slot()),
            timeout: Duration::from_millis(TCP_DEFAULT_TIMEOUT_MS),
            reconnect_delay: RECONNECT_DELAY,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    async fn try_read(&self, device: &DeviceConfig, variable: &VariableConfig) -> Result<f64> {
        let address = S7Address::for_variable(self.s7.family(), variable)?;
        let request = self.s7.read_request(&address)?;
        let response = self.link.transact(&request, self.timeout).await?;

        let mut raw = self.s7.parse(&response)?;
        if raw.len() == 1 {
            raw.insert(0, 0);
        }
        codec::decode(device, variable, &raw)
    }

    async fn try_write(
        &self,
        device: &DeviceConfig,
        variable: &VariableConfig,
        value: f64,
    ) -> Result<()> {
        let address = S7Address::for_variable(self.s7.family(), variable)?;
        let mut encoded = codec::encode(device, variable, value)?;
        // Booleans go out as a single byte
        if matches!(variable.data_type, DataType::Bit | DataType::Bool) && encoded.len() > 1 {
            encoded = vec![encoded[1]];
        }

        let request = self.s7.write_request(&address, &encoded)?;
        let response = self.link.transact(&request, self.timeout).await?;
        self.s7.parse(&response)?;
        Ok(())
    }
}

#[async_trait]
impl Driver for SiemensDriver {
    fn name(&self) -> &'static str {
        "Siemens S7"
    }

    fn link(&self) -> &Link {
        &self.link
    }

    fn reconnect_delay(&self) -> Duration {
        self.reconnect_delay
    }

    /// COTP connection request, then setup communication
    ///
    /// Only transport failures abort the handshake; the PLC's replies are
    /// logged but not inspected.
    async fn handshake(&self, transport: &mut dyn Transport) -> Result<()> {
        let reply = transport
            .write_read_timeout(&self.s7.connection_request(), HANDSHAKE_TIMEOUT)
            .await?;
        debug!(hex_data = %format_hex_pretty(&reply), "[S7] Connection confirm");

        let reply = transport
            .write_read_timeout(&self.s7.setup_communication(), HANDSHAKE_TIMEOUT)
            .await?;
        debug!(hex_data = %format_hex_pretty(&reply), "[S7] Setup communication ack");
        Ok(())
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

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::config::types::{DeviceType, PortParam, PortType, RegType, VariableParam};
    use crate::core::transport::{MockTransport, TransportError};
    use crate::drivers::{connect, LinkState};
    use crate::protocols::siemens::tpkt;

    fn variable(data_type: DataType, reg_type: RegType, reg_addr: u32, bit_addr: u8) -> VariableConfig {
        VariableConfig {
            id: 3,
            name: "v".to_string(),
            another_name: String::new(),
            data_type,
            decimal: 1,
            unit: String::new(),
            modulus: 0.1,
            offset: 0.0,
            param: VariableParam {
                db_num: 1,
                reg_addr,
                bit_addr,
                reg_type,
            },
        }
    }

    fn ack(params: &[u8], data: &[u8]) -> Vec<u8> {
        let mut frame = vec![0x03, 0x00, 0x00, 0x00, 0x02, 0xF0, 0x80];
        frame.extend_from_slice(&[0x32, 0x03, 0x00, 0x00, 0x00, 0x01]);
        frame.extend_from_slice(&(params.len() as u16).to_be_bytes());
        frame.extend_from_slice(&(data.len() as u16).to_be_bytes());
        frame.extend_from_slice(&[0x00, 0x00]);
        frame.extend_from_slice(params);
        frame.extend_from_slice(data);
        tpkt::patch_length(&mut frame);
        frame
    }

    /// Connected driver; the two handshake replies are consumed by `connect`
    async fn connected() -> (SiemensDriver, MockTransport) {
        let mock = MockTransport::new("mock");
        mock.push_reply(vec![0x03, 0x00, 0x00, 0x16]).await;
        mock.push_reply(vec![0x03, 0x00, 0x00, 0x1B]).await;
        let link = Link::new("S7", Box::new(mock.clone()))
            .with_eof_abort(true)
            .with_throttle(Duration::ZERO);
        let driver = SiemensDriver::with_link(SiemensFamily::S1200, link);
        connect(&driver).await.unwrap();
        (driver, mock)
    }

    #[tokio::test]
    async fn test_handshake_frames() {
        let (driver, mock) = connected().await;
        assert_eq!(driver.link().state().await, LinkState::Connected);

        let sent = mock.sent_data().await;
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].len(), 22);
        assert_eq!(sent[0][5], 0xE0);
        assert_eq!(sent[1].len(), 25);
    }

    #[tokio::test]
    async fn test_handshake_timeout_fails_connect() {
        let mock = MockTransport::new("mock");
        let link = Link::new("S7", Box::new(mock.clone()));
        let driver = SiemensDriver::with_link(SiemensFamily::S300, link);
        assert!(connect(&driver).await.is_err());
        assert_eq!(driver.link().state().await, LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_read_scaled_word() {
        let (driver, mock) = connected().await;
        mock.push_reply(ack(&[0x04, 0x01], &[0xFF, 0x04, 0x00, 0x10, 0x00, 0xFA]))
            .await;

        let var = variable(DataType::Int16, RegType::SiemensDb, 10, 0);
        assert_eq!(driver.read(&DeviceConfig::default(), &var).await, Some(25.0));
    }

    #[tokio::test]
    async fn test_read_bit_single_byte() {
        let (driver, mock) = connected().await;
        mock.push_reply(ack(&[0x04, 0x01], &[0xFF, 0x03, 0x00, 0x01, 0x01]))
            .await;

        let var = variable(DataType::Bit, RegType::SiemensM, 4, 2);
        assert_eq!(driver.read(&DeviceConfig::default(), &var).await, Some(1.0));
    }

    #[tokio::test]
    async fn test_write_bool_sends_one_byte() {
        let (driver, mock) = connected().await;
        mock.push_reply(ack(&[0x05, 0x01], &[0xFF])).await;

        let var = variable(DataType::Bool, RegType::SiemensQ, 0, 1);
        driver
            .write(&DeviceConfig::default(), &var, 1.0)
            .await
            .unwrap();

        let sent = mock.sent_data().await;
        let frame = sent.last().unwrap();
        assert_eq!(&frame[frame.len() - 5..], &[0x00, 0x03, 0x00, 0x01, 0x01]);
    }

    #[tokio::test]
    async fn test_write_rejected_item() {
        let (driver, mock) = connected().await;
        mock.push_reply(ack(&[0x05, 0x01], &[0x0A])).await;

        let var = variable(DataType::Uint16, RegType::SiemensDb, 0, 0);
        let err = driver
            .write(&DeviceConfig::default(), &var, 5.0)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("Object does not exist"));
    }

    #[tokio::test]
    async fn test_eof_drops_link() {
        let (driver, mock) = connected().await;
        mock.push_error(TransportError::Eof("closed".to_string())).await;

        let var = variable(DataType::Uint16, RegType::SiemensDb, 0, 0);
        assert_eq!(driver.read(&DeviceConfig::default(), &var).await, None);
        assert_eq!(driver.link().state().await, LinkState::Disconnected);
    }

    #[test]
    fn test_rack_slot_from_port() {
        let port = PortConfig {
            port_name: "S7".to_string(),
            valid: true,
            port_type: PortType::Network,
            device_type: DeviceType::SiemensS300,
            param: PortParam {
                rack: Some(1),
                slot: Some(3),
                ..Default::default()
            },
        };
        let link = Link::new("S7", Box::new(MockTransport::new("mock")));
        let driver = SiemensDriver::new(&port, link).unwrap();
        let request = driver.s7.connection_request();
        assert_eq!(request[21], 0x23);
    }

    #[tokio::test]
    async fn test_write_while_disconnected_is_skipped() {
        let mock = MockTransport::new("mock");
        let link = Link::new("S7", Box::new(mock.clone())).with_throttle(Duration::ZERO);
        let driver = SiemensDriver::with_link(SiemensFamily::S1200, link);

        let var = variable(DataType::Uint16, RegType::SiemensDb, 0, 0);
        driver
            .write(&DeviceConfig::default(), &var, 5.0)
            .await
            .unwrap();
        assert!(mock.sent_data().await.is_empty());
        assert_eq!(driver.link().state().await, LinkState::Disconnected);
    }
}
