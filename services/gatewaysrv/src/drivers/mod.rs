//! Device drivers
//!
//! A driver binds one port's [`Link`] to a protocol stack and the value codec.
//! Reads degrade to `None` on any failure; writes report their error to the
//! caller. Connection management is shared: [`init`] opens serial links once
//! and runs a reconnect loop for network links.

pub mod link;
pub mod mitsubishi;
pub mod modbus;
pub mod siemens;

pub use link::{Link, LinkState, LinkStatus, Session};
pub use mitsubishi::MitsubishiDriver;
pub use modbus::ModbusDriver;
pub use siemens::SiemensDriver;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::config::types::{DeviceConfig, DeviceType, PortConfig, PortType, VariableConfig};
use crate::core::transport::{create_transport, Transport};
use crate::error::{GatewayError, Result};
use crate::service::reconnect::{ReconnectError, ReconnectHelper, ReconnectPolicy};

/// Default response deadline of network links
pub const TCP_DEFAULT_TIMEOUT_MS: u64 = 1000;
/// Default first-byte deadline of serial links
pub const SERIAL_DEFAULT_TIMEOUT_MS: u64 = 3000;

/// How often a connected link is re-checked when no loss was signalled
const LINK_WATCH_INTERVAL: Duration = Duration::from_secs(1);

/// Per-port device driver
///
/// @lifecycle create_driver → init (connect / reconnect loop) → read/write
/// @concurrency every wire exchange holds the link lock
#[async_trait]
pub trait Driver: Send + Sync + fmt::Debug {
    /// Protocol name, for logs
    fn name(&self) -> &'static str;

    /// The link this driver talks over
    fn link(&self) -> &Link;

    /// Delay between failed network connect attempts
    fn reconnect_delay(&self) -> Duration;

    /// Protocol handshake run right after the transport connects
    async fn handshake(&self, _transport: &mut dyn Transport) -> Result<()> {
        Ok(())
    }

    /// Sample one variable; `None` when anything along the way failed
    async fn read(&self, device: &DeviceConfig, variable: &VariableConfig) -> Option<f64>;

    /// Write an engineering value to one variable
    async fn write(&self, device: &DeviceConfig, variable: &VariableConfig, value: f64)
        -> Result<()>;

    async fn status(&self) -> LinkStatus {
        self.link().status().await
    }
}

/// Log a failed read; a link that is down is expected and stays at debug
pub(crate) fn log_read_failure(
    port: &str,
    device: &DeviceConfig,
    variable: &VariableConfig,
    error: &GatewayError,
) {
    match error {
        GatewayError::NotConnected(_) => debug!(
            port,
            device = %device.dev_name,
            variable = %variable.name,
            "Skipped read: {}", error
        ),
        _ => warn!(
            port,
            device = %device.dev_name,
            variable = %variable.name,
            "Read failed: {}", error
        ),
    }
}

/// Settle a write: a link that is down skips it, other failures are logged
/// and returned to the caller
pub(crate) fn finish_write(
    port: &str,
    device: &DeviceConfig,
    variable: &VariableConfig,
    value: f64,
    result: Result<()>,
) -> Result<()> {
    match result {
        Err(GatewayError::NotConnected(reason)) => {
            debug!(
                port,
                device = %device.dev_name,
                variable = %variable.name,
                value,
                "Skipped write: {}", reason
            );
            Ok(())
        },
        Err(e) => {
            warn!(
                port,
                device = %device.dev_name,
                variable = %variable.name,
                value,
                "Write failed: {}", e
            );
            Err(e)
        },
        Ok(()) => Ok(()),
    }
}

fn default_timeout_ms(port_type: PortType) -> u64 {
    match port_type {
        PortType::Serial => SERIAL_DEFAULT_TIMEOUT_MS,
        _ => TCP_DEFAULT_TIMEOUT_MS,
    }
}

/// Response deadline of a port, with the per-transport default
pub fn response_timeout(port: &PortConfig) -> Duration {
    port.param
        .response_timeout(default_timeout_ms(port.port_type))
}

fn build_link(port: &PortConfig, eof_is_abort: bool) -> Result<Link> {
    let transport = create_transport(port, default_timeout_ms(port.port_type))?;
    Ok(Link::new(&port.port_name, transport).with_eof_abort(eof_is_abort))
}

/// Build the driver for a port's device type
///
/// Returns `Ok(None)` for device types without a protocol stack.
pub fn create_driver(port: &PortConfig) -> Result<Option<Arc<dyn Driver>>> {
    let is_network = port.port_type == PortType::Network;
    let driver: Arc<dyn Driver> = match port.device_type {
        DeviceType::ModbusRtu | DeviceType::ModbusAscii | DeviceType::ModbusTcp => {
            Arc::new(ModbusDriver::new(port, build_link(port, false)?)?)
        },
        DeviceType::MitsubishiProgramPort
        | DeviceType::McBinaryQna3E
        | DeviceType::McAsciiQna3E => {
            Arc::new(MitsubishiDriver::new(port, build_link(port, is_network)?)?)
        },
        DeviceType::Siemens200Cp2431
        | DeviceType::SiemensS200Smart
        | DeviceType::SiemensS300
        | DeviceType::SiemensS400
        | DeviceType::SiemensS1200
        | DeviceType::SiemensS1500 => {
            Arc::new(SiemensDriver::new(port, build_link(port, is_network)?)?)
        },
        DeviceType::MitsubishiComputerLink | DeviceType::Unknown(_) => {
            warn!(
                port = %port.port_name,
                device_type = u32::from(port.device_type),
                "No driver for device type, port skipped"
            );
            return Ok(None);
        },
    };
    Ok(Some(driver))
}

/// Open the link once: transport connect, then the driver handshake
pub async fn connect(driver: &dyn Driver) -> Result<()> {
    let link = driver.link();
    let Some(mut transport) = link.begin_connect().await else {
        return Ok(());
    };

    let result = match transport.connect().await {
        Ok(()) => driver.handshake(&mut *transport).await,
        Err(e) => Err(GatewayError::from(e)),
    };
    if result.is_err() {
        let _ = transport.disconnect().await;
    }
    link.finish_connect(transport, result.is_ok()).await;
    result
}

/// Bring a driver up
///
/// Serial links get one connect attempt and stay down if it fails (or if
/// they are later dropped). Network links get a background reconnect loop,
/// returned so the caller can await it after cancelling `token`.
pub async fn init(
    driver: Arc<dyn Driver>,
    port_type: PortType,
    token: CancellationToken,
) -> Option<JoinHandle<()>> {
    let port = driver.link().port_name().to_string();
    if port_type != PortType::Network {
        match connect(driver.as_ref()).await {
            Ok(()) => info!(port = %port, driver = driver.name(), "Serial link opened"),
            Err(e) => error!(port = %port, driver = driver.name(), "Serial link failed: {}", e),
        }
        return None;
    }

    Some(tokio::spawn(reconnect_loop(driver, token)))
}

async fn reconnect_loop(driver: Arc<dyn Driver>, token: CancellationToken) {
    let port = driver.link().port_name().to_string();
    let mut helper = ReconnectHelper::new(ReconnectPolicy::fixed(driver.reconnect_delay()));
    info!(port = %port, driver = driver.name(), "Connecting");

    loop {
        if driver.link().state().await == LinkState::Connected {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = driver.link().lost() => helper.mark_disconnected(),
                _ = tokio::time::sleep(LINK_WATCH_INTERVAL) => {},
            }
            continue;
        }

        tokio::select! {
            _ = token.cancelled() => break,
            result = helper.execute_reconnect(|| connect(driver.as_ref())) => match result {
                Err(e @ ReconnectError::MaxAttemptsExceeded(_)) => {
                    error!(port = %port, "Link stays down: {}", e);
                    break;
                },
                Err(e) => debug!(port = %port, "Reconnect failed: {}", e),
                Ok(()) => {},
            }
        }
    }

    driver.link().close().await;
    debug!(port = %port, "Reconnect loop stopped");
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::config::types::PortParam;
    use crate::core::transport::MockTransport;

    fn port(device_type: DeviceType) -> PortConfig {
        PortConfig {
            port_name: "P1".to_string(),
            valid: true,
            port_type: PortType::Network,
            device_type,
            param: PortParam {
                ip: "127.0.0.1".to_string(),
                port_number: 502,
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_factory_by_device_type() {
        let driver = create_driver(&port(DeviceType::ModbusTcp)).unwrap().unwrap();
        assert_eq!(driver.name(), "Modbus TCP");

        let driver = create_driver(&port(DeviceType::McBinaryQna3E)).unwrap().unwrap();
        assert_eq!(driver.name(), "Qna3E Binary");

        let driver = create_driver(&port(DeviceType::SiemensS1200)).unwrap().unwrap();
        assert_eq!(driver.name(), "Siemens S7");

        assert!(create_driver(&port(DeviceType::MitsubishiComputerLink))
            .unwrap()
            .is_none());
        assert!(create_driver(&port(DeviceType::Unknown(42))).unwrap().is_none());
    }

    #[test]
    fn test_response_timeout_defaults() {
        let mut p = port(DeviceType::ModbusTcp);
        assert_eq!(response_timeout(&p), Duration::from_millis(1000));
        p.port_type = PortType::Serial;
        assert_eq!(response_timeout(&p), Duration::from_millis(3000));
        p.param.resp_time_out_ms = 250;
        assert_eq!(response_timeout(&p), Duration::from_millis(250));
    }

    #[tokio::test]
    async fn test_reconnect_loop_connects_and_stops() {
        let mock = MockTransport::new("mock");
        mock.fail_connects(1).await;
        let link = Link::new("P1", Box::new(mock.clone())).with_throttle(Duration::ZERO);
        let driver: Arc<dyn Driver> = Arc::new(
            ModbusDriver::with_link(crate::protocols::modbus::ModbusMode::Tcp, link)
                .with_reconnect_delay(Duration::from_millis(10)),
        );

        let token = CancellationToken::new();
        let handle = init(driver.clone(), PortType::Network, token.clone())
            .await
            .unwrap();

        for _ in 0..100 {
            if driver.link().state().await == LinkState::Connected {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(driver.link().state().await, LinkState::Connected);
        assert_eq!(mock.stats().await.failed_connections, 1);

        token.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn test_serial_init_single_attempt() {
        let mock = MockTransport::new("mock");
        mock.fail_connects(1).await;
        let link = Link::new("COM1", Box::new(mock.clone())).with_throttle(Duration::ZERO);
        let driver: Arc<dyn Driver> = Arc::new(ModbusDriver::with_link(
            crate::protocols::modbus::ModbusMode::Rtu,
            link,
        ));

        let handle = init(driver.clone(), PortType::Serial, CancellationToken::new()).await;
        assert!(handle.is_none());
        assert_eq!(driver.link().state().await, LinkState::Disconnected);
        assert_eq!(mock.stats().await.connection_attempts, 1);
    }

    fn mock_driver(mock: &MockTransport) -> Arc<dyn Driver> {
        let link = Link::new("P1", Box::new(mock.clone())).with_throttle(Duration::ZERO);
        Arc::new(
            ModbusDriver::with_link(crate::protocols::modbus::ModbusMode::Tcp, link)
                .with_reconnect_delay(Duration::from_millis(10)),
        )
    }

    async fn wait_for(driver: &Arc<dyn Driver>, state: LinkState) -> bool {
        for _ in 0..500 {
            if driver.link().state().await == state {
                return true;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        false
    }

    #[tokio::test]
    async fn test_reconnect_loop_retries_until_connected() {
        let mock = MockTransport::new("mock");
        mock.fail_connects(2).await;
        let driver = mock_driver(&mock);
        let token = CancellationToken::new();

        let handle = init(driver.clone(), PortType::Network, token.clone())
            .await
            .unwrap();
        assert!(wait_for(&driver, LinkState::Connected).await);

        token.cancel();
        handle.await.unwrap();
        assert_eq!(driver.link().state().await, LinkState::Disconnected);
    }

    #[tokio::test]
    async fn test_reconnect_after_abort() {
        let mock = MockTransport::new("mock");
        let driver = mock_driver(&mock);
        let token = CancellationToken::new();
        let handle = init(driver.clone(), PortType::Network, token.clone())
            .await
            .unwrap();
        assert!(wait_for(&driver, LinkState::Connected).await);

        mock.push_error(crate::core::transport::TransportError::Aborted(
            "reset".to_string(),
        ))
        .await;
        let _ = driver.link().transact(&[0x01], Duration::from_millis(50)).await;
        assert!(wait_for(&driver, LinkState::Connected).await);

        token.cancel();
        handle.await.unwrap();
    }
}
