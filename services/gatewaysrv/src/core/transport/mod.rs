//! Transport Layer Module
//!
//! Separates the physical link from protocol logic. Drivers only see the
//! [`Transport`] trait: `read_timeout`, `write_timeout` and the
//! drain-write-read `write_read_timeout`.
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │      Drivers (Modbus, Mitsubishi, Siemens)    │
//! └──────────────────────────────────────────────┘
//!                        │
//!                        ▼
//! ┌──────────────────────────────────────────────┐
//! │          Transport Interface (Trait)          │
//! └──────────────────────────────────────────────┘
//!            │                        │
//!            ▼                        ▼
//!     ┌─────────────┐          ┌─────────────┐
//!     │     TCP     │          │   Serial    │
//!     └─────────────┘          └─────────────┘
//! ```

#[cfg(any(test, feature = "test-utils"))]
pub mod mock;
pub mod serial;
pub mod tcp;
pub mod traits;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::MockTransport;
pub use serial::{SerialTransport, SerialTransportConfig};
pub use tcp::{TcpTransport, TcpTransportConfig};
pub use traits::{Transport, TransportConfig, TransportError, TransportStats};

use crate::core::config::types::{PortConfig, PortType};

/// Build the transport described by a port
///
/// `default_timeout_ms` is the response deadline used when the port leaves
/// `RespTimeOutMs` unset; it differs between TCP (1 s) and serial (3 s).
pub fn create_transport(
    port: &PortConfig,
    default_timeout_ms: u64,
) -> Result<Box<dyn Transport>, TransportError> {
    let param = &port.param;
    match port.port_type {
        PortType::Network => {
            let config = TcpTransportConfig {
                host: param.ip.clone(),
                port: param.port_number,
                timeout: param.response_timeout(default_timeout_ms),
                ..Default::default()
            };
            Ok(Box::new(TcpTransport::new(config)?))
        },
        PortType::Serial => {
            let config = SerialTransportConfig {
                port: param.serial_node(),
                baud_rate: param.band_rate,
                data_bits: param.date_bits,
                stop_bits: param.stop_bit,
                parity: param.parity.clone(),
                read_timeout: param.response_timeout(default_timeout_ms),
                frame_interval: param.frame_interval(),
                ..Default::default()
            };
            Ok(Box::new(SerialTransport::new(config)?))
        },
        PortType::Unknown(code) => Err(TransportError::ConfigError(format!(
            "port {}: unknown PortType {code}",
            port.port_name
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::types::{DeviceType, PortParam};

    fn port(port_type: PortType) -> PortConfig {
        PortConfig {
            port_name: "P1".to_string(),
            valid: true,
            port_type,
            device_type: DeviceType::ModbusTcp,
            param: PortParam {
                ip: "127.0.0.1".to_string(),
                port_number: 502,
                com: 2,
                band_rate: 9600,
                date_bits: 8,
                stop_bit: 1,
                parity: "N".to_string(),
                ..Default::default()
            },
        }
    }

    #[test]
    fn test_create_tcp_transport() {
        let transport = create_transport(&port(PortType::Network), 1000);
        assert!(matches!(transport, Ok(t) if t.transport_type() == "tcp"));
    }

    #[test]
    fn test_create_serial_transport() {
        let transport = create_transport(&port(PortType::Serial), 3000);
        assert!(matches!(transport, Ok(t) if t.transport_type() == "serial"));
    }

    #[test]
    fn test_unknown_port_type() {
        assert!(create_transport(&port(PortType::Unknown(7)), 1000).is_err());
    }
}
