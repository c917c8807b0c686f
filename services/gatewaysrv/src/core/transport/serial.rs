//! Serial Transport Implementation
//!
//! Frames on a serial line have no length prefix; a response ends when the
//! line stays quiet for the inter-byte gap (`FrameIntervalMs`).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::RwLock;
use tokio::time::timeout;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{debug, info, warn};

use super::traits::{Transport, TransportConfig, TransportError, TransportStats};
use crate::utils::hex::format_hex_pretty;

/// Serial port configuration
#[derive(Debug, Clone)]
pub struct SerialTransportConfig {
    /// Serial port path (e.g., "/dev/COM1", "COM1")
    pub port: String,
    /// Baud rate
    pub baud_rate: u32,
    /// Data bits (5, 6, 7, 8)
    pub data_bits: u8,
    /// Stop bits (1, 2)
    pub stop_bits: u8,
    /// Parity; only the first letter counts ("N", "E", "O")
    pub parity: String,
    /// Wait for the first response byte when the caller passes zero
    pub read_timeout: Duration,
    /// Quiet time that terminates a frame
    pub frame_interval: Duration,
    /// Write timeout for individual operations
    pub write_timeout: Duration,
}

impl Default for SerialTransportConfig {
    fn default() -> Self {
        Self {
            port: "/dev/COM1".to_string(),
            baud_rate: 9600,
            data_bits: 8,
            stop_bits: 1,
            parity: "N".to_string(),
            read_timeout: Duration::from_millis(3000),
            frame_interval: Duration::from_millis(50),
            write_timeout: Duration::from_millis(1000),
        }
    }
}

impl TransportConfig for SerialTransportConfig {
    fn name(&self) -> &str {
        "serial"
    }

    fn validate(&self) -> Result<(), TransportError> {
        if self.port.is_empty() {
            return Err(TransportError::ConfigError(
                "Port path cannot be empty".to_string(),
            ));
        }

        if self.baud_rate == 0 {
            return Err(TransportError::ConfigError(
                "Baud rate must be greater than zero".to_string(),
            ));
        }

        if ![5, 6, 7, 8].contains(&self.data_bits) {
            return Err(TransportError::ConfigError(
                "Data bits must be 5, 6, 7, or 8".to_string(),
            ));
        }

        if ![1, 2].contains(&self.stop_bits) {
            return Err(TransportError::ConfigError(
                "Stop bits must be 1 or 2".to_string(),
            ));
        }

        if self.frame_interval.is_zero() {
            return Err(TransportError::ConfigError(
                "Frame interval must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.read_timeout
    }
}

/// Serial transport implementation
#[derive(Debug)]
pub struct SerialTransport {
    /// Transport configuration
    config: SerialTransportConfig,
    /// Serial port connection
    connection: Arc<RwLock<Option<SerialStream>>>,
    /// Transport statistics
    stats: Arc<RwLock<TransportStats>>,
}

impl SerialTransport {
    /// Create new serial transport with configuration
    pub fn new(config: SerialTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;

        Ok(Self {
            config,
            connection: Arc::new(RwLock::new(None)),
            stats: Arc::new(RwLock::new(TransportStats::new())),
        })
    }

    /// Convert the configured parity letter to tokio_serial parity
    fn parse_parity(&self) -> tokio_serial::Parity {
        match self.config.parity.chars().next() {
            Some('E' | 'e') => tokio_serial::Parity::Even,
            Some('O' | 'o') => tokio_serial::Parity::Odd,
            _ => tokio_serial::Parity::None,
        }
    }

    /// Convert data bits to tokio_serial data bits
    fn parse_data_bits(&self) -> tokio_serial::DataBits {
        match self.config.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        }
    }

    /// Convert stop bits to tokio_serial stop bits
    fn parse_stop_bits(&self) -> tokio_serial::StopBits {
        match self.config.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        }
    }

    /// Accumulate bytes until the line goes quiet
    ///
    /// The first byte may take up to `first_byte`; later bytes must follow
    /// within the frame interval.
    async fn read_frame(
        port: &mut SerialStream,
        first_byte: Duration,
        gap: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buffer = Vec::new();
        let mut byte = [0u8; 1];

        loop {
            let wait = if buffer.is_empty() { first_byte } else { gap };
            match timeout(wait, port.read(&mut byte)).await {
                Ok(Ok(0)) => break,
                Ok(Ok(n)) => buffer.extend_from_slice(&byte[..n]),
                Ok(Err(e)) if buffer.is_empty() => {
                    return Err(TransportError::from_io(&e, false));
                },
                Ok(Err(_)) | Err(_) => break,
            }
        }

        if buffer.is_empty() {
            return Err(TransportError::Timeout(format!(
                "no response within {:?}",
                first_byte
            )));
        }
        Ok(buffer)
    }
}

#[async_trait]
impl Transport for SerialTransport {
    fn transport_type(&self) -> &str {
        "serial"
    }

    fn name(&self) -> &str {
        &self.config.port
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.stats.write().await.record_connection_attempt();

        debug!("Opening serial port: {}", self.config.port);

        let port_result = tokio_serial::new(&self.config.port, self.config.baud_rate)
            .data_bits(self.parse_data_bits())
            .parity(self.parse_parity())
            .stop_bits(self.parse_stop_bits())
            .flow_control(tokio_serial::FlowControl::None)
            .timeout(self.config.read_timeout)
            .open_native_async();

        match port_result {
            Ok(mut port) => {
                #[cfg(unix)]
                port.set_exclusive(false).map_err(|e| {
                    TransportError::IoError(format!("Failed to set exclusive mode: {e}"))
                })?;

                *self.connection.write().await = Some(port);
                self.stats.write().await.record_successful_connection();

                info!("Opened serial port: {}", self.config.port);
                Ok(())
            },
            Err(e) => {
                self.stats.write().await.record_failed_connection();
                Err(TransportError::ConnectionFailed(format!(
                    "Failed to open serial port {}: {e}",
                    self.config.port
                )))
            },
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut conn = self.connection.write().await;
        if conn.take().is_some() {
            // Serial port is closed when dropped
            self.stats.write().await.record_disconnection();
            info!("Closed serial port: {}", self.config.port);
        }
        Ok(())
    }

    async fn read_timeout(&mut self, deadline: Duration) -> Result<Vec<u8>, TransportError> {
        let first_byte = if deadline.is_zero() {
            self.config.read_timeout
        } else {
            deadline
        };

        let mut conn = self.connection.write().await;
        let Some(port) = conn.as_mut() else {
            return Err(TransportError::NotConnected(self.config.port.clone()));
        };

        let data = Self::read_frame(port, first_byte, self.config.frame_interval).await?;
        drop(conn);

        debug!(hex_data = %format_hex_pretty(&data), length = data.len(), direction = "recv", "[Serial Transport] Raw packet");
        self.stats.write().await.record_bytes_received(data.len());
        Ok(data)
    }

    async fn write_timeout(
        &mut self,
        data: &[u8],
        deadline: Duration,
    ) -> Result<(), TransportError> {
        let deadline = if deadline.is_zero() {
            self.config.write_timeout
        } else {
            deadline
        };

        let mut conn = self.connection.write().await;
        let Some(port) = conn.as_mut() else {
            return Err(TransportError::NotConnected(self.config.port.clone()));
        };

        let send_operation = async {
            port.write_all(data).await?;
            port.flush().await
        };

        match timeout(deadline, send_operation).await {
            Ok(Ok(())) => {
                drop(conn);
                debug!(hex_data = %format_hex_pretty(data), length = data.len(), direction = "send", "[Serial Transport] Raw packet");
                self.stats.write().await.record_bytes_sent(data.len());
                Ok(())
            },
            Ok(Err(e)) => {
                let err = TransportError::from_io(&e, true);
                warn!("Serial send failed on {}: {err}", self.config.port);
                Err(err)
            },
            Err(_) => Err(TransportError::Timeout(format!(
                "send did not complete within {:?}",
                deadline
            ))),
        }
    }

    async fn is_connected(&self) -> bool {
        self.connection.read().await.is_some()
    }

    async fn stats(&self) -> TransportStats {
        self.stats.read().await.clone()
    }
}
