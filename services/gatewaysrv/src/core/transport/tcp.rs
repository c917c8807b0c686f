//! TCP Transport Implementation
//!
//! Reads in fixed 100-byte chunks and keeps reading while the socket fills a
//! whole chunk, which is how PLC responses larger than one segment arrive.

use crate::utils::hex::format_hex_pretty;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::RwLock;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::traits::{Transport, TransportConfig, TransportError, TransportStats};

/// Read chunk size; a full chunk means more data may be pending
const READ_CHUNK: usize = 100;

/// TCP transport configuration
#[derive(Debug, Clone)]
pub struct TcpTransportConfig {
    /// Remote host address
    pub host: String,
    /// Remote port number
    pub port: u16,
    /// Connection timeout
    pub connect_timeout: Duration,
    /// Read/write deadline used when the caller passes zero
    pub timeout: Duration,
    /// TCP no-delay (Nagle algorithm)
    pub no_delay: bool,
}

impl Default for TcpTransportConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 502,
            connect_timeout: Duration::from_secs(3),
            timeout: Duration::from_secs(1),
            no_delay: true,
        }
    }
}

impl TransportConfig for TcpTransportConfig {
    fn name(&self) -> &str {
        "tcp"
    }

    fn validate(&self) -> Result<(), TransportError> {
        if self.host.is_empty() {
            return Err(TransportError::ConfigError(
                "Host cannot be empty".to_string(),
            ));
        }

        if self.port == 0 {
            return Err(TransportError::ConfigError(
                "Port cannot be zero".to_string(),
            ));
        }

        if self.connect_timeout.is_zero() {
            return Err(TransportError::ConfigError(
                "Connect timeout must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }
}

/// TCP transport implementation
#[derive(Debug)]
pub struct TcpTransport {
    /// Transport configuration
    config: TcpTransportConfig,
    /// Display name (`host:port`)
    name: String,
    /// TCP connection
    connection: Arc<RwLock<Option<TcpStream>>>,
    /// Transport statistics
    stats: Arc<RwLock<TransportStats>>,
}

impl TcpTransport {
    /// Create new TCP transport with configuration
    pub fn new(config: TcpTransportConfig) -> Result<Self, TransportError> {
        config.validate()?;

        Ok(Self {
            name: format!("{}:{}", config.host, config.port),
            config,
            connection: Arc::new(RwLock::new(None)),
            stats: Arc::new(RwLock::new(TransportStats::new())),
        })
    }

    /// Configure TCP socket options
    fn configure_socket(&self, stream: &TcpStream) {
        if let Err(e) = stream.set_nodelay(self.config.no_delay) {
            warn!("Failed to set TCP_NODELAY: {e}");
        }

        #[cfg(unix)]
        {
            use std::os::unix::io::{AsRawFd, FromRawFd};
            let socket = unsafe { socket2::Socket::from_raw_fd(stream.as_raw_fd()) };

            // Enable TCP keep-alive
            if let Err(e) = socket.set_keepalive(true) {
                warn!("Failed to set keep-alive: {e}");
            }

            // Forget the socket to avoid closing the file descriptor
            std::mem::forget(socket);
        }

        #[cfg(windows)]
        {
            use std::os::windows::io::{AsRawSocket, FromRawSocket};
            let socket = unsafe { socket2::Socket::from_raw_socket(stream.as_raw_socket()) };

            if let Err(e) = socket.set_keepalive(true) {
                warn!("Failed to set keep-alive: {e}");
            }

            // Forget the socket to avoid closing the socket handle
            std::mem::forget(socket);
        }
    }

    fn effective(&self, deadline: Duration) -> Duration {
        if deadline.is_zero() {
            self.config.timeout
        } else {
            deadline
        }
    }

    async fn read_chunks(
        stream: &mut TcpStream,
        deadline: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        let mut buffer = Vec::new();
        let mut chunk = [0u8; READ_CHUNK];

        loop {
            match timeout(deadline, stream.read(&mut chunk)).await {
                Ok(Ok(0)) => {
                    return Err(TransportError::Eof(
                        "Connection closed by peer".to_string(),
                    ));
                },
                Ok(Ok(n)) => {
                    buffer.extend_from_slice(&chunk[..n]);
                    if n < READ_CHUNK {
                        return Ok(buffer);
                    }
                },
                Ok(Err(e)) => return Err(TransportError::from_io(&e, false)),
                Err(_) if buffer.is_empty() => {
                    return Err(TransportError::Timeout(format!(
                        "no response within {:?}",
                        deadline
                    )));
                },
                // A response of exactly N*100 bytes ends with an idle read
                Err(_) => return Ok(buffer),
            }
        }
    }
}

#[async_trait]
impl Transport for TcpTransport {
    fn transport_type(&self) -> &str {
        "tcp"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.stats.write().await.record_connection_attempt();

        let addr = self.name.clone();
        debug!("Connecting to TCP endpoint: {addr}");

        match timeout(self.config.connect_timeout, TcpStream::connect(&addr)).await {
            Ok(Ok(stream)) => {
                self.configure_socket(&stream);

                *self.connection.write().await = Some(stream);
                self.stats.write().await.record_successful_connection();

                info!("Connected to TCP endpoint: {addr}");
                Ok(())
            },
            Ok(Err(e)) => {
                self.stats.write().await.record_failed_connection();
                Err(TransportError::ConnectionFailed(format!(
                    "Failed to connect to {addr}: {e}"
                )))
            },
            Err(_) => {
                self.stats.write().await.record_failed_connection();
                Err(TransportError::Timeout(format!(
                    "Connection to {addr} timed out"
                )))
            },
        }
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut conn = self.connection.write().await;
        if let Some(mut stream) = conn.take() {
            if let Err(e) = stream.shutdown().await {
                debug!("Error during TCP shutdown: {e}");
            }
            self.stats.write().await.record_disconnection();
            info!("Disconnected from TCP endpoint: {}", self.name);
        }
        Ok(())
    }

    async fn read_timeout(&mut self, deadline: Duration) -> Result<Vec<u8>, TransportError> {
        let deadline = self.effective(deadline);
        let mut conn = self.connection.write().await;
        let Some(stream) = conn.as_mut() else {
            return Err(TransportError::NotConnected(self.name.clone()));
        };

        let result = Self::read_chunks(stream, deadline).await;
        match &result {
            Ok(data) => {
                debug!(hex_data = %format_hex_pretty(data), length = data.len(), direction = "recv", "[TCP Transport] Raw packet");
                self.stats.write().await.record_bytes_received(data.len());
            },
            Err(TransportError::Timeout(_)) => {},
            Err(e) => {
                // Broken stream; the driver reconnects from scratch
                warn!("TCP receive failed on {}: {e}", self.name);
                *conn = None;
                self.stats.write().await.record_disconnection();
            },
        }
        result
    }

    async fn write_timeout(
        &mut self,
        data: &[u8],
        deadline: Duration,
    ) -> Result<(), TransportError> {
        let deadline = self.effective(deadline);
        let mut conn = self.connection.write().await;
        let Some(stream) = conn.as_mut() else {
            return Err(TransportError::NotConnected(self.name.clone()));
        };

        match timeout(deadline, stream.write_all(data)).await {
            Ok(Ok(())) => {
                debug!(hex_data = %format_hex_pretty(data), length = data.len(), direction = "send", "[TCP Transport] Raw packet");
                self.stats.write().await.record_bytes_sent(data.len());
                Ok(())
            },
            Ok(Err(e)) => {
                let err = TransportError::from_io(&e, true);
                warn!("TCP send failed on {}: {err}", self.name);
                *conn = None;
                self.stats.write().await.record_disconnection();
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
