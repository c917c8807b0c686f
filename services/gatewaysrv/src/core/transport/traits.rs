//! Transport Layer Traits
//!
//! A transport moves raw frames over one physical link. Every operation takes
//! its own deadline; protocol framing lives in `crate::protocols`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Deadline of the stale-byte drain before each transaction
pub const DRAIN_TIMEOUT: Duration = Duration::from_millis(10);

/// Transport layer error types
#[derive(Error, Debug, Clone)]
pub enum TransportError {
    /// Connection failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// No open stream
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Deadline exceeded without any data
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Connection aborted (ECONNABORTED)
    #[error("Connection aborted: {0}")]
    Aborted(String),

    /// Peer closed the stream
    #[error("End of stream: {0}")]
    Eof(String),

    /// Send operation failed
    #[error("Send failed: {0}")]
    SendFailed(String),

    /// Receive operation failed
    #[error("Receive failed: {0}")]
    ReceiveFailed(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error
    #[error("IO error: {0}")]
    IoError(String),
}

impl TransportError {
    /// Classify an I/O error raised while reading or writing
    pub fn from_io(err: &std::io::Error, sending: bool) -> Self {
        match err.kind() {
            std::io::ErrorKind::ConnectionAborted => TransportError::Aborted(err.to_string()),
            std::io::ErrorKind::UnexpectedEof => TransportError::Eof(err.to_string()),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock => {
                TransportError::Timeout(err.to_string())
            },
            _ if sending => TransportError::SendFailed(err.to_string()),
            _ => TransportError::ReceiveFailed(err.to_string()),
        }
    }
}

/// Transport statistics
#[derive(Debug, Clone, Default, Serialize)]
pub struct TransportStats {
    /// Total bytes sent
    pub bytes_sent: u64,
    /// Total bytes received
    pub bytes_received: u64,
    /// Number of connection attempts
    pub connection_attempts: u64,
    /// Number of successful connections
    pub successful_connections: u64,
    /// Number of failed connections
    pub failed_connections: u64,
    /// Number of disconnections
    pub disconnections: u64,
    /// Last successful connection time
    pub last_connection: Option<DateTime<Utc>>,
}

impl TransportStats {
    /// Create new transport statistics
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a connection attempt
    pub fn record_connection_attempt(&mut self) {
        self.connection_attempts += 1;
    }

    /// Record a successful connection
    pub fn record_successful_connection(&mut self) {
        self.successful_connections += 1;
        self.last_connection = Some(Utc::now());
    }

    /// Record a failed connection
    pub fn record_failed_connection(&mut self) {
        self.failed_connections += 1;
    }

    /// Record a disconnection
    pub fn record_disconnection(&mut self) {
        self.disconnections += 1;
    }

    /// Record bytes sent
    pub fn record_bytes_sent(&mut self, bytes: usize) {
        self.bytes_sent += bytes as u64;
    }

    /// Record bytes received
    pub fn record_bytes_received(&mut self, bytes: usize) {
        self.bytes_received += bytes as u64;
    }
}

/// Transport configuration trait
pub trait TransportConfig: Send + Sync + fmt::Debug + Clone {
    /// Get configuration name/identifier
    fn name(&self) -> &str;

    /// Validate configuration parameters
    fn validate(&self) -> Result<(), TransportError>;

    /// Default deadline when the caller passes a zero duration
    fn timeout(&self) -> Duration;
}

/// Core transport trait defining the interface for all transport implementations
#[async_trait]
pub trait Transport: Send + Sync + fmt::Debug {
    /// Get transport type identifier
    fn transport_type(&self) -> &str;

    /// Get human-readable transport name
    fn name(&self) -> &str;

    /// Open the link
    async fn connect(&mut self) -> Result<(), TransportError>;

    /// Close the link; a no-op when already closed
    async fn disconnect(&mut self) -> Result<(), TransportError>;

    /// Read whatever the peer sends before the deadline
    ///
    /// Returns the accumulated bytes, or `Timeout` when nothing arrived.
    async fn read_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError>;

    /// Write the whole buffer, resubmitting any unwritten remainder
    async fn write_timeout(&mut self, data: &[u8], timeout: Duration)
        -> Result<(), TransportError>;

    /// Drain stale inbound bytes, write the request, read the response
    async fn write_read_timeout(
        &mut self,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        // Whatever is pending belongs to an earlier, abandoned exchange
        let _ = self.read_timeout(DRAIN_TIMEOUT).await;
        self.write_timeout(data, timeout).await?;
        self.read_timeout(timeout).await
    }

    /// Check if transport is currently connected
    async fn is_connected(&self) -> bool;

    /// Get transport statistics
    async fn stats(&self) -> TransportStats;
}

/// Implementation of Transport trait for `Box<dyn Transport>`
#[async_trait]
impl Transport for Box<dyn Transport> {
    fn transport_type(&self) -> &str {
        self.as_ref().transport_type()
    }

    fn name(&self) -> &str {
        self.as_ref().name()
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        self.as_mut().connect().await
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        self.as_mut().disconnect().await
    }

    async fn read_timeout(&mut self, timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.as_mut().read_timeout(timeout).await
    }

    async fn write_timeout(
        &mut self,
        data: &[u8],
        timeout: Duration,
    ) -> Result<(), TransportError> {
        self.as_mut().write_timeout(data, timeout).await
    }

    async fn write_read_timeout(
        &mut self,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.as_mut().write_read_timeout(data, timeout).await
    }

    async fn is_connected(&self) -> bool {
        self.as_ref().is_connected().await
    }

    async fn stats(&self) -> TransportStats {
        self.as_ref().stats().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_stats() {
        let mut stats = TransportStats::new();
        assert_eq!(stats.connection_attempts, 0);

        stats.record_connection_attempt();
        assert_eq!(stats.connection_attempts, 1);

        stats.record_successful_connection();
        assert_eq!(stats.successful_connections, 1);
        assert!(stats.last_connection.is_some());

        stats.record_bytes_sent(100);
        stats.record_bytes_received(50);
        assert_eq!(stats.bytes_sent, 100);
        assert_eq!(stats.bytes_received, 50);

        stats.record_disconnection();
        assert_eq!(stats.disconnections, 1);
    }

    #[test]
    fn test_io_error_classification() {
        let aborted = std::io::Error::from(std::io::ErrorKind::ConnectionAborted);
        assert!(matches!(
            TransportError::from_io(&aborted, false),
            TransportError::Aborted(_)
        ));

        let reset = std::io::Error::from(std::io::ErrorKind::ConnectionReset);
        assert!(matches!(
            TransportError::from_io(&reset, true),
            TransportError::SendFailed(_)
        ));
        assert!(matches!(
            TransportError::from_io(&reset, false),
            TransportError::ReceiveFailed(_)
        ));
    }
}
