//! Mock Transport for Testing
//!
//! Scripted transport for exercising drivers without a device. Clones share
//! the same state, so a test can keep a handle after moving the transport into
//! a driver and keep scripting replies or inspecting sent frames.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

use super::traits::{Transport, TransportError, TransportStats};

/// Mock transport state
#[derive(Debug, Default)]
struct MockTransportState {
    /// Whether the transport is connected
    connected: bool,
    /// Scripted replies, consumed one per read
    replies: VecDeque<Result<Vec<u8>, TransportError>>,
    /// History of sent data
    sent_data: Vec<Vec<u8>>,
    /// Remaining connect attempts that fail
    failing_connects: u32,
    /// Transport statistics
    stats: TransportStats,
}

/// Mock transport implementation
#[derive(Debug, Clone)]
pub struct MockTransport {
    name: String,
    state: Arc<RwLock<MockTransportState>>,
}

impl MockTransport {
    /// Create a disconnected mock transport
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Arc::new(RwLock::new(MockTransportState::default())),
        }
    }

    /// Queue a successful reply
    pub async fn push_reply(&self, data: Vec<u8>) {
        self.state.write().await.replies.push_back(Ok(data));
    }

    /// Queue a failed read
    pub async fn push_error(&self, error: TransportError) {
        self.state.write().await.replies.push_back(Err(error));
    }

    /// Get all sent data
    pub async fn sent_data(&self) -> Vec<Vec<u8>> {
        self.state.read().await.sent_data.clone()
    }

    /// Make the next `count` connect attempts fail
    pub async fn fail_connects(&self, count: u32) {
        self.state.write().await.failing_connects = count;
    }

    async fn next_reply(&self) -> Result<Vec<u8>, TransportError> {
        let mut state = self.state.write().await;
        if !state.connected {
            return Err(TransportError::NotConnected(self.name.clone()));
        }
        let reply = state.replies.pop_front().unwrap_or_else(|| {
            Err(TransportError::Timeout("no scripted reply".to_string()))
        });
        if let Ok(data) = &reply {
            state.stats.record_bytes_received(data.len());
        }
        reply
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn transport_type(&self) -> &str {
        "mock"
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn connect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.write().await;
        state.stats.record_connection_attempt();

        if state.failing_connects > 0 {
            state.failing_connects -= 1;
            state.stats.record_failed_connection();
            return Err(TransportError::ConnectionFailed(
                "Mock connection failure".to_string(),
            ));
        }

        state.connected = true;
        state.stats.record_successful_connection();
        debug!("Mock transport {} connected", self.name);
        Ok(())
    }

    async fn disconnect(&mut self) -> Result<(), TransportError> {
        let mut state = self.state.write().await;
        if state.connected {
            state.connected = false;
            state.stats.record_disconnection();
        }
        Ok(())
    }

    async fn read_timeout(&mut self, _timeout: Duration) -> Result<Vec<u8>, TransportError> {
        self.next_reply().await
    }

    async fn write_timeout(
        &mut self,
        data: &[u8],
        _timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut state = self.state.write().await;
        if !state.connected {
            return Err(TransportError::NotConnected(self.name.clone()));
        }
        state.sent_data.push(data.to_vec());
        state.stats.record_bytes_sent(data.len());
        Ok(())
    }

    // No drain: every scripted reply answers exactly one request
    async fn write_read_timeout(
        &mut self,
        data: &[u8],
        timeout: Duration,
    ) -> Result<Vec<u8>, TransportError> {
        self.write_timeout(data, timeout).await?;
        self.next_reply().await
    }

    async fn is_connected(&self) -> bool {
        self.state.read().await.connected
    }

    async fn stats(&self) -> TransportStats {
        self.state.read().await.stats.clone()
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_replies() {
        let mut transport = MockTransport::new("mock");
        let handle = transport.clone();

        transport.connect().await.unwrap();
        handle.push_reply(vec![0x01, 0x02]).await;
        handle
            .push_error(TransportError::Aborted("reset".to_string()))
            .await;

        let reply = transport
            .write_read_timeout(&[0xAA], Duration::ZERO)
            .await
            .unwrap();
        assert_eq!(reply, vec![0x01, 0x02]);

        let result = transport.write_read_timeout(&[0xBB], Duration::ZERO).await;
        assert!(matches!(result, Err(TransportError::Aborted(_))));

        let result = transport.read_timeout(Duration::ZERO).await;
        assert!(matches!(result, Err(TransportError::Timeout(_))));

        assert_eq!(handle.sent_data().await, vec![vec![0xAA], vec![0xBB]]);
    }

    #[tokio::test]
    async fn test_connect_failures() {
        let mut transport = MockTransport::new("mock");
        transport.fail_connects(1).await;

        assert!(transport.connect().await.is_err());
        assert!(!transport.is_connected().await);
        assert!(transport.connect().await.is_ok());
        assert!(transport.is_connected().await);

        let stats = transport.stats().await;
        assert_eq!(stats.connection_attempts, 2);
        assert_eq!(stats.failed_connections, 1);
    }

    #[tokio::test]
    async fn test_disconnected_write_fails() {
        let mut transport = MockTransport::new("mock");
        let result = transport.write_timeout(&[0x00], Duration::ZERO).await;
        assert!(matches!(result, Err(TransportError::NotConnected(_))));
    }
}
