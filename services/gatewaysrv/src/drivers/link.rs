//! Link state machine shared by all drivers
//!
//! One [`Link`] owns the transport of a port together with its connection
//! state and timeout counter, all behind a single async mutex. Holding the
//! lock is holding the wire: one request in flight per port.
//!
//! ```text
//! Disconnected ──(reconnect loop)──▶ Connecting ──(connect + handshake)──▶ Connected
//!       ▲                                                                     │
//!       └──── 5th consecutive timeout / abort / lost stream ─────────────────┘
//! ```

use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tokio::sync::{Mutex, MutexGuard, Notify};
use tracing::{debug, info, warn};

use crate::core::transport::{Transport, TransportError, TransportStats};
use crate::error::{GatewayError, Result};
use crate::utils::hex::format_hex_pretty;

/// Consecutive timeouts that force a reconnect
pub const TIMEOUT_LIMIT: u32 = 5;

/// Pause before a request on a disconnected link reports "no value"
pub const DISCONNECTED_THROTTLE: Duration = Duration::from_secs(1);

/// Connection state of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LinkState {
    Disconnected,
    Connecting,
    Connected,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::Connected => write!(f, "connected"),
        }
    }
}

/// Snapshot for the status endpoint
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkStatus {
    pub port_name: String,
    pub state: LinkState,
    pub timeout_count: u32,
    /// Absent while a connect attempt holds the transport
    pub transport: Option<TransportStats>,
}

#[derive(Debug)]
struct LinkInner {
    state: LinkState,
    timeout_count: u32,
    /// Taken out while connecting so requests never wait on a connect
    transport: Option<Box<dyn Transport>>,
}

/// Transport plus connection state of one port
pub struct Link {
    port_name: String,
    inner: Mutex<LinkInner>,
    /// EOF means the PLC closed the connection (TCP-based PLC drivers)
    eof_is_abort: bool,
    throttle: Duration,
    lost: Notify,
}

impl fmt::Debug for Link {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Link")
            .field("port_name", &self.port_name)
            .field("eof_is_abort", &self.eof_is_abort)
            .finish()
    }
}

impl Link {
    pub fn new(port_name: impl Into<String>, transport: Box<dyn Transport>) -> Self {
        Self {
            port_name: port_name.into(),
            inner: Mutex::new(LinkInner {
                state: LinkState::Disconnected,
                timeout_count: 0,
                transport: Some(transport),
            }),
            eof_is_abort: false,
            throttle: DISCONNECTED_THROTTLE,
            lost: Notify::new(),
        }
    }

    /// Treat EOF like a connection abort
    pub fn with_eof_abort(mut self, eof_is_abort: bool) -> Self {
        self.eof_is_abort = eof_is_abort;
        self
    }

    /// Override the disconnected throttle
    pub fn with_throttle(mut self, throttle: Duration) -> Self {
        self.throttle = throttle;
        self
    }

    pub fn port_name(&self) -> &str {
        &self.port_name
    }

    pub async fn state(&self) -> LinkState {
        self.inner.lock().await.state
    }

    pub async fn timeout_count(&self) -> u32 {
        self.inner.lock().await.timeout_count
    }

    pub async fn status(&self) -> LinkStatus {
        let inner = self.inner.lock().await;
        let transport = match inner.transport.as_ref() {
            Some(transport) => Some(transport.stats().await),
            None => None,
        };
        LinkStatus {
            port_name: self.port_name.clone(),
            state: inner.state,
            timeout_count: inner.timeout_count,
            transport,
        }
    }

    /// Resolves when the link drops out of `Connected`
    pub async fn lost(&self) {
        self.lost.notified().await;
    }

    /// Take the transport for a connect attempt
    ///
    /// Returns `None` unless the link is `Disconnected`; otherwise the link
    /// moves to `Connecting` until [`Link::finish_connect`] hands it back.
    pub async fn begin_connect(&self) -> Option<Box<dyn Transport>> {
        let mut inner = self.inner.lock().await;
        if inner.state != LinkState::Disconnected {
            return None;
        }
        let transport = inner.transport.take()?;
        inner.state = LinkState::Connecting;
        Some(transport)
    }

    /// Return the transport after a connect attempt
    pub async fn finish_connect(&self, transport: Box<dyn Transport>, connected: bool) {
        let mut inner = self.inner.lock().await;
        inner.transport = Some(transport);
        inner.timeout_count = 0;
        if connected {
            inner.state = LinkState::Connected;
            info!(port = %self.port_name, "Link connected");
        } else {
            inner.state = LinkState::Disconnected;
        }
    }

    /// Lock the wire for one or more transactions
    ///
    /// A link that is not `Connected` yields `NotConnected` after the throttle
    /// pause, so a sampler sweeping a dead port does not spin.
    pub async fn session(&self) -> Result<Session<'_>> {
        let inner = self.inner.lock().await;
        if inner.state != LinkState::Connected || inner.transport.is_none() {
            let state = inner.state;
            drop(inner);
            tokio::time::sleep(self.throttle).await;
            return Err(GatewayError::not_connected(format!(
                "port {} is {state}",
                self.port_name
            )));
        }
        Ok(Session { link: self, inner })
    }

    /// Close the transport on shutdown; not reported as a loss
    pub async fn close(&self) {
        let mut inner = self.inner.lock().await;
        inner.state = LinkState::Disconnected;
        inner.timeout_count = 0;
        if let Some(transport) = inner.transport.as_mut() {
            let _ = transport.disconnect().await;
        }
    }

    /// Single request/response exchange
    pub async fn transact(&self, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        self.session().await?.transact(request, timeout).await
    }
}

/// Exclusive use of a connected link
pub struct Session<'a> {
    link: &'a Link,
    inner: MutexGuard<'a, LinkInner>,
}

impl Session<'_> {
    /// Drain, write, read; classifies any fault into a state transition
    pub async fn transact(&mut self, request: &[u8], timeout: Duration) -> Result<Vec<u8>> {
        let port = self.link.port_name.as_str();
        let Some(transport) = self.inner.transport.as_mut() else {
            return Err(GatewayError::not_connected(port));
        };

        debug!(
            port,
            hex_data = %format_hex_pretty(request),
            length = request.len(),
            direction = "send",
            "[Link] Raw packet"
        );

        match transport.write_read_timeout(request, timeout).await {
            Ok(response) => {
                debug!(
                    port,
                    hex_data = %format_hex_pretty(&response),
                    length = response.len(),
                    direction = "recv",
                    "[Link] Raw packet"
                );
                self.inner.timeout_count = 0;
                Ok(response)
            },
            Err(err) => {
                self.handle_fault(&err).await;
                Err(err.into())
            },
        }
    }

    async fn handle_fault(&mut self, err: &TransportError) {
        let port = self.link.port_name.as_str();
        match err {
            TransportError::Timeout(_) => {
                self.inner.timeout_count += 1;
                if self.inner.timeout_count >= TIMEOUT_LIMIT {
                    warn!(
                        port,
                        "timeout times have exceeded the limit, reconnecting"
                    );
                    self.drop_link().await;
                } else {
                    warn!(
                        port,
                        timeout_count = self.inner.timeout_count,
                        "Transient timeout"
                    );
                }
            },
            TransportError::Aborted(_) => {
                warn!(port, error = %err, "connection aborted, reconnecting");
                self.drop_link().await;
            },
            TransportError::Eof(_) if self.link.eof_is_abort => {
                warn!(port, error = %err, "connection closed by peer, reconnecting");
                self.drop_link().await;
            },
            TransportError::NotConnected(_) => {
                warn!(port, error = %err, "stream lost, reconnecting");
                self.drop_link().await;
            },
            _ => {
                warn!(port, error = %err, "Unexpected transport error");
            },
        }
    }

    async fn drop_link(&mut self) {
        self.inner.timeout_count = 0;
        self.inner.state = LinkState::Disconnected;
        if let Some(transport) = self.inner.transport.as_mut() {
            let _ = transport.disconnect().await;
        }
        self.link.lost.notify_waiters();
    }
}
