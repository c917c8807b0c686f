//! Error handling for the gateway service
//!
//! One flat error type shared by the codec, protocol stacks, drivers and the
//! store. Transport faults keep their own type (see `core::transport`) and are
//! folded in through `From`.

use thiserror::Error;

use crate::core::transport::TransportError;

/// Gateway service error type
#[derive(Error, Debug, Clone)]
pub enum GatewayError {
    /// Transport deadline exceeded; escalates to reconnect after repeated hits
    #[error("Transport timeout: {0}")]
    TransportTimeout(String),

    /// Connection aborted by the peer (or EOF on PLC links)
    #[error("Transport aborted: {0}")]
    TransportAborted(String),

    /// Any other transport failure
    #[error("Transport error: {0}")]
    TransportError(String),

    /// Driver link is down
    #[error("Not connected: {0}")]
    NotConnected(String),

    /// Malformed, truncated or rejected frame
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// Raw register bytes do not match the width of the data type
    #[error("Codec length mismatch for {name}: expected {expected} bytes, got {got}")]
    CodecLengthMismatch {
        name: String,
        expected: usize,
        got: usize,
    },

    /// Unknown port/device/variable name or id
    #[error("{0}")]
    LookupError(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Unsupported data type or value out of range
    #[error("Data error: {0}")]
    DataError(String),

    /// Input/Output operation errors
    #[error("IO error: {0}")]
    IoError(String),

    /// Internal errors
    #[error("Internal error: {0}")]
    InternalError(String),
}

/// Result type alias for the gateway service
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    pub fn timeout(msg: impl Into<String>) -> Self {
        GatewayError::TransportTimeout(msg.into())
    }

    pub fn aborted(msg: impl Into<String>) -> Self {
        GatewayError::TransportAborted(msg.into())
    }

    pub fn transport(msg: impl Into<String>) -> Self {
        GatewayError::TransportError(msg.into())
    }

    pub fn not_connected(msg: impl Into<String>) -> Self {
        GatewayError::NotConnected(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        GatewayError::ProtocolError(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        GatewayError::ConfigError(msg.into())
    }

    pub fn data(msg: impl Into<String>) -> Self {
        GatewayError::DataError(msg.into())
    }

    pub fn io(msg: impl Into<String>) -> Self {
        GatewayError::IoError(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::InternalError(msg.into())
    }

    /// Lookup failure for an unknown variable name or id
    pub fn variable_not_found() -> Self {
        GatewayError::LookupError("variable name is not found".to_string())
    }

    pub fn length_mismatch(name: impl Into<String>, expected: usize, got: usize) -> Self {
        GatewayError::CodecLengthMismatch {
            name: name.into(),
            expected,
            got,
        }
    }
}

// ============================================================================
// From implementations for external error types
// ============================================================================

impl From<TransportError> for GatewayError {
    fn from(err: TransportError) -> Self {
        match err {
            TransportError::Timeout(msg) => GatewayError::TransportTimeout(msg),
            TransportError::Aborted(msg) => GatewayError::TransportAborted(msg),
            TransportError::NotConnected(msg) => GatewayError::NotConnected(msg),
            other => GatewayError::TransportError(other.to_string()),
        }
    }
}

impl From<std::io::Error> for GatewayError {
    fn from(err: std::io::Error) -> Self {
        GatewayError::IoError(err.to_string())
    }
}

impl From<serde_json::Error> for GatewayError {
    fn from(err: serde_json::Error) -> Self {
        GatewayError::ConfigError(format!("JSON: {err}"))
    }
}

impl From<figment::Error> for GatewayError {
    fn from(err: figment::Error) -> Self {
        GatewayError::ConfigError(err.to_string())
    }
}

// ============================================================================
// Extension trait for adding context to errors
// ============================================================================

/// Extension trait for adding context to errors
pub trait ErrorExt<T> {
    fn config_error(self, msg: &str) -> Result<T>;
    fn protocol_error(self, msg: &str) -> Result<T>;
}

impl<T, E> ErrorExt<T> for std::result::Result<T, E>
where
    E: std::fmt::Display,
{
    fn config_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| GatewayError::ConfigError(format!("{msg}: {e}")))
    }

    fn protocol_error(self, msg: &str) -> Result<T> {
        self.map_err(|e| GatewayError::ProtocolError(format!("{msg}: {e}")))
    }
}

// ============================================================================
// API Adaptation: GatewayError → AppError conversion
// ============================================================================

impl From<GatewayError> for common::AppError {
    fn from(err: GatewayError) -> Self {
        use common::AppError;

        match &err {
            GatewayError::LookupError(_) => AppError::not_found(err.to_string()),
            GatewayError::DataError(_) | GatewayError::ConfigError(_) => {
                AppError::bad_request(err.to_string())
            },
            GatewayError::NotConnected(_) => AppError::service_unavailable(err.to_string()),
            _ => AppError::internal_error(err.to_string()),
        }
    }
}
