//! Shared building blocks for the gateway services
//!
//! Provides:
//! - logging bootstrap with runtime level reload
//! - graceful shutdown signal handling
//! - HTTP error/response envelopes for axum handlers

pub mod api_types;
pub mod logging;
pub mod shutdown;

#[cfg(feature = "axum")]
pub use api_types::AppError;
pub use api_types::{ErrorInfo, ErrorResponse};
