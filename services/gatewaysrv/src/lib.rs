//! Industrial IoT gateway service
//!
//! Polls field devices over Modbus (RTU, ASCII, TCP), Mitsubishi MELSEC
//! (Qna3E ASCII/Binary, FX programming port) and Siemens S7, keeps the last
//! sample of every configured variable in memory, and serves it over HTTP.
//!
//! Layering, bottom-up: [`core::transport`] moves bytes, [`protocols`] build
//! and parse frames, [`core::codec`] turns register bytes into engineering
//! values, [`drivers`] own one link each and [`service`] holds the data point
//! store and its samplers.

pub mod api;
pub mod core;
pub mod drivers;
pub mod error;
pub mod protocols;
pub mod service;
pub mod utils;

pub use error::{GatewayError, Result};
