//! Utility functions shared by the protocol stacks and transports

pub mod hex;

pub use hex::{bytes_to_hex_upper, format_hex_pretty, hex_to_bytes};
