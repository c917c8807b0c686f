//! Hexadecimal Utilities
//!
//! Encoding and decoding helpers used by the ASCII protocol variants and by
//! the raw packet debug logs.
//!
//! ```rust
//! use gatewaysrv::utils::hex::{bytes_to_hex_upper, hex_to_bytes, format_hex_pretty};
//!
//! let data = &[0x01, 0x02, 0x03, 0xFF];
//! assert_eq!(bytes_to_hex_upper(data), "010203FF");
//! assert_eq!(hex_to_bytes(b"010203ff").unwrap(), data.to_vec());
//! assert_eq!(format_hex_pretty(data), "01 02 03 FF");
//! ```

use crate::error::{ErrorExt, GatewayError, Result};

/// Convert byte array to uppercase hexadecimal string
pub fn bytes_to_hex_upper(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join("")
}

/// Decode ASCII hex characters into bytes
///
/// Accepts upper and lower case digits. Odd lengths and non-hex characters
/// are rejected: the input comes straight off the wire.
pub fn hex_to_bytes(hex: &[u8]) -> Result<Vec<u8>> {
    if hex.len() % 2 != 0 {
        return Err(GatewayError::protocol(format!(
            "hex payload must have even length, got {}",
            hex.len()
        )));
    }

    hex.chunks(2)
        .map(|pair| {
            let text = std::str::from_utf8(pair).protocol_error("invalid hex byte")?;
            u8::from_str_radix(text, 16).protocol_error(&format!("invalid hex byte '{text}'"))
        })
        .collect()
}

/// Parse a fixed-width ASCII hex field (e.g. a 4-char end code)
pub fn hex_field(field: &[u8]) -> Result<u32> {
    let text = std::str::from_utf8(field).protocol_error("invalid hex field")?;
    u32::from_str_radix(text, 16).protocol_error(&format!("invalid hex field '{text}'"))
}

/// Format byte array as space separated uppercase hex, for packet logs
pub fn format_hex_pretty(data: &[u8]) -> String {
    data.iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}
