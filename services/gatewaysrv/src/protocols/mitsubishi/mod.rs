//! Mitsubishi MELSEC Protocol Stacks
//!
//! Three frame formats share one interface:
//! - Qna3E ASCII (MC protocol, hex text over TCP)
//! - Qna3E Binary (MC protocol, little-endian binary over TCP)
//! - FX programming port (STX/ETX framed ASCII over serial)

pub mod device_code;
pub mod program_port;
pub mod qna3e_ascii;
pub mod qna3e_binary;

pub use device_code::{McDevice, QnaDeviceCode, SerialArea};
pub use program_port::ProgramPort;
pub use qna3e_ascii::Qna3eAscii;
pub use qna3e_binary::Qna3eBinary;

use std::fmt;

use crate::core::config::types::DeviceType;
use crate::error::Result;

// Qna3E fixed header fields
pub(crate) const SUB_HEADER: u16 = 0x5000;
pub(crate) const NETWORK_NUMBER: u8 = 0x00;
pub(crate) const PLC_NUMBER: u8 = 0xFF;
pub(crate) const TARGET_IO_NUMBER: u16 = 0x03FF;
pub(crate) const TARGET_STATION: u8 = 0x00;
pub(crate) const CPU_TIMER: u16 = 0x0010;

// Qna3E commands
pub(crate) const CMD_BATCH_READ: u16 = 0x0401;
pub(crate) const CMD_BATCH_WRITE: u16 = 0x1401;
pub(crate) const SUB_CMD_WORD: u16 = 0x0000;
pub(crate) const SUB_CMD_BIT: u16 = 0x0001;

/// Data length of a Qna3E response that carries no payload (end code only)
pub(crate) const EMPTY_RESPONSE_LENGTH: u32 = 2;

/// One bit point in a Qna3E bit-unit write: the high nibble holds the state
pub(crate) fn bit_point(data: &[u8]) -> u8 {
    if data.last().copied().unwrap_or(0) != 0 {
        0x10
    } else {
        0x00
    }
}

/// Frame builder and parser for one Mitsubishi link
pub trait McProtocol: Send + Sync + fmt::Debug {
    /// Frame format name, for logs
    fn name(&self) -> &'static str;

    /// Batch read of `points` units starting at `address`
    ///
    /// `is_bit` selects bit units (one point per relay) instead of words.
    fn read_request(
        &self,
        device: McDevice,
        is_bit: bool,
        address: u32,
        points: u16,
    ) -> Result<Vec<u8>>;

    /// Batch write of `data` (codec output) starting at `address`
    fn write_request(
        &self,
        device: McDevice,
        is_bit: bool,
        address: u32,
        points: u16,
        data: &[u8],
    ) -> Result<Vec<u8>>;

    /// Validate a response and return its payload; empty when it has none
    fn parse(&self, response: &[u8]) -> Result<Vec<u8>>;
}

/// Frame format for a Mitsubishi device type
pub fn create_protocol(device_type: DeviceType) -> Option<Box<dyn McProtocol>> {
    match device_type {
        DeviceType::MitsubishiProgramPort => Some(Box::new(ProgramPort)),
        DeviceType::McBinaryQna3E => Some(Box::new(Qna3eBinary)),
        DeviceType::McAsciiQna3E => Some(Box::new(Qna3eAscii)),
        _ => None,
    }
}
