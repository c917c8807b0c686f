//! Mitsubishi device (memory area) codes
//!
//! Variables name an area by register family (X, Y, M, ...). Each frame
//! format encodes that family differently: Qna3E frames use a one-byte binary
//! code or a two-character ASCII code, the FX programming port addresses a
//! flat memory map where every family has a fixed base.

use crate::core::config::types::RegType;
use crate::error::{GatewayError, Result};

/// Register family of a Mitsubishi variable
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McDevice {
    /// Inputs
    X,
    /// Outputs
    Y,
    /// Internal relays
    M,
    /// Step relays / special relays
    S,
    /// Timer coils
    T,
    /// Counter coils
    C,
    /// Data registers
    D,
    /// Timer current values
    Tv,
    /// Counter current values
    Cv,
}

impl TryFrom<RegType> for McDevice {
    type Error = GatewayError;

    fn try_from(reg_type: RegType) -> Result<Self> {
        match reg_type {
            RegType::MitsubishiX => Ok(McDevice::X),
            RegType::MitsubishiY => Ok(McDevice::Y),
            RegType::MitsubishiM => Ok(McDevice::M),
            RegType::MitsubishiS => Ok(McDevice::S),
            RegType::MitsubishiT => Ok(McDevice::T),
            RegType::MitsubishiC => Ok(McDevice::C),
            RegType::MitsubishiD => Ok(McDevice::D),
            RegType::MitsubishiTv => Ok(McDevice::Tv),
            RegType::MitsubishiCv => Ok(McDevice::Cv),
            other => Err(GatewayError::config(format!(
                "register type {} is not a Mitsubishi area",
                u32::from(other)
            ))),
        }
    }
}

/// Qna3E device code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QnaDeviceCode {
    pub binary: u8,
    pub ascii: &'static [u8; 2],
}

impl QnaDeviceCode {
    pub const INPUT: Self = Self::new(0x9C, b"X*");
    pub const OUTPUT: Self = Self::new(0x9D, b"Y*");
    pub const INTERNAL_RELAY: Self = Self::new(0x90, b"M*");
    pub const SPECIAL_RELAY: Self = Self::new(0x91, b"SM");
    pub const TIMER_COIL: Self = Self::new(0xC0, b"TC");
    pub const COUNTER_COIL: Self = Self::new(0xC3, b"CC");
    pub const DATA_REGISTER: Self = Self::new(0xA8, b"D*");
    pub const TIMER_CURRENT: Self = Self::new(0xC2, b"TN");
    pub const COUNTER_CURRENT: Self = Self::new(0xC5, b"CN");

    const fn new(binary: u8, ascii: &'static [u8; 2]) -> Self {
        Self { binary, ascii }
    }
}

impl From<McDevice> for QnaDeviceCode {
    fn from(device: McDevice) -> Self {
        match device {
            McDevice::X => QnaDeviceCode::INPUT,
            McDevice::Y => QnaDeviceCode::OUTPUT,
            McDevice::M => QnaDeviceCode::INTERNAL_RELAY,
            McDevice::S => QnaDeviceCode::SPECIAL_RELAY,
            McDevice::T => QnaDeviceCode::TIMER_COIL,
            McDevice::C => QnaDeviceCode::COUNTER_COIL,
            McDevice::D => QnaDeviceCode::DATA_REGISTER,
            McDevice::Tv => QnaDeviceCode::TIMER_CURRENT,
            McDevice::Cv => QnaDeviceCode::COUNTER_CURRENT,
        }
    }
}

/// Counter numbers above this are 32-bit counters on FX PLCs
pub const FX_COUNTER32_START: u32 = 200;

/// FX programming-port memory area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SerialArea {
    Status,
    SpecialRelay,
    Input,
    Output,
    TimerCoil,
    CounterCoil,
    TimerValue,
    Counter16Value,
    Counter32Value,
    Data,
}

impl SerialArea {
    /// Select the area for a family; counter values above C200 are 32-bit
    pub fn select(device: McDevice, address: u32) -> Self {
        match device {
            McDevice::X => SerialArea::Input,
            McDevice::Y => SerialArea::Output,
            McDevice::M => SerialArea::SpecialRelay,
            McDevice::S => SerialArea::Status,
            McDevice::T => SerialArea::TimerCoil,
            McDevice::C => SerialArea::CounterCoil,
            McDevice::D => SerialArea::Data,
            McDevice::Tv => SerialArea::TimerValue,
            McDevice::Cv if address > FX_COUNTER32_START => SerialArea::Counter32Value,
            McDevice::Cv => SerialArea::Counter16Value,
        }
    }

    /// Byte address of the area in the read/write memory map
    pub fn base(self) -> u16 {
        match self {
            SerialArea::Status => 0x0000,
            SerialArea::SpecialRelay => 0x0100,
            SerialArea::Input => 0x0080,
            SerialArea::Output => 0x00A0,
            SerialArea::TimerCoil => 0x00C0,
            SerialArea::CounterCoil => 0x01C0,
            SerialArea::TimerValue => 0x0800,
            SerialArea::Counter16Value => 0x0A00,
            SerialArea::Counter32Value => 0x0C00,
            SerialArea::Data => 0x1000,
        }
    }

    /// Bit address base used by the force on/off commands
    pub fn force_base(self) -> Option<u16> {
        match self {
            SerialArea::Status => Some(0x0000),
            SerialArea::Input => Some(0x0400),
            SerialArea::Output => Some(0x0500),
            SerialArea::SpecialRelay => Some(0x0800),
            SerialArea::CounterCoil => Some(0x03C0),
            SerialArea::Counter16Value | SerialArea::Counter32Value => Some(0x0E00),
            SerialArea::TimerCoil => Some(0x02C0),
            SerialArea::TimerValue => Some(0x0600),
            SerialArea::Data => None,
        }
    }

    /// Packed bit areas whose reads return a byte of 8 (or 10-numbered) points
    pub fn is_packed_bits(self) -> bool {
        matches!(
            self,
            SerialArea::Input | SerialArea::Output | SerialArea::SpecialRelay
        )
    }

    /// Points per byte in the address numbering of a packed bit area
    ///
    /// X and Y are numbered in groups of ten; M in groups of eight.
    pub fn points_per_byte(self) -> u32 {
        match self {
            SerialArea::Input | SerialArea::Output => 10,
            _ => 8,
        }
    }
}
