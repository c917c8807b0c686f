//! Modbus protocol constants

/// Maximum PDU size (function code + data)
pub const MAX_PDU_SIZE: usize = 253;

/// MBAP header length without the unit identifier
pub const MBAP_HEADER_LEN: usize = 6;

// Function codes
pub const FC_READ_COILS: u8 = 0x01;
pub const FC_READ_DISCRETE_INPUTS: u8 = 0x02;
pub const FC_READ_HOLDING_REGISTERS: u8 = 0x03;
pub const FC_READ_INPUT_REGISTERS: u8 = 0x04;
pub const FC_WRITE_SINGLE_COIL: u8 = 0x05;
pub const FC_WRITE_SINGLE_REGISTER: u8 = 0x06;
pub const FC_WRITE_MULTIPLE_COILS: u8 = 0x0F;
pub const FC_WRITE_MULTIPLE_REGISTERS: u8 = 0x10;

/// Exception flag in the response function code
pub const EXCEPTION_FLAG: u8 = 0x80;

/// FC05 payload for ON
pub const COIL_ON: u16 = 0xFF00;
/// FC05 payload for OFF
pub const COIL_OFF: u16 = 0x0000;

// Protocol limits
pub const MODBUS_MAX_READ_COILS: u16 = 2000;
pub const MODBUS_MAX_READ_REGISTERS: u16 = 125;
pub const MODBUS_MAX_WRITE_COILS: u16 = 1968;
pub const MODBUS_MAX_WRITE_REGISTERS: u16 = 123;
