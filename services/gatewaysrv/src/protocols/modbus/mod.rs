//! Modbus Protocol Stack
//!
//! Maps a variable's register type and data type onto function codes and
//! register counts, and wraps the resulting PDU in RTU, ASCII or TCP framing.
//!
//! ```text
//! protocols/modbus
//!     ├── ModbusStack (request building / response parsing)
//!     ├── ModbusFrameProcessor (MBAP header / CRC / LRC handling)
//!     └── ModbusPdu, PduBuilder (function code encoding)
//! ```

pub mod constants;
pub mod frame;
pub mod pdu;

pub use frame::{calculate_crc16, calculate_lrc, ModbusFrameProcessor, ModbusMode};
pub use pdu::{exception_description, parse_response, ModbusPdu, PduBuilder};

use constants::*;

use crate::core::config::types::{DataType, RegType, VariableConfig};
use crate::error::{GatewayError, Result};

/// Registers (or coils) spanned by one value of `data_type`
pub fn register_count(data_type: DataType) -> Result<u16> {
    match data_type {
        DataType::Bit
        | DataType::Bool
        | DataType::Byte
        | DataType::Uint16
        | DataType::Int16 => Ok(1),
        DataType::Uint32 | DataType::Int32 | DataType::Float => Ok(2),
        DataType::Uint64 | DataType::Int64 | DataType::Double => Ok(4),
        DataType::String => Err(GatewayError::data("string variables are not supported")),
    }
}

fn register_address(raw: u32) -> Result<u16> {
    u16::try_from(raw)
        .map_err(|_| GatewayError::config(format!("register address {raw} exceeds 65535")))
}

/// Flat coil number of bit `bit` in coil byte `reg_addr`
fn coil_bit_address(reg_addr: u32, bit: u8) -> Result<u32> {
    reg_addr
        .checked_mul(8)
        .and_then(|address| address.checked_add(u32::from(bit)))
        .ok_or_else(|| {
            GatewayError::config(format!("coil byte address {reg_addr} is out of range"))
        })
}

/// Function code, start address and quantity of a read
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadPlan {
    pub function_code: u8,
    pub address: u16,
    pub quantity: u16,
}

impl ReadPlan {
    /// Plan the read of one variable
    ///
    /// A `Bit` variable on a coil area addresses byte `RegAddr` of the coil
    /// space, so it reads the 8 coils starting at `RegAddr * 8`.
    pub fn for_variable(variable: &VariableConfig) -> Result<Self> {
        let mut quantity = register_count(variable.data_type)?;
        let mut address = variable.param.reg_addr;

        let function_code = match variable.param.reg_type {
            RegType::CoilWriteSingle | RegType::CoilWriteMultiple => {
                if variable.data_type == DataType::Bit {
                    quantity = 8;
                    address = coil_bit_address(address, 0)?;
                }
                FC_READ_COILS
            },
            RegType::InputStatus => FC_READ_DISCRETE_INPUTS,
            RegType::HoldingWriteSingle | RegType::HoldingWriteMultiple => {
                FC_READ_HOLDING_REGISTERS
            },
            RegType::InputRegister => FC_READ_INPUT_REGISTERS,
            other => {
                return Err(GatewayError::config(format!(
                    "register type {} is not a Modbus area",
                    u32::from(other)
                )))
            },
        };

        Ok(Self {
            function_code,
            address: register_address(address)?,
            quantity,
        })
    }
}

/// Build the write PDU for one variable
///
/// `encoded` is the codec output for the value (for `Bit`, the encoded
/// read-modify-write word); `value` is the engineering value as requested.
pub fn build_write_pdu(variable: &VariableConfig, encoded: &[u8], value: f64) -> Result<ModbusPdu> {
    let is_bit = variable.data_type == DataType::Bit;
    let reg_addr = variable.param.reg_addr;

    match variable.param.reg_type {
        RegType::CoilWriteSingle => {
            let address = if is_bit {
                coil_bit_address(reg_addr, variable.param.bit_addr)?
            } else {
                reg_addr
            };
            PduBuilder::build_write_single_coil(register_address(address)?, value != 0.0)
        },
        RegType::CoilWriteMultiple => {
            let (address, quantity) = if is_bit {
                (coil_bit_address(reg_addr, 0)?, 8)
            } else {
                (reg_addr, register_count(variable.data_type)?)
            };
            let low = last_byte(encoded)?;
            PduBuilder::build_write_multiple_coils(register_address(address)?, quantity, &[low])
        },
        RegType::HoldingWriteSingle => {
            let word: [u8; 2] = encoded.try_into().map_err(|_| {
                GatewayError::data(format!(
                    "FC06 writes one register, {} needs {} bytes",
                    variable.name,
                    encoded.len()
                ))
            })?;
            PduBuilder::build_write_single_register(
                register_address(reg_addr)?,
                u16::from_be_bytes(word),
            )
        },
        RegType::HoldingWriteMultiple => PduBuilder::build_write_multiple_registers(
            register_address(reg_addr)?,
            register_count(variable.data_type)?,
            encoded,
        ),
        RegType::InputStatus | RegType::InputRegister => Err(GatewayError::data(format!(
            "{} is read-only",
            variable.name
        ))),
        other => Err(GatewayError::config(format!(
            "register type {} is not a Modbus area",
            u32::from(other)
        ))),
    }
}

fn last_byte(encoded: &[u8]) -> Result<u8> {
    encoded
        .last()
        .copied()
        .ok_or_else(|| GatewayError::data("empty encoded value"))
}

/// Request/response handling for one link
#[derive(Debug)]
pub struct ModbusStack {
    processor: ModbusFrameProcessor,
}

impl ModbusStack {
    pub fn new(mode: ModbusMode) -> Self {
        Self {
            processor: ModbusFrameProcessor::new(mode),
        }
    }

    pub fn mode(&self) -> ModbusMode {
        self.processor.mode()
    }

    /// Wire bytes of a read request
    pub fn read_request(&mut self, unit_id: u8, plan: &ReadPlan) -> Result<Vec<u8>> {
        let pdu = PduBuilder::build_read_request(plan.function_code, plan.address, plan.quantity)?;
        Ok(self.processor.build_frame(unit_id, &pdu))
    }

    /// Wire bytes of a write request
    pub fn write_request(&mut self, unit_id: u8, pdu: &ModbusPdu) -> Vec<u8> {
        self.processor.build_frame(unit_id, pdu)
    }

    /// Validate a response frame and return its data bytes
    ///
    /// A single data byte (8 coils) is left-padded to a 16-bit word so the
    /// codec always sees at least two bytes.
    pub fn parse(&self, unit_id: u8, request_fc: u8, frame: &[u8]) -> Result<Vec<u8>> {
        let pdu = self.processor.parse_frame(unit_id, frame)?;
        let data = parse_response(request_fc, &pdu)?;
        if data.len() == 1 {
            return Ok(vec![0, data[0]]);
        }
        Ok(data)
    }
}
