//! Siemens S7 Protocol Stack
//!
//! Three nested layers: TPKT carries COTP, COTP data TPDUs carry S7comm.
//! A connection is opened with a COTP connection request followed by an S7
//! setup-communication job; afterwards each read or write is one job.

pub mod cotp;
pub mod s7comm;
pub mod tpkt;

pub use s7comm::S7Comm;

use crate::core::config::types::{DataType, DeviceType, RegType, VariableConfig};
use crate::error::{GatewayError, Result};

/// PLC family, selects the COTP TSAP parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiemensFamily {
    S200,
    S200Smart,
    S300,
    S400,
    S1200,
    S1500,
}

impl SiemensFamily {
    pub fn from_device_type(device_type: DeviceType) -> Option<Self> {
        match device_type {
            DeviceType::Siemens200Cp2431 => Some(SiemensFamily::S200),
            DeviceType::SiemensS200Smart => Some(SiemensFamily::S200Smart),
            DeviceType::SiemensS300 => Some(SiemensFamily::S300),
            DeviceType::SiemensS400 => Some(SiemensFamily::S400),
            DeviceType::SiemensS1200 => Some(SiemensFamily::S1200),
            DeviceType::SiemensS1500 => Some(SiemensFamily::S1500),
            _ => None,
        }
    }

    pub fn is_200_family(self) -> bool {
        matches!(self, SiemensFamily::S200 | SiemensFamily::S200Smart)
    }

    /// CPU slot used when the port does not set one
    pub fn default_slot(self) -> u8 {
        match self {
            SiemensFamily::S200 | SiemensFamily::S200Smart => 0x0A,
            SiemensFamily::S300 | SiemensFamily::S400 => 2,
            SiemensFamily::S1200 | SiemensFamily::S1500 => 1,
        }
    }
}

/// S7 memory area
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Area {
    SystemFlags,
    AnalogInputs,
    AnalogOutputs,
    Counter,
    Timer,
    Counter200,
    Timer200,
    Inputs,
    Outputs,
    Flags,
    DataBlock,
    V,
}

impl Area {
    pub fn code(self) -> u8 {
        match self {
            Area::SystemFlags => 0x05,
            Area::AnalogInputs => 0x06,
            Area::AnalogOutputs => 0x07,
            Area::Counter => 0x1C,
            Area::Timer => 0x1D,
            Area::Counter200 => 0x1E,
            Area::Timer200 => 0x1F,
            Area::Inputs => 0x81,
            Area::Outputs => 0x82,
            Area::Flags => 0x83,
            Area::DataBlock => 0x84,
            Area::V => 0x87,
        }
    }

    /// Area for a register type; counters and timers differ on the 200 family
    pub fn for_reg_type(reg_type: RegType, is_200_family: bool) -> Result<Self> {
        let area = match reg_type {
            RegType::SiemensI => Area::Inputs,
            RegType::SiemensQ => Area::Outputs,
            RegType::SiemensV => Area::V,
            RegType::SiemensDb => Area::DataBlock,
            RegType::SiemensC if is_200_family => Area::Counter200,
            RegType::SiemensC => Area::Counter,
            RegType::SiemensT if is_200_family => Area::Timer200,
            RegType::SiemensT => Area::Timer,
            RegType::SiemensAi => Area::AnalogInputs,
            RegType::SiemensAq => Area::AnalogOutputs,
            RegType::SiemensM => Area::Flags,
            RegType::SiemensSm => Area::SystemFlags,
            other => {
                return Err(GatewayError::config(format!(
                    "register type {} is not a Siemens area",
                    u32::from(other)
                )))
            },
        };
        Ok(area)
    }
}

/// Item transport size
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportSize {
    Bit,
    Byte,
    Word,
    DWord,
}

impl TransportSize {
    pub fn code(self) -> u8 {
        match self {
            TransportSize::Bit => 0x01,
            TransportSize::Byte => 0x02,
            TransportSize::Word => 0x04,
            TransportSize::DWord => 0x06,
        }
    }

    /// Transport size and element count for a data type
    pub fn for_data_type(data_type: DataType) -> Result<(Self, u16)> {
        match data_type {
            DataType::Bit | DataType::Bool => Ok((TransportSize::Bit, 1)),
            DataType::Byte => Ok((TransportSize::Byte, 1)),
            DataType::Uint16 | DataType::Int16 => Ok((TransportSize::Word, 1)),
            DataType::Uint32 | DataType::Int32 | DataType::Float => Ok((TransportSize::DWord, 1)),
            DataType::Uint64 | DataType::Int64 | DataType::Double => {
                Ok((TransportSize::DWord, 2))
            },
            DataType::String => Err(GatewayError::data("string variables are not supported")),
        }
    }
}

/// One S7-Any item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct S7Address {
    pub area: Area,
    pub db_number: u16,
    pub byte_address: u32,
    pub bit_address: u8,
    pub transport_size: TransportSize,
    pub count: u16,
}

impl S7Address {
    pub fn for_variable(family: SiemensFamily, variable: &VariableConfig) -> Result<Self> {
        let (transport_size, count) = TransportSize::for_data_type(variable.data_type)?;
        let param = &variable.param;
        Ok(Self {
            area: Area::for_reg_type(param.reg_type, family.is_200_family())?,
            db_number: param.db_num,
            byte_address: param.reg_addr,
            bit_address: param.bit_addr,
            transport_size,
            count,
        })
    }
}
