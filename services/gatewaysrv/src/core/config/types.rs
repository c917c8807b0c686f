//! Data point configuration model
//!
//! Field names and numeric codes follow the on-disk JSON files
//! (`PORTConfig.json`, `DEVConfig.json`, `VARConfig*.json`), including their
//! historical spellings (`Vaild`, `BandRate`, `DateBits`).

use std::time::Duration;

use serde::{Deserialize, Serialize};

// ============================================================================
// Numeric code enums
// ============================================================================

/// Physical channel kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum PortType {
    Serial,
    Network,
    Unknown(u32),
}

impl From<u32> for PortType {
    fn from(code: u32) -> Self {
        match code {
            1 => PortType::Serial,
            2 => PortType::Network,
            other => PortType::Unknown(other),
        }
    }
}

impl From<PortType> for u32 {
    fn from(value: PortType) -> Self {
        match value {
            PortType::Serial => 1,
            PortType::Network => 2,
            PortType::Unknown(code) => code,
        }
    }
}

/// Device family attached to a port; selects the driver and protocol stack
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum DeviceType {
    ModbusRtu,
    ModbusAscii,
    ModbusTcp,
    MitsubishiProgramPort,
    MitsubishiComputerLink,
    Siemens200Cp2431,
    SiemensS200Smart,
    SiemensS300,
    SiemensS400,
    SiemensS1200,
    SiemensS1500,
    McBinaryQna3E,
    McAsciiQna3E,
    Unknown(u32),
}

impl From<u32> for DeviceType {
    fn from(code: u32) -> Self {
        match code {
            3001 => DeviceType::ModbusRtu,
            3002 => DeviceType::ModbusAscii,
            3005 => DeviceType::ModbusTcp,
            3007 => DeviceType::MitsubishiProgramPort,
            3008 => DeviceType::MitsubishiComputerLink,
            3102 => DeviceType::Siemens200Cp2431,
            3103 => DeviceType::SiemensS200Smart,
            3104 => DeviceType::SiemensS300,
            3105 => DeviceType::SiemensS400,
            3106 => DeviceType::SiemensS1200,
            3107 => DeviceType::SiemensS1500,
            3109 => DeviceType::McBinaryQna3E,
            3110 => DeviceType::McAsciiQna3E,
            other => DeviceType::Unknown(other),
        }
    }
}

impl From<DeviceType> for u32 {
    fn from(value: DeviceType) -> Self {
        match value {
            DeviceType::ModbusRtu => 3001,
            DeviceType::ModbusAscii => 3002,
            DeviceType::ModbusTcp => 3005,
            DeviceType::MitsubishiProgramPort => 3007,
            DeviceType::MitsubishiComputerLink => 3008,
            DeviceType::Siemens200Cp2431 => 3102,
            DeviceType::SiemensS200Smart => 3103,
            DeviceType::SiemensS300 => 3104,
            DeviceType::SiemensS400 => 3105,
            DeviceType::SiemensS1200 => 3106,
            DeviceType::SiemensS1500 => 3107,
            DeviceType::McBinaryQna3E => 3109,
            DeviceType::McAsciiQna3E => 3110,
            DeviceType::Unknown(code) => code,
        }
    }
}

impl DeviceType {
    /// S7-200 family PLCs use their own counter/timer area codes
    pub fn is_siemens_200_family(self) -> bool {
        matches!(
            self,
            DeviceType::Siemens200Cp2431 | DeviceType::SiemensS200Smart
        )
    }
}

/// Value type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum DataType {
    Bool,
    Uint16,
    Uint32,
    Uint64,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
    String,
    Byte,
    Bit,
}

impl TryFrom<u32> for DataType {
    type Error = String;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        Ok(match code {
            1 => DataType::Bool,
            2 => DataType::Uint16,
            3 => DataType::Uint32,
            4 => DataType::Uint64,
            5 => DataType::Int16,
            6 => DataType::Int32,
            7 => DataType::Int64,
            8 => DataType::Float,
            9 => DataType::Double,
            10 => DataType::String,
            11 => DataType::Byte,
            12 => DataType::Bit,
            other => return Err(format!("unknown DataType code {other}")),
        })
    }
}

impl From<DataType> for u32 {
    fn from(value: DataType) -> Self {
        match value {
            DataType::Bool => 1,
            DataType::Uint16 => 2,
            DataType::Uint32 => 3,
            DataType::Uint64 => 4,
            DataType::Int16 => 5,
            DataType::Int32 => 6,
            DataType::Int64 => 7,
            DataType::Float => 8,
            DataType::Double => 9,
            DataType::String => 10,
            DataType::Byte => 11,
            DataType::Bit => 12,
        }
    }
}

/// Register / memory area selector, shared numbering across vendors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "u32", into = "u32")]
pub enum RegType {
    // Modbus
    CoilWriteMultiple,
    InputStatus,
    HoldingWriteMultiple,
    InputRegister,
    CoilWriteSingle,
    HoldingWriteSingle,
    // Mitsubishi
    MitsubishiX,
    MitsubishiY,
    MitsubishiM,
    MitsubishiS,
    MitsubishiT,
    MitsubishiC,
    MitsubishiD,
    MitsubishiTv,
    MitsubishiCv,
    // Siemens
    SiemensI,
    SiemensQ,
    SiemensM,
    SiemensV,
    SiemensSm,
    SiemensAi,
    SiemensAq,
    SiemensT,
    SiemensC,
    SiemensDb,
    Unknown(u32),
}

impl From<u32> for RegType {
    fn from(code: u32) -> Self {
        match code {
            1 => RegType::CoilWriteMultiple,
            2 => RegType::InputStatus,
            3 => RegType::HoldingWriteMultiple,
            4 => RegType::InputRegister,
            5 => RegType::CoilWriteSingle,
            6 => RegType::HoldingWriteSingle,
            11 => RegType::MitsubishiX,
            12 => RegType::MitsubishiY,
            13 => RegType::MitsubishiM,
            14 => RegType::MitsubishiS,
            15 => RegType::MitsubishiT,
            16 => RegType::MitsubishiC,
            17 => RegType::MitsubishiD,
            18 => RegType::MitsubishiTv,
            19 => RegType::MitsubishiCv,
            21 => RegType::SiemensI,
            22 => RegType::SiemensQ,
            23 => RegType::SiemensM,
            24 => RegType::SiemensV,
            25 => RegType::SiemensSm,
            26 => RegType::SiemensAi,
            27 => RegType::SiemensAq,
            28 => RegType::SiemensT,
            29 => RegType::SiemensC,
            30 => RegType::SiemensDb,
            other => RegType::Unknown(other),
        }
    }
}

impl From<RegType> for u32 {
    fn from(value: RegType) -> Self {
        match value {
            RegType::CoilWriteMultiple => 1,
            RegType::InputStatus => 2,
            RegType::HoldingWriteMultiple => 3,
            RegType::InputRegister => 4,
            RegType::CoilWriteSingle => 5,
            RegType::HoldingWriteSingle => 6,
            RegType::MitsubishiX => 11,
            RegType::MitsubishiY => 12,
            RegType::MitsubishiM => 13,
            RegType::MitsubishiS => 14,
            RegType::MitsubishiT => 15,
            RegType::MitsubishiC => 16,
            RegType::MitsubishiD => 17,
            RegType::MitsubishiTv => 18,
            RegType::MitsubishiCv => 19,
            RegType::SiemensI => 21,
            RegType::SiemensQ => 22,
            RegType::SiemensM => 23,
            RegType::SiemensV => 24,
            RegType::SiemensSm => 25,
            RegType::SiemensAi => 26,
            RegType::SiemensAq => 27,
            RegType::SiemensT => 28,
            RegType::SiemensC => 29,
            RegType::SiemensDb => 30,
            RegType::Unknown(code) => code,
        }
    }
}

impl RegType {
    /// Siemens areas (21..=30) carry booleans as a whole byte, not a packed bit
    pub fn is_siemens(self) -> bool {
        (21..=30).contains(&u32::from(self))
    }
}

impl Default for RegType {
    fn default() -> Self {
        RegType::Unknown(0)
    }
}

/// Byte arrangement of a multi-register value, relative to big-endian ABCD
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u32", into = "u32")]
pub enum ByteOrder {
    #[default]
    Abcd,
    Cdab,
    Badc,
    Dcba,
}

impl TryFrom<u32> for ByteOrder {
    type Error = String;

    fn try_from(code: u32) -> Result<Self, Self::Error> {
        match code {
            1 => Ok(ByteOrder::Abcd),
            2 => Ok(ByteOrder::Cdab),
            3 => Ok(ByteOrder::Badc),
            4 => Ok(ByteOrder::Dcba),
            other => Err(format!("unknown ByteOrder code {other}")),
        }
    }
}

impl From<ByteOrder> for u32 {
    fn from(value: ByteOrder) -> Self {
        match value {
            ByteOrder::Abcd => 1,
            ByteOrder::Cdab => 2,
            ByteOrder::Badc => 3,
            ByteOrder::Dcba => 4,
        }
    }
}

impl ByteOrder {
    /// Adjacent bytes are exchanged within each 16-bit unit
    pub fn swaps_pairs(self) -> bool {
        matches!(self, ByteOrder::Cdab | ByteOrder::Badc)
    }

    /// After the pair swap the value reads big-endian
    pub fn is_big_endian(self) -> bool {
        matches!(self, ByteOrder::Abcd | ByteOrder::Badc)
    }
}

// ============================================================================
// Port
// ============================================================================

/// `PORTConfig.json` root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfigFile {
    #[serde(rename = "PORTConfigs", default)]
    pub port_configs: Vec<PortConfig>,
}

/// One physical or logical channel
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortConfig {
    pub port_name: String,
    #[serde(rename = "Vaild", default)]
    pub valid: bool,
    pub port_type: PortType,
    pub device_type: DeviceType,
    #[serde(default)]
    pub param: PortParam,
}

/// Transport parameters of a port
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PortParam {
    #[serde(rename = "COM")]
    pub com: u32,
    pub band_rate: u32,
    pub parity: String,
    pub date_bits: u8,
    pub stop_bit: u8,
    pub convert_port: u32,
    pub convert_enable: bool,
    pub frame_interval_ms: u64,
    #[serde(rename = "IP")]
    pub ip: String,
    pub port_number: u16,
    pub resp_time_out_ms: u64,
    pub sample_interval_s: u64,
    /// S7 rack number
    pub rack: Option<u8>,
    /// S7 slot number
    pub slot: Option<u8>,
}

impl PortParam {
    /// Serial device node for the configured COM index
    pub fn serial_node(&self) -> String {
        if cfg!(unix) {
            format!("/dev/COM{}", self.com)
        } else {
            format!("COM{}", self.com)
        }
    }

    /// Response timeout, falling back to `default_ms` when unset
    pub fn response_timeout(&self, default_ms: u64) -> Duration {
        if self.resp_time_out_ms == 0 {
            Duration::from_millis(default_ms)
        } else {
            Duration::from_millis(self.resp_time_out_ms)
        }
    }

    /// Serial inter-byte gap, 50 ms when unset
    pub fn frame_interval(&self) -> Duration {
        if self.frame_interval_ms == 0 {
            Duration::from_millis(50)
        } else {
            Duration::from_millis(self.frame_interval_ms)
        }
    }

    /// Sweep interval; 0 is treated as 1 s so the sampler cannot spin
    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_s.max(1))
    }
}

// ============================================================================
// Device
// ============================================================================

/// `DEVConfig.json` root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceConfigFile {
    #[serde(rename = "DEVConfigs", default)]
    pub device_configs: Vec<PortDevices>,
}

/// Devices attached to one port
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct PortDevices {
    pub port_name: String,
    #[serde(default)]
    pub dev_list: Vec<DeviceConfig>,
}

/// A device on a port
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeviceConfig {
    pub dev_name: String,
    #[serde(default)]
    pub opc_path: String,
    #[serde(default)]
    pub dev_addr: u8,
    #[serde(default)]
    pub float_order: ByteOrder,
    #[serde(default)]
    pub long_order: ByteOrder,
    #[serde(default)]
    pub long_long_order: ByteOrder,
    #[serde(default)]
    pub double_order: ByteOrder,
}

// ============================================================================
// Variable
// ============================================================================

/// `VARConfig*.json` root
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct VariableConfigFile {
    #[serde(rename = "VARConfigs", default)]
    pub variable_configs: Vec<VariableGroup>,
}

/// Variables bound to one (port, device) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariableGroup {
    pub port_name: String,
    pub dev_name: String,
    #[serde(default)]
    pub var_list: Vec<VariableConfig>,
}

fn default_modulus() -> f64 {
    1.0
}

/// A named point under a (port, device) pair
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct VariableConfig {
    /// Reassigned by the loader, unique across all files, never 0
    #[serde(default)]
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub another_name: String,
    pub data_type: DataType,
    #[serde(default)]
    pub decimal: usize,
    #[serde(default)]
    pub unit: String,
    #[serde(default = "default_modulus")]
    pub modulus: f64,
    #[serde(default)]
    pub offset: f64,
    #[serde(default)]
    pub param: VariableParam,
}

/// Protocol addressing of a variable
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct VariableParam {
    #[serde(rename = "DBNum")]
    pub db_num: u16,
    pub reg_addr: u32,
    pub bit_addr: u8,
    pub reg_type: RegType,
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_port_config_field_names() {
        let json = r#"{
            "PortName": "P1",
            "Vaild": true,
            "PortType": 2,
            "DeviceType": 3005,
            "Param": {"IP": "10.0.0.5", "PortNumber": 502, "SampleIntervalS": 2}
        }"#;
        let port: PortConfig = serde_json::from_str(json).unwrap();
        assert!(port.valid);
        assert_eq!(port.port_type, PortType::Network);
        assert_eq!(port.device_type, DeviceType::ModbusTcp);
        assert_eq!(port.param.ip, "10.0.0.5");
        assert_eq!(port.param.port_number, 502);
        assert_eq!(port.param.sample_interval(), Duration::from_secs(2));
        assert!(port.param.rack.is_none());
    }

    #[test]
    fn test_unknown_device_type_is_kept() {
        assert_eq!(DeviceType::from(3999), DeviceType::Unknown(3999));
        assert_eq!(u32::from(DeviceType::Unknown(3999)), 3999);
    }

    #[test]
    fn test_variable_defaults() {
        let json = r#"{"Name": "t", "DataType": 2, "Param": {"RegAddr": 100, "RegType": 3}}"#;
        let var: VariableConfig = serde_json::from_str(json).unwrap();
        assert_eq!(var.modulus, 1.0);
        assert_eq!(var.offset, 0.0);
        assert_eq!(var.data_type, DataType::Uint16);
        assert_eq!(var.param.reg_type, RegType::HoldingWriteMultiple);
    }

    #[test]
    fn test_device_order_defaults() {
        let json = r#"{"DevName": "d", "DevAddr": 1, "FloatOrder": 2}"#;
        let dev: DeviceConfig = serde_json::from_str(json).unwrap();
        assert_eq!(dev.float_order, ByteOrder::Cdab);
        assert_eq!(dev.long_order, ByteOrder::Abcd);
    }

    #[test]
    fn test_bad_data_type_rejected() {
        let json = r#"{"Name": "t", "DataType": 99}"#;
        assert!(serde_json::from_str::<VariableConfig>(json).is_err());
    }

    #[test]
    fn test_zero_sample_interval() {
        let param = PortParam::default();
        assert_eq!(param.sample_interval(), Duration::from_secs(1));
        assert_eq!(param.frame_interval(), Duration::from_millis(50));
        assert_eq!(param.response_timeout(3000), Duration::from_millis(3000));
    }

    #[test]
    fn test_siemens_reg_types() {
        assert!(RegType::SiemensDb.is_siemens());
        assert!(RegType::SiemensI.is_siemens());
        assert!(!RegType::MitsubishiCv.is_siemens());
    }
}
