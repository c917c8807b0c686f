//! Modbus PDU data structure
//!
//! Fixed-size stack buffer plus the request builders and response parsing for
//! the eight function codes the gateway uses (FC01-06, FC15, FC16).

use tracing::debug;

use super::constants::*;
use crate::error::{GatewayError, Result};

/// PDU with stack-allocated fixed array
#[derive(Debug, Clone)]
pub struct ModbusPdu {
    data: [u8; MAX_PDU_SIZE],
    len: usize,
}

impl ModbusPdu {
    /// Create an empty PDU
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0; MAX_PDU_SIZE],
            len: 0,
        }
    }

    /// Create a PDU from a byte slice
    pub fn from_slice(data: &[u8]) -> Result<Self> {
        if data.len() > MAX_PDU_SIZE {
            return Err(GatewayError::protocol(format!(
                "PDU too large: {} bytes (max {})",
                data.len(),
                MAX_PDU_SIZE
            )));
        }

        let mut pdu = Self::new();
        pdu.data[..data.len()].copy_from_slice(data);
        pdu.len = data.len();
        Ok(pdu)
    }

    /// Push a single byte
    #[inline]
    pub fn push(&mut self, byte: u8) -> Result<()> {
        if self.len >= MAX_PDU_SIZE {
            return Err(GatewayError::protocol("PDU buffer full"));
        }
        self.data[self.len] = byte;
        self.len += 1;
        Ok(())
    }

    /// Push u16 in big-endian
    #[inline]
    pub fn push_u16(&mut self, value: u16) -> Result<()> {
        self.push((value >> 8) as u8)?;
        self.push((value & 0xFF) as u8)
    }

    /// Extend with a byte slice
    pub fn extend(&mut self, data: &[u8]) -> Result<()> {
        if self.len + data.len() > MAX_PDU_SIZE {
            return Err(GatewayError::protocol(format!(
                "PDU would exceed max size: {} + {} > {}",
                self.len,
                data.len(),
                MAX_PDU_SIZE
            )));
        }
        self.data[self.len..self.len + data.len()].copy_from_slice(data);
        self.len += data.len();
        Ok(())
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data[..self.len]
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Get function code (first byte)
    #[inline]
    pub fn function_code(&self) -> Option<u8> {
        (self.len > 0).then(|| self.data[0])
    }

    /// Check if exception response
    #[inline]
    pub fn is_exception(&self) -> bool {
        self.function_code()
            .map(|fc| fc & EXCEPTION_FLAG != 0)
            .unwrap_or(false)
    }

    /// Get exception code
    #[inline]
    pub fn exception_code(&self) -> Option<u8> {
        (self.is_exception() && self.len > 1).then(|| self.data[1])
    }

    /// Get human-readable function code description
    fn function_code_description(fc: u8) -> &'static str {
        match fc & 0x7F {
            FC_READ_COILS => "Read Coils",
            FC_READ_DISCRETE_INPUTS => "Read Discrete Inputs",
            FC_READ_HOLDING_REGISTERS => "Read Holding Registers",
            FC_READ_INPUT_REGISTERS => "Read Input Registers",
            FC_WRITE_SINGLE_COIL => "Write Single Coil",
            FC_WRITE_SINGLE_REGISTER => "Write Single Register",
            FC_WRITE_MULTIPLE_COILS => "Write Multiple Coils",
            FC_WRITE_MULTIPLE_REGISTERS => "Write Multiple Registers",
            _ => "Unknown Function",
        }
    }
}

impl Default for ModbusPdu {
    fn default() -> Self {
        Self::new()
    }
}

/// Standard description of a Modbus exception code
pub fn exception_description(code: u8) -> &'static str {
    match code {
        0x01 => "Illegal Function",
        0x02 => "Illegal Data Address",
        0x03 => "Illegal Data Value",
        0x04 => "Slave Device Failure",
        0x05 => "Acknowledge",
        0x06 => "Slave Device Busy",
        0x07 => "Negative Acknowledge",
        0x08 => "Memory Parity Error",
        0x0A => "Gateway Path Unavailable",
        0x0B => "Gateway Target Device Failed to Respond",
        _ => "Unknown Exception",
    }
}

/// PDU builder - fluent API
pub struct PduBuilder {
    pdu: ModbusPdu,
}

impl Default for PduBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl PduBuilder {
    #[inline]
    pub fn new() -> Self {
        Self {
            pdu: ModbusPdu::new(),
        }
    }

    #[inline]
    pub fn function_code(mut self, fc: u8) -> Result<Self> {
        self.pdu.push(fc)?;
        Ok(self)
    }

    #[inline]
    pub fn address(mut self, addr: u16) -> Result<Self> {
        self.pdu.push_u16(addr)?;
        Ok(self)
    }

    #[inline]
    pub fn quantity(mut self, qty: u16) -> Result<Self> {
        self.pdu.push_u16(qty)?;
        Ok(self)
    }

    #[inline]
    pub fn byte(mut self, b: u8) -> Result<Self> {
        self.pdu.push(b)?;
        Ok(self)
    }

    #[inline]
    pub fn data(mut self, data: &[u8]) -> Result<Self> {
        self.pdu.extend(data)?;
        Ok(self)
    }

    pub fn build(self) -> ModbusPdu {
        if let Some(fc) = self.pdu.function_code() {
            debug!(
                "PDU built: FC={:02X} ({}), total_len={}",
                fc,
                ModbusPdu::function_code_description(fc),
                self.pdu.len()
            );
        }
        self.pdu
    }

    /// Build a read request PDU for FC01-04
    pub fn build_read_request(fc: u8, start_address: u16, quantity: u16) -> Result<ModbusPdu> {
        if !matches!(fc, FC_READ_COILS..=FC_READ_INPUT_REGISTERS) {
            return Err(GatewayError::protocol(format!(
                "build_read_request only supports FC01-04, got FC{:02X}",
                fc
            )));
        }
        let limit = if fc <= FC_READ_DISCRETE_INPUTS {
            MODBUS_MAX_READ_COILS
        } else {
            MODBUS_MAX_READ_REGISTERS
        };
        if quantity == 0 || quantity > limit {
            return Err(GatewayError::protocol(format!(
                "read quantity {quantity} out of range 1..={limit}"
            )));
        }
        Ok(PduBuilder::new()
            .function_code(fc)?
            .address(start_address)?
            .quantity(quantity)?
            .build())
    }

    /// FC05, `on` maps to 0xFF00 and off to 0x0000
    pub fn build_write_single_coil(address: u16, on: bool) -> Result<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_COIL)?
            .address(address)?
            .quantity(if on { COIL_ON } else { COIL_OFF })?
            .build())
    }

    /// FC06
    pub fn build_write_single_register(address: u16, value: u16) -> Result<ModbusPdu> {
        Ok(PduBuilder::new()
            .function_code(FC_WRITE_SINGLE_REGISTER)?
            .address(address)?
            .quantity(value)?
            .build())
    }

    /// FC15, `packed` holds the coil states LSB first
    pub fn build_write_multiple_coils(
        address: u16,
        quantity: u16,
        packed: &[u8],
    ) -> Result<ModbusPdu> {
        if quantity == 0 || quantity > MODBUS_MAX_WRITE_COILS {
            return Err(GatewayError::protocol(format!(
                "coil quantity {quantity} out of range"
            )));
        }
        let expected = usize::from(quantity).div_ceil(8);
        if packed.len() != expected {
            return Err(GatewayError::protocol(format!(
                "{quantity} coils need {expected} data bytes, got {}",
                packed.len()
            )));
        }
        PduBuilder::new()
            .function_code(FC_WRITE_MULTIPLE_COILS)?
            .address(address)?
            .quantity(quantity)?
            .byte(packed.len() as u8)?
            .data(packed)
            .map(PduBuilder::build)
    }

    /// FC16, `data` holds `quantity` big-endian register words
    pub fn build_write_multiple_registers(
        address: u16,
        quantity: u16,
        data: &[u8],
    ) -> Result<ModbusPdu> {
        if quantity == 0 || quantity > MODBUS_MAX_WRITE_REGISTERS {
            return Err(GatewayError::protocol(format!(
                "register quantity {quantity} out of range"
            )));
        }
        if data.len() != usize::from(quantity) * 2 {
            return Err(GatewayError::protocol(format!(
                "{quantity} registers need {} data bytes, got {}",
                usize::from(quantity) * 2,
                data.len()
            )));
        }
        PduBuilder::new()
            .function_code(FC_WRITE_MULTIPLE_REGISTERS)?
            .address(address)?
            .quantity(quantity)?
            .byte(data.len() as u8)?
            .data(data)
            .map(PduBuilder::build)
    }
}

/// Extract the payload of a response PDU
///
/// Read responses yield the data bytes after the byte count. Write responses
/// echo address and value; they yield an empty payload once validated.
pub fn parse_response(request_fc: u8, pdu: &ModbusPdu) -> Result<Vec<u8>> {
    let data = pdu.as_slice();
    let Some(fc) = pdu.function_code() else {
        return Err(GatewayError::protocol("empty response PDU"));
    };

    if pdu.is_exception() {
        let code = pdu.exception_code().unwrap_or(0);
        return Err(GatewayError::protocol(format!(
            "Modbus exception on FC{:02X}: {} ({:02X})",
            fc & 0x7F,
            exception_description(code),
            code
        )));
    }

    if fc != request_fc {
        return Err(GatewayError::protocol(format!(
            "function code mismatch: sent FC{request_fc:02X}, got FC{fc:02X}"
        )));
    }

    match fc {
        FC_READ_COILS..=FC_READ_INPUT_REGISTERS => {
            let Some(&count) = data.get(1) else {
                return Err(GatewayError::protocol("read response without byte count"));
            };
            let payload = &data[2..];
            if payload.len() != usize::from(count) {
                return Err(GatewayError::protocol(format!(
                    "byte count {count} does not match {} data bytes",
                    payload.len()
                )));
            }
            Ok(payload.to_vec())
        },
        FC_WRITE_SINGLE_COIL
        | FC_WRITE_SINGLE_REGISTER
        | FC_WRITE_MULTIPLE_COILS
        | FC_WRITE_MULTIPLE_REGISTERS => {
            if data.len() != 5 {
                return Err(GatewayError::protocol(format!(
                    "write response must be 5 bytes, got {}",
                    data.len()
                )));
            }
            Ok(Vec::new())
        },
        other => Err(GatewayError::protocol(format!(
            "unsupported function code FC{other:02X}"
        ))),
    }
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;

    #[test]
    fn test_pdu_overflow() {
        let mut pdu = ModbusPdu::new();
        for _ in 0..MAX_PDU_SIZE {
            pdu.push(0).unwrap();
        }
        assert!(pdu.push(0).is_err());
        assert!(ModbusPdu::from_slice(&[0u8; MAX_PDU_SIZE + 1]).is_err());
    }

    #[test]
    fn test_build_read_request_fc03() {
        let pdu = PduBuilder::build_read_request(0x03, 100, 2).unwrap();
        assert_eq!(pdu.as_slice(), &[0x03, 0x00, 0x64, 0x00, 0x02]);

        assert!(PduBuilder::build_read_request(0x05, 0, 1).is_err());
        assert!(PduBuilder::build_read_request(0x03, 0, 0).is_err());
        assert!(PduBuilder::build_read_request(0x03, 0, 126).is_err());
    }

    #[test]
    fn test_single_coil_sentinels() {
        let on = PduBuilder::build_write_single_coil(0x0013, true).unwrap();
        assert_eq!(on.as_slice(), &[0x05, 0x00, 0x13, 0xFF, 0x00]);

        let off = PduBuilder::build_write_single_coil(0x0013, false).unwrap();
        assert_eq!(off.as_slice(), &[0x05, 0x00, 0x13, 0x00, 0x00]);
    }

    #[test]
    fn test_write_multiple_builders() {
        let pdu = PduBuilder::build_write_multiple_coils(0x0008, 8, &[0x05]).unwrap();
        assert_eq!(pdu.as_slice(), &[0x0F, 0x00, 0x08, 0x00, 0x08, 0x01, 0x05]);
        assert!(PduBuilder::build_write_multiple_coils(0, 9, &[0x05]).is_err());

        let pdu =
            PduBuilder::build_write_multiple_registers(0x0001, 2, &[0x12, 0x34, 0x56, 0x78])
                .unwrap();
        assert_eq!(
            pdu.as_slice(),
            &[0x10, 0x00, 0x01, 0x00, 0x02, 0x04, 0x12, 0x34, 0x56, 0x78]
        );
        assert!(PduBuilder::build_write_multiple_registers(0, 2, &[0x00, 0x01]).is_err());
    }

    #[test]
    fn test_parse_read_response() {
        let pdu = ModbusPdu::from_slice(&[0x03, 0x02, 0x00, 0x2A]).unwrap();
        assert_eq!(parse_response(0x03, &pdu).unwrap(), vec![0x00, 0x2A]);

        let truncated = ModbusPdu::from_slice(&[0x03, 0x04, 0x00, 0x2A]).unwrap();
        assert!(parse_response(0x03, &truncated).is_err());

        let wrong_fc = ModbusPdu::from_slice(&[0x04, 0x02, 0x00, 0x2A]).unwrap();
        assert!(parse_response(0x03, &wrong_fc).is_err());
    }

    #[test]
    fn test_parse_exception_response() {
        let pdu = ModbusPdu::from_slice(&[0x83, 0x02]).unwrap();
        assert!(pdu.is_exception());
        assert_eq!(pdu.exception_code(), Some(0x02));

        let err = parse_response(0x03, &pdu).unwrap_err();
        assert!(err.to_string().contains("Illegal Data Address"));
    }

    #[test]
    fn test_parse_write_echo() {
        let pdu = ModbusPdu::from_slice(&[0x06, 0x00, 0x01, 0x00, 0x03]).unwrap();
        assert!(parse_response(0x06, &pdu).unwrap().is_empty());
    }

    #[test]
    fn test_exception_descriptions() {
        assert_eq!(exception_description(0x01), "Illegal Function");
        assert_eq!(
            exception_description(0x0B),
            "Gateway Target Device Failed to Respond"
        );
        assert_eq!(exception_description(0x42), "Unknown Exception");
    }
}
