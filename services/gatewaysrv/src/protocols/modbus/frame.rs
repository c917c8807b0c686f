//! Modbus framing
//!
//! Wraps a PDU for the wire and unwraps responses:
//! - RTU: `unit | pdu | crc16` (CRC little-endian)
//! - ASCII: `':' | hex(unit | pdu | lrc) | CR LF`
//! - TCP: MBAP header (transaction id, protocol 0, length, unit) + pdu

use tracing::debug;

use super::constants::MBAP_HEADER_LEN;
use super::pdu::ModbusPdu;
use crate::error::{GatewayError, Result};
use crate::utils::hex::{bytes_to_hex_upper, hex_to_bytes};

/// Modbus transport mode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModbusMode {
    Rtu,
    Ascii,
    Tcp,
}

/// Modbus frame processor
///
/// Only one request is in flight per driver, so the last transaction id is
/// all the state needed to match a TCP response.
#[derive(Debug)]
pub struct ModbusFrameProcessor {
    mode: ModbusMode,
    next_transaction_id: u16,
    last_transaction_id: u16,
}

impl ModbusFrameProcessor {
    pub fn new(mode: ModbusMode) -> Self {
        Self {
            mode,
            next_transaction_id: 1,
            last_transaction_id: 0,
        }
    }

    pub fn mode(&self) -> ModbusMode {
        self.mode
    }

    /// Get next transaction ID; wraps from 0xFFFF to 0x0000
    fn next_transaction_id(&mut self) -> u16 {
        let id = self.next_transaction_id;
        self.next_transaction_id = self.next_transaction_id.wrapping_add(1);
        id
    }

    /// Build complete Modbus frame
    pub fn build_frame(&mut self, unit_id: u8, pdu: &ModbusPdu) -> Vec<u8> {
        match self.mode {
            ModbusMode::Tcp => {
                let transaction_id = self.next_transaction_id();
                self.last_transaction_id = transaction_id;
                build_tcp_frame(unit_id, pdu, transaction_id)
            },
            ModbusMode::Rtu => build_rtu_frame(unit_id, pdu),
            ModbusMode::Ascii => build_ascii_frame(unit_id, pdu),
        }
    }

    /// Parse received frame, checking it answers the last request to `unit_id`
    pub fn parse_frame(&self, unit_id: u8, data: &[u8]) -> Result<ModbusPdu> {
        let (received_unit, pdu) = match self.mode {
            ModbusMode::Tcp => self.parse_tcp_frame(data)?,
            ModbusMode::Rtu => parse_rtu_frame(data)?,
            ModbusMode::Ascii => parse_ascii_frame(data)?,
        };

        // TCP gateways commonly answer with unit 0 or 0xFF
        let unit_ok = received_unit == unit_id
            || (self.mode == ModbusMode::Tcp && matches!(received_unit, 0 | 0xFF));
        if !unit_ok {
            return Err(GatewayError::protocol(format!(
                "response from unit {received_unit}, expected {unit_id}"
            )));
        }
        Ok(pdu)
    }

    fn parse_tcp_frame(&self, data: &[u8]) -> Result<(u8, ModbusPdu)> {
        if data.len() < MBAP_HEADER_LEN + 2 {
            return Err(GatewayError::protocol("TCP frame too short"));
        }

        let transaction_id = u16::from_be_bytes([data[0], data[1]]);
        let protocol_id = u16::from_be_bytes([data[2], data[3]]);
        let length = u16::from_be_bytes([data[4], data[5]]);
        let unit_id = data[6];

        debug!(
            "MBAP header: trans_id={:04X}, protocol_id={:04X}, length={}, unit_id={}",
            transaction_id, protocol_id, length, unit_id
        );

        if protocol_id != 0 {
            return Err(GatewayError::protocol(format!(
                "Invalid protocol ID: expected 0, got {}",
                protocol_id
            )));
        }

        if data.len() != MBAP_HEADER_LEN + length as usize {
            return Err(GatewayError::protocol(format!(
                "Invalid TCP frame length: expected {}, got {}",
                MBAP_HEADER_LEN + length as usize,
                data.len()
            )));
        }

        if transaction_id != self.last_transaction_id {
            return Err(GatewayError::protocol(format!(
                "Response ignored - transaction ID {:04X}, expected {:04X}",
                transaction_id, self.last_transaction_id
            )));
        }

        Ok((unit_id, ModbusPdu::from_slice(&data[MBAP_HEADER_LEN + 1..])?))
    }
}

/// Build TCP frame with specific transaction ID (MBAP + PDU)
fn build_tcp_frame(unit_id: u8, pdu: &ModbusPdu, transaction_id: u16) -> Vec<u8> {
    let length = (pdu.len() + 1) as u16; // PDU length + unit_id

    let mut frame = Vec::with_capacity(MBAP_HEADER_LEN + 1 + pdu.len());
    frame.extend_from_slice(&transaction_id.to_be_bytes());
    frame.extend_from_slice(&0u16.to_be_bytes()); // protocol_id
    frame.extend_from_slice(&length.to_be_bytes());
    frame.push(unit_id);
    frame.extend_from_slice(pdu.as_slice());

    debug!(
        "Building TCP frame: trans_id={:04X}, unit_id={}, FC={:02X}, PDU_len={}",
        transaction_id,
        unit_id,
        pdu.function_code().unwrap_or(0),
        pdu.len()
    );
    frame
}

/// Build RTU frame (`unit_id` + PDU + CRC)
fn build_rtu_frame(unit_id: u8, pdu: &ModbusPdu) -> Vec<u8> {
    let mut frame = Vec::with_capacity(1 + pdu.len() + 2);
    frame.push(unit_id);
    frame.extend_from_slice(pdu.as_slice());

    let crc = calculate_crc16(&frame);
    frame.extend_from_slice(&crc.to_le_bytes());
    frame
}

fn parse_rtu_frame(data: &[u8]) -> Result<(u8, ModbusPdu)> {
    if data.len() < 4 {
        return Err(GatewayError::protocol("RTU frame too short"));
    }

    let frame_len = data.len();
    let received_crc = u16::from_le_bytes([data[frame_len - 2], data[frame_len - 1]]);
    let calculated_crc = calculate_crc16(&data[..frame_len - 2]);
    if received_crc != calculated_crc {
        return Err(GatewayError::protocol(format!(
            "CRC mismatch: expected 0x{calculated_crc:04X}, got 0x{received_crc:04X}"
        )));
    }

    Ok((data[0], ModbusPdu::from_slice(&data[1..frame_len - 2])?))
}

fn build_ascii_frame(unit_id: u8, pdu: &ModbusPdu) -> Vec<u8> {
    let mut body = Vec::with_capacity(pdu.len() + 2);
    body.push(unit_id);
    body.extend_from_slice(pdu.as_slice());
    body.push(calculate_lrc(&body));

    let mut frame = Vec::with_capacity(body.len() * 2 + 3);
    frame.push(b':');
    frame.extend_from_slice(bytes_to_hex_upper(&body).as_bytes());
    frame.extend_from_slice(b"\r\n");
    frame
}

fn parse_ascii_frame(data: &[u8]) -> Result<(u8, ModbusPdu)> {
    let Some(rest) = data.strip_prefix(b":") else {
        return Err(GatewayError::protocol("ASCII frame must start with ':'"));
    };
    let Some(hex) = rest.strip_suffix(b"\r\n") else {
        return Err(GatewayError::protocol("ASCII frame must end with CR LF"));
    };

    let body = hex_to_bytes(hex)?;
    if body.len() < 3 {
        return Err(GatewayError::protocol("ASCII frame too short"));
    }

    let (content, lrc) = body.split_at(body.len() - 1);
    let expected = calculate_lrc(content);
    if lrc[0] != expected {
        return Err(GatewayError::protocol(format!(
            "LRC mismatch: expected 0x{expected:02X}, got 0x{:02X}",
            lrc[0]
        )));
    }

    Ok((content[0], ModbusPdu::from_slice(&content[1..])?))
}

/// Calculate CRC16 checksum (Modbus RTU standard)
pub fn calculate_crc16(data: &[u8]) -> u16 {
    let mut crc: u16 = 0xFFFF;

    for &byte in data {
        crc ^= u16::from(byte);
        for _ in 0..8 {
            if crc & 1 != 0 {
                crc >>= 1;
                crc ^= 0xA001;
            } else {
                crc >>= 1;
            }
        }
    }

    crc
}

/// Two's complement of the byte sum (Modbus ASCII)
pub fn calculate_lrc(data: &[u8]) -> u8 {
    data.iter()
        .fold(0u8, |acc, &b| acc.wrapping_add(b))
        .wrapping_neg()
}
