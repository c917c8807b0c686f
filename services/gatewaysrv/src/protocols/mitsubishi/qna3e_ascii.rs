//! Qna3E frame, ASCII code
//!
//! Request layout (all fields hex text unless noted):
//!
//! ```text
//! 5000 00 FF 03FF 00 | len(4) | 0010 | cmd(4) | sub(4) | code(2 chars) | addr(6 decimal) | count(4) | data
//! ```
//!
//! The response echoes the header, then data length at 14..18, end code at
//! 18..22 and the payload from 22.

use super::device_code::{McDevice, QnaDeviceCode};
use super::*;
use crate::error::{GatewayError, Result};
use crate::utils::hex::{bytes_to_hex_upper, hex_field, hex_to_bytes};

/// Characters counted by the data length field before the payload
const REQUEST_BODY_LEN: usize = 0x18;
/// Response header, data length and end code
const RESPONSE_HEADER_LEN: usize = 22;

/// Largest head device number the 6-digit address field holds
const MAX_DEVICE_ADDRESS: u32 = 999_999;

#[derive(Debug, Clone, Copy, Default)]
pub struct Qna3eAscii;

impl Qna3eAscii {
    fn frame(
        command: u16,
        is_bit: bool,
        device: McDevice,
        address: u32,
        points: u16,
        payload: &str,
    ) -> Result<Vec<u8>> {
        if address > MAX_DEVICE_ADDRESS {
            return Err(GatewayError::config(format!(
                "device address {address} exceeds {MAX_DEVICE_ADDRESS}"
            )));
        }
        let code = QnaDeviceCode::from(device);
        let sub_command = if is_bit { SUB_CMD_BIT } else { SUB_CMD_WORD };

        let mut frame = format!(
            "{:04X}{:02X}{:02X}{:04X}{:02X}{:04X}{:04X}{:04X}{:04X}",
            SUB_HEADER,
            NETWORK_NUMBER,
            PLC_NUMBER,
            TARGET_IO_NUMBER,
            TARGET_STATION,
            REQUEST_BODY_LEN + payload.len(),
            CPU_TIMER,
            command,
            sub_command
        )
        .into_bytes();
        frame.extend_from_slice(code.ascii);
        frame.extend_from_slice(format!("{:06}{:04X}", address, points).as_bytes());
        frame.extend_from_slice(payload.as_bytes());
        Ok(frame)
    }
}

/// Reverse the 16-bit word order of a multi-word value
///
/// Mitsubishi transmits the low word first; bytes inside a word stay in order.
fn reverse_words(data: &[u8]) -> Vec<u8> {
    if data.len() < 2 {
        return data.to_vec();
    }
    data.chunks(2).rev().flatten().copied().collect()
}

impl McProtocol for Qna3eAscii {
    fn name(&self) -> &'static str {
        "Qna3E ASCII"
    }

    fn read_request(
        &self,
        device: McDevice,
        is_bit: bool,
        address: u32,
        points: u16,
    ) -> Result<Vec<u8>> {
        Self::frame(CMD_BATCH_READ, is_bit, device, address, points, "")
    }

    fn write_request(
        &self,
        device: McDevice,
        is_bit: bool,
        address: u32,
        points: u16,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let payload = if is_bit {
            // One point is one character: "1" on, "0" off
            let point = if bit_point(data) == 0 { "0" } else { "1" };
            point.to_string()
        } else {
            bytes_to_hex_upper(&reverse_words(data))
        };
        Self::frame(
            CMD_BATCH_WRITE,
            is_bit,
            device,
            address,
            points,
            &payload,
        )
    }

    fn parse(&self, response: &[u8]) -> Result<Vec<u8>> {
        if response.len() < RESPONSE_HEADER_LEN {
            return Err(GatewayError::protocol(format!(
                "invalid length: {}",
                response.len()
            )));
        }

        let end_code = hex_field(&response[18..22])?;
        let data_length = hex_field(&response[14..18])?;
        if end_code != 0 {
            return Err(GatewayError::protocol(format!(
                "invalid end code: 0x{end_code:04X}"
            )));
        }
        if data_length == EMPTY_RESPONSE_LENGTH {
            return Ok(Vec::new());
        }

        let payload = &response[RESPONSE_HEADER_LEN..];
        if payload.len() == 1 {
            return Ok(vec![u8::from(payload[0] == b'1')]);
        }
        hex_to_bytes(payload)
    }
}
