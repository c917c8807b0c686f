//! Qna3E frame, binary code
//!
//! Same fields as the ASCII variant, little-endian except the sub header.
//! Response: data length at 7..9, end code at 9..11, payload from 11 with its
//! bytes in reverse order.

use bytes::{BufMut, BytesMut};

use super::device_code::{McDevice, QnaDeviceCode};
use super::*;
use crate::error::{GatewayError, Result};

/// Bytes counted by the data length field before the payload
const REQUEST_BODY_LEN: usize = 0x0C;
const RESPONSE_HEADER_LEN: usize = 11;

/// Largest head device number the 3-byte address field holds
const MAX_DEVICE_ADDRESS: u32 = 0x00FF_FFFF;

#[derive(Debug, Clone, Copy, Default)]
pub struct Qna3eBinary;

impl Qna3eBinary {
    fn frame(
        command: u16,
        is_bit: bool,
        device: McDevice,
        address: u32,
        points: u16,
        payload: &[u8],
    ) -> Result<Vec<u8>> {
        if address > MAX_DEVICE_ADDRESS {
            return Err(GatewayError::config(format!(
                "device address {address} exceeds {MAX_DEVICE_ADDRESS}"
            )));
        }
        let code = QnaDeviceCode::from(device);
        let sub_command = if is_bit { SUB_CMD_BIT } else { SUB_CMD_WORD };

        let mut frame = BytesMut::with_capacity(21 + payload.len());
        frame.put_u16(SUB_HEADER);
        frame.put_u8(NETWORK_NUMBER);
        frame.put_u8(PLC_NUMBER);
        frame.put_u16_le(TARGET_IO_NUMBER);
        frame.put_u8(TARGET_STATION);
        frame.put_u16_le((REQUEST_BODY_LEN + payload.len()) as u16);
        frame.put_u16_le(CPU_TIMER);
        frame.put_u16_le(command);
        frame.put_u16_le(sub_command);
        frame.put_slice(&address.to_le_bytes()[..3]);
        frame.put_u8(code.binary);
        frame.put_u16_le(points);
        frame.put_slice(payload);
        Ok(frame.to_vec())
    }
}

impl McProtocol for Qna3eBinary {
    fn name(&self) -> &'static str {
        "Qna3E Binary"
    }

    fn read_request(
        &self,
        device: McDevice,
        is_bit: bool,
        address: u32,
        points: u16,
    ) -> Result<Vec<u8>> {
        Self::frame(CMD_BATCH_READ, is_bit, device, address, points, &[])
    }

    fn write_request(
        &self,
        device: McDevice,
        is_bit: bool,
        address: u32,
        points: u16,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let payload: Vec<u8> = if is_bit {
            vec![bit_point(data)]
        } else {
            data.iter().rev().copied().collect()
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

        let end_code = u16::from_le_bytes([response[9], response[10]]);
        let data_length = u16::from_le_bytes([response[7], response[8]]);
        if end_code != 0 {
            return Err(GatewayError::protocol(format!(
                "invalid end code: 0x{end_code:04X}"
            )));
        }
        if u32::from(data_length) == EMPTY_RESPONSE_LENGTH {
            return Ok(Vec::new());
        }

        // The PLC sends the least significant byte first
        Ok(response[RESPONSE_HEADER_LEN..].iter().rev().copied().collect())
    }
}
