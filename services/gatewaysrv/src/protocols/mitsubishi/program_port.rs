//! FX programming port protocol
//!
//! ```text
//! read   STX '0' addr(4 hex) len(2 hex) ETX sum(2 hex)
//! write  STX '1' addr(4 hex) len(2 hex) data(hex) ETX sum(2 hex)
//! force  STX '7'|'8' addr(4 hex) ETX sum(2 hex)
//! ```
//!
//! The checksum is the byte sum (mod 256) of everything after STX up to and
//! including ETX. Replies are ACK, NAK, or an STX frame whose hex payload
//! comes least significant byte first.

use super::device_code::{McDevice, SerialArea, FX_COUNTER32_START};
use super::McProtocol;
use crate::error::{GatewayError, Result};
use crate::utils::hex::{bytes_to_hex_upper, hex_to_bytes};

const STX: u8 = 0x02;
const ETX: u8 = 0x03;
const ACK: u8 = 0x06;
const NAK: u8 = 0x15;

const CMD_READ: u8 = b'0';
const CMD_WRITE: u8 = b'1';
const CMD_FORCE_ON: u8 = 0x37;
const CMD_FORCE_OFF: u8 = 0x38;

#[derive(Debug, Clone, Copy, Default)]
pub struct ProgramPort;

/// Byte sum of a frame body, mod 256
pub fn fx_checksum(data: &[u8]) -> u8 {
    data.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
}

/// Register and bit position of a point in a packed bit area
///
/// Reads of X/Y/M return a whole byte; the point is one bit of it.
pub fn packed_bit(area: SerialArea, address: u32) -> Option<(u32, u8)> {
    if !area.is_packed_bits() {
        return None;
    }
    let per_byte = area.points_per_byte();
    Some((address / per_byte, (address % per_byte) as u8))
}

/// Byte address and byte count of a word/bit-group access
fn memory_address(area: SerialArea, address: u32, points: u16) -> Result<(u16, u16)> {
    let out_of_map =
        || GatewayError::config(format!("address {address} is outside the FX memory map"));

    let (offset, length) = match area {
        SerialArea::Input | SerialArea::Output => (Some(address / 10), Some(points)),
        SerialArea::Data | SerialArea::Counter16Value => {
            (address.checked_mul(2), points.checked_mul(2))
        },
        SerialArea::Counter32Value => (
            address.saturating_sub(FX_COUNTER32_START).checked_mul(4),
            points.checked_mul(2),
        ),
        _ => (Some(address / 8), Some(points)),
    };

    let absolute = offset
        .and_then(|offset| offset.checked_add(u32::from(area.base())))
        .and_then(|absolute| u16::try_from(absolute).ok())
        .ok_or_else(out_of_map)?;
    Ok((absolute, length.ok_or_else(out_of_map)?))
}

/// Append ETX and the checksum to a frame starting with STX
fn seal(mut frame: Vec<u8>) -> Vec<u8> {
    frame.push(ETX);
    let sum = fx_checksum(&frame[1..]);
    frame.extend_from_slice(format!("{sum:02X}").as_bytes());
    frame
}

impl McProtocol for ProgramPort {
    fn name(&self) -> &'static str {
        "FX Program Port"
    }

    fn read_request(
        &self,
        device: McDevice,
        _is_bit: bool,
        address: u32,
        points: u16,
    ) -> Result<Vec<u8>> {
        let area = SerialArea::select(device, address);
        let (absolute, length) = memory_address(area, address, points)?;

        let mut frame = vec![STX, CMD_READ];
        frame.extend_from_slice(format!("{absolute:04X}{length:02X}").as_bytes());
        Ok(seal(frame))
    }

    fn write_request(
        &self,
        device: McDevice,
        is_bit: bool,
        address: u32,
        points: u16,
        data: &[u8],
    ) -> Result<Vec<u8>> {
        let area = SerialArea::select(device, address);

        if is_bit {
            let base = area.force_base().ok_or_else(|| {
                GatewayError::config("data registers cannot be forced on or off")
            })?;
            let bit_address = address
                .checked_add(u32::from(base))
                .and_then(|absolute| u16::try_from(absolute).ok())
                .ok_or_else(|| {
                    GatewayError::config(format!(
                        "bit address {address} is outside the FX memory map"
                    ))
                })?;
            let on = data.last().copied().unwrap_or(0) != 0;

            let mut frame = vec![STX, if on { CMD_FORCE_ON } else { CMD_FORCE_OFF }];
            frame.extend_from_slice(format!("{bit_address:04X}").as_bytes());
            return Ok(seal(frame));
        }

        let (absolute, length) = memory_address(area, address, points)?;
        // Packed bit areas take the byte holding the point
        let payload = if area.is_packed_bits() {
            data.last().map(|b| vec![*b]).unwrap_or_default()
        } else {
            data.to_vec()
        };

        let mut frame = vec![STX, CMD_WRITE];
        frame.extend_from_slice(format!("{absolute:04X}{length:02X}").as_bytes());
        frame.extend_from_slice(bytes_to_hex_upper(&payload).as_bytes());
        Ok(seal(frame))
    }

    fn parse(&self, response: &[u8]) -> Result<Vec<u8>> {
        let Some(&first) = response.first() else {
            return Err(GatewayError::protocol("no any data"));
        };

        match first {
            ACK => return Ok(Vec::new()),
            NAK => return Err(GatewayError::protocol("PLC answered NAK")),
            STX => {},
            other => {
                return Err(GatewayError::protocol(format!(
                    "unknown reply header: {other:02X}"
                )))
            },
        }

        if response.len() < 5 {
            return Err(GatewayError::protocol(format!(
                "length is {} but expected at least 5",
                response.len()
            )));
        }

        let len = response.len();
        let expected = format!("{:02X}", fx_checksum(&response[1..len - 2]));
        if expected.as_bytes() != &response[len - 2..] {
            return Err(GatewayError::protocol(format!(
                "checksum is {expected} but received {}",
                String::from_utf8_lossy(&response[len - 2..])
            )));
        }

        let mut payload = hex_to_bytes(&response[1..len - 3])?;
        payload.reverse();
        Ok(payload)
    }
}
