//! S7comm job requests and acknowledgement parsing
//!
//! Every request rides in one COTP data TPDU:
//!
//! ```text
//! TPKT(4) | COTP DT(3) | header(10) | parameters | data
//! ```
//!
//! The read/write parameter block carries exactly one S7-Any item.

use bytes::{BufMut, BytesMut};
use tracing::debug;

use super::{cotp, tpkt, S7Address, SiemensFamily, TransportSize};
use crate::error::{GatewayError, Result};

const PROTOCOL_ID: u8 = 0x32;
const MSG_JOB_REQUEST: u8 = 0x01;

const FUNC_SETUP_COMMUNICATION: u8 = 0xF0;
const FUNC_READ_VAR: u8 = 0x04;
const FUNC_WRITE_VAR: u8 = 0x05;

const VAR_SPEC: u8 = 0x12;
const SYNTAX_ID_S7ANY: u8 = 0x10;
/// Item length after the length byte: syntax id through address
const ITEM_LEN: u8 = 10;

// Transport size inside a write data block
const DATA_SIZE_BIT: u8 = 0x03;
const DATA_SIZE_INTEGER: u8 = 0x05;

const RETURN_SUCCESS: u8 = 0xFF;
/// Acknowledgement header, including error class and code
const ACK_HEADER_LEN: usize = 12;
const SETUP_COMMUNICATION_LEN: u16 = 25;
/// Largest byte address the 3-byte `(byte << 3) | bit` field can carry
const MAX_BYTE_ADDRESS: u32 = 0x1F_FFFF;

/// Text of a data item return code
fn return_code_message(code: u8) -> &'static str {
    match code {
        0x00 => "reserved",
        0x01 => "Hardware error",
        0x03 => "Accessing the object not allowed",
        0x05 => "Invalid address",
        0x06 => "Data type not supported",
        0x07 => "Data type inconsistent",
        0x0A => "Object does not exist",
        0xFF => "Success",
        _ => "unknown error",
    }
}

/// S7comm frame builder for one PLC connection
#[derive(Debug, Clone, Copy)]
pub struct S7Comm {
    family: SiemensFamily,
    rack: u8,
    slot: u8,
}

impl S7Comm {
    pub fn new(family: SiemensFamily, rack: u8, slot: u8) -> Self {
        Self { family, rack, slot }
    }

    pub fn family(&self) -> SiemensFamily {
        self.family
    }

    /// COTP connection request, the first frame after the TCP connect
    pub fn connection_request(&self) -> Vec<u8> {
        cotp::connection_request(self.family, self.rack, self.slot)
    }

    /// Setup-communication job negotiating one outstanding job and a 960 byte PDU
    pub fn setup_communication(&self) -> Vec<u8> {
        let mut buf = BytesMut::with_capacity(usize::from(SETUP_COMMUNICATION_LEN));
        tpkt::put_header(&mut buf, SETUP_COMMUNICATION_LEN);
        buf.put_slice(&cotp::DATA_HEADER);
        Self::put_header(&mut buf, 8, 0);
        buf.put_u8(FUNC_SETUP_COMMUNICATION);
        buf.put_u8(0x00);
        buf.put_u16(1); // max AMQ calling
        buf.put_u16(1); // max AMQ called
        buf.put_u16(0x03C0);
        buf.to_vec()
    }

    /// Read-var job for one item
    pub fn read_request(&self, address: &S7Address) -> Result<Vec<u8>> {
        let mut buf = BytesMut::with_capacity(31);
        tpkt::put_header(&mut buf, 0);
        buf.put_slice(&cotp::DATA_HEADER);
        Self::put_header(&mut buf, 2 + 2 + u16::from(ITEM_LEN), 0);
        buf.put_u8(FUNC_READ_VAR);
        buf.put_u8(1);
        Self::put_item(&mut buf, address)?;

        let mut frame = buf.to_vec();
        tpkt::patch_length(&mut frame);
        Ok(frame)
    }

    /// Write-var job for one item
    ///
    /// Bit items announce their data length in bytes; every other item in bits.
    pub fn write_request(&self, address: &S7Address, data: &[u8]) -> Result<Vec<u8>> {
        let (data_size, data_len) = if address.transport_size == TransportSize::Bit {
            (DATA_SIZE_BIT, data.len())
        } else {
            (DATA_SIZE_INTEGER, data.len() * 8)
        };
        let data_len = u16::try_from(data_len)
            .map_err(|_| GatewayError::data(format!("{} bytes is too long to write", data.len())))?;

        let block_len = 4 + data.len() as u16;
        let mut buf = BytesMut::with_capacity(31 + usize::from(block_len));
        tpkt::put_header(&mut buf, 0);
        buf.put_slice(&cotp::DATA_HEADER);
        Self::put_header(&mut buf, 2 + 2 + u16::from(ITEM_LEN), block_len);
        buf.put_u8(FUNC_WRITE_VAR);
        buf.put_u8(1);
        Self::put_item(&mut buf, address)?;

        buf.put_u8(0x00);
        buf.put_u8(data_size);
        buf.put_u16(data_len);
        buf.put_slice(data);

        let mut frame = buf.to_vec();
        tpkt::patch_length(&mut frame);
        Ok(frame)
    }

    fn put_header(buf: &mut BytesMut, param_len: u16, data_len: u16) {
        buf.put_u8(PROTOCOL_ID);
        buf.put_u8(MSG_JOB_REQUEST);
        buf.put_u16(0x0000);
        buf.put_u16(rand::random::<u16>());
        buf.put_u16(param_len);
        buf.put_u16(data_len);
    }

    fn put_item(buf: &mut BytesMut, address: &S7Address) -> Result<()> {
        if address.byte_address > MAX_BYTE_ADDRESS || address.bit_address > 7 {
            return Err(GatewayError::config(format!(
                "S7 address {}.{} is out of range",
                address.byte_address, address.bit_address
            )));
        }
        let packed = (address.byte_address << 3) | u32::from(address.bit_address);

        buf.put_u8(VAR_SPEC);
        buf.put_u8(ITEM_LEN);
        buf.put_u8(SYNTAX_ID_S7ANY);
        buf.put_u8(address.transport_size.code());
        buf.put_u16(address.count);
        buf.put_u16(address.db_number);
        buf.put_u8(address.area.code());
        buf.put_slice(&packed.to_be_bytes()[1..]);
        Ok(())
    }

    /// Validate an acknowledgement and return the item payload
    ///
    /// The payload starts after the 4-byte data item header (return code,
    /// transport size, length); write acknowledgements carry none.
    pub fn parse(&self, response: &[u8]) -> Result<Vec<u8>> {
        let announced = tpkt::frame_length(response)
            .ok_or_else(|| GatewayError::protocol("invalid length of bytes"))?;
        if announced != response.len() {
            return Err(GatewayError::protocol(format!(
                "incomplete data, require {announced} but got {}",
                response.len()
            )));
        }

        let cotp_len = usize::from(response.get(tpkt::TPKT_HEADER_LEN).copied().unwrap_or(0));
        let s7 = response
            .get(tpkt::TPKT_HEADER_LEN + cotp_len + 1..)
            .filter(|s7| s7.len() >= ACK_HEADER_LEN)
            .ok_or_else(|| GatewayError::protocol("S7 header is truncated"))?;

        let param_len = usize::from(u16::from_be_bytes([s7[6], s7[7]]));
        let data_len = u16::from_be_bytes([s7[8], s7[9]]);
        let (error_class, error_code) = (s7[10], s7[11]);
        if error_class != 0 || error_code != 0 {
            return Err(GatewayError::protocol(format!(
                "error class 0x{error_class:02X}, error code 0x{error_code:02X}"
            )));
        }
        if data_len == 0 {
            return Err(GatewayError::protocol("data length is 0"));
        }

        let data = s7
            .get(ACK_HEADER_LEN + param_len..)
            .filter(|data| !data.is_empty())
            .ok_or_else(|| GatewayError::protocol("S7 data block is truncated"))?;

        let return_code = data[0];
        if return_code != RETURN_SUCCESS {
            return Err(GatewayError::protocol(format!(
                "{}({return_code:02X})",
                return_code_message(return_code)
            )));
        }

        if data_len >= 5 {
            let payload = data
                .get(4..)
                .ok_or_else(|| GatewayError::protocol("S7 data item is truncated"))?;
            debug!(length = payload.len(), "[S7] Item payload");
            return Ok(payload.to_vec());
        }
        Ok(Vec::new())
    }
}
