//! COTP (ISO 8073) connection request and data transfer headers

use bytes::{BufMut, BytesMut};

use super::tpkt;
use super::SiemensFamily;

pub const PDU_CONNECT_REQUEST: u8 = 0xE0;
pub const PDU_DATA: u8 = 0xF0;

pub const PARAM_TPDU_SIZE: u8 = 0xC0;
pub const PARAM_SRC_TSAP: u8 = 0xC1;
pub const PARAM_DST_TSAP: u8 = 0xC2;

/// Length byte, PDU type, EOT flag
pub const DATA_HEADER: [u8; 3] = [0x02, PDU_DATA, 0x80];

/// Length byte of a connection request; excludes itself
const CONNECT_REQUEST_LEN: u8 = 17;

type Parameter = (u8, [u8; 2], usize);

/// Connection parameters per family: code, data, data length
///
/// The final data byte of the last parameter is overwritten with the
/// rack/slot selector when the request is built.
fn parameters(family: SiemensFamily) -> [Parameter; 3] {
    match family {
        SiemensFamily::S1200 => [
            (PARAM_TPDU_SIZE, [0x0A, 0x00], 1),
            (PARAM_SRC_TSAP, [0x01, 0x01], 2),
            (PARAM_DST_TSAP, [0x01, 0x00], 2),
        ],
        SiemensFamily::S1500 | SiemensFamily::S300 => [
            (PARAM_TPDU_SIZE, [0x0A, 0x00], 1),
            (PARAM_SRC_TSAP, [0x01, 0x02], 2),
            (PARAM_DST_TSAP, [0x01, 0x00], 2),
        ],
        SiemensFamily::S400 => [
            (PARAM_TPDU_SIZE, [0x0A, 0x00], 1),
            (PARAM_SRC_TSAP, [0x01, 0x00], 2),
            (PARAM_DST_TSAP, [0x01, 0x00], 2),
        ],
        SiemensFamily::S200 => [
            (PARAM_SRC_TSAP, [b'M', b'W'], 2),
            (PARAM_DST_TSAP, [b'M', b'W'], 2),
            (PARAM_TPDU_SIZE, [0x00, 0x00], 1),
        ],
        SiemensFamily::S200Smart => [
            (PARAM_SRC_TSAP, [0x10, 0x00], 2),
            (PARAM_DST_TSAP, [0x03, 0x00], 2),
            (PARAM_TPDU_SIZE, [0x00, 0x00], 1),
        ],
    }
}

/// TPKT + COTP connection request for a PLC family at `rack`/`slot`
pub fn connection_request(family: SiemensFamily, rack: u8, slot: u8) -> Vec<u8> {
    let mut params = parameters(family);
    if let Some((_, data, len)) = params.last_mut() {
        data[*len - 1] = rack.wrapping_mul(0x20).wrapping_add(slot);
    }

    let total = tpkt::TPKT_HEADER_LEN + 1 + usize::from(CONNECT_REQUEST_LEN);
    let mut buf = BytesMut::with_capacity(total);
    tpkt::put_header(&mut buf, total as u16);
    buf.put_u8(CONNECT_REQUEST_LEN);
    buf.put_u8(PDU_CONNECT_REQUEST);
    // Destination reference, source reference, class
    buf.put_slice(&[0x00, 0x00, 0x00, 0x01, 0x00]);
    for (code, data, len) in params {
        buf.put_u8(code);
        buf.put_u8(len as u8);
        buf.put_slice(&data[..len]);
    }
    buf.to_vec()
}
