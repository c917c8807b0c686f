//! TPKT (RFC 1006) framing
//!
//! `[version=3, reserved=0, length_hi, length_lo]`, where length counts the
//! whole frame including these four bytes.

use bytes::{BufMut, BytesMut};

pub const TPKT_VERSION: u8 = 0x03;
pub const TPKT_HEADER_LEN: usize = 4;

/// Append a TPKT header announcing `total_len` bytes
pub fn put_header(buf: &mut BytesMut, total_len: u16) {
    buf.put_u8(TPKT_VERSION);
    buf.put_u8(0x00);
    buf.put_u16(total_len);
}

/// Rewrite the length field of a finished frame with its actual size
pub fn patch_length(frame: &mut [u8]) {
    if frame.len() < TPKT_HEADER_LEN {
        return;
    }
    let len = (frame.len() as u16).to_be_bytes();
    frame[2] = len[0];
    frame[3] = len[1];
}

/// Length announced by a TPKT header
pub fn frame_length(frame: &[u8]) -> Option<usize> {
    match frame {
        [_, _, hi, lo, ..] => Some(usize::from(u16::from_be_bytes([*hi, *lo]))),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_and_patch() {
        let mut buf = BytesMut::new();
        put_header(&mut buf, 0);
        buf.put_slice(&[0xAA; 6]);
        let mut frame = buf.to_vec();
        patch_length(&mut frame);
        assert_eq!(&frame[..4], &[0x03, 0x00, 0x00, 0x0A]);
        assert_eq!(frame_length(&frame), Some(10));
        assert_eq!(frame_length(&[0x03, 0x00]), None);
    }
}
