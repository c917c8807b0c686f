//! Value codec
//!
//! Converts between raw register bytes and engineering values. The wire width
//! comes from the data type; the byte order comes from the device, picked per
//! value width (`LongOrder` for 32-bit integers, `FloatOrder` for floats, ...).
//!
//! Reordering is done in two steps: BADC and CDAB exchange the bytes of every
//! 16-bit unit, then ABCD and BADC read big-endian while CDAB and DCBA read
//! little-endian.

use crate::core::config::types::{ByteOrder, DataType, DeviceConfig, VariableConfig};
use crate::error::{GatewayError, Result};

/// Number of raw bytes the codec expects for `data_type`
pub fn wire_width(data_type: DataType) -> Result<usize> {
    match data_type {
        DataType::Bool | DataType::Bit | DataType::Byte => Ok(2),
        DataType::Uint16 | DataType::Int16 => Ok(2),
        DataType::Uint32 | DataType::Int32 | DataType::Float => Ok(4),
        DataType::Uint64 | DataType::Int64 | DataType::Double => Ok(8),
        DataType::String => Err(GatewayError::data("string variables are not supported")),
    }
}

/// Byte order applying to `data_type` on this device
fn order_for(device: &DeviceConfig, data_type: DataType) -> ByteOrder {
    match data_type {
        DataType::Uint32 | DataType::Int32 => device.long_order,
        DataType::Uint64 | DataType::Int64 => device.long_long_order,
        DataType::Float => device.float_order,
        DataType::Double => device.double_order,
        _ => ByteOrder::Abcd,
    }
}

/// Exchange the two bytes of every 16-bit unit; odd lengths are left alone
fn swap_pairs(buf: &mut [u8]) {
    if buf.len() % 2 != 0 {
        return;
    }
    for pair in buf.chunks_exact_mut(2) {
        pair.swap(0, 1);
    }
}

/// Round to `decimal` fractional digits through fixed-point formatting
fn round_decimal(value: f64, decimal: usize) -> f64 {
    format!("{:.*}", decimal, value)
        .parse::<f64>()
        .unwrap_or(value)
}

fn read_u32(buf: &[u8], big_endian: bool) -> u32 {
    let mut word = [0u8; 4];
    word.copy_from_slice(&buf[..4]);
    if big_endian {
        u32::from_be_bytes(word)
    } else {
        u32::from_le_bytes(word)
    }
}

fn read_u64(buf: &[u8], big_endian: bool) -> u64 {
    let mut word = [0u8; 8];
    word.copy_from_slice(&buf[..8]);
    if big_endian {
        u64::from_be_bytes(word)
    } else {
        u64::from_le_bytes(word)
    }
}

/// First register of a response as a big-endian word
///
/// Used by the bit write paths to patch a single bit into the current value.
pub fn raw_word(raw: &[u8]) -> u16 {
    match raw {
        [hi, lo, ..] => u16::from_be_bytes([*hi, *lo]),
        [lo] => u16::from(*lo),
        [] => 0,
    }
}

/// Decode raw register bytes into an engineering value
pub fn decode(device: &DeviceConfig, variable: &VariableConfig, raw: &[u8]) -> Result<f64> {
    let data_type = variable.data_type;
    let expected = wire_width(data_type)?;
    if raw.len() != expected {
        return Err(GatewayError::length_mismatch(
            &variable.name,
            expected,
            raw.len(),
        ));
    }

    let order = order_for(device, data_type);
    let mut buf = raw.to_vec();
    if order.swaps_pairs() {
        swap_pairs(&mut buf);
    }
    let big_endian = order.is_big_endian();

    let value = match data_type {
        DataType::Bool => return Ok(if buf[1] != 0 { 1.0 } else { 0.0 }),
        DataType::Bit => {
            // Siemens areas deliver one byte per boolean
            if variable.param.reg_type.is_siemens() {
                return Ok(if buf[1] != 0 { 1.0 } else { 0.0 });
            }
            let word = u16::from_be_bytes([buf[0], buf[1]]);
            let shift = u32::from(variable.param.bit_addr);
            let bit = word.checked_shr(shift).unwrap_or(0) & 0x01;
            return Ok(f64::from(bit));
        },
        DataType::Byte => f64::from(buf[1]),
        DataType::Uint16 => f64::from(u16::from_be_bytes([buf[0], buf[1]])),
        DataType::Int16 => f64::from(i16::from_be_bytes([buf[0], buf[1]])),
        DataType::Uint32 => f64::from(read_u32(&buf, big_endian)),
        DataType::Int32 => f64::from(read_u32(&buf, big_endian) as i32),
        DataType::Uint64 => read_u64(&buf, big_endian) as f64,
        DataType::Int64 => read_u64(&buf, big_endian) as i64 as f64,
        DataType::Float => f64::from(f32::from_bits(read_u32(&buf, big_endian))),
        DataType::Double => f64::from_bits(read_u64(&buf, big_endian)),
        DataType::String => return Err(GatewayError::data("string variables are not supported")),
    };

    let scaled = if variable.modulus != 1.0 || variable.offset != 0.0 {
        value * variable.modulus + variable.offset
    } else {
        value
    };

    Ok(round_decimal(scaled, variable.decimal))
}

/// Rounded integer bit pattern; negative values wrap through the signed type
fn integer_bits(value: f64) -> u64 {
    let rounded = value.round();
    if rounded < 0.0 {
        rounded as i64 as u64
    } else {
        rounded as u64
    }
}

/// Encode an engineering value into raw register bytes
///
/// `Bit`, `Byte` and `Bool` take the value as given; every other type is
/// unscaled first (`(value - offset) / modulus`).
pub fn encode(device: &DeviceConfig, variable: &VariableConfig, value: f64) -> Result<Vec<u8>> {
    let data_type = variable.data_type;
    let mut raw = value;
    if variable.offset != 0.0 {
        raw -= variable.offset;
    }
    if variable.modulus != 1.0 {
        if variable.modulus == 0.0 {
            return Err(GatewayError::data(format!(
                "{}: modulus 0 cannot be inverted",
                variable.name
            )));
        }
        raw /= variable.modulus;
    }

    let order = order_for(device, data_type);
    let big_endian = order.is_big_endian();

    let mut buf = match data_type {
        DataType::Bit => return Ok((integer_bits(value) as u16).to_be_bytes().to_vec()),
        DataType::Byte => return Ok(vec![integer_bits(value) as u8]),
        DataType::Bool => return Ok(vec![0x00, u8::from(value != 0.0)]),
        DataType::Uint16 | DataType::Int16 => (integer_bits(raw) as u16).to_be_bytes().to_vec(),
        DataType::Uint32 | DataType::Int32 => {
            let bits = integer_bits(raw) as u32;
            if big_endian {
                bits.to_be_bytes().to_vec()
            } else {
                bits.to_le_bytes().to_vec()
            }
        },
        DataType::Uint64 | DataType::Int64 => {
            let bits = integer_bits(raw);
            if big_endian {
                bits.to_be_bytes().to_vec()
            } else {
                bits.to_le_bytes().to_vec()
            }
        },
        DataType::Float => {
            let bits = (raw as f32).to_bits();
            if big_endian {
                bits.to_be_bytes().to_vec()
            } else {
                bits.to_le_bytes().to_vec()
            }
        },
        DataType::Double => {
            let bits = raw.to_bits();
            if big_endian {
                bits.to_be_bytes().to_vec()
            } else {
                bits.to_le_bytes().to_vec()
            }
        },
        DataType::String => return Err(GatewayError::data("string variables are not supported")),
    };

    if order.swaps_pairs() {
        swap_pairs(&mut buf);
    }
    Ok(buf)
}

#[cfg(test)]
#[allow(clippy::disallowed_methods)] // Test code - unwrap is acceptable
mod tests {
    use super::*;
    use crate::core::config::types::{RegType, VariableParam};

    const ORDERS: [ByteOrder; 4] = [
        ByteOrder::Abcd,
        ByteOrder::Cdab,
        ByteOrder::Badc,
        ByteOrder::Dcba,
    ];

    fn device(order: ByteOrder) -> DeviceConfig {
        DeviceConfig {
            dev_name: "dev".to_string(),
            opc_path: String::new(),
            dev_addr: 1,
            float_order: order,
            long_order: order,
            long_long_order: order,
            double_order: order,
        }
    }

    fn variable(data_type: DataType, decimal: usize) -> VariableConfig {
        VariableConfig {
            id: 1,
            name: "var".to_string(),
            another_name: String::new(),
            data_type,
            decimal,
            unit: String::new(),
            modulus: 1.0,
            offset: 0.0,
            param: VariableParam::default(),
        }
    }

    #[test]
    fn test_round_trip_all_orders() {
        let cases: &[(DataType, f64, usize)] = &[
            (DataType::Uint16, 65535.0, 0),
            (DataType::Int16, -1234.0, 0),
            (DataType::Uint32, 4_000_000_000.0, 0),
            (DataType::Int32, -2_000_000_000.0, 0),
            (DataType::Uint64, 9_007_199_254_740_000.0, 0),
            (DataType::Int64, -9_007_199_254_740_000.0, 0),
            (DataType::Float, -12.5, 2),
            (DataType::Double, 123_456.789, 3),
        ];

        for order in ORDERS {
            let dev = device(order);
            for &(data_type, value, decimal) in cases {
                let var = variable(data_type, decimal);
                let raw = encode(&dev, &var, value).unwrap();
                assert_eq!(raw.len(), wire_width(data_type).unwrap());
                let back = decode(&dev, &var, &raw).unwrap();
                assert!(
                    (back - value).abs() < 1e-6,
                    "{data_type:?} {order:?}: {value} -> {raw:?} -> {back}"
                );
            }
        }
    }

    #[test]
    fn test_scaled_round_trip() {
        let dev = device(ByteOrder::Abcd);
        let mut var = variable(DataType::Int16, 1);
        var.modulus = 0.1;
        var.offset = -40.0;

        let raw = encode(&dev, &var, 25.3).unwrap();
        assert_eq!(raw, 653i16.to_be_bytes().to_vec());
        assert_eq!(decode(&dev, &var, &raw).unwrap(), 25.3);
    }

    #[test]
    fn test_decimal_rounding() {
        let dev = device(ByteOrder::Abcd);
        let mut var = variable(DataType::Uint16, 2);
        var.modulus = 0.001;
        assert_eq!(decode(&dev, &var, &[0x04, 0xD4]).unwrap(), 1.24);
    }

    #[test]
    fn test_bit_extraction() {
        let dev = device(ByteOrder::Abcd);
        for bit in 0..16u8 {
            let mut var = variable(DataType::Bit, 0);
            var.param.bit_addr = bit;
            let expected = if bit == 1 { 1.0 } else { 0.0 };
            assert_eq!(decode(&dev, &var, &[0x00, 0x02]).unwrap(), expected);
        }
    }

    #[test]
    fn test_siemens_bit_is_whole_byte() {
        let dev = device(ByteOrder::Abcd);
        let mut var = variable(DataType::Bit, 0);
        var.param.reg_type = RegType::SiemensDb;
        var.param.bit_addr = 3;
        assert_eq!(decode(&dev, &var, &[0x00, 0x01]).unwrap(), 1.0);
        assert_eq!(decode(&dev, &var, &[0x00, 0x00]).unwrap(), 0.0);
    }

    #[test]
    fn test_bool_and_byte() {
        let dev = device(ByteOrder::Abcd);
        let var = variable(DataType::Bool, 0);
        assert_eq!(decode(&dev, &var, &[0x00, 0x05]).unwrap(), 1.0);
        assert_eq!(encode(&dev, &var, 3.0).unwrap(), vec![0x00, 0x01]);
        assert_eq!(encode(&dev, &var, 0.0).unwrap(), vec![0x00, 0x00]);

        let var = variable(DataType::Byte, 0);
        assert_eq!(decode(&dev, &var, &[0x00, 0x7F]).unwrap(), 127.0);
        assert_eq!(encode(&dev, &var, 200.0).unwrap(), vec![200]);
    }

    #[test]
    fn test_word_order_layouts() {
        let var = variable(DataType::Uint32, 0);
        let value = f64::from(0x0102_0304u32);
        assert_eq!(
            encode(&device(ByteOrder::Abcd), &var, value).unwrap(),
            vec![1, 2, 3, 4]
        );
        assert_eq!(
            encode(&device(ByteOrder::Badc), &var, value).unwrap(),
            vec![2, 1, 4, 3]
        );
        assert_eq!(
            encode(&device(ByteOrder::Cdab), &var, value).unwrap(),
            vec![3, 4, 1, 2]
        );
        assert_eq!(
            encode(&device(ByteOrder::Dcba), &var, value).unwrap(),
            vec![4, 3, 2, 1]
        );
    }

    #[test]
    fn test_length_mismatch() {
        let dev = device(ByteOrder::Abcd);
        let var = variable(DataType::Float, 0);
        let err = decode(&dev, &var, &[0x00, 0x01]).unwrap_err();
        assert!(matches!(
            err,
            GatewayError::CodecLengthMismatch {
                expected: 4,
                got: 2,
                ..
            }
        ));
    }

    #[test]
    fn test_string_unsupported() {
        let dev = device(ByteOrder::Abcd);
        let var = variable(DataType::String, 0);
        assert!(matches!(
            decode(&dev, &var, &[0, 0]),
            Err(GatewayError::DataError(_))
        ));
        assert!(matches!(
            encode(&dev, &var, 1.0),
            Err(GatewayError::DataError(_))
        ));
    }

    #[test]
    fn test_raw_word() {
        assert_eq!(raw_word(&[0x12, 0x34, 0x56]), 0x1234);
        assert_eq!(raw_word(&[0x34]), 0x34);
        assert_eq!(raw_word(&[]), 0);
    }
}
