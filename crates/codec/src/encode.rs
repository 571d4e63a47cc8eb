use crate::CodecError;
use bmdb_core::{limits, Value};
use byteorder::{BigEndian, WriteBytesExt};

/// Encode a [`Value`] to its MessagePack byte representation.
///
/// Deterministic: structurally equal inputs with identical key insertion
/// order always produce byte-equal output.
pub fn encode(value: &Value) -> Result<Vec<u8>, CodecError> {
    let mut out = Vec::new();
    encode_into(value, &mut out)?;
    Ok(out)
}

fn encode_into(value: &Value, out: &mut Vec<u8>) -> Result<(), CodecError> {
    match value {
        Value::Null => out.push(0xc0),
        Value::Bool(false) => out.push(0xc2),
        Value::Bool(true) => out.push(0xc3),
        Value::Int(i) => encode_int(*i, out),
        Value::Float(f) => {
            out.push(0xcb);
            out.write_f64::<BigEndian>(*f).expect("vec write");
        }
        Value::String(s) => encode_str(s, out)?,
        Value::Array(items) => {
            if items.len() > limits::MAX_CONTAINER_LEN {
                return Err(CodecError::Unsupported(format!(
                    "array of {} entries exceeds max {}",
                    items.len(),
                    limits::MAX_CONTAINER_LEN
                )));
            }
            if items.len() <= 15 {
                out.push(0x90 | items.len() as u8);
            } else {
                out.push(0xdc);
                out.write_u16::<BigEndian>(items.len() as u16).unwrap();
            }
            for item in items {
                encode_into(item, out)?;
            }
        }
        Value::Map(map) => {
            if map.len() > limits::MAX_CONTAINER_LEN {
                return Err(CodecError::Unsupported(format!(
                    "map of {} entries exceeds max {}",
                    map.len(),
                    limits::MAX_CONTAINER_LEN
                )));
            }
            if map.len() <= 15 {
                out.push(0x80 | map.len() as u8);
            } else {
                out.push(0xde);
                out.write_u16::<BigEndian>(map.len() as u16).unwrap();
            }
            for (k, v) in map.iter() {
                encode_str(k, out)?;
                encode_into(v, out)?;
            }
        }
    }
    Ok(())
}

/// Encode an integer, using the smallest MessagePack width that holds it
/// exactly, falling back to float64 once it overflows int32/uint32 — this
/// is lossy beyond 2^53, an accepted, documented property of the format.
fn encode_int(i: i64, out: &mut Vec<u8>) {
    if i >= 0 {
        if i <= 0x7f {
            out.push(i as u8);
        } else if i <= u8::MAX as i64 {
            out.push(0xcc);
            out.push(i as u8);
        } else if i <= u16::MAX as i64 {
            out.push(0xcd);
            out.write_u16::<BigEndian>(i as u16).unwrap();
        } else if i <= u32::MAX as i64 {
            out.push(0xce);
            out.write_u32::<BigEndian>(i as u32).unwrap();
        } else {
            out.push(0xcb);
            out.write_f64::<BigEndian>(i as f64).unwrap();
        }
    } else if i >= -32 {
        out.push((i as i8) as u8);
    } else if i >= i8::MIN as i64 {
        out.push(0xd0);
        out.write_i8(i as i8).unwrap();
    } else if i >= i16::MIN as i64 {
        out.push(0xd1);
        out.write_i16::<BigEndian>(i as i16).unwrap();
    } else if i >= i32::MIN as i64 {
        out.push(0xd2);
        out.write_i32::<BigEndian>(i as i32).unwrap();
    } else {
        out.push(0xcb);
        out.write_f64::<BigEndian>(i as f64).unwrap();
    }
}

fn encode_str(s: &str, out: &mut Vec<u8>) -> Result<(), CodecError> {
    let bytes = s.as_bytes();
    if bytes.len() > limits::MAX_STR_LEN {
        return Err(CodecError::Unsupported(format!(
            "string of {} bytes exceeds max {}",
            bytes.len(),
            limits::MAX_STR_LEN
        )));
    }
    if bytes.len() <= 31 {
        out.push(0xa0 | bytes.len() as u8);
    } else if bytes.len() <= u8::MAX as usize {
        out.push(0xd9);
        out.push(bytes.len() as u8);
    } else {
        out.push(0xda);
        out.write_u16::<BigEndian>(bytes.len() as u16).unwrap();
    }
    out.extend_from_slice(bytes);
    Ok(())
}
