use crate::CodecError;
use bmdb_core::{OrderedMap, Value};
use byteorder::{BigEndian, ByteOrder};

/// Decode a single [`Value`] from the start of `bytes`, ignoring any
/// trailing bytes after it.
pub fn decode(bytes: &[u8]) -> Result<Value, CodecError> {
    let (value, _consumed) = decode_prefix(bytes)?;
    Ok(value)
}

/// Decode a single [`Value`] from the start of `bytes`, returning it along
/// with the number of bytes consumed. Used by callers (the B-tree/file-store
/// layer) that need to know exactly where a record ends within a larger
/// buffer.
pub fn decode_prefix(bytes: &[u8]) -> Result<(Value, usize), CodecError> {
    let mut cur = Cursor { bytes, pos: 0 };
    let value = decode_value(&mut cur)?;
    Ok((value, cur.pos))
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn take(&mut self, n: usize) -> Result<&'a [u8], CodecError> {
        let end = self.pos + n;
        if end > self.bytes.len() {
            return Err(CodecError::UnexpectedEof);
        }
        let slice = &self.bytes[self.pos..end];
        self.pos = end;
        Ok(slice)
    }

    fn take_u8(&mut self) -> Result<u8, CodecError> {
        Ok(self.take(1)?[0])
    }

    fn take_u16(&mut self) -> Result<u16, CodecError> {
        Ok(BigEndian::read_u16(self.take(2)?))
    }

    fn take_u32(&mut self) -> Result<u32, CodecError> {
        Ok(BigEndian::read_u32(self.take(4)?))
    }
}

fn decode_value(cur: &mut Cursor<'_>) -> Result<Value, CodecError> {
    let tag = cur.take_u8()?;
    match tag {
        // positive fixint
        0x00..=0x7f => Ok(Value::Int(tag as i64)),
        // fixmap
        0x80..=0x8f => decode_map(cur, (tag & 0x0f) as usize),
        // fixarray
        0x90..=0x9f => decode_array(cur, (tag & 0x0f) as usize),
        // fixstr
        0xa0..=0xbf => decode_str(cur, (tag & 0x1f) as usize),
        0xc0 => Ok(Value::Null),
        0xc2 => Ok(Value::Bool(false)),
        0xc3 => Ok(Value::Bool(true)),
        0xcb => {
            let raw = cur.take(8)?;
            Ok(Value::Float(BigEndian::read_f64(raw)))
        }
        0xcc => Ok(Value::Int(cur.take_u8()? as i64)),
        0xcd => Ok(Value::Int(cur.take_u16()? as i64)),
        0xce => Ok(Value::Int(cur.take_u32()? as i64)),
        0xd0 => Ok(Value::Int(cur.take_u8()? as i8 as i64)),
        0xd1 => Ok(Value::Int(cur.take_u16()? as i16 as i64)),
        0xd2 => Ok(Value::Int(cur.take_u32()? as i32 as i64)),
        0xd9 => {
            let len = cur.take_u8()? as usize;
            decode_str(cur, len)
        }
        0xda => {
            let len = cur.take_u16()? as usize;
            decode_str(cur, len)
        }
        0xdc => {
            let len = cur.take_u16()? as usize;
            decode_array(cur, len)
        }
        0xde => {
            let len = cur.take_u16()? as usize;
            decode_map(cur, len)
        }
        // negative fixint
        0xe0..=0xff => Ok(Value::Int(tag as i8 as i64)),
        other => Err(CodecError::UnknownType(other)),
    }
}

fn decode_str(cur: &mut Cursor<'_>, len: usize) -> Result<Value, CodecError> {
    let raw = cur.take(len)?;
    let s = std::str::from_utf8(raw)
        .map_err(|_| CodecError::Unsupported("invalid UTF-8 in string".into()))?;
    Ok(Value::String(s.to_string()))
}

fn decode_array(cur: &mut Cursor<'_>, len: usize) -> Result<Value, CodecError> {
    let mut items = Vec::with_capacity(len.min(4096));
    for _ in 0..len {
        items.push(decode_value(cur)?);
    }
    Ok(Value::Array(items))
}

fn decode_map(cur: &mut Cursor<'_>, len: usize) -> Result<Value, CodecError> {
    let mut map = OrderedMap::new();
    for _ in 0..len {
        let key = match decode_value(cur)? {
            Value::String(s) => s,
            other => {
                return Err(CodecError::Unsupported(format!(
                    "map key must be a string, got {other:?}"
                )))
            }
        };
        let value = decode_value(cur)?;
        map.insert(key, value);
    }
    Ok(Value::Map(map))
}
