use bytes::{Buf, BufMut, BytesMut};
use thiserror::Error;

/// NBT tag type IDs.
pub const TAG_END: u8 = 0;
pub const TAG_BYTE: u8 = 1;
pub const TAG_SHORT: u8 = 2;
pub const TAG_INT: u8 = 3;
pub const TAG_LONG: u8 = 4;
pub const TAG_FLOAT: u8 = 5;
pub const TAG_DOUBLE: u8 = 6;
pub const TAG_BYTE_ARRAY: u8 = 7;
pub const TAG_STRING: u8 = 8;
pub const TAG_LIST: u8 = 9;
pub const TAG_COMPOUND: u8 = 10;
pub const TAG_INT_ARRAY: u8 = 11;
pub const TAG_LONG_ARRAY: u8 = 12;

/// Nesting limit for compounds and lists read off the wire.
pub const MAX_DEPTH: usize = 512;

#[derive(Debug, Error, PartialEq)]
pub enum NbtError {
    #[error("Not enough data")]
    NotEnoughData,
    #[error("Unknown tag type {0}")]
    UnknownTag(u8),
    #[error("Negative length {0}")]
    NegativeLength(i32),
    #[error("Nesting too deep")]
    TooDeep,
    #[error("Invalid UTF-8 in string")]
    InvalidUtf8,
    #[error("String of {0} bytes exceeds the 65535 byte limit")]
    StringTooLong(usize),
    #[error("Array or list of {0} elements is too long")]
    TooManyElements(usize),
}

pub type NbtResult<T> = Result<T, NbtError>;

/// An NBT value.
#[derive(Debug, Clone, PartialEq)]
pub enum NbtValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<i8>),
    String(String),
    List(Vec<NbtValue>),
    Compound(Vec<(String, NbtValue)>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl NbtValue {
    pub fn tag_id(&self) -> u8 {
        match self {
            NbtValue::Byte(_) => TAG_BYTE,
            NbtValue::Short(_) => TAG_SHORT,
            NbtValue::Int(_) => TAG_INT,
            NbtValue::Long(_) => TAG_LONG,
            NbtValue::Float(_) => TAG_FLOAT,
            NbtValue::Double(_) => TAG_DOUBLE,
            NbtValue::ByteArray(_) => TAG_BYTE_ARRAY,
            NbtValue::String(_) => TAG_STRING,
            NbtValue::List(_) => TAG_LIST,
            NbtValue::Compound(_) => TAG_COMPOUND,
            NbtValue::IntArray(_) => TAG_INT_ARRAY,
            NbtValue::LongArray(_) => TAG_LONG_ARRAY,
        }
    }

    /// An empty compound, the usual starting point for entity data.
    pub fn empty_compound() -> Self {
        NbtValue::Compound(Vec::new())
    }

    /// Look up a key in a compound. Returns None for non-compounds.
    pub fn get(&self, key: &str) -> Option<&NbtValue> {
        match self {
            NbtValue::Compound(entries) => entries
                .iter()
                .find(|(name, _)| name == key)
                .map(|(_, value)| value),
            _ => None,
        }
    }

    /// Insert or replace a key in a compound. No-op for non-compounds.
    pub fn set(&mut self, key: impl Into<String>, value: NbtValue) {
        if let NbtValue::Compound(entries) = self {
            let key = key.into();
            match entries.iter_mut().find(|(name, _)| *name == key) {
                Some(entry) => entry.1 = value,
                None => entries.push((key, value)),
            }
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            NbtValue::Byte(v) => Some(*v as i32),
            NbtValue::Short(v) => Some(*v as i32),
            NbtValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Write this value as a root tag with no name (network format).
    pub fn write_root_network(&self, buf: &mut BytesMut) -> NbtResult<()> {
        buf.put_u8(self.tag_id());
        self.write_payload(buf)
    }

    /// Write just the payload (no tag type or name).
    ///
    /// Fails on strings or arrays the format cannot express; `buf` may then
    /// hold a partial value.
    pub fn write_payload(&self, buf: &mut BytesMut) -> NbtResult<()> {
        match self {
            NbtValue::Byte(v) => buf.put_i8(*v),
            NbtValue::Short(v) => buf.put_i16(*v),
            NbtValue::Int(v) => buf.put_i32(*v),
            NbtValue::Long(v) => buf.put_i64(*v),
            NbtValue::Float(v) => buf.put_f32(*v),
            NbtValue::Double(v) => buf.put_f64(*v),
            NbtValue::ByteArray(v) => {
                buf.put_i32(array_len(v.len())?);
                for b in v {
                    buf.put_i8(*b);
                }
            }
            NbtValue::String(v) => write_nbt_string(v, buf)?,
            NbtValue::List(v) => {
                if v.is_empty() {
                    buf.put_u8(TAG_END);
                    buf.put_i32(0);
                } else {
                    buf.put_u8(v[0].tag_id());
                    buf.put_i32(array_len(v.len())?);
                    for item in v {
                        item.write_payload(buf)?;
                    }
                }
            }
            NbtValue::Compound(entries) => {
                for (name, value) in entries {
                    buf.put_u8(value.tag_id());
                    write_nbt_string(name, buf)?;
                    value.write_payload(buf)?;
                }
                buf.put_u8(TAG_END);
            }
            NbtValue::IntArray(v) => {
                buf.put_i32(array_len(v.len())?);
                for i in v {
                    buf.put_i32(*i);
                }
            }
            NbtValue::LongArray(v) => {
                buf.put_i32(array_len(v.len())?);
                for l in v {
                    buf.put_i64(*l);
                }
            }
        }
        Ok(())
    }

    /// Read a root tag written by [`NbtValue::write_root_network`].
    /// A bare `TAG_END` root means "no data" and yields `None`.
    pub fn read_root_network(buf: &mut BytesMut) -> NbtResult<Option<NbtValue>> {
        let tag = read_u8(buf)?;
        if tag == TAG_END {
            return Ok(None);
        }
        read_payload(tag, buf, 0).map(Some)
    }
}

fn write_nbt_string(s: &str, buf: &mut BytesMut) -> NbtResult<()> {
    let bytes = s.as_bytes();
    let len = u16::try_from(bytes.len()).map_err(|_| NbtError::StringTooLong(bytes.len()))?;
    buf.put_u16(len);
    buf.put_slice(bytes);
    Ok(())
}

fn array_len(len: usize) -> NbtResult<i32> {
    i32::try_from(len).map_err(|_| NbtError::TooManyElements(len))
}

fn need(buf: &BytesMut, n: usize) -> NbtResult<()> {
    if buf.remaining() < n {
        Err(NbtError::NotEnoughData)
    } else {
        Ok(())
    }
}

fn read_u8(buf: &mut BytesMut) -> NbtResult<u8> {
    need(buf, 1)?;
    Ok(buf.get_u8())
}

fn read_len(buf: &mut BytesMut) -> NbtResult<usize> {
    need(buf, 4)?;
    let len = buf.get_i32();
    if len < 0 {
        return Err(NbtError::NegativeLength(len));
    }
    Ok(len as usize)
}

fn read_nbt_string(buf: &mut BytesMut) -> NbtResult<String> {
    need(buf, 2)?;
    let len = buf.get_u16() as usize;
    need(buf, len)?;
    let bytes = buf.split_to(len);
    String::from_utf8(bytes.to_vec()).map_err(|_| NbtError::InvalidUtf8)
}

fn read_payload(tag: u8, buf: &mut BytesMut, depth: usize) -> NbtResult<NbtValue> {
    if depth > MAX_DEPTH {
        return Err(NbtError::TooDeep);
    }
    let value = match tag {
        TAG_BYTE => {
            need(buf, 1)?;
            NbtValue::Byte(buf.get_i8())
        }
        TAG_SHORT => {
            need(buf, 2)?;
            NbtValue::Short(buf.get_i16())
        }
        TAG_INT => {
            need(buf, 4)?;
            NbtValue::Int(buf.get_i32())
        }
        TAG_LONG => {
            need(buf, 8)?;
            NbtValue::Long(buf.get_i64())
        }
        TAG_FLOAT => {
            need(buf, 4)?;
            NbtValue::Float(buf.get_f32())
        }
        TAG_DOUBLE => {
            need(buf, 8)?;
            NbtValue::Double(buf.get_f64())
        }
        TAG_BYTE_ARRAY => {
            let len = read_len(buf)?;
            need(buf, len)?;
            NbtValue::ByteArray((0..len).map(|_| buf.get_i8()).collect())
        }
        TAG_STRING => NbtValue::String(read_nbt_string(buf)?),
        TAG_LIST => {
            let element = read_u8(buf)?;
            let len = read_len(buf)?;
            if element == TAG_END && len > 0 {
                return Err(NbtError::UnknownTag(TAG_END));
            }
            let mut items = Vec::with_capacity(len.min(buf.remaining()));
            for _ in 0..len {
                items.push(read_payload(element, buf, depth + 1)?);
            }
            NbtValue::List(items)
        }
        TAG_COMPOUND => {
            let mut entries = Vec::new();
            loop {
                let child = read_u8(buf)?;
                if child == TAG_END {
                    break;
                }
                let name = read_nbt_string(buf)?;
                entries.push((name, read_payload(child, buf, depth + 1)?));
            }
            NbtValue::Compound(entries)
        }
        TAG_INT_ARRAY => {
            let len = read_len(buf)?;
            need(buf, len.saturating_mul(4))?;
            NbtValue::IntArray((0..len).map(|_| buf.get_i32()).collect())
        }
        TAG_LONG_ARRAY => {
            let len = read_len(buf)?;
            need(buf, len.saturating_mul(8))?;
            NbtValue::LongArray((0..len).map(|_| buf.get_i64()).collect())
        }
        other => return Err(NbtError::UnknownTag(other)),
    };
    Ok(value)
}

/// Helper macro for building compound tags.
#[macro_export]
macro_rules! nbt_compound {
    ($($key:expr => $val:expr),* $(,)?) => {
        $crate::NbtValue::Compound(vec![
            $(($key.into(), $val)),*
        ])
    };
}

/// Helper macro for building list tags.
#[macro_export]
macro_rules! nbt_list {
    ($($val:expr),* $(,)?) => {
        $crate::NbtValue::List(vec![$($val),*])
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_simple_compound() {
        let nbt = NbtValue::Compound(vec![
            ("name".into(), NbtValue::String("test".into())),
            ("value".into(), NbtValue::Int(42)),
        ]);
        let mut buf = BytesMut::new();
        nbt.write_root_network(&mut buf).unwrap();
        assert_eq!(buf[0], TAG_COMPOUND);
    }

    #[test]
    fn test_long_array() {
        let nbt = NbtValue::LongArray(vec![1, 2, 3]);
        let mut buf = BytesMut::new();
        nbt.write_payload(&mut buf).unwrap();
        // 4 bytes length (3) + 3 * 8 bytes = 28 bytes
        assert_eq!(buf.len(), 28);
    }

    #[test]
    fn test_read_nested_compound() {
        let nbt = nbt_compound! {
            "packID" => NbtValue::String("mts".into()),
            "fuel" => NbtValue::Double(12.5),
            "parts" => nbt_list![
                nbt_compound! { "slot" => NbtValue::Byte(0) },
                nbt_compound! { "slot" => NbtValue::Byte(3) },
            ],
            "colors" => NbtValue::IntArray(vec![0xFF0000, 0x00FF00]),
        };
        let mut buf = BytesMut::new();
        nbt.write_root_network(&mut buf).unwrap();

        let read = NbtValue::read_root_network(&mut buf).unwrap();
        assert_eq!(read, Some(nbt));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_read_end_root_is_none() {
        let mut buf = BytesMut::from(&[TAG_END][..]);
        assert_eq!(NbtValue::read_root_network(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_read_truncated_compound() {
        let nbt = nbt_compound! { "name" => NbtValue::String("sedan".into()) };
        let mut buf = BytesMut::new();
        nbt.write_root_network(&mut buf).unwrap();
        let mut truncated = buf.split_to(buf.len() - 2);
        assert_eq!(
            NbtValue::read_root_network(&mut truncated),
            Err(NbtError::NotEnoughData)
        );
    }

    #[test]
    fn test_read_unknown_tag() {
        let mut buf = BytesMut::from(&[42u8][..]);
        assert_eq!(
            NbtValue::read_root_network(&mut buf),
            Err(NbtError::UnknownTag(42))
        );
    }

    #[test]
    fn test_string_length_limit() {
        let mut buf = BytesMut::new();
        NbtValue::String("x".repeat(u16::MAX as usize))
            .write_payload(&mut buf)
            .unwrap();
        assert_eq!(buf.len(), 2 + u16::MAX as usize);

        let nbt = nbt_compound! { "text" => NbtValue::String("x".repeat(70_000)) };
        let mut buf = BytesMut::new();
        assert_eq!(
            nbt.write_root_network(&mut buf),
            Err(NbtError::StringTooLong(70_000))
        );

        let long_key = NbtValue::Compound(vec![("k".repeat(65_536), NbtValue::Byte(1))]);
        assert_eq!(
            long_key.write_payload(&mut BytesMut::new()),
            Err(NbtError::StringTooLong(65_536))
        );
    }

    #[test]
    fn test_compound_get_and_set() {
        let mut nbt = NbtValue::empty_compound();
        nbt.set("health", NbtValue::Int(20));
        nbt.set("health", NbtValue::Int(15));
        assert_eq!(nbt.get("health").and_then(NbtValue::as_i32), Some(15));
        assert!(nbt.get("missing").is_none());
    }
}
