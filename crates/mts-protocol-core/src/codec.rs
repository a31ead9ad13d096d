use bytes::{Buf, BufMut, BytesMut};
use mts_nbt::{NbtError, NbtValue, TAG_END};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("VarInt too big")]
    VarIntTooBig,
    #[error("Not enough data")]
    NotEnoughData,
    #[error("String too long: {0} > {1}")]
    StringTooLong(usize, usize),
    #[error("Negative length: {0}")]
    NegativeLength(i32),
    #[error("Invalid value: {0}")]
    InvalidValue(String),
    #[error("NBT error: {0}")]
    Nbt(#[from] NbtError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;

/// Read a VarInt from the buffer.
pub fn read_varint(buf: &mut BytesMut) -> CodecResult<i32> {
    let mut result: i32 = 0;
    let mut shift: u32 = 0;
    loop {
        if !buf.has_remaining() {
            return Err(CodecError::NotEnoughData);
        }
        let byte = buf.get_u8();
        result |= ((byte & 0x7F) as i32) << shift;
        if byte & 0x80 == 0 {
            return Ok(result);
        }
        shift += 7;
        if shift >= 32 {
            return Err(CodecError::VarIntTooBig);
        }
    }
}

/// Write a VarInt to the buffer.
pub fn write_varint(buf: &mut BytesMut, mut value: i32) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value = ((value as u32) >> 7) as i32;
        if value != 0 {
            byte |= 0x80;
        }
        buf.put_u8(byte);
        if value == 0 {
            break;
        }
    }
}

/// Calculate the byte length of a VarInt.
pub fn varint_len(value: i32) -> usize {
    let mut val = value as u32;
    let mut len = 0;
    loop {
        len += 1;
        val >>= 7;
        if val == 0 {
            break;
        }
    }
    len
}

/// Read a length prefix, rejecting negative values.
fn read_len(buf: &mut BytesMut) -> CodecResult<usize> {
    let len = read_varint(buf)?;
    if len < 0 {
        return Err(CodecError::NegativeLength(len));
    }
    Ok(len as usize)
}

pub fn read_u8(buf: &mut BytesMut) -> CodecResult<u8> {
    if !buf.has_remaining() {
        return Err(CodecError::NotEnoughData);
    }
    Ok(buf.get_u8())
}

pub fn read_bool(buf: &mut BytesMut) -> CodecResult<bool> {
    match read_u8(buf)? {
        0 => Ok(false),
        1 => Ok(true),
        other => Err(CodecError::InvalidValue(format!("bool byte {}", other))),
    }
}

pub fn write_bool(buf: &mut BytesMut, value: bool) {
    buf.put_u8(value as u8);
}

pub fn read_i32(buf: &mut BytesMut) -> CodecResult<i32> {
    if buf.remaining() < 4 {
        return Err(CodecError::NotEnoughData);
    }
    Ok(buf.get_i32())
}

pub fn read_f64(buf: &mut BytesMut) -> CodecResult<f64> {
    if buf.remaining() < 8 {
        return Err(CodecError::NotEnoughData);
    }
    Ok(buf.get_f64())
}

/// Read a protocol string (varint-prefixed UTF-8).
pub fn read_string(buf: &mut BytesMut, max_len: usize) -> CodecResult<String> {
    let len = read_len(buf)?;
    if len > max_len * 4 {
        return Err(CodecError::StringTooLong(len, max_len));
    }
    if buf.remaining() < len {
        return Err(CodecError::NotEnoughData);
    }
    let bytes = buf.split_to(len);
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Write a protocol string.
pub fn write_string(buf: &mut BytesMut, s: &str) {
    write_varint(buf, s.len() as i32);
    buf.put_slice(s.as_bytes());
}

/// Read a UUID (128 bits, big endian).
pub fn read_uuid(buf: &mut BytesMut) -> CodecResult<Uuid> {
    if buf.remaining() < 16 {
        return Err(CodecError::NotEnoughData);
    }
    let mut bytes = [0u8; 16];
    buf.copy_to_slice(&mut bytes);
    Ok(Uuid::from_bytes(bytes))
}

/// Write a UUID.
pub fn write_uuid(buf: &mut BytesMut, uuid: &Uuid) {
    buf.put_slice(uuid.as_bytes());
}

/// Write an optional NBT data container. `None` is a bare `TAG_END`.
pub fn write_nbt(buf: &mut BytesMut, data: Option<&NbtValue>) -> CodecResult<()> {
    match data {
        Some(value) => value.write_root_network(buf)?,
        None => buf.put_u8(TAG_END),
    }
    Ok(())
}

/// Read an NBT data container written by [`write_nbt`].
pub fn read_nbt(buf: &mut BytesMut) -> CodecResult<Option<NbtValue>> {
    Ok(NbtValue::read_root_network(buf)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use mts_nbt::nbt_compound;

    #[test]
    fn test_varint_roundtrip() {
        let test_cases = vec![
            (0, vec![0x00]),
            (1, vec![0x01]),
            (127, vec![0x7F]),
            (128, vec![0x80, 0x01]),
            (255, vec![0xFF, 0x01]),
            (25565, vec![0xDD, 0xC7, 0x01]),
            (2097151, vec![0xFF, 0xFF, 0x7F]),
            (-1, vec![0xFF, 0xFF, 0xFF, 0xFF, 0x0F]),
        ];

        for (value, expected_bytes) in test_cases {
            let mut buf = BytesMut::new();
            write_varint(&mut buf, value);
            assert_eq!(
                buf.to_vec(),
                expected_bytes,
                "write_varint({}) failed",
                value
            );

            let mut buf = BytesMut::from(&expected_bytes[..]);
            let result = read_varint(&mut buf).unwrap();
            assert_eq!(result, value, "read_varint for {} failed", value);
        }
    }

    #[test]
    fn test_varint_len() {
        assert_eq!(varint_len(0), 1);
        assert_eq!(varint_len(127), 1);
        assert_eq!(varint_len(128), 2);
        assert_eq!(varint_len(25565), 3);
        assert_eq!(varint_len(-1), 5);
    }

    #[test]
    fn test_string_roundtrip() {
        let test_str = "Immersive Vehicles";
        let mut buf = BytesMut::new();
        write_string(&mut buf, test_str);
        let result = read_string(&mut buf, 32767).unwrap();
        assert_eq!(result, test_str);
    }

    #[test]
    fn test_string_truncated() {
        let mut buf = BytesMut::new();
        write_string(&mut buf, "truncated");
        let mut short = buf.split_to(4);
        assert!(matches!(
            read_string(&mut short, 32767),
            Err(CodecError::NotEnoughData)
        ));
    }

    #[test]
    fn test_negative_length_rejected() {
        let mut buf = BytesMut::new();
        write_varint(&mut buf, -5);
        assert!(matches!(
            read_string(&mut buf, 16),
            Err(CodecError::NegativeLength(-5))
        ));
    }

    #[test]
    fn test_bool_rejects_garbage() {
        let mut buf = BytesMut::from(&[2u8][..]);
        assert!(matches!(read_bool(&mut buf), Err(CodecError::InvalidValue(_))));
    }

    #[test]
    fn test_nbt_optional() {
        let data = nbt_compound! { "fuel" => mts_nbt::NbtValue::Int(100) };
        let mut buf = BytesMut::new();
        write_nbt(&mut buf, Some(&data)).unwrap();
        write_nbt(&mut buf, None).unwrap();
        assert_eq!(read_nbt(&mut buf).unwrap(), Some(data));
        assert_eq!(read_nbt(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_nbt_oversize_string_fails_to_write() {
        let data = nbt_compound! {
            "text" => mts_nbt::NbtValue::String("x".repeat(65_536)),
        };
        let mut buf = BytesMut::new();
        assert!(matches!(
            write_nbt(&mut buf, Some(&data)),
            Err(CodecError::Nbt(NbtError::StringTooLong(65_536)))
        ));
    }
}
