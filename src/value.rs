//! Text conversion of node values
//!
//! [`format_value`] renders the bytes behind a node the way an editor shows
//! them; [`parse_value`] turns user input back into exactly the bytes the
//! node occupies, little-endian.

use byteorder::{ByteOrder, LittleEndian};

use crate::error::{Error, Result};
use crate::tree::{Node, NodeKind};

/// Copy `bytes` into a zero-padded buffer of at least `len` bytes
fn padded(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut buf = bytes.to_vec();
    if buf.len() < len {
        buf.resize(len, 0);
    }
    buf
}

fn hex_bytes(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ")
}

fn float_list(bytes: &[u8], count: usize) -> String {
    let buf = padded(bytes, count * 4);
    (0..count)
        .map(|i| LittleEndian::read_f32(&buf[i * 4..]).to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Display text for the bytes of a value of `kind`.
///
/// Short input is treated as zero-padded. Containers have no value text.
pub fn format_value(kind: NodeKind, bytes: &[u8]) -> String {
    let buf = padded(bytes, kind.size() as usize);
    match kind {
        NodeKind::Hex8 | NodeKind::Hex16 | NodeKind::Hex32 | NodeKind::Hex64 => {
            hex_bytes(&buf[..kind.size() as usize])
        }
        NodeKind::Padding => hex_bytes(bytes),
        NodeKind::Int8 => (buf[0] as i8).to_string(),
        NodeKind::Int16 => LittleEndian::read_i16(&buf).to_string(),
        NodeKind::Int32 => LittleEndian::read_i32(&buf).to_string(),
        NodeKind::Int64 => LittleEndian::read_i64(&buf).to_string(),
        NodeKind::UInt8 => format!("0x{:02X}", buf[0]),
        NodeKind::UInt16 => LittleEndian::read_u16(&buf).to_string(),
        NodeKind::UInt32 => LittleEndian::read_u32(&buf).to_string(),
        NodeKind::UInt64 => LittleEndian::read_u64(&buf).to_string(),
        NodeKind::Float => LittleEndian::read_f32(&buf).to_string(),
        NodeKind::Double => LittleEndian::read_f64(&buf).to_string(),
        NodeKind::Bool => (buf[0] != 0).to_string(),
        NodeKind::Pointer32 => format!("0x{:08X}", LittleEndian::read_u32(&buf)),
        NodeKind::Pointer64 => format!("0x{:016X}", LittleEndian::read_u64(&buf)),
        NodeKind::UTF8 => {
            let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
            String::from_utf8_lossy(&bytes[..end]).to_string()
        }
        NodeKind::UTF16 => {
            let units: Vec<u16> = bytes
                .chunks_exact(2)
                .map(LittleEndian::read_u16)
                .take_while(|&u| u != 0)
                .collect();
            String::from_utf16_lossy(&units)
        }
        NodeKind::Vec2 | NodeKind::Vec3 | NodeKind::Vec4 | NodeKind::Mat4x4 => {
            float_list(bytes, kind.float_components().unwrap_or(0))
        }
        NodeKind::Struct | NodeKind::Array => String::new(),
    }
}

fn invalid(text: &str, what: impl std::fmt::Display) -> Error {
    Error::InvalidValue(format!("'{}' is not a valid {}", text, what))
}

fn parse_unsigned(text: &str) -> Option<u128> {
    let t = text.trim().replace('_', "");
    match t.strip_prefix("0x").or_else(|| t.strip_prefix("0X")) {
        Some(hex) => u128::from_str_radix(hex, 16).ok(),
        None => t.parse().ok(),
    }
}

fn parse_signed(text: &str) -> Option<i128> {
    let t = text.trim();
    match t.strip_prefix('-') {
        Some(rest) => parse_unsigned(rest).and_then(|v| i128::try_from(v).ok()).map(|v| -v),
        None => parse_unsigned(t).and_then(|v| i128::try_from(v).ok()),
    }
}

fn parse_float(text: &str) -> Option<f64> {
    let t = text.trim();
    let t = t.strip_suffix(['f', 'F']).unwrap_or(t);
    t.parse().ok()
}

/// Space separated hex bytes, or one compact run of hex digits
fn parse_hex_bytes(text: &str, len: usize) -> Option<Vec<u8>> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let bytes: Option<Vec<u8>> = if tokens.len() == 1 && tokens[0].len() == len * 2 && len > 1 {
        let t = tokens[0];
        (0..len)
            .map(|i| t.get(i * 2..i * 2 + 2).and_then(|b| u8::from_str_radix(b, 16).ok()))
            .collect()
    } else {
        tokens
            .iter()
            .map(|t| {
                let t = t.strip_prefix("0x").unwrap_or(t);
                if t.len() <= 2 {
                    u8::from_str_radix(t, 16).ok()
                } else {
                    None
                }
            })
            .collect()
    };
    bytes.filter(|b| b.len() == len)
}

fn unsigned_bytes(text: &str, kind: NodeKind) -> Result<Vec<u8>> {
    let size = kind.size() as usize;
    let max = if size >= 16 { u128::MAX } else { (1u128 << (size * 8)) - 1 };
    let value = parse_unsigned(text)
        .filter(|&v| v <= max)
        .ok_or_else(|| invalid(text, kind))?;
    let mut buf = vec![0u8; size];
    LittleEndian::write_uint128(&mut buf, value, size);
    Ok(buf)
}

fn signed_bytes(text: &str, kind: NodeKind) -> Result<Vec<u8>> {
    let size = kind.size() as usize;
    let bits = size * 8;
    let min = -(1i128 << (bits - 1));
    let max = (1i128 << (bits - 1)) - 1;
    let value = parse_signed(text)
        .filter(|&v| v >= min && v <= max)
        .ok_or_else(|| invalid(text, kind))?;
    let mut buf = vec![0u8; size];
    LittleEndian::write_int128(&mut buf, value, size);
    Ok(buf)
}

fn floats(text: &str, count: usize, kind: NodeKind) -> Result<Vec<u8>> {
    let parts: Vec<&str> = text
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != count {
        return Err(invalid(text, kind));
    }
    let mut buf = vec![0u8; count * 4];
    for (i, part) in parts.iter().enumerate() {
        let value = parse_float(part).ok_or_else(|| invalid(text, kind))?;
        LittleEndian::write_f32(&mut buf[i * 4..], value as f32);
    }
    Ok(buf)
}

/// Bytes for one `f32` component of a vector or matrix
pub fn parse_component(kind: NodeKind, text: &str) -> Result<Vec<u8>> {
    if kind.float_components().is_none() {
        return Err(Error::InvalidValue(format!("{} has no components", kind)));
    }
    let value = parse_float(text).ok_or_else(|| invalid(text, "float"))?;
    let mut buf = vec![0u8; 4];
    LittleEndian::write_f32(&mut buf, value as f32);
    Ok(buf)
}

/// Encode user input as the bytes `node` occupies
pub fn parse_value(node: &Node, text: &str) -> Result<Vec<u8>> {
    let kind = node.kind;
    match kind {
        NodeKind::Hex8 | NodeKind::Hex16 | NodeKind::Hex32 | NodeKind::Hex64 | NodeKind::Padding => {
            parse_hex_bytes(text, node.own_size() as usize).ok_or_else(|| invalid(text, kind))
        }
        NodeKind::Int8 | NodeKind::Int16 | NodeKind::Int32 | NodeKind::Int64 => {
            signed_bytes(text, kind)
        }
        NodeKind::UInt8
        | NodeKind::UInt16
        | NodeKind::UInt32
        | NodeKind::UInt64
        | NodeKind::Pointer32
        | NodeKind::Pointer64 => unsigned_bytes(text, kind),
        NodeKind::Float => {
            let value = parse_float(text).ok_or_else(|| invalid(text, kind))?;
            let mut buf = vec![0u8; 4];
            LittleEndian::write_f32(&mut buf, value as f32);
            Ok(buf)
        }
        NodeKind::Double => {
            let value = parse_float(text).ok_or_else(|| invalid(text, kind))?;
            let mut buf = vec![0u8; 8];
            LittleEndian::write_f64(&mut buf, value);
            Ok(buf)
        }
        NodeKind::Bool => match text.trim().to_ascii_lowercase().as_str() {
            "true" | "1" => Ok(vec![1]),
            "false" | "0" => Ok(vec![0]),
            _ => Err(invalid(text, kind)),
        },
        NodeKind::UTF8 => {
            let len = node.str_len as usize;
            let mut end = text.len().min(len);
            while !text.is_char_boundary(end) {
                end -= 1;
            }
            let mut buf = text.as_bytes()[..end].to_vec();
            buf.resize(len, 0);
            Ok(buf)
        }
        NodeKind::UTF16 => {
            let len = node.str_len as usize;
            let mut units: Vec<u16> = text.encode_utf16().take(len).collect();
            units.resize(len, 0);
            let mut buf = vec![0u8; len * 2];
            LittleEndian::write_u16_into(&units, &mut buf);
            Ok(buf)
        }
        NodeKind::Vec2 | NodeKind::Vec3 | NodeKind::Vec4 | NodeKind::Mat4x4 => {
            floats(text, kind.float_components().unwrap_or(0), kind)
        }
        NodeKind::Struct | NodeKind::Array => Err(Error::InvalidValue(format!(
            "{} values cannot be edited as text",
            kind
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_integers() {
        assert_eq!(format_value(NodeKind::UInt32, &0xDEADBEEFu32.to_le_bytes()), "3735928559");
        assert_eq!(format_value(NodeKind::Int16, &(-2i16).to_le_bytes()), "-2");
        assert_eq!(format_value(NodeKind::UInt8, &[0x42]), "0x42");
        assert_eq!(format_value(NodeKind::Pointer32, &[0x10, 0, 0, 0]), "0x00000010");
        assert_eq!(format_value(NodeKind::Bool, &[2]), "true");
        assert_eq!(format_value(NodeKind::Hex32, &[0xBE, 0xBA, 0xFE, 0xCA]), "BE BA FE CA");
    }

    #[test]
    fn test_format_text_and_vectors() {
        assert_eq!(format_value(NodeKind::UTF8, b"hero\0junk"), "hero");
        let wide: Vec<u8> = "hi\0x".encode_utf16().flat_map(|u| u.to_le_bytes()).collect();
        assert_eq!(format_value(NodeKind::UTF16, &wide), "hi");

        let mut v = Vec::new();
        for f in [1.0f32, 2.5, -3.0] {
            v.extend_from_slice(&f.to_le_bytes());
        }
        assert_eq!(format_value(NodeKind::Vec3, &v), "1, 2.5, -3");
        assert_eq!(format_value(NodeKind::Struct, &v), "");
    }

    #[test]
    fn test_parse_integers() {
        let node = Node::new(NodeKind::UInt32);
        assert_eq!(parse_value(&node, "42").unwrap(), vec![42, 0, 0, 0]);
        assert_eq!(parse_value(&node, "0xDEADBEEF").unwrap(), vec![0xEF, 0xBE, 0xAD, 0xDE]);
        assert!(parse_value(&node, "4294967296").is_err());
        assert!(parse_value(&node, "-1").is_err());

        let signed = Node::new(NodeKind::Int8);
        assert_eq!(parse_value(&signed, "-128").unwrap(), vec![0x80]);
        assert!(parse_value(&signed, "128").is_err());

        let byte = Node::new(NodeKind::UInt8);
        assert_eq!(parse_value(&byte, "0xFF").unwrap(), vec![0xFF]);
    }

    #[test]
    fn test_parse_hex_bytes() {
        let node = Node::new(NodeKind::Hex32);
        assert_eq!(parse_value(&node, "AA BB CC DD").unwrap(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert_eq!(parse_value(&node, "aabbccdd").unwrap(), vec![0xAA, 0xBB, 0xCC, 0xDD]);
        assert!(parse_value(&node, "AA BB").is_err());
        assert!(parse_value(&node, "AA BB CC GG").is_err());
    }

    #[test]
    fn test_parse_floats_and_bools() {
        let node = Node::new(NodeKind::Float);
        assert_eq!(parse_value(&node, "1.5").unwrap(), 1.5f32.to_le_bytes().to_vec());
        assert_eq!(parse_value(&node, "2f").unwrap(), 2.0f32.to_le_bytes().to_vec());

        let vec2 = Node::new(NodeKind::Vec2);
        let bytes = parse_value(&vec2, "1, 2").unwrap();
        assert_eq!(format_value(NodeKind::Vec2, &bytes), "1, 2");
        assert!(parse_value(&vec2, "1").is_err());

        let flag = Node::new(NodeKind::Bool);
        assert_eq!(parse_value(&flag, "TRUE").unwrap(), vec![1]);
        assert!(parse_value(&flag, "yes").is_err());

        assert_eq!(parse_component(NodeKind::Vec4, "0.5").unwrap(), 0.5f32.to_le_bytes().to_vec());
        assert!(parse_component(NodeKind::Float, "0.5").is_err());
    }

    #[test]
    fn test_parse_strings() {
        let name = Node::new(NodeKind::UTF8).with_str_len(4);
        assert_eq!(parse_value(&name, "ab").unwrap(), b"ab\0\0".to_vec());
        assert_eq!(parse_value(&name, "abcdef").unwrap(), b"abcd".to_vec());
        // Never split a multi-byte character
        assert_eq!(parse_value(&name, "abcé").unwrap(), b"abc\0".to_vec());

        let wide = Node::new(NodeKind::UTF16).with_str_len(3);
        assert_eq!(parse_value(&wide, "hi").unwrap(), vec![b'h', 0, b'i', 0, 0, 0]);

        assert!(parse_value(&Node::new(NodeKind::Struct), "1").is_err());
    }
}
