//! Auxiliary tag decoding.
//!
//! Each tag is encoded as:
//! - 2 bytes: tag name (e.g., "NM")
//! - 1 byte: value type (A, c, C, s, S, i, I, f, Z, H, B)
//! - N bytes: value (format depends on type)
//!
//! `B` arrays carry a 1-byte element subtype and a uint32 element count
//! before the elements.

use crate::{Error, Result};
use byteorder::{LittleEndian, ReadBytesExt};
use serde::Serialize;
use std::collections::BTreeMap;
use std::io::BufRead;

/// Tags of one record, ordered by name.
pub type Tags = BTreeMap<String, TagValue>;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagValue {
    Char(char),
    Int8(i8),
    UInt8(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Float(f32),
    String(String),
    Hex(String),
    Array(TagArray),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TagArray {
    Int8(Vec<i8>),
    UInt8(Vec<u8>),
    Int16(Vec<i16>),
    UInt16(Vec<u16>),
    Int32(Vec<i32>),
    UInt32(Vec<u32>),
    Float(Vec<f32>),
}

impl TagArray {
    pub fn len(&self) -> usize {
        match self {
            TagArray::Int8(v) => v.len(),
            TagArray::UInt8(v) => v.len(),
            TagArray::Int16(v) => v.len(),
            TagArray::UInt16(v) => v.len(),
            TagArray::Int32(v) => v.len(),
            TagArray::UInt32(v) => v.len(),
            TagArray::Float(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Decodes the tag stream that fills the rest of a record.
pub fn parse_tags(mut data: &[u8]) -> Result<Tags> {
    let mut tags = Tags::new();
    while !data.is_empty() {
        let (name, value) = read_tag(&mut data)?;
        tags.insert(name, value);
    }
    Ok(tags)
}

fn read_tag(data: &mut &[u8]) -> Result<(String, TagValue)> {
    let mut header = [0u8; 3];
    std::io::Read::read_exact(data, &mut header).map_err(|e| Error::truncated("tag header", e))?;
    let name = String::from_utf8_lossy(&header[..2]).into_owned();
    let eof = |e| Error::truncated(&format!("tag {}", name), e);

    let value = match header[2] {
        b'A' => TagValue::Char(char::from(data.read_u8().map_err(eof)?)),
        b'c' => TagValue::Int8(data.read_i8().map_err(eof)?),
        b'C' => TagValue::UInt8(data.read_u8().map_err(eof)?),
        b's' => TagValue::Int16(data.read_i16::<LittleEndian>().map_err(eof)?),
        b'S' => TagValue::UInt16(data.read_u16::<LittleEndian>().map_err(eof)?),
        b'i' => TagValue::Int32(data.read_i32::<LittleEndian>().map_err(eof)?),
        b'I' => TagValue::UInt32(data.read_u32::<LittleEndian>().map_err(eof)?),
        b'f' => TagValue::Float(data.read_f32::<LittleEndian>().map_err(eof)?),
        b'Z' => TagValue::String(read_cstring(data, &name)?),
        b'H' => TagValue::Hex(read_cstring(data, &name)?),
        b'B' => TagValue::Array(read_array(data, &name)?),
        other => {
            return Err(Error::UnknownTagType {
                tag: name,
                type_code: char::from(other),
            });
        }
    };

    Ok((name, value))
}

fn read_cstring(data: &mut &[u8], name: &str) -> Result<String> {
    let mut buf = Vec::new();
    data.read_until(0, &mut buf)?;
    if buf.pop() != Some(0) {
        return Err(Error::Format(format!("tag {} string lacks NUL terminator", name)));
    }
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn read_array(data: &mut &[u8], name: &str) -> Result<TagArray> {
    let eof = |e| Error::truncated(&format!("tag {}", name), e);
    let subtype = data.read_u8().map_err(eof)?;
    let count = data.read_u32::<LittleEndian>().map_err(eof)? as usize;

    let width = match subtype {
        b'c' | b'C' => 1,
        b's' | b'S' => 2,
        b'i' | b'I' | b'f' => 4,
        other => {
            return Err(Error::UnknownArrayType {
                tag: name.to_string(),
                subtype: char::from(other),
            });
        }
    };
    if count.saturating_mul(width) > data.len() {
        return Err(Error::Format(format!(
            "tag {} declares {} elements, only {} bytes remain",
            name,
            count,
            data.len()
        )));
    }

    fn collect<T>(n: usize, mut f: impl FnMut() -> std::io::Result<T>) -> std::io::Result<Vec<T>> {
        (0..n).map(|_| f()).collect()
    }

    let array = match subtype {
        b'c' => TagArray::Int8(collect(count, || data.read_i8())?),
        b'C' => TagArray::UInt8(collect(count, || data.read_u8())?),
        b's' => TagArray::Int16(collect(count, || data.read_i16::<LittleEndian>())?),
        b'S' => TagArray::UInt16(collect(count, || data.read_u16::<LittleEndian>())?),
        b'i' => TagArray::Int32(collect(count, || data.read_i32::<LittleEndian>())?),
        b'I' => TagArray::UInt32(collect(count, || data.read_u32::<LittleEndian>())?),
        _ => TagArray::Float(collect(count, || data.read_f32::<LittleEndian>())?),
    };
    Ok(array)
}
