//! Hierarchical value codec.
//!
//! [`Value`] is the in-memory form of every structured blob in the
//! pipeline: gamedata bucket files, savedata bucket files, and the diff
//! structures derived from them. It has two serialized projections:
//!
//! - a **binary form** ([`Value::from_binary`] / [`Value::to_binary`])
//!   with an explicit byte order, used inside pack archives;
//! - a **textual form** ([`Value::from_text`] / [`Value::to_text`]),
//!   a stable, human-diffable JSON projection used for on-disk diff
//!   logs. Mods ship these logs as plain versioned artifacts, so the
//!   text form must round-trip exactly — the externally tagged layout
//!   preserves the distinction between scalar types that plain JSON
//!   would collapse.
//!
//! Maps are [`BTreeMap`]s, so iteration and serialization order is
//! deterministic regardless of how a value was built.
//!
//! # Binary format
//!
//! A two-byte magic whose orientation encodes the byte order (`KV` =
//! little-endian, `VK` = big-endian), a `u16` version, then one
//! recursive node: a tag byte followed by the payload. Strings and
//! binary payloads are length-prefixed; arrays and maps are
//! count-prefixed.

use crate::error::{Error, Result};
use crate::Endian;
use byteorder::{BigEndian, ByteOrder, LittleEndian};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

const MAGIC_LITTLE: [u8; 2] = *b"KV";
const MAGIC_BIG: [u8; 2] = *b"VK";
const VERSION: u16 = 1;

const TAG_NULL: u8 = 0;
const TAG_BOOL: u8 = 1;
const TAG_I32: u8 = 2;
const TAG_U32: u8 = 3;
const TAG_F32: u8 = 4;
const TAG_STRING: u8 = 5;
const TAG_BINARY: u8 = 6;
const TAG_ARRAY: u8 = 7;
const TAG_MAP: u8 = 8;

/// A nested map/array/scalar structure.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Null,
    Bool(bool),
    I32(i32),
    U32(u32),
    F32(f32),
    String(String),
    Binary(Vec<u8>),
    Array(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

impl Default for Value {
    fn default() -> Self {
        Value::Null
    }
}

impl Value {
    /// Decode a value from its binary form, detecting the byte order
    /// from the magic orientation.
    pub fn from_binary(data: &[u8]) -> Result<Self> {
        let mut pos = 0usize;
        let magic = take(data, &mut pos, 2)?;
        match magic {
            m if m == MAGIC_LITTLE => decode_root::<LittleEndian>(data, &mut pos),
            m if m == MAGIC_BIG => decode_root::<BigEndian>(data, &mut pos),
            other => Err(Error::InvalidMagic(other.to_vec())),
        }
    }

    /// Encode the value to its binary form with the given byte order.
    pub fn to_binary(&self, endian: Endian) -> Vec<u8> {
        let mut out = Vec::new();
        match endian {
            Endian::Little => {
                out.extend_from_slice(&MAGIC_LITTLE);
                put_u16::<LittleEndian>(&mut out, VERSION);
                encode_node::<LittleEndian>(self, &mut out);
            }
            Endian::Big => {
                out.extend_from_slice(&MAGIC_BIG);
                put_u16::<BigEndian>(&mut out, VERSION);
                encode_node::<BigEndian>(self, &mut out);
            }
        }
        out
    }

    /// Parse the textual projection.
    pub fn from_text(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Emit the textual projection.
    pub fn to_text(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Map accessor; `None` for non-map values.
    pub fn as_map(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_map_mut(&mut self) -> Option<&mut BTreeMap<String, Value>> {
        match self {
            Value::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Value::I32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_u32(&self) -> Option<u32> {
        match self {
            Value::U32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(value) => Some(value),
            _ => None,
        }
    }

    /// Shorthand for map field lookup; `None` for non-map values.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_map().and_then(|map| map.get(key))
    }
}

fn decode_root<E: ByteOrder>(data: &[u8], pos: &mut usize) -> Result<Value> {
    let version = E::read_u16(take(data, pos, 2)?);
    if version != VERSION {
        return Err(Error::UnsupportedVersion(version));
    }
    decode_node::<E>(data, pos)
}

fn decode_node<E: ByteOrder>(data: &[u8], pos: &mut usize) -> Result<Value> {
    let tag = take(data, pos, 1)?[0];
    Ok(match tag {
        TAG_NULL => Value::Null,
        TAG_BOOL => Value::Bool(take(data, pos, 1)?[0] != 0),
        TAG_I32 => Value::I32(E::read_i32(take(data, pos, 4)?)),
        TAG_U32 => Value::U32(E::read_u32(take(data, pos, 4)?)),
        TAG_F32 => Value::F32(E::read_f32(take(data, pos, 4)?)),
        TAG_STRING => Value::String(decode_string::<E>(data, pos)?),
        TAG_BINARY => {
            let len = E::read_u32(take(data, pos, 4)?) as usize;
            Value::Binary(take(data, pos, len)?.to_vec())
        }
        TAG_ARRAY => {
            let count = E::read_u32(take(data, pos, 4)?) as usize;
            let mut items = Vec::with_capacity(count.min(data.len()));
            for _ in 0..count {
                items.push(decode_node::<E>(data, pos)?);
            }
            Value::Array(items)
        }
        TAG_MAP => {
            let count = E::read_u32(take(data, pos, 4)?) as usize;
            let mut map = BTreeMap::new();
            for _ in 0..count {
                let key = decode_string::<E>(data, pos)?;
                map.insert(key, decode_node::<E>(data, pos)?);
            }
            Value::Map(map)
        }
        other => return Err(Error::UnknownTag(other)),
    })
}

fn decode_string<E: ByteOrder>(data: &[u8], pos: &mut usize) -> Result<String> {
    let len = E::read_u32(take(data, pos, 4)?) as usize;
    Ok(String::from_utf8(take(data, pos, len)?.to_vec())?)
}

fn encode_node<E: ByteOrder>(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => out.push(TAG_NULL),
        Value::Bool(v) => {
            out.push(TAG_BOOL);
            out.push(u8::from(*v));
        }
        Value::I32(v) => {
            out.push(TAG_I32);
            put_i32::<E>(out, *v);
        }
        Value::U32(v) => {
            out.push(TAG_U32);
            put_u32::<E>(out, *v);
        }
        Value::F32(v) => {
            out.push(TAG_F32);
            put_f32::<E>(out, *v);
        }
        Value::String(v) => {
            out.push(TAG_STRING);
            encode_string::<E>(v, out);
        }
        Value::Binary(v) => {
            out.push(TAG_BINARY);
            put_u32::<E>(out, v.len() as u32);
            out.extend_from_slice(v);
        }
        Value::Array(items) => {
            out.push(TAG_ARRAY);
            put_u32::<E>(out, items.len() as u32);
            for item in items {
                encode_node::<E>(item, out);
            }
        }
        Value::Map(map) => {
            out.push(TAG_MAP);
            put_u32::<E>(out, map.len() as u32);
            for (key, item) in map {
                encode_string::<E>(key, out);
                encode_node::<E>(item, out);
            }
        }
    }
}

fn encode_string<E: ByteOrder>(value: &str, out: &mut Vec<u8>) {
    put_u32::<E>(out, value.len() as u32);
    out.extend_from_slice(value.as_bytes());
}

fn take<'a>(data: &'a [u8], pos: &mut usize, len: usize) -> Result<&'a [u8]> {
    let end = pos.checked_add(len).filter(|&end| end <= data.len()).ok_or(
        Error::Truncated {
            offset: *pos,
            needed: len,
            available: data.len().saturating_sub(*pos),
        },
    )?;
    let slice = &data[*pos..end];
    *pos = end;
    Ok(slice)
}

fn put_u16<E: ByteOrder>(out: &mut Vec<u8>, value: u16) {
    let mut buf = [0u8; 2];
    E::write_u16(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn put_u32<E: ByteOrder>(out: &mut Vec<u8>, value: u32) {
    let mut buf = [0u8; 4];
    E::write_u32(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn put_i32<E: ByteOrder>(out: &mut Vec<u8>, value: i32) {
    let mut buf = [0u8; 4];
    E::write_i32(&mut buf, value);
    out.extend_from_slice(&buf);
}

fn put_f32<E: ByteOrder>(out: &mut Vec<u8>, value: f32) {
    let mut buf = [0u8; 4];
    E::write_f32(&mut buf, value);
    out.extend_from_slice(&buf);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Value {
        Value::Map(BTreeMap::from([
            ("flags".to_string(), Value::Array(vec![
                Value::I32(-5),
                Value::U32(7),
                Value::Bool(true),
                Value::Null,
            ])),
            ("name".to_string(), Value::String("example".to_string())),
            ("payload".to_string(), Value::Binary(vec![0, 1, 2, 255])),
            ("ratio".to_string(), Value::F32(0.5)),
        ]))
    }

    #[test]
    fn test_binary_round_trip_little() {
        let value = sample();
        let bytes = value.to_binary(Endian::Little);
        assert_eq!(&bytes[..2], b"KV");
        assert_eq!(Value::from_binary(&bytes).unwrap(), value);
    }

    #[test]
    fn test_binary_round_trip_big() {
        let value = sample();
        let bytes = value.to_binary(Endian::Big);
        assert_eq!(&bytes[..2], b"VK");
        assert_eq!(Value::from_binary(&bytes).unwrap(), value);
    }

    #[test]
    fn test_endian_output_differs() {
        let value = Value::U32(0x01020304);
        assert_ne!(value.to_binary(Endian::Big), value.to_binary(Endian::Little));
    }

    #[test]
    fn test_text_round_trip() {
        let value = sample();
        let text = value.to_text().unwrap();
        assert_eq!(Value::from_text(&text).unwrap(), value);
    }

    #[test]
    fn test_text_distinguishes_scalar_types() {
        let signed = Value::I32(5).to_text().unwrap();
        let unsigned = Value::U32(5).to_text().unwrap();
        assert_ne!(signed, unsigned);
        assert_eq!(Value::from_text(&signed).unwrap(), Value::I32(5));
        assert_eq!(Value::from_text(&unsigned).unwrap(), Value::U32(5));
    }

    #[test]
    fn test_map_ordering_deterministic() {
        let mut forward = BTreeMap::new();
        forward.insert("a".to_string(), Value::I32(1));
        forward.insert("b".to_string(), Value::I32(2));
        let mut reverse = BTreeMap::new();
        reverse.insert("b".to_string(), Value::I32(2));
        reverse.insert("a".to_string(), Value::I32(1));

        assert_eq!(
            Value::Map(forward).to_binary(Endian::Little),
            Value::Map(reverse).to_binary(Endian::Little)
        );
    }

    #[test]
    fn test_unknown_tag() {
        let mut bytes = Value::Null.to_binary(Endian::Little);
        let last = bytes.len() - 1;
        bytes[last] = 0x7F;
        assert!(matches!(
            Value::from_binary(&bytes),
            Err(Error::UnknownTag(0x7F))
        ));
    }

    #[test]
    fn test_truncated() {
        let bytes = sample().to_binary(Endian::Little);
        assert!(matches!(
            Value::from_binary(&bytes[..bytes.len() - 3]),
            Err(Error::Truncated { .. })
        ));
    }

    #[test]
    fn test_accessors() {
        let value = sample();
        assert!(value.as_map().is_some());
        assert_eq!(value.get("name").and_then(Value::as_str), Some("example"));
        assert_eq!(value.get("missing"), None);
        assert!(value.as_i32().is_none());
        assert_eq!(Value::I32(-3).as_i32(), Some(-3));
    }
}
