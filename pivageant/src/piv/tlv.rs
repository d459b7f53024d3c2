// Copyright 2017 Axel Rasmussen
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use crate::error::{Error, Result};
use std::collections::BTreeMap;

/// The decoded value of a single tag within a data object list. A tag which
/// occurs more than once has its values accumulated in order.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum Value {
    Single(Vec<u8>),
    Repeated(Vec<Vec<u8>>),
    Nested(DataObjectMap),
}

pub type DataObjectMap = BTreeMap<u16, Value>;

// Tags are at most two bytes. A first byte with all five low bits set means a
// second tag byte follows; bit 6 of the leading byte marks a constructed
// (nested) encoding.
fn tag_is_constructed(tag: u16) -> bool {
    if tag > 0xff {
        tag & 0x2000 != 0
    } else {
        tag & 0x20 != 0
    }
}

fn truncated(offset: usize) -> Error {
    Error::MalformedTlv(format!("data object truncated at offset {}", offset))
}

/// Decode the single BER-TLV data object starting at `offset` in `buffer`.
/// Returns the tag, the offset just past this data object, and the raw value
/// bytes (not examined further, even for constructed tags).
pub fn decode_do(buffer: &[u8], offset: usize) -> Result<(u16, usize, &[u8])> {
    let first = *buffer.get(offset).ok_or_else(|| truncated(offset))?;
    let mut index = offset + 1;
    let tag: u16 = if first & 0x1f == 0x1f {
        let second = *buffer.get(index).ok_or_else(|| truncated(index))?;
        index += 1;
        (u16::from(first) << 8) | u16::from(second)
    } else {
        u16::from(first)
    };

    let mut length = usize::from(*buffer.get(index).ok_or_else(|| truncated(index))?);
    index += 1;
    if length & 0x80 != 0 {
        let length_bytes = length & 0x7f;
        if length_bytes == 0 || length_bytes > 4 {
            return Err(Error::MalformedTlv(format!(
                "unsupported length of {} bytes for tag {:#x}",
                length_bytes, tag
            )));
        }
        length = 0;
        for _ in 0..length_bytes {
            length = (length << 8) | usize::from(*buffer.get(index).ok_or_else(|| truncated(index))?);
            index += 1;
        }
    }

    let end = index + length;
    if end > buffer.len() {
        return Err(Error::MalformedTlv(format!(
            "value of {} bytes for tag {:#x} runs past the end of the buffer",
            length, tag
        )));
    }
    Ok((tag, end, &buffer[index..end]))
}

/// Decode an entire buffer as a sequence of BER-TLV data objects, recursing
/// into constructed tags.
pub fn decode_dol(buffer: &[u8]) -> Result<DataObjectMap> {
    let mut map = DataObjectMap::new();
    let mut offset = 0;
    while offset < buffer.len() {
        let (tag, next, value) = decode_do(buffer, offset)?;
        if tag_is_constructed(tag) {
            if map.insert(tag, Value::Nested(decode_dol(value)?)).is_some() {
                return Err(Error::MalformedTlv(format!(
                    "constructed tag {:#x} occurs more than once",
                    tag
                )));
            }
        } else {
            let merged = match map.remove(&tag) {
                None => Value::Single(value.to_vec()),
                Some(Value::Single(first)) => Value::Repeated(vec![first, value.to_vec()]),
                Some(Value::Repeated(mut values)) => {
                    values.push(value.to_vec());
                    Value::Repeated(values)
                }
                Some(Value::Nested(_)) => {
                    return Err(Error::MalformedTlv(format!(
                        "tag {:#x} occurs as both primitive and constructed",
                        tag
                    )))
                }
            };
            map.insert(tag, merged);
        }
        offset = next;
    }
    Ok(map)
}

/// Encode a value's length prefix followed by the value itself. The caller
/// supplies the tag bytes; values of 64 KiB or more are refused.
pub fn encode_do(value: &[u8]) -> Result<Vec<u8>> {
    let mut encoded = Vec::with_capacity(value.len() + 3);
    match value.len() {
        len if len < 0x80 => encoded.push(len as u8),
        len if len < 0x100 => {
            encoded.push(0x81);
            encoded.push(len as u8);
        }
        len if len < 0x10000 => {
            encoded.push(0x82);
            encoded.extend_from_slice(&(len as u16).to_be_bytes());
        }
        len => return Err(Error::ValueTooLarge(len)),
    }
    encoded.extend_from_slice(value);
    Ok(encoded)
}

/// Look up a primitive tag, if present exactly once.
pub fn single(map: &DataObjectMap, tag: u16) -> Option<&[u8]> {
    match map.get(&tag) {
        Some(Value::Single(value)) => Some(value.as_slice()),
        _ => None,
    }
}

/// Look up a primitive tag which the structure of the response requires.
pub fn required_single(map: &DataObjectMap, tag: u16) -> Result<&[u8]> {
    match map.get(&tag) {
        Some(Value::Single(value)) => Ok(value.as_slice()),
        Some(_) => Err(Error::MalformedResponse(format!(
            "tag {:#x} does not hold a single primitive value",
            tag
        ))),
        None => Err(Error::MalformedResponse(format!(
            "required tag {:#x} is missing",
            tag
        ))),
    }
}

/// Look up a constructed tag which the structure of the response requires.
pub fn required_nested(map: &DataObjectMap, tag: u16) -> Result<&DataObjectMap> {
    match map.get(&tag) {
        Some(Value::Nested(nested)) => Ok(nested),
        Some(_) => Err(Error::MalformedResponse(format!(
            "tag {:#x} is not constructed",
            tag
        ))),
        None => Err(Error::MalformedResponse(format!(
            "required tag {:#x} is missing",
            tag
        ))),
    }
}
