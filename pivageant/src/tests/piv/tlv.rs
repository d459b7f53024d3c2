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

use crate::error::Error;
use crate::piv::tlv::{decode_do, decode_dol, encode_do, required_nested, required_single, Value};

#[test]
fn test_length_encoding_forms() {
    assert_eq!(vec![0_u8], encode_do(&[]).unwrap());
    assert_eq!(127 + 1, encode_do(&[0xaa; 127]).unwrap().len());
    assert_eq!(vec![0x81, 128], encode_do(&[0xbb; 128]).unwrap()[..2].to_vec());
    assert_eq!(vec![0x81, 255], encode_do(&[0xcc; 255]).unwrap()[..2].to_vec());
    assert_eq!(
        vec![0x82, 0x01, 0x00],
        encode_do(&[0xdd; 256]).unwrap()[..3].to_vec()
    );
    assert_eq!(
        vec![0x82, 0xff, 0xff],
        encode_do(&[0xee; 65535]).unwrap()[..3].to_vec()
    );
    assert!(matches!(
        encode_do(&[0x00; 65536]).unwrap_err(),
        Error::ValueTooLarge(65536)
    ));
}

#[test]
fn test_decoded_objects_reencode_identically() {
    for value in [
        vec![0x01],
        vec![0x22; 127],
        vec![0x33; 128],
        vec![0x44; 300],
    ] {
        let mut buffer = vec![0x53];
        buffer.extend(encode_do(&value).unwrap());

        let (tag, next, decoded) = decode_do(&buffer, 0).unwrap();
        assert_eq!(0x53, tag);
        assert_eq!(buffer.len(), next);
        assert_eq!(value.as_slice(), decoded);
        assert_eq!(buffer[1..].to_vec(), encode_do(decoded).unwrap());
    }
}

#[test]
fn test_two_byte_tags_and_nesting() {
    // A 7F49 holding an 86: the two-byte tag is constructed, so its value
    // decodes as a nested object list.
    let point = [0x04, 0xaa, 0xbb];
    let mut buffer = vec![0x7f, 0x49, 0x05, 0x86];
    buffer.extend(encode_do(&point).unwrap());

    let dol = decode_dol(&buffer).unwrap();
    let nested = required_nested(&dol, 0x7f49).unwrap();
    assert_eq!(point.as_slice(), required_single(nested, 0x86).unwrap());
}

#[test]
fn test_repeated_primitive_tags_accumulate_in_order() {
    let buffer = vec![0xac, 0x06, 0x80, 0x01, 0x11, 0x80, 0x01, 0x14];
    let dol = decode_dol(&buffer).unwrap();
    let capability = required_nested(&dol, 0xac).unwrap();
    assert_eq!(
        Some(&Value::Repeated(vec![vec![0x11], vec![0x14]])),
        capability.get(&0x80)
    );
}

#[test]
fn test_truncated_objects_are_malformed() {
    // Value runs past the end of the buffer.
    assert!(matches!(
        decode_do(&[0x53, 0x05, 0x01], 0).unwrap_err(),
        Error::MalformedTlv(_)
    ));
    // Length bytes missing.
    assert!(matches!(
        decode_do(&[0x53, 0x82, 0x01], 0).unwrap_err(),
        Error::MalformedTlv(_)
    ));
    // Second tag byte missing.
    assert!(matches!(
        decode_do(&[0x7f], 0).unwrap_err(),
        Error::MalformedTlv(_)
    ));
    // Empty buffer.
    assert!(matches!(
        decode_do(&[], 0).unwrap_err(),
        Error::MalformedTlv(_)
    ));
}

#[test]
fn test_repeated_constructed_tag_is_malformed() {
    let buffer = vec![0xac, 0x03, 0x80, 0x01, 0x11, 0xac, 0x03, 0x80, 0x01, 0x14];
    assert!(matches!(
        decode_dol(&buffer).unwrap_err(),
        Error::MalformedTlv(_)
    ));
}

#[test]
fn test_required_lookups() {
    let dol = decode_dol(&[0xac, 0x03, 0x80, 0x01, 0x11]).unwrap();
    assert!(matches!(
        required_single(&dol, 0x86).unwrap_err(),
        Error::MalformedResponse(_)
    ));
    assert!(matches!(
        required_nested(&dol, 0x7c).unwrap_err(),
        Error::MalformedResponse(_)
    ));
    // A constructed tag is not a single value, and vice versa.
    assert!(matches!(
        required_single(&dol, 0xac).unwrap_err(),
        Error::MalformedResponse(_)
    ));
    let capability = required_nested(&dol, 0xac).unwrap();
    assert!(matches!(
        required_nested(capability, 0x80).unwrap_err(),
        Error::MalformedResponse(_)
    ));
}
