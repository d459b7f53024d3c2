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
use crate::ssh::wire::{
    decode_der_signature, encode_identity, pack, parse_auth_signature_payload,
    parse_signature_request, unpack, Curve,
};
use data_encoding::BASE64;

pub(crate) fn auth_payload(username: &str, claimed_key: &[u8]) -> Vec<u8> {
    let mut payload = pack(b"0123456789abcdef0123456789abcdef");
    payload.push(50);
    payload.extend(pack(username.as_bytes()));
    payload.extend(pack(b"ssh-connection"));
    payload.extend(pack(b"publickey"));
    payload.push(1);
    payload.extend_from_slice(claimed_key);
    payload
}

#[test]
fn test_pack_and_unpack() {
    let packed = pack(b"abc");
    assert_eq!(&[0, 0, 0, 3, b'a', b'b', b'c'], packed.as_slice());

    let (field, rest) = unpack(&packed).unwrap();
    assert_eq!(b"abc", field);
    assert!(rest.is_empty());

    assert!(matches!(
        unpack(&[0, 0, 0]).unwrap_err(),
        Error::MalformedRequest(_)
    ));
    assert!(matches!(
        unpack(&[0, 0, 0, 4, 0xaa]).unwrap_err(),
        Error::MalformedRequest(_)
    ));
}

#[test]
fn test_curves_from_point_lengths() {
    assert_eq!(Curve::P256, Curve::from_point_length(65).unwrap());
    assert_eq!(Curve::P384, Curve::from_point_length(97).unwrap());
    assert!(matches!(
        Curve::from_point_length(66).unwrap_err(),
        Error::UnsupportedKeyLength(66)
    ));
}

#[test]
fn test_identity_blob_layout() {
    let point = [0x04; 65];
    let identity = encode_identity(&point, "testkey").unwrap();

    let blob = identity.blob();
    let (key_type, rest) = unpack(blob).unwrap();
    assert_eq!(b"ecdsa-sha2-nistp256", key_type);
    let (curve_id, rest) = unpack(rest).unwrap();
    assert_eq!(b"nistp256", curve_id);
    let (blob_point, rest) = unpack(rest).unwrap();
    assert_eq!(point.as_slice(), blob_point);
    assert!(rest.is_empty());

    // The curve size sits at a fixed offset in the wire encoding.
    let wire = identity.wire();
    assert_eq!(b"256", &wire[24..27]);
}

#[test]
fn test_identity_openssh_line() {
    let point = [0x04; 97];
    let identity = encode_identity(&point, "mykey").unwrap();
    let line = identity.openssh_line();
    let fields: Vec<&str> = line.split(' ').collect();
    assert_eq!(3, fields.len());
    assert_eq!("ecdsa-sha2-nistp384", fields[0]);
    assert_eq!("mykey", fields[2]);

    // The middle field decodes back to the key blob, point included.
    let blob = BASE64.decode(fields[1].as_bytes()).unwrap();
    assert_eq!(identity.blob(), blob.as_slice());
    let (key_type, rest) = unpack(&blob).unwrap();
    assert_eq!(b"ecdsa-sha2-nistp384", key_type);
    let (curve_id, rest) = unpack(rest).unwrap();
    assert_eq!(b"nistp384", curve_id);
    let (blob_point, rest) = unpack(rest).unwrap();
    assert_eq!(point.as_slice(), blob_point);
    assert!(rest.is_empty());
}

#[test]
fn test_parse_signature_request() {
    let mut body = pack(b"keyblob");
    body.extend(pack(b"data to sign"));
    body.extend_from_slice(&[0, 0, 0, 0]);

    let (key_blob, data) = parse_signature_request(&body).unwrap();
    assert_eq!(b"keyblob", key_blob);
    assert_eq!(b"data to sign", data);
}

#[test]
fn test_signature_request_flags_must_be_zero() {
    let mut body = pack(b"keyblob");
    body.extend(pack(b"data"));
    body.extend_from_slice(&[0, 0, 0, 1]);
    assert!(matches!(
        parse_signature_request(&body).unwrap_err(),
        Error::MalformedRequest(_)
    ));

    // Truncated flags are refused too.
    let mut body = pack(b"keyblob");
    body.extend(pack(b"data"));
    body.extend_from_slice(&[0, 0]);
    assert!(matches!(
        parse_signature_request(&body).unwrap_err(),
        Error::MalformedRequest(_)
    ));
}

#[test]
fn test_parse_auth_signature_payload() {
    let claimed = pack(b"ecdsa-sha2-nistp256");
    let payload = auth_payload("alice", &claimed);
    let auth = parse_auth_signature_payload(&payload).unwrap();
    assert_eq!(b"0123456789abcdef0123456789abcdef", auth.session_id);
    assert_eq!("alice", auth.username);
    assert_eq!(claimed.as_slice(), auth.claimed_key);
}

#[test]
fn test_auth_payload_literals_are_enforced() {
    let claimed = pack(b"ecdsa-sha2-nistp256");

    let mut wrong_type = auth_payload("alice", &claimed);
    wrong_type[36] = 51;
    assert!(matches!(
        parse_auth_signature_payload(&wrong_type).unwrap_err(),
        Error::MalformedAuthPayload(_)
    ));

    let mut payload = pack(b"0123456789abcdef0123456789abcdef");
    payload.push(50);
    payload.extend(pack(b"alice"));
    payload.extend(pack(b"ssh-userauth"));
    payload.extend(pack(b"publickey"));
    payload.push(1);
    payload.extend_from_slice(&claimed);
    assert!(matches!(
        parse_auth_signature_payload(&payload).unwrap_err(),
        Error::MalformedAuthPayload(_)
    ));

    let mut payload = pack(b"0123456789abcdef0123456789abcdef");
    payload.push(50);
    payload.extend(pack(b"alice"));
    payload.extend(pack(b"ssh-connection"));
    payload.extend(pack(b"password"));
    payload.push(1);
    payload.extend_from_slice(&claimed);
    assert!(matches!(
        parse_auth_signature_payload(&payload).unwrap_err(),
        Error::MalformedAuthPayload(_)
    ));

    let mut unsigned = auth_payload("alice", &claimed);
    let flag_index = unsigned.len() - claimed.len() - 1;
    unsigned[flag_index] = 0;
    assert!(matches!(
        parse_auth_signature_payload(&unsigned).unwrap_err(),
        Error::MalformedAuthPayload(_)
    ));

    assert!(matches!(
        parse_auth_signature_payload(&auth_payload("alice", &[])).unwrap_err(),
        Error::MalformedAuthPayload(_)
    ));
}

#[test]
fn test_decode_der_signature() {
    let mut der = vec![0x30, 0x44, 0x02, 0x20];
    der.extend_from_slice(&[0x11; 32]);
    der.extend_from_slice(&[0x02, 0x20]);
    der.extend_from_slice(&[0x22; 32]);

    let (r, s) = decode_der_signature(&der).unwrap();
    assert_eq!(vec![0x11; 32], r);
    assert_eq!(vec![0x22; 32], s);
}

#[test]
fn test_der_integers_are_copied_verbatim() {
    // A leading zero pad byte stays in place; no canonicalization happens.
    let mut der = vec![0x30, 0x27, 0x02, 0x21, 0x00];
    der.extend_from_slice(&[0x91; 32]);
    der.extend_from_slice(&[0x02, 0x02]);
    der.extend_from_slice(&[0x00, 0x7f]);

    let (r, s) = decode_der_signature(&der).unwrap();
    assert_eq!(33, r.len());
    assert_eq!(0x00, r[0]);
    assert_eq!(vec![0x00, 0x7f], s);
}

#[test]
fn test_malformed_der_signatures() {
    assert!(matches!(
        decode_der_signature(&[]).unwrap_err(),
        Error::MalformedSignature(_)
    ));
    // Not a SEQUENCE.
    assert!(matches!(
        decode_der_signature(&[0x31, 0x02, 0x02, 0x00]).unwrap_err(),
        Error::MalformedSignature(_)
    ));
    // R is not an INTEGER.
    assert!(matches!(
        decode_der_signature(&[0x30, 0x02, 0x03, 0x00]).unwrap_err(),
        Error::MalformedSignature(_)
    ));
    // R's declared length runs past the end.
    assert!(matches!(
        decode_der_signature(&[0x30, 0x06, 0x02, 0x20, 0x01, 0x02]).unwrap_err(),
        Error::MalformedSignature(_)
    ));
}
