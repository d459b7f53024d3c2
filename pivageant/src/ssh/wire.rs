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
use crate::piv::pkey::{P256_POINT_BYTES, P384_POINT_BYTES};
use data_encoding::BASE64;

/// SSH_MSG_USERAUTH_REQUEST, the only message type signed on a key's behalf.
const MSG_USERAUTH_REQUEST: u8 = 50;

/// The NIST curves an uncompressed public point can name.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Curve {
    P256,
    P384,
}

impl Curve {
    /// Infer the curve from the length of an uncompressed public point.
    pub fn from_point_length(length: usize) -> Result<Curve> {
        match length {
            P256_POINT_BYTES => Ok(Curve::P256),
            P384_POINT_BYTES => Ok(Curve::P384),
            length => Err(Error::UnsupportedKeyLength(length)),
        }
    }

    pub fn nistp_id(&self) -> &'static str {
        match self {
            Curve::P256 => "nistp256",
            Curve::P384 => "nistp384",
        }
    }

    pub fn key_type(&self) -> &'static str {
        match self {
            Curve::P256 => "ecdsa-sha2-nistp256",
            Curve::P384 => "ecdsa-sha2-nistp384",
        }
    }
}

/// Prefix `data` with its big-endian u32 length, the SSH wire string
/// encoding.
pub fn pack(data: &[u8]) -> Vec<u8> {
    let mut packed = Vec::with_capacity(data.len() + 4);
    packed.extend_from_slice(&(data.len() as u32).to_be_bytes());
    packed.extend_from_slice(data);
    packed
}

/// Split one length-prefixed field off the front of `buffer`, returning the
/// field and the remainder.
pub fn unpack(buffer: &[u8]) -> Result<(&[u8], &[u8])> {
    if buffer.len() < 4 {
        return Err(Error::MalformedRequest(
            "length prefix truncated".to_owned(),
        ));
    }
    let length = u32::from_be_bytes([buffer[0], buffer[1], buffer[2], buffer[3]]) as usize;
    let rest = &buffer[4..];
    if rest.len() < length {
        return Err(Error::MalformedRequest(format!(
            "field of {} bytes truncated",
            length
        )));
    }
    Ok((&rest[..length], &rest[length..]))
}

/// A public key in the shape SSH clients consume: the wire blob plus a
/// comment.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Identity {
    blob: Vec<u8>,
    comment: String,
    curve: Curve,
}

/// Encode an uncompressed EC public point as an SSH identity.
pub fn encode_identity(point: &[u8], comment: &str) -> Result<Identity> {
    let curve = Curve::from_point_length(point.len())?;
    let mut blob = pack(curve.key_type().as_bytes());
    blob.extend(pack(curve.nistp_id().as_bytes()));
    blob.extend(pack(point));
    Ok(Identity {
        blob,
        comment: comment.to_owned(),
        curve,
    })
}

impl Identity {
    pub fn blob(&self) -> &[u8] {
        &self.blob
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn curve(&self) -> Curve {
        self.curve
    }

    pub fn key_type(&self) -> &'static str {
        self.curve.key_type()
    }

    /// The single-line form found in authorized_keys files.
    pub fn openssh_line(&self) -> String {
        format!(
            "{} {} {}",
            self.key_type(),
            BASE64.encode(&self.blob),
            self.comment
        )
    }

    /// The blob-and-comment pair as it appears in an identities answer.
    pub fn wire(&self) -> Vec<u8> {
        let mut encoded = pack(&self.blob);
        encoded.extend(pack(self.comment.as_bytes()));
        encoded
    }
}

/// Split a signature request body (everything after the operation byte) into
/// the claimed key blob and the data to sign. The only supported trailing
/// flags word is zero.
pub fn parse_signature_request(body: &[u8]) -> Result<(&[u8], &[u8])> {
    let (key_blob, rest) = unpack(body)?;
    let (data, flags) = unpack(rest)?;
    if flags.len() != 4 || flags.iter().any(|&b| b != 0) {
        return Err(Error::MalformedRequest(
            "unsupported signature request flags".to_owned(),
        ));
    }
    Ok((key_blob, data))
}

/// The pieces of a public key authentication payload which the agent acts
/// on.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct AuthPayload<'a> {
    pub session_id: &'a [u8],
    pub username: &'a str,
    /// The key the client claims to authenticate with: a packed key type
    /// followed by the packed key blob.
    pub claimed_key: &'a [u8],
}

fn auth_field<'a>(buffer: &'a [u8], what: &str) -> Result<(&'a [u8], &'a [u8])> {
    unpack(buffer).map_err(|_| Error::MalformedAuthPayload(format!("{} truncated", what)))
}

/// Validate that data offered for signing is an SSH public key
/// authentication payload (RFC 4252 section 7), and pull out the parts worth
/// acting on. Anything else is refused: this agent signs login attempts,
/// nothing more.
pub fn parse_auth_signature_payload(payload: &[u8]) -> Result<AuthPayload<'_>> {
    let (session_id, rest) = auth_field(payload, "session identifier")?;
    let (message_type, rest) = rest
        .split_first()
        .ok_or_else(|| Error::MalformedAuthPayload("message type missing".to_owned()))?;
    if *message_type != MSG_USERAUTH_REQUEST {
        return Err(Error::MalformedAuthPayload(format!(
            "message type {} is not a user authentication request",
            message_type
        )));
    }
    let (username, rest) = auth_field(rest, "username")?;
    let username = std::str::from_utf8(username)
        .map_err(|_| Error::MalformedAuthPayload("username is not UTF-8".to_owned()))?;
    let (service, rest) = auth_field(rest, "service name")?;
    if service != b"ssh-connection" {
        return Err(Error::MalformedAuthPayload(
            "service is not ssh-connection".to_owned(),
        ));
    }
    let (method, rest) = auth_field(rest, "method name")?;
    if method != b"publickey" {
        return Err(Error::MalformedAuthPayload(
            "method is not publickey".to_owned(),
        ));
    }
    let (flag, claimed_key) = rest
        .split_first()
        .ok_or_else(|| Error::MalformedAuthPayload("signature flag missing".to_owned()))?;
    if *flag != 1 {
        return Err(Error::MalformedAuthPayload(
            "signature flag is not set".to_owned(),
        ));
    }
    if claimed_key.is_empty() {
        return Err(Error::MalformedAuthPayload(
            "claimed public key missing".to_owned(),
        ));
    }
    Ok(AuthPayload {
        session_id,
        username,
        claimed_key,
    })
}

/// Pull the R and S integers out of a DER ECDSA signature. The integers are
/// copied verbatim by their declared lengths; DER canonicalization (minimal
/// lengths, sign padding) is not re-validated.
pub fn decode_der_signature(der: &[u8]) -> Result<(Vec<u8>, Vec<u8>)> {
    if der.len() < 4 || der[0] != 0x30 {
        return Err(Error::MalformedSignature(
            "expected a DER SEQUENCE".to_owned(),
        ));
    }
    if der[2] != 0x02 {
        return Err(Error::MalformedSignature(
            "expected a DER INTEGER for R".to_owned(),
        ));
    }
    let r_end = 4 + usize::from(der[3]);
    if der.len() < r_end + 2 {
        return Err(Error::MalformedSignature("signature truncated".to_owned()));
    }
    if der[r_end] != 0x02 {
        return Err(Error::MalformedSignature(
            "expected a DER INTEGER for S".to_owned(),
        ));
    }
    let s_start = r_end + 2;
    let s_end = s_start + usize::from(der[r_end + 1]);
    if der.len() < s_end {
        return Err(Error::MalformedSignature("signature truncated".to_owned()));
    }
    Ok((der[4..r_end].to_vec(), der[s_start..s_end].to_vec()))
}
