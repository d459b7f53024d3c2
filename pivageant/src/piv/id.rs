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
use once_cell::sync::Lazy;
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// A cryptographic algorithm identifier, as carried in GENERAL AUTHENTICATE
/// and GENERATE ASYMMETRIC KEY PAIR commands and in the algorithm capability
/// list a card advertises.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Algorithm {
    TripleDes,
    Rsa1024,
    Rsa2048,
    Aes128,
    Aes192,
    Aes256,
    Eccp256,
    Eccp384,
    /// NIST SP 800-73-4 cipher suite 2 secure messaging.
    CipherSuite2,
    /// NIST SP 800-73-4 cipher suite 7 secure messaging.
    CipherSuite7,
    // Vendor identifiers for signing operations where the card hashes the
    // message itself instead of being handed a digest.
    Eccp256Sha1,
    Eccp256Sha256,
    Eccp384Sha1,
    Eccp384Sha256,
    Eccp384Sha384,
}

static ALGORITHM_STRINGS: Lazy<HashMap<Algorithm, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(Algorithm::TripleDes, "3DES");
    m.insert(Algorithm::Rsa1024, "RSA1024");
    m.insert(Algorithm::Rsa2048, "RSA2048");
    m.insert(Algorithm::Aes128, "AES128");
    m.insert(Algorithm::Aes192, "AES192");
    m.insert(Algorithm::Aes256, "AES256");
    m.insert(Algorithm::Eccp256, "ECCP256");
    m.insert(Algorithm::Eccp384, "ECCP384");
    m.insert(Algorithm::CipherSuite2, "CS2");
    m.insert(Algorithm::CipherSuite7, "CS7");
    m.insert(Algorithm::Eccp256Sha1, "ECCP256-SHA1");
    m.insert(Algorithm::Eccp256Sha256, "ECCP256-SHA256");
    m.insert(Algorithm::Eccp384Sha1, "ECCP384-SHA1");
    m.insert(Algorithm::Eccp384Sha256, "ECCP384-SHA256");
    m.insert(Algorithm::Eccp384Sha384, "ECCP384-SHA384");
    m
});

static STRING_ALGORITHMS: Lazy<HashMap<String, Algorithm>> = Lazy::new(|| {
    ALGORITHM_STRINGS
        .iter()
        .map(|pair| (pair.1.to_uppercase(), *pair.0))
        .collect()
});

impl Algorithm {
    pub fn to_value(self) -> u8 {
        match self {
            Algorithm::TripleDes => 0x03,
            Algorithm::Rsa1024 => 0x06,
            Algorithm::Rsa2048 => 0x07,
            Algorithm::Aes128 => 0x08,
            Algorithm::Aes192 => 0x0a,
            Algorithm::Aes256 => 0x0c,
            Algorithm::Eccp256 => 0x11,
            Algorithm::Eccp384 => 0x14,
            Algorithm::CipherSuite2 => 0x27,
            Algorithm::CipherSuite7 => 0x2e,
            Algorithm::Eccp256Sha1 => 0xf0,
            Algorithm::Eccp256Sha256 => 0xf1,
            Algorithm::Eccp384Sha1 => 0xf2,
            Algorithm::Eccp384Sha256 => 0xf3,
            Algorithm::Eccp384Sha384 => 0xf4,
        }
    }

    pub fn from_value(value: u8) -> Option<Algorithm> {
        match value {
            0x03 => Some(Algorithm::TripleDes),
            0x06 => Some(Algorithm::Rsa1024),
            0x07 => Some(Algorithm::Rsa2048),
            0x08 => Some(Algorithm::Aes128),
            0x0a => Some(Algorithm::Aes192),
            0x0c => Some(Algorithm::Aes256),
            0x11 => Some(Algorithm::Eccp256),
            0x14 => Some(Algorithm::Eccp384),
            0x27 => Some(Algorithm::CipherSuite2),
            0x2e => Some(Algorithm::CipherSuite7),
            0xf0 => Some(Algorithm::Eccp256Sha1),
            0xf1 => Some(Algorithm::Eccp256Sha256),
            0xf2 => Some(Algorithm::Eccp384Sha1),
            0xf3 => Some(Algorithm::Eccp384Sha256),
            0xf4 => Some(Algorithm::Eccp384Sha384),
            _ => None,
        }
    }

    pub fn is_ecc(self) -> bool {
        matches!(self, Algorithm::Eccp256 | Algorithm::Eccp384)
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", ALGORITHM_STRINGS.get(self).map_or("?", |s| s))
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.to_uppercase();
        STRING_ALGORITHMS
            .get(&s)
            .copied()
            .ok_or_else(|| Error::InvalidArgument(format!("invalid algorithm '{}'", s)))
    }
}

/// A card instruction byte. GetVersion and GetSerial are vendor extensions
/// outside the PIV standard.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Instruction {
    Select,
    Verify,
    GeneralAuthenticate,
    GenerateAsymmetric,
    GetData,
    PutData,
    GetResponse,
    GetVersion,
    GetSerial,
}

impl Instruction {
    pub fn to_value(self) -> u8 {
        match self {
            Instruction::Select => 0xa4,
            Instruction::Verify => 0x20,
            Instruction::GeneralAuthenticate => 0x87,
            Instruction::GenerateAsymmetric => 0x47,
            Instruction::GetData => 0xcb,
            Instruction::PutData => 0xdb,
            Instruction::GetResponse => 0xc0,
            Instruction::GetVersion => 0xfd,
            Instruction::GetSerial => 0xf8,
        }
    }
}

/// A key reference (slot) on the card.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum Key {
    Authentication,
    CardManagement,
    Signature,
    KeyManagement,
    CardAuthentication,
}

static KEY_STRINGS: Lazy<HashMap<Key, &'static str>> = Lazy::new(|| {
    let mut m = HashMap::new();
    m.insert(Key::Authentication, "Authentication");
    m.insert(Key::CardManagement, "Card Management");
    m.insert(Key::Signature, "Signature");
    m.insert(Key::KeyManagement, "Key Management");
    m.insert(Key::CardAuthentication, "Card Authentication");
    m
});

impl Key {
    pub fn to_value(self) -> u8 {
        match self {
            Key::Authentication => 0x9a,
            Key::CardManagement => 0x9b,
            Key::Signature => 0x9c,
            Key::KeyManagement => 0x9d,
            Key::CardAuthentication => 0x9e,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", KEY_STRINGS.get(self).map_or("?", |s| s))
    }
}
