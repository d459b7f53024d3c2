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
use std::fmt;

/// The number of leading "property" bytes in an APDU: class, instruction,
/// the two parameters, and the data length.
pub const APDU_PROPERTY_BYTES: usize = 5;
/// The largest data payload a single short APDU can carry.
pub const APDU_DATA_BYTES: usize = 255;
/// The full size of an APDU buffer.
pub const APDU_BYTES: usize = APDU_PROPERTY_BYTES + APDU_DATA_BYTES;

/// A single short command APDU, as sent to the card.
#[derive(Clone, Copy)]
pub struct Apdu {
    raw: [u8; APDU_BYTES],
}

impl Apdu {
    pub fn from_pieces(cla: u8, ins: u8, p1: u8, p2: u8, lc: u8, data: &[u8]) -> Result<Self> {
        if data.len() > APDU_DATA_BYTES {
            return Err(Error::InvalidArgument(format!(
                "APDU data must be at most {} bytes, got {}",
                APDU_DATA_BYTES,
                data.len()
            )));
        }
        if usize::from(lc) != data.len() {
            return Err(Error::InvalidArgument(format!(
                "APDU length byte {} does not match {} data bytes",
                lc,
                data.len()
            )));
        }
        let mut raw = [0; APDU_BYTES];
        raw[0] = cla;
        raw[1] = ins;
        raw[2] = p1;
        raw[3] = p2;
        raw[4] = lc;
        raw[APDU_PROPERTY_BYTES..APDU_PROPERTY_BYTES + data.len()].copy_from_slice(data);
        Ok(Apdu { raw })
    }

    /// Return the bytes which would actually go over the wire: the property
    /// bytes plus however much data the length byte declares.
    pub fn raw_minimal(&self) -> &[u8] {
        &self.raw[..APDU_PROPERTY_BYTES + usize::from(self.lc())]
    }

    pub fn cla(&self) -> u8 {
        self.raw[0]
    }

    pub fn ins(&self) -> u8 {
        self.raw[1]
    }

    pub fn p1(&self) -> u8 {
        self.raw[2]
    }

    pub fn p2(&self) -> u8 {
        self.raw[3]
    }

    pub fn lc(&self) -> u8 {
        self.raw[4]
    }

    pub fn data(&self) -> &[u8] {
        &self.raw_minimal()[APDU_PROPERTY_BYTES..]
    }
}

impl fmt::Debug for Apdu {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in self.raw_minimal() {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl PartialEq for Apdu {
    fn eq(&self, other: &Self) -> bool {
        self.raw_minimal() == other.raw_minimal()
    }
}

impl Eq for Apdu {}
