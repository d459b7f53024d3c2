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

pub const SW_SUCCESS: u16 = 0x9000;

/// The two status bytes which terminate every card response.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct StatusWord {
    value: u16,
}

impl StatusWord {
    pub fn new_from_value(value: u16) -> Self {
        StatusWord { value }
    }

    /// Extract the trailing status word from a raw response of `length`
    /// bytes.
    pub fn new(buffer: &[u8], length: usize) -> Result<Self> {
        if length < 2 || buffer.len() < length {
            return Err(Error::MalformedResponse(
                "card response is shorter than a status word".to_owned(),
            ));
        }
        Ok(Self::new_from_value(
            (u16::from(buffer[length - 2]) << 8) | u16::from(buffer[length - 1]),
        ))
    }

    pub fn value(&self) -> u16 {
        self.value
    }

    pub fn success(&self) -> bool {
        self.value == SW_SUCCESS
    }

    /// The number of response bytes still waiting on the card, if this
    /// status word says there are any. A count of 0 means "256 or more".
    pub fn bytes_remaining(&self) -> Option<usize> {
        match self.value & 0xff00 {
            0x6100 | 0x9f00 => Some(usize::from(self.value as u8)),
            _ => None,
        }
    }

    /// The verification retry counter carried by this status word, if any.
    /// A blocked verification method reports zero retries.
    pub fn retry_counter(&self) -> Option<usize> {
        if self.value & 0xfff0 == 0x63c0 {
            Some(usize::from(self.value as u8 & 0x0f))
        } else if self.value == 0x6983 {
            Some(0)
        } else {
            None
        }
    }

    /// Translate this status word into the error it stands for, if any.
    /// "More bytes remaining" is not an error; callers drain it first.
    pub fn error(&self) -> Result<()> {
        if self.success() || self.bytes_remaining().is_some() {
            Ok(())
        } else if let Some(retries_left) = self.retry_counter() {
            Err(Error::PinRetry { retries_left })
        } else {
            Err(Error::CardStatus(self.value))
        }
    }

    pub fn description(&self) -> &'static str {
        match self.value {
            v if v & 0xff00 == 0x6100 || v & 0xff00 == 0x9f00 => "more response bytes available",
            v if v & 0xfff0 == 0x63c0 => "verification failed, retries remaining",
            0x6700 => "wrong length",
            0x6882 => "secure messaging not supported",
            0x6982 => "security condition not satisfied",
            0x6983 => "authentication method blocked",
            0x6984 => "reference data invalid",
            0x6985 => "conditions of use not satisfied",
            0x6986 => "command not allowed",
            0x6a80 => "incorrect parameter in command data",
            0x6a81 => "function not supported",
            0x6a82 => "file or application not found",
            0x6a84 => "not enough memory space",
            0x6a86 => "incorrect parameters",
            0x6a88 => "referenced data not found",
            0x6d00 => "instruction not supported",
            0x6e00 => "class not supported",
            SW_SUCCESS => "success",
            _ => "unknown status word",
        }
    }
}

impl fmt::Display for StatusWord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#06x} ({})", self.value, self.description())
    }
}
