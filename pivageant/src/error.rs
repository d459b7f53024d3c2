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

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The card answered with a non-success status word that has no more
    /// specific mapping.
    #[error("card returned status word {0:#06x}")]
    CardStatus(u16),
    #[error("reader subsystem failure: {0}")]
    ConnectionFailure(String),
    #[error("no compatible card found within {0:?}")]
    DeviceTimeout(std::time::Duration),
    #[error("internal error: {0}")]
    Internal(String),
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    #[error("malformed authentication payload: {0}")]
    MalformedAuthPayload(String),
    #[error("malformed agent request: {0}")]
    MalformedRequest(String),
    #[error("malformed card response: {0}")]
    MalformedResponse(String),
    #[error("malformed signature: {0}")]
    MalformedSignature(String),
    #[error("malformed data object: {0}")]
    MalformedTlv(String),
    /// A signature was requested for some key other than the one the card
    /// holds.
    #[error("signature request does not match the card's identity")]
    MismatchedKey,
    #[error("NUL error: {0}")]
    Nul(#[from] std::ffi::NulError),
    #[error("request of {0} bytes exceeds the transport segment")]
    OversizedRequest(usize),
    #[error("wrong PIN, {retries_left} retries remaining")]
    PinRetry { retries_left: usize },
    #[cfg(windows)]
    #[error("platform error: {0}")]
    Platform(#[from] windows::core::Error),
    #[error("SSL error: {0}")]
    Ssl(#[from] openssl::error::ErrorStack),
    #[error("unsupported public key of {0} bytes")]
    UnsupportedKeyLength(usize),
    #[error("UTF-8 decoding error: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    #[error("value of {0} bytes is too large to encode")]
    ValueTooLarge(usize),
}

pub type Result<T> = std::result::Result<T, Error>;
