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
use openssl::symm::{Cipher, Crypter, Mode};

/// Administrative keys are 3DES keys: three 8-byte DES keys concatenated.
pub const ADMIN_KEY_BYTES: usize = 24;
/// Mutual authentication challenges are a single DES block.
pub const DES_CHALLENGE_BYTES: usize = 8;

fn des_challenge(mode: Mode, key: &[u8], challenge: &[u8]) -> Result<Vec<u8>> {
    if key.len() != ADMIN_KEY_BYTES {
        return Err(Error::InvalidArgument(format!(
            "expected a {}-byte administrative key, got {} bytes",
            ADMIN_KEY_BYTES,
            key.len()
        )));
    }
    if challenge.len() != DES_CHALLENGE_BYTES {
        return Err(Error::InvalidArgument(format!(
            "expected a {}-byte challenge, got {} bytes",
            DES_CHALLENGE_BYTES,
            challenge.len()
        )));
    }

    let mut crypter = Crypter::new(Cipher::des_ede3(), mode, key, None)?;
    crypter.pad(false);
    // The output buffer must leave room for one extra block, even though an
    // unpadded single-block operation never uses it.
    let mut output = vec![0; DES_CHALLENGE_BYTES * 2];
    let mut count = crypter.update(challenge, &mut output)?;
    count += crypter.finalize(&mut output[count..])?;
    output.truncate(count);
    Ok(output)
}

/// Encrypt a single challenge block with the given administrative key, as
/// used to answer a GENERAL AUTHENTICATE witness.
pub fn encrypt_des_challenge(key: &[u8], challenge: &[u8]) -> Result<Vec<u8>> {
    des_challenge(Mode::Encrypt, key, challenge)
}

/// Decrypt a single challenge block with the given administrative key.
pub fn decrypt_des_challenge(key: &[u8], challenge: &[u8]) -> Result<Vec<u8>> {
    des_challenge(Mode::Decrypt, key, challenge)
}
