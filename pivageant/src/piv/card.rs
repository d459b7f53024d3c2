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

use crate::crypto;
use crate::error::{Error, Result};
use crate::piv::hal::PcscHal;
use crate::piv::id::{Algorithm, Instruction, Key};
use crate::piv::pkey;
use crate::piv::tlv::{self, Value};
use crate::piv::{COMPATIBLE_CARD_ATRS, PIV_AID};
use data_encoding::HEXLOWER;
use log::debug;
use openssl::hash::{hash, MessageDigest};
use openssl::x509::X509;
use std::fmt;
use std::str;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// How long to wait between reader scans while discovering a card.
pub const DISCOVERY_POLL_INTERVAL: Duration = Duration::from_millis(250);

const TAG_APPLICATION_PROPERTY: u16 = 0x61;
const TAG_APPLICATION_LABEL: u16 = 0x50;
const TAG_ALGORITHM_CAPABILITY: u16 = 0xac;
const TAG_ALGORITHM_IDENTIFIER: u16 = 0x80;
const TAG_DYNAMIC_AUTHENTICATION: u16 = 0x7c;
const TAG_AUTH_RESPONSE: u16 = 0x82;
const TAG_PUBLIC_POINT: u16 = 0x86;

/// A firmware version reported by a Yubico token.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct Version(pub u8, pub u8, pub u8);

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.0, self.1, self.2)
    }
}

/// Vendor details reported by cards which answer the Yubico extension
/// instructions.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct YubicoInfo {
    pub version: Version,
    pub serial: Option<u32>,
}

/// What a connected card told us about itself during SELECT, plus the
/// results of the vendor probes.
#[derive(Clone, Debug)]
pub struct Capabilities {
    /// The card's application label, if it advertises one.
    pub label: Option<String>,
    /// The raw algorithm identifiers the card advertises, or None if the
    /// card predates the algorithm capability list.
    pub algorithms: Option<Vec<u8>>,
    /// Whether the card advertises a secure messaging cipher suite.
    pub secure_messaging: bool,
    /// Whether EC signing operations must hand the card the whole message
    /// instead of a digest.
    pub hash_on_card: bool,
    /// Whether generated keys should require a touch confirmation for every
    /// private key operation.
    pub touch_prompt: bool,
    pub yubico: Option<YubicoInfo>,
}

/// The card's knowledge of a PIN's verification state.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum PinStatus {
    /// The PIN has already been verified for this session.
    Verified,
    /// The PIN is unverified, with this many attempts left. Zero means the
    /// PIN is blocked.
    Retries(usize),
}

/// A session with a PIV card, built on any [PcscHal] implementation.
pub struct Card<T: PcscHal> {
    hal: T,
    capabilities: Option<Capabilities>,
}

impl<T: PcscHal> Card<T> {
    pub fn new() -> Result<Self> {
        Ok(Card {
            hal: T::new()?,
            capabilities: None,
        })
    }

    pub fn new_with_hal(hal: T) -> Self {
        Card {
            hal,
            capabilities: None,
        }
    }

    /// The capabilities discovered at connect time. Fails if the session is
    /// not connected.
    pub fn capabilities(&self) -> Result<&Capabilities> {
        self.capabilities
            .as_ref()
            .ok_or_else(|| Error::Internal("card session is not connected".to_owned()))
    }

    /// Override whether key generation asks the card for a touch-confirmed
    /// key.
    pub fn set_touch_prompt(&mut self, enabled: bool) -> Result<()> {
        self.capabilities
            .as_mut()
            .ok_or_else(|| Error::Internal("card session is not connected".to_owned()))?
            .touch_prompt = enabled;
        Ok(())
    }

    /// Wait up to `timeout` for a compatible card to show up in any reader,
    /// then select the PIV application and probe the card's capabilities.
    /// Readers are rescanned every [DISCOVERY_POLL_INTERVAL]; each pass scans
    /// at least once, so a zero timeout means "try each reader once, now".
    pub fn connect(&mut self, timeout: Duration) -> Result<()> {
        self.connect_cancellable(timeout, &AtomicBool::new(false))
    }

    /// As [Card::connect], but gives up early (with the same timeout error)
    /// once `cancel` becomes true.
    pub fn connect_cancellable(&mut self, timeout: Duration, cancel: &AtomicBool) -> Result<()> {
        let start = Instant::now();
        loop {
            if self.find_compatible_card()? {
                break;
            }
            if cancel.load(Ordering::Relaxed) || start.elapsed() >= timeout {
                return Err(Error::DeviceTimeout(timeout));
            }
            thread::sleep(DISCOVERY_POLL_INTERVAL);
        }

        let select = self.select_application()?;
        let mut capabilities = capabilities_from_select(&select)?;
        capabilities.yubico = self.probe_yubico()?;
        capabilities.touch_prompt = capabilities.yubico.is_some();
        debug!(
            "connected to '{}' (algorithms {:?}, secure messaging {}, hash on card {})",
            capabilities.label.as_deref().unwrap_or("unlabeled card"),
            capabilities.algorithms,
            capabilities.secure_messaging,
            capabilities.hash_on_card
        );
        self.capabilities = Some(capabilities);
        Ok(())
    }

    fn find_compatible_card(&mut self) -> Result<bool> {
        for reader in self.hal.list_readers()? {
            if let Err(err) = self.hal.connect_impl(&reader) {
                debug!("skipping reader '{}': {}", reader, err);
                continue;
            }
            let atr = match self.hal.atr() {
                Ok(atr) => atr,
                Err(err) => {
                    debug!("skipping reader '{}': {}", reader, err);
                    self.hal.disconnect();
                    continue;
                }
            };
            if COMPATIBLE_CARD_ATRS
                .iter()
                .any(|compatible| *compatible == atr.as_slice())
            {
                debug!("found a compatible card in reader '{}'", reader);
                return Ok(true);
            }
            debug!(
                "ignoring incompatible card in reader '{}' (ATR {})",
                reader,
                HEXLOWER.encode(&atr)
            );
            self.hal.disconnect();
        }
        Ok(false)
    }

    fn select_application(&self) -> Result<Vec<u8>> {
        self.hal.send_command(
            &[0x00, Instruction::Select.to_value(), 0x04, 0x00],
            &PIV_AID,
        )
    }

    /// Ask for the Yubico firmware version and, on generation 5 and later,
    /// the serial number. Cards which reject the version instruction are
    /// simply not Yubico tokens.
    fn probe_yubico(&self) -> Result<Option<YubicoInfo>> {
        let version = match self.hal.send_command(
            &[0x00, Instruction::GetVersion.to_value(), 0x00, 0x00],
            &[],
        ) {
            Ok(data) => {
                if data.len() < 3 {
                    return Err(Error::MalformedResponse(
                        "version response is shorter than three bytes".to_owned(),
                    ));
                }
                Version(data[0], data[1], data[2])
            }
            Err(Error::CardStatus(sw)) => {
                debug!("card rejected the version probe ({:#06x})", sw);
                return Ok(None);
            }
            Err(err) => return Err(err),
        };

        let serial = if version.0 >= 5 {
            match self.hal.send_command(
                &[0x00, Instruction::GetSerial.to_value(), 0x00, 0x00],
                &[],
            ) {
                Ok(data) if data.len() >= 4 => {
                    Some(u32::from_be_bytes([data[0], data[1], data[2], data[3]]))
                }
                Ok(_) => None,
                Err(Error::CardStatus(sw)) => {
                    debug!("card rejected the serial probe ({:#06x})", sw);
                    None
                }
                Err(err) => return Err(err),
            }
        } else {
            None
        };

        Ok(Some(YubicoInfo { version, serial }))
    }

    fn check_algorithm(&self, algorithm: Algorithm) -> Result<()> {
        if let Some(algorithms) = self.capabilities()?.algorithms.as_ref() {
            if !algorithms.contains(&algorithm.to_value()) {
                return Err(Error::InvalidArgument(format!(
                    "the card does not advertise algorithm {}",
                    algorithm
                )));
            }
        }
        Ok(())
    }

    /// Authenticate to the card with an administrative key, via the witness
    /// flow of GENERAL AUTHENTICATE: the card produces a challenge block,
    /// and we answer with its encryption under the shared key.
    pub fn external_auth_admin(
        &mut self,
        key: Key,
        algorithm: Algorithm,
        admin_key: &[u8],
    ) -> Result<()> {
        self.check_algorithm(algorithm)?;
        if admin_key.len() != crypto::ADMIN_KEY_BYTES {
            return Err(Error::InvalidArgument(format!(
                "expected a {}-byte administrative key, got {} bytes",
                crypto::ADMIN_KEY_BYTES,
                admin_key.len()
            )));
        }
        let templ = [
            0x00,
            Instruction::GeneralAuthenticate.to_value(),
            algorithm.to_value(),
            key.to_value(),
        ];

        // An empty 81 inside the dynamic authentication template asks the
        // card to produce a witness challenge.
        let witness = self.hal.send_command(&templ, &[0x7c, 0x02, 0x81, 0x00])?;
        if witness.len() != 12 || witness[..4] != [0x7c, 0x0a, 0x81, 0x08] {
            return Err(Error::MalformedResponse(
                "unexpected witness envelope from GENERAL AUTHENTICATE".to_owned(),
            ));
        }

        let encrypted = crypto::encrypt_des_challenge(admin_key, &witness[4..12])?;
        let mut inner = vec![0x82];
        inner.extend(tlv::encode_do(&encrypted)?);
        let mut data = vec![0x7c];
        data.extend(tlv::encode_do(&inner)?);
        self.hal.send_command(&templ, &data)?;
        Ok(())
    }

    /// Generate a fresh EC key pair in the given slot, returning the public
    /// point. When the capabilities call for a touch prompt, the generated
    /// key is marked to require touch confirmation on every use.
    pub fn gen_asymmetric(&mut self, key: Key, algorithm: Algorithm) -> Result<Vec<u8>> {
        self.check_algorithm(algorithm)?;
        if !algorithm.is_ecc() {
            return Err(Error::InvalidArgument(format!(
                "key generation supports EC algorithms only, not {}",
                algorithm
            )));
        }

        let mut data = vec![0xac, 0x03, 0x80, 0x01, algorithm.to_value()];
        if self.capabilities()?.touch_prompt {
            data[1] = 0x06;
            data.extend_from_slice(&[0xab, 0x01, 0x02]);
        }
        let response = self.hal.send_command(
            &[
                0x00,
                Instruction::GenerateAsymmetric.to_value(),
                0x00,
                key.to_value(),
            ],
            &data,
        )?;

        if response.len() < 3
            || response[..2] != [0x7f, 0x49]
            || response.len() != usize::from(response[2]) + 3
        {
            return Err(Error::MalformedResponse(
                "unexpected envelope from GENERATE ASYMMETRIC KEY PAIR".to_owned(),
            ));
        }
        let dol = tlv::decode_dol(&response[3..])?;
        Ok(tlv::required_single(&dol, TAG_PUBLIC_POINT)?.to_vec())
    }

    /// Sign `message` with the EC key in the given slot, returning the DER
    /// signature the card produced. On ordinary cards the message is hashed
    /// here and the digest signed; cards which hash on-card get the whole
    /// message under the matching vendor algorithm identifier.
    pub fn sign_ec(&mut self, algorithm: Algorithm, key: Key, message: &[u8]) -> Result<Vec<u8>> {
        self.check_algorithm(algorithm)?;
        let (digest, hash_on_card_algorithm) = match algorithm {
            Algorithm::Eccp256 => (MessageDigest::sha256(), Algorithm::Eccp256Sha256),
            Algorithm::Eccp384 => (MessageDigest::sha384(), Algorithm::Eccp384Sha384),
            _ => {
                return Err(Error::InvalidArgument(format!(
                    "EC signing supports EC algorithms only, not {}",
                    algorithm
                )))
            }
        };
        let (wire_algorithm, challenge) = if self.capabilities()?.hash_on_card {
            (hash_on_card_algorithm.to_value(), message.to_vec())
        } else {
            (algorithm.to_value(), hash(digest, message)?.to_vec())
        };

        // The template pairs an empty 82 (where the card will answer) with
        // an 81 holding the challenge.
        let mut inner = vec![0x82, 0x00, 0x81];
        inner.extend(tlv::encode_do(&challenge)?);
        let mut data = vec![0x7c];
        data.extend(tlv::encode_do(&inner)?);

        let response = self.hal.send_command(
            &[
                0x00,
                Instruction::GeneralAuthenticate.to_value(),
                wire_algorithm,
                key.to_value(),
            ],
            &data,
        )?;
        let dol = tlv::decode_dol(&response)?;
        let auth = tlv::required_nested(&dol, TAG_DYNAMIC_AUTHENTICATION)?;
        Ok(tlv::required_single(auth, TAG_AUTH_RESPONSE)?.to_vec())
    }

    /// Read a data object. Identifiers are one or three bytes; the response
    /// arrives wrapped in a 53 (for three-byte identifiers) or echoed under
    /// its own tag, and is returned unwrapped.
    pub fn get_data(&mut self, id: &[u8]) -> Result<Vec<u8>> {
        if id.len() != 1 && id.len() != 3 {
            return Err(Error::InvalidArgument(format!(
                "data object identifiers are 1 or 3 bytes, got {}",
                id.len()
            )));
        }
        let mut data = vec![0x5c, id.len() as u8];
        data.extend_from_slice(id);
        let response = self
            .hal
            .send_command(&[0x00, Instruction::GetData.to_value(), 0x3f, 0xff], &data)?;

        let (tag, _, value) = tlv::decode_do(&response, 0)?;
        let expected = if id.len() == 3 { 0x53 } else { u16::from(id[0]) };
        if tag != expected {
            return Err(Error::MalformedResponse(format!(
                "GET DATA answered with tag {:#x}, expected {:#x}",
                tag, expected
            )));
        }
        Ok(value.to_vec())
    }

    /// Write a data object, wrapping the contents in the 53 the card
    /// expects.
    pub fn put_data(&mut self, id: &[u8], contents: &[u8]) -> Result<()> {
        if id.len() != 3 {
            return Err(Error::InvalidArgument(format!(
                "data object identifiers are 3 bytes, got {}",
                id.len()
            )));
        }
        let mut data = vec![0x5c, id.len() as u8];
        data.extend_from_slice(id);
        data.push(0x53);
        data.extend(tlv::encode_do(contents)?);
        self.hal
            .send_command(&[0x00, Instruction::PutData.to_value(), 0x3f, 0xff], &data)?;
        Ok(())
    }

    /// Verify a PIN against the given bank. An empty PIN only probes the
    /// bank's state, which the card answers with a retry-counter status.
    pub fn verify_pin(&mut self, bank: u8, pin: &str) -> Result<()> {
        let templ = [0x00, Instruction::Verify.to_value(), 0x00, bank];
        if pin.is_empty() {
            self.hal.send_command(&templ, &[])?;
            return Ok(());
        }
        if pin.len() > 8 || !pin.is_ascii() {
            return Err(Error::InvalidArgument(
                "PINs are at most 8 ASCII characters".to_owned(),
            ));
        }
        let mut data = [0xff_u8; 8];
        data[..pin.len()].copy_from_slice(pin.as_bytes());
        self.hal.send_command(&templ, &data)?;
        Ok(())
    }

    /// Probe the verification state of a PIN bank without spending a retry.
    pub fn pin_status(&mut self, bank: u8) -> Result<PinStatus> {
        match self.verify_pin(bank, "") {
            Ok(()) => Ok(PinStatus::Verified),
            Err(Error::PinRetry { retries_left }) => Ok(PinStatus::Retries(retries_left)),
            Err(err) => Err(err),
        }
    }

    /// Read and parse the certificate stored in the given data object.
    pub fn read_certificate(&mut self, id: &[u8]) -> Result<X509> {
        let container = self.get_data(id)?;
        pkey::certificate_from_container(&container)
    }

    /// Drop the card connection. Safe to call repeatedly; the session can be
    /// connected again afterwards.
    pub fn disconnect(&mut self) {
        self.hal.disconnect();
        self.capabilities = None;
    }
}

impl<T: PcscHal> Drop for Card<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn algorithm_id_byte(id: &[u8]) -> Result<u8> {
    id.first()
        .copied()
        .ok_or_else(|| Error::MalformedResponse("empty algorithm identifier".to_owned()))
}

fn capabilities_from_select(select: &[u8]) -> Result<Capabilities> {
    let dol = tlv::decode_dol(select)?;
    let property = tlv::required_nested(&dol, TAG_APPLICATION_PROPERTY)?;

    let label = match tlv::single(property, TAG_APPLICATION_LABEL) {
        Some(bytes) => Some(str::from_utf8(bytes)?.to_owned()),
        None => None,
    };

    let algorithms = match property.get(&TAG_ALGORITHM_CAPABILITY) {
        None => None,
        Some(Value::Nested(capability)) => {
            let mut values = Vec::new();
            match capability.get(&TAG_ALGORITHM_IDENTIFIER) {
                None => (),
                Some(Value::Single(id)) => values.push(algorithm_id_byte(id)?),
                Some(Value::Repeated(ids)) => {
                    for id in ids {
                        values.push(algorithm_id_byte(id)?);
                    }
                }
                Some(Value::Nested(_)) => {
                    return Err(Error::MalformedResponse(
                        "algorithm identifiers are not primitive".to_owned(),
                    ))
                }
            }
            Some(values)
        }
        Some(_) => {
            return Err(Error::MalformedResponse(
                "algorithm capability is not constructed".to_owned(),
            ))
        }
    };

    let secure_messaging = algorithms.as_ref().map_or(false, |algorithms| {
        algorithms.contains(&Algorithm::CipherSuite2.to_value())
            || algorithms.contains(&Algorithm::CipherSuite7.to_value())
    });
    let hash_on_card = algorithms.as_ref().map_or(false, |algorithms| {
        algorithms.contains(&Algorithm::Eccp256Sha256.to_value())
    });

    Ok(Capabilities {
        label,
        algorithms,
        secure_messaging,
        hash_on_card,
        touch_prompt: false,
        yubico: None,
    })
}
