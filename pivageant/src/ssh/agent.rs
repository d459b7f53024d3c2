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
use crate::piv;
use crate::piv::card::Card;
use crate::piv::hal::PcscHal;
use crate::piv::id::{Algorithm, Key};
use crate::piv::pkey;
use crate::ssh::wire::{self, Curve, Identity};
use log::{debug, warn};
use std::time::Duration;

pub const SSH_AGENT_FAILURE: u8 = 5;
pub const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
pub const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
pub const SSH_AGENTC_SIGN_REQUEST: u8 = 13;
pub const SSH_AGENT_SIGN_RESPONSE: u8 = 14;

/// User-facing notifications emitted while a signature is in flight. The
/// card blocks for the whole touch window, so these are the user's only
/// feedback.
pub trait Ui {
    /// A signature for `username` was requested and the card is about to be
    /// asked for it.
    fn confirm_user(&mut self, username: &str);

    /// The signature attempt ended, successfully or not.
    fn finished(&mut self, status: &str);
}

/// Builds a fresh HAL for each signature, so every request gets its own card
/// connection.
pub type HalFactory<T> = Box<dyn FnMut() -> Result<T>>;

/// An SSH agent serving exactly one identity: the key behind the card
/// authentication certificate of whatever compatible card shows up.
pub struct Agent<T: PcscHal> {
    identity: Identity,
    ui: Box<dyn Ui>,
    card_timeout: Duration,
    hal_factory: HalFactory<T>,
}

impl<T: PcscHal> Agent<T> {
    pub fn new(
        identity: Identity,
        ui: Box<dyn Ui>,
        card_timeout: Duration,
        hal_factory: HalFactory<T>,
    ) -> Self {
        Agent {
            identity,
            ui,
            card_timeout,
            hal_factory,
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Handle one unframed agent request, producing the unframed reply. Any
    /// failure becomes the protocol's one-byte failure message.
    pub fn process(&mut self, request: &[u8]) -> Vec<u8> {
        let result = match request.first() {
            Some(&SSH_AGENTC_REQUEST_IDENTITIES) => self.list_identities(),
            Some(&SSH_AGENTC_SIGN_REQUEST) => self.sign(&request[1..]),
            Some(&operation) => Err(Error::MalformedRequest(format!(
                "unsupported agent operation {}",
                operation
            ))),
            None => Err(Error::MalformedRequest("empty agent request".to_owned())),
        };
        match result {
            Ok(reply) => reply,
            Err(err) => {
                warn!("agent request failed: {}", err);
                vec![SSH_AGENT_FAILURE]
            }
        }
    }

    fn list_identities(&self) -> Result<Vec<u8>> {
        debug!("answering identity listing with {}", self.identity.comment());
        let mut reply = vec![SSH_AGENT_IDENTITIES_ANSWER];
        reply.extend_from_slice(&1_u32.to_be_bytes());
        reply.extend(self.identity.wire());
        Ok(reply)
    }

    fn sign(&mut self, body: &[u8]) -> Result<Vec<u8>> {
        let (_, data) = wire::parse_signature_request(body)?;
        let auth = wire::parse_auth_signature_payload(data)?;

        // The claimed key must be ours before the card is touched at all.
        let mut expected = wire::pack(self.identity.key_type().as_bytes());
        expected.extend(wire::pack(self.identity.blob()));
        if auth.claimed_key != expected.as_slice() {
            return Err(Error::MismatchedKey);
        }

        self.ui.confirm_user(auth.username);
        let result = self.sign_with_card(data);
        match &result {
            Ok(_) => self.ui.finished("Signed OK"),
            Err(Error::CardStatus(0x6982)) => self.ui.finished("Not approved in time"),
            Err(_) => self.ui.finished("Signing failed"),
        }
        result
    }

    fn sign_with_card(&mut self, data: &[u8]) -> Result<Vec<u8>> {
        let mut card = Card::new_with_hal((self.hal_factory)()?);
        card.connect(self.card_timeout)?;

        let algorithm = match self.identity.curve() {
            Curve::P256 => Algorithm::Eccp256,
            Curve::P384 => Algorithm::Eccp384,
        };
        let der = card.sign_ec(algorithm, Key::CardAuthentication, data)?;
        let (r, s) = wire::decode_der_signature(&der)?;

        let mut rs = wire::pack(&r);
        rs.extend(wire::pack(&s));
        let mut signature = wire::pack(self.identity.key_type().as_bytes());
        signature.extend(wire::pack(&rs));

        let mut reply = vec![SSH_AGENT_SIGN_RESPONSE];
        reply.extend(wire::pack(&signature));
        Ok(reply)
    }
}

/// Read the identity a connected card serves: the public point of its card
/// authentication certificate, under the given comment.
pub fn read_card_identity<T: PcscHal>(card: &mut Card<T>, comment: &str) -> Result<Identity> {
    let certificate = card.read_certificate(&piv::OBJECT_CARD_AUTH_CERTIFICATE)?;
    let point = pkey::public_point(&certificate)?;
    wire::encode_identity(&point, comment)
}
