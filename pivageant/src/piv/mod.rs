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

pub mod apdu;
pub mod card;
pub mod hal;
pub mod id;
pub mod pkey;
pub mod sw;
pub mod tlv;

/// The PIV application identifier, selected after connecting to a card.
pub const PIV_AID: [u8; 11] = [
    0xa0, 0x00, 0x00, 0x03, 0x08, 0x00, 0x00, 0x10, 0x00, 0x01, 0x00,
];

/// The data object identifier of the card authentication certificate
/// (NIST SP 800-73 container 5FC101, paired with key reference 9E).
pub const OBJECT_CARD_AUTH_CERTIFICATE: [u8; 3] = [0x5f, 0xc1, 0x01];

/// The P2 value selecting the application PIN for VERIFY.
pub const PIN_BANK_APPLICATION: u8 = 0x80;

/// ATRs of cards known to carry a usable PIV application. Connection
/// attempts ignore cards answering with anything else.
pub const COMPATIBLE_CARD_ATRS: &[&[u8]] = &[
    // YubiKey NEO
    &[
        0x3b, 0xfc, 0x13, 0x00, 0x00, 0x81, 0x31, 0xfe, 0x15, 0x59, 0x75, 0x62, 0x69, 0x6b, 0x65,
        0x79, 0x4e, 0x45, 0x4f, 0x72, 0x33, 0xe1,
    ],
    // YubiKey 4
    &[
        0x3b, 0xf8, 0x13, 0x00, 0x00, 0x81, 0x31, 0xfe, 0x15, 0x59, 0x75, 0x62, 0x69, 0x6b, 0x65,
        0x79, 0x34, 0xd4,
    ],
    // YubiKey 5
    &[
        0x3b, 0xfd, 0x13, 0x00, 0x00, 0x81, 0x31, 0xfe, 0x15, 0x80, 0x73, 0xc0, 0x21, 0xc0, 0x57,
        0x59, 0x75, 0x62, 0x69, 0x4b, 0x65, 0x79, 0x40,
    ],
    // YubiKey 5 over a virtual contactless interface
    &[
        0x12, 0x78, 0xb3, 0x84, 0x00, 0x80, 0x73, 0xc0, 0x21, 0xc0, 0x57, 0x59, 0x75, 0x62, 0x69,
        0x4b, 0x65, 0x79,
    ],
    // Feitian ePass
    &[
        0x3b, 0xdd, 0x18, 0x00, 0x81, 0x91, 0xfe, 0x1f, 0xc3, 0x00, 0x66, 0x46, 0x53, 0x08, 0x03,
        0x00, 0x36, 0x71, 0xdf, 0x00, 0x00, 0x80, 0x97,
    ],
];
