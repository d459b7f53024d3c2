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
use crate::piv::tlv;
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, BigNumContext, MsbOption};
use openssl::ec::{Asn1Flag, EcGroup, EcKey, EcPoint, PointConversionForm};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::PKey;
use openssl::x509::{X509Builder, X509NameBuilder, X509};

/// The byte length of an uncompressed P-256 public point.
pub const P256_POINT_BYTES: usize = 65;
/// The byte length of an uncompressed P-384 public point.
pub const P384_POINT_BYTES: usize = 97;

const TAG_CERTIFICATE: u8 = 0x70;
const TAG_CERT_INFO: u8 = 0x71;
const TAG_ERROR_DETECTION: u8 = 0xfe;

const BEARER_VALIDITY_DAYS: u32 = 3650;
const SERIAL_BITS: i32 = 64;

fn group_for_point(point: &[u8]) -> Result<EcGroup> {
    let nid = match point.len() {
        P256_POINT_BYTES => Nid::X9_62_PRIME256V1,
        P384_POINT_BYTES => Nid::SECP384R1,
        len => return Err(Error::UnsupportedKeyLength(len)),
    };
    let mut group = EcGroup::from_curve_name(nid)?;
    group.set_asn1_flag(Asn1Flag::NAMED_CURVE);
    Ok(group)
}

/// Parse the certificate out of a PIV certificate data object. The DER
/// certificate sits under the leading 70; the trailing info and error
/// detection objects are ignored.
pub fn certificate_from_container(container: &[u8]) -> Result<X509> {
    let (tag, _, value) = tlv::decode_do(container, 0)?;
    if tag != u16::from(TAG_CERTIFICATE) {
        return Err(Error::MalformedResponse(format!(
            "certificate container starts with tag {:#x}, expected {:#x}",
            tag, TAG_CERTIFICATE
        )));
    }
    Ok(X509::from_der(value)?)
}

/// Extract a certificate's EC public key as an uncompressed point.
pub fn public_point(certificate: &X509) -> Result<Vec<u8>> {
    let public_key = certificate.public_key()?;
    let ec_key = public_key.ec_key()?;
    let mut ctx = BigNumContext::new()?;
    Ok(ec_key
        .public_key()
        .to_bytes(ec_key.group(), PointConversionForm::UNCOMPRESSED, &mut ctx)?)
}

/// Build a minimal DER certificate which does nothing but carry the given
/// public point, for storage in a certificate data object. Nothing ever
/// verifies the signature, so a throwaway freshly generated key signs it.
pub fn build_bearer_certificate(point: &[u8]) -> Result<Vec<u8>> {
    let group = group_for_point(point)?;
    let mut ctx = BigNumContext::new()?;
    let ec_point = EcPoint::from_bytes(&group, point, &mut ctx)?;
    let public_key = PKey::from_ec_key(EcKey::from_public_key(&group, &ec_point)?)?;

    let mut name = X509NameBuilder::new()?;
    name.append_entry_by_text("CN", "SSH")?;
    let name = name.build();

    let mut serial = BigNum::new()?;
    serial.rand(SERIAL_BITS, MsbOption::MAYBE_ZERO, false)?;

    let mut builder = X509Builder::new()?;
    builder.set_version(2)?;
    builder.set_serial_number(&*serial.to_asn1_integer()?)?;
    builder.set_subject_name(&name)?;
    builder.set_issuer_name(&name)?;
    builder.set_not_before(&*Asn1Time::days_from_now(0)?)?;
    builder.set_not_after(&*Asn1Time::days_from_now(BEARER_VALIDITY_DAYS)?)?;
    builder.set_pubkey(&public_key)?;

    let signer = PKey::from_ec_key(EcKey::generate(&*EcGroup::from_curve_name(
        Nid::X9_62_PRIME256V1,
    )?)?)?;
    builder.sign(&signer, MessageDigest::sha256())?;
    Ok(builder.build().to_der()?)
}

/// Wrap a DER certificate in the PIV certificate container layout: the
/// certificate itself, an uncompressed cert info byte, and an empty error
/// detection object.
pub fn encode_certificate_container(certificate_der: &[u8]) -> Result<Vec<u8>> {
    let mut container = Vec::with_capacity(certificate_der.len() + 10);
    container.push(TAG_CERTIFICATE);
    container.extend(tlv::encode_do(certificate_der)?);
    container.push(TAG_CERT_INFO);
    container.extend(tlv::encode_do(&[0x00])?);
    container.push(TAG_ERROR_DETECTION);
    container.extend(tlv::encode_do(&[])?);
    Ok(container)
}
