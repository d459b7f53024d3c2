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

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use data_encoding::HEXLOWER_PERMISSIVE;
use pivageant::error::Error;
use pivageant::piv;
use pivageant::piv::card::{Card, PinStatus};
use pivageant::piv::hal::PcscHardware;
use pivageant::piv::id::{Algorithm, Key};
use pivageant::piv::pkey;
use pivageant::ssh::wire::encode_identity;
use std::time::Duration;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

/// Management keys tried in order when none is supplied: the PIV standard
/// default, and the all-ASCII "123456781234567812345678" some cards ship
/// with.
const ADMIN_KEY_CANDIDATES: &[&str] = &[
    "010203040506070801020304050607080102030405060708",
    "313233343536373831323334353637383132333435363738",
];

fn connect_card(timeout: u64) -> Result<Card<PcscHardware>> {
    let mut card: Card<PcscHardware> = Card::new()?;
    println!("Waiting for a compatible card ...");
    card.connect(Duration::from_secs(timeout))?;
    Ok(card)
}

fn authenticate_admin(card: &mut Card<PcscHardware>, admin_key: Option<&str>) -> Result<()> {
    let candidates = match admin_key {
        Some(key) => vec![key],
        None => ADMIN_KEY_CANDIDATES.to_vec(),
    };
    let mut attempt = Err(Error::InvalidArgument("no admin key to try".to_owned()));
    for candidate in candidates {
        let key = HEXLOWER_PERMISSIVE
            .decode(candidate.as_bytes())
            .context("the admin key must be hex")?;
        attempt = card.external_auth_admin(Key::CardManagement, Algorithm::TripleDes, &key);
        if attempt.is_ok() {
            break;
        }
    }
    attempt.context("the card refused every admin key; supply one with --admin-key")?;
    Ok(())
}

fn status(timeout: u64) -> Result<()> {
    let mut card = connect_card(timeout)?;

    let capabilities = card.capabilities()?;
    println!(
        "Label: {}",
        capabilities.label.as_deref().unwrap_or("(none)")
    );
    match &capabilities.algorithms {
        Some(algorithms) => {
            let names: Vec<String> = algorithms
                .iter()
                .map(|value| match Algorithm::from_value(*value) {
                    Some(algorithm) => algorithm.to_string(),
                    None => format!("{:#04x}", value),
                })
                .collect();
            println!("Algorithms: {}", names.join(", "));
        }
        None => println!("Algorithms: (not advertised)"),
    }
    println!("Secure messaging: {}", capabilities.secure_messaging);
    println!("Hash on card: {}", capabilities.hash_on_card);
    match &capabilities.yubico {
        Some(yubico) => {
            println!("Yubico firmware: {}", yubico.version);
            match yubico.serial {
                Some(serial) => println!("Serial: {}", serial),
                None => println!("Serial: (not reported)"),
            }
        }
        None => println!("Yubico firmware: (not a Yubico token)"),
    }

    match card.pin_status(piv::PIN_BANK_APPLICATION)? {
        PinStatus::Verified => println!("PIN: verified"),
        PinStatus::Retries(retries) => println!("PIN: {} retries left", retries),
    }

    match card.read_certificate(&piv::OBJECT_CARD_AUTH_CERTIFICATE) {
        Ok(certificate) => {
            let point = pkey::public_point(&certificate)?;
            println!("{}", encode_identity(&point, "ECPSSHKey")?.openssh_line());
        }
        Err(Error::CardStatus(_)) => println!("(no certificate provisioned)"),
        Err(err) => return Err(err.into()),
    }
    Ok(())
}

fn generate(
    timeout: u64,
    algorithm: Algorithm,
    comment: String,
    admin_key: Option<String>,
) -> Result<()> {
    let mut card = connect_card(timeout)?;
    authenticate_admin(&mut card, admin_key.as_deref())?;

    let point = match card.gen_asymmetric(Key::CardAuthentication, algorithm) {
        Err(err @ (Error::CardStatus(_) | Error::InvalidArgument(_)))
            if algorithm == Algorithm::Eccp384 =>
        {
            // Older cards only do P-256.
            println!("ECCP384 unavailable ({}), falling back to ECCP256", err);
            card.gen_asymmetric(Key::CardAuthentication, Algorithm::Eccp256)?
        }
        result => result?,
    };

    let certificate_der = pkey::build_bearer_certificate(&point)?;
    let container = pkey::encode_certificate_container(&certificate_der)?;
    card.put_data(&piv::OBJECT_CARD_AUTH_CERTIFICATE, &container)?;

    // Read back through the same path the agent uses, to prove the stored
    // certificate really serves the key we just generated.
    let certificate = card.read_certificate(&piv::OBJECT_CARD_AUTH_CERTIFICATE)?;
    if pkey::public_point(&certificate)? != point {
        bail!("the stored certificate does not carry the generated key");
    }

    println!("{}", encode_identity(&point, &comment)?.openssh_line());
    Ok(())
}

#[derive(Args)]
struct TimeoutArgs {
    #[arg(short = 't', long, default_value_t = 20)]
    /// How many seconds to wait for a compatible card.
    timeout: u64,
}

#[derive(Subcommand)]
enum Commands {
    /// Show what a connected card advertises and which key it serves.
    Status {
        #[command(flatten)]
        timeout: TimeoutArgs,
    },

    /// Generate a card authentication key and store a certificate carrying
    /// its public half, ready for the agent to serve.
    Generate {
        #[command(flatten)]
        timeout: TimeoutArgs,

        #[arg(short = 'a', long, default_value_t = Algorithm::Eccp384)]
        /// The key generation algorithm: ECCP384, or ECCP256.
        algorithm: Algorithm,

        #[arg(short = 'c', long, default_value = "ECPSSHKey")]
        /// The comment appended to the printed public key.
        comment: String,

        #[arg(long)]
        /// The 24-byte card management key, in hex. Without it, well-known
        /// default keys are tried.
        admin_key: Option<String>,
    },
}

#[derive(Parser)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(
                    if cfg!(debug_assertions) {
                        LevelFilter::DEBUG
                    } else {
                        LevelFilter::WARN
                    }
                    .into(),
                )
                .from_env()
                .unwrap(),
        )
        .init();

    match Cli::parse().command {
        Commands::Status { timeout } => status(timeout.timeout),
        Commands::Generate {
            timeout,
            algorithm,
            comment,
            admin_key,
        } => generate(timeout.timeout, algorithm, comment, admin_key),
    }
}
