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

use anyhow::{bail, Result};
use clap::Parser;
#[cfg(windows)]
use pivageant::pageant::win::{pageant_running, PageantTransport};
#[cfg(windows)]
use pivageant::piv::card::Card;
#[cfg(windows)]
use pivageant::piv::hal::{PcscHal, PcscHardware};
#[cfg(windows)]
use pivageant::ssh::agent::{read_card_identity, Agent, Ui};
#[cfg(windows)]
use std::time::Duration;
use tracing_subscriber::{filter::LevelFilter, prelude::*, EnvFilter};

/// Keeps the user informed on the console while a signature blocks on the
/// card's touch window.
#[cfg(windows)]
struct ConsoleUi;

#[cfg(windows)]
impl Ui for ConsoleUi {
    fn confirm_user(&mut self, username: &str) {
        println!("Touch the key to sign in as '{}'", username);
    }

    fn finished(&mut self, status: &str) {
        println!("{}", status);
    }
}

#[cfg(windows)]
fn run(cli: Cli) -> Result<()> {
    if pageant_running() {
        bail!("a Pageant window already exists; close the other agent first");
    }

    // The public key is read once, up front; signature requests open their
    // own card session later.
    println!("Waiting for a compatible card ...");
    let mut card: Card<PcscHardware> = Card::new()?;
    card.connect(Duration::from_secs(cli.startup_timeout))?;
    let identity = read_card_identity(&mut card, &cli.comment)?;
    drop(card);

    println!("{}", identity.openssh_line());

    let mut agent = Agent::new(
        identity,
        Box::new(ConsoleUi),
        Duration::from_secs(cli.sign_timeout),
        Box::new(PcscHardware::new),
    );
    let mut transport = PageantTransport::new(Box::new(move |request| agent.process(request)))?;
    println!("Ready, listening for Pageant requests");
    transport.run()?;
    Ok(())
}

#[cfg(not(windows))]
fn run(_cli: Cli) -> Result<()> {
    bail!("the Pageant transport only exists on Windows");
}

#[derive(Parser)]
pub struct Cli {
    #[arg(long, default_value_t = 20)]
    /// How many seconds to wait for a compatible card at startup.
    startup_timeout: u64,

    #[arg(long, default_value_t = 15)]
    /// How many seconds to wait for a compatible card when a signature is
    /// requested.
    sign_timeout: u64,

    #[arg(short = 'c', long, default_value = "ECPSSHKey")]
    /// The comment served alongside the public key.
    comment: String,
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

    run(Cli::parse())
}
