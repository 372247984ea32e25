// Copyright 2024 The ChromiumOS Authors
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

//! Runs bus transactions through an emulated Xilinx Peripheral Protection Unit.

mod scenario;

use std::path::PathBuf;

use anyhow::Context;
use argh::FromArgs;
use log::error;

use crate::scenario::Scenario;

#[derive(FromArgs)]
/// Runs the transactions of a scenario file through an XPPU and prints the outcome as JSON.
struct Args {
    /// path to the scenario file
    #[argh(positional)]
    scenario: PathBuf,
    /// log filter in env_logger syntax (default: warn)
    #[argh(option, default = "String::from(\"warn\")")]
    log_level: String,
    /// include a snapshot of every device on the system bus
    #[argh(switch)]
    snapshot: bool,
}

fn xppu_main(args: Args) -> anyhow::Result<()> {
    let scenario = Scenario::load(&args.scenario)?;
    let outcome = scenario::run(&scenario, args.snapshot)?;
    let json = serde_json::to_string_pretty(&outcome).context("failed to serialize outcome")?;
    println!("{}", json);
    Ok(())
}

fn main() {
    let args: Args = argh::from_env();
    env_logger::Builder::new()
        .parse_filters(&args.log_level)
        .init();

    if let Err(e) = xppu_main(args) {
        error!("{:#}", e);
        std::process::exit(1);
    }
}
