// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2026-present Datadog, Inc.

use clap::Parser;
use dd_supervise::{cli, execute};
use log::{error, info};

#[tokio::main]
async fn main() {
    let args = cli::Args::parse();
    let level = if args.debug {
        log::Level::Debug
    } else {
        log::Level::Info
    };
    if let Err(e) = simple_logger::init_with_level(level) {
        eprintln!("failed to initialize logging: {e}");
        std::process::exit(1);
    }
    info!(
        "dd-supervise starting (version {})",
        env!("CARGO_PKG_VERSION")
    );

    let options = match args.into_options() {
        Ok(options) => options,
        Err(e) => {
            error!("invalid options: {e:#}");
            std::process::exit(1);
        }
    };

    match execute::execute(&options).await {
        Ok(code) => {
            info!("dd-supervise finished with code {code}");
            std::process::exit(code);
        }
        Err(e) => {
            error!("{e:#}");
            std::process::exit(1);
        }
    }
}
