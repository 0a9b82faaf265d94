// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated inverter for trying discovery without hardware

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;

use rust_modbus_discovery::identity::DeviceFamily;
use rust_modbus_discovery::modbus::{serve, SimulatedInverter};

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Address to listen on
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Port to listen on
    #[clap(long, default_value = "5020")]
    port: u16,

    /// Device family to simulate (STRING or HYBRID)
    #[clap(long, default_value = "STRING")]
    model: DeviceFamily,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let socket_addr = format!("{}:{}", args.address, args.port);
    let listener = TcpListener::bind(&socket_addr)
        .await
        .with_context(|| format!("Cannot listen on {}", socket_addr))?;
    info!("Simulating a {} inverter", args.model);

    tokio::select! {
        result = serve(listener, SimulatedInverter::demo(args.model)) => {
            result.context("Simulated inverter stopped")?;
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Shutting down");
        }
    }
    Ok(())
}
