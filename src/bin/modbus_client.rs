// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Raw register reader
//!
//! Reads a block of registers and prints it decoded under every supported
//! encoding, which is usually the fastest way to make sense of a single
//! unknown address.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;

use rust_modbus_discovery::catalog::defaults::RegisterDefaults;
use rust_modbus_discovery::registers::{decode, Category, Encoding, ReadFunction};
use rust_modbus_discovery::transport::{DeviceTarget, ModbusTcpTransport, RegisterTransport};

/// Modbus client for reading raw inverter registers
#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Modbus server address
    #[clap(long, default_value = "127.0.0.1")]
    address: String,

    /// Modbus server port
    #[clap(long, default_value = "502")]
    port: u16,

    /// Modbus unit id
    #[clap(long, default_value = "1")]
    unit_id: u8,

    /// First register to read
    #[clap(long, default_value = "5000")]
    register: u16,

    /// Number of registers to read
    #[clap(long, default_value = "4")]
    quantity: u16,

    /// Read holding registers instead of input registers
    #[clap(long)]
    holding: bool,

    /// Scale factor applied after decoding
    #[clap(long, default_value = "1.0")]
    scale: f64,

    /// Request timeout in milliseconds
    #[clap(long, default_value = "1000")]
    timeout_ms: u64,

    /// Register listing written by build_catalog --defaults, used to name the addresses read
    #[clap(long)]
    defaults: Option<PathBuf>,

    /// Only use the listing of this model
    #[clap(long)]
    model: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );

    let args = Args::parse();
    let listing = args
        .defaults
        .as_ref()
        .map(RegisterDefaults::from_file)
        .transpose()
        .context("Cannot load register listing")?;
    let target = DeviceTarget {
        host: args.address,
        port: args.port,
        unit_id: args.unit_id,
    };
    let function = if args.holding {
        ReadFunction::Holding
    } else {
        ReadFunction::Input
    };

    println!("Connecting to Modbus server at {}", target);
    let mut transport = ModbusTcpTransport::connect(&target, Duration::from_millis(args.timeout_ms))
        .await
        .context("Cannot connect")?;

    println!(
        "Reading {} {} registers starting at address {}",
        args.quantity, function, args.register
    );
    let response = transport.read(function, args.register, args.quantity).await;
    transport.close().await;
    let words = response?;

    println!("Raw register values: {:?}", words);
    for (address, word) in (args.register..).zip(words.iter()) {
        println!("Register {}: 0x{:04X} ({})", address, word, word);
        if let Some(listing) = &listing {
            for (model, entry) in listing.labels_at(args.model.as_deref(), function, address) {
                println!(
                    "    {} {} ({}, {} words from {}{})",
                    model,
                    entry.name,
                    entry.data_type,
                    entry.length,
                    entry.address,
                    entry.unit.as_deref().map(|unit| format!(", {unit}")).unwrap_or_default()
                );
            }
        }
    }

    println!("Decoded at {} with scale {}:", args.register, args.scale);
    for encoding in Encoding::ALL {
        match decode(&words, encoding, args.scale) {
            Ok(value) => {
                let plausible: Vec<&str> = [
                    Category::Power,
                    Category::Energy,
                    Category::Voltage,
                    Category::Current,
                    Category::Frequency,
                    Category::Temperature,
                ]
                .into_iter()
                .filter(|category| category.is_plausible(value))
                .map(|category| category.as_str())
                .collect();
                println!("  {:<9} {:>20}  plausible as: {}", encoding.as_str(), value, plausible.join(", "));
            }
            Err(err) => println!("  {:<9} {}", encoding.as_str(), err),
        }
    }

    Ok(())
}
