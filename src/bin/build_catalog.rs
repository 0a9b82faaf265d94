// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Build a metric catalog from vendor register CSV exports
//!
//! ```bash
//! build_catalog --model STRING=registers-string.csv \
//!     --model HYBRID=registers-hybrid.csv --output catalog.json \
//!     --defaults register-defaults.json
//! ```
//!
//! With `--defaults`, every addressed row of the exports is also written as a
//! per-family register listing.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;

use rust_modbus_discovery::catalog::defaults::RegisterDefaults;
use rust_modbus_discovery::catalog::import::CatalogBuilder;
use rust_modbus_discovery::catalog::Catalog;

#[derive(Parser, Debug)]
#[clap(author, version, about)]
struct Args {
    /// Model key and CSV file as MODEL=path; the first model provides the default registers
    #[clap(long = "model", required = true, value_parser = parse_model)]
    models: Vec<(String, PathBuf)>,

    /// Model whose registers back the fallback entries
    #[clap(long, default_value = "STRING")]
    fallback_model: String,

    /// Output catalog file
    #[clap(short, long, default_value = "modbus-metric-definitions.json")]
    output: PathBuf,

    /// Also write the full per-family register listing to this file
    #[clap(long)]
    defaults: Option<PathBuf>,
}

fn parse_model(text: &str) -> Result<(String, PathBuf), String> {
    let (model, path) = text
        .split_once('=')
        .ok_or_else(|| format!("expected MODEL=path, got '{text}'"))?;
    Ok((model.trim().to_ascii_uppercase(), PathBuf::from(path.trim())))
}

fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    let mut builder = CatalogBuilder::new();
    let mut listing = RegisterDefaults::new();
    for (model, path) in &args.models {
        let contents =
            fs::read_to_string(path).with_context(|| format!("Cannot read {}", path.display()))?;
        builder
            .add_csv(model, contents.as_bytes())
            .with_context(|| format!("Cannot import {}", path.display()))?;
        if args.defaults.is_some() {
            let source = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            listing
                .add_csv(model, &source, contents.as_bytes())
                .with_context(|| format!("Cannot list registers of {}", path.display()))?;
        }
    }

    let catalog_file = builder.build(&args.fallback_model);
    // Refuse to write something the loader would reject.
    let catalog = Catalog::try_from(catalog_file.clone()).context("Generated catalog is invalid")?;

    let json = serde_json::to_string_pretty(&catalog_file).context("Failed to serialize catalog")?;
    fs::write(&args.output, json)
        .with_context(|| format!("Failed to write {}", args.output.display()))?;
    println!("Wrote {} metrics to {}", catalog.len(), args.output.display());

    if let Some(path) = &args.defaults {
        let json =
            serde_json::to_string_pretty(&listing).context("Failed to serialize register listing")?;
        fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
        println!(
            "Wrote register listing for {} models to {}",
            listing.inverter_types.len(),
            path.display()
        );
    }
    Ok(())
}
