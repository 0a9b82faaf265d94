// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration utilities
//!
//! This module provides utility functions for working with configuration
//! settings, including validation and schema management.

use anyhow::{Context, Result};
use log::{debug, warn};

use super::Config;
use crate::units::convert;

/// JSON schema the YAML configuration is validated against.
pub const CONFIG_SCHEMA: &str = include_str!("../../resources/config.schema.json");

/// Output the embedded JSON schema to the console.
///
/// This function is called when the `--show-config-schema` flag is provided
/// on the command line.
///
/// # Example
///
/// ```bash
/// ./rust_modbus_discovery --show-config-schema > config_schema.json
/// ```
pub fn output_config_schema() -> Result<()> {
    let schema: serde_json::Value =
        serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
    let formatted_schema =
        serde_json::to_string_pretty(&schema).context("Failed to format JSON schema")?;
    println!("{}", formatted_schema);
    Ok(())
}

/// Check if a string looks like a usable device address
///
/// Accepts IPv4/IPv6 literals and DNS-style host names.
pub fn is_valid_host(addr: &str) -> bool {
    if addr.parse::<std::net::IpAddr>().is_ok() {
        return true;
    }
    !addr.is_empty()
        && addr.len() <= 253
        && addr
            .split('.')
            .all(|label| {
                !label.is_empty()
                    && !label.starts_with('-')
                    && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
            })
}

/// Validates the configuration against rules the JSON schema cannot express.
///
/// # Validation Rules
///
/// - **Scan range**: start below end, end at most 65536
/// - **Sampling**: at least one sample per register
/// - **Port**: 1-65535
/// - **Timeout**: strictly positive
/// - **Expected readings**: finite values in a known unit
/// - **Device address**: an IP address or host name (warning only)
pub fn validate_specific_rules(config: &Config) -> Result<()> {
    debug!("Performing additional validation checks");

    config
        .scan
        .options()
        .validate()
        .context("Invalid scan section")?;

    if config.scan.samples < 1 {
        anyhow::bail!("At least one sample per register is required");
    }

    if config.device.port < 1 {
        anyhow::bail!("Invalid port number: {}", config.device.port);
    }

    if config.device.timeout_ms == 0 {
        anyhow::bail!("Request timeout must be greater than zero");
    }

    for (metric_id, reading) in &config.expected {
        if !reading.value.is_finite() {
            anyhow::bail!("Expected reading for {} is not a number", metric_id);
        }
        if let Some(unit) = &reading.unit {
            // Converting to itself only checks the unit is known
            convert(reading.value, unit, unit)
                .with_context(|| format!("Expected reading for {}", metric_id))?;
        }
    }

    if !is_valid_host(&config.device.address) {
        warn!(
            "Potentially invalid device address: {}",
            config.device.address
        );
    }

    Ok(())
}
