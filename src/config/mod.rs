// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Configuration management for the discovery tool
//!
//! This module provides functionality for loading, validating, and applying
//! configuration settings. The configuration is backed by a YAML file and
//! validated against a JSON schema for robustness.
//!
//! ## Configuration Structure
//!
//! - `device`: where the inverter is and how long a request may take
//! - `scan`: address range and sampling of the register scan
//! - `catalog`: metric catalog file and fallback device family
//! - `discovery`: answers used when the operator is not prompted
//! - `expected`: operator reference readings keyed by metric id
//! - `output`: register map and report files
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_discovery::config::{Config, ConfigOverrides};
//! use std::path::Path;
//!
//! // Load config from file, creates a default if not found
//! let mut config = Config::from_file(Path::new("config.yaml")).unwrap();
//!
//! // Apply command line overrides if needed
//! config.apply_args(ConfigOverrides {
//!     address: Some("192.168.1.40".to_string()),
//!     scan_start: Some(5000),
//!     scan_end: Some(5100),
//!     ..Default::default()
//! });
//!
//! println!("Scanning {}", config.device.target());
//! ```

pub mod catalog;
pub mod device;
pub mod discovery;
pub mod output;
pub mod scan;
pub mod utils;

use std::collections::BTreeMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use log::{debug, error};
use serde::{Deserialize, Serialize};

pub use catalog::CatalogConfig;
pub use device::DeviceConfig;
pub use discovery::DiscoveryConfig;
pub use output::OutputConfig;
pub use scan::ScanConfig;
pub use utils::{is_valid_host, output_config_schema, CONFIG_SCHEMA};

use crate::identity::DeviceFamily;
use crate::reconcile::ConflictPolicy;
use crate::session::SessionOptions;
use crate::units::ExpectedReading;

/// Root configuration structure.
///
/// Every section falls back to its defaults when missing from the file, so
/// an empty file is a valid configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Settings for the Modbus TCP connection to the inverter.
    #[serde(default)]
    pub device: DeviceConfig,

    /// Settings for the register range scan.
    #[serde(default)]
    pub scan: ScanConfig,

    /// Metric catalog selection.
    #[serde(default)]
    pub catalog: CatalogConfig,

    /// Non-interactive answers to operator questions.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// Reference readings taken from the meter display, keyed by metric id.
    ///
    /// ```yaml
    /// expected:
    ///   meter_power: { value: 1.5, unit: kW }
    ///   grid_import_energy: { value: 1.87, unit: MWh }
    /// ```
    #[serde(default)]
    pub expected: BTreeMap<String, ExpectedReading>,

    /// Output file locations.
    #[serde(default)]
    pub output: OutputConfig,
}

/// Command line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub address: Option<String>,
    pub port: Option<u16>,
    pub unit_id: Option<u8>,
    pub timeout_ms: Option<u64>,
    pub scan_start: Option<u16>,
    pub scan_end: Option<u32>,
    pub samples: Option<usize>,
    pub catalog: Option<PathBuf>,
    pub default_model: Option<DeviceFamily>,
    pub conflict_policy: Option<ConflictPolicy>,
    pub meter_candidate: Option<u16>,
    pub expected: Vec<(String, ExpectedReading)>,
    pub register_map: Option<PathBuf>,
    pub report: Option<PathBuf>,
}

impl Config {
    /// Helper method to create a sample config file when validation fails
    fn create_sample_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let path = path.as_ref();
        let sample_path = path.with_extension("sample.yaml");
        debug!("Original path: {:?}, Sample path: {:?}", path, sample_path);

        if let Some(parent) = sample_path.parent() {
            if !parent.as_os_str().is_empty() && !parent.exists() {
                debug!("Creating parent directory: {:?}", parent);
                fs::create_dir_all(parent).with_context(|| {
                    format!(
                        "Failed to create parent directory for sample config at {:?}",
                        parent
                    )
                })?;
            }
        }

        Self::default()
            .save_to_file(&sample_path)
            .with_context(|| format!("Failed to save sample config to {:?}", sample_path))?;

        error!(
            "Sample configuration file created at {:?}\nPlease edit and rename it",
            sample_path
        );
        Ok(())
    }

    /// Load configuration from a file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            debug!(
                "Configuration file not found at {:?}, creating default",
                path
            );
            let default_config = Self::default();
            default_config.save_to_file(path)?;
            return Ok(default_config);
        }

        debug!("Loading configuration from {:?}", path);
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file at {:?}", path))?;

        // YAML to a generic value, then JSON for schema validation
        let yaml_value: serde_yml::Value = serde_yml::from_str(&contents)
            .with_context(|| format!("Failed to parse YAML configuration from {:?}", path))?;
        let json_value = match yaml_value {
            serde_yml::Value::Null => serde_json::Value::Object(Default::default()),
            other => serde_json::to_value(&other).with_context(|| {
                format!("Failed to convert YAML to JSON for validation: {:?}", path)
            })?,
        };

        let schema: serde_json::Value =
            serde_json::from_str(CONFIG_SCHEMA).context("Failed to parse JSON schema")?;
        let validator = jsonschema::draft202012::options()
            .should_validate_formats(true)
            .build(&schema)?;

        debug!("Validating {} configuration against schema", path.display());
        if let Err(error) = validator.validate(&json_value) {
            error!("Configuration validation error before deserialization");
            Self::create_sample_config(path)?;
            anyhow::bail!("Configuration validation failed: {}", error);
        }

        debug!("Schema validation passed, deserializing into Config structure");
        let config: Config = match serde_json::from_value(json_value) {
            Ok(config) => config,
            Err(err) => {
                error!("Configuration deserialization error: {}", err);
                if let Err(e) = Self::create_sample_config(path) {
                    error!("Failed to create sample config: {}", e);
                }
                return Err(anyhow::anyhow!(
                    "Failed to deserialize configuration from {}: {}",
                    path.display(),
                    err
                ));
            }
        };

        if let Err(err) = utils::validate_specific_rules(&config) {
            error!("Configuration specific validation error: {}", err);
            Self::create_sample_config(path)?;
            return Err(err);
        }

        Ok(config)
    }

    /// Save the configuration to a file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml =
            serde_yml::to_string(self).context("Failed to serialize configuration to YAML")?;

        let mut file = File::create(path.as_ref())
            .with_context(|| format!("Failed to create config file at {:?}", path.as_ref()))?;

        file.write_all(yaml.as_bytes())
            .with_context(|| format!("Failed to write configuration to {:?}", path.as_ref()))?;

        Ok(())
    }

    /// Run the specific rule checks on a configuration built in code.
    pub fn validate(&self) -> Result<()> {
        utils::validate_specific_rules(self)
    }

    /// Apply command line arguments to override configuration values.
    ///
    /// Only values that are explicitly provided override the existing
    /// configuration. Expected readings are merged into the file's map.
    pub fn apply_args(&mut self, overrides: ConfigOverrides) {
        if let Some(address) = overrides.address {
            debug!("Overriding device address from command line: {}", address);
            self.device.address = address;
        }
        if let Some(port) = overrides.port {
            debug!("Overriding device port from command line: {}", port);
            self.device.port = port;
        }
        if let Some(unit_id) = overrides.unit_id {
            debug!("Overriding unit id from command line: {}", unit_id);
            self.device.unit_id = unit_id;
        }
        if let Some(timeout_ms) = overrides.timeout_ms {
            debug!("Overriding request timeout from command line: {} ms", timeout_ms);
            self.device.timeout_ms = timeout_ms;
        }

        if let Some(start) = overrides.scan_start {
            debug!("Overriding scan start from command line: {}", start);
            self.scan.start = start;
        }
        if let Some(end) = overrides.scan_end {
            debug!("Overriding scan end from command line: {}", end);
            self.scan.end = end;
        }
        if let Some(samples) = overrides.samples {
            debug!("Overriding samples per register from command line: {}", samples);
            self.scan.samples = samples;
        }

        if let Some(catalog) = overrides.catalog {
            debug!("Overriding catalog path from command line: {:?}", catalog);
            self.catalog.path = Some(catalog);
        }
        if let Some(model) = overrides.default_model {
            debug!("Overriding default model from command line: {}", model);
            self.catalog.default_model = model;
        }

        if let Some(policy) = overrides.conflict_policy {
            debug!("Overriding conflict policy from command line: {:?}", policy);
            self.discovery.conflict_policy = policy;
        }
        if let Some(register) = overrides.meter_candidate {
            debug!("Overriding meter candidate from command line: {}", register);
            self.discovery.meter_candidate = Some(register);
        }

        for (metric_id, reading) in overrides.expected {
            debug!("Expected reading from command line: {} = {}", metric_id, reading);
            self.expected.insert(metric_id, reading);
        }

        if let Some(path) = overrides.register_map {
            debug!("Overriding register map path from command line: {:?}", path);
            self.output.register_map = path;
        }
        if let Some(path) = overrides.report {
            debug!("Overriding report path from command line: {:?}", path);
            self.output.report = Some(path);
        }
    }

    /// Session parameters described by this configuration.
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            target: self.device.target(),
            timeout: self.device.timeout(),
            scan: self.scan.options(),
            default_family: self.catalog.default_model,
            expected: self.expected.clone(),
        }
    }
}
