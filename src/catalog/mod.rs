// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Static metric catalog
//!
//! The catalog maps a metric identifier to the register that holds it on each
//! known device family, the way to decode it and its semantic category. It is
//! loaded once, validated, and read-only afterwards.
//!
//! ## File format
//!
//! ```json
//! {
//!   "version": 1,
//!   "metrics": [
//!     {
//!       "id": "meter_power",
//!       "name": "Meter Power",
//!       "unit": "W",
//!       "category": "power",
//!       "default": { "register": 5600 },
//!       "models": { "STRING": { "register": 5600 } },
//!       "read": { "function": "input", "words": 1, "type": "int16", "scale": 1 },
//!       "discovery": { "method": "power", "input_unit": "kW" }
//!     }
//!   ]
//! }
//! ```

pub mod defaults;
pub mod import;

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;
use crate::registers::{Category, Encoding, ReadFunction, ReadSpec};

/// Catalog format version this crate reads and writes.
pub const CATALOG_VERSION: u32 = 1;

const BUILTIN_CATALOG: &str = include_str!("../../resources/modbus-metric-definitions.json");

/// On-disk catalog document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogFile {
    pub version: u32,
    pub metrics: Vec<MetricRecord>,
}

/// One metric as written in the catalog file, before validation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricRecord {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub default: RegisterRef,
    #[serde(default)]
    pub models: BTreeMap<String, RegisterRef>,
    pub read: ReadRecord,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery: Option<DiscoveryHint>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RegisterRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub register: Option<u16>,
}

/// Read specification with the encoding still as a raw tag.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadRecord {
    pub function: ReadFunction,
    pub words: u16,
    #[serde(rename = "type")]
    pub encoding: String,
    #[serde(default = "default_scale")]
    pub scale: f64,
}

fn default_scale() -> f64 {
    1.0
}

/// Hints for asking the operator for a reference reading.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryHint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
    /// Unit operators usually read this metric in, e.g. kW for a W metric.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input_unit: Option<String>,
    /// Vendor-specific fields kept verbatim.
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_json::Value>,
}

/// A validated catalog entry.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricDefinition {
    pub id: String,
    pub name: String,
    pub unit: Option<String>,
    pub category: Category,
    pub read: ReadSpec,
    pub default_register: Option<u16>,
    pub model_registers: BTreeMap<String, u16>,
    pub discovery: Option<DiscoveryHint>,
}

impl MetricDefinition {
    /// Register for `model`: its override when present, else the default.
    pub fn register_for(&self, model: &str) -> Option<u16> {
        self.register_for_any(&[model])
    }

    /// Register for the first of `models` that has an override, else the
    /// default register.
    pub fn register_for_any(&self, models: &[&str]) -> Option<u16> {
        models
            .iter()
            .find_map(|model| self.model_registers.get(*model).copied())
            .or(self.default_register)
    }

    fn from_record(record: MetricRecord) -> Result<Self, DiscoveryError> {
        let encoding: Encoding = record.read.encoding.parse()?;

        if usize::from(record.read.words) < encoding.word_count() {
            return Err(DiscoveryError::InvalidCatalog {
                reason: format!(
                    "metric '{}' reads {} words but {} needs {}",
                    record.id,
                    record.read.words,
                    encoding,
                    encoding.word_count()
                ),
            });
        }
        if !record.read.scale.is_finite() || record.read.scale == 0.0 {
            return Err(DiscoveryError::InvalidCatalog {
                reason: format!("metric '{}' has invalid scale {}", record.id, record.read.scale),
            });
        }

        let model_registers = record
            .models
            .into_iter()
            .filter_map(|(model, register)| register.register.map(|r| (model, r)))
            .collect();

        Ok(Self {
            name: record.name.unwrap_or_else(|| record.id.clone()),
            id: record.id,
            unit: record.unit,
            category: Category::parse(record.category.as_deref()),
            read: ReadSpec {
                function: record.read.function,
                words: record.read.words,
                encoding,
                scale: record.read.scale,
            },
            default_register: record.default.register,
            model_registers,
            discovery: record.discovery,
        })
    }
}

/// Immutable table of metric definitions keyed by metric id.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    metrics: BTreeMap<String, MetricDefinition>,
}

impl Catalog {
    /// The catalog shipped with the crate.
    pub fn builtin() -> Result<Self, DiscoveryError> {
        Self::from_json_str(BUILTIN_CATALOG)
    }

    /// Load and validate a catalog file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DiscoveryError> {
        let path = path.as_ref();
        debug!("Loading metric catalog from {:?}", path);
        let contents = fs::read_to_string(path).map_err(|err| DiscoveryError::InvalidCatalog {
            reason: format!("cannot read {}: {}", path.display(), err),
        })?;
        Self::from_json_str(&contents)
    }

    pub fn from_json_str(contents: &str) -> Result<Self, DiscoveryError> {
        let file: CatalogFile =
            serde_json::from_str(contents).map_err(|err| DiscoveryError::InvalidCatalog {
                reason: err.to_string(),
            })?;
        Self::try_from(file)
    }

    pub fn get(&self, metric_id: &str) -> Option<&MetricDefinition> {
        self.metrics.get(metric_id)
    }

    /// Definitions in metric id order.
    pub fn iter(&self) -> impl Iterator<Item = &MetricDefinition> {
        self.metrics.values()
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }
}

impl TryFrom<CatalogFile> for Catalog {
    type Error = DiscoveryError;

    fn try_from(file: CatalogFile) -> Result<Self, Self::Error> {
        if file.version != CATALOG_VERSION {
            return Err(DiscoveryError::InvalidCatalog {
                reason: format!("unsupported catalog version {}", file.version),
            });
        }

        let mut metrics = BTreeMap::new();
        for record in file.metrics {
            let definition = MetricDefinition::from_record(record)?;
            if metrics.contains_key(&definition.id) {
                return Err(DiscoveryError::InvalidCatalog {
                    reason: format!("duplicate metric id '{}'", definition.id),
                });
            }
            metrics.insert(definition.id.clone(), definition);
        }

        debug!("Catalog holds {} metric definitions", metrics.len());
        Ok(Self { metrics })
    }
}

impl FromIterator<MetricDefinition> for Catalog {
    fn from_iter<I: IntoIterator<Item = MetricDefinition>>(iter: I) -> Self {
        Self {
            metrics: iter
                .into_iter()
                .map(|definition| (definition.id.clone(), definition))
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog_with(read: &str) -> String {
        format!(
            r#"{{
  "version": 1,
  "metrics": [
    {{
      "id": "meter_power",
      "unit": "W",
      "category": "power",
      "default": {{ "register": 5600 }},
      "models": {{ "HYBRID": {{ "register": 13009 }} }},
      "read": {read}
    }}
  ]
}}"#
        )
    }

    #[test]
    fn test_builtin_catalog_loads() {
        let catalog = Catalog::builtin().unwrap();
        let meter = catalog.get("meter_power").unwrap();
        assert_eq!(meter.category, Category::Power);
        assert_eq!(meter.read.encoding, Encoding::Int16);
        assert_eq!(meter.register_for("STRING"), Some(5600));
        assert_eq!(meter.register_for("HYBRID"), Some(13009));
        let hint = meter.discovery.as_ref().unwrap();
        assert_eq!(hint.input_unit.as_deref(), Some("kW"));
        assert!(hint.extra.contains_key("tolerance_watts"));
    }

    #[test]
    fn test_register_resolution_falls_back_to_default() {
        let catalog = Catalog::from_json_str(&catalog_with(
            r#"{ "function": "input", "words": 1, "type": "int16", "scale": 1 }"#,
        ))
        .unwrap();
        let meter = catalog.get("meter_power").unwrap();
        assert_eq!(meter.register_for("HYBRID"), Some(13009));
        assert_eq!(meter.register_for("STRING"), Some(5600));
        assert_eq!(meter.register_for_any(&["SG50RS", "HYBRID"]), Some(13009));
    }

    #[test]
    fn test_metric_without_any_register() {
        let catalog = Catalog::builtin().unwrap();
        let battery = catalog.get("battery_level").unwrap();
        assert_eq!(battery.register_for("STRING"), None);
        assert_eq!(battery.register_for("HYBRID"), Some(13022));
    }

    #[test]
    fn test_unsupported_encoding_is_fatal() {
        let err = Catalog::from_json_str(&catalog_with(
            r#"{ "function": "input", "words": 2, "type": "int24", "scale": 1 }"#,
        ))
        .unwrap_err();
        assert!(matches!(err, DiscoveryError::UnsupportedEncoding { ref tag } if tag == "int24"));
    }

    #[test]
    fn test_word_count_too_small() {
        let err = Catalog::from_json_str(&catalog_with(
            r#"{ "function": "input", "words": 1, "type": "uint32", "scale": 1 }"#,
        ))
        .unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidCatalog { .. }));
    }

    #[test]
    fn test_zero_scale_rejected() {
        let err = Catalog::from_json_str(&catalog_with(
            r#"{ "function": "input", "words": 1, "type": "int16", "scale": 0 }"#,
        ))
        .unwrap_err();
        assert!(err.to_string().contains("invalid scale"));
    }

    #[test]
    fn test_duplicate_ids_rejected() {
        let contents = r#"{
  "version": 1,
  "metrics": [
    { "id": "a", "read": { "function": "input", "words": 1, "type": "int16" } },
    { "id": "a", "read": { "function": "holding", "words": 1, "type": "uint16" } }
  ]
}"#;
        let err = Catalog::from_json_str(contents).unwrap_err();
        assert!(err.to_string().contains("duplicate metric id 'a'"));
    }

    #[test]
    fn test_wrong_version_rejected() {
        let err = Catalog::from_json_str(r#"{ "version": 2, "metrics": [] }"#).unwrap_err();
        assert!(matches!(err, DiscoveryError::InvalidCatalog { .. }));
    }
}
