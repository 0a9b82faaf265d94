// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Per-family register listings
//!
//! Where the catalog keeps only the metrics discovery can decode, a listing
//! keeps every row of a vendor export, numeric or not, sorted by address. It
//! is the reference used to put a name on a raw address.
//!
//! ```json
//! {
//!   "metadata": { "generated_at": "2025-06-01T10:00:00Z", "source": { "STRING": "string.csv" } },
//!   "inverter_types": {
//!     "STRING": {
//!       "source_version": null,
//!       "registers": [
//!         { "id": "daily_power_yields", "address": 5002, "length": 1, "data_type": "U16",
//!           "unit": "0.1kWh", "scale_factor": 0.1, "register_type": "input", ... }
//!       ]
//!     }
//!   }
//! }
//! ```

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::LazyLock;

use chrono::{DateTime, Utc};
use log::{debug, info};
use regex::Regex;
use serde::{Deserialize, Serialize};

use super::import::{csv_rows, CsvRow};
use crate::error::DiscoveryError;
use crate::registers::ReadFunction;

static NON_ALPHANUMERIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));

/// One register row of a vendor export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterListing {
    pub id: String,
    pub no: Option<String>,
    pub name: String,
    pub address: u16,
    /// Number of 16-bit words, at least 1.
    pub length: u16,
    pub data_type: String,
    pub data_range: Option<String>,
    pub unit: Option<String>,
    pub scale_factor: f64,
    pub register_type: ReadFunction,
    pub note: Option<String>,
}

impl RegisterListing {
    /// Whether this register block spans `address`.
    pub fn covers(&self, function: ReadFunction, address: u16) -> bool {
        self.register_type == function
            && address >= self.address
            && u32::from(address) < u32::from(self.address) + u32::from(self.length)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FamilyRegisters {
    pub source_version: Option<String>,
    pub registers: Vec<RegisterListing>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingMetadata {
    pub generated_at: DateTime<Utc>,
    /// Export file name per family.
    pub source: BTreeMap<String, String>,
}

/// Register listings of every imported family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterDefaults {
    pub metadata: ListingMetadata,
    pub inverter_types: BTreeMap<String, FamilyRegisters>,
}

impl Default for RegisterDefaults {
    fn default() -> Self {
        Self {
            metadata: ListingMetadata {
                generated_at: Utc::now(),
                source: BTreeMap::new(),
            },
            inverter_types: BTreeMap::new(),
        }
    }
}

/// `"Total Active Power (W)"` becomes `total_active_power_w`, `%` is
/// spelled out.
pub fn slugify(name: &str) -> String {
    let lowered = name.to_lowercase().replace('%', " percent ");
    let slug = NON_ALPHANUMERIC.replace_all(&lowered, "_");
    match slug.trim_matches('_') {
        "" => "register".to_string(),
        slug => slug.to_string(),
    }
}

fn non_empty(value: &str) -> Option<String> {
    (!value.is_empty()).then(|| value.to_string())
}

fn listing(row: &CsvRow) -> Option<RegisterListing> {
    let start = row.address_start.parse::<u16>().ok()?;
    let end = row.address_end.parse::<u16>().unwrap_or(start);
    let length = end.checked_sub(start).map_or(1, |span| span.saturating_add(1));
    let register_type = if row.register_type.to_uppercase().starts_with('4') {
        ReadFunction::Holding
    } else {
        ReadFunction::Input
    };

    Some(RegisterListing {
        id: slugify(&row.name),
        no: non_empty(&row.no),
        name: row.name.clone(),
        address: start,
        length,
        data_type: row.data_type.to_uppercase(),
        data_range: non_empty(&row.data_range),
        unit: non_empty(&row.unit),
        scale_factor: row
            .scale_factor
            .parse::<f64>()
            .ok()
            .filter(|scale| scale.is_finite())
            .unwrap_or(1.0),
        register_type,
        note: non_empty(&row.note),
    })
}

impl RegisterDefaults {
    pub fn new() -> Self {
        Self::default()
    }

    /// List every addressed row of one export under `model`.
    ///
    /// `source` is the name recorded in the metadata, usually the file name.
    /// Importing a family again replaces its listing.
    pub fn add_csv<R: io::Read>(
        &mut self,
        model: &str,
        source: &str,
        reader: R,
    ) -> Result<usize, DiscoveryError> {
        let mut family = FamilyRegisters::default();
        for row in csv_rows(model, reader) {
            let row = row?;
            if family.source_version.is_none() {
                family.source_version = non_empty(&row.source_version);
            }
            match listing(&row) {
                Some(entry) => family.registers.push(entry),
                None => debug!("Skipping {} row without address: {:?}", model, row.name),
            }
        }
        family
            .registers
            .sort_by_key(|entry| (entry.address, entry.length));

        let count = family.registers.len();
        info!("Listed {} registers for model {}", count, model);
        self.metadata
            .source
            .insert(model.to_string(), source.to_string());
        self.inverter_types.insert(model.to_string(), family);
        Ok(count)
    }

    /// Rows spanning `address`, across families or for one family only.
    pub fn labels_at<'a>(
        &'a self,
        model: Option<&'a str>,
        function: ReadFunction,
        address: u16,
    ) -> impl Iterator<Item = (&'a str, &'a RegisterListing)> + 'a {
        self.inverter_types
            .iter()
            .filter(move |(family, _)| {
                model.is_none_or(|wanted| wanted.eq_ignore_ascii_case(family))
            })
            .flat_map(move |(family, registers)| {
                registers
                    .registers
                    .iter()
                    .filter(move |entry| entry.covers(function, address))
                    .map(move |entry| (family.as_str(), entry))
            })
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, DiscoveryError> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|err| DiscoveryError::InvalidCatalog {
            reason: format!("cannot read {}: {}", path.display(), err),
        })?;
        serde_json::from_str(&contents).map_err(|err| DiscoveryError::InvalidCatalog {
            reason: format!("{}: {}", path.display(), err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const STRING_EXPORT: &str = "\
no,name,data_type,data_range,address_start,address_end,scale_factor,unit,register_type,note
3,Total Active Power,U32,,5030,5031,1,W,3X,
1,Device Serial,UTF-8,,4989,4998,,,3X,ASCII
2,Daily Power Yields,U16,,5002,,0.1,0.1kWh,3X,
4,Work Mode,U16,0~2,,,,,4X,
5,Power Limitation,U16,0~1100,5006,5006,,%,4X,Per mille
";

    #[test]
    fn test_slugify() {
        assert_eq!(slugify("Total Active Power (W)"), "total_active_power_w");
        assert_eq!(slugify("Battery Level %"), "battery_level_percent");
        assert_eq!(slugify("--"), "register");
    }

    #[test]
    fn test_listing_keeps_every_addressed_row_sorted() {
        let mut defaults = RegisterDefaults::new();
        let count = defaults
            .add_csv("STRING", "string.csv", STRING_EXPORT.as_bytes())
            .unwrap();
        // The work mode row has no address
        assert_eq!(count, 4);

        let family = &defaults.inverter_types["STRING"];
        let addresses: Vec<u16> = family.registers.iter().map(|r| r.address).collect();
        assert_eq!(addresses, vec![4989, 5002, 5006, 5030]);

        let serial = &family.registers[0];
        assert_eq!(serial.length, 10);
        assert_eq!(serial.data_type, "UTF-8");
        assert_eq!(serial.scale_factor, 1.0);
        assert_eq!(serial.note.as_deref(), Some("ASCII"));

        let limit = &family.registers[2];
        assert_eq!(limit.register_type, ReadFunction::Holding);
        assert_eq!(limit.unit.as_deref(), Some("%"));
        assert_eq!(limit.data_range.as_deref(), Some("0~1100"));
        assert_eq!(defaults.metadata.source["STRING"], "string.csv");
    }

    #[test]
    fn test_labels_at_address() {
        let mut defaults = RegisterDefaults::new();
        defaults
            .add_csv("STRING", "string.csv", STRING_EXPORT.as_bytes())
            .unwrap();

        let labels: Vec<_> = defaults
            .labels_at(None, ReadFunction::Input, 5031)
            .map(|(family, entry)| (family, entry.id.as_str()))
            .collect();
        assert_eq!(labels, vec![("STRING", "total_active_power")]);

        assert_eq!(defaults.labels_at(Some("hybrid"), ReadFunction::Input, 5031).count(), 0);
        assert_eq!(defaults.labels_at(None, ReadFunction::Holding, 5031).count(), 0);
    }

    #[test]
    fn test_file_round_trip() {
        let mut defaults = RegisterDefaults::new();
        defaults
            .add_csv("HYBRID", "hybrid.csv", STRING_EXPORT.as_bytes())
            .unwrap();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("modbus-register-defaults.json");
        fs::write(&path, serde_json::to_string_pretty(&defaults).unwrap()).unwrap();

        let loaded = RegisterDefaults::from_file(&path).unwrap();
        assert_eq!(loaded.metadata.source, defaults.metadata.source);
        let ids: Vec<&str> = loaded.inverter_types["HYBRID"]
            .registers
            .iter()
            .map(|entry| entry.id.as_str())
            .collect();
        assert_eq!(
            ids,
            vec!["device_serial", "daily_power_yields", "power_limitation", "total_active_power"]
        );
    }
}
