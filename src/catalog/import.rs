// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Build a catalog from vendor register map CSV exports
//!
//! Vendors publish their register maps as spreadsheets. Each export is read
//! for one device family; rows with a numeric data type and a start address
//! become metric definitions, and a metric present in several exports gets
//! one register override per family.
//!
//! Expected columns: `name`, `data_type`, `address_start`, `address_end`,
//! `scale_factor`, `unit`, `register_type` (`3X` for input registers,
//! anything else for holding registers). Extra columns are ignored.

use std::collections::BTreeMap;
use std::io;
use std::sync::LazyLock;

use log::{debug, info};
use regex::Regex;
use serde::Deserialize;

use super::{CatalogFile, DiscoveryHint, MetricRecord, ReadRecord, RegisterRef, CATALOG_VERSION};
use crate::error::DiscoveryError;
use crate::registers::{Category, ReadFunction};

/// Metrics that get operator prompts during discovery.
pub const METER_POWER: &str = "meter_power";
pub const GRID_IMPORT_ENERGY: &str = "grid_import_energy";
pub const GRID_EXPORT_ENERGY: &str = "grid_export_energy";

static UNIT_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"([a-zA-ZΩω%℃]+)$").expect("valid unit pattern"));
static INVALID_ID_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9_]").expect("valid id pattern"));
static REPEATED_UNDERSCORES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_+").expect("valid underscore pattern"));

/// One row of a vendor export. Everything is optional because exports are
/// hand-maintained and frequently have blank cells.
#[derive(Debug, Default, Deserialize)]
pub(super) struct CsvRow {
    #[serde(default)]
    pub no: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub data_type: String,
    #[serde(default)]
    pub data_range: String,
    #[serde(default)]
    pub address_start: String,
    #[serde(default)]
    pub address_end: String,
    #[serde(default)]
    pub scale_factor: String,
    #[serde(default)]
    pub unit: String,
    #[serde(default)]
    pub register_type: String,
    #[serde(default)]
    pub note: String,
    #[serde(default)]
    pub source_version: String,
}

/// Trimmed, header-keyed rows of one export.
pub(super) fn csv_rows<R: io::Read>(
    model: &str,
    reader: R,
) -> impl Iterator<Item = Result<CsvRow, DiscoveryError>> {
    let model = model.to_string();
    csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
        .into_deserialize::<CsvRow>()
        .map(move |row| {
            row.map_err(|err| DiscoveryError::InvalidCatalog {
                reason: format!("{model} export: {err}"),
            })
        })
}

/// Map a vendor data type to an encoding tag and its natural word count.
fn numeric_type(data_type: &str) -> Option<(&'static str, u16)> {
    match data_type {
        "U16" => Some(("uint16", 1)),
        "S16" => Some(("int16", 1)),
        "U32" => Some(("uint32", 2)),
        "S32" => Some(("int32", 2)),
        "U64" => Some(("uint64", 4)),
        "IEEE754" | "FLOAT" => Some(("float32", 2)),
        _ => None,
    }
}

fn unit_category(unit: &str) -> Option<Category> {
    let category = match unit.to_lowercase().as_str() {
        "v" | "kv" => Category::Voltage,
        "a" | "ka" => Category::Current,
        "hz" => Category::Frequency,
        "kwh" | "wh" | "mwh" => Category::Energy,
        "kw" | "w" => Category::Power,
        "kvar" => Category::ReactivePower,
        "kvarh" => Category::ReactiveEnergy,
        "kva" => Category::ApparentPower,
        "percent" | "%" => Category::Percentage,
        "℃" | "c" => Category::Temperature,
        "kω" | "kohm" => Category::Resistance,
        _ => return None,
    };
    Some(category)
}

/// Turn a register name into a metric id: `"Meter Active Power"` becomes
/// `meter_active_power`.
pub fn sanitise_metric_id(name: &str) -> String {
    let id = name.trim().to_lowercase().replace([' ', '-'], "_");
    let id = INVALID_ID_CHARS.replace_all(&id, "");
    let id = REPEATED_UNDERSCORES.replace_all(&id, "_");
    id.trim_matches('_').to_string()
}

/// Strip a magnitude prefix written as a number, e.g. `0.1kWh` -> `kWh`.
fn base_unit(unit: &str) -> &str {
    UNIT_SUFFIX
        .captures(unit)
        .and_then(|captures| captures.get(1))
        .map_or(unit, |suffix| suffix.as_str())
}

fn discovery_hint(metric_id: &str, category: Option<Category>) -> Option<DiscoveryHint> {
    let hint = |method: &str, prompt: &str, input_unit: &str| DiscoveryHint {
        method: Some(method.to_string()),
        prompt: Some(prompt.to_string()),
        input_unit: Some(input_unit.to_string()),
        extra: BTreeMap::new(),
    };

    match metric_id {
        METER_POWER => Some(hint(
            "power",
            "Meter Active Power (kW) [press Enter to skip]: ",
            "kW",
        )),
        GRID_IMPORT_ENERGY => Some(hint(
            "energy",
            "Forward Active Energy (MWh) [press Enter to skip]: ",
            "MWh",
        )),
        GRID_EXPORT_ENERGY => Some(hint(
            "energy",
            "Reverse Active Energy (MWh) [press Enter to skip]: ",
            "MWh",
        )),
        _ => match category? {
            category @ (Category::Power
            | Category::Energy
            | Category::Voltage
            | Category::Current
            | Category::Frequency) => Some(DiscoveryHint {
                method: Some(category.as_str().to_string()),
                ..DiscoveryHint::default()
            }),
            _ => None,
        },
    }
}

/// Registers the prompted metrics live at on string inverters when the
/// export does not list them.
fn fallback_record(metric_id: &str) -> Option<(MetricRecord, u16)> {
    let (register, read) = match metric_id {
        METER_POWER => (
            5600,
            ReadRecord {
                function: ReadFunction::Input,
                words: 1,
                encoding: "int16".to_string(),
                scale: 1.0,
            },
        ),
        GRID_IMPORT_ENERGY | GRID_EXPORT_ENERGY => (
            if metric_id == GRID_IMPORT_ENERGY { 5098 } else { 5094 },
            ReadRecord {
                function: ReadFunction::Input,
                words: 2,
                encoding: "uint32le".to_string(),
                scale: 0.1,
            },
        ),
        _ => return None,
    };
    let is_power = metric_id.contains("power");
    let name = metric_id
        .split('_')
        .map(|word| {
            let mut chars = word.chars();
            chars
                .next()
                .map(|first| first.to_uppercase().chain(chars).collect::<String>())
                .unwrap_or_default()
        })
        .collect::<Vec<_>>()
        .join(" ");

    let record = MetricRecord {
        id: metric_id.to_string(),
        name: Some(name),
        unit: Some(if is_power { "W" } else { "kWh" }.to_string()),
        category: Some(if is_power { "power" } else { "energy" }.to_string()),
        default: RegisterRef::default(),
        models: BTreeMap::new(),
        read,
        discovery: None,
    };
    Some((record, register))
}

/// Incrementally assembles a catalog from one CSV export per device family.
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    metrics: BTreeMap<String, MetricRecord>,
    /// Families in the order their exports were added.
    models: Vec<String>,
}

impl CatalogBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add the rows of one export, registered under `model`.
    pub fn add_csv<R: io::Read>(&mut self, model: &str, reader: R) -> Result<usize, DiscoveryError> {
        if !self.models.iter().any(|known| known == model) {
            self.models.push(model.to_string());
        }

        let mut added = 0;
        for row in csv_rows(model, reader) {
            let row = row?;
            if self.add_row(model, &row) {
                added += 1;
            }
        }
        info!("Imported {} registers for model {}", added, model);
        Ok(added)
    }

    fn add_row(&mut self, model: &str, row: &CsvRow) -> bool {
        let data_type = row.data_type.trim().to_uppercase();
        let Some((encoding, natural_words)) = numeric_type(&data_type) else {
            return false;
        };
        let Ok(register) = row.address_start.trim().parse::<u16>() else {
            return false;
        };
        let metric_id = sanitise_metric_id(&row.name);
        if metric_id.is_empty() {
            return false;
        }

        let words = row
            .address_end
            .trim()
            .parse::<u16>()
            .ok()
            .and_then(|end| end.checked_sub(register))
            .map_or(natural_words, |span| natural_words.max(span + 1));
        let scale = row.scale_factor.trim().parse::<f64>().unwrap_or(1.0);
        let unit = base_unit(row.unit.trim());
        let category = (!unit.is_empty()).then(|| unit_category(unit)).flatten();
        let function = if row.register_type.trim() == "3X" {
            ReadFunction::Input
        } else {
            ReadFunction::Holding
        };

        let record = self
            .metrics
            .entry(metric_id.clone())
            .or_insert_with(|| MetricRecord {
                id: metric_id,
                name: Some(row.name.trim().to_string()),
                unit: (!unit.is_empty()).then(|| unit.to_string()),
                category: category.map(|c| c.as_str().to_string()),
                default: RegisterRef::default(),
                models: BTreeMap::new(),
                read: ReadRecord {
                    function,
                    words,
                    encoding: encoding.to_string(),
                    scale,
                },
                discovery: None,
            });
        record.models.insert(
            model.to_string(),
            RegisterRef {
                register: Some(register),
            },
        );
        true
    }

    /// Finish the catalog: add missing prompted metrics, pick default
    /// registers and attach discovery hints.
    pub fn build(mut self, fallback_model: &str) -> CatalogFile {
        for metric_id in [METER_POWER, GRID_IMPORT_ENERGY, GRID_EXPORT_ENERGY] {
            let Some((fallback, register)) = fallback_record(metric_id) else {
                continue;
            };
            let record = self
                .metrics
                .entry(metric_id.to_string())
                .or_insert(fallback);
            // The known register wins over whatever the fallback export lists
            record.models.insert(
                fallback_model.to_string(),
                RegisterRef {
                    register: Some(register),
                },
            );
        }
        if !self.models.iter().any(|model| model == fallback_model) {
            self.models.push(fallback_model.to_string());
        }

        for record in self.metrics.values_mut() {
            record.default.register = self
                .models
                .iter()
                .find_map(|model| record.models.get(model).and_then(|r| r.register));
            let category = record.category.as_deref().map(|c| Category::parse(Some(c)));
            record.discovery = discovery_hint(&record.id, category);
        }

        debug!("Built catalog with {} metrics", self.metrics.len());
        CatalogFile {
            version: CATALOG_VERSION,
            metrics: self.metrics.into_values().collect(),
        }
    }
}
