// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Unit conversion for operator reference readings
//!
//! Operators read values off the inverter display or a utility meter, often
//! in kW or MWh, while the catalog stores W and kWh. Readings are converted
//! into the metric's unit before any tolerance comparison.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::DiscoveryError;

/// Physical dimension of a unit. Only units of the same dimension convert.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Dimension {
    Power,
    Energy,
    ReactivePower,
    ReactiveEnergy,
    ApparentPower,
    Voltage,
    Current,
    Frequency,
    Temperature,
    Percentage,
    Resistance,
}

/// (unit, dimension, factor to the dimension's base unit)
const UNIT_TABLE: &[(&str, Dimension, f64)] = &[
    ("w", Dimension::Power, 1.0),
    ("kw", Dimension::Power, 1_000.0),
    ("mw", Dimension::Power, 1_000_000.0),
    ("wh", Dimension::Energy, 0.001),
    ("kwh", Dimension::Energy, 1.0),
    ("mwh", Dimension::Energy, 1_000.0),
    ("var", Dimension::ReactivePower, 1.0),
    ("kvar", Dimension::ReactivePower, 1_000.0),
    ("varh", Dimension::ReactiveEnergy, 0.001),
    ("kvarh", Dimension::ReactiveEnergy, 1.0),
    ("va", Dimension::ApparentPower, 1.0),
    ("kva", Dimension::ApparentPower, 1_000.0),
    ("v", Dimension::Voltage, 1.0),
    ("kv", Dimension::Voltage, 1_000.0),
    ("ma", Dimension::Current, 0.001),
    ("a", Dimension::Current, 1.0),
    ("ka", Dimension::Current, 1_000.0),
    ("hz", Dimension::Frequency, 1.0),
    ("c", Dimension::Temperature, 1.0),
    ("℃", Dimension::Temperature, 1.0),
    ("°c", Dimension::Temperature, 1.0),
    ("%", Dimension::Percentage, 1.0),
    ("percent", Dimension::Percentage, 1.0),
    ("ohm", Dimension::Resistance, 0.001),
    ("kohm", Dimension::Resistance, 1.0),
    ("kω", Dimension::Resistance, 1.0),
];

fn lookup(unit: &str) -> Result<(Dimension, f64), DiscoveryError> {
    let key = unit.trim().to_lowercase();
    UNIT_TABLE
        .iter()
        .find(|(name, _, _)| *name == key)
        .map(|(_, dimension, factor)| (*dimension, *factor))
        .ok_or_else(|| DiscoveryError::UnknownUnit {
            unit: unit.to_string(),
        })
}

/// Convert `value` from one unit to another, e.g. kW to W.
///
/// # Errors
///
/// Fails for units outside the table and for units of different dimensions.
pub fn convert(value: f64, from: &str, to: &str) -> Result<f64, DiscoveryError> {
    let (from_dimension, from_factor) = lookup(from)?;
    let (to_dimension, to_factor) = lookup(to)?;
    if from_dimension != to_dimension {
        return Err(DiscoveryError::IncompatibleUnits {
            from: from.to_string(),
            to: to.to_string(),
        });
    }
    Ok(value * from_factor / to_factor)
}

/// A reference reading supplied by the operator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExpectedReading {
    pub value: f64,
    /// Unit the operator typed the value in; the metric's unit when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
}

impl ExpectedReading {
    pub fn new(value: f64, unit: impl Into<String>) -> Self {
        Self {
            value,
            unit: Some(unit.into()),
        }
    }

    /// Express the reading in `target_unit`.
    ///
    /// Readings without a unit, or for metrics without one, pass through
    /// unchanged.
    pub fn in_unit(&self, target_unit: Option<&str>) -> Result<f64, DiscoveryError> {
        match (self.unit.as_deref(), target_unit) {
            (Some(from), Some(to)) if !from.eq_ignore_ascii_case(to) => {
                convert(self.value, from, to)
            }
            _ => Ok(self.value),
        }
    }
}

impl fmt::Display for ExpectedReading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.unit {
            Some(unit) => write!(f, "{} {}", self.value, unit),
            None => write!(f, "{}", self.value),
        }
    }
}

impl FromStr for ExpectedReading {
    type Err = String;

    /// Parse `"1.5kW"`, `"1.5 kW"` or a bare `"1500"`.
    fn from_str(text: &str) -> Result<Self, Self::Err> {
        let text = text.trim();
        let split = text
            .find(|c: char| !(c.is_ascii_digit() || matches!(c, '.' | '-' | '+' | 'e' | 'E')))
            .unwrap_or(text.len());
        let (number, unit) = text.split_at(split);
        let value: f64 = number
            .trim()
            .parse()
            .map_err(|_| format!("invalid reading '{text}'"))?;
        let unit = unit.trim();
        Ok(Self {
            value,
            unit: (!unit.is_empty()).then(|| unit.to_string()),
        })
    }
}
