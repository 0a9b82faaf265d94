// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Semantic categories and their plausibility intervals
//!
//! A decoded value is only worth comparing against a reference reading when
//! it is plausible for the kind of quantity the metric measures. Categories
//! without an interval fall back to a non-zero rule: an idle or unused
//! register usually reads 0.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Semantic class of a metric.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    Power,
    Energy,
    Voltage,
    Current,
    Frequency,
    Temperature,
    Percentage,
    Resistance,
    ReactivePower,
    ReactiveEnergy,
    ApparentPower,
    /// No category in the catalog, or one this crate does not know.
    #[default]
    #[serde(other)]
    Uncategorized,
}

/// Closed interval a decoded value must fall in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlausibleRange {
    pub min: f64,
    pub max: f64,
    /// Whether an exact 0 is an acceptable reading.
    pub allow_zero: bool,
}

impl PlausibleRange {
    const fn new(min: f64, max: f64, allow_zero: bool) -> Self {
        Self {
            min,
            max,
            allow_zero,
        }
    }

    pub fn contains(&self, value: f64) -> bool {
        if value == 0.0 && !self.allow_zero {
            return false;
        }
        value >= self.min && value <= self.max
    }
}

impl Category {
    /// Parse a catalog category name; unknown or missing names map to
    /// [`Category::Uncategorized`].
    pub fn parse(name: Option<&str>) -> Self {
        name.and_then(|name| name.parse().ok())
            .unwrap_or(Category::Uncategorized)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Power => "power",
            Category::Energy => "energy",
            Category::Voltage => "voltage",
            Category::Current => "current",
            Category::Frequency => "frequency",
            Category::Temperature => "temperature",
            Category::Percentage => "percentage",
            Category::Resistance => "resistance",
            Category::ReactivePower => "reactive_power",
            Category::ReactiveEnergy => "reactive_energy",
            Category::ApparentPower => "apparent_power",
            Category::Uncategorized => "none",
        }
    }

    /// Plausibility interval in the metric's natural unit (W, kWh, V, A, Hz,
    /// °C, %, kΩ, var, kvarh, VA).
    pub fn plausible_range(self) -> Option<PlausibleRange> {
        match self {
            Category::Power => Some(PlausibleRange::new(-100_000.0, 100_000.0, false)),
            Category::Energy => Some(PlausibleRange::new(0.0, 1_000_000_000.0, true)),
            Category::Voltage => Some(PlausibleRange::new(50.0, 1000.0, true)),
            Category::Current => Some(PlausibleRange::new(0.0, 500.0, true)),
            Category::Frequency => Some(PlausibleRange::new(40.0, 70.0, true)),
            Category::Temperature => Some(PlausibleRange::new(-40.0, 150.0, true)),
            Category::Percentage => Some(PlausibleRange::new(0.0, 100.0, true)),
            Category::Resistance => Some(PlausibleRange::new(0.0, 100_000.0, true)),
            Category::ReactivePower => Some(PlausibleRange::new(-100_000.0, 100_000.0, false)),
            Category::ReactiveEnergy => Some(PlausibleRange::new(0.0, 1_000_000_000.0, true)),
            Category::ApparentPower => Some(PlausibleRange::new(0.0, 100_000.0, true)),
            Category::Uncategorized => None,
        }
    }

    /// Check whether `value` is a plausible reading for this category.
    pub fn is_plausible(self, value: f64) -> bool {
        if !value.is_finite() {
            return false;
        }
        match self.plausible_range() {
            Some(range) => range.contains(value),
            None => value != 0.0,
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        let category = match name.trim().to_ascii_lowercase().as_str() {
            "power" => Category::Power,
            "energy" => Category::Energy,
            "voltage" => Category::Voltage,
            "current" => Category::Current,
            "frequency" => Category::Frequency,
            "temperature" => Category::Temperature,
            "percentage" => Category::Percentage,
            "resistance" => Category::Resistance,
            "reactive_power" => Category::ReactivePower,
            "reactive_energy" => Category::ReactiveEnergy,
            "apparent_power" => Category::ApparentPower,
            "none" | "" => Category::Uncategorized,
            other => return Err(format!("unknown category '{other}'")),
        };
        Ok(category)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const RANGED: [Category; 11] = [
        Category::Power,
        Category::Energy,
        Category::Voltage,
        Category::Current,
        Category::Frequency,
        Category::Temperature,
        Category::Percentage,
        Category::Resistance,
        Category::ReactivePower,
        Category::ReactiveEnergy,
        Category::ApparentPower,
    ];

    #[test]
    fn test_interval_bounds_are_inclusive() {
        for category in RANGED {
            let range = category.plausible_range().unwrap();
            assert!(category.is_plausible(range.min), "{category} min");
            assert!(category.is_plausible(range.max), "{category} max");
            assert!(!category.is_plausible(range.min - 1.0), "{category} below");
            assert!(!category.is_plausible(range.max + 1.0), "{category} above");
        }
    }

    #[test]
    fn test_documented_intervals() {
        assert!(Category::Voltage.is_plausible(50.0));
        assert!(!Category::Voltage.is_plausible(49.0));
        assert!(Category::Frequency.is_plausible(70.0));
        assert!(!Category::Frequency.is_plausible(71.0));
        assert!(Category::Current.is_plausible(500.0));
        assert!(!Category::Current.is_plausible(501.0));
    }

    #[test]
    fn test_zero_handling() {
        assert!(Category::Energy.is_plausible(0.0));
        assert!(Category::ReactiveEnergy.is_plausible(0.0));
        assert!(!Category::Power.is_plausible(0.0));
        assert!(!Category::ReactivePower.is_plausible(0.0));
    }

    #[test]
    fn test_uncategorized_uses_non_zero_rule() {
        assert!(!Category::Uncategorized.is_plausible(0.0));
        assert!(Category::Uncategorized.is_plausible(-3.5));
        assert!(Category::Uncategorized.is_plausible(1e12));
        assert!(!Category::Uncategorized.is_plausible(f64::NAN));
    }

    #[test]
    fn test_parse_unknown_category() {
        assert_eq!(Category::parse(Some("power")), Category::Power);
        assert_eq!(Category::parse(Some("Reactive_Power")), Category::ReactivePower);
        assert_eq!(Category::parse(Some("luminosity")), Category::Uncategorized);
        assert_eq!(Category::parse(None), Category::Uncategorized);
    }
}
