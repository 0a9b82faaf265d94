// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Acceptance band around an operator reference reading
//!
//! | category    | half-width                 |
//! |-------------|----------------------------|
//! | power       | max(200, 10% of expected)  |
//! | energy      | max(0.5, 2% of expected)   |
//! | voltage     | 5                          |
//! | current     | max(0.5, 10% of expected)  |
//! | frequency   | 0.2                        |
//! | temperature | 2                          |
//! | percentage  | 2                          |
//! | others      | max(1, 10% of expected)    |

use super::Category;

/// Absolute tolerance for `expected` in the metric's natural unit.
///
/// Returns 0 when `expected` is not finite; callers then skip the tolerance
/// check and rely on the category check alone.
pub fn tolerance_for(category: Category, expected: f64) -> f64 {
    if !expected.is_finite() {
        return 0.0;
    }
    let magnitude = expected.abs();
    match category {
        Category::Power => f64::max(200.0, magnitude / 10.0),
        Category::Energy => f64::max(0.5, magnitude / 50.0),
        Category::Voltage => 5.0,
        Category::Current => f64::max(0.5, magnitude / 10.0),
        Category::Frequency => 0.2,
        Category::Temperature | Category::Percentage => 2.0,
        _ => f64::max(1.0, magnitude / 10.0),
    }
}

/// Distance between `value` and `expected` when it is inside the tolerance
/// band, `None` otherwise.
pub fn within_tolerance(category: Category, expected: f64, value: f64) -> Option<f64> {
    let tolerance = tolerance_for(category, expected);
    if tolerance <= 0.0 || !value.is_finite() {
        return None;
    }
    let difference = (value - expected).abs();
    (difference <= tolerance).then_some(difference)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_power_floor_dominates() {
        assert_eq!(tolerance_for(Category::Power, 1000.0), 200.0);
        assert_eq!(tolerance_for(Category::Power, -1000.0), 200.0);
        assert_eq!(tolerance_for(Category::Power, 5000.0), 500.0);
    }

    #[test]
    fn test_energy_floor() {
        assert_eq!(tolerance_for(Category::Energy, 10.0), 0.5);
        assert_eq!(tolerance_for(Category::Energy, 1000.0), 20.0);
    }

    #[test]
    fn test_fixed_tolerances() {
        assert_eq!(tolerance_for(Category::Voltage, 230.0), 5.0);
        assert_eq!(tolerance_for(Category::Frequency, 50.0), 0.2);
        assert_eq!(tolerance_for(Category::Temperature, 35.0), 2.0);
        assert_eq!(tolerance_for(Category::Percentage, 80.0), 2.0);
    }

    #[test]
    fn test_current_and_fallback() {
        assert_eq!(tolerance_for(Category::Current, 2.0), 0.5);
        assert_eq!(tolerance_for(Category::Current, 40.0), 4.0);
        assert_eq!(tolerance_for(Category::Uncategorized, 3.0), 1.0);
        assert_eq!(tolerance_for(Category::ReactivePower, 900.0), 90.0);
    }

    #[test]
    fn test_missing_expected_disables_band() {
        assert_eq!(tolerance_for(Category::Power, f64::NAN), 0.0);
        assert_eq!(tolerance_for(Category::Energy, f64::INFINITY), 0.0);
        assert_eq!(within_tolerance(Category::Power, f64::NAN, 1.0), None);
    }

    #[test]
    fn test_within_tolerance_reports_difference() {
        assert_eq!(within_tolerance(Category::Power, 1500.0, 1480.0), Some(20.0));
        assert_eq!(within_tolerance(Category::Power, 1500.0, 1700.0), Some(200.0));
        assert_eq!(within_tolerance(Category::Power, 1500.0, 1701.0), None);
    }
}
