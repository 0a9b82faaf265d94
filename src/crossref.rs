// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Catalog cross-reference
//!
//! Fills the metrics the scan did not find with the catalog register for the
//! detected model, once a live read at that register looks right.

use log::{debug, info, warn};

use crate::catalog::Catalog;
use crate::error::DiscoveryError;
use crate::matches::{Match, MatchDelta, MatchSet, MatchSource};
use crate::registers::within_tolerance;
use crate::scanner::ExpectedValues;
use crate::transport::{read_decoded, RegisterTransport};

/// Confirm catalog registers for every metric missing from `matches`.
///
/// `model_keys` are tried in order against the catalog's per-model
/// overrides before the default register. Metrics without any register for
/// the model are skipped, and read failures only make a metric undiscovered
/// for this session. Errors are reserved for reference readings whose unit
/// cannot be converted.
pub async fn cross_reference<T>(
    transport: &mut T,
    catalog: &Catalog,
    matches: &MatchSet,
    model_keys: &[&str],
    expected: &ExpectedValues,
) -> Result<MatchDelta, DiscoveryError>
where
    T: RegisterTransport + ?Sized,
{
    let mut delta = MatchDelta::new();

    for definition in catalog.iter().filter(|d| !matches.contains(&d.id)) {
        let Some(register) = definition.register_for_any(model_keys) else {
            debug!("No catalog register for {} on {:?}", definition.id, model_keys);
            continue;
        };

        let value = match read_decoded(transport, register, &definition.read).await {
            Ok(value) => value,
            Err(err) => {
                warn!(
                    "Cannot read {} at register {}, skipping: {}",
                    definition.id, register, err
                );
                continue;
            }
        };

        if !definition.category.is_plausible(value) {
            debug!(
                "Register {} reads {} which is not a plausible {} value for {}",
                register, value, definition.category, definition.id
            );
            continue;
        }

        let tolerance_difference = match expected.get(&definition.id) {
            Some(reading) => {
                let expected = reading.in_unit(definition.unit.as_deref())?;
                match within_tolerance(definition.category, expected, value) {
                    Some(difference) => Some(difference),
                    None => {
                        debug!(
                            "Register {} reads {} for {}, expected {}",
                            register, value, definition.id, expected
                        );
                        continue;
                    }
                }
            }
            None => None,
        };

        info!(
            "Catalog register {} confirmed for {} ({})",
            register, definition.id, value
        );
        delta.insert(
            definition.id.clone(),
            Match {
                metric_id: definition.id.clone(),
                register,
                value,
                encoding: definition.read.encoding,
                category: definition.category,
                tolerance_difference,
                auto: true,
                source: MatchSource::CatalogConfirmed,
            },
        );
    }

    Ok(delta)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::matches::sample_match;
    use crate::registers::{Encoding, ReadFunction};
    use crate::transport::MemoryTransport;
    use crate::units::ExpectedReading;

    #[tokio::test]
    async fn test_fills_gaps_and_skips_unmapped_metrics() {
        let catalog = Catalog::builtin().unwrap();
        let mut transport = MemoryTransport::default()
            .with_value(ReadFunction::Input, 5018, Encoding::Uint16, 0.1, &[231.0])
            .with_value(ReadFunction::Input, 5035, Encoding::Uint16, 0.1, &[50.0])
            .with_value(ReadFunction::Input, 5007, Encoding::Int16, 0.1, &[41.5])
            .with_value(ReadFunction::Input, 5600, Encoding::Int16, 1.0, &[-300.0]);
        let found = MatchSet::from_iter([sample_match("meter_power", 5010, MatchSource::ScanConfirmed)]);

        let delta = cross_reference(&mut transport, &catalog, &found, &["STRING"], &ExpectedValues::new())
            .await
            .unwrap();

        assert_eq!(delta.get("phase_a_voltage").unwrap().register, 5018);
        assert_eq!(delta.get("grid_frequency").unwrap().register, 5035);
        assert_eq!(delta.get("internal_temperature").unwrap().source, MatchSource::CatalogConfirmed);
        assert!(!delta.contains_key("meter_power"));
        // No STRING register and no default
        assert!(!delta.contains_key("battery_level"));
        assert!(transport
            .requests()
            .iter()
            .all(|(_, address, _)| *address != 13022 && *address != 5600));
    }

    #[tokio::test]
    async fn test_rejects_implausible_and_out_of_tolerance_values() {
        let catalog = Catalog::builtin().unwrap();
        let mut transport = MemoryTransport::default()
            .with_value(ReadFunction::Input, 5018, Encoding::Uint16, 0.1, &[12.0])
            .with_value(ReadFunction::Input, 5600, Encoding::Int16, 1.0, &[2400.0]);
        let expected = ExpectedValues::from([(
            "meter_power".to_string(),
            ExpectedReading::new(1.0, "kW"),
        )]);

        let delta = cross_reference(&mut transport, &catalog, &MatchSet::new(), &["STRING"], &expected)
            .await
            .unwrap();

        assert!(!delta.contains_key("phase_a_voltage"));
        assert!(!delta.contains_key("meter_power"));
    }

    #[tokio::test]
    async fn test_read_failures_are_not_fatal() {
        let catalog = Catalog::builtin().unwrap();
        let mut transport = MemoryTransport::default()
            .with_value(ReadFunction::Input, 5018, Encoding::Uint16, 0.1, &[230.0])
            .with_failure(ReadFunction::Input, 5018)
            .with_value(ReadFunction::Input, 13022, Encoding::Uint16, 0.1, &[80.0]);

        let delta = cross_reference(&mut transport, &catalog, &MatchSet::new(), &["HYBRID"], &ExpectedValues::new())
            .await
            .unwrap();

        assert_eq!(delta.len(), 1);
        assert_eq!(delta.get("battery_level").unwrap().register, 13022);
    }
}
