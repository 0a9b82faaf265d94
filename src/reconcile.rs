// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Reconciliation of discovered registers with the catalog
//!
//! Every live match whose metric has a catalog register for the detected
//! model is compared with that register. Disagreements go to a
//! [`ConflictResolver`]. Reverting to the catalog register costs a fresh read
//! and only replaces the discovered match when that read is plausible.

use std::fmt;
use std::str::FromStr;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::matches::{Match, MatchDelta, MatchSet, MatchSource};
use crate::transport::{read_decoded, RegisterTransport};

/// A discovered register that disagrees with the catalog.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterConflict {
    pub metric_id: String,
    pub discovered: Match,
    pub catalog_register: u16,
}

impl fmt::Display for RegisterConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: discovered register {} (value {}), catalog register {}",
            self.metric_id, self.discovered.register, self.discovered.value, self.catalog_register
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resolution {
    KeepDiscovered,
    RevertToCatalog,
}

/// Decides each conflict.
#[cfg_attr(test, mockall::automock)]
pub trait ConflictResolver {
    fn resolve(&mut self, conflict: &RegisterConflict) -> Resolution;
}

/// The same answer for every conflict.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConflictPolicy {
    #[default]
    Keep,
    Catalog,
}

impl ConflictResolver for ConflictPolicy {
    fn resolve(&mut self, _conflict: &RegisterConflict) -> Resolution {
        match self {
            ConflictPolicy::Keep => Resolution::KeepDiscovered,
            ConflictPolicy::Catalog => Resolution::RevertToCatalog,
        }
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "keep" => Ok(ConflictPolicy::Keep),
            "catalog" => Ok(ConflictPolicy::Catalog),
            other => Err(format!("unknown conflict policy '{other}'")),
        }
    }
}

/// How a conflict ended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedConflict {
    pub conflict: RegisterConflict,
    pub resolution: Resolution,
    /// False when a revert was asked for but the catalog register failed to
    /// read or validate.
    pub applied: bool,
}

/// Live matches whose register differs from the catalog register for
/// `model_keys`.
pub fn find_conflicts(catalog: &Catalog, matches: &MatchSet, model_keys: &[&str]) -> Vec<RegisterConflict> {
    matches
        .iter()
        .filter_map(|found| {
            let definition = catalog.get(&found.metric_id)?;
            let catalog_register = definition.register_for_any(model_keys)?;
            (catalog_register != found.register).then(|| RegisterConflict {
                metric_id: found.metric_id.clone(),
                discovered: found.clone(),
                catalog_register,
            })
        })
        .collect()
}

/// Resolve every conflict and return the replacements to merge.
pub async fn reconcile<T>(
    transport: &mut T,
    catalog: &Catalog,
    matches: &MatchSet,
    model_keys: &[&str],
    resolver: &mut dyn ConflictResolver,
) -> (MatchDelta, Vec<ResolvedConflict>)
where
    T: RegisterTransport + ?Sized,
{
    let mut delta = MatchDelta::new();
    let mut resolved = Vec::new();

    for conflict in find_conflicts(catalog, matches, model_keys) {
        info!("Register conflict for {}", conflict);
        let resolution = resolver.resolve(&conflict);
        let mut applied = resolution == Resolution::KeepDiscovered;

        if resolution == Resolution::RevertToCatalog {
            match revert(transport, catalog, &conflict).await {
                Some(reverted) => {
                    info!(
                        "{} reverted to catalog register {}",
                        conflict.metric_id, conflict.catalog_register
                    );
                    delta.insert(conflict.metric_id.clone(), reverted);
                    applied = true;
                }
                None => warn!(
                    "Keeping discovered register {} for {}: catalog register {} did not validate",
                    conflict.discovered.register, conflict.metric_id, conflict.catalog_register
                ),
            }
        }

        resolved.push(ResolvedConflict {
            conflict,
            resolution,
            applied,
        });
    }

    (delta, resolved)
}

async fn revert<T>(transport: &mut T, catalog: &Catalog, conflict: &RegisterConflict) -> Option<Match>
where
    T: RegisterTransport + ?Sized,
{
    let definition = catalog.get(&conflict.metric_id)?;
    let value = match read_decoded(transport, conflict.catalog_register, &definition.read).await {
        Ok(value) => value,
        Err(err) => {
            warn!("Cannot read catalog register {}: {}", conflict.catalog_register, err);
            return None;
        }
    };
    if !definition.category.is_plausible(value) {
        return None;
    }
    Some(Match {
        metric_id: conflict.metric_id.clone(),
        register: conflict.catalog_register,
        value,
        encoding: definition.read.encoding,
        category: definition.category,
        tolerance_difference: None,
        auto: false,
        source: MatchSource::Reverted,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::{CatalogFile, MetricRecord, ReadRecord, RegisterRef};
    use crate::registers::{Encoding, ReadFunction};
    use crate::transport::MemoryTransport;

    /// Meter power at 5012 for every model.
    fn catalog() -> Catalog {
        Catalog::try_from(CatalogFile {
            version: 1,
            metrics: vec![MetricRecord {
                id: "meter_power".to_string(),
                name: None,
                unit: Some("W".to_string()),
                category: Some("power".to_string()),
                default: RegisterRef {
                    register: Some(5012),
                },
                models: Default::default(),
                read: ReadRecord {
                    function: ReadFunction::Input,
                    words: 1,
                    encoding: "int16".to_string(),
                    scale: 1.0,
                },
                discovery: None,
            }],
        })
        .unwrap()
    }

    fn discovered() -> MatchSet {
        MatchSet::from_iter([Match {
            metric_id: "meter_power".to_string(),
            register: 5010,
            value: 1480.0,
            encoding: Encoding::Int16,
            category: crate::registers::Category::Power,
            tolerance_difference: Some(20.0),
            auto: true,
            source: MatchSource::ScanConfirmed,
        }])
    }

    #[tokio::test]
    async fn test_keep_retains_discovered_register() {
        let mut transport = MemoryTransport::default();
        let mut resolver = MockConflictResolver::new();
        resolver
            .expect_resolve()
            .withf(|c| c.discovered.register == 5010 && c.catalog_register == 5012)
            .times(1)
            .return_const(Resolution::KeepDiscovered);

        let mut matches = discovered();
        let (delta, resolved) =
            reconcile(&mut transport, &catalog(), &matches, &["STRING"], &mut resolver).await;
        matches.merge(delta);

        assert_eq!(matches.get("meter_power").unwrap().register, 5010);
        assert!(resolved[0].applied);
        assert!(transport.requests().is_empty());
    }

    #[tokio::test]
    async fn test_revert_replaces_after_valid_read() {
        let mut transport =
            MemoryTransport::default().with_value(ReadFunction::Input, 5012, Encoding::Int16, 1.0, &[1500.0]);

        let mut matches = discovered();
        let (delta, resolved) = reconcile(
            &mut transport,
            &catalog(),
            &matches,
            &["STRING"],
            &mut ConflictPolicy::Catalog,
        )
        .await;
        matches.merge(delta);

        let live = matches.get("meter_power").unwrap();
        assert_eq!(live.register, 5012);
        assert_eq!(live.source, MatchSource::Reverted);
        assert_eq!(resolved[0].resolution, Resolution::RevertToCatalog);
        assert!(resolved[0].applied);
    }

    #[tokio::test]
    async fn test_revert_keeps_match_when_catalog_register_is_idle() {
        let mut transport =
            MemoryTransport::default().with_value(ReadFunction::Input, 5012, Encoding::Int16, 1.0, &[0.0]);

        let mut matches = discovered();
        let (delta, resolved) = reconcile(
            &mut transport,
            &catalog(),
            &matches,
            &["STRING"],
            &mut ConflictPolicy::Catalog,
        )
        .await;
        matches.merge(delta);

        assert_eq!(matches.get("meter_power").unwrap().register, 5010);
        assert!(!resolved[0].applied);
    }

    #[test]
    fn test_no_conflict_when_registers_agree() {
        let mut matches = discovered();
        matches.merge(MatchDelta::from([(
            "meter_power".to_string(),
            Match {
                register: 5012,
                ..matches.get("meter_power").unwrap().clone()
            },
        )]));
        assert!(find_conflicts(&catalog(), &matches, &["STRING"]).is_empty());
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("Catalog".parse::<ConflictPolicy>(), Ok(ConflictPolicy::Catalog));
        assert!("ask".parse::<ConflictPolicy>().is_err());
    }
}
