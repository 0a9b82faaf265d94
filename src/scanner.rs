// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Range scanner
//!
//! Walks an address range in ascending order, samples every register a few
//! times and compares the running average with the operator's reference
//! readings for the scan targets. A register within tolerance becomes a
//! confirmed match. Plausible meter power registers that match nothing are
//! kept as ranked candidates for the operator to choose from.
//!
//! Requests are strictly sequential: the transport is borrowed mutably for
//! the whole scan and each read is awaited before the next one is issued.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::time::Duration;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::catalog::import::{GRID_EXPORT_ENERGY, GRID_IMPORT_ENERGY, METER_POWER};
use crate::catalog::{Catalog, MetricDefinition};
use crate::error::DiscoveryError;
use crate::matches::{Match, MatchDelta, MatchSource};
use crate::registers::{within_tolerance, Category, ReadSpec};
use crate::transport::{read_decoded, RegisterTransport};
use crate::units::ExpectedReading;

/// Metrics the scanner looks for, in priority order.
pub const SCAN_TARGETS: [&str; 3] = [METER_POWER, GRID_IMPORT_ENERGY, GRID_EXPORT_ENERGY];

/// Number of ranked candidates worth showing to an operator.
pub const CANDIDATE_REPORT_LIMIT: usize = 5;

/// Operator reference readings keyed by metric id.
pub type ExpectedValues = BTreeMap<String, ExpectedReading>;

/// Aggregate over the samples taken at one register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateStat {
    pub register: u16,
    pub average: f64,
    pub min: f64,
    pub max: f64,
    pub sample_count: usize,
    pub sign_changes: usize,
    /// Distance between the average and the reference reading, when one was
    /// supplied.
    pub tolerance_difference: Option<f64>,
    #[serde(skip)]
    last: Option<f64>,
}

impl CandidateStat {
    pub fn new(register: u16) -> Self {
        Self {
            register,
            average: 0.0,
            min: f64::INFINITY,
            max: f64::NEG_INFINITY,
            sample_count: 0,
            sign_changes: 0,
            tolerance_difference: None,
            last: None,
        }
    }

    pub fn from_samples(register: u16, samples: &[f64]) -> Self {
        let mut stat = Self::new(register);
        for sample in samples {
            stat.record(*sample);
        }
        stat
    }

    /// Add one sample to the running aggregate.
    pub fn record(&mut self, value: f64) {
        self.sample_count += 1;
        self.average += (value - self.average) / self.sample_count as f64;
        self.min = self.min.min(value);
        self.max = self.max.max(value);
        if let Some(last) = self.last {
            if last * value < 0.0 {
                self.sign_changes += 1;
            }
        }
        self.last = Some(value);
    }

    pub fn range(&self) -> f64 {
        if self.sample_count == 0 {
            0.0
        } else {
            self.max - self.min
        }
    }

    /// Every sample inside the category interval and a plausible average.
    pub fn is_plausible(&self, category: Category) -> bool {
        if self.sample_count == 0 || !category.is_plausible(self.average) {
            return false;
        }
        match category.plausible_range() {
            Some(range) => range.min <= self.min && self.max <= range.max,
            None => true,
        }
    }
}

/// Ranking order for meter power candidates.
///
/// Closest to the reference first (candidates without one last), then the
/// most sign changes, then the tightest observed range, then the lowest
/// address.
pub fn rank_candidates(a: &CandidateStat, b: &CandidateStat) -> Ordering {
    let by_difference = match (a.tolerance_difference, b.tolerance_difference) {
        (Some(x), Some(y)) => x.total_cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_difference
        .then_with(|| b.sign_changes.cmp(&a.sign_changes))
        .then_with(|| a.range().total_cmp(&b.range()))
        .then_with(|| a.register.cmp(&b.register))
}

/// Address range and sampling parameters of a scan.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanOptions {
    pub start: u16,
    /// Exclusive end, may be 65536 to include the last register.
    pub end: u32,
    pub samples: usize,
    pub sample_interval: Duration,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            start: 5000,
            end: 5200,
            samples: 3,
            sample_interval: Duration::from_millis(500),
        }
    }
}

impl ScanOptions {
    pub fn validate(&self) -> Result<(), DiscoveryError> {
        if u32::from(self.start) >= self.end || self.end > u32::from(u16::MAX) + 1 {
            return Err(DiscoveryError::InvalidScanRange {
                start: self.start,
                end: self.end,
            });
        }
        Ok(())
    }
}

/// Result of a scan.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanOutcome {
    pub matches: MatchDelta,
    /// Meter power candidates, best first. Empty once meter power matched.
    pub meter_candidates: Vec<CandidateStat>,
}

impl ScanOutcome {
    pub fn top_candidates(&self) -> &[CandidateStat] {
        let len = self.meter_candidates.len().min(CANDIDATE_REPORT_LIMIT);
        &self.meter_candidates[..len]
    }
}

struct Target<'a> {
    definition: &'a MetricDefinition,
    expected: Option<f64>,
    matched: bool,
}

impl Target<'_> {
    /// Whether the target still needs samples.
    fn is_active(&self) -> bool {
        !self.matched && (self.expected.is_some() || self.definition.id == METER_POWER)
    }
}

#[derive(Debug, Clone)]
pub struct RangeScanner {
    options: ScanOptions,
}

impl RangeScanner {
    pub fn new(options: ScanOptions) -> Result<Self, DiscoveryError> {
        options.validate()?;
        Ok(Self { options })
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    /// Scan the configured range.
    ///
    /// Only configuration problems are errors: an expected reading for a
    /// metric the catalog does not define, or in a unit that cannot be
    /// converted to the metric's unit. A register that fails to read is
    /// skipped.
    pub async fn scan<T>(
        &self,
        transport: &mut T,
        catalog: &Catalog,
        expected: &ExpectedValues,
    ) -> Result<ScanOutcome, DiscoveryError>
    where
        T: RegisterTransport + ?Sized,
    {
        if let Some(metric_id) = expected.keys().find(|id| catalog.get(id).is_none()) {
            return Err(DiscoveryError::UnknownMetric {
                metric_id: metric_id.clone(),
            });
        }

        let mut targets = Vec::with_capacity(SCAN_TARGETS.len());
        for id in SCAN_TARGETS {
            let Some(definition) = catalog.get(id) else {
                warn!("Scan target {} is not in the catalog", id);
                continue;
            };
            let expected = match expected.get(id) {
                Some(reading) => Some(reading.in_unit(definition.unit.as_deref())?),
                None => None,
            };
            targets.push(Target {
                definition,
                expected,
                matched: false,
            });
        }

        info!(
            "Scanning registers {}..{} ({} samples per register)",
            self.options.start, self.options.end, self.options.samples
        );

        let mut outcome = ScanOutcome::default();
        let mut candidates: Vec<CandidateStat> = Vec::new();
        let mut consumed: Vec<(u16, u32)> = Vec::new();

        for address in u32::from(self.options.start)..self.options.end {
            let Ok(address) = u16::try_from(address) else {
                break;
            };
            if !targets.iter().any(Target::is_active) {
                debug!("All scan targets resolved, stopping at {}", address);
                break;
            }

            'specs: for spec in distinct_specs(&targets) {
                if u32::from(address) + u32::from(spec.words) > u32::from(u16::MAX) + 1 {
                    continue;
                }
                let Some(mut stat) = self.sample(transport, address, &spec).await else {
                    continue;
                };

                for target in targets
                    .iter_mut()
                    .filter(|t| t.is_active() && t.definition.read == spec)
                {
                    let category = target.definition.category;
                    let Some(expected) = target.expected else {
                        continue;
                    };
                    if let Some(difference) = within_tolerance(category, expected, stat.average) {
                        info!(
                            "Register {} matches {} (average {:.3}, expected {:.3}, difference {:.3})",
                            address, target.definition.id, stat.average, expected, difference
                        );
                        target.matched = true;
                        consumed.push((address, u32::from(address) + u32::from(spec.words)));
                        outcome.matches.insert(
                            target.definition.id.clone(),
                            Match {
                                metric_id: target.definition.id.clone(),
                                register: address,
                                value: stat.average,
                                encoding: spec.encoding,
                                category,
                                tolerance_difference: Some(difference),
                                auto: true,
                                source: MatchSource::ScanConfirmed,
                            },
                        );
                        break 'specs;
                    }
                }

                if let Some(meter) = targets
                    .iter()
                    .find(|t| t.is_active() && t.definition.id == METER_POWER && t.definition.read == spec)
                {
                    if stat.is_plausible(meter.definition.category) {
                        stat.tolerance_difference =
                            meter.expected.map(|expected| (stat.average - expected).abs());
                        candidates.push(stat);
                    }
                }
            }
        }

        if !outcome.matches.contains_key(METER_POWER) {
            candidates.retain(|candidate| {
                !consumed.iter().any(|(start, end)| {
                    candidate.register >= *start && u32::from(candidate.register) < *end
                })
            });
            candidates.sort_by(rank_candidates);
            outcome.meter_candidates = candidates;
        }

        info!(
            "Scan finished: {} matches, {} meter power candidates",
            outcome.matches.len(),
            outcome.meter_candidates.len()
        );
        Ok(outcome)
    }

    /// Sample one register. `None` when no sample could be read.
    ///
    /// A sample lost to a timeout or a protocol error is skipped and sampling
    /// goes on. Any other failure ends sampling of this register.
    async fn sample<T>(&self, transport: &mut T, address: u16, spec: &ReadSpec) -> Option<CandidateStat>
    where
        T: RegisterTransport + ?Sized,
    {
        let samples = self.options.samples.max(1);
        let mut stat = CandidateStat::new(address);
        for i in 0..samples {
            match read_decoded(transport, address, spec).await {
                Ok(value) if value.is_finite() => stat.record(value),
                Ok(_) => {
                    debug!("Register {} decodes to a non-finite value", address);
                    return None;
                }
                Err(DiscoveryError::Transport(err)) if err.is_transient() => {
                    debug!("Sample {} of register {} lost: {}", i + 1, address, err);
                }
                Err(err) => {
                    debug!("No data at register {}: {}", address, err);
                    break;
                }
            }
            if i + 1 < samples && !self.options.sample_interval.is_zero() {
                tokio::time::sleep(self.options.sample_interval).await;
            }
        }
        (stat.sample_count > 0).then_some(stat)
    }
}

/// Read specs of the active targets, each once, in target order.
fn distinct_specs(targets: &[Target<'_>]) -> Vec<ReadSpec> {
    let mut specs: Vec<ReadSpec> = Vec::new();
    for target in targets.iter().filter(|t| t.is_active()) {
        if !specs.contains(&target.definition.read) {
            specs.push(target.definition.read);
        }
    }
    specs
}

/// Operator choice among ranked candidates.
#[cfg_attr(test, mockall::automock)]
pub trait CandidateSelector {
    /// Pick a register for `metric_id` out of `candidates` (best first), or
    /// `None` to leave the metric unresolved.
    fn select(&mut self, metric_id: &str, candidates: &[CandidateStat]) -> Option<u16>;
}

/// Never picks anything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoSelection;

impl CandidateSelector for NoSelection {
    fn select(&mut self, _metric_id: &str, _candidates: &[CandidateStat]) -> Option<u16> {
        None
    }
}

/// Picks a register decided in advance, if it is among the candidates.
#[derive(Debug, Clone, Copy)]
pub struct FixedCandidate(pub u16);

impl CandidateSelector for FixedCandidate {
    fn select(&mut self, metric_id: &str, candidates: &[CandidateStat]) -> Option<u16> {
        if candidates.iter().any(|c| c.register == self.0) {
            Some(self.0)
        } else {
            warn!("Register {} is not a candidate for {}", self.0, metric_id);
            None
        }
    }
}

/// Turn the operator's pick into a match for meter power.
pub fn select_meter_candidate(
    selector: &mut dyn CandidateSelector,
    catalog: &Catalog,
    outcome: &ScanOutcome,
) -> MatchDelta {
    let mut delta = MatchDelta::new();
    if outcome.matches.contains_key(METER_POWER) || outcome.meter_candidates.is_empty() {
        return delta;
    }
    let Some(definition) = catalog.get(METER_POWER) else {
        return delta;
    };
    let Some(register) = selector.select(METER_POWER, outcome.top_candidates()) else {
        info!("No meter power candidate selected");
        return delta;
    };
    let Some(candidate) = outcome
        .meter_candidates
        .iter()
        .find(|c| c.register == register)
    else {
        warn!("Selected register {} is not a ranked candidate", register);
        return delta;
    };

    info!("Operator selected register {} for {}", register, METER_POWER);
    delta.insert(
        METER_POWER.to_string(),
        Match {
            metric_id: METER_POWER.to_string(),
            register,
            value: candidate.average,
            encoding: definition.read.encoding,
            category: definition.category,
            tolerance_difference: candidate.tolerance_difference,
            auto: false,
            source: MatchSource::OperatorSelected,
        },
    );
    delta
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registers::{Encoding, ReadFunction};
    use crate::transport::MemoryTransport;

    fn options(start: u16, end: u32) -> ScanOptions {
        ScanOptions {
            start,
            end,
            samples: 3,
            sample_interval: Duration::ZERO,
        }
    }

    fn expect(metric: &str, value: f64, unit: &str) -> ExpectedValues {
        ExpectedValues::from([(metric.to_string(), ExpectedReading::new(value, unit))])
    }

    #[test]
    fn test_sign_changes() {
        assert_eq!(CandidateStat::from_samples(1, &[10.0, -5.0, 3.0, -2.0]).sign_changes, 3);
        assert_eq!(CandidateStat::from_samples(1, &[1.0, 2.0, 3.0, 4.0]).sign_changes, 0);
        assert_eq!(CandidateStat::from_samples(1, &[5.0, 0.0, -5.0]).sign_changes, 0);
    }

    #[test]
    fn test_running_aggregate() {
        let stat = CandidateStat::from_samples(7, &[1470.0, 1490.0, 1480.0]);
        assert_eq!(stat.sample_count, 3);
        assert_eq!(stat.min, 1470.0);
        assert_eq!(stat.max, 1490.0);
        assert!((stat.average - 1480.0).abs() < 1e-9);
        assert_eq!(stat.range(), 20.0);
    }

    #[test]
    fn test_ranking_order() {
        let mut close = CandidateStat::from_samples(10, &[900.0, 1100.0]);
        close.tolerance_difference = Some(50.0);
        let mut far = CandidateStat::from_samples(5, &[100.0]);
        far.tolerance_difference = Some(900.0);
        let swinging = CandidateStat::from_samples(20, &[-300.0, 300.0, -300.0]);
        let steady = CandidateStat::from_samples(30, &[300.0, 301.0, 302.0]);
        let steadier = CandidateStat::from_samples(40, &[300.0, 300.0, 300.0]);

        let mut ranked = vec![
            steadier.clone(),
            steady.clone(),
            swinging.clone(),
            far.clone(),
            close.clone(),
        ];
        ranked.sort_by(rank_candidates);
        let order: Vec<u16> = ranked.iter().map(|c| c.register).collect();
        assert_eq!(order, vec![10, 5, 20, 40, 30]);
    }

    #[test]
    fn test_invalid_range() {
        assert!(matches!(
            RangeScanner::new(options(5010, 5010)),
            Err(DiscoveryError::InvalidScanRange { start: 5010, end: 5010 })
        ));
        assert!(RangeScanner::new(options(0, 65536)).is_ok());
        assert!(RangeScanner::new(options(0, 65537)).is_err());
    }

    #[tokio::test]
    async fn test_scan_confirms_meter_power_within_tolerance() {
        let catalog = Catalog::builtin().unwrap();
        let mut transport = MemoryTransport::default()
            .with_value(ReadFunction::Input, 5004, Encoding::Int16, 1.0, &[1470.0, 1490.0, 1480.0]);

        let scanner = RangeScanner::new(options(5000, 5010)).unwrap();
        let outcome = scanner
            .scan(&mut transport, &catalog, &expect(METER_POWER, 1.5, "kW"))
            .await
            .unwrap();

        let found = outcome.matches.get(METER_POWER).unwrap();
        assert_eq!(found.register, 5004);
        assert_eq!(found.tolerance_difference, Some(20.0));
        assert!(found.auto);
        assert_eq!(found.source, MatchSource::ScanConfirmed);
        assert!(outcome.meter_candidates.is_empty());
    }

    #[tokio::test]
    async fn test_scan_ranks_candidates_without_reference() {
        let catalog = Catalog::builtin().unwrap();
        let mut transport = MemoryTransport::default()
            .with_value(ReadFunction::Input, 5000, Encoding::Int16, 1.0, &[0.0])
            .with_value(ReadFunction::Input, 5001, Encoding::Int16, 1.0, &[800.0, 810.0, 805.0])
            .with_value(ReadFunction::Input, 5002, Encoding::Int16, 1.0, &[-700.0, 650.0, -720.0])
            .with_failure(ReadFunction::Input, 5003);

        let scanner = RangeScanner::new(options(5000, 5004)).unwrap();
        let outcome = scanner
            .scan(&mut transport, &catalog, &ExpectedValues::new())
            .await
            .unwrap();

        assert!(outcome.matches.is_empty());
        let order: Vec<u16> = outcome.meter_candidates.iter().map(|c| c.register).collect();
        assert_eq!(order, vec![5002, 5001]);
        assert_eq!(outcome.meter_candidates[0].sign_changes, 2);
    }

    #[tokio::test]
    async fn test_lost_sample_does_not_drop_register() {
        let catalog = Catalog::builtin().unwrap();
        let mut transport = MemoryTransport::default()
            .with_value(ReadFunction::Input, 5004, Encoding::Int16, 1.0, &[1470.0, 1490.0])
            .with_failures(ReadFunction::Input, 5004, 1);

        let scanner = RangeScanner::new(options(5004, 5005)).unwrap();
        let outcome = scanner
            .scan(&mut transport, &catalog, &expect(METER_POWER, 1.5, "kW"))
            .await
            .unwrap();

        let found = outcome.matches.get(METER_POWER).unwrap();
        assert_eq!(found.register, 5004);
        // Two of three samples arrived
        assert_eq!(found.value, 1480.0);
        assert_eq!(transport.requests().len(), 3);
    }

    #[tokio::test]
    async fn test_energy_match_excludes_register_from_candidates() {
        let catalog = Catalog::builtin().unwrap();
        let mut transport = MemoryTransport::default()
            .with_value(ReadFunction::Input, 5006, Encoding::Uint32le, 0.1, &[1870.2, 1870.3]);

        let scanner = RangeScanner::new(options(5005, 5009)).unwrap();
        let outcome = scanner
            .scan(&mut transport, &catalog, &expect(GRID_IMPORT_ENERGY, 1.87, "MWh"))
            .await
            .unwrap();

        let found = outcome.matches.get(GRID_IMPORT_ENERGY).unwrap();
        assert_eq!(found.register, 5006);
        assert!(outcome
            .meter_candidates
            .iter()
            .all(|c| c.register != 5006 && c.register != 5007));
    }

    #[tokio::test]
    async fn test_unknown_unit_is_fatal() {
        let catalog = Catalog::builtin().unwrap();
        let mut transport = MemoryTransport::default();
        let scanner = RangeScanner::new(options(5000, 5001)).unwrap();
        let err = scanner
            .scan(&mut transport, &catalog, &expect(METER_POWER, 1.5, "furlong"))
            .await
            .unwrap_err();
        assert!(err.is_configuration_error());
    }

    #[tokio::test]
    async fn test_expected_value_for_unknown_metric_is_fatal() {
        let catalog = Catalog::builtin().unwrap();
        let mut transport = MemoryTransport::default();
        let scanner = RangeScanner::new(options(5000, 5001)).unwrap();
        let err = scanner
            .scan(&mut transport, &catalog, &expect("meter_powr", 1.5, "kW"))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            DiscoveryError::UnknownMetric { ref metric_id } if metric_id == "meter_powr"
        ));
        assert!(transport.requests().is_empty());
    }

    #[test]
    fn test_operator_selection() {
        let catalog = Catalog::builtin().unwrap();
        let outcome = ScanOutcome {
            matches: MatchDelta::new(),
            meter_candidates: vec![
                CandidateStat::from_samples(5002, &[-700.0, 650.0]),
                CandidateStat::from_samples(5001, &[800.0]),
            ],
        };

        let mut selector = MockCandidateSelector::new();
        selector
            .expect_select()
            .withf(|metric, candidates| metric == METER_POWER && candidates.len() == 2)
            .times(1)
            .return_const(Some(5001));
        let delta = select_meter_candidate(&mut selector, &catalog, &outcome);
        let picked = delta.get(METER_POWER).unwrap();
        assert_eq!(picked.register, 5001);
        assert!(!picked.auto);
        assert_eq!(picked.source, MatchSource::OperatorSelected);

        assert!(select_meter_candidate(&mut FixedCandidate(6000), &catalog, &outcome).is_empty());
        assert!(select_meter_candidate(&mut NoSelection, &catalog, &outcome).is_empty());
    }
}
