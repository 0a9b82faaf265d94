// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Discovery session
//!
//! One session owns one transport connection and runs the phases in order:
//! identity detection, range scan, candidate selection, catalog
//! cross-reference and reconciliation. Each phase hands back a delta that is
//! merged into the session's [`MatchSet`]. The connection is closed whatever
//! the outcome.

use std::time::Duration;

use chrono::Utc;
use log::{info, warn};

use crate::catalog::Catalog;
use crate::crossref::cross_reference;
use crate::error::DiscoveryError;
use crate::identity::{detect_identity, DeviceFamily, DeviceIdentity};
use crate::matches::MatchSet;
use crate::reconcile::{reconcile, ConflictResolver, ResolvedConflict};
use crate::report::{DiscoveryReport, RegisterMap};
use crate::scanner::{
    select_meter_candidate, CandidateSelector, ExpectedValues, RangeScanner, ScanOptions, ScanOutcome,
};
use crate::transport::{DeviceTarget, ModbusTcpTransport, RegisterTransport, DEFAULT_TIMEOUT};

/// Everything a session needs besides the catalog and the operator.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub target: DeviceTarget,
    pub timeout: Duration,
    pub scan: ScanOptions,
    /// Family assumed when the model cannot be detected.
    pub default_family: DeviceFamily,
    pub expected: ExpectedValues,
}

impl SessionOptions {
    pub fn new(target: DeviceTarget) -> Self {
        Self {
            target,
            timeout: DEFAULT_TIMEOUT,
            scan: ScanOptions::default(),
            default_family: DeviceFamily::default(),
            expected: ExpectedValues::new(),
        }
    }
}

/// What a session found.
#[derive(Debug, Clone)]
pub struct SessionOutcome {
    pub identity: DeviceIdentity,
    pub family: DeviceFamily,
    pub matches: MatchSet,
    pub scan: ScanOutcome,
    pub conflicts: Vec<ResolvedConflict>,
}

impl SessionOutcome {
    pub fn register_map(&self) -> RegisterMap {
        RegisterMap::from_matches(self.family, &self.matches)
    }

    pub fn report(&self, options: &SessionOptions, catalog: &Catalog) -> DiscoveryReport {
        DiscoveryReport {
            generated_at: Utc::now(),
            target: options.target.clone(),
            identity: self.identity.clone(),
            model: self.family,
            scan_start: options.scan.start,
            scan_end: options.scan.end,
            matches: self.matches.iter().cloned().collect(),
            meter_candidates: self.scan.top_candidates().to_vec(),
            conflicts: self.conflicts.clone(),
            unresolved: catalog
                .iter()
                .filter(|definition| !self.matches.contains(&definition.id))
                .map(|definition| definition.id.clone())
                .collect(),
        }
    }
}

pub struct DiscoverySession<'a> {
    catalog: &'a Catalog,
    options: SessionOptions,
    scanner: RangeScanner,
}

impl<'a> DiscoverySession<'a> {
    /// Validate the options. Nothing is sent to the device yet.
    pub fn new(catalog: &'a Catalog, options: SessionOptions) -> Result<Self, DiscoveryError> {
        let scanner = RangeScanner::new(options.scan.clone())?;
        Ok(Self {
            catalog,
            options,
            scanner,
        })
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    /// Connect to the configured device and run the session.
    ///
    /// Failing to connect is the only transport problem that aborts.
    pub async fn run(
        &self,
        selector: &mut dyn CandidateSelector,
        resolver: &mut dyn ConflictResolver,
    ) -> Result<SessionOutcome, DiscoveryError> {
        let mut transport = ModbusTcpTransport::connect(&self.options.target, self.options.timeout).await?;
        self.run_with(&mut transport, selector, resolver).await
    }

    /// Run the session over an already open transport, then close it.
    pub async fn run_with<T>(
        &self,
        transport: &mut T,
        selector: &mut dyn CandidateSelector,
        resolver: &mut dyn ConflictResolver,
    ) -> Result<SessionOutcome, DiscoveryError>
    where
        T: RegisterTransport + ?Sized,
    {
        let outcome = self.discover(transport, selector, resolver).await;
        transport.close().await;
        outcome
    }

    async fn discover<T>(
        &self,
        transport: &mut T,
        selector: &mut dyn CandidateSelector,
        resolver: &mut dyn ConflictResolver,
    ) -> Result<SessionOutcome, DiscoveryError>
    where
        T: RegisterTransport + ?Sized,
    {
        let identity = detect_identity(transport).await;
        let family = identity.family_or(self.options.default_family);
        if identity.family.is_none() {
            warn!("Model unknown, using the {} catalog registers", family);
        }
        let keys = identity.catalog_keys(self.options.default_family);
        let model_keys: Vec<&str> = keys.iter().map(String::as_str).collect();

        let mut matches = MatchSet::new();

        let scan = self
            .scanner
            .scan(transport, self.catalog, &self.options.expected)
            .await?;
        matches.merge(scan.matches.clone());
        matches.merge(select_meter_candidate(selector, self.catalog, &scan));

        let delta = cross_reference(
            transport,
            self.catalog,
            &matches,
            &model_keys,
            &self.options.expected,
        )
        .await?;
        matches.merge(delta);

        let (delta, conflicts) = reconcile(transport, self.catalog, &matches, &model_keys, resolver).await;
        matches.merge(delta);

        info!(
            "Discovery finished: {} of {} metrics mapped",
            matches.len(),
            self.catalog.len()
        );
        Ok(SessionOutcome {
            identity,
            family,
            matches,
            scan,
            conflicts,
        })
    }
}
