// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Discovery output artifacts
//!
//! - [`RegisterMap`]: the compact `{version, model, metrics}` document other
//!   tools consume
//! - [`DiscoveryReport`]: everything behind it (identity, raw matches, ranked
//!   candidates, conflict outcomes) for a human to audit

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::identity::{DeviceFamily, DeviceIdentity};
use crate::matches::{Match, MatchSet};
use crate::reconcile::ResolvedConflict;
use crate::scanner::CandidateStat;
use crate::transport::DeviceTarget;

pub const REGISTER_MAP_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegisterEntry {
    pub register: u16,
}

/// Final metric to register mapping for one device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisterMap {
    pub version: u32,
    pub model: DeviceFamily,
    pub metrics: BTreeMap<String, RegisterEntry>,
}

impl RegisterMap {
    pub fn from_matches(model: DeviceFamily, matches: &MatchSet) -> Self {
        Self {
            version: REGISTER_MAP_VERSION,
            model,
            metrics: matches
                .iter()
                .map(|found| {
                    (
                        found.metric_id.clone(),
                        RegisterEntry {
                            register: found.register,
                        },
                    )
                })
                .collect(),
        }
    }

    pub fn register(&self, metric_id: &str) -> Option<u16> {
        self.metrics.get(metric_id).map(|entry| entry.register)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read register map {}", path.display()))?;
        let map: RegisterMap = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse register map {}", path.display()))?;
        if map.version != REGISTER_MAP_VERSION {
            anyhow::bail!("Unsupported register map version {}", map.version);
        }
        Ok(map)
    }

    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self)
    }
}

/// Detailed record of one discovery session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryReport {
    pub generated_at: DateTime<Utc>,
    pub target: DeviceTarget,
    pub identity: DeviceIdentity,
    pub model: DeviceFamily,
    pub scan_start: u16,
    pub scan_end: u32,
    pub matches: Vec<Match>,
    /// Best meter power candidates, at most five.
    pub meter_candidates: Vec<CandidateStat>,
    pub conflicts: Vec<ResolvedConflict>,
    /// Catalog metrics that ended the session without a register.
    pub unresolved: Vec<String>,
}

impl DiscoveryReport {
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        write_json(path.as_ref(), self)
    }
}

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(value).context("Failed to serialize to JSON")?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    Ok(())
}
