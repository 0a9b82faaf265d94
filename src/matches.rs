// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Discovered register mappings
//!
//! Each discovery phase returns a [`MatchDelta`] instead of touching shared
//! state. [`MatchSet::merge`] folds deltas in, keeping at most one live
//! [`Match`] per metric. A match is never removed, only replaced by one of
//! equal or higher [`MatchSource`] priority.

use std::collections::BTreeMap;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::registers::{Category, Encoding};

/// Where a match came from, in increasing priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchSource {
    /// Catalog register confirmed by a live read
    CatalogConfirmed,
    /// Ranked candidate picked by the operator
    OperatorSelected,
    /// Scan average within tolerance of the reference reading
    ScanConfirmed,
    /// Operator chose the catalog register over a discovered one
    Reverted,
}

/// A metric bound to a physical register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub metric_id: String,
    pub register: u16,
    pub value: f64,
    pub encoding: Encoding,
    pub category: Category,
    pub tolerance_difference: Option<f64>,
    pub auto: bool,
    pub source: MatchSource,
}

/// Matches produced by one phase, keyed by metric id.
pub type MatchDelta = BTreeMap<String, Match>;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MatchSet {
    matches: BTreeMap<String, Match>,
}

impl MatchSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold `delta` in. Returns how many live matches changed.
    pub fn merge(&mut self, delta: MatchDelta) -> usize {
        let mut changed = 0;
        for (metric_id, incoming) in delta {
            match self.matches.get(&metric_id) {
                Some(live) if live.source > incoming.source => {
                    debug!(
                        "Keeping {:?} match for {} at {}, ignoring {:?} at {}",
                        live.source, metric_id, live.register, incoming.source, incoming.register
                    );
                }
                _ => {
                    self.matches.insert(metric_id, incoming);
                    changed += 1;
                }
            }
        }
        changed
    }

    pub fn get(&self, metric_id: &str) -> Option<&Match> {
        self.matches.get(metric_id)
    }

    pub fn contains(&self, metric_id: &str) -> bool {
        self.matches.contains_key(metric_id)
    }

    /// Matches in metric id order.
    pub fn iter(&self) -> impl Iterator<Item = &Match> {
        self.matches.values()
    }

    pub fn len(&self) -> usize {
        self.matches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.matches.is_empty()
    }
}

impl FromIterator<Match> for MatchSet {
    fn from_iter<I: IntoIterator<Item = Match>>(iter: I) -> Self {
        let mut set = MatchSet::new();
        set.merge(
            iter.into_iter()
                .map(|m| (m.metric_id.clone(), m))
                .collect(),
        );
        set
    }
}

#[cfg(test)]
pub(crate) fn sample_match(metric_id: &str, register: u16, source: MatchSource) -> Match {
    Match {
        metric_id: metric_id.to_string(),
        register,
        value: 1.0,
        encoding: Encoding::Int16,
        category: Category::Power,
        tolerance_difference: None,
        auto: source != MatchSource::OperatorSelected,
        source,
    }
}
