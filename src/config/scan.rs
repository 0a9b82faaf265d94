// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register scan configuration

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::scanner::ScanOptions;

/// Address range and sampling of the register scan.
///
/// `end` is exclusive and may be 65536 to reach the last register.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanConfig {
    pub start: u16,
    pub end: u32,
    /// Reads per register; more samples make sign changes visible.
    pub samples: usize,
    pub sample_interval_ms: u64,
}

impl Default for ScanConfig {
    fn default() -> Self {
        let options = ScanOptions::default();
        Self {
            start: options.start,
            end: options.end,
            samples: options.samples,
            sample_interval_ms: options.sample_interval.as_millis() as u64,
        }
    }
}

impl ScanConfig {
    pub fn options(&self) -> ScanOptions {
        ScanOptions {
            start: self.start,
            end: self.end,
            samples: self.samples,
            sample_interval: Duration::from_millis(self.sample_interval_ms),
        }
    }
}
