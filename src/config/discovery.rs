// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Operator decision defaults

use serde::{Deserialize, Serialize};

use crate::reconcile::ConflictPolicy;

/// How decisions are made when nobody is asked.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscoveryConfig {
    /// Answer to every register conflict: `keep` the discovered register or
    /// revert to the `catalog` one.
    pub conflict_policy: ConflictPolicy,

    /// Register to pick among the meter power candidates, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meter_candidate: Option<u16>,
}
