// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Metric catalog configuration

use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::catalog::Catalog;
use crate::identity::DeviceFamily;

/// Which catalog to load and which family to assume for unknown models.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// Catalog JSON file. The built-in catalog is used when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Family whose registers are used when the model cannot be detected.
    pub default_model: DeviceFamily,
}

impl CatalogConfig {
    pub fn load(&self) -> Result<Catalog> {
        match &self.path {
            Some(path) => Catalog::from_file(path)
                .with_context(|| format!("Failed to load metric catalog from {:?}", path)),
            None => Catalog::builtin().context("Built-in metric catalog is invalid"),
        }
    }
}
