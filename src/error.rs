// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Error types for the discovery engine
//!
//! Configuration problems (an invalid catalog, an unknown unit, a bad scan
//! range) are fatal and surface as [`DiscoveryError`]. Transport problems on a
//! single register are recoverable and are handled where they occur; only a
//! failure to open the connection at all bubbles up as
//! [`DiscoveryError::Transport`].

use thiserror::Error;

use crate::transport::TransportError;

/// Errors raised by the discovery engine
#[derive(Error, Debug)]
pub enum DiscoveryError {
    /// The catalog names an encoding the decoder does not support.
    #[error("Unsupported register encoding '{tag}'")]
    UnsupportedEncoding { tag: String },

    /// The device answered with fewer words than the encoding needs.
    #[error("Encoding {encoding} needs {expected} words, got {got}")]
    ShortRead {
        encoding: String,
        expected: usize,
        got: usize,
    },

    #[error("Invalid catalog: {reason}")]
    InvalidCatalog { reason: String },

    #[error("Unknown unit '{unit}'")]
    UnknownUnit { unit: String },

    #[error("Cannot convert a value in {from} to {to}")]
    IncompatibleUnits { from: String, to: String },

    #[error("Invalid scan range {start}..{end}: start must be below end")]
    InvalidScanRange { start: u16, end: u32 },

    #[error("Metric '{metric_id}' is not in the catalog")]
    UnknownMetric { metric_id: String },

    #[error(transparent)]
    Transport(#[from] TransportError),
}

impl DiscoveryError {
    /// Configuration errors mean the catalog or the session parameters must be
    /// fixed; they are never treated as live-data noise.
    pub fn is_configuration_error(&self) -> bool {
        !matches!(
            self,
            DiscoveryError::ShortRead { .. } | DiscoveryError::Transport(_)
        )
    }
}
