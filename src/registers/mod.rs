// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register-level building blocks
//!
//! - [`encoding`]: turn raw 16-bit words into a scaled number
//! - [`category`]: decide whether a number is plausible for a kind of metric
//! - [`tolerance`]: acceptance band around an operator reference reading
//!
//! [`ReadSpec`] ties them together: it tells the transport which function
//! code and how many words to request, and the decoder how to interpret them.

pub mod category;
pub mod encoding;
pub mod tolerance;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use category::{Category, PlausibleRange};
pub use encoding::{decode, decode_tagged, encode, Encoding};
pub use tolerance::{tolerance_for, within_tolerance};

use crate::error::DiscoveryError;

/// Modbus register table a value lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReadFunction {
    /// Function code 0x03
    Holding,
    /// Function code 0x04
    Input,
}

impl fmt::Display for ReadFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadFunction::Holding => f.write_str("holding"),
            ReadFunction::Input => f.write_str("input"),
        }
    }
}

/// How to read and interpret a metric's register block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ReadSpec {
    pub function: ReadFunction,
    /// Number of registers requested, at least the encoding's word count.
    pub words: u16,
    #[serde(rename = "type")]
    pub encoding: Encoding,
    pub scale: f64,
}

impl ReadSpec {
    pub fn new(function: ReadFunction, encoding: Encoding, scale: f64) -> Self {
        Self {
            function,
            words: encoding.word_count() as u16,
            encoding,
            scale,
        }
    }

    /// Decode words returned for this spec.
    pub fn decode(&self, words: &[u16]) -> Result<f64, DiscoveryError> {
        decode(words, self.encoding, self.scale)
    }
}
