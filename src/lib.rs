// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus register discovery for solar inverters
//!
//! This library works out which unlabeled Modbus registers of an inverter
//! hold which metric. It scans an address range, decodes every register,
//! compares the values with reference readings taken by an operator and
//! with a catalog of known register layouts, and emits a register map.
//!
//! The phases run in order over a single connection:
//!
//! 1. [`identity`]: device type code and serial number
//! 2. [`scanner`]: sampled range scan, tolerance matches and ranked candidates
//! 3. [`crossref`]: catalog registers for the metrics still missing
//! 4. [`reconcile`]: discovered registers that disagree with the catalog
//!
//! [`session::DiscoverySession`] drives them and [`report`] writes the
//! results.

pub mod catalog;
pub mod config;
pub mod crossref;
pub mod error;
pub mod identity;
pub mod matches;
pub mod modbus;
pub mod prompt;
pub mod reconcile;
pub mod registers;
pub mod report;
pub mod scanner;
pub mod session;
pub mod transport;
pub mod units;

pub use error::DiscoveryError;
