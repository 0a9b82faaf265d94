// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated inverter
//!
//! This module provides a Modbus TCP server that answers like a solar
//! inverter, so discovery can be exercised without hardware.
//!
//! ## Key Components
//!
//! - [`RegisterBank`]: register storage where every read can return the next
//!   sample of a sequence, so values move between scan samples
//! - [`SimulatedInverter`]: the `tokio-modbus` service serving a bank
//!
//! ## Usage
//!
//! ```no_run
//! use rust_modbus_discovery::identity::DeviceFamily;
//! use rust_modbus_discovery::modbus::{serve, SimulatedInverter};
//! use tokio::net::TcpListener;
//!
//! # async fn run() -> std::io::Result<()> {
//! let listener = TcpListener::bind("127.0.0.1:5020").await?;
//! serve(listener, SimulatedInverter::demo(DeviceFamily::String)).await
//! # }
//! ```
//!
//! ## Register Map of the demo profile
//!
//! ### Input Registers
//!
//! - Register 4989..4999: serial number, packed ASCII
//! - Register 4999: device type code
//! - Register 5000..5200: live values at the catalog addresses of the
//!   STRING family, zero elsewhere
//! - Register 5600: meter power (STRING), 13000.. block (HYBRID)

pub mod bank;
pub mod modbus_server;

pub use bank::RegisterBank;
pub use modbus_server::{serve, SimulatedInverter};
