// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Register transport
//!
//! Discovery talks to the device through [`RegisterTransport`]: one request
//! at a time over one persistent connection. The Modbus TCP implementation
//! correlates responses with requests, so callers must never issue
//! overlapping reads; taking `&mut self` on every read enforces that.
//!
//! - [`ModbusTcpTransport`]: a real device over Modbus TCP
//! - [`MemoryTransport`]: register banks held in memory, for replays and tests

mod memory;
mod tcp;

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_modbus::ExceptionCode;

pub use memory::MemoryTransport;
pub use tcp::ModbusTcpTransport;

use crate::error::DiscoveryError;
use crate::registers::{ReadFunction, ReadSpec};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Network location of the device to discover.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceTarget {
    pub host: String,
    pub port: u16,
    /// Modbus unit (slave) id
    pub unit_id: u8,
}

impl fmt::Display for DeviceTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{} (unit {})", self.host, self.port, self.unit_id)
    }
}

/// Errors raised by a transport.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("Cannot resolve device address {target}")]
    Resolve { target: String },

    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        source: std::io::Error,
    },

    #[error("Timed out after {timeout:?} reading {function} register {address}")]
    Timeout {
        function: ReadFunction,
        address: u16,
        timeout: Duration,
    },

    #[error("Device rejected {function} register {address}: {code}")]
    Exception {
        function: ReadFunction,
        address: u16,
        code: ExceptionCode,
    },

    #[error("Modbus error reading {function} register {address}: {source}")]
    Protocol {
        function: ReadFunction,
        address: u16,
        source: tokio_modbus::Error,
    },

    #[error("Transport is closed")]
    Closed,
}

impl TransportError {
    /// Failures that may not repeat on the next request to the same register.
    ///
    /// Exceptions are the device's answer for that address and repeat.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransportError::Timeout { .. } | TransportError::Protocol { .. }
        )
    }
}

/// Collaborator contract for reading registers from a device.
#[async_trait]
pub trait RegisterTransport: Send {
    /// Read `count` holding registers (function code 0x03).
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    /// Read `count` input registers (function code 0x04).
    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError>;

    /// Release the connection. Safe to call more than once.
    async fn close(&mut self);

    async fn read(
        &mut self,
        function: ReadFunction,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        match function {
            ReadFunction::Holding => self.read_holding_registers(address, count).await,
            ReadFunction::Input => self.read_input_registers(address, count).await,
        }
    }
}

/// Read the block described by `spec` at `address` and decode it.
///
/// Transport failures and short answers are returned as errors; callers in
/// the discovery phases treat them as "no data for this register".
pub async fn read_decoded<T>(
    transport: &mut T,
    address: u16,
    spec: &ReadSpec,
) -> Result<f64, DiscoveryError>
where
    T: RegisterTransport + ?Sized,
{
    let words = transport.read(spec.function, address, spec.words).await?;
    spec.decode(&words)
}
