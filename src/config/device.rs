// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Target device configuration
//!
//! This module defines where the inverter to discover is reachable and how
//! long a single register request may take.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::transport::DeviceTarget;

/// Configuration of the Modbus TCP device to discover.
///
/// # Fields
///
/// * `address` - Host name or IP address of the inverter (default: 127.0.0.1)
/// * `port` - Modbus TCP port (default: 502)
/// * `unit_id` - Modbus unit (slave) id (default: 1)
/// * `timeout_ms` - Per-request timeout in milliseconds (default: 5000)
///
/// # Example
///
/// ```
/// use rust_modbus_discovery::config::DeviceConfig;
///
/// let device = DeviceConfig {
///     address: "192.168.1.40".to_string(),
///     port: 502,
///     unit_id: 1,
///     timeout_ms: 5000,
/// };
/// assert_eq!(device.target().to_string(), "192.168.1.40:502 (unit 1)");
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceConfig {
    /// Host name or IP address of the inverter.
    pub address: String,

    /// The TCP port the inverter answers Modbus requests on.
    ///
    /// Default value is 502, which is the standard Modbus TCP port.
    pub port: u16,

    /// Modbus unit id, sometimes called slave id.
    pub unit_id: u8,

    /// Time to wait for each register request before giving up on it.
    pub timeout_ms: u64,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1".to_string(),
            port: 502,
            unit_id: 1,
            timeout_ms: 5000,
        }
    }
}

impl DeviceConfig {
    pub fn target(&self) -> DeviceTarget {
        DeviceTarget {
            host: self.address.clone(),
            port: self.port,
            unit_id: self.unit_id,
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}
