// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Model and serial number detection
//!
//! The device type code lives in a fixed input register and maps through a
//! static table to a model name and a catalog family. The serial number is
//! packed ASCII in the block just below it. Neither read is allowed to stop
//! a discovery session: a failure leaves the field empty.

use std::fmt;
use std::str::FromStr;

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use crate::transport::RegisterTransport;

/// Input register holding the device type code.
pub const DEVICE_TYPE_REGISTER: u16 = 4999;
/// First input register of the serial number block.
pub const SERIAL_REGISTER: u16 = 4989;
pub const SERIAL_WORDS: u16 = 10;

/// Catalog family a device belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum DeviceFamily {
    /// Grid-tied string inverters
    #[default]
    String,
    /// Inverters with a battery port
    Hybrid,
}

impl DeviceFamily {
    pub fn as_str(self) -> &'static str {
        match self {
            DeviceFamily::String => "STRING",
            DeviceFamily::Hybrid => "HYBRID",
        }
    }
}

impl fmt::Display for DeviceFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceFamily {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "STRING" => Ok(DeviceFamily::String),
            "HYBRID" => Ok(DeviceFamily::Hybrid),
            other => Err(format!("unknown device family '{other}'")),
        }
    }
}

const MODEL_TABLE: &[(u16, &str, DeviceFamily)] = &[
    (0x0D03, "SH5K-V13", DeviceFamily::Hybrid),
    (0x0D06, "SH3K6", DeviceFamily::Hybrid),
    (0x0D07, "SH4K6", DeviceFamily::Hybrid),
    (0x0D09, "SH5K-20", DeviceFamily::Hybrid),
    (0x0D0A, "SH5K-30", DeviceFamily::Hybrid),
    (0x0D0B, "SH3K6-30", DeviceFamily::Hybrid),
    (0x0D0C, "SH4K6-30", DeviceFamily::Hybrid),
    (0x0D0F, "SH5.0RS", DeviceFamily::Hybrid),
    (0x0D10, "SH6.0RS", DeviceFamily::Hybrid),
    (0x0E00, "SH5.0RT", DeviceFamily::Hybrid),
    (0x0E01, "SH6.0RT", DeviceFamily::Hybrid),
    (0x0E02, "SH8.0RT", DeviceFamily::Hybrid),
    (0x0E03, "SH10RT", DeviceFamily::Hybrid),
    (0x0026, "SG3K-S", DeviceFamily::String),
    (0x0027, "SG5K-S", DeviceFamily::String),
    (0x0131, "SG30KTL-M", DeviceFamily::String),
    (0x0132, "SG30KTL-M-V31", DeviceFamily::String),
    (0x0134, "SG34KJ", DeviceFamily::String),
    (0x0135, "LP_P34KSG", DeviceFamily::String),
    (0x0138, "SG50KTL-M", DeviceFamily::String),
    (0x013E, "SG12KTL-M", DeviceFamily::String),
    (0x2430, "SG5.0RS", DeviceFamily::String),
    (0x2C00, "SG33CX", DeviceFamily::String),
    (0x2C01, "SG40CX", DeviceFamily::String),
    (0x2C02, "SG50CX", DeviceFamily::String),
    (0x2C0A, "SG110CX", DeviceFamily::String),
];

/// Look up a device type code.
pub fn lookup_model(code: u16) -> Option<(&'static str, DeviceFamily)> {
    MODEL_TABLE
        .iter()
        .find(|(known, _, _)| *known == code)
        .map(|(_, name, family)| (*name, *family))
}

/// What a device says about itself. Fixed once detection has run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub model_name: Option<String>,
    pub device_type_code: Option<u16>,
    pub serial_number: Option<String>,
    pub family: Option<DeviceFamily>,
}

impl DeviceIdentity {
    /// Detected family, or `fallback` when the model is unknown.
    pub fn family_or(&self, fallback: DeviceFamily) -> DeviceFamily {
        self.family.unwrap_or(fallback)
    }

    /// Model keys to try in the catalog, most specific first.
    pub fn catalog_keys(&self, fallback: DeviceFamily) -> Vec<String> {
        let mut keys = Vec::with_capacity(2);
        if let Some(name) = &self.model_name {
            keys.push(name.clone());
        }
        keys.push(self.family_or(fallback).as_str().to_string());
        keys
    }
}

impl fmt::Display for DeviceIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.model_name, self.device_type_code) {
            (Some(name), Some(code)) => write!(f, "{} (0x{:04X})", name, code)?,
            (None, Some(code)) => write!(f, "unknown model (0x{:04X})", code)?,
            _ => f.write_str("unknown model")?,
        }
        if let Some(serial) = &self.serial_number {
            write!(f, ", serial {}", serial)?;
        }
        Ok(())
    }
}

/// Unpack ASCII text stored two bytes per word, high byte first.
///
/// Null bytes are dropped and surrounding whitespace is trimmed.
pub fn decode_ascii(words: &[u16]) -> String {
    let bytes: Vec<u8> = words
        .iter()
        .flat_map(|word| word.to_be_bytes())
        .filter(|byte| *byte != 0)
        .collect();
    String::from_utf8_lossy(&bytes).trim().to_string()
}

/// Identify the device on the other end of `transport`.
///
/// Never fails: an unreadable type code leaves the model unknown, an
/// unmapped code is reported and kept, and the serial number is optional.
pub async fn detect_identity<T>(transport: &mut T) -> DeviceIdentity
where
    T: RegisterTransport + ?Sized,
{
    let mut identity = DeviceIdentity::default();

    match transport.read_input_registers(DEVICE_TYPE_REGISTER, 1).await {
        Ok(words) if !words.is_empty() => {
            let code = words[0];
            identity.device_type_code = Some(code);
            match lookup_model(code) {
                Some((name, family)) => {
                    identity.model_name = Some(name.to_string());
                    identity.family = Some(family);
                }
                None => warn!("Unmapped device type code 0x{:04X}", code),
            }
        }
        Ok(_) => warn!("Empty answer reading the device type register"),
        Err(err) => warn!("Cannot read device type, model unknown: {}", err),
    }

    match transport
        .read_input_registers(SERIAL_REGISTER, SERIAL_WORDS)
        .await
    {
        Ok(words) => {
            let serial = decode_ascii(&words);
            if !serial.is_empty() {
                identity.serial_number = Some(serial);
            }
        }
        Err(err) => debug!("Serial number not available: {}", err),
    }

    info!("Detected device: {}", identity);
    identity
}
