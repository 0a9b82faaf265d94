// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! In-memory transport
//!
//! Answers reads from a [`RegisterBank`] without any network, so discovery
//! phases can be replayed deterministically.

use std::collections::HashMap;

use async_trait::async_trait;
use log::debug;

use super::{RegisterTransport, TransportError, DEFAULT_TIMEOUT};
use crate::modbus::RegisterBank;
use crate::registers::{Encoding, ReadFunction};

#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    bank: RegisterBank,
    /// Reads left to fail per register, `None` for every read.
    failing: HashMap<(ReadFunction, u16), Option<usize>>,
    requests: Vec<(ReadFunction, u16, u16)>,
    closed: bool,
}

impl MemoryTransport {
    pub fn new(bank: RegisterBank) -> Self {
        Self {
            bank,
            ..Self::default()
        }
    }

    pub fn with_register(mut self, function: ReadFunction, address: u16, word: u16) -> Self {
        self.bank.set_word(function, address, word);
        self
    }

    pub fn with_samples(mut self, function: ReadFunction, address: u16, samples: &[u16]) -> Self {
        self.bank.set_samples(function, address, samples);
        self
    }

    /// Store decoded `values` as successive samples at `address`.
    pub fn with_value(
        mut self,
        function: ReadFunction,
        address: u16,
        encoding: Encoding,
        scale: f64,
        values: &[f64],
    ) -> Self {
        self.bank.set_values(function, address, encoding, scale, values);
        self
    }

    /// Make every read starting at `address` time out.
    pub fn with_failure(mut self, function: ReadFunction, address: u16) -> Self {
        self.failing.insert((function, address), None);
        self
    }

    /// Make only the next `times` reads starting at `address` time out.
    pub fn with_failures(mut self, function: ReadFunction, address: u16, times: usize) -> Self {
        self.failing.insert((function, address), Some(times));
        self
    }

    pub fn bank_mut(&mut self) -> &mut RegisterBank {
        &mut self.bank
    }

    /// Every read issued so far, in order, as `(function, address, count)`.
    pub fn requests(&self) -> &[(ReadFunction, u16, u16)] {
        &self.requests
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn request(
        &mut self,
        function: ReadFunction,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        self.requests.push((function, address, count));

        let fails = match self.failing.get_mut(&(function, address)) {
            Some(None) => true,
            Some(Some(left)) if *left > 0 => {
                *left -= 1;
                true
            }
            _ => false,
        };
        if fails {
            debug!("Simulated timeout on {} register {}", function, address);
            return Err(TransportError::Timeout {
                function,
                address,
                timeout: DEFAULT_TIMEOUT,
            });
        }

        self.bank
            .read(function, address, count)
            .map_err(|code| TransportError::Exception {
                function,
                address,
                code,
            })
    }
}

#[async_trait]
impl RegisterTransport for MemoryTransport {
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.request(ReadFunction::Holding, address, count)
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.request(ReadFunction::Input, address, count)
    }

    async fn close(&mut self) {
        self.closed = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_modbus::ExceptionCode;

    #[tokio::test]
    async fn test_reads_and_logs_requests() {
        let mut transport = MemoryTransport::default()
            .with_register(ReadFunction::Holding, 1, 10)
            .with_samples(ReadFunction::Input, 2, &[5, 6]);

        assert_eq!(transport.read_holding_registers(1, 1).await.unwrap(), vec![10]);
        assert_eq!(transport.read_input_registers(2, 1).await.unwrap(), vec![5]);
        assert_eq!(transport.read_input_registers(2, 1).await.unwrap(), vec![6]);
        assert_eq!(
            transport.requests(),
            &[
                (ReadFunction::Holding, 1, 1),
                (ReadFunction::Input, 2, 1),
                (ReadFunction::Input, 2, 1)
            ]
        );
    }

    #[tokio::test]
    async fn test_errors() {
        let mut transport = MemoryTransport::default()
            .with_register(ReadFunction::Input, 1, 10)
            .with_failure(ReadFunction::Input, 1);

        assert!(matches!(
            transport.read_input_registers(1, 1).await,
            Err(TransportError::Timeout { address: 1, .. })
        ));
        assert!(matches!(
            transport.read_input_registers(9, 1).await,
            Err(TransportError::Exception {
                code: ExceptionCode::IllegalDataAddress,
                ..
            })
        ));

        transport.close().await;
        assert!(transport.is_closed());
        assert!(matches!(
            transport.read_input_registers(1, 1).await,
            Err(TransportError::Closed)
        ));
    }

    #[tokio::test]
    async fn test_bounded_failures_recover() {
        let mut transport = MemoryTransport::default()
            .with_samples(ReadFunction::Input, 3, &[7, 8])
            .with_failures(ReadFunction::Input, 3, 1);

        assert!(matches!(
            transport.read_input_registers(3, 1).await,
            Err(TransportError::Timeout { address: 3, .. })
        ));
        assert_eq!(transport.read_input_registers(3, 1).await.unwrap(), vec![7]);
        assert_eq!(transport.read_input_registers(3, 1).await.unwrap(), vec![8]);
    }

    #[test]
    fn test_default_timeout_is_five_seconds() {
        assert_eq!(DEFAULT_TIMEOUT, Duration::from_secs(5));
    }
}
