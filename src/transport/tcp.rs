// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Modbus TCP transport
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The inverter is the server that provides
//! data, discovery is the client that requests it.

use std::fmt;
use std::io;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};
use tokio::net::lookup_host;
use tokio::time;
use tokio_modbus::client::{tcp, Client, Context, Reader};
use tokio_modbus::Slave;

use super::{DeviceTarget, RegisterTransport, TransportError};
use crate::registers::ReadFunction;

/// A single persistent Modbus TCP connection with a fixed per-request timeout.
///
/// A request that times out or fails at the protocol level leaves the
/// connection out of step with the server, since the late reply would be
/// read as the answer to the next request. The connection is then dropped
/// and reopened before the next request.
pub struct ModbusTcpTransport {
    ctx: Option<Context>,
    target: DeviceTarget,
    timeout: Duration,
    closed: bool,
}

impl fmt::Debug for ModbusTcpTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModbusTcpTransport")
            .field("target", &self.target)
            .field("timeout", &self.timeout)
            .field("connected", &self.ctx.is_some())
            .field("closed", &self.closed)
            .finish()
    }
}

impl ModbusTcpTransport {
    /// Resolve the target and open the connection.
    ///
    /// The connect attempt itself is bounded by `timeout` as well.
    pub async fn connect(target: &DeviceTarget, timeout: Duration) -> Result<Self, TransportError> {
        let ctx = open(target, timeout).await?;
        Ok(Self {
            ctx: Some(ctx),
            target: target.clone(),
            timeout,
            closed: false,
        })
    }

    pub fn target(&self) -> &DeviceTarget {
        &self.target
    }

    async fn request(
        &mut self,
        function: ReadFunction,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        if self.closed {
            return Err(TransportError::Closed);
        }
        let timeout = self.timeout;
        if self.ctx.is_none() {
            info!("Reconnecting to {}", self.target);
            self.ctx = Some(open(&self.target, timeout).await?);
        }
        let ctx = self.ctx.as_mut().ok_or(TransportError::Closed)?;
        debug!("Reading {} {} registers starting at {}", count, function, address);

        let response = match function {
            ReadFunction::Holding => {
                time::timeout(timeout, ctx.read_holding_registers(address, count)).await
            }
            ReadFunction::Input => {
                time::timeout(timeout, ctx.read_input_registers(address, count)).await
            }
        };

        match response {
            Err(_elapsed) => {
                warn!("Timed out reading {} register {}, dropping connection", function, address);
                self.ctx = None;
                Err(TransportError::Timeout {
                    function,
                    address,
                    timeout,
                })
            }
            Ok(Err(source)) => {
                warn!("Protocol error reading {} register {}, dropping connection", function, address);
                self.ctx = None;
                Err(TransportError::Protocol {
                    function,
                    address,
                    source,
                })
            }
            Ok(Ok(Err(code))) => Err(TransportError::Exception {
                function,
                address,
                code,
            }),
            Ok(Ok(Ok(words))) => Ok(words),
        }
    }
}

#[async_trait]
impl RegisterTransport for ModbusTcpTransport {
    async fn read_holding_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.request(ReadFunction::Holding, address, count).await
    }

    async fn read_input_registers(
        &mut self,
        address: u16,
        count: u16,
    ) -> Result<Vec<u16>, TransportError> {
        self.request(ReadFunction::Input, address, count).await
    }

    async fn close(&mut self) {
        self.closed = true;
        if let Some(mut ctx) = self.ctx.take() {
            debug!("Closing Modbus connection to {}", self.target);
            if let Err(err) = ctx.disconnect().await {
                warn!("Error while disconnecting from {}: {}", self.target, err);
            }
        }
    }
}

/// Resolve `target` and open a Modbus TCP context, bounded by `timeout`.
async fn open(target: &DeviceTarget, timeout: Duration) -> Result<Context, TransportError> {
    let host_port = format!("{}:{}", target.host, target.port);
    let socket_addr = lookup_host(&host_port)
        .await
        .map_err(|source| TransportError::Connect {
            target: host_port.clone(),
            source,
        })?
        .next()
        .ok_or_else(|| TransportError::Resolve {
            target: host_port.clone(),
        })?;

    info!("Connecting to Modbus server at {} (unit {})", socket_addr, target.unit_id);
    time::timeout(timeout, tcp::connect_slave(socket_addr, Slave(target.unit_id)))
        .await
        .map_err(|_| TransportError::Connect {
            target: host_port.clone(),
            source: io::Error::new(io::ErrorKind::TimedOut, "connection timed out"),
        })?
        .map_err(|source| TransportError::Connect {
            target: host_port,
            source,
        })
}
