// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Simulated inverter Modbus server
//!
//! For avoiding confusion with the Modbus master/slave terminology, this module uses
//! the terms "server" and "client" instead. The server is the device that provides data,
//! while the client is the device that requests data.
//! The modbus master is the device that requests data, while the modbus slave is the device that provides data.
//! In other words the modbus master is here the discovery client and the modbus slave is here the simulated inverter.

use std::{
    future, io,
    net::SocketAddr,
    sync::{Arc, Mutex},
};

use log::{error, info};
use tokio::net::TcpListener;
use tokio_modbus::{
    prelude::*,
    server::tcp::{accept_tcp_connection, Server},
};

use super::bank::RegisterBank;
use crate::identity::{DeviceFamily, DEVICE_TYPE_REGISTER, SERIAL_REGISTER, SERIAL_WORDS};
use crate::registers::{Encoding, ReadFunction};

/// A register bank served over Modbus TCP.
///
/// Clones share the same bank, so a test can keep a handle and adjust
/// registers while a client is connected.
#[derive(Debug, Clone, Default)]
pub struct SimulatedInverter {
    bank: Arc<Mutex<RegisterBank>>,
}

impl tokio_modbus::server::Service for SimulatedInverter {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = future::Ready<Result<Self::Response, Self::Exception>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let res = match req {
            Request::ReadInputRegisters(addr, cnt) => self
                .register_read(ReadFunction::Input, addr, cnt)
                .map(Response::ReadInputRegisters),
            Request::ReadHoldingRegisters(addr, cnt) => self
                .register_read(ReadFunction::Holding, addr, cnt)
                .map(Response::ReadHoldingRegisters),
            _ => {
                error!("SERVER: Exception::IllegalFunction - Unimplemented function code in request: {req:?}");
                Err(ExceptionCode::IllegalFunction)
            }
        };
        future::ready(res)
    }
}

impl SimulatedInverter {
    pub fn new(bank: RegisterBank) -> Self {
        Self {
            bank: Arc::new(Mutex::new(bank)),
        }
    }

    /// An inverter of the given family with live-looking values at the
    /// built-in catalog registers.
    ///
    /// Meter power swings between import and export, energy counters creep
    /// upward, and a handful of idle registers read zero.
    pub fn demo(family: DeviceFamily) -> Self {
        let mut bank = RegisterBank::new();
        let input = ReadFunction::Input;

        let (type_code, serial) = match family {
            DeviceFamily::String => (0x0131, "A2281234567"),
            DeviceFamily::Hybrid => (0x0E03, "B2390076543"),
        };
        bank.set_word(input, DEVICE_TYPE_REGISTER, type_code);
        bank.set_ascii(input, SERIAL_REGISTER, serial, SERIAL_WORDS);

        // Idle block so a scan has zeros to reject.
        for address in 5000..5200 {
            bank.set_word(input, address, 0);
        }
        bank.set_values(input, 5002, Encoding::Uint16, 0.1, &[12.4, 12.5, 12.6]);
        bank.set_values(input, 5007, Encoding::Int16, 0.1, &[41.5, 41.7, 41.6]);
        bank.set_values(input, 5010, Encoding::Uint16, 0.1, &[612.3, 615.0, 611.8]);
        bank.set_values(input, 5011, Encoding::Uint16, 0.1, &[8.2, 8.4, 8.3]);
        bank.set_values(input, 5016, Encoding::Uint32le, 1.0, &[5020.0, 5104.0, 4987.0]);
        bank.set_values(input, 5018, Encoding::Uint16, 0.1, &[231.2, 230.8, 231.0]);
        bank.set_values(input, 5035, Encoding::Uint16, 0.1, &[50.0, 50.1, 49.9]);

        match family {
            DeviceFamily::String => {
                bank.set_values(input, 5003, Encoding::Uint32le, 1.0, &[48211.0]);
                bank.set_values(input, 5021, Encoding::Uint16, 0.1, &[7.1, 7.3, 7.2]);
                bank.set_values(input, 5030, Encoding::Int32, 1.0, &[4810.0, 4890.0, 4770.0]);
                bank.set_values(input, 5034, Encoding::Int16, 0.001, &[0.998, 0.997, 0.999]);
                bank.set_values(input, 5094, Encoding::Uint32le, 0.1, &[3125.4, 3125.5]);
                bank.set_values(input, 5098, Encoding::Uint32le, 0.1, &[1870.2, 1870.3]);
                bank.set_values(input, 5600, Encoding::Int16, 1.0, &[-1520.0, 1480.0, -1410.0]);
            }
            DeviceFamily::Hybrid => {
                bank.set_values(input, 13001, Encoding::Uint16, 0.1, &[12.5]);
                bank.set_values(input, 13002, Encoding::Uint32le, 1.0, &[48211.0]);
                bank.set_values(input, 13009, Encoding::Int16, 1.0, &[-1520.0, 1480.0, -1410.0]);
                bank.set_values(input, 13022, Encoding::Uint16, 0.1, &[76.5]);
                bank.set_values(input, 13030, Encoding::Uint16, 0.1, &[7.2]);
                bank.set_values(input, 13033, Encoding::Int32, 1.0, &[4810.0, 4890.0]);
                bank.set_values(input, 13036, Encoding::Uint32le, 0.1, &[1870.2]);
                bank.set_values(input, 13045, Encoding::Uint32le, 0.1, &[3125.4]);
            }
        }

        Self::new(bank)
    }

    /// Run `f` with exclusive access to the register bank.
    pub fn with_bank<R>(&self, f: impl FnOnce(&mut RegisterBank) -> R) -> Option<R> {
        match self.bank.lock() {
            Ok(mut bank) => Some(f(&mut bank)),
            Err(_) => None,
        }
    }

    fn register_read(
        &self,
        function: ReadFunction,
        addr: u16,
        cnt: u16,
    ) -> Result<Vec<u16>, ExceptionCode> {
        let mut bank = self.bank.lock().map_err(|_| {
            error!("SERVER: Exception::ServerDeviceFailure - register bank lock poisoned");
            ExceptionCode::ServerDeviceFailure
        })?;
        bank.read(function, addr, cnt)
    }
}

/// Serve `inverter` on `listener` until the listener fails.
pub async fn serve(listener: TcpListener, inverter: SimulatedInverter) -> io::Result<()> {
    info!("Simulated inverter listening on {}", listener.local_addr()?);
    let server = Server::new(listener);

    let on_connected = move |stream, socket_addr: SocketAddr| {
        let inverter = inverter.clone();
        async move {
            info!("Client connected from {}", socket_addr);
            accept_tcp_connection(stream, socket_addr, move |_socket_addr| {
                Ok(Some(inverter.clone()))
            })
        }
    };
    let on_process_error = |err| {
        error!("Simulated inverter error: {}", err);
    };

    server.serve(&on_connected, on_process_error).await
}
