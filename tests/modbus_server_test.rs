// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

//! Tests for the simulated inverter and the Modbus TCP transport
//!
//! These tests start a simulated inverter on an ephemeral port and talk to
//! it both with a raw tokio-modbus client and through the crate's transport.

use std::future::Future;
use std::net::SocketAddr;
use std::pin::Pin;
use std::str::FromStr;
use std::time::Duration;

use tokio::net::TcpListener;
use tokio::time;
use tokio_modbus::prelude::*;
use tokio_modbus::server::tcp::{accept_tcp_connection, Server};
use tokio_modbus::server::Service;

use rust_modbus_discovery::catalog::Catalog;
use rust_modbus_discovery::identity::{DeviceFamily, DEVICE_TYPE_REGISTER};
use rust_modbus_discovery::modbus::{serve, RegisterBank, SimulatedInverter};
use rust_modbus_discovery::registers::{decode, Encoding, ReadFunction};
use rust_modbus_discovery::scanner::{ExpectedValues, RangeScanner, ScanOptions};
use rust_modbus_discovery::transport::{DeviceTarget, ModbusTcpTransport, RegisterTransport, TransportError};
use rust_modbus_discovery::units::ExpectedReading;

/// Start a simulated inverter in the background
async fn start_test_server(
    family: DeviceFamily,
) -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>> {
    // Port 0 lets the OS pick a free port
    let listener = TcpListener::bind(SocketAddr::from_str("127.0.0.1:0")?).await?;
    let socket_addr = listener.local_addr()?;

    let handle = tokio::spawn(async move {
        if let Err(e) = serve(listener, SimulatedInverter::demo(family)).await {
            eprintln!("Server error: {}", e);
        }
    });

    // Give the server a moment to start
    time::sleep(Duration::from_millis(100)).await;

    Ok((socket_addr, handle))
}

/// Inverter that answers reads of one input register late
#[derive(Clone)]
struct SlowRegister {
    inverter: SimulatedInverter,
    address: u16,
    delay: Duration,
}

impl Service for SlowRegister {
    type Request = Request<'static>;
    type Response = Response;
    type Exception = ExceptionCode;
    type Future = Pin<Box<dyn Future<Output = Result<Response, ExceptionCode>> + Send>>;

    fn call(&self, req: Self::Request) -> Self::Future {
        let delay = match req {
            Request::ReadInputRegisters(addr, _) if addr == self.address => self.delay,
            _ => Duration::ZERO,
        };
        let response = self.inverter.call(req);
        Box::pin(async move {
            time::sleep(delay).await;
            response.await
        })
    }
}

/// Register 1 answers after 400 ms, register 2 holds 1480 W
async fn start_slow_server() -> Result<(SocketAddr, tokio::task::JoinHandle<()>), Box<dyn std::error::Error>> {
    let mut bank = RegisterBank::new();
    bank.set_word(ReadFunction::Input, 1, 100);
    bank.set_values(ReadFunction::Input, 2, Encoding::Int16, 1.0, &[1480.0]);
    let service = SlowRegister {
        inverter: SimulatedInverter::new(bank),
        address: 1,
        delay: Duration::from_millis(400),
    };

    let listener = TcpListener::bind(SocketAddr::from_str("127.0.0.1:0")?).await?;
    let socket_addr = listener.local_addr()?;
    let server = Server::new(listener);

    let handle = tokio::spawn(async move {
        let on_connected = move |stream, socket_addr: SocketAddr| {
            let service = service.clone();
            async move { accept_tcp_connection(stream, socket_addr, move |_| Ok(Some(service.clone()))) }
        };
        let on_process_error = |err| {
            eprintln!("Server error: {}", err);
        };
        if let Err(e) = server.serve(&on_connected, on_process_error).await {
            eprintln!("Server error: {}", e);
        }
    });

    time::sleep(Duration::from_millis(100)).await;
    Ok((socket_addr, handle))
}

fn target(socket_addr: SocketAddr) -> DeviceTarget {
    DeviceTarget {
        host: socket_addr.ip().to_string(),
        port: socket_addr.port(),
        unit_id: 1,
    }
}

#[tokio::test]
async fn test_read_device_type_register() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server_handle) = start_test_server(DeviceFamily::Hybrid).await?;

    let mut ctx = tcp::connect(socket_addr).await?;
    let data = ctx.read_input_registers(DEVICE_TYPE_REGISTER, 1).await??;
    assert_eq!(data, vec![0x0E03]);

    ctx.disconnect().await?;
    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_meter_power_cycles_between_reads() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server_handle) = start_test_server(DeviceFamily::String).await?;

    let mut ctx = tcp::connect(socket_addr).await?;
    let mut values = Vec::new();
    for _ in 0..3 {
        let data = ctx.read_input_registers(5600, 1).await??;
        values.push(decode(&data, Encoding::Int16, 1.0)?);
    }
    assert_eq!(values, vec![-1520.0, 1480.0, -1410.0]);

    ctx.disconnect().await?;
    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_unmapped_register_is_an_exception() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server_handle) = start_test_server(DeviceFamily::String).await?;

    let mut ctx = tcp::connect(socket_addr).await?;
    let response = ctx.read_input_registers(40000, 2).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalDataAddress));

    // Writes are not part of a read-only inverter
    let response = ctx.write_single_register(5600, 1).await?;
    assert_eq!(response, Err(ExceptionCode::IllegalFunction));

    ctx.disconnect().await?;
    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_transport_reads_and_closes() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server_handle) = start_test_server(DeviceFamily::String).await?;

    let mut transport =
        ModbusTcpTransport::connect(&target(socket_addr), Duration::from_secs(1)).await?;

    let words = transport.read(ReadFunction::Input, 5098, 2).await?;
    let energy = decode(&words, Encoding::Uint32le, 0.1)?;
    assert!((energy - 1870.2).abs() < 1e-6);

    match transport.read(ReadFunction::Input, 40000, 1).await {
        Err(TransportError::Exception { code, address, .. }) => {
            assert_eq!(code, ExceptionCode::IllegalDataAddress);
            assert_eq!(address, 40000);
        }
        other => panic!("expected an exception response, got {:?}", other),
    }

    transport.close().await;
    transport.close().await;
    assert!(matches!(
        transport.read(ReadFunction::Input, 5098, 2).await,
        Err(TransportError::Closed)
    ));

    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_reads_after_timeout_get_their_own_answer() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server_handle) = start_slow_server().await?;
    let mut transport =
        ModbusTcpTransport::connect(&target(socket_addr), Duration::from_millis(200)).await?;

    assert!(matches!(
        transport.read(ReadFunction::Input, 1, 1).await,
        Err(TransportError::Timeout { address: 1, .. })
    ));
    // The late answer for register 1 must not be taken for these
    assert_eq!(transport.read(ReadFunction::Input, 2, 1).await?, vec![1480]);
    assert_eq!(transport.read(ReadFunction::Input, 2, 1).await?, vec![1480]);

    transport.close().await;
    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_scan_matches_register_after_slow_one() -> Result<(), Box<dyn std::error::Error>> {
    let (socket_addr, server_handle) = start_slow_server().await?;
    let mut transport =
        ModbusTcpTransport::connect(&target(socket_addr), Duration::from_millis(200)).await?;

    let catalog = Catalog::builtin()?;
    let scanner = RangeScanner::new(ScanOptions {
        start: 1,
        end: 4,
        samples: 2,
        sample_interval: Duration::ZERO,
    })?;
    let expected = ExpectedValues::from([(
        "meter_power".to_string(),
        ExpectedReading::new(1.5, "kW"),
    )]);
    let outcome = scanner.scan(&mut transport, &catalog, &expected).await?;

    let meter = outcome.matches.get("meter_power").expect("meter power match");
    assert_eq!(meter.register, 2);
    assert_eq!(meter.tolerance_difference, Some(20.0));

    transport.close().await;
    server_handle.abort();
    Ok(())
}

#[tokio::test]
async fn test_connect_failure_is_reported() {
    // Bind then drop to get a port nobody listens on
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let socket_addr = listener.local_addr().unwrap();
    drop(listener);

    let result = ModbusTcpTransport::connect(&target(socket_addr), Duration::from_secs(1)).await;
    assert!(matches!(result, Err(TransportError::Connect { .. })));
}
