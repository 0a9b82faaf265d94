// Copyright (c) 2025 Ronan LE MEILLAT, SCTG Development
// This file is part of the rust-modbus-discovery project and is licensed under the
// SCTG Development Non-Commercial License v1.0 (see LICENSE.md for details).

// Main entry point for the Modbus register discovery tool
use std::io;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::{info, warn};

use rust_modbus_discovery::config::{output_config_schema, Config, ConfigOverrides};
use rust_modbus_discovery::identity::DeviceFamily;
use rust_modbus_discovery::prompt::{Prompt, SharedPrompt};
use rust_modbus_discovery::reconcile::ConflictPolicy;
use rust_modbus_discovery::scanner::{CandidateSelector, FixedCandidate, NoSelection};
use rust_modbus_discovery::session::DiscoverySession;
use rust_modbus_discovery::units::ExpectedReading;

/// Discover which Modbus registers of a solar inverter hold which metric
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file (created with defaults when missing)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// Print the configuration JSON schema and exit
    #[arg(long)]
    show_config_schema: bool,

    /// Inverter address
    #[arg(short, long)]
    address: Option<String>,

    /// Modbus TCP port
    #[arg(short, long)]
    port: Option<u16>,

    /// Modbus unit id
    #[arg(long)]
    unit_id: Option<u8>,

    /// Per-request timeout in milliseconds
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// First register to scan
    #[arg(long)]
    scan_start: Option<u16>,

    /// Register after the last one to scan
    #[arg(long)]
    scan_end: Option<u32>,

    /// Samples per register
    #[arg(long)]
    samples: Option<usize>,

    /// Metric catalog JSON file
    #[arg(long)]
    catalog: Option<PathBuf>,

    /// Device family assumed when the model is unknown (STRING or HYBRID)
    #[arg(long)]
    model: Option<DeviceFamily>,

    /// Meter active power shown on the meter, e.g. 1.5kW
    #[arg(long)]
    meter_power: Option<ExpectedReading>,

    /// Forward active energy shown on the meter, e.g. 1.87MWh
    #[arg(long)]
    import_energy: Option<ExpectedReading>,

    /// Reverse active energy shown on the meter, e.g. 3.1MWh
    #[arg(long)]
    export_energy: Option<ExpectedReading>,

    /// Any other reference reading as metric=value, e.g. phase_a_voltage=231V
    #[arg(long = "expect", value_parser = parse_expectation)]
    expectations: Vec<(String, ExpectedReading)>,

    /// Ask for readings, candidates and conflicts on the terminal
    #[arg(short, long)]
    interactive: bool,

    /// Register to use for meter power among the ranked candidates
    #[arg(long)]
    pick_candidate: Option<u16>,

    /// Answer to register conflicts when not interactive (keep or catalog)
    #[arg(long)]
    conflict_policy: Option<ConflictPolicy>,

    /// Register map output file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Discovery report output file
    #[arg(long)]
    report: Option<PathBuf>,
}

fn parse_expectation(text: &str) -> Result<(String, ExpectedReading), String> {
    let (metric_id, reading) = text
        .split_once('=')
        .ok_or_else(|| format!("expected metric=value, got '{text}'"))?;
    Ok((metric_id.trim().to_string(), reading.parse()?))
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init_from_env(
        env_logger::Env::default().filter_or(env_logger::DEFAULT_FILTER_ENV, "info"),
    );
    let args = Args::parse();

    if args.show_config_schema {
        return output_config_schema();
    }

    let mut config = Config::from_file(&args.config)?;
    let mut expected = args.expectations;
    for (metric_id, reading) in [
        ("meter_power", args.meter_power),
        ("grid_import_energy", args.import_energy),
        ("grid_export_energy", args.export_energy),
    ] {
        if let Some(reading) = reading {
            expected.push((metric_id.to_string(), reading));
        }
    }
    config.apply_args(ConfigOverrides {
        address: args.address,
        port: args.port,
        unit_id: args.unit_id,
        timeout_ms: args.timeout_ms,
        scan_start: args.scan_start,
        scan_end: args.scan_end,
        samples: args.samples,
        catalog: args.catalog,
        default_model: args.model,
        conflict_policy: args.conflict_policy,
        meter_candidate: args.pick_candidate,
        expected,
        register_map: args.output,
        report: args.report,
    });
    config.validate()?;

    let catalog = config.catalog.load()?;
    let mut options = config.session_options();

    println!("Modbus register discovery");
    println!("-------------------------");
    println!("Device: {}", options.target);

    let prompt = SharedPrompt::new(Prompt::new(io::stdin().lock(), io::stdout()));
    if args.interactive {
        prompt.ask_expected_values(&catalog, &mut options.expected);
    }

    let mut fixed_selector: Box<dyn CandidateSelector> = match config.discovery.meter_candidate {
        Some(register) => Box::new(FixedCandidate(register)),
        None => Box::new(NoSelection),
    };
    let mut policy = config.discovery.conflict_policy;

    let session = DiscoverySession::new(&catalog, options)?;
    let outcome = if args.interactive {
        let mut selector = prompt.clone();
        let mut resolver = prompt.clone();
        session.run(&mut selector, &mut resolver).await
    } else {
        session.run(fixed_selector.as_mut(), &mut policy).await
    }
    .context("Discovery failed")?;

    println!("Device identity: {}", outcome.identity);
    println!("Catalog family: {}", outcome.family);
    println!("Matches:");
    for found in outcome.matches.iter() {
        println!(
            "  {:<28} register {:>5}  value {:>12.3}  {:<8} {:?}{}",
            found.metric_id,
            found.register,
            found.value,
            found.encoding,
            found.source,
            found
                .tolerance_difference
                .map(|d| format!(" (difference {:.3})", d))
                .unwrap_or_default()
        );
    }
    let candidates = outcome.scan.top_candidates();
    if !candidates.is_empty() {
        println!("Meter power candidates:");
        for candidate in candidates {
            println!(
                "  register {:>5}  avg {:>10.1}  range {:>8.1}  sign changes {}",
                candidate.register,
                candidate.average,
                candidate.range(),
                candidate.sign_changes
            );
        }
    }
    if outcome.matches.get("meter_power").is_none() {
        warn!("Meter power was not resolved; rerun with --meter-power or --pick-candidate");
    }

    let register_map = outcome.register_map();
    register_map.save_to_file(&config.output.register_map)?;
    info!("Register map written to {}", config.output.register_map.display());

    if let Some(report_path) = &config.output.report {
        outcome
            .report(session.options(), &catalog)
            .save_to_file(report_path)?;
        info!("Discovery report written to {}", report_path.display());
    }

    Ok(())
}
