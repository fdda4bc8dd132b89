//! EncoderLink capture tool
//!
//! Opens the controller link, optionally sends one motion command, records
//! telemetry for a while and prints/exports the derived position and velocity.
//!
//! Usage:
//!   cargo run --example capture -- [OPTIONS] [PORT]
//!
//! Options:
//!   --config PATH     Load link settings from a JSON file
//!   --baud RATE       Baud rate (default: 1000000)
//!   --ppr N           Encoder pulses per revolution (default: 8000)
//!   --seconds N       Capture duration (default: 5)
//!   --turns N         Send a turns move (needs --speed)
//!   --speed N         Nonzero speed for the turns move
//!   --distance MM     Send a distance move
//!   --out PATH        Export derived series (.csv or .json)
//!   --raw PATH        Export raw samples as CSV
//!   --demo            Use the simulated controller instead of a port
//!   --list            List serial ports and exit
//!
//! Set RUST_LOG=debug for protocol-level logging.

use anyhow::{bail, Context, Result};
use encoderlink_core::acquisition::{Acquisition, SampleStore};
use encoderlink_core::config::LinkConfig;
use encoderlink_core::demo::DemoDevice;
use encoderlink_core::export::{export_samples, export_series};
use encoderlink_core::kinematics::{Channel, KinematicsError};
use encoderlink_core::protocol::{self, Command, CommunicationChannel};
use std::path::PathBuf;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

struct Options {
    config: LinkConfig,
    seconds: u64,
    command: Option<Command>,
    out: Option<PathBuf>,
    raw: Option<PathBuf>,
    demo: bool,
    list: bool,
}

fn next_value(args: &[String], i: &mut usize, flag: &str) -> Result<String> {
    *i += 1;
    args.get(*i)
        .cloned()
        .with_context(|| format!("{} needs a value", flag))
}

fn parse_args(args: &[String]) -> Result<Options> {
    let mut config = LinkConfig::default();
    let mut port_override = None;
    let mut baud_override = None;
    let mut ppr_override = None;
    let mut seconds = 5;
    let mut turns = None;
    let mut speed = None;
    let mut distance = None;
    let mut out = None;
    let mut raw = None;
    let mut demo = false;
    let mut list = false;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--config" | "-c" => {
                let path = next_value(args, &mut i, "--config")?;
                config = LinkConfig::load(&path)
                    .with_context(|| format!("loading config {}", path))?;
            }
            "--baud" | "-b" => baud_override = Some(next_value(args, &mut i, "--baud")?.parse()?),
            "--ppr" => ppr_override = Some(next_value(args, &mut i, "--ppr")?.parse()?),
            "--seconds" | "-s" => seconds = next_value(args, &mut i, "--seconds")?.parse()?,
            "--turns" => turns = Some(next_value(args, &mut i, "--turns")?.parse()?),
            "--speed" => speed = Some(next_value(args, &mut i, "--speed")?.parse()?),
            "--distance" => distance = Some(next_value(args, &mut i, "--distance")?.parse()?),
            "--out" | "-o" => out = Some(PathBuf::from(next_value(args, &mut i, "--out")?)),
            "--raw" => raw = Some(PathBuf::from(next_value(args, &mut i, "--raw")?)),
            "--demo" => demo = true,
            "--list" => list = true,
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            arg if !arg.starts_with('-') => port_override = Some(arg.to_string()),
            other => bail!("unknown option: {}", other),
        }
        i += 1;
    }

    if let Some(port) = port_override {
        config.port_name = port;
    }
    if let Some(baud) = baud_override {
        config.baud_rate = baud;
    }
    if let Some(ppr) = ppr_override {
        config.pulses_per_revolution = ppr;
    }
    config.validate()?;

    let command = Command::from_move_options(turns, speed, distance)
        .context("use --turns N --speed N, or --distance MM")?;

    Ok(Options {
        config,
        seconds,
        command,
        out,
        raw,
        demo,
        list,
    })
}

fn print_help() {
    println!("EncoderLink capture tool");
    println!();
    println!("Usage: capture [OPTIONS] [PORT]");
    println!();
    println!("Options:");
    println!("  --config PATH     Load link settings from a JSON file");
    println!("  --baud RATE       Baud rate (default: 1000000)");
    println!("  --ppr N           Encoder pulses per revolution (default: 8000)");
    println!("  --seconds N       Capture duration (default: 5)");
    println!("  --turns N         Send a turns move (needs --speed)");
    println!("  --speed N         Nonzero speed for the turns move");
    println!("  --distance MM     Send a distance move");
    println!("  --out PATH        Export derived series (.csv or .json)");
    println!("  --raw PATH        Export raw samples as CSV");
    println!("  --demo            Use the simulated controller");
    println!("  --list            List serial ports and exit");
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().collect();
    let opts = parse_args(&args)?;

    if opts.list {
        for port in protocol::list_ports() {
            println!(
                "{:<20} {}",
                port.name,
                port.product.as_deref().unwrap_or("")
            );
        }
        return Ok(());
    }

    let processor = opts.config.processor()?;
    let channel: Box<dyn CommunicationChannel> = if opts.demo {
        Box::new(DemoDevice::new())
    } else {
        if opts.config.port_name.is_empty() {
            bail!("no port given (pass PORT, --config, or --demo)");
        }
        Box::new(protocol::connect(&opts.config)?)
    };

    let store = SampleStore::new();
    let acquisition = Acquisition::start(channel, store.clone(), &opts.config);

    if let Some(command) = &opts.command {
        acquisition.send_command(command)?;
    }

    tokio::select! {
        _ = tokio::time::sleep(Duration::from_secs(opts.seconds)) => {}
        _ = tokio::signal::ctrl_c() => println!("interrupted"),
    }
    let summary = acquisition.shutdown().await?;
    println!(
        "captured {} records ({} bytes) in session {}",
        summary.frames,
        summary.bytes,
        store.session().id
    );

    let snapshot = store.snapshot();
    if let Some(path) = &opts.raw {
        export_samples(path, &snapshot)?;
        println!("raw samples written to {}", path.display());
    }

    let series = match processor.derive(&snapshot) {
        Ok(series) => series,
        Err(KinematicsError::EmptyInput) => {
            println!("no data to process");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };

    println!("duration: {:.3}s", series.duration_seconds());
    for channel in Channel::ALL {
        let s = series.channel(channel);
        let peak = s
            .velocity_degrees_per_second
            .iter()
            .filter(|v| v.is_finite())
            .fold(0.0f64, |acc, v| acc.max(v.abs()));
        println!(
            "channel {:?}: final {:.2} deg, peak {:.2} deg/s",
            channel,
            s.position_degrees.last().copied().unwrap_or_default(),
            peak
        );
    }
    if series.degenerate_intervals > 0 {
        println!(
            "{} interval(s) had repeated timestamps",
            series.degenerate_intervals
        );
    }

    if let Some(path) = &opts.out {
        export_series(path, &series)?;
        println!("series written to {}", path.display());
    }

    Ok(())
}
